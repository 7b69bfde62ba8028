//! Console system.
//!
//! Provides:
//! - Console variables (cvars) with typed values, optionally bounded by a
//!   [`SettingSpec`]
//! - Command registration and execution
//! - A queue of accepted cvar changes for the owner to route onward
//!
//! # Usage
//! ```ignore
//! let mut console = Console::new();
//! console.register_setting("corner_clip.y_down", &spec, CvarValue::Float(0.02));
//! console.exec("set corner_clip.y_down 0.03")?;
//! for (name, value) in console.drain_changes() { /* apply */ }
//! ```

use std::collections::HashMap;

use anyhow::{bail, Context};
use tracing::debug;

use crate::config::{SettingKind, SettingSpec};

/// Console variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum CvarValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl CvarValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CvarValue::Int(v) => Some(*v),
            CvarValue::Float(v) => Some(*v as i64),
            CvarValue::Bool(v) => Some(if *v { 1 } else { 0 }),
            CvarValue::String(s) => s.parse().ok(),
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            CvarValue::Float(v) => Some(*v),
            CvarValue::Int(v) => Some(*v as f64),
            CvarValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            CvarValue::Bool(v) => *v,
            CvarValue::Int(v) => *v != 0,
            CvarValue::Float(v) => *v != 0.0,
            CvarValue::String(s) => !s.is_empty() && s != "0" && s.to_lowercase() != "false",
        }
    }

    /// Parses console input: int, then float, then bool, then string.
    pub fn parse(s: &str) -> Self {
        if let Ok(v) = s.parse::<i64>() {
            CvarValue::Int(v)
        } else if let Ok(v) = s.parse::<f64>() {
            CvarValue::Float(v)
        } else if s == "true" {
            CvarValue::Bool(true)
        } else if s == "false" {
            CvarValue::Bool(false)
        } else {
            CvarValue::String(s.trim_matches('"').to_string())
        }
    }
}

impl std::fmt::Display for CvarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CvarValue::Int(v) => write!(f, "{}", v),
            CvarValue::Float(v) => write!(f, "{}", v),
            CvarValue::String(v) => write!(f, "\"{}\"", v),
            CvarValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Console variable metadata.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub value: CvarValue,
    pub default: CvarValue,
    pub description: String,
    pub flags: CvarFlags,
    /// Range and step enforced on `set`.
    pub spec: Option<SettingSpec>,
}

bitflags::bitflags! {
    /// Cvar flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        const NONE = 0;
        const ARCHIVE = 1 << 0;      // Saved to config
        const READ_ONLY = 1 << 1;    // Reported, never set from the console
        const CONTROLLER = 1 << 2;   // Routed to a controller on change
    }
}

impl Default for CvarFlags {
    fn default() -> Self {
        Self::NONE
    }
}

/// Command handler function type.
pub type CommandHandler =
    Box<dyn Fn(&[&str], &mut ConsoleContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Context passed to command handlers.
pub struct ConsoleContext<'a> {
    /// Output buffer for command responses.
    pub output: Vec<String>,
    /// Cvar registry, borrowed for the duration of the command.
    pub cvars: &'a mut HashMap<String, Cvar>,
    /// Cvars changed by this command, in order.
    pub changes: Vec<(String, CvarValue)>,
}

impl ConsoleContext<'_> {
    pub fn print(&mut self, msg: impl Into<String>) {
        self.output.push(msg.into());
    }

    pub fn get_cvar(&self, name: &str) -> Option<CvarValue> {
        self.cvars.get(name).map(|c| c.value.clone())
    }

    /// Validates and stores `value`, returning what was actually stored.
    pub fn set_cvar(&mut self, name: &str, value: CvarValue) -> anyhow::Result<CvarValue> {
        let stored = store_cvar(self.cvars, name, value)?;
        self.changes.push((name.to_string(), stored.clone()));
        Ok(stored)
    }
}

fn store_cvar(
    cvars: &mut HashMap<String, Cvar>,
    name: &str,
    value: CvarValue,
) -> anyhow::Result<CvarValue> {
    let Some(cvar) = cvars.get_mut(name) else {
        bail!("unknown cvar: {}", name);
    };
    if cvar.flags.contains(CvarFlags::READ_ONLY) {
        bail!("{} is read-only", name);
    }
    let value = match &cvar.spec {
        Some(spec) => spec.normalize(&value)?,
        None => value,
    };
    cvar.value = value.clone();
    debug!(cvar = name, %value, "Cvar set");
    Ok(value)
}

fn describe(cvar: &Cvar) -> String {
    match cvar.spec.map(|s| s.kind) {
        Some(SettingKind::Float { min, max, step }) => format!(
            "{}: {} [{}..{} step {}]",
            cvar.name, cvar.description, min, max, step
        ),
        Some(SettingKind::Int { min, max }) => {
            format!("{}: {} [{}..{}]", cvar.name, cvar.description, min, max)
        }
        _ => format!("{}: {}", cvar.name, cvar.description),
    }
}

/// The console.
pub struct Console {
    cvars: HashMap<String, Cvar>,
    commands: HashMap<String, CommandHandler>,
    changes: Vec<(String, CvarValue)>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        let mut console = Self {
            cvars: HashMap::new(),
            commands: HashMap::new(),
            changes: Vec::new(),
        };

        // Register built-in commands.
        console.register_builtin_commands();
        console
    }

    fn register_builtin_commands(&mut self) {
        // echo <text>
        self.register_command("echo", |args, ctx| {
            ctx.print(args.join(" "));
            Ok(())
        });

        // help [cvar]
        self.register_command("help", |args, ctx| {
            let Some(name) = args.first() else {
                ctx.print("Available commands: echo, help, cvarlist, set, reset");
                return Ok(());
            };
            let line = ctx
                .cvars
                .get(*name)
                .map(describe)
                .unwrap_or_else(|| format!("No help for '{}'", name));
            ctx.print(line);
            Ok(())
        });

        // cvarlist
        self.register_command("cvarlist", |_args, ctx| {
            let mut lines: Vec<String> = ctx
                .cvars
                .iter()
                .map(|(name, cvar)| format!("  {} = {} (default: {})", name, cvar.value, cvar.default))
                .collect();
            lines.sort();
            for line in lines {
                ctx.print(line);
            }
            Ok(())
        });

        // set <cvar> <value>
        self.register_command("set", |args, ctx| {
            if args.len() < 2 {
                bail!("usage: set <cvar> <value>");
            }
            let name = args[0];
            let value = CvarValue::parse(&args[1..].join(" "));
            let stored = ctx.set_cvar(name, value)?;
            ctx.print(format!("{} = {}", name, stored));
            Ok(())
        });

        // reset <cvar>
        self.register_command("reset", |args, ctx| {
            let Some(name) = args.first() else {
                bail!("usage: reset <cvar>");
            };
            let default = ctx
                .cvars
                .get(*name)
                .map(|c| c.default.clone())
                .with_context(|| format!("unknown cvar: {}", name))?;
            let stored = ctx.set_cvar(name, default)?;
            ctx.print(format!("{} = {}", name, stored));
            Ok(())
        });
    }

    /// Registers a console variable.
    pub fn register_cvar(&mut self, name: &str, default: CvarValue, description: &str, flags: CvarFlags) {
        self.insert_cvar(Cvar {
            name: name.to_string(),
            value: default.clone(),
            default,
            description: description.to_string(),
            flags,
            spec: None,
        });
    }

    /// Registers a cvar bounded by `spec`.
    pub fn register_setting(&mut self, name: &str, spec: &SettingSpec, value: CvarValue) {
        self.insert_cvar(Cvar {
            name: name.to_string(),
            value: value.clone(),
            default: value,
            description: spec.description.to_string(),
            flags: CvarFlags::CONTROLLER,
            spec: Some(*spec),
        });
    }

    fn insert_cvar(&mut self, cvar: Cvar) {
        self.cvars.insert(cvar.name.clone(), cvar);
    }

    /// Registers a command.
    pub fn register_command<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&[&str], &mut ConsoleContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.commands.insert(name.to_string(), Box::new(handler));
    }

    /// Executes a console command line.
    pub fn exec(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(Vec::new());
        }

        let tokens = parse_command_line(line);
        let Some((cmd_name, rest)) = tokens.split_first() else {
            return Ok(Vec::new());
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();

        // Bare cvar name: query, or set when followed by a value.
        if !self.commands.contains_key(cmd_name.as_str()) {
            if let Some(cvar) = self.cvars.get(cmd_name.as_str()) {
                if args.is_empty() {
                    return Ok(vec![format!(
                        "{} = {} (default: {})",
                        cvar.name, cvar.value, cvar.default
                    )]);
                }
                return self.exec(&format!("set {} {}", cmd_name, args.join(" ")));
            }
        }

        let Some(handler) = self.commands.get(cmd_name.as_str()) else {
            return Ok(vec![format!("Unknown command: {}", cmd_name)]);
        };
        let mut ctx = ConsoleContext {
            output: Vec::new(),
            cvars: &mut self.cvars,
            changes: Vec::new(),
        };
        let result = handler(&args, &mut ctx).with_context(|| format!("command '{}'", cmd_name));
        let ConsoleContext {
            output,
            mut changes,
            ..
        } = ctx;
        self.changes.append(&mut changes);
        result?;
        Ok(output)
    }

    /// Gets a cvar value.
    pub fn get_cvar(&self, name: &str) -> Option<CvarValue> {
        self.cvars.get(name).map(|c| c.value.clone())
    }

    /// Sets a cvar value, queueing the change like a console `set` would.
    pub fn set_cvar(&mut self, name: &str, value: CvarValue) -> anyhow::Result<CvarValue> {
        let stored = store_cvar(&mut self.cvars, name, value)?;
        self.changes.push((name.to_string(), stored.clone()));
        Ok(stored)
    }

    /// Takes every change accepted since the last call.
    pub fn drain_changes(&mut self) -> Vec<(String, CvarValue)> {
        std::mem::take(&mut self.changes)
    }
}

/// Parses a command line into tokens, respecting quotes.
fn parse_command_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
