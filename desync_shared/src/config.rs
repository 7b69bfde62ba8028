//! Configuration system.
//!
//! Loads controller settings from JSON strings (file IO left to app). Every
//! runtime-adjustable value is described by a [`SettingSpec`] carrying its
//! valid range and step, and is changed through the owning settings struct's
//! `apply` method.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::console::CvarValue;

/// Shape and bounds of one adjustable setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingKind {
    Float { min: f64, max: f64, step: f64 },
    Int { min: i64, max: i64 },
    Bool,
}

/// Declared metadata for a named setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingSpec {
    pub key: &'static str,
    pub kind: SettingKind,
    pub description: &'static str,
}

impl SettingSpec {
    const fn float(key: &'static str, min: f64, max: f64, step: f64, description: &'static str) -> Self {
        Self {
            key,
            kind: SettingKind::Float { min, max, step },
            description,
        }
    }

    const fn int(key: &'static str, min: i64, max: i64, description: &'static str) -> Self {
        Self {
            key,
            kind: SettingKind::Int { min, max },
            description,
        }
    }

    const fn boolean(key: &'static str, description: &'static str) -> Self {
        Self {
            key,
            kind: SettingKind::Bool,
            description,
        }
    }

    /// Checks `value` against the declared range and snaps floats to the step.
    pub fn normalize(&self, value: &CvarValue) -> anyhow::Result<CvarValue> {
        match self.kind {
            SettingKind::Float { min, max, step } => {
                let v = value
                    .as_float()
                    .with_context(|| format!("{} expects a number, got {value}", self.key))?;
                if !v.is_finite() || v < min || v > max {
                    bail!("{} = {v} outside {min}..={max}", self.key);
                }
                Ok(CvarValue::Float(snap_to_step(v, min, max, step)))
            }
            SettingKind::Int { min, max } => {
                let v = match value {
                    CvarValue::Int(v) => *v,
                    other => bail!("{} expects an integer, got {other}", self.key),
                };
                if v < min || v > max {
                    bail!("{} = {v} outside {min}..={max}", self.key);
                }
                Ok(CvarValue::Int(v))
            }
            SettingKind::Bool => match value {
                CvarValue::Bool(b) => Ok(CvarValue::Bool(*b)),
                CvarValue::Int(0) => Ok(CvarValue::Bool(false)),
                CvarValue::Int(1) => Ok(CvarValue::Bool(true)),
                other => bail!("{} expects true/false, got {other}", self.key),
            },
        }
    }
}

/// Rounds `v` onto the `min + k * step` grid, trimming float noise to the
/// step's decimal places.
fn snap_to_step(v: f64, min: f64, max: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return v;
    }
    let snapped = (min + ((v - min) / step).round() * step).min(max);
    let scale = 10f64.powi((-step.log10()).ceil().max(0.0) as i32);
    (snapped * scale).round() / scale
}

fn find_spec<'a>(specs: &'a [SettingSpec], key: &str) -> anyhow::Result<&'a SettingSpec> {
    specs
        .iter()
        .find(|s| s.key == key)
        .with_context(|| format!("unknown setting: {key}"))
}

/// Resolves `key` and returns the normalized value.
fn normalized(specs: &[SettingSpec], key: &str, value: &CvarValue) -> anyhow::Result<CvarValue> {
    find_spec(specs, key)?.normalize(value)
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesyncConfig {
    /// Host simulation rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    #[serde(default)]
    pub burrow: BurrowSettings,
    #[serde(default)]
    pub corner_clip: CornerClipSettings,
    #[serde(default)]
    pub fluid: FluidSettings,
}

fn default_tick_hz() -> u32 {
    20
}

impl Default for DesyncConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            burrow: BurrowSettings::default(),
            corner_clip: CornerClipSettings::default(),
            fluid: FluidSettings::default(),
        }
    }
}

impl DesyncConfig {
    /// Parses config from JSON and checks every setting against its spec.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: Self = serde_json::from_str(s).context("parse config json")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Normalizes every section in place, failing on the first value outside
    /// its declared range.
    pub fn validate(&mut self) -> anyhow::Result<()> {
        if self.tick_hz == 0 {
            bail!("tick_hz must be positive");
        }
        self.burrow.validate().context("burrow")?;
        self.corner_clip.validate().context("corner_clip")?;
        self.fluid.validate().context("fluid")?;
        Ok(())
    }
}

/// Tuning for the burrow escape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurrowSettings {
    /// Vertical distance of each fabricated nudge.
    pub nudge_step: f64,
    /// How close to the anchor the body must be before nudging upward.
    pub anchor_epsilon: f64,
    /// Depth of the spoofed position sent after each movement packet.
    pub spoof_offset: f64,
}

impl Default for BurrowSettings {
    fn default() -> Self {
        Self {
            nudge_step: 0.0622,
            anchor_epsilon: 0.1,
            spoof_offset: 69420.0,
        }
    }
}

impl BurrowSettings {
    pub const SPECS: &'static [SettingSpec] = &[
        SettingSpec::float("nudge_step", 0.001, 1.0, 0.0001, "Vertical nudge per packet"),
        SettingSpec::float("anchor_epsilon", 0.01, 1.0, 0.01, "Distance to anchor that allows nudging up"),
        SettingSpec::float("spoof_offset", 1.0, 100000.0, 1.0, "Depth of the spoofed position"),
    ];

    pub fn get(&self, key: &str) -> Option<CvarValue> {
        let v = match key {
            "nudge_step" => self.nudge_step,
            "anchor_epsilon" => self.anchor_epsilon,
            "spoof_offset" => self.spoof_offset,
            _ => return None,
        };
        Some(CvarValue::Float(v))
    }

    pub fn apply(&mut self, key: &str, value: &CvarValue) -> anyhow::Result<()> {
        let v = normalized(Self::SPECS, key, value)?.as_float().unwrap_or_default();
        match key {
            "nudge_step" => self.nudge_step = v,
            "anchor_epsilon" => self.anchor_epsilon = v,
            "spoof_offset" => self.spoof_offset = v,
            _ => bail!("unknown setting: {key}"),
        }
        Ok(())
    }

    /// Runs every field back through [`Self::apply`].
    pub fn validate(&mut self) -> anyhow::Result<()> {
        for spec in Self::SPECS {
            if let Some(value) = self.get(spec.key) {
                self.apply(spec.key, &value)?;
            }
        }
        Ok(())
    }
}

/// Tuning for the corner clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerClipSettings {
    /// Total downward offset of the wedge sequence.
    pub y_down: f64,
    pub auto_enable_in_hole: bool,
    pub enable_seconds: f64,
    pub retry_timeout_seconds: f64,
    pub timeout_seconds: f64,
}

impl Default for CornerClipSettings {
    fn default() -> Self {
        Self {
            y_down: 0.02,
            auto_enable_in_hole: false,
            enable_seconds: 2.0,
            retry_timeout_seconds: 0.2,
            timeout_seconds: 1.0,
        }
    }
}

impl CornerClipSettings {
    pub const SPECS: &'static [SettingSpec] = &[
        SettingSpec::float("y_down", 0.0, 1.0, 0.001, "Downward offset of the wedge sequence"),
        SettingSpec::boolean("auto_enable_in_hole", "Enable automatically while standing in a hole"),
        SettingSpec::float("enable_seconds", 0.1, 5.0, 0.1, "Time in a hole before auto enabling"),
        SettingSpec::float("retry_timeout_seconds", 0.1, 5.0, 0.1, "Cooldown between wedge attempts"),
        SettingSpec::float("timeout_seconds", 0.1, 5.0, 0.1, "Give up after this long"),
    ];

    pub fn get(&self, key: &str) -> Option<CvarValue> {
        Some(match key {
            "y_down" => CvarValue::Float(self.y_down),
            "auto_enable_in_hole" => CvarValue::Bool(self.auto_enable_in_hole),
            "enable_seconds" => CvarValue::Float(self.enable_seconds),
            "retry_timeout_seconds" => CvarValue::Float(self.retry_timeout_seconds),
            "timeout_seconds" => CvarValue::Float(self.timeout_seconds),
            _ => return None,
        })
    }

    pub fn apply(&mut self, key: &str, value: &CvarValue) -> anyhow::Result<()> {
        let value = normalized(Self::SPECS, key, value)?;
        let v = value.as_float().unwrap_or_default();
        match key {
            "y_down" => self.y_down = v,
            "auto_enable_in_hole" => self.auto_enable_in_hole = value.as_bool(),
            "enable_seconds" => self.enable_seconds = v,
            "retry_timeout_seconds" => self.retry_timeout_seconds = v,
            "timeout_seconds" => self.timeout_seconds = v,
            _ => bail!("unknown setting: {key}"),
        }
        Ok(())
    }

    pub fn validate(&mut self) -> anyhow::Result<()> {
        for spec in Self::SPECS {
            if let Some(value) = self.get(spec.key) {
                self.apply(spec.key, &value)?;
            }
        }
        Ok(())
    }
}

/// Acceleration profile for one fluid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluidProfile {
    pub enabled: bool,
    /// Multiplicative horizontal ramp per tick.
    pub h_boost: f64,
    /// Horizontal terminal speed in blocks per second.
    pub h_speed: f64,
    /// Vertical acceleration in blocks per second per tick.
    pub v_boost: f64,
    /// Upward terminal speed in blocks per second.
    pub up_speed: f64,
    /// Downward terminal speed in blocks per second.
    pub down_speed: f64,
}

/// Tuning for fluid locomotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidSettings {
    pub water: FluidProfile,
    pub lava: FluidProfile,
    /// Exponent of the idle vertical jitter, `0.1^jitter`.
    pub jitter: i64,
    /// Movement-rate boost requested while any input is held.
    pub timer_boost: f64,
}

impl Default for FluidSettings {
    fn default() -> Self {
        Self {
            water: FluidProfile {
                enabled: true,
                h_boost: 6.0,
                h_speed: 5.75,
                v_boost: 2.9,
                up_speed: 2.69,
                // 0.8 blocks per tick.
                down_speed: 0.8 * 20.0,
            },
            lava: FluidProfile {
                enabled: true,
                h_boost: 4.0,
                h_speed: 3.8,
                v_boost: 2.0,
                up_speed: 2.69,
                down_speed: 4.22,
            },
            jitter: 8,
            timer_boost: 1.09,
        }
    }
}

impl FluidSettings {
    pub const SPECS: &'static [SettingSpec] = &[
        SettingSpec::boolean("water", "Swim in water"),
        SettingSpec::float("water_h_boost", 1.0, 8.0, 0.1, "Water horizontal ramp"),
        SettingSpec::float("water_h_speed", 0.01, 8.0, 0.01, "Water horizontal speed"),
        SettingSpec::float("water_v_boost", 0.1, 8.0, 0.1, "Water vertical acceleration"),
        SettingSpec::float("water_up_speed", 0.01, 8.0, 0.01, "Water upward speed"),
        SettingSpec::float("water_down_speed", 0.2, 40.0, 0.2, "Water downward speed"),
        SettingSpec::boolean("lava", "Swim in lava"),
        SettingSpec::float("lava_h_boost", 1.0, 8.0, 0.1, "Lava horizontal ramp"),
        SettingSpec::float("lava_h_speed", 0.01, 8.0, 0.01, "Lava horizontal speed"),
        SettingSpec::float("lava_v_boost", 0.1, 8.0, 0.1, "Lava vertical acceleration"),
        SettingSpec::float("lava_up_speed", 0.01, 8.0, 0.01, "Lava upward speed"),
        SettingSpec::float("lava_down_speed", 0.01, 8.0, 0.01, "Lava downward speed"),
        SettingSpec::int("jitter", 1, 20, "Idle vertical jitter exponent"),
        SettingSpec::float("timer_boost", 1.0, 1.5, 0.01, "Movement-rate boost while moving"),
    ];

    fn split_key(key: &str) -> Option<(&str, &str)> {
        key.split_once('_')
            .filter(|(fluid, _)| matches!(*fluid, "water" | "lava"))
    }

    fn profile(&self, fluid: &str) -> &FluidProfile {
        if fluid == "water" {
            &self.water
        } else {
            &self.lava
        }
    }

    fn profile_mut(&mut self, fluid: &str) -> &mut FluidProfile {
        if fluid == "water" {
            &mut self.water
        } else {
            &mut self.lava
        }
    }

    pub fn get(&self, key: &str) -> Option<CvarValue> {
        match key {
            "water" => return Some(CvarValue::Bool(self.water.enabled)),
            "lava" => return Some(CvarValue::Bool(self.lava.enabled)),
            "jitter" => return Some(CvarValue::Int(self.jitter)),
            "timer_boost" => return Some(CvarValue::Float(self.timer_boost)),
            _ => {}
        }
        let (fluid, field) = Self::split_key(key)?;
        let p = self.profile(fluid);
        let v = match field {
            "h_boost" => p.h_boost,
            "h_speed" => p.h_speed,
            "v_boost" => p.v_boost,
            "up_speed" => p.up_speed,
            "down_speed" => p.down_speed,
            _ => return None,
        };
        Some(CvarValue::Float(v))
    }

    pub fn apply(&mut self, key: &str, value: &CvarValue) -> anyhow::Result<()> {
        let value = normalized(Self::SPECS, key, value)?;
        match key {
            "water" => self.water.enabled = value.as_bool(),
            "lava" => self.lava.enabled = value.as_bool(),
            "jitter" => self.jitter = value.as_int().unwrap_or(self.jitter),
            "timer_boost" => self.timer_boost = value.as_float().unwrap_or(self.timer_boost),
            _ => {
                let (fluid, field) = Self::split_key(key)
                    .with_context(|| format!("unknown setting: {key}"))?;
                let v = value.as_float().unwrap_or_default();
                let p = self.profile_mut(fluid);
                match field {
                    "h_boost" => p.h_boost = v,
                    "h_speed" => p.h_speed = v,
                    "v_boost" => p.v_boost = v,
                    "up_speed" => p.up_speed = v,
                    "down_speed" => p.down_speed = v,
                    _ => bail!("unknown setting: {key}"),
                }
            }
        }
        Ok(())
    }

    pub fn validate(&mut self) -> anyhow::Result<()> {
        for spec in Self::SPECS {
            if let Some(value) = self.get(spec.key) {
                self.apply(spec.key, &value)?;
            }
        }
        Ok(())
    }
}
