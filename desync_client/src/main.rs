//! Sandbox binary.
//!
//! Usage:
//!   cargo run -p desync_client -- [--scenario burrow|clip|swim] [--ticks 60]
//!                                 [--config desync.json] [--addr 127.0.0.1:40000]
//!
//! Runs a scripted scenario through the module host at the configured tick
//! rate, honoring movement-rate requests. Outgoing packets are logged, or
//! forwarded as length-prefixed frames when `--addr` is given.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use desync_client::{
    boundary::{forward, ChannelBoundary},
    controllers::DEFAULT_TICK_MS,
    remote::TrackingBoundary,
    sandbox::Scenario,
};
use desync_shared::{
    config::DesyncConfig,
    net::{FramedConn, ServerboundMsg},
};
use tokio::sync::mpsc;
use tracing::{debug, info};

struct Args {
    scenario: String,
    ticks: u64,
    config: Option<String>,
    addr: Option<SocketAddr>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        scenario: "burrow".to_string(),
        ticks: 60,
        config: None,
        addr: None,
    };
    let argv: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--scenario" if i + 1 < argv.len() => {
                args.scenario = argv[i + 1].clone();
                i += 2;
            }
            "--ticks" if i + 1 < argv.len() => {
                args.ticks = argv[i + 1].parse().context("parse --ticks")?;
                i += 2;
            }
            "--config" if i + 1 < argv.len() => {
                args.config = Some(argv[i + 1].clone());
                i += 2;
            }
            "--addr" if i + 1 < argv.len() => {
                args.addr = Some(argv[i + 1].parse().context("parse --addr")?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(args)
}

fn load_config(path: Option<&str>) -> anyhow::Result<DesyncConfig> {
    let Some(path) = path else {
        return Ok(DesyncConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("read config {path}"))?;
    DesyncConfig::from_json_str(&text).with_context(|| format!("parse config {path}"))
}

async fn log_packets(mut rx: mpsc::UnboundedReceiver<ServerboundMsg>) -> anyhow::Result<u64> {
    let mut logged = 0;
    while let Some(msg) = rx.recv().await {
        debug!(?msg, "Outgoing");
        logged += 1;
    }
    Ok(logged)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    let cfg = load_config(args.config.as_deref())?;
    let mut scenario = Scenario::by_name(&args.scenario)?;

    let (boundary, rx) = ChannelBoundary::new();
    let writer = match args.addr {
        Some(addr) => {
            let mut conn = FramedConn::connect(addr).await?;
            info!(peer = %addr, "Forwarding packets");
            tokio::spawn(async move { forward(rx, &mut conn).await })
        }
        None => tokio::spawn(log_packets(rx)),
    };

    let mut host = scenario.build_host(&cfg, TrackingBoundary::new(boundary, 64))?;
    let base_ms = 1000.0 / cfg.tick_hz.max(1) as f32;
    info!(scenario = scenario.name, ticks = args.ticks, tick_hz = cfg.tick_hz, "Starting sandbox");

    for _ in 0..args.ticks {
        let report = scenario.step(&mut host);
        for toggle in host.drain_toggles() {
            info!(
                controller = toggle.name,
                enabled = toggle.enabled,
                reason = ?toggle.reason,
                tick = toggle.tick,
                "Controller toggled"
            );
        }
        let ms = base_ms * report.tick_length_ms / DEFAULT_TICK_MS;
        tokio::time::sleep(Duration::from_secs_f32(ms / 1000.0)).await;
    }

    let view = host.net().view();
    info!(
        position = ?scenario.player.position,
        reported = ?view.position(),
        desync = ?view.desync(scenario.player.position),
        lowest_reported_y = ?view.min_y(),
        "Scenario finished"
    );
    for line in host.exec_console("modules")? {
        info!("{line}");
    }

    let dropped = host.net().inner().dropped();
    drop(host);
    let sent = writer.await??;
    info!(sent, dropped, "Packet writer closed");
    Ok(())
}
