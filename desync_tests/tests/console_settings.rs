//! Console-driven controller configuration.

use desync_client::{boundary::RecordingBoundary, BurrowEscape, Controller, CornerClip, ModuleHost};
use desync_shared::{
    config::DesyncConfig,
    console::CvarValue,
    entity::PlayerState,
    math::{BlockPos, Vec3},
    world::{Block, GridWorld},
};
use desync_tests::init_tracing;

fn host() -> ModuleHost<RecordingBoundary> {
    ModuleHost::with_config(&DesyncConfig::default(), RecordingBoundary::new())
}

fn clip_timeout(host: &ModuleHost<RecordingBoundary>) -> f64 {
    host.controller_as::<CornerClip>("corner_clip")
        .map(|c| c.settings_ref().timeout_seconds)
        .unwrap_or_default()
}

#[test]
fn set_snaps_to_step_and_rejects_out_of_range() -> anyhow::Result<()> {
    init_tracing();
    let mut host = host();

    let out = host.exec_console("set corner_clip.timeout_seconds 2.04")?;
    assert_eq!(out, vec!["corner_clip.timeout_seconds = 2"]);
    assert_eq!(clip_timeout(&host), 2.0);

    assert!(host.exec_console("set corner_clip.timeout_seconds 9").is_err());
    assert!(host.exec_console("set corner_clip.timeout_seconds fast").is_err());
    assert_eq!(clip_timeout(&host), 2.0);

    host.exec_console("reset corner_clip.timeout_seconds")?;
    assert_eq!(clip_timeout(&host), 1.0);
    Ok(())
}

#[test]
fn help_and_cvarlist_describe_controller_settings() -> anyhow::Result<()> {
    init_tracing();
    let mut host = host();

    let help = host.exec_console("help fluid.jitter")?;
    assert_eq!(help, vec!["fluid.jitter: Idle vertical jitter exponent [1..20]"]);

    let list = host.exec_console("cvarlist")?;
    for key in ["burrow.nudge_step", "corner_clip.y_down", "fluid.lava_down_speed"] {
        assert!(list.iter().any(|l| l.contains(key)), "{key} missing");
    }
    Ok(())
}

#[test]
fn programmatic_setting_goes_through_validation() -> anyhow::Result<()> {
    init_tracing();
    let mut host = host();

    let stored = host.set_setting("burrow.nudge_step", CvarValue::Float(0.05))?;
    assert_eq!(stored, CvarValue::Float(0.05));
    let burrow = host.controller_as::<BurrowEscape>("burrow").expect("registered");
    assert_eq!(burrow.settings_ref().nudge_step, 0.05);

    assert!(host.set_setting("burrow.nudge_step", CvarValue::Float(5.0)).is_err());
    assert!(host.set_setting("burrow.no_such_key", CvarValue::Int(1)).is_err());
    Ok(())
}

#[test]
fn auto_enable_in_hole_after_configured_delay() -> anyhow::Result<()> {
    init_tracing();
    let mut world = GridWorld::new();
    let feet = BlockPos::new(0, 5, 0);
    world.fill(feet.offset(-1, -1, -1), feet.offset(1, -1, 1), Block::Solid);
    for side in [
        feet.offset(1, 0, 0),
        feet.offset(-1, 0, 0),
        feet.offset(0, 0, 1),
        feet.offset(0, 0, -1),
    ] {
        world.set_solid(side);
    }
    let mut player = PlayerState::at(Vec3::new(0.5, 5.0, 0.5));
    player.on_ground = true;

    let mut host = host();
    host.exec_console("corner_clip.auto_enable_in_hole true")?;
    host.exec_console("set corner_clip.enable_seconds 1")?;

    for _ in 0..20 {
        host.tick(&mut player, &world);
    }
    assert!(!host.controller("corner_clip").expect("registered").is_enabled());

    host.tick(&mut player, &world);
    assert!(host.controller("corner_clip").expect("registered").is_enabled());

    let toggles = host.drain_toggles();
    assert_eq!(toggles.len(), 1);
    assert!(toggles[0].enabled);
    assert_eq!(toggles[0].tick, 20);
    Ok(())
}
