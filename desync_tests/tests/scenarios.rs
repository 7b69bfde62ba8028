//! End-to-end controller scenarios driven through the module host.

use desync_client::{
    controllers::{BurrowPhase, ClipState},
    sandbox::Scenario,
    BurrowEscape, Controller, CornerClip, DisableReason, FluidLocomotion,
};
use desync_shared::{
    math::{BlockPos, Vec3},
    net::{ClientboundMsg, MoveUpdate, PositionCorrection, ServerboundMsg},
};
use desync_tests::{init_tracing, recording_host, run_ticks};

fn raw_ys(sent: &[ServerboundMsg]) -> Vec<f64> {
    sent.iter()
        .filter_map(|m| match m {
            ServerboundMsg::Position { position, .. } => Some(position.y),
            _ => None,
        })
        .collect()
}

#[test]
fn corner_clip_gives_up_after_six_clipped_ticks() -> anyhow::Result<()> {
    init_tracing();
    let mut scenario = Scenario::corner_clip();
    let mut host = recording_host(&scenario)?;
    host.drain_toggles();

    scenario.step(&mut host);
    let ys = raw_ys(host.net().sent());
    assert_eq!(ys.len(), 3);
    assert_eq!(ys[0], 10.0);
    assert!((ys[1] - 9.995).abs() < 1e-9);
    assert!((ys[2] - 9.98).abs() < 1e-9);

    run_ticks(&mut scenario, &mut host, 4);
    let clip = host
        .controller_as::<CornerClip>("corner_clip")
        .expect("registered");
    assert!(clip.is_enabled());
    assert_eq!(clip.state().clipped_ticks, 5);

    scenario.step(&mut host);
    let clip = host
        .controller_as::<CornerClip>("corner_clip")
        .expect("registered");
    assert!(!clip.is_enabled());
    assert_eq!(clip.disabled_by(), Some(DisableReason::ClipOverrun));
    assert_eq!(clip.state(), ClipState::default());

    let toggles = host.drain_toggles();
    assert_eq!(toggles.len(), 1);
    assert_eq!(toggles[0].reason, Some(DisableReason::ClipOverrun));
    assert_eq!(toggles[0].tick, 5);
    Ok(())
}

#[test]
fn burrow_nudges_up_until_server_confirms_climb() -> anyhow::Result<()> {
    init_tracing();
    let mut scenario = Scenario::burrow();
    let mut host = recording_host(&scenario)?;

    // Tick 0 samples the solid feet voxel and captures the anchor.
    let first = scenario.step(&mut host);
    assert!(first.vanilla_sent);
    let burrow = host.controller_as::<BurrowEscape>("burrow").expect("registered");
    assert_eq!(
        burrow.phase(),
        BurrowPhase::Burrowed {
            anchor: BlockPos::new(0, 4, 0),
            climbed_out: false
        }
    );

    host.net_mut().take();
    let second = scenario.step(&mut host);
    assert!(!second.vanilla_sent);
    let sent = host.net_mut().take();
    match &sent[..] {
        [ServerboundMsg::PlayerMove(MoveUpdate {
            position: Some(nudge),
            on_ground: Some(false),
            ..
        }), ServerboundMsg::Position {
            position: spoof,
            on_ground: true,
        }] => {
            assert!((nudge.y - 4.0622).abs() < 1e-9);
            assert!((spoof.y - (4.0 - 69420.0)).abs() < 1e-6);
        }
        other => panic!("unexpected packets {other:?}"),
    }

    assert!(!host.deliver(ClientboundMsg::CloseWindow { window_id: 3 }, &mut scenario.player));

    run_ticks(&mut scenario, &mut host, 8);
    assert_eq!(host.current_tick(), 10);

    let accepted = PositionCorrection::absolute(Vec3::new(0.5, 5.0, 0.5), 1);
    assert!(host.deliver(ClientboundMsg::PositionCorrection(accepted), &mut scenario.player));
    let burrow = host.controller_as::<BurrowEscape>("burrow").expect("registered");
    assert!(burrow.climbed_out());
    assert_eq!(scenario.player.position.y, 5.0);

    host.net_mut().take();
    let after = scenario.step(&mut host);
    assert!(after.vanilla_sent);
    assert_eq!(after.raw_sent, 0);
    let burrow = host.controller_as::<BurrowEscape>("burrow").expect("registered");
    assert_eq!(burrow.phase(), BurrowPhase::Free);
    assert!(burrow.is_enabled());
    Ok(())
}

#[test]
fn lava_jitter_follows_tick_parity() -> anyhow::Result<()> {
    init_tracing();
    let mut scenario = Scenario::swim();
    let mut host = recording_host(&scenario)?;

    for _ in 0..10 {
        scenario.step(&mut host);
        let expected = if scenario.player.ticks_existed % 2 == 0 {
            1e-8
        } else {
            -1e-8
        };
        assert!(
            (scenario.player.velocity.y - expected).abs() < 1e-20,
            "tick {} vy {}",
            scenario.player.ticks_existed,
            scenario.player.velocity.y
        );
        assert_eq!(host.tick_length_ms(), 50.0);
    }
    Ok(())
}

#[test]
fn swimming_moves_and_boosts_tick_rate() -> anyhow::Result<()> {
    init_tracing();
    let mut scenario = Scenario::swim();
    let mut host = recording_host(&scenario)?;
    let start = scenario.player.position;

    let reports = run_ticks(&mut scenario, &mut host, 30);
    assert!(reports[10..].iter().all(|r| r.tick_length_ms < 50.0));
    assert!(scenario.player.position.z - start.z > 2.0);
    assert!(scenario.player.position.y > start.y + 1.0);

    let fluid = host
        .controller_as::<FluidLocomotion>("fluid")
        .expect("registered");
    assert!((fluid.move_speed() - 3.8 / 20.0).abs() < 1e-9);

    // Sneaking from tick 30 sinks back toward the floor.
    let peak = scenario.player.position.y;
    run_ticks(&mut scenario, &mut host, 10);
    assert!(scenario.player.position.y < peak);
    Ok(())
}

#[test]
fn disabling_twice_equals_disabling_once() -> anyhow::Result<()> {
    init_tracing();
    for name in ["burrow", "clip", "swim"] {
        let mut scenario = Scenario::by_name(name)?;
        let mut host = recording_host(&scenario)?;
        run_ticks(&mut scenario, &mut host, 3);
        host.drain_toggles();

        let controller = scenario.controller;
        host.disable(controller)?;
        host.disable(controller)?;

        let toggles = host.drain_toggles();
        assert_eq!(toggles.len(), 1, "{name}: {toggles:?}");
        assert_eq!(toggles[0].reason, Some(DisableReason::User));
        let enabled = host.controller(controller).map(|c| c.is_enabled());
        assert_eq!(enabled, Some(false));

        host.net_mut().take();
        let report = scenario.step(&mut host);
        assert!(report.vanilla_sent, "{name}");
        assert_eq!(report.raw_sent, 0, "{name}");
    }
    Ok(())
}
