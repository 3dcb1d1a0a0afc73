//! End-to-end runs of the spawned mount on a paused clock

use std::sync::Arc;
use std::time::Duration;

use mount_control::events::MemorySink;
use mount_control::{
    AxisKind, AxisMode, Command, CommandOutcome, EventKind, Mount, MountConfig, MountError,
    MountHandle, SimulatedActuator, Target, TrackingMode,
};

fn spawn_with(alt: SimulatedActuator) -> (MountHandle, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new(1_000));
    let mount = Mount::new(
        MountConfig::default(),
        Box::new(alt),
        Box::new(SimulatedActuator::new()),
        sink.clone(),
    )
    .unwrap();
    (mount.spawn(), sink)
}

fn spawn() -> (MountHandle, Arc<MemorySink>) {
    spawn_with(SimulatedActuator::new())
}

fn manual(altitude: f64, azimuth: f64) -> Target {
    Target::Manual { altitude, azimuth }
}

#[tokio::test(start_paused = true)]
async fn slew_runs_to_completion() {
    let (mount, sink) = spawn();

    let outcome = mount
        .execute(Command::SlewTo {
            target: manual(20.0, 30.0),
        })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CommandOutcome::Mode {
            mode: TrackingMode::Slewing
        }
    );

    // 30° at 0.5°/tick and 50 ms/tick is 3 s
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = mount.snapshot();
    assert_eq!(snapshot.mode, TrackingMode::Idle);
    assert_eq!(snapshot.altitude.current, 20.0);
    assert_eq!(snapshot.azimuth.current, 30.0);
    assert_eq!(snapshot.azimuth.mode, AxisMode::Idle);

    let kinds: Vec<_> = sink.recent(10).into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::SlewStart, EventKind::SlewComplete]);

    mount.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn emergency_stop_halts_both_axes() {
    let (mount, _) = spawn();
    mount
        .execute(Command::SlewTo {
            target: manual(80.0, 180.0),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(mount.emergency_stop(), TrackingMode::Stopped);
    let halted = mount.snapshot();
    assert!(halted.altitude.current > 0.0 && halted.altitude.current < 80.0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let later = mount.snapshot();
    assert_eq!(later.altitude.current, halted.altitude.current);
    assert_eq!(later.azimuth.current, halted.azimuth.current);
    assert_eq!(later.mode, TrackingMode::Stopped);

    mount.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sun_interlock_through_command_queue() {
    let (mount, sink) = spawn();

    let err = mount
        .execute(Command::StartTracking {
            target: Target::Sun,
        })
        .await
        .unwrap_err();
    assert_eq!(err, MountError::SafetyInterlock);
    assert_eq!(mount.coordinator().mode(), TrackingMode::Idle);

    mount
        .execute(Command::ConfirmSafety { confirmed: true })
        .await
        .unwrap();
    mount
        .execute(Command::StartTracking {
            target: Target::Sun,
        })
        .await
        .unwrap();
    assert_eq!(mount.coordinator().mode(), TrackingMode::Tracking);

    tokio::time::sleep(Duration::from_millis(500)).await;
    mount
        .execute(Command::ConfirmSafety { confirmed: false })
        .await
        .unwrap();
    assert_eq!(mount.coordinator().mode(), TrackingMode::Stopped);

    let stop = sink
        .recent(100)
        .into_iter()
        .rev()
        .find(|e| e.kind == EventKind::TrackStop)
        .unwrap();
    assert_eq!(stop.notes, "safety revoked");

    // Nothing moves after the revoke, even across tracking ticks
    let halted = mount.snapshot();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(mount.snapshot().altitude.current, halted.altitude.current);
    assert_eq!(mount.snapshot().azimuth.current, halted.azimuth.current);

    mount.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn actuator_failure_faults_the_mount() {
    let alt = SimulatedActuator::new();
    let (mount, sink) = spawn_with(alt.clone());
    let mut modes = mount.subscribe_mode();

    alt.set_failing(true);
    mount
        .execute(Command::SlewTo {
            target: manual(45.0, 90.0),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(*modes.borrow_and_update(), TrackingMode::Fault);
    let snapshot = mount.snapshot();
    assert_eq!(snapshot.altitude.mode, AxisMode::Fault);
    assert!(snapshot.fault_reason.is_some());
    assert!(sink.recent(100).iter().any(|e| e.kind == EventKind::Fault));

    // Azimuth was stopped with the fault
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(mount.snapshot().azimuth.current, snapshot.azimuth.current);

    let err = mount
        .execute(Command::SlewTo {
            target: manual(10.0, 10.0),
        })
        .await
        .unwrap_err();
    assert_eq!(err, MountError::Faulted);

    alt.set_failing(false);
    mount.execute(Command::Reset).await.unwrap();
    assert_eq!(mount.coordinator().mode(), TrackingMode::Idle);
    assert_eq!(
        mount.coordinator().axis(AxisKind::Altitude).state().mode,
        AxisMode::Idle
    );

    mount.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fire_and_forget_commands() {
    let (mount, _) = spawn();
    mount
        .send(Command::SetTarget {
            axis: AxisKind::Altitude,
            angle: 95.0,
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        mount.coordinator().axis(AxisKind::Altitude).state().target,
        90.0
    );
    mount.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commands_fail_after_shutdown() {
    let (mount, _) = spawn();
    mount.shutdown().await;

    let err = mount.execute(Command::StopTracking).await.unwrap_err();
    assert_eq!(err, MountError::RuntimeClosed);
    assert_eq!(
        mount.send(Command::Reset).unwrap_err(),
        MountError::RuntimeClosed
    );
}
