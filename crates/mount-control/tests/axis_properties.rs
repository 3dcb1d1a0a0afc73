//! Randomised command sequences against a single axis

use mount_control::{AxisController, AxisKind, MountConfig, SimulatedActuator};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Target(f64),
    Speed(f64),
    Tick,
    Stop,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-720.0f64..720.0).prop_map(Op::Target),
        Just(Op::Target(f64::NAN)),
        (-1.0f64..10.0).prop_map(Op::Speed),
        Just(Op::Tick),
        Just(Op::Tick),
        Just(Op::Tick),
        Just(Op::Stop),
    ]
}

fn controller(kind: AxisKind) -> AxisController {
    let config = MountConfig::default().axis_config(kind);
    AxisController::new(config, Box::new(SimulatedActuator::new()))
}

fn apply(axis: &AxisController, op: &Op) {
    match *op {
        Op::Target(angle) => {
            axis.set_target(angle);
        }
        Op::Speed(speed) => {
            axis.set_speed(speed);
        }
        Op::Tick => {
            axis.tick();
        }
        Op::Stop => axis.stop(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn altitude_never_leaves_its_range(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let axis = controller(AxisKind::Altitude);
        for op in &ops {
            apply(&axis, op);
            let state = axis.state();
            prop_assert!((0.0..=90.0).contains(&state.current), "current {}", state.current);
            prop_assert!((0.0..=90.0).contains(&state.target), "target {}", state.target);
        }
    }

    #[test]
    fn azimuth_stays_wrapped(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let axis = controller(AxisKind::Azimuth);
        for op in &ops {
            apply(&axis, op);
            let state = axis.state();
            prop_assert!(state.current >= 0.0 && state.current < 360.0);
            prop_assert!(state.target >= 0.0 && state.target < 360.0);
        }
    }

    #[test]
    fn double_stop_equals_single_stop(ops in prop::collection::vec(op_strategy(), 0..50)) {
        let axis = controller(AxisKind::Azimuth);
        for op in &ops {
            apply(&axis, op);
        }
        axis.stop();
        let once = axis.state();
        axis.stop();
        prop_assert_eq!(axis.state(), once);
    }

    #[test]
    fn azimuth_steps_never_exceed_speed(target in 0.0f64..360.0, start in 0.0f64..360.0) {
        let config = MountConfig::default().axis_config(AxisKind::Azimuth);
        let axis = AxisController::with_position(config, Box::new(SimulatedActuator::new()), start);
        axis.set_speed(5.0);
        axis.set_target(target);
        for _ in 0..40 {
            let before = axis.state().current;
            axis.tick();
            let after = axis.state().current;
            let moved = mount_control::AxisDomain::Wrapping { period: 360.0 }
                .delta(before, after)
                .unwrap()
                .abs();
            prop_assert!(moved <= 5.0 + 1e-9);
        }
        prop_assert!(axis.is_settled());
    }
}
