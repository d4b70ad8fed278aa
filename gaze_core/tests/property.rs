use std::sync::Arc;

use gaze_core::{
    CalibrationCfg, CalibrationMethod, Calibrator, FailsafeCfg, FailsafeManager, GazeFeature,
    LowPass2D, ScreenPoint, ScreenSize,
};
use gaze_traits::ManualClock;
use proptest::prelude::*;

fn trained(method: CalibrationMethod, screen: ScreenSize) -> Calibrator {
    let mut c = Calibrator::new(
        CalibrationCfg {
            method,
            mlp: gaze_core::MlpCfg {
                max_iter: 200,
                ..gaze_core::MlpCfg::default()
            },
            ..CalibrationCfg::default()
        },
        screen,
    );
    for i in 0..4 {
        for j in 0..4 {
            let nx = 0.2 + 0.2 * f64::from(i);
            let ny = 0.2 + 0.2 * f64::from(j);
            let t = ScreenPoint::new(
                (nx * f64::from(screen.width)) as i32,
                (ny * f64::from(screen.height)) as i32,
            );
            c.add_sample(GazeFeature::new(nx, ny), t);
        }
    }
    c.train().unwrap();
    c
}

fn any_coord() -> impl Strategy<Value = f64> {
    prop_oneof![
        -50.0f64..50.0,
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        Just(f64::MAX),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn poly2_predictions_stay_on_screen(
        nx in any_coord(),
        ny in any_coord(),
        w in 1u32..4000,
        h in 1u32..3000,
    ) {
        let screen = ScreenSize::new(w, h);
        let c = trained(CalibrationMethod::Poly2, screen);
        prop_assert!(screen.contains(c.predict(GazeFeature::new(nx, ny))));
    }

    #[test]
    fn mlp_predictions_stay_on_screen(nx in any_coord(), ny in any_coord()) {
        let screen = ScreenSize::new(1280, 720);
        let c = trained(CalibrationMethod::Mlp, screen);
        prop_assert!(screen.contains(c.predict(GazeFeature::new(nx, ny))));
    }

    #[test]
    fn failsafe_never_emits_without_features(
        points in proptest::collection::vec((-100i32..3000, -100i32..2000, any::<bool>()), 1..60),
    ) {
        let clock = ManualClock::new();
        let mut fs = FailsafeManager::with_clock(FailsafeCfg::default(), Arc::new(clock.clone()));
        let screen = ScreenSize::new(1920, 1080);
        for (x, y, present) in points {
            clock.advance(std::time::Duration::from_millis(20));
            let out = fs.process(Some(ScreenPoint::new(x, y)), present, screen, (0.0, 0.0));
            if !present {
                prop_assert_eq!(out, None);
            }
        }
    }

    #[test]
    fn lowpass_output_is_always_finite(
        xs in proptest::collection::vec(prop_oneof![-1e4f64..1e4, Just(f64::NAN)], 1..100),
    ) {
        let mut lp = LowPass2D::new(6.0, 30);
        for x in xs {
            if let Some((a, b)) = lp.apply(x, -x) {
                prop_assert!(a.is_finite() && b.is_finite());
            }
        }
    }

    #[test]
    fn clamp_is_total(x in any::<f64>(), y in any::<f64>(), w in 1u32..10_000, h in 1u32..10_000) {
        let s = ScreenSize::new(w, h);
        prop_assert!(s.contains(s.clamp_f64(x, y)));
    }
}
