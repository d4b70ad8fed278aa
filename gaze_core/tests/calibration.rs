use gaze_core::{
    CalibrationCfg, CalibrationMethod, Calibrator, GazeFeature, ModelKind, OutlierPolicy,
    ScreenPoint, ScreenSize, TrainOutcome,
};
use rstest::{fixture, rstest};

const SCREEN: ScreenSize = ScreenSize {
    width: 1920,
    height: 1080,
};

fn target_for(nx: f64, ny: f64) -> ScreenPoint {
    ScreenPoint::new((nx * 1919.0).round() as i32, (ny * 1079.0).round() as i32)
}

/// `side x side` grid of features in [0.1, 0.9] mapped linearly to the screen.
fn grid(side: usize) -> Vec<(GazeFeature, ScreenPoint)> {
    let mut v = Vec::with_capacity(side * side);
    for i in 0..side {
        for j in 0..side {
            let nx = 0.1 + 0.8 * i as f64 / (side - 1) as f64;
            let ny = 0.1 + 0.8 * j as f64 / (side - 1) as f64;
            v.push((GazeFeature::new(nx, ny), target_for(nx, ny)));
        }
    }
    v
}

fn calibrator_with(cfg: CalibrationCfg, samples: &[(GazeFeature, ScreenPoint)]) -> Calibrator {
    let mut c = Calibrator::new(cfg, SCREEN);
    for (f, t) in samples {
        assert!(c.add_sample(*f, *t));
    }
    c
}

#[fixture]
fn trained() -> Calibrator {
    let mut c = calibrator_with(CalibrationCfg::default(), &grid(5));
    c.train().expect("train");
    c
}

#[rstest]
fn below_minimum_is_a_noop(trained: Calibrator) {
    let mut c = trained;
    let before = c.model().cloned();
    c.clear_samples();
    for (f, t) in grid(2) {
        c.add_sample(f, t);
    }
    let out = c.train().unwrap();
    assert_eq!(out, TrainOutcome::InsufficientSamples { have: 4, need: 12 });
    assert_eq!(c.model().cloned(), before);
}

#[rstest]
fn untrained_below_minimum_stays_untrained() {
    let mut c = calibrator_with(CalibrationCfg::default(), &grid(3));
    let out = c.train().unwrap();
    assert!(matches!(out, TrainOutcome::InsufficientSamples { have: 9, .. }));
    assert!(!c.is_trained());
    assert_eq!(c.predict(GazeFeature::new(0.5, 0.5)), ScreenPoint::new(0, 0));
}

#[rstest]
fn predictions_are_always_on_screen(trained: Calibrator) {
    for f in [
        GazeFeature::new(-5.0, -5.0),
        GazeFeature::new(12.0, 0.5),
        GazeFeature::new(0.5, 40.0),
        GazeFeature::new(f64::NAN, 0.5),
        GazeFeature::new(f64::INFINITY, f64::NEG_INFINITY),
    ] {
        assert!(SCREEN.contains(trained.predict(f)), "{f:?}");
    }
}

#[rstest]
fn linear_mapping_is_recovered(trained: Calibrator) {
    for (nx, ny) in [(0.3, 0.3), (0.5, 0.5), (0.7, 0.2)] {
        let p = trained.predict(GazeFeature::new(nx, ny));
        let t = target_for(nx, ny);
        assert!(p.distance(t) < 30.0, "predicted {p:?} expected {t:?}");
    }
}

fn grid_with_outliers() -> (Vec<(GazeFeature, ScreenPoint)>, Vec<usize>) {
    let mut s = grid(10);
    let bad = vec![3, 27, 58, 91];
    for &i in &bad {
        let (f, t) = s[i];
        let shifted = ScreenPoint::new((t.x + 350).min(1919), (t.y + 250).min(1079));
        s[i] = (f, shifted);
    }
    (s, bad)
}

#[rstest]
#[case::percentile(OutlierPolicy::Percentile { drop_percent: 15.0 })]
#[case::mad(OutlierPolicy::Mad { threshold: 3.5 })]
fn robust_refit_excludes_corrupted_samples(#[case] outlier: OutlierPolicy) {
    let (samples, bad) = grid_with_outliers();
    let cfg = CalibrationCfg {
        outlier,
        ..CalibrationCfg::default()
    };
    let mut c = calibrator_with(cfg, &samples);
    let TrainOutcome::Trained(report) = c.train().unwrap() else {
        panic!("expected a trained model");
    };
    assert_eq!(report.total, 100);
    assert!(report.inliers < 100);
    assert!(report.inliers >= 70, "safeguard violated: {}", report.inliers);

    let mask = c.last_inlier_mask();
    assert_eq!(mask.len(), 100);
    for &i in &bad {
        assert!(!mask[i], "sample {i} should be an outlier");
    }
    let p = c.predict(GazeFeature::new(0.5, 0.5));
    assert!(p.distance(target_for(0.5, 0.5)) < 30.0, "{p:?}");
}

#[rstest]
fn small_sets_skip_robust_refit() {
    let (mut samples, _) = grid_with_outliers();
    samples.truncate(30);
    let mut c = calibrator_with(CalibrationCfg::default(), &samples);
    let TrainOutcome::Trained(report) = c.train().unwrap() else {
        panic!("expected a trained model");
    };
    assert_eq!(report.inliers, 30);
    assert!(c.last_inlier_mask().iter().all(|&k| k));
}

#[rstest]
fn disabled_policy_keeps_every_sample() {
    let (samples, _) = grid_with_outliers();
    let cfg = CalibrationCfg {
        outlier: OutlierPolicy::Disabled,
        ..CalibrationCfg::default()
    };
    let mut c = calibrator_with(cfg, &samples);
    c.train().unwrap();
    assert!(c.last_inlier_mask().iter().all(|&k| k));
}

fn rmse_for(method: CalibrationMethod) -> (ModelKind, f64) {
    let cfg = CalibrationCfg {
        method,
        ..CalibrationCfg::default()
    };
    let mut c = calibrator_with(cfg, &grid(5));
    match c.train().unwrap() {
        TrainOutcome::Trained(r) => (r.method, r.rmse_px),
        other => panic!("unexpected {other:?}"),
    }
}

#[rstest]
fn auto_picks_the_lower_rmse_deterministically() {
    let (_, poly) = rmse_for(CalibrationMethod::Poly2);
    let (_, mlp) = rmse_for(CalibrationMethod::Mlp);
    let (picked, rmse) = rmse_for(CalibrationMethod::Auto);
    let expected = if mlp < poly { ModelKind::Mlp } else { ModelKind::Poly2 };
    assert_eq!(picked, expected);
    assert_eq!(rmse, poly.min(mlp));

    let (again, rmse_again) = rmse_for(CalibrationMethod::Auto);
    assert_eq!(again, picked);
    assert_eq!(rmse_again, rmse);
}

#[rstest]
fn mlp_method_trains_and_tags_the_model() {
    let cfg = CalibrationCfg {
        method: CalibrationMethod::Mlp,
        ..CalibrationCfg::default()
    };
    let mut c = calibrator_with(cfg, &grid(5));
    c.train().unwrap();
    assert_eq!(c.method(), Some(ModelKind::Mlp));
    let p = c.predict(GazeFeature::new(0.5, 0.5));
    assert!(p.distance(target_for(0.5, 0.5)) < 80.0, "{p:?}");
}

#[rstest]
fn reset_drops_model_and_samples(trained: Calibrator) {
    let mut c = trained;
    c.reset();
    assert!(!c.is_trained());
    assert_eq!(c.sample_count(), 0);
    assert!(c.last_inlier_mask().is_empty());
}

#[rstest]
fn screen_change_reclamps_predictions(trained: Calibrator) {
    let mut c = trained;
    let small = ScreenSize::new(800, 600);
    c.set_screen_size(small);
    let p = c.predict(GazeFeature::new(0.9, 0.9));
    assert!(small.contains(p));
    assert_eq!(p, ScreenPoint::new(799, 599));
}
