use std::time::Duration;

use gaze_core::error::GazeError;
use gaze_core::mocks::{FailingSource, NoFeatures, ScriptedSource};
use gaze_core::{
    CalibrationError, DriftCfg, FilterCfg, FreezeReason, GazeFeature, Mode, Pipeline,
    ScreenPoint, ScreenSize, TrainOutcome, UntrainedFallback,
};
use gaze_traits::ManualClock;
use rstest::{fixture, rstest};

const TICK: Duration = Duration::from_millis(33);

struct Rig {
    clock: ManualClock,
    p: Pipeline,
}

impl Rig {
    fn feed(&mut self, f: Option<GazeFeature>) -> gaze_core::TickResult {
        self.clock.advance(TICK);
        self.p.process_feature(f)
    }
}

fn rig_with(filter: FilterCfg, fallback: UntrainedFallback) -> Rig {
    let clock = ManualClock::new();
    let p = Pipeline::builder()
        .with_source(NoFeatures)
        .with_screen(ScreenSize::new(1920, 1080))
        .with_filter(filter)
        .with_untrained_fallback(fallback)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("valid pipeline");
    Rig { clock, p }
}

#[fixture]
fn rig() -> Rig {
    rig_with(FilterCfg::default(), UntrainedFallback::Proportional)
}

fn centre() -> Option<GazeFeature> {
    Some(GazeFeature::new(0.5, 0.5))
}

#[rstest]
fn idle_maps_but_emits_nothing(mut rig: Rig) {
    assert_eq!(rig.p.mode(), Mode::Idle);
    let r = rig.feed(centre());
    assert!(r.face_ok && r.eye_ok);
    assert_eq!(r.raw_xy, Some(ScreenPoint::new(960, 540)));
    assert_eq!(r.predicted_xy, None);
    assert_eq!(r.frozen, None);
}

#[rstest]
fn tracking_emits_the_first_point_unfiltered(mut rig: Rig) {
    rig.p.start_tracking();
    let r = rig.feed(centre());
    assert_eq!(r.predicted_xy, Some(ScreenPoint::new(960, 540)));
}

#[rstest]
fn origin_fallback_pins_untrained_output() {
    let mut rig = rig_with(FilterCfg::default(), UntrainedFallback::Origin);
    rig.p.start_tracking();
    let r = rig.feed(centre());
    assert_eq!(r.predicted_xy, Some(ScreenPoint::new(0, 0)));
}

#[rstest]
fn absent_feature_short_circuits_and_freezes(mut rig: Rig) {
    rig.p.start_tracking();
    rig.feed(centre());
    let r = rig.feed(None);
    assert!(!r.face_ok);
    assert!(!r.eye_ok);
    assert_eq!(r.predicted_xy, None);
    assert_eq!(r.frozen, Some(FreezeReason::NoFeatures));
    assert!(rig.feed(centre()).predicted_xy.is_some());
}

#[rstest]
fn non_finite_feature_counts_as_no_eye(mut rig: Rig) {
    rig.p.start_tracking();
    let r = rig.feed(Some(GazeFeature::new(f64::NAN, 0.5)));
    assert!(!r.face_ok);
    assert!(!r.eye_ok);
    assert_eq!(r.raw_xy, None);
    assert_eq!(r.frozen, Some(FreezeReason::NoFeatures));
}

#[rstest]
fn deadzone_holds_sub_threshold_motion(mut rig: Rig) {
    rig.p.start_tracking();
    let first = rig.feed(centre()).predicted_xy;
    // ~0.8 px on screen: well inside the 1.5 px deadzone.
    let r = rig.feed(Some(GazeFeature::new(0.5004, 0.5)));
    assert_eq!(r.predicted_xy, first);
}

#[rstest]
fn deadzone_zero_follows_every_pixel() {
    let filter = FilterCfg {
        deadzone_px: 0.0,
        trend_jitter_px: 1e9,
        ..FilterCfg::default()
    };
    let mut rig = rig_with(filter, UntrainedFallback::Proportional);
    rig.p.start_tracking();
    rig.feed(centre());
    let mut last = None;
    for _ in 0..30 {
        last = rig.feed(Some(GazeFeature::new(0.6, 0.5))).predicted_xy;
    }
    assert_eq!(last, Some(ScreenPoint::new(1152, 540)));
}

#[rstest]
fn calibrating_returns_raw_points_and_skips_filters(mut rig: Rig) {
    rig.p.start_calibration();
    assert_eq!(rig.p.mode(), Mode::Calibrating);
    let a = rig.feed(centre());
    let b = rig.feed(Some(GazeFeature::new(0.9, 0.1)));
    assert_eq!(a.predicted_xy, a.raw_xy);
    assert_eq!(b.predicted_xy, Some(ScreenPoint::new(1728, 108)));
    assert_eq!(b.frozen, None);
}

#[rstest]
fn calibration_tick_outside_calibration_is_a_state_error(mut rig: Rig) {
    let err = rig.p.calibration_tick(ScreenPoint::new(0, 0)).unwrap_err();
    assert!(matches!(err.downcast_ref::<GazeError>(), Some(GazeError::State(_))));
}

#[rstest]
fn calibration_tick_records_samples_from_the_source() {
    let frames = vec![
        Some(GazeFeature::new(0.1, 0.1)),
        None,
        Some(GazeFeature::new(f64::NAN, 0.1)),
        Some(GazeFeature::new(0.2, 0.1)),
    ];
    let mut p = Pipeline::builder()
        .with_source(ScriptedSource::new(frames))
        .with_screen(ScreenSize::new(1920, 1080))
        .build()
        .unwrap();
    p.start_calibration();
    for _ in 0..4 {
        p.calibration_tick(ScreenPoint::new(100, 100)).unwrap();
    }
    assert_eq!(p.calibrator().sample_count(), 2);
    // Targets are clamped onto the screen before they are stored.
    p.calibration_tick(ScreenPoint::new(5000, -3)).unwrap();
    assert!(p.add_calibration_sample(GazeFeature::new(0.3, 0.3), ScreenPoint::new(5000, -3)));
    let last = p.calibrator().samples().last().copied().unwrap();
    assert_eq!(last.target, ScreenPoint::new(1919, 0));
}

#[rstest]
fn finishing_with_too_few_samples_reports_and_returns_to_idle(mut rig: Rig) {
    rig.p.start_calibration();
    rig.p
        .add_calibration_sample(GazeFeature::new(0.1, 0.1), ScreenPoint::new(10, 10));
    let summary = rig.p.finish_calibration().unwrap();
    assert_eq!(
        summary.outcome,
        TrainOutcome::InsufficientSamples { have: 1, need: 12 }
    );
    assert_eq!(summary.accuracy, None);
    assert_eq!(rig.p.mode(), Mode::Idle);
}

fn calibrate_linear(p: &mut Pipeline) {
    p.start_calibration();
    for i in 0..5 {
        for j in 0..5 {
            let nx = 0.1 + 0.2 * f64::from(i);
            let ny = 0.1 + 0.2 * f64::from(j);
            let t = ScreenPoint::new((nx * 1919.0) as i32, (ny * 1079.0) as i32);
            p.add_calibration_sample(GazeFeature::new(nx, ny), t);
        }
    }
}

#[rstest]
fn finishing_calibration_trains_and_reports_accuracy(mut rig: Rig) {
    calibrate_linear(&mut rig.p);
    let summary = rig.p.finish_calibration().unwrap();
    assert!(matches!(summary.outcome, TrainOutcome::Trained(_)));
    let acc = summary.accuracy.unwrap();
    assert_eq!(acc.count, 25);
    assert!(acc.mean_px < 40.0, "{acc:?}");
    assert!(rig.p.calibrator().is_trained());
}

#[rstest]
fn new_calibration_keeps_the_previous_model_until_trained(mut rig: Rig) {
    calibrate_linear(&mut rig.p);
    rig.p.finish_calibration().unwrap();
    rig.p.start_calibration();
    assert!(rig.p.calibrator().is_trained());
    assert_eq!(rig.p.calibrator().sample_count(), 0);
}

#[rstest]
fn reported_targets_drive_drift_and_stop_resets_it(mut rig: Rig) {
    rig.p.start_tracking();
    rig.feed(centre());
    // 440 px error against a 153.6 px threshold.
    rig.p.report_target(ScreenPoint::new(1400, 540));
    let (ox, oy) = rig.p.drift().offset();
    assert!(ox > 0.0);
    assert_eq!(oy, 0.0);
    rig.p.stop_tracking();
    assert_eq!(rig.p.drift().offset(), (0.0, 0.0));
    assert_eq!(rig.p.mode(), Mode::Idle);
}

#[rstest]
fn runaway_drift_freezes_output() {
    let clock = ManualClock::new();
    let mut p = Pipeline::builder()
        .with_source(NoFeatures)
        .with_screen(ScreenSize::new(1920, 1080))
        .with_drift(DriftCfg {
            learn_rate: 1.0,
            ..DriftCfg::default()
        })
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    p.start_tracking();
    clock.advance(TICK);
    p.process_feature(centre());
    p.report_target(ScreenPoint::new(1900, 540));
    clock.advance(TICK);
    let r = p.process_feature(centre());
    assert_eq!(r.predicted_xy, None);
    assert_eq!(r.frozen, Some(FreezeReason::DriftLimit));
}

#[rstest]
fn panic_holds_until_resume(mut rig: Rig) {
    rig.p.start_tracking();
    rig.feed(centre());
    rig.p.panic();
    assert_eq!(rig.feed(centre()).frozen, Some(FreezeReason::Panic));
    rig.p.resume();
    let r = rig.feed(centre());
    assert_eq!(r.frozen, None);
    assert!(r.predicted_xy.is_some());
}

#[rstest]
fn panic_survives_a_screen_change(mut rig: Rig) {
    rig.p.start_tracking();
    rig.feed(centre());
    rig.p.panic();
    rig.p.set_screen_size(ScreenSize::new(2560, 1440));
    let r = rig.feed(centre());
    assert_eq!(r.frozen, Some(FreezeReason::Panic));
    assert_eq!(r.predicted_xy, None);
    assert_eq!(r.raw_xy, Some(ScreenPoint::new(1280, 720)));
}

#[rstest]
fn panic_survives_starting_calibration(mut rig: Rig) {
    rig.p.start_tracking();
    rig.feed(centre());
    rig.p.panic();
    rig.p.start_calibration();
    assert_eq!(rig.p.failsafe().reason(), Some(FreezeReason::Panic));
    rig.p.resume();
    assert_eq!(rig.p.failsafe().reason(), None);
}

#[rstest]
fn source_errors_degrade_to_absence() {
    let mut p = Pipeline::builder()
        .with_source(FailingSource)
        .with_screen(ScreenSize::new(1920, 1080))
        .build()
        .unwrap();
    p.start_tracking();
    let r = p.tick();
    assert!(!r.face_ok);
    assert_eq!(r.frozen, Some(FreezeReason::NoFeatures));
}

#[rstest]
fn screen_change_rescales_the_fallback(mut rig: Rig) {
    rig.p.set_screen_size(ScreenSize::new(800, 600));
    let r = rig.feed(centre());
    assert_eq!(r.raw_xy, Some(ScreenPoint::new(400, 300)));
}

#[rstest]
fn failed_model_load_keeps_state(mut rig: Rig) {
    let dir = tempfile::tempdir().unwrap();
    let err = rig.p.load_model(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, CalibrationError::Io(_)));
    assert!(!rig.p.calibrator().is_trained());
    assert_eq!(
        rig.p.save_model(&dir.path().join("out.json")),
        Err(CalibrationError::NotTrained)
    );
}

#[rstest]
fn saved_model_loads_into_a_fresh_pipeline(mut rig: Rig) {
    calibrate_linear(&mut rig.p);
    rig.p.finish_calibration().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    rig.p.save_model(&path).unwrap();

    let mut other = rig_with(FilterCfg::default(), UntrainedFallback::Origin);
    other.p.load_model(&path).unwrap();
    let a = rig.feed(Some(GazeFeature::new(0.42, 0.61))).raw_xy;
    let b = other.feed(Some(GazeFeature::new(0.42, 0.61))).raw_xy;
    assert_eq!(a, b);
}
