use gaze_core::{
    CalibrationCfg, CalibrationError, CalibrationMethod, Calibrator, GazeFeature, ScreenPoint,
    ScreenSize,
};
use rstest::rstest;
use tempfile::tempdir;

fn trained(method: CalibrationMethod) -> Calibrator {
    let mut c = Calibrator::new(
        CalibrationCfg {
            method,
            ..CalibrationCfg::default()
        },
        ScreenSize::new(1920, 1080),
    );
    for i in 0..5 {
        for j in 0..5 {
            let nx = 0.2 + 0.15 * f64::from(i);
            let ny = 0.2 + 0.15 * f64::from(j);
            let t = ScreenPoint::new(
                (nx * 1919.0 + 30.0 * nx * nx) as i32,
                (ny * 1079.0) as i32,
            );
            c.add_sample(GazeFeature::new(nx, ny), t);
        }
    }
    c.train().unwrap();
    c
}

const PROBES: [(f64, f64); 4] = [(0.25, 0.25), (0.5, 0.6), (0.8, 0.3), (0.05, 0.95)];

#[rstest]
#[case::poly2(CalibrationMethod::Poly2)]
#[case::mlp(CalibrationMethod::Mlp)]
fn round_trip_reproduces_predictions(#[case] method: CalibrationMethod) {
    let c = trained(method);
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    c.save(&path).unwrap();

    let mut restored = Calibrator::new(CalibrationCfg::default(), ScreenSize::new(1920, 1080));
    restored.load(&path).unwrap();
    assert_eq!(restored.method(), c.method());
    for (nx, ny) in PROBES {
        let f = GazeFeature::new(nx, ny);
        let (ax, ay) = c.predict_raw(f).unwrap();
        let (bx, by) = restored.predict_raw(f).unwrap();
        assert!((ax - bx).abs() < 1e-6 && (ay - by).abs() < 1e-6);
        assert_eq!(c.predict(f), restored.predict(f));
    }
}

#[rstest]
fn save_leaves_no_temp_file_behind() {
    let c = trained(CalibrationMethod::Poly2);
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    c.save(&path).unwrap();
    c.save(&path).unwrap();
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("model.json")]);
}

#[rstest]
fn record_is_versioned_json() {
    let c = trained(CalibrationMethod::Poly2);
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    c.save(&path).unwrap();
    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(v["format_version"], 1);
    assert_eq!(v["method"], "poly2");
    assert_eq!(v["x"]["kind"], "poly2");
    assert_eq!(v["hyper"]["ridge_alpha"], 1.0);
    assert_eq!(v["x"]["coef"].as_array().map(Vec::len), Some(5));
}

#[rstest]
fn failed_loads_keep_the_current_model() {
    let mut c = trained(CalibrationMethod::Poly2);
    let before = c.model().cloned();
    let dir = tempdir().unwrap();

    let missing = dir.path().join("absent.json");
    assert!(matches!(c.load(&missing), Err(CalibrationError::Io(_))));

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, b"{ \"format_version\": 1, \"method\": ").unwrap();
    assert!(matches!(c.load(&corrupt), Err(CalibrationError::Parse(_))));

    let future = dir.path().join("future.json");
    std::fs::write(&future, br#"{ "format_version": 7 }"#).unwrap();
    assert_eq!(
        c.load(&future),
        Err(CalibrationError::VersionMismatch {
            found: 7,
            expected: 1
        })
    );

    assert_eq!(c.model().cloned(), before);
}

#[rstest]
fn mismatched_method_tag_is_invalid() {
    let c = trained(CalibrationMethod::Poly2);
    let json = c.model().unwrap().to_json().unwrap();
    let tampered = json.replacen("\"method\": \"poly2\"", "\"method\": \"mlp\"", 1);
    assert_ne!(json, tampered);

    let dir = tempdir().unwrap();
    let path = dir.path().join("tampered.json");
    std::fs::write(&path, tampered).unwrap();
    let mut fresh = Calibrator::new(CalibrationCfg::default(), ScreenSize::default());
    assert!(matches!(fresh.load(&path), Err(CalibrationError::InvalidModel(_))));
    assert!(!fresh.is_trained());
}

#[rstest]
fn save_without_model_is_not_trained() {
    let c = Calibrator::new(CalibrationCfg::default(), ScreenSize::default());
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    assert_eq!(c.save(&path), Err(CalibrationError::NotTrained));
    assert!(!path.exists());
}
