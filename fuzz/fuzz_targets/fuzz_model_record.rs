#![no_main]
use libfuzzer_sys::fuzz_target;

use gaze_core::{CalibrationModel, GazeFeature};

fuzz_target!(|data: &[u8]| {
    // Loading arbitrary bytes must never panic, and neither may predicting from what loads.
    if let Ok(model) = CalibrationModel::from_json(data) {
        let _ = model.predict_raw(GazeFeature::new(0.5, 0.5));
        let _ = model.to_json();
    }
});
