#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary TOML must either fail to parse, fail validation, or convert cleanly.
    if let Ok(cfg) = gaze_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let _: gaze_core::FilterCfg = (&cfg.filter).into();
            let _: gaze_core::CalibrationCfg = (&cfg.calibration).into();
            let _: gaze_core::FailsafeCfg = (&cfg.failsafe).into();
        }
    }
});
