//! Human-readable error descriptions, exit codes and structured JSON errors.

use gaze_core::error::{BuildError, CalibrationError, GazeError};

/// Errors raised by the CLI itself rather than the library crates.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("not enough calibration samples: have {have}, need {need}")]
    InsufficientSamples { have: usize, need: usize },
    #[error("no model path: pass --out or set calibration.model_path")]
    NoModelPath,
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::InsufficientSamples { have, need } => format!(
                "What happened: Only {have} usable calibration samples (need {need}).\nLikely causes: The session was cut short or most frames had no feature.\nHow to fix: Collect more samples per target or lower calibration.min_samples (minimum 6)."
            ),
            CliError::NoModelPath => {
                "What happened: No destination for the trained model.\nLikely causes: Neither --out nor calibration.model_path was given.\nHow to fix: Pass --out <FILE> or set model_path under [calibration].".to_string()
            }
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSource | BuildError::MissingScreen => format!(
                "What happened: The pipeline could not be assembled ({be}).\nLikely causes: Internal wiring error.\nHow to fix: Re-run with --log-level=debug and report the output."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::NotTrained => {
                "What happened: There is no trained model to use.\nLikely causes: Training did not run or did not succeed.\nHow to fix: Run `gaze train` first.".to_string()
            }
            CalibrationError::Io(msg) => format!(
                "What happened: Could not read or write the model file ({msg}).\nLikely causes: Wrong path or missing permissions.\nHow to fix: Check the path passed via --model/--out or calibration.model_path."
            ),
            CalibrationError::VersionMismatch { found, expected } => format!(
                "What happened: Model file has format version {found}, this build reads {expected}.\nLikely causes: The model was written by a different release.\nHow to fix: Retrain with `gaze train`."
            ),
            CalibrationError::Parse(_) | CalibrationError::InvalidModel(_) => format!(
                "What happened: The model file is not usable ({ce}).\nLikely causes: The file was edited, truncated or is not a model record.\nHow to fix: Retrain with `gaze train`."
            ),
            CalibrationError::Degenerate(msg) => format!(
                "What happened: The calibration fit failed ({msg}).\nLikely causes: Samples cover too little of the eye box, or all targets are on one line.\nHow to fix: Spread targets over the whole screen, or raise calibration.ridge_alpha."
            ),
        };
    }

    if let Some(GazeError::Config(msg)) = err.downcast_ref::<GazeError>() {
        return format!(
            "What happened: Configuration could not be loaded ({msg}).\nLikely causes: Missing file, TOML syntax error, or out-of-range values.\nHow to fix: Fix the field named above and rerun."
        );
    }

    if let Some(ge) = err.downcast_ref::<GazeError>() {
        return format!(
            "What happened: {ge}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from file loaders
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("csv must have headers") {
        return format!("Invalid headers in CSV. {msg}.");
    }

    if lower.contains("invalid csv row") {
        return format!(
            "What happened: A CSV row could not be parsed ({msg}).\nLikely causes: Non-numeric or non-finite values.\nHow to fix: Fix the row reported above."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 calibration, 4 config, 5 insufficient samples, 1 otherwise.
/// Usage errors exit with 2 from clap before any of this runs.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::InsufficientSamples { .. } => 5,
            CliError::NoModelPath => 4,
        };
    }
    if err.downcast_ref::<CalibrationError>().is_some() {
        return 3;
    }
    if matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ) || matches!(err.downcast_ref::<GazeError>(), Some(GazeError::Config(_)))
    {
        return 4;
    }
    1
}

/// Short machine-readable name of the error category.
pub fn error_reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        3 => "Calibration",
        4 => "Config",
        5 => "InsufficientSamples",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = error_reason_name(err);
    let msg = humanize(err);
    let details = match err.downcast_ref::<CliError>() {
        Some(CliError::InsufficientSamples { have, need }) => {
            Some(json!({ "have": have, "need": need }))
        }
        _ => None,
    };
    let obj = if let Some(d) = details {
        json!({ "reason": reason, "details": d, "message": msg, "exit_code": exit_code_for_error(err) })
    } else {
        json!({ "reason": reason, "message": msg, "exit_code": exit_code_for_error(err) })
    };
    obj.to_string()
}
