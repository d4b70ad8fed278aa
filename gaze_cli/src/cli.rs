//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "gaze", version, about = "Gaze pointer CLI")]
pub struct Cli {
    /// Path to config TOML; built-in defaults are used when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit JSON lines (results, logs and errors) instead of human text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Regressor selection override for `train`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MethodArg {
    Poly2,
    Mlp,
    /// Fit both and keep the lower-error model
    Auto,
}

impl From<MethodArg> for gaze_config::Method {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Poly2 => gaze_config::Method::Poly2,
            MethodArg::Mlp => gaze_config::Method::Mlp,
            MethodArg::Auto => gaze_config::Method::Auto,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit a calibration model from a samples CSV (nx,ny,x,y) and save it
    Train {
        /// Calibration samples CSV (strict header)
        #[arg(long, value_name = "FILE")]
        samples: PathBuf,
        /// Where to write the model; defaults to calibration.model_path
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Override calibration.method
        #[arg(long, value_enum, value_name = "METHOD")]
        method: Option<MethodArg>,
    },
    /// Report the accuracy of a saved model against a samples CSV
    Eval {
        /// Saved model JSON
        #[arg(long, value_name = "FILE")]
        model: PathBuf,
        /// Calibration samples CSV (strict header)
        #[arg(long, value_name = "FILE")]
        samples: PathBuf,
    },
    /// Run a recorded feature trace (nx,ny) through the tracking pipeline
    Replay {
        /// Feature trace CSV; blank cells mean no feature that frame
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        /// Saved model JSON; defaults to calibration.model_path when set
        #[arg(long, value_name = "FILE")]
        model: Option<PathBuf>,
        /// Pace ticks on the wall clock and print cursor moves only
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Pace ticks at filter.sample_rate_hz on the wall clock and drive the cursor actuator, printing each emitted move.\n\nWithout this flag the trace is replayed as fast as possible on a simulated clock advancing one period per frame, and every tick is printed."
        )]
        realtime: bool,
    },
    /// Validate the config, build a pipeline and load the configured model
    SelfCheck,
}
