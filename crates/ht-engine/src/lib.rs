//! # ht-engine
//!
//! Wiring for the `hypertune` binary: configuration loading, the
//! external-process trainer and detector, and logging setup.

pub mod config;
pub mod detect;
pub mod process;

pub use config::{default_space, Overrides, TrainerCommand, TuneConfig, ENV_CHECKPOINT, ENV_SEED};
pub use detect::{list_images, run_inference, CommandDetector, Detection, Detector, ImageDetections};
pub use process::{parse_metrics, CommandEvaluator};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed by an embedding test harness.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
