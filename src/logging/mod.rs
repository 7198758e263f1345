//! Log output setup
//!
//! Everything in the crate logs through `tracing` macros with structured
//! fields. [`init`] installs the process-wide subscriber once at startup;
//! `RUST_LOG` takes precedence over the verbosity flag.

use crate::error::{MirrorError, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter used when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "oci_image_mirror=debug,info"
    } else {
        "info"
    }
}

pub fn init(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(verbose)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    installed.map_err(|e| MirrorError::Configuration(format!("Failed to install logger: {}", e)))
}
