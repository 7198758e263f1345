//! Command-line argument parsing

use crate::logging::LogFormat;
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const CONFIG_ENV: &str = "OCI_IMAGE_MIRROR_CONFIG";
pub const VERBOSE_ENV: &str = "OCI_IMAGE_MIRROR_VERBOSE";

#[derive(Parser, Debug)]
#[command(name = "oci-image-mirror")]
#[command(about = "Continuously mirror container images between OCI registries")]
#[command(version)]
pub struct Args {
    /// Path to the configuration file
    #[arg(
        long = "config",
        short = 'c',
        help = "Path to the YAML configuration file [default: ./config.yaml]"
    )]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        long = "log-format",
        value_enum,
        default_value_t = LogFormat::Text,
        help = "Log output format"
    )]
    pub log_format: LogFormat,

    #[arg(
        long = "print-default-config",
        help = "Print the default configuration as YAML and exit"
    )]
    pub print_default_config: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Fill in settings from the environment where no flag was given
    pub fn from_env(self) -> Self {
        self.with_env(|key| std::env::var(key).ok())
    }

    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.config.is_none() {
            self.config = lookup(CONFIG_ENV)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from);
        }
        if lookup(VERBOSE_ENV).is_some() {
            self.verbose = true;
        }
        self
    }

    /// Configuration file to load, defaulting to `config.yaml` in the working directory
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}
