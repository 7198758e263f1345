//! Process-level wiring: configuration, signals, engine lifetime

use crate::cli::args::Args;
use crate::config::Configuration;
use crate::error::{MirrorError, Result};
use crate::mirror::Mirror;
use tokio_util::sync::CancellationToken;

pub struct Runner {
    args: Args,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    pub async fn run(&self) -> Result<()> {
        if self.args.print_default_config {
            print!("{}", Configuration::default().to_yaml()?);
            return Ok(());
        }

        let config = self.load_configuration()?;
        let mirror = Mirror::new(config)?;

        let signals = ShutdownSignals::install()?;
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_signal(signals, cancel.clone()));

        mirror.run(cancel).await
    }

    fn load_configuration(&self) -> Result<Configuration> {
        let path = self.args.config_path();
        let config = Configuration::load(&path)?;
        config.validate()?;

        for warning in config.warnings() {
            tracing::warn!("{}", warning);
        }
        tracing::info!(
            path = %path.display(),
            registries = config.auth.len(),
            sources = config.sources.len(),
            destinations = config.destinations.len(),
            parallel = config.worker.parallel,
            interval = %crate::config::duration::format(config.worker.interval),
            "configuration loaded"
        );
        Ok(config)
    }
}

async fn cancel_on_signal(mut signals: ShutdownSignals, cancel: CancellationToken) {
    let signal = signals.recv().await;
    tracing::info!(signal, "received shutdown signal");
    cancel.cancel();
}

/// Shutdown signal listeners, installed before the engine starts
struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let interrupt = signal(SignalKind::interrupt())
            .map_err(|e| MirrorError::Io(format!("Failed to install SIGINT handler: {}", e)))?;
        let terminate = signal(SignalKind::terminate())
            .map_err(|e| MirrorError::Io(format!("Failed to install SIGTERM handler: {}", e)))?;
        Ok(Self { interrupt, terminate })
    }

    #[cfg(windows)]
    fn install() -> Result<Self> {
        let ctrl_c = tokio::signal::windows::ctrl_c()
            .map_err(|e| MirrorError::Io(format!("Failed to install ctrl-c handler: {}", e)))?;
        Ok(Self { ctrl_c })
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(windows)]
    async fn recv(&mut self) -> &'static str {
        self.ctrl_c.recv().await;
        "ctrl-c"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_cancels_the_engine() {
        let signals = ShutdownSignals::install().unwrap();
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(cancel_on_signal(signals, cancel.clone()));
        assert!(!cancel.is_cancelled());

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .expect("SIGTERM did not cancel the token");
        listener.await.unwrap();
    }
}
