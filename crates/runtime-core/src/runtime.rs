//! Async runtime manager hosting background synchronization helpers

use crate::{Error, Result, RuntimeConfig};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::broadcast;
use tracing::info;

/// Shutdown signal sender
pub type ShutdownSender = broadcast::Sender<()>;

/// Shutdown signal receiver
pub type ShutdownReceiver = broadcast::Receiver<()>;

/// Runtime manager for coordinating async operations
pub struct RuntimeManager {
    /// Tokio runtime
    runtime: Option<Runtime>,

    /// Configuration
    config: RuntimeConfig,

    /// Shutdown signal sender
    shutdown_tx: ShutdownSender,
}

impl RuntimeManager {
    /// Create a new runtime manager
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.sync.runtime_threads)
            .enable_all()
            .thread_name("rank-sync")
            .build()
            .map_err(|e| Error::Internal {
                message: format!("Failed to build Tokio runtime: {}", e),
            })?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            runtime: Some(runtime),
            config,
            shutdown_tx,
        })
    }

    /// Only `Drop` takes the runtime out
    fn runtime(&self) -> &Runtime {
        self.runtime.as_ref().expect("Runtime should exist")
    }

    /// Get configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Subscribe to the shutdown signal; background helpers stop on it
    pub fn shutdown_receiver(&self) -> ShutdownReceiver {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown to all helpers
    pub fn shutdown(&self) {
        info!("Initiating runtime shutdown");
        let _ = self.shutdown_tx.send(());
    }

    /// Block on a future until completion
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime().block_on(future)
    }

    /// Spawn a task on the runtime
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime().spawn(future)
    }
}

impl Drop for RuntimeManager {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Signal shutdown
            let _ = self.shutdown_tx.send(());

            // Give helpers time to clean up
            runtime.shutdown_timeout(Duration::from_secs(5));
            info!("Runtime manager shut down");
        }
    }
}

/// Builder for RuntimeManager
pub struct RuntimeManagerBuilder {
    config: RuntimeConfig,
}

impl RuntimeManagerBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set runtime worker thread count
    pub fn runtime_threads(mut self, threads: usize) -> Self {
        self.config.sync.runtime_threads = threads;
        self
    }

    /// Set the helper poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.sync.poll_interval = interval;
        self
    }

    /// Build the runtime manager
    pub fn build(self) -> Result<RuntimeManager> {
        RuntimeManager::new(self.config)
    }
}

impl Default for RuntimeManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_creation() {
        let manager = RuntimeManagerBuilder::new()
            .runtime_threads(1)
            .poll_interval(Duration::from_millis(5))
            .build()
            .unwrap();

        assert_eq!(manager.config().sync.runtime_threads, 1);
        assert_eq!(manager.config().sync.poll_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_spawn_task() {
        let manager = RuntimeManagerBuilder::new().build().unwrap();

        let result = manager.block_on(async {
            let handle = manager.spawn(async { 42 });
            handle.await.unwrap()
        });

        assert_eq!(result, 42);
    }

    #[test]
    fn test_shutdown_signal() {
        let manager = RuntimeManagerBuilder::new().build().unwrap();
        let mut rx = manager.shutdown_receiver();

        manager.shutdown();
        let received = manager.block_on(async move { rx.recv().await });
        assert!(received.is_ok());
    }
}
