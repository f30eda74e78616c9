//! Periodic step task.
//!
//! Each connectivity manager runs its reconnect step on a fixed cadence in a
//! tokio task. The task is torn down through a shutdown channel, with
//! `abort` as a fallback.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uplink_core::ConnectionError;

/// Handle to a running periodic task
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    shutdown_signal: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period` on the current tokio runtime
    ///
    /// The first tick runs immediately.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, mut tick: F) -> Result<Self, ConnectionError>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ConnectionError::InvalidState {
                component: name.clone(),
                reason: "outside a tokio runtime".to_string(),
            }
        })?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task_name = name.clone();
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!("{} task started ({}ms)", task_name, period.as_millis());

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => tick(),
                }
            }

            tracing::debug!("{} task stopped", task_name);
        });

        Ok(Self {
            name,
            shutdown_signal: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True until `stop` is called or the task ends on its own
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the task to stop
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_signal.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
