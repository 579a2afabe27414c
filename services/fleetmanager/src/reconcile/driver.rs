//! Periodic reconcile driver.
//!
//! Owns the tick cadence of the engine: one tick at a time, no overlap. Stop
//! lets an in-flight tick finish (per-row transactions always resolve) before
//! returning.
use super::ConnectorReconciler;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct ReconcilerDriver {
    engine: Arc<ConnectorReconciler>,
    interval: Duration,
    stop: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReconcilerDriver {
    pub fn new(engine: Arc<ConnectorReconciler>, interval: Duration) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            engine,
            interval,
            stop,
            handle: Mutex::new(None),
        }
    }

    /// Start ticking. The first tick fires immediately; subsequent ticks at
    /// the configured interval. Starting twice is a no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock().expect("driver handle lock");
        if handle.is_some() {
            return;
        }
        let engine = Arc::clone(&self.engine);
        let interval = self.interval;
        let mut stop_rx = self.stop.subscribe();
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // A slow tick should not cause a burst of catch-up ticks.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for err in engine.reconcile().await {
                            tracing::error!(error = %err, "reconcile tick error");
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::info!("reconcile driver stopped");
        }));
    }

    /// Signal the loop to stop and wait for the in-flight tick to complete.
    pub async fn stop(&self) {
        let handle = self.handle.lock().expect("driver handle lock").take();
        if let Some(handle) = handle {
            let _ = self.stop.send(true);
            let _ = handle.await;
        }
    }
}
