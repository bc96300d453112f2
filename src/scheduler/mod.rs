//! Scheduler module for driving simulation ticks.

use crate::fleet::FleetStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background driver that calls `FleetStore::tick` on a fixed cadence.
pub struct Scheduler {
    store: Arc<FleetStore>,
    interval: Duration,
    error_backoff: Duration,
    stop: Mutex<Option<broadcast::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(store: Arc<FleetStore>, interval: Duration, error_backoff: Duration) -> Self {
        Self {
            store,
            interval,
            error_backoff,
            stop: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Start the tick loop. Calling this while already running is a no-op.
    pub async fn start(&self) {
        let mut stop = self.stop.lock().await;
        if stop.is_some() {
            return;
        }

        let (tx, rx) = broadcast::channel(1);
        *stop = Some(tx);
        drop(stop);

        tracing::info!("Scheduler: ticking every {:?}", self.interval);

        let handle = tokio::spawn(run_tick_loop(
            self.store.clone(),
            self.interval,
            self.error_backoff,
            rx,
        ));
        *self.handle.lock().await = Some(handle);
    }

    /// Stop the tick loop and wait for it to exit.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Scheduler: tick loop panicked: {}", e);
            }
        }
        tracing::info!("Scheduler: stopped");
    }
}

async fn run_tick_loop(
    store: Arc<FleetStore>,
    period: Duration,
    error_backoff: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                match store.tick() {
                    Ok(report) => {
                        tracing::debug!(
                            "Tick {}: {} started, {} completed, {} failed, new task {:?}, new alert {:?}, {} points, {} evicted",
                            report.generation,
                            report.tasks_started,
                            report.tasks_completed,
                            report.tasks_failed,
                            report.new_task,
                            report.new_alert,
                            report.points_appended,
                            report.evicted
                        );
                    }
                    Err(e) => {
                        tracing::error!("Tick failed: {}", e);
                        tokio::select! {
                            _ = stop_rx.recv() => break,
                            _ = tokio::time::sleep(error_backoff) => {}
                        }
                        interval.reset();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::fleet::FleetState;
    use chrono::Utc;

    fn config() -> SimConfig {
        SimConfig {
            seed: Some(3),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_scheduler_ticks_until_stopped() {
        let store = Arc::new(FleetStore::new(&config()).unwrap());
        let scheduler = Scheduler::new(
            store.clone(),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        let ticked = store.generation();
        assert!(ticked >= 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.generation(), ticked);
    }

    #[tokio::test]
    async fn test_failing_ticks_do_not_block_stop() {
        let state = FleetState::new(
            vec![],
            vec![],
            (&config()).into(),
            1,
            Utc::now(),
        );
        let store = Arc::new(FleetStore::from_state(state, &config()));
        let scheduler = Scheduler::new(
            store.clone(),
            Duration::from_millis(5),
            Duration::from_secs(60),
        );

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::time::timeout(Duration::from_secs(1), scheduler.stop())
            .await
            .unwrap();
        assert_eq!(store.generation(), 0);
    }
}
