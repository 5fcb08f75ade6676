//! Periodic purge of dead pastes.
//!
//! Reads never depend on this task: expiry is checked at read time. The
//! reaper only keeps the table from growing without bound.

use crate::services::{
    clock::Clock,
    paste_store::{PasteStore, StoreResult},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Rows removed by a single sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: u64,
    pub exhausted: u64,
}

pub struct Reaper {
    store: PasteStore,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Reaper {
    pub fn new(store: PasteStore, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// Spawn the sweep loop. It exits once `shutdown` flips to `true` or its
    /// sender is dropped.
    ///
    /// Sweeps run one at a time inside this single task; a sweep that
    /// overruns the interval delays the next tick instead of stacking.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; wait a full interval instead.
        ticker.tick().await;

        info!(interval_secs = self.interval.as_secs(), "reaper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        warn!("reaper sweep failed: {}", err);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("reaper stopped");
    }

    /// Delete every paste that can no longer be read.
    ///
    /// Safe to race with readers: a reader that loses the race simply sees
    /// the paste as gone.
    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        let expired = self.store.purge_expired(self.clock.now()).await?;
        let exhausted = self.store.purge_exhausted().await?;
        let report = SweepReport { expired, exhausted };

        if expired + exhausted > 0 {
            info!(expired, exhausted, "purged dead pastes");
        } else {
            debug!("reaper found nothing to purge");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        paste_service::{PasteError, testing::harness},
        paste_store::StoreError,
    };
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn sweep_removes_expired_and_exhausted_pastes() {
        let h = harness().await;
        let short = h.service.create("a".into(), Some(5), None).await.unwrap();
        let long = h.service.create("b".into(), Some(500), None).await.unwrap();
        let once = h.service.create("c".into(), None, Some(1)).await.unwrap();
        let free = h.service.create("d".into(), None, None).await.unwrap();
        h.service.read_and_consume(&once).await.unwrap();

        h.clock.advance(ChronoDuration::seconds(5));
        let reaper = Reaper::new(h.store.clone(), h.clock.clone(), Duration::from_secs(60));
        let report = reaper.sweep().await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                expired: 1,
                exhausted: 1
            }
        );
        for gone in [&short, &once] {
            assert!(matches!(h.store.get(gone).await, Err(StoreError::NotFound(_))));
        }
        for kept in [&long, &free] {
            assert!(h.store.get(kept).await.is_ok());
        }
        assert_eq!(reaper.sweep().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn sweep_racing_readers_only_yields_unavailable() {
        let h = harness().await;
        let id = h.service.create("x".into(), Some(1), Some(50)).await.unwrap();
        h.clock.advance(ChronoDuration::seconds(2));
        let reaper = Reaper::new(h.store.clone(), h.clock.clone(), Duration::from_secs(60));

        let readers = (0..20).map(|_| {
            let service = h.service.clone();
            let id = id.clone();
            tokio::spawn(async move { service.read_and_consume(&id).await })
        });
        let sweep = reaper.sweep();
        let (results, swept) = tokio::join!(futures::future::join_all(readers), sweep);

        swept.unwrap();
        for result in results {
            assert!(matches!(result.unwrap(), Err(PasteError::Unavailable)));
        }
    }

    #[tokio::test]
    async fn spawned_reaper_purges_and_stops_on_shutdown() {
        let h = harness().await;
        let id = h.service.create("x".into(), Some(1), None).await.unwrap();
        h.clock.advance(ChronoDuration::seconds(2));

        let (tx, rx) = watch::channel(false);
        let handle = Reaper::new(h.store.clone(), h.clock.clone(), Duration::from_millis(20))
            .spawn(rx);

        let mut purged = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if matches!(h.store.get(&id).await, Err(StoreError::NotFound(_))) {
                purged = true;
                break;
            }
        }
        assert!(purged, "reaper never purged the expired paste");

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}
