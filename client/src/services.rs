use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::cache::{BetsCache, SnapshotSource};

/// How often the cache silently refreshes while a party is active.
pub const BACKGROUND_REFRESH_PERIOD: Duration = Duration::from_secs(30);

/// Drives a recurring silent refresh for as long as the active party
/// selection lives. Cancelled on party switch and aborted on drop, so a
/// torn-down session never leaves a ticker behind.
pub struct RefreshScheduler {
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    pub fn start<S: SnapshotSource>(cache: Arc<BetsCache<S>>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately; the caller just loaded
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!("running background refresh");
                cache.invalidate().await;
            }
        });
        Self { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PartyContext;
    use common::{BetWithPlacement, PartyMember};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
    }

    impl SnapshotSource for Arc<CountingSource> {
        async fn fetch_bets(
            &self,
            _context: &PartyContext,
        ) -> anyhow::Result<Vec<BetWithPlacement>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn fetch_members(
            &self,
            _context: &PartyContext,
        ) -> anyhow::Result<Vec<PartyMember>> {
            Ok(vec![])
        }

        async fn fetch_lock_status(&self, _context: &PartyContext) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    fn ctx() -> PartyContext {
        PartyContext {
            member_id: "robin".into(),
            party_id: "p1".into(),
            secret: "hunter2".into(),
        }
    }

    #[tokio::test]
    async fn ticks_refresh_until_cancelled() {
        let source = Arc::new(CountingSource::default());
        let cache = Arc::new(BetsCache::new(source.clone(), ctx()));

        let scheduler = RefreshScheduler::start(cache, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(90)).await;
        let while_running = source.fetches.load(Ordering::SeqCst);
        assert!(while_running >= 2, "saw {while_running} refreshes");

        scheduler.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let after_cancel = source.fetches.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), after_cancel);
    }
}
