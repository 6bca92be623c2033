use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;

use common::{BetWithPlacement, PartyMember};

/// The (member, party, secret) triple every request is made under. Swapped
/// wholesale when the active party changes.
#[derive(Clone, Debug, PartialEq)]
pub struct PartyContext {
    pub member_id: String,
    pub party_id: String,
    pub secret: String,
}

/// One coherent view of the active party: all bets (with the requesting
/// member's placement attached), all members, and the party lock flag.
/// Replaced wholesale on every refresh, never mutated in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheSnapshot {
    pub bets: Vec<BetWithPlacement>,
    pub members: Vec<PartyMember>,
    pub bets_locked: bool,
    pub last_fetched: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    pub fn available_money(&self, member_id: &str) -> f64 {
        self.members
            .iter()
            .find(|member| member.user_id == member_id)
            .map(|member| member.money)
            .unwrap_or(0.0)
    }
}

/// Where snapshots come from. The network client implements this; tests
/// drive the cache with an in-memory source.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch_bets(
        &self,
        context: &PartyContext,
    ) -> impl Future<Output = anyhow::Result<Vec<BetWithPlacement>>> + Send;

    fn fetch_members(
        &self,
        context: &PartyContext,
    ) -> impl Future<Output = anyhow::Result<Vec<PartyMember>>> + Send;

    fn fetch_lock_status(
        &self,
        context: &PartyContext,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send;
}

struct CacheCell {
    snapshot: Arc<CacheSnapshot>,
    loading: bool,
    // bumped on party switch; a response tagged with an old epoch is dropped
    epoch: u64,
    // fetches take a generation at start; only a generation newer than the
    // applied one may land, so an older response never overwrites a fresher
    next_generation: u64,
    applied_generation: u64,
}

/// The single shared cache behind every view. All reads are projections of
/// [`BetsCache::snapshot`]; all writes go through the server and come back
/// via a refresh.
pub struct BetsCache<S> {
    source: S,
    context: Mutex<PartyContext>,
    cell: Mutex<CacheCell>,
}

impl<S: SnapshotSource> BetsCache<S> {
    pub fn new(source: S, context: PartyContext) -> Self {
        Self {
            source,
            context: Mutex::new(context),
            cell: Mutex::new(CacheCell {
                snapshot: Arc::new(CacheSnapshot::default()),
                loading: false,
                epoch: 0,
                next_generation: 0,
                applied_generation: 0,
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn context(&self) -> PartyContext {
        self.context.lock().unwrap().clone()
    }

    /// The current snapshot. Holders keep a consistent view even while the
    /// cache refreshes underneath them.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.cell.lock().unwrap().snapshot.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.cell.lock().unwrap().loading
    }

    pub fn available_money(&self) -> f64 {
        let member_id = self.context.lock().unwrap().member_id.clone();
        self.snapshot().available_money(&member_id)
    }

    /// Point the cache at a different party. The old snapshot is discarded
    /// immediately so it can never render under the new party identity;
    /// call [`BetsCache::reload`] next.
    pub fn select_party(&self, context: PartyContext) {
        *self.context.lock().unwrap() = context;
        let mut cell = self.cell.lock().unwrap();
        cell.epoch += 1;
        cell.snapshot = Arc::new(CacheSnapshot::default());
    }

    /// Blocking fetch of the full snapshot. On failure the previous
    /// snapshot stays in place and the error surfaces to the caller.
    pub async fn load(&self) -> anyhow::Result<()> {
        self.refresh(true).await
    }

    /// Blocking fetch for party changes; the loading flag is raised so the
    /// prior party's data is never mistaken for the new one's.
    pub async fn reload(&self) -> anyhow::Result<()> {
        self.load().await
    }

    /// Silent refresh after mutations and on the background timer. Never
    /// raises the loading flag; failures are logged and the stale snapshot
    /// keeps serving.
    pub async fn invalidate(&self) {
        if let Err(error) = self.refresh(false).await {
            warn!(%error, "background refresh failed, keeping previous snapshot");
        }
    }

    async fn refresh(&self, blocking: bool) -> anyhow::Result<()> {
        let context = self.context();
        let (epoch, generation) = {
            let mut cell = self.cell.lock().unwrap();
            cell.next_generation += 1;
            if blocking {
                cell.loading = true;
            }
            (cell.epoch, cell.next_generation)
        };

        let result = futures::try_join!(
            self.source.fetch_bets(&context),
            self.source.fetch_members(&context),
            self.source.fetch_lock_status(&context),
        );

        let mut cell = self.cell.lock().unwrap();
        if blocking && cell.epoch == epoch {
            cell.loading = false;
        }
        let (bets, members, bets_locked) = result?;
        if cell.epoch == epoch && generation > cell.applied_generation {
            cell.applied_generation = generation;
            cell.snapshot = Arc::new(CacheSnapshot {
                bets,
                members,
                bets_locked,
                last_fetched: Some(Utc::now()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Bet, BetStatus, UserPlacement};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn ctx(member_id: &str, party_id: &str) -> PartyContext {
        PartyContext {
            member_id: member_id.into(),
            party_id: party_id.into(),
            secret: "hunter2".into(),
        }
    }

    fn member(user_id: &str, party_id: &str, money: f64) -> PartyMember {
        PartyMember {
            user_id: user_id.into(),
            party_id: party_id.into(),
            name: user_id.into(),
            admin: false,
            money,
            total_money: money,
        }
    }

    fn bet_named(name: &str, party_id: &str) -> BetWithPlacement {
        BetWithPlacement {
            bet: Bet {
                id: name.into(),
                party_id: party_id.into(),
                name: name.into(),
                description: String::new(),
                odds_for_yes: 50,
                people_involved: vec![],
                status: BetStatus::Approved,
                in_progress: true,
                outcome: None,
                created_at: Utc::now(),
                ended_at: None,
            },
            user_placement: UserPlacement::default(),
        }
    }

    #[derive(Clone, Default)]
    struct FakeData {
        bets: Vec<BetWithPlacement>,
        members: Vec<PartyMember>,
        locked: bool,
    }

    fn tagged(tag: &str, party_id: &str, money: f64) -> FakeData {
        FakeData {
            bets: vec![bet_named(tag, party_id)],
            members: vec![member(tag, party_id, money)],
            locked: false,
        }
    }

    #[derive(Default)]
    struct FakeSource {
        parties: Mutex<HashMap<String, FakeData>>,
        // popped front-first, one per fetch_bets call
        delays: Mutex<Vec<Duration>>,
        fail: AtomicBool,
        fetches: AtomicUsize,
    }

    impl FakeSource {
        fn set_party(&self, party_id: &str, data: FakeData) {
            self.parties
                .lock()
                .unwrap()
                .insert(party_id.to_string(), data);
        }

        fn push_delay(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }

        fn data_for(&self, party_id: &str) -> FakeData {
            self.parties
                .lock()
                .unwrap()
                .get(party_id)
                .cloned()
                .unwrap_or_default()
        }

        fn next_delay(&self) -> Duration {
            let mut delays = self.delays.lock().unwrap();
            if delays.is_empty() {
                Duration::ZERO
            } else {
                delays.remove(0)
            }
        }
    }

    // responses reflect server state at request time, even when they
    // arrive late
    impl SnapshotSource for Arc<FakeSource> {
        async fn fetch_bets(
            &self,
            context: &PartyContext,
        ) -> anyhow::Result<Vec<BetWithPlacement>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let data = self.data_for(&context.party_id).bets;
            let failed = self.fail.load(Ordering::SeqCst);
            let delay = self.next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if failed {
                anyhow::bail!("bets endpoint unavailable");
            }
            Ok(data)
        }

        async fn fetch_members(&self, context: &PartyContext) -> anyhow::Result<Vec<PartyMember>> {
            let data = self.data_for(&context.party_id).members;
            let failed = self.fail.load(Ordering::SeqCst);
            if failed {
                anyhow::bail!("members endpoint unavailable");
            }
            Ok(data)
        }

        async fn fetch_lock_status(&self, context: &PartyContext) -> anyhow::Result<bool> {
            let data = self.data_for(&context.party_id).locked;
            let failed = self.fail.load(Ordering::SeqCst);
            if failed {
                anyhow::bail!("lock endpoint unavailable");
            }
            Ok(data)
        }
    }

    #[tokio::test]
    async fn load_replaces_the_snapshot_and_stamps_freshness() {
        let source = Arc::new(FakeSource::default());
        source.set_party(
            "p1",
            FakeData {
                bets: vec![bet_named("b1", "p1")],
                members: vec![member("robin", "p1", 80.0)],
                locked: true,
            },
        );
        let cache = BetsCache::new(source.clone(), ctx("robin", "p1"));
        assert!(cache.snapshot().last_fetched.is_none());

        cache.load().await.unwrap();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.bets.len(), 1);
        assert_eq!(snapshot.members.len(), 1);
        assert!(snapshot.bets_locked);
        assert!(snapshot.last_fetched.is_some());
        assert_eq!(cache.available_money(), 80.0);
    }

    #[tokio::test]
    async fn failed_load_keeps_the_previous_snapshot_and_surfaces_the_error() {
        let source = Arc::new(FakeSource::default());
        source.set_party("p1", tagged("v1", "p1", 50.0));
        let cache = BetsCache::new(source.clone(), ctx("v1", "p1"));
        cache.load().await.unwrap();
        let before = cache.snapshot();

        source.set_party("p1", tagged("v2", "p1", 60.0));
        source.fail.store(true, Ordering::SeqCst);
        assert!(cache.load().await.is_err());
        assert!(!cache.is_loading());
        assert_eq!(cache.snapshot(), before);
    }

    #[tokio::test]
    async fn invalidate_swallows_failures_and_keeps_serving_stale_data() {
        let source = Arc::new(FakeSource::default());
        source.set_party("p1", tagged("v1", "p1", 50.0));
        let cache = BetsCache::new(source.clone(), ctx("v1", "p1"));
        cache.load().await.unwrap();
        let before = cache.snapshot();

        source.fail.store(true, Ordering::SeqCst);
        cache.invalidate().await;
        assert_eq!(cache.snapshot(), before);
    }

    #[tokio::test]
    async fn loading_is_visible_for_blocking_fetches_only() {
        let source = Arc::new(FakeSource::default());
        source.set_party("p1", tagged("v1", "p1", 50.0));
        let cache = Arc::new(BetsCache::new(source.clone(), ctx("v1", "p1")));

        source.push_delay(Duration::from_millis(80));
        let loading = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.is_loading());
        loading.await.unwrap().unwrap();
        assert!(!cache.is_loading());

        source.push_delay(Duration::from_millis(80));
        let refreshing = tokio::spawn({
            let cache = cache.clone();
            async move { cache.invalidate().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cache.is_loading());
        refreshing.await.unwrap();
    }

    #[tokio::test]
    async fn a_held_snapshot_stays_coherent_across_refreshes() {
        let source = Arc::new(FakeSource::default());
        source.set_party("p1", tagged("v1", "p1", 50.0));
        let cache = BetsCache::new(source.clone(), ctx("v1", "p1"));
        cache.load().await.unwrap();
        let held = cache.snapshot();

        source.set_party("p1", tagged("v2", "p1", 60.0));
        cache.invalidate().await;

        // the old view pairs old bets with old members, the new with new
        assert_eq!(held.bets[0].bet.name, "v1");
        assert_eq!(held.members[0].name, "v1");
        let fresh = cache.snapshot();
        assert_eq!(fresh.bets[0].bet.name, "v2");
        assert_eq!(fresh.members[0].name, "v2");
    }

    #[tokio::test]
    async fn a_stale_response_never_lands_over_a_fresher_one() {
        let source = Arc::new(FakeSource::default());
        source.set_party("p1", tagged("v1", "p1", 50.0));
        let cache = Arc::new(BetsCache::new(source.clone(), ctx("v1", "p1")));
        cache.load().await.unwrap();

        // refresh A sees v2 but completes long after refresh B saw v3
        source.set_party("p1", tagged("v2", "p1", 60.0));
        source.push_delay(Duration::from_millis(120));
        let slow = tokio::spawn({
            let cache = cache.clone();
            async move { cache.invalidate().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        source.set_party("p1", tagged("v3", "p1", 70.0));
        cache.invalidate().await;
        assert_eq!(cache.snapshot().bets[0].bet.name, "v3");

        slow.await.unwrap();
        assert_eq!(cache.snapshot().bets[0].bet.name, "v3");
    }

    #[tokio::test]
    async fn switching_parties_discards_the_old_snapshot_and_late_responses() {
        let source = Arc::new(FakeSource::default());
        source.set_party("a", tagged("from-a", "a", 50.0));
        source.set_party("b", tagged("from-b", "b", 70.0));
        let cache = Arc::new(BetsCache::new(source.clone(), ctx("robin", "a")));
        cache.load().await.unwrap();

        // a refresh for party a is still in flight when the switch happens
        source.push_delay(Duration::from_millis(120));
        let late = tokio::spawn({
            let cache = cache.clone();
            async move { cache.invalidate().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.select_party(ctx("robin", "b"));
        assert!(cache.snapshot().bets.is_empty());
        cache.reload().await.unwrap();

        late.await.unwrap();
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.bets.len(), 1);
        assert_eq!(snapshot.bets[0].bet.party_id, "b");
        assert!(snapshot.members.iter().all(|m| m.party_id == "b"));
    }
}
