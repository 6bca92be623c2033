use std::sync::Arc;
use std::time::Duration;

use common::{Bet, BetChanges, BetDraft, Decision, RefundReceipt, SettledBet, WagerReceipt};

use crate::api::ApiClient;
use crate::cache::{BetsCache, CacheSnapshot, PartyContext, SnapshotSource};
use crate::services::RefreshScheduler;

/// Ties a (member, party, secret) context to a cache and its background
/// scheduler. Opening a session blocks on the first load; dropping it
/// stops the scheduler.
pub struct PartySession<S: SnapshotSource> {
    cache: Arc<BetsCache<S>>,
    scheduler: RefreshScheduler,
    refresh_period: Duration,
}

impl<S: SnapshotSource> PartySession<S> {
    pub async fn open(
        source: S,
        context: PartyContext,
        refresh_period: Duration,
    ) -> anyhow::Result<Self> {
        let cache = Arc::new(BetsCache::new(source, context));
        cache.load().await?;
        let scheduler = RefreshScheduler::start(cache.clone(), refresh_period);
        Ok(Self {
            cache,
            scheduler,
            refresh_period,
        })
    }

    pub fn cache(&self) -> &Arc<BetsCache<S>> {
        &self.cache
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.cache.snapshot()
    }

    /// Stop refreshing the old party, drop its snapshot, and load the new
    /// one. The scheduler restarts only after the reload so a tick never
    /// races the switch.
    pub async fn switch_party(&mut self, context: PartyContext) -> anyhow::Result<()> {
        self.scheduler.cancel();
        self.cache.select_party(context);
        let result = self.cache.reload().await;
        self.scheduler = RefreshScheduler::start(self.cache.clone(), self.refresh_period);
        result
    }

    pub fn close(self) {}
}

/// Mutations against the live server. Every helper refreshes the cache
/// before returning, whether the call landed or was rejected, so the
/// acting flow resumes against the server's current truth and never
/// against pre-mutation data.
impl PartySession<ApiClient> {
    pub async fn connect(
        address: &str,
        context: PartyContext,
        refresh_period: Duration,
    ) -> anyhow::Result<Self> {
        Self::open(ApiClient::new(address), context, refresh_period).await
    }

    async fn finish<T>(&self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        self.cache.invalidate().await;
        result
    }

    pub async fn place_wager(
        &self,
        bet_id: &str,
        amount: f64,
        decision: Decision,
    ) -> anyhow::Result<WagerReceipt> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .place_wager(
                &context.member_id,
                bet_id,
                amount,
                decision,
                &context.party_id,
                &context.secret,
            )
            .await;
        self.finish(result).await
    }

    pub async fn remove_wager(&self, wager_id: &str) -> anyhow::Result<RefundReceipt> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .remove_wager(wager_id, &context.party_id, &context.secret)
            .await;
        self.finish(result).await
    }

    pub async fn end_bet(&self, bet_id: &str, outcome: Decision) -> anyhow::Result<SettledBet> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .end_bet(bet_id, outcome, &context.party_id, &context.secret)
            .await;
        self.finish(result).await
    }

    pub async fn create_bet(&self, draft: BetDraft) -> anyhow::Result<Bet> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .create_bet(draft, &context.party_id, &context.secret)
            .await;
        self.finish(result).await
    }

    pub async fn update_bet(&self, bet_id: &str, changes: BetChanges) -> anyhow::Result<Bet> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .update_bet(bet_id, changes, &context.party_id, &context.secret)
            .await;
        self.finish(result).await
    }

    pub async fn approve_bet(
        &self,
        bet_id: &str,
        changes: Option<BetChanges>,
    ) -> anyhow::Result<Bet> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .approve_bet(bet_id, changes, &context.party_id, &context.secret)
            .await;
        self.finish(result).await
    }

    pub async fn deny_bet(&self, bet_id: &str) -> anyhow::Result<String> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .deny_bet(bet_id, &context.party_id, &context.secret)
            .await;
        self.finish(result).await
    }

    pub async fn delete_bet(&self, bet_id: &str) -> anyhow::Result<String> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .delete_bet(bet_id, &context.party_id, &context.secret)
            .await;
        self.finish(result).await
    }

    pub async fn set_lock(&self, locked: bool) -> anyhow::Result<bool> {
        let context = self.cache.context();
        let result = self
            .cache
            .source()
            .set_lock_status(locked, &context.party_id, &context.secret)
            .await;
        self.finish(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BetWithPlacement, PartyMember};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct PartyKeyedSource {
        members: Mutex<HashMap<String, Vec<PartyMember>>>,
    }

    impl SnapshotSource for Arc<PartyKeyedSource> {
        async fn fetch_bets(
            &self,
            _context: &PartyContext,
        ) -> anyhow::Result<Vec<BetWithPlacement>> {
            Ok(vec![])
        }

        async fn fetch_members(&self, context: &PartyContext) -> anyhow::Result<Vec<PartyMember>> {
            Ok(self
                .members
                .lock()
                .unwrap()
                .get(&context.party_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_lock_status(&self, _context: &PartyContext) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    fn member_of(party_id: &str) -> PartyMember {
        PartyMember {
            user_id: "robin".into(),
            party_id: party_id.into(),
            name: "robin".into(),
            admin: false,
            money: 10.0,
            total_money: 10.0,
        }
    }

    fn ctx(party_id: &str) -> PartyContext {
        PartyContext {
            member_id: "robin".into(),
            party_id: party_id.into(),
            secret: "hunter2".into(),
        }
    }

    #[tokio::test]
    async fn opening_loads_and_switching_swaps_the_party() {
        let source = Arc::new(PartyKeyedSource {
            members: Mutex::new(HashMap::from([
                ("a".to_string(), vec![member_of("a")]),
                ("b".to_string(), vec![member_of("b")]),
            ])),
        });

        let mut session = PartySession::open(source, ctx("a"), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(session.snapshot().members[0].party_id, "a");

        session.switch_party(ctx("b")).await.unwrap();
        let snapshot = session.snapshot();
        assert!(snapshot.members.iter().all(|m| m.party_id == "b"));
        session.close();
    }
}
