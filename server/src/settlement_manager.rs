use std::collections::HashMap;

use chrono::Utc;
use surrealdb::sql::Thing;
use tokio::sync::mpsc;

use common::{ApiError, Decision, SettledBet};

use crate::database::user_thing;
use crate::database_manager::{request, DatabaseRequest, Responder};
use crate::settlement::settle;

pub enum SettlementRequest {
    EndBet {
        bet_id: Thing,
        outcome: Decision,
        responder: Responder<SettledBet>,
    },
}

pub struct SettlementManager {
    work_queue: mpsc::Receiver<SettlementRequest>,
    database_requester: mpsc::Sender<DatabaseRequest>,
}

// End-bet requests are handled strictly one at a time; that serialization
// is what makes a second end of the same bet observe the first.
impl SettlementManager {
    pub fn new(
        work_queue: mpsc::Receiver<SettlementRequest>,
        database_requester: mpsc::Sender<DatabaseRequest>,
    ) -> Self {
        Self {
            work_queue,
            database_requester,
        }
    }

    pub async fn manage(&mut self) {
        while let Some(request) = self.work_queue.recv().await {
            match request {
                SettlementRequest::EndBet {
                    bet_id,
                    outcome,
                    responder,
                } => {
                    // we do not care if the receiver has already disappeared
                    responder.send(self.end_bet(bet_id, outcome).await).ok();
                }
            }
        }
    }

    async fn end_bet(&mut self, bet_id: Thing, outcome: Decision) -> anyhow::Result<SettledBet> {
        let db_bet = request(&self.database_requester, |responder| {
            DatabaseRequest::GetBet {
                bet_id: bet_id.clone(),
                responder,
            }
        })
        .await?
        .ok_or(ApiError::not_found("no such bet"))?;

        let open_wagers = request(&self.database_requester, |responder| {
            DatabaseRequest::ListOpenWagersForBet {
                bet_id: bet_id.clone(),
                responder,
            }
        })
        .await?;

        let members = request(&self.database_requester, |responder| {
            DatabaseRequest::ListMembers {
                party_id: db_bet.party.clone(),
                responder,
            }
        })
        .await?;
        let user_names: HashMap<String, String> = members
            .iter()
            .map(|member| (member.user_id.clone(), member.name.clone()))
            .collect();

        let wagers: Vec<common::PlacedWager> =
            open_wagers.iter().cloned().map(Into::into).collect();
        let bet: common::Bet = db_bet.clone().into();
        let settlement = settle(&bet, outcome, &wagers, &user_names)?;

        let mut updated = db_bet;
        updated.in_progress = false;
        updated.outcome = Some(settlement.outcome);
        updated.ended_at = Some(Utc::now());
        let credits: Vec<(Thing, f64)> = settlement
            .money_deltas
            .iter()
            .map(|(user_id, delta)| (user_thing(user_id), *delta))
            .collect();

        request(&self.database_requester, |responder| {
            DatabaseRequest::ApplySettlement {
                bet: updated.clone(),
                credits,
                responder,
            }
        })
        .await?;

        Ok(SettledBet {
            bet: updated.into(),
            payouts: settlement.payouts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseConnection, DbBet, DbMember, DbParty, DbUser, DbWager};
    use crate::database_manager::DatabaseManager;
    use common::BetStatus;
    use tokio::sync::oneshot;

    async fn end_bet(
        settle_tx: &mpsc::Sender<SettlementRequest>,
        bet_id: &Thing,
        outcome: Decision,
    ) -> anyhow::Result<SettledBet> {
        let (resp_tx, resp_rx) = oneshot::channel();
        settle_tx
            .send(SettlementRequest::EndBet {
                bet_id: bet_id.clone(),
                outcome,
                responder: resp_tx,
            })
            .await
            .unwrap();
        resp_rx.await.unwrap()
    }

    #[tokio::test]
    async fn a_bet_ends_exactly_once() {
        let mut db = DatabaseConnection::new_memory().await.unwrap();
        let user = DbUser::new("robin", "robin-secret");
        db.add_user(&user).await.unwrap();
        let party = DbParty::new("game night", 100.0);
        let founder = DbMember::new(&user, &party.id, true, party.starting_balance);
        db.add_party_with_admin(&party, &founder).await.unwrap();
        let bet = DbBet::new(&party.id, "odds forty", "", 40, vec![], BetStatus::Approved);
        db.add_bet(&bet).await.unwrap();
        let wager = DbWager::new(&user.id, &party.id, &bet.id, 10.0, Decision::Yes);
        db.place_wager(&wager, &founder.id).await.unwrap();

        let (db_tx, db_rx) = mpsc::channel(32);
        let mut db_manager = DatabaseManager::new(db, db_rx);
        tokio::spawn(async move { db_manager.manage().await });
        let (settle_tx, settle_rx) = mpsc::channel(32);
        let mut settlement_manager = SettlementManager::new(settle_rx, db_tx.clone());
        tokio::spawn(async move { settlement_manager.manage().await });

        let settled = end_bet(&settle_tx, &bet.id, Decision::Yes).await.unwrap();
        assert_eq!(settled.payouts.len(), 1);
        assert_eq!(settled.payouts[0].payout, 25.0);
        assert_eq!(settled.bet.outcome, Some(Decision::Yes));

        let member = request(&db_tx, |responder| DatabaseRequest::GetMember {
            user_id: user.id.clone(),
            party_id: party.id.clone(),
            responder,
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(member.money, 115.0);

        // the second end must fail and must not pay again
        let err = end_bet(&settle_tx, &bet.id, Decision::Yes)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ApiError>(),
            Some(&ApiError::conflict("bet has already been resolved"))
        );
        let member = request(&db_tx, |responder| DatabaseRequest::GetMember {
            user_id: user.id.clone(),
            party_id: party.id.clone(),
            responder,
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(member.money, 115.0);
    }
}
