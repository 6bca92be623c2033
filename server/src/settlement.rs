use std::collections::HashMap;

use common::payout::compute_payout;
use common::{ApiError, Bet, BetStatus, Decision, Payout, PlacedWager};

/// The money movements produced by resolving one bet. `money_deltas` maps
/// user id to the credit owed; stakes were escrowed at placement, so a
/// winner's delta is the payout itself and a loser's is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub outcome: Decision,
    pub payouts: Vec<Payout>,
    pub money_deltas: HashMap<String, f64>,
}

/// Resolve a bet against the complete set of its open wagers. Every wager
/// yields exactly one payout record; a bet can be settled exactly once.
pub fn settle(
    bet: &Bet,
    outcome: Decision,
    wagers: &[PlacedWager],
    user_names: &HashMap<String, String>,
) -> Result<Settlement, ApiError> {
    if bet.outcome.is_some() || !bet.in_progress {
        return Err(ApiError::conflict("bet has already been resolved"));
    }
    if bet.status != BetStatus::Approved {
        return Err(ApiError::conflict("bet has not been approved"));
    }

    let mut payouts = Vec::with_capacity(wagers.len());
    let mut money_deltas: HashMap<String, f64> = HashMap::new();
    for wager in wagers {
        let (payout, profit) = if wager.decision == outcome {
            let quote = compute_payout(wager.amount, bet.odds_for(outcome))
                .map_err(|err| ApiError::validation(err.to_string()))?;
            (quote.payout, quote.profit)
        } else {
            (0.0, -wager.amount)
        };
        if payout > 0.0 {
            *money_deltas.entry(wager.user_id.clone()).or_insert(0.0) += payout;
        }
        payouts.push(Payout {
            user_id: wager.user_id.clone(),
            user_name: user_names.get(&wager.user_id).cloned().unwrap_or_default(),
            amount_bet: wager.amount,
            decision: wager.decision,
            payout,
            profit,
        });
    }

    Ok(Settlement {
        outcome,
        payouts,
        money_deltas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bet(odds_for_yes: u8) -> Bet {
        Bet {
            id: "b1".into(),
            party_id: "p1".into(),
            name: "odds forty".into(),
            description: String::new(),
            odds_for_yes,
            people_involved: vec![],
            status: BetStatus::Approved,
            in_progress: true,
            outcome: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    fn wager(id: &str, user: &str, amount: f64, decision: Decision) -> PlacedWager {
        PlacedWager {
            id: id.into(),
            user_id: user.into(),
            bet_id: "b1".into(),
            amount,
            decision,
            resolved: false,
            created_at: Utc::now(),
        }
    }

    fn names(users: &[&str]) -> HashMap<String, String> {
        users
            .iter()
            .map(|user| (user.to_string(), user.to_string()))
            .collect()
    }

    #[test]
    fn worked_example_win_and_loss() {
        let bet = bet(40);
        let wagers = [wager("w1", "robin", 10.0, Decision::Yes)];

        let won = settle(&bet, Decision::Yes, &wagers, &names(&["robin"])).unwrap();
        assert_eq!(won.payouts[0].payout, 25.0);
        assert_eq!(won.payouts[0].profit, 15.0);
        assert_eq!(won.money_deltas.get("robin"), Some(&25.0));

        let lost = settle(&bet, Decision::No, &wagers, &names(&["robin"])).unwrap();
        assert_eq!(lost.payouts[0].payout, 0.0);
        assert_eq!(lost.payouts[0].profit, -10.0);
        assert!(lost.money_deltas.is_empty());
    }

    #[test]
    fn every_wager_gets_exactly_one_payout_record() {
        let bet = bet(25);
        let wagers = [
            wager("w1", "robin", 5.0, Decision::Yes),
            wager("w2", "aidan", 8.0, Decision::No),
            wager("w3", "blake", 13.0, Decision::Yes),
        ];
        let settlement = settle(&bet, Decision::Yes, &wagers, &names(&["robin", "aidan", "blake"]))
            .unwrap();

        assert_eq!(settlement.payouts.len(), wagers.len());
        for wager in &wagers {
            let matching: Vec<_> = settlement
                .payouts
                .iter()
                .filter(|payout| payout.user_id == wager.user_id)
                .collect();
            assert_eq!(matching.len(), 1);
            assert_eq!(matching[0].amount_bet, wager.amount);
        }
    }

    #[test]
    fn stored_payouts_rederive_from_stake_and_odds() {
        let bet = bet(30);
        let wagers = [
            wager("w1", "robin", 7.5, Decision::Yes),
            wager("w2", "aidan", 12.0, Decision::No),
        ];
        let settlement = settle(&bet, Decision::Yes, &wagers, &names(&["robin", "aidan"])).unwrap();

        for payout in &settlement.payouts {
            let expected = if payout.decision == settlement.outcome {
                compute_payout(payout.amount_bet, bet.odds_for(settlement.outcome))
                    .unwrap()
                    .payout
            } else {
                0.0
            };
            assert_eq!(payout.payout, expected);
            assert_eq!(payout.profit, payout.payout - payout.amount_bet);
        }
    }

    #[test]
    fn resolved_bets_cannot_settle_again() {
        let mut resolved = bet(40);
        resolved.in_progress = false;
        resolved.outcome = Some(Decision::Yes);

        let err = settle(&resolved, Decision::Yes, &[], &HashMap::new()).unwrap_err();
        assert_eq!(err, ApiError::conflict("bet has already been resolved"));
    }

    #[test]
    fn pending_bets_cannot_settle() {
        let mut pending = bet(40);
        pending.status = BetStatus::Pending;

        let err = settle(&pending, Decision::No, &[], &HashMap::new()).unwrap_err();
        assert_eq!(err, ApiError::conflict("bet has not been approved"));
    }
}
