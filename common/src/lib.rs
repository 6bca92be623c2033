use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod network;
pub mod payout;

pub use error::ApiError;

/// The side of a binary bet, also used as the resolved outcome.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Yes,
    No,
}

impl Decision {
    pub fn opposite(self) -> Self {
        match self {
            Decision::Yes => Decision::No,
            Decision::No => Decision::Yes,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Yes => write!(f, "yes"),
            Decision::No => write!(f, "no"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Approved,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Party {
    pub id: String,
    pub name: String,
    pub join_code: String,
    pub starting_balance: f64,
    pub bets_locked: bool,
}

/// A user's participation record within one party. `money` is spendable;
/// `total_money` adds the value currently staked in unresolved wagers.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct PartyMember {
    pub user_id: String,
    pub party_id: String,
    pub name: String,
    pub admin: bool,
    pub money: f64,
    pub total_money: f64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Bet {
    pub id: String,
    pub party_id: String,
    pub name: String,
    pub description: String,
    pub odds_for_yes: u8,
    pub people_involved: Vec<String>,
    pub status: BetStatus,
    pub in_progress: bool,
    pub outcome: Option<Decision>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn odds_for_no(&self) -> u8 {
        100 - self.odds_for_yes
    }

    pub fn odds_for(&self, decision: Decision) -> u8 {
        match decision {
            Decision::Yes => self.odds_for_yes,
            Decision::No => self.odds_for_no(),
        }
    }
}

/// One member's stake on one side of a bet. At most one open wager may
/// exist per (member, bet) pair.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct PlacedWager {
    pub id: String,
    pub user_id: String,
    pub bet_id: String,
    pub amount: f64,
    pub decision: Decision,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// The requesting member's placement on a bet, as served by the list-bets
/// operation. Potential figures are quoted from the live odds; actual
/// figures appear once the bet has been resolved.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct UserPlacement {
    pub has_placed: bool,
    pub wager_id: Option<String>,
    pub amount: Option<f64>,
    pub decision: Option<Decision>,
    pub potential_payout: Option<f64>,
    pub potential_profit: Option<f64>,
    pub actual_payout: Option<f64>,
    pub actual_profit: Option<f64>,
    pub resolved: bool,
}

impl UserPlacement {
    pub fn for_wager(bet: &Bet, wager: Option<&PlacedWager>) -> Self {
        let Some(wager) = wager else {
            return UserPlacement::default();
        };
        let quote = payout::compute_payout(wager.amount, bet.odds_for(wager.decision)).ok();
        let (actual_payout, actual_profit) = match bet.outcome {
            Some(outcome) if outcome == wager.decision => {
                (quote.map(|q| q.payout), quote.map(|q| q.profit))
            }
            Some(_) => (Some(0.0), Some(-wager.amount)),
            None => (None, None),
        };
        UserPlacement {
            has_placed: true,
            wager_id: Some(wager.id.clone()),
            amount: Some(wager.amount),
            decision: Some(wager.decision),
            potential_payout: quote.map(|q| q.payout),
            potential_profit: quote.map(|q| q.profit),
            actual_payout,
            actual_profit,
            resolved: wager.resolved,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct BetWithPlacement {
    pub bet: Bet,
    pub user_placement: UserPlacement,
}

/// Produced at settlement, one record per open wager on the resolved bet.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Payout {
    pub user_id: String,
    pub user_name: String,
    pub amount_bet: f64,
    pub decision: Decision,
    pub payout: f64,
    pub profit: f64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct SettledBet {
    pub bet: Bet,
    pub payouts: Vec<Payout>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct WagerReceipt {
    pub wager: PlacedWager,
    pub potential_payout: f64,
    pub potential_profit: f64,
    pub money_remaining: f64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct RefundReceipt {
    pub wager_id: String,
    pub refunded_amount: f64,
    pub money_remaining: f64,
}

// A proposed, not yet realised bet. Used for creation requests.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct BetDraft {
    pub name: String,
    pub description: String,
    pub odds_for_yes: u8,
    pub people_involved: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct BetChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub odds_for_yes: Option<u8>,
    pub people_involved: Option<Vec<String>>,
}
