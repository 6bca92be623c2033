//! Read-only projections over a cache snapshot. Every tab of the UI is one
//! of these filters; none of them touch the network or mutate anything.

use common::{BetStatus, BetWithPlacement, PartyMember};

use crate::cache::CacheSnapshot;

/// Approved, still-open bets the member may put money on.
pub fn open_for_wagering<'a>(
    snapshot: &'a CacheSnapshot,
    member_id: &str,
) -> Vec<&'a BetWithPlacement> {
    snapshot
        .bets
        .iter()
        .filter(|entry| {
            entry.bet.status == BetStatus::Approved
                && entry.bet.in_progress
                && !entry.user_placement.has_placed
                && !entry
                    .bet
                    .people_involved
                    .iter()
                    .any(|involved| involved == member_id)
        })
        .collect()
}

/// Bets the member has money on, open or settled.
pub fn your_wagers(snapshot: &CacheSnapshot) -> Vec<&BetWithPlacement> {
    snapshot
        .bets
        .iter()
        .filter(|entry| entry.user_placement.has_placed)
        .collect()
}

pub fn pending_approval(snapshot: &CacheSnapshot) -> Vec<&BetWithPlacement> {
    snapshot
        .bets
        .iter()
        .filter(|entry| entry.bet.status == BetStatus::Pending)
        .collect()
}

pub fn resolved(snapshot: &CacheSnapshot) -> Vec<&BetWithPlacement> {
    snapshot
        .bets
        .iter()
        .filter(|entry| entry.bet.outcome.is_some())
        .collect()
}

/// Members ranked by total money, richest first, names breaking ties.
pub fn leaderboard(snapshot: &CacheSnapshot) -> Vec<&PartyMember> {
    let mut members: Vec<&PartyMember> = snapshot.members.iter().collect();
    members.sort_by(|a, b| {
        b.total_money
            .partial_cmp(&a.total_money)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    members
}
