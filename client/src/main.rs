use tracing::info;
use tracing_subscriber::EnvFilter;

use common::payout::round_to_cents;
use common::{BetDraft, Decision};

use client::api::ApiClient;
use client::cache::PartyContext;
use client::session::PartySession;
use client::{config, views};

/// Walks one full flow against a running server: found a party, put a bet
/// in play, wager on it, settle it, and print the resulting leaderboard.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client = ApiClient::new(cfg.server_addr.clone());
    let party = client.create_party("game night", 100.0, &cfg.secret).await?;
    info!(party = %party.name, join_code = %party.join_code, "created a party");

    let context = PartyContext {
        member_id: cfg.member_id.clone(),
        party_id: party.id.clone(),
        secret: cfg.secret.clone(),
    };
    let session = PartySession::connect(&cfg.server_addr, context, cfg.refresh_period).await?;

    let bet = session
        .create_bet(BetDraft {
            name: "sun before noon tomorrow".into(),
            description: "settled by looking out the window".into(),
            odds_for_yes: 40,
            people_involved: vec![],
        })
        .await?;
    info!(bet = %bet.name, odds_for_yes = bet.odds_for_yes, "bet in play");

    let receipt = session.place_wager(&bet.id, 10.0, Decision::Yes).await?;
    info!(
        stake = receipt.wager.amount,
        potential_payout = round_to_cents(receipt.potential_payout),
        potential_profit = round_to_cents(receipt.potential_profit),
        money_remaining = round_to_cents(receipt.money_remaining),
        "wager placed"
    );

    let snapshot = session.snapshot();
    info!(
        on_the_board = views::your_wagers(&snapshot).len(),
        open_to_us = views::open_for_wagering(&snapshot, &cfg.member_id).len(),
        "cache reflects the placement"
    );

    let settled = session.end_bet(&bet.id, Decision::Yes).await?;
    for payout in &settled.payouts {
        info!(
            member = %payout.user_name,
            decision = %payout.decision,
            staked = payout.amount_bet,
            payout = round_to_cents(payout.payout),
            profit = round_to_cents(payout.profit),
            "payout"
        );
    }

    let snapshot = session.snapshot();
    for member in views::leaderboard(&snapshot) {
        info!(
            member = %member.name,
            total = round_to_cents(member.total_money),
            available = round_to_cents(member.money),
            "leaderboard"
        );
    }

    session.close();
    Ok(())
}
