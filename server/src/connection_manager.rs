use anyhow::bail;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use common::network::{Connection, Packet, Request, Response};
use common::payout::compute_payout;
use common::{ApiError, BetChanges, BetStatus, RefundReceipt, WagerReceipt};

use crate::database::{
    bet_thing, party_thing, user_thing, wager_thing, DbBet, DbMember, DbParty, DbUser, DbWager,
};
use crate::database_manager::{request, DatabaseRequest};
use crate::settlement_manager::SettlementRequest;

pub async fn run_listen_server(
    bind_addr: String,
    db_tx: mpsc::Sender<DatabaseRequest>,
    settlement_tx: mpsc::Sender<SettlementRequest>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "listening for connections");

    loop {
        let (stream, peer) = listener.accept().await?;
        let db_tx = db_tx.clone();
        let settlement_tx = settlement_tx.clone();

        tokio::spawn(async move {
            match Connection::from_tcp_stream(stream).await {
                Ok(mut connection) => {
                    if let Err(error) =
                        handle_connection(&mut connection, db_tx, settlement_tx).await
                    {
                        warn!(%peer, %error, "connection ended with an error");
                    }
                }
                Err(error) => warn!(%peer, %error, "websocket handshake failed"),
            }
        });
    }
}

async fn handle_connection(
    connection: &mut Connection,
    db_tx: mpsc::Sender<DatabaseRequest>,
    settlement_tx: mpsc::Sender<SettlementRequest>,
) -> anyhow::Result<()> {
    while let Some(packet) = connection.read().await? {
        let incoming = match packet {
            Packet::RequestPacket(incoming) => incoming,
            other => bail!("incorrect packet type: {:?}", other),
        };
        match dispatch(incoming, &db_tx, &settlement_tx).await {
            Ok(response) => connection.send(Packet::ResponsePacket(response)).await?,
            Err(error) => connection.send(Packet::Error(to_api_error(error))).await?,
        }
    }
    Ok(())
}

// Typed failures travel back to the caller verbatim; anything else is an
// internal fault the caller only learns is transient.
fn to_api_error(error: anyhow::Error) -> ApiError {
    match error.downcast::<ApiError>() {
        Ok(api_error) => api_error,
        Err(internal) => {
            error!(error = %internal, "internal error while handling a request");
            ApiError::Transient("internal error".into())
        }
    }
}

struct Caller {
    user: DbUser,
    member: DbMember,
    party: DbParty,
}

async fn authenticate_user(
    db_tx: &mpsc::Sender<DatabaseRequest>,
    secret: &str,
) -> anyhow::Result<DbUser> {
    Ok(request(db_tx, |responder| DatabaseRequest::GetUserBySecret {
        secret: secret.into(),
        responder,
    })
    .await?
    .ok_or(ApiError::authorization("unrecognised credential"))?)
}

async fn authenticate(
    db_tx: &mpsc::Sender<DatabaseRequest>,
    secret: &str,
    party_id: &str,
) -> anyhow::Result<Caller> {
    let user = authenticate_user(db_tx, secret).await?;
    let party_id = party_thing(party_id);
    let party = request(db_tx, |responder| DatabaseRequest::GetParty {
        party_id,
        responder,
    })
    .await?
    .ok_or(ApiError::not_found("no such party"))?;
    let member = request(db_tx, |responder| DatabaseRequest::GetMember {
        user_id: user.id.clone(),
        party_id: party.id.clone(),
        responder,
    })
    .await?
    .ok_or(ApiError::authorization("not a member of this party"))?;

    Ok(Caller {
        user,
        member,
        party,
    })
}

fn require_admin(caller: &Caller) -> Result<(), ApiError> {
    if caller.member.admin {
        Ok(())
    } else {
        Err(ApiError::authorization("party admins only"))
    }
}

fn require_self(caller: &Caller, member_id: &str) -> Result<(), ApiError> {
    if caller.user.id.id.to_string() == member_id {
        Ok(())
    } else {
        Err(ApiError::authorization("cannot act for another member"))
    }
}

// Both sides must keep a live probability; 0 or 100 would leave one side's
// payout undefined.
fn validate_odds(odds_for_yes: u8) -> Result<(), ApiError> {
    if (1..=99).contains(&odds_for_yes) {
        Ok(())
    } else {
        Err(ApiError::validation("odds for yes must be between 1 and 99"))
    }
}

fn apply_changes(bet: &mut DbBet, changes: BetChanges) -> Result<(), ApiError> {
    if let Some(name) = changes.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("bet name must not be empty"));
        }
        bet.name = name;
    }
    if let Some(description) = changes.description {
        bet.description = description;
    }
    if let Some(odds_for_yes) = changes.odds_for_yes {
        validate_odds(odds_for_yes)?;
        bet.odds_for_yes = odds_for_yes;
    }
    if let Some(people_involved) = changes.people_involved {
        bet.people_involved = people_involved.iter().map(|id| user_thing(id)).collect();
    }
    Ok(())
}

async fn get_party_bet(
    db_tx: &mpsc::Sender<DatabaseRequest>,
    caller: &Caller,
    bet_id: &str,
) -> anyhow::Result<DbBet> {
    let bet = request(db_tx, |responder| DatabaseRequest::GetBet {
        bet_id: bet_thing(bet_id),
        responder,
    })
    .await?
    .ok_or(ApiError::not_found("no such bet"))?;
    if bet.party != caller.party.id {
        return Err(ApiError::not_found("no such bet in this party").into());
    }
    Ok(bet)
}

async fn dispatch(
    incoming: Request,
    db_tx: &mpsc::Sender<DatabaseRequest>,
    settlement_tx: &mpsc::Sender<SettlementRequest>,
) -> anyhow::Result<Response> {
    match incoming {
        Request::ListBets {
            member_id,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            require_self(&caller, &member_id)?;
            let bets = request(db_tx, |responder| DatabaseRequest::ListBetsForMember {
                party_id: caller.party.id.clone(),
                user_id: caller.user.id.clone(),
                responder,
            })
            .await?;
            Ok(Response::Bets(bets))
        }
        Request::ListMembers { party_id, secret } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            let members = request(db_tx, |responder| DatabaseRequest::ListMembers {
                party_id: caller.party.id.clone(),
                responder,
            })
            .await?;
            Ok(Response::Members(members))
        }
        Request::LockStatus { party_id, secret } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            Ok(Response::LockStatus(caller.party.bets_locked))
        }
        Request::PlaceWager {
            member_id,
            bet_id,
            amount,
            decision,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            require_self(&caller, &member_id)?;
            if caller.party.bets_locked {
                return Err(ApiError::conflict("betting is locked for this party").into());
            }
            if amount < 1.0 {
                return Err(ApiError::validation("stake must be at least 1").into());
            }
            if amount > caller.member.money {
                return Err(ApiError::validation("stake exceeds available money").into());
            }
            let bet = get_party_bet(db_tx, &caller, &bet_id).await?;
            if bet.status != BetStatus::Approved {
                return Err(ApiError::conflict("bet is awaiting approval").into());
            }
            if !bet.in_progress || bet.outcome.is_some() {
                return Err(ApiError::conflict("bet has already been resolved").into());
            }
            if bet.people_involved.contains(&caller.user.id) {
                return Err(
                    ApiError::authorization("people involved in a bet cannot wager on it").into(),
                );
            }
            let existing = request(db_tx, |responder| DatabaseRequest::GetOpenWagerFor {
                user_id: caller.user.id.clone(),
                bet_id: bet.id.clone(),
                responder,
            })
            .await?;
            if existing.is_some() {
                return Err(ApiError::conflict("a wager is already placed on this bet").into());
            }
            let quote = compute_payout(amount, bet.odds_for(decision))
                .map_err(|err| ApiError::validation(err.to_string()))?;
            let wager = DbWager::new(&caller.user.id, &caller.party.id, &bet.id, amount, decision);
            request(db_tx, |responder| DatabaseRequest::PlaceWager {
                wager: wager.clone(),
                member_id: caller.member.id.clone(),
                responder,
            })
            .await?;
            Ok(Response::WagerPlaced(WagerReceipt {
                wager: wager.into(),
                potential_payout: quote.payout,
                potential_profit: quote.profit,
                money_remaining: caller.member.money - amount,
            }))
        }
        Request::RemoveWager {
            wager_id,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            if caller.party.bets_locked {
                return Err(ApiError::conflict("betting is locked for this party").into());
            }
            let wager = request(db_tx, |responder| DatabaseRequest::GetWager {
                wager_id: wager_thing(&wager_id),
                responder,
            })
            .await?
            .ok_or(ApiError::not_found("no such wager"))?;
            if wager.party != caller.party.id {
                return Err(ApiError::not_found("no such wager in this party").into());
            }
            if wager.user != caller.user.id {
                return Err(
                    ApiError::authorization("only the placing member may remove a wager").into(),
                );
            }
            if wager.resolved {
                return Err(ApiError::conflict("wager has already been settled").into());
            }
            request(db_tx, |responder| DatabaseRequest::RemoveWager {
                wager: wager.clone(),
                member_id: caller.member.id.clone(),
                responder,
            })
            .await?;
            Ok(Response::WagerRemoved(RefundReceipt {
                wager_id,
                refunded_amount: wager.amount,
                money_remaining: caller.member.money + wager.amount,
            }))
        }
        Request::EndBet {
            bet_id,
            outcome,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            require_admin(&caller)?;
            let bet = get_party_bet(db_tx, &caller, &bet_id).await?;
            let (resp_tx, resp_rx) = oneshot::channel();
            settlement_tx
                .send(SettlementRequest::EndBet {
                    bet_id: bet.id.clone(),
                    outcome,
                    responder: resp_tx,
                })
                .await?;
            let settled = resp_rx.await??;
            Ok(Response::BetEnded(settled))
        }
        Request::CreateBet {
            draft,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            if draft.name.trim().is_empty() {
                return Err(ApiError::validation("bet name must not be empty").into());
            }
            validate_odds(draft.odds_for_yes)?;
            // an admin's bet goes straight into play, a member's waits for approval
            let status = if caller.member.admin {
                BetStatus::Approved
            } else {
                BetStatus::Pending
            };
            let people_involved = draft
                .people_involved
                .iter()
                .map(|id| user_thing(id))
                .collect();
            let bet = DbBet::new(
                &caller.party.id,
                draft.name,
                draft.description,
                draft.odds_for_yes,
                people_involved,
                status,
            );
            request(db_tx, |responder| DatabaseRequest::AddBet {
                bet: bet.clone(),
                responder,
            })
            .await?;
            Ok(Response::Bet(bet.into()))
        }
        Request::UpdateBet {
            bet_id,
            changes,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            require_admin(&caller)?;
            let mut bet = get_party_bet(db_tx, &caller, &bet_id).await?;
            if bet.outcome.is_some() || !bet.in_progress {
                return Err(ApiError::conflict("bet has already been resolved").into());
            }
            apply_changes(&mut bet, changes)?;
            request(db_tx, |responder| DatabaseRequest::UpdateBet {
                bet: bet.clone(),
                responder,
            })
            .await?;
            Ok(Response::Bet(bet.into()))
        }
        Request::ApproveBet {
            bet_id,
            changes,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            require_admin(&caller)?;
            let mut bet = get_party_bet(db_tx, &caller, &bet_id).await?;
            if bet.status != BetStatus::Pending {
                return Err(ApiError::conflict("bet is not awaiting approval").into());
            }
            if let Some(changes) = changes {
                apply_changes(&mut bet, changes)?;
            }
            bet.status = BetStatus::Approved;
            request(db_tx, |responder| DatabaseRequest::UpdateBet {
                bet: bet.clone(),
                responder,
            })
            .await?;
            Ok(Response::Bet(bet.into()))
        }
        Request::DenyBet {
            bet_id,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            require_admin(&caller)?;
            let bet = get_party_bet(db_tx, &caller, &bet_id).await?;
            if bet.status != BetStatus::Pending {
                return Err(ApiError::conflict("only pending bets can be denied").into());
            }
            request(db_tx, |responder| DatabaseRequest::RemoveBet {
                bet,
                responder,
            })
            .await?;
            Ok(Response::BetRemoved { bet_id })
        }
        Request::DeleteBet {
            bet_id,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            require_admin(&caller)?;
            let bet = get_party_bet(db_tx, &caller, &bet_id).await?;
            // open stakes are refunded as part of the removal
            request(db_tx, |responder| DatabaseRequest::RemoveBet {
                bet,
                responder,
            })
            .await?;
            Ok(Response::BetRemoved { bet_id })
        }
        Request::SetLock {
            locked,
            party_id,
            secret,
        } => {
            let caller = authenticate(db_tx, &secret, &party_id).await?;
            require_admin(&caller)?;
            request(db_tx, |responder| DatabaseRequest::SetLock {
                party_id: caller.party.id.clone(),
                locked,
                responder,
            })
            .await?;
            Ok(Response::LockStatus(locked))
        }
        Request::CreateParty {
            name,
            starting_balance,
            secret,
        } => {
            let user = authenticate_user(db_tx, &secret).await?;
            if name.trim().is_empty() {
                return Err(ApiError::validation("party name must not be empty").into());
            }
            if !(starting_balance > 0.0) {
                return Err(ApiError::validation("starting balance must be positive").into());
            }
            let party = DbParty::new(name, starting_balance);
            let founder = DbMember::new(&user, &party.id, true, starting_balance);
            request(db_tx, |responder| DatabaseRequest::CreateParty {
                party: party.clone(),
                founder,
                responder,
            })
            .await?;
            Ok(Response::Party(party.into()))
        }
        Request::JoinParty { join_code, secret } => {
            let user = authenticate_user(db_tx, &secret).await?;
            let party = request(db_tx, |responder| DatabaseRequest::GetPartyByJoinCode {
                join_code,
                responder,
            })
            .await?
            .ok_or(ApiError::not_found("no party with that join code"))?;
            let existing = request(db_tx, |responder| DatabaseRequest::GetMember {
                user_id: user.id.clone(),
                party_id: party.id.clone(),
                responder,
            })
            .await?;
            if existing.is_some() {
                return Err(ApiError::conflict("already a member of this party").into());
            }
            let member = DbMember::new(&user, &party.id, false, party.starting_balance);
            request(db_tx, |responder| DatabaseRequest::AddMember {
                member: member.clone(),
                responder,
            })
            .await?;
            Ok(Response::Joined(member.into_member(0.0)))
        }
    }
}
