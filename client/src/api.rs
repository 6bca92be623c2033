use anyhow::bail;

use common::network::{Connection, Packet, Request, Response};
use common::{
    Bet, BetChanges, BetDraft, BetWithPlacement, Decision, Party, PartyMember, RefundReceipt,
    SettledBet, WagerReceipt,
};

use crate::cache::{PartyContext, SnapshotSource};

/// Thin typed wrappers over the wire protocol, one dial-and-round-trip per
/// call. The secret travels with every request; this client keeps no
/// session state of its own.
#[derive(Clone)]
pub struct ApiClient {
    address: String,
}

impl ApiClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    async fn request(&self, request: Request) -> anyhow::Result<Response> {
        let mut connection = Connection::connect(&self.address).await?;
        connection.send(Packet::RequestPacket(request)).await?;
        match connection.read().await? {
            Some(Packet::ResponsePacket(response)) => Ok(response),
            Some(Packet::Error(error)) => Err(error.into()),
            Some(other) => bail!("unexpected packet: {:?}", other),
            None => bail!("connection closed before a response arrived"),
        }
    }

    pub async fn get_bets_for_member(
        &self,
        member_id: &str,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<Vec<BetWithPlacement>> {
        match self
            .request(Request::ListBets {
                member_id: member_id.into(),
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::Bets(bets) => Ok(bets),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn get_party_members(
        &self,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<Vec<PartyMember>> {
        match self
            .request(Request::ListMembers {
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::Members(members) => Ok(members),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn get_lock_status(&self, party_id: &str, secret: &str) -> anyhow::Result<bool> {
        match self
            .request(Request::LockStatus {
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::LockStatus(locked) => Ok(locked),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn place_wager(
        &self,
        member_id: &str,
        bet_id: &str,
        amount: f64,
        decision: Decision,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<WagerReceipt> {
        match self
            .request(Request::PlaceWager {
                member_id: member_id.into(),
                bet_id: bet_id.into(),
                amount,
                decision,
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::WagerPlaced(receipt) => Ok(receipt),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn remove_wager(
        &self,
        wager_id: &str,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<RefundReceipt> {
        match self
            .request(Request::RemoveWager {
                wager_id: wager_id.into(),
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::WagerRemoved(receipt) => Ok(receipt),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn end_bet(
        &self,
        bet_id: &str,
        outcome: Decision,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<SettledBet> {
        match self
            .request(Request::EndBet {
                bet_id: bet_id.into(),
                outcome,
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::BetEnded(settled) => Ok(settled),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn create_bet(
        &self,
        draft: BetDraft,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<Bet> {
        match self
            .request(Request::CreateBet {
                draft,
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::Bet(bet) => Ok(bet),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn update_bet(
        &self,
        bet_id: &str,
        changes: BetChanges,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<Bet> {
        match self
            .request(Request::UpdateBet {
                bet_id: bet_id.into(),
                changes,
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::Bet(bet) => Ok(bet),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn approve_bet(
        &self,
        bet_id: &str,
        changes: Option<BetChanges>,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<Bet> {
        match self
            .request(Request::ApproveBet {
                bet_id: bet_id.into(),
                changes,
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::Bet(bet) => Ok(bet),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn deny_bet(
        &self,
        bet_id: &str,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<String> {
        match self
            .request(Request::DenyBet {
                bet_id: bet_id.into(),
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::BetRemoved { bet_id } => Ok(bet_id),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn delete_bet(
        &self,
        bet_id: &str,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<String> {
        match self
            .request(Request::DeleteBet {
                bet_id: bet_id.into(),
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::BetRemoved { bet_id } => Ok(bet_id),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn set_lock_status(
        &self,
        locked: bool,
        party_id: &str,
        secret: &str,
    ) -> anyhow::Result<bool> {
        match self
            .request(Request::SetLock {
                locked,
                party_id: party_id.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::LockStatus(locked) => Ok(locked),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn create_party(
        &self,
        name: &str,
        starting_balance: f64,
        secret: &str,
    ) -> anyhow::Result<Party> {
        match self
            .request(Request::CreateParty {
                name: name.into(),
                starting_balance,
                secret: secret.into(),
            })
            .await?
        {
            Response::Party(party) => Ok(party),
            other => bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn join_party(&self, join_code: &str, secret: &str) -> anyhow::Result<PartyMember> {
        match self
            .request(Request::JoinParty {
                join_code: join_code.into(),
                secret: secret.into(),
            })
            .await?
        {
            Response::Joined(member) => Ok(member),
            other => bail!("unexpected response: {:?}", other),
        }
    }
}

impl SnapshotSource for ApiClient {
    async fn fetch_bets(&self, context: &PartyContext) -> anyhow::Result<Vec<BetWithPlacement>> {
        self.get_bets_for_member(&context.member_id, &context.party_id, &context.secret)
            .await
    }

    async fn fetch_members(&self, context: &PartyContext) -> anyhow::Result<Vec<PartyMember>> {
        self.get_party_members(&context.party_id, &context.secret)
            .await
    }

    async fn fetch_lock_status(&self, context: &PartyContext) -> anyhow::Result<bool> {
        self.get_lock_status(&context.party_id, &context.secret)
            .await
    }
}
