use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::{
    ApiError, Bet, BetChanges, BetDraft, BetWithPlacement, Decision, Party, PartyMember,
    RefundReceipt, SettledBet, WagerReceipt,
};

/// Every request carries the caller's opaque secret; party-scoped requests
/// also carry the party id the caller is acting in.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub enum Request {
    ListBets {
        member_id: String,
        party_id: String,
        secret: String,
    },
    ListMembers {
        party_id: String,
        secret: String,
    },
    LockStatus {
        party_id: String,
        secret: String,
    },
    PlaceWager {
        member_id: String,
        bet_id: String,
        amount: f64,
        decision: Decision,
        party_id: String,
        secret: String,
    },
    RemoveWager {
        wager_id: String,
        party_id: String,
        secret: String,
    },
    EndBet {
        bet_id: String,
        outcome: Decision,
        party_id: String,
        secret: String,
    },
    CreateBet {
        draft: BetDraft,
        party_id: String,
        secret: String,
    },
    UpdateBet {
        bet_id: String,
        changes: BetChanges,
        party_id: String,
        secret: String,
    },
    ApproveBet {
        bet_id: String,
        changes: Option<BetChanges>,
        party_id: String,
        secret: String,
    },
    DenyBet {
        bet_id: String,
        party_id: String,
        secret: String,
    },
    DeleteBet {
        bet_id: String,
        party_id: String,
        secret: String,
    },
    SetLock {
        locked: bool,
        party_id: String,
        secret: String,
    },
    CreateParty {
        name: String,
        starting_balance: f64,
        secret: String,
    },
    JoinParty {
        join_code: String,
        secret: String,
    },
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Response {
    Bets(Vec<BetWithPlacement>),
    Members(Vec<PartyMember>),
    LockStatus(bool),
    WagerPlaced(WagerReceipt),
    WagerRemoved(RefundReceipt),
    BetEnded(SettledBet),
    Bet(Bet),
    BetRemoved { bet_id: String },
    Party(Party),
    Joined(PartyMember),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Packet {
    RequestPacket(Request),
    ResponsePacket(Response),
    Error(ApiError),
}

pub struct Connection {
    connection: TungsteniteWebSocket,
}

impl Connection {
    /// Accept side: wrap an incoming TCP stream in a websocket.
    pub async fn from_tcp_stream(connection: TcpStream) -> anyhow::Result<Self> {
        let ws = TungsteniteWebSocket::accept(connection).await?;

        Ok(Self { connection: ws })
    }

    /// Connect side: dial `host:port` and perform the client handshake.
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let ws = TungsteniteWebSocket::client(address, stream).await?;

        Ok(Self { connection: ws })
    }

    /// Read the next packet. `None` means the peer closed the connection.
    pub async fn read(&mut self) -> anyhow::Result<Option<Packet>> {
        match self.connection.read().await? {
            Some(data) => Ok(Some(rmp_serde::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn send(&mut self, data: Packet) -> anyhow::Result<()> {
        self.connection.write_all(&rmp_serde::to_vec(&data)?).await
    }
}

trait WebSocketConnection {
    async fn read<'a>(&'a mut self) -> anyhow::Result<Option<Vec<u8>>>;

    async fn write_all<'a>(&'a mut self, buf: &'a [u8]) -> anyhow::Result<()>;
}

struct TungsteniteWebSocket {
    socket: tokio_tungstenite::WebSocketStream<TcpStream>,
}

impl TungsteniteWebSocket {
    async fn accept(stream: TcpStream) -> anyhow::Result<Self> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        Ok(Self { socket: ws_stream })
    }

    async fn client(address: &str, stream: TcpStream) -> anyhow::Result<Self> {
        let url = format!("ws://{}/", address);
        let (ws_stream, _) = tokio_tungstenite::client_async(url, stream).await?;
        Ok(Self { socket: ws_stream })
    }
}

impl WebSocketConnection for TungsteniteWebSocket {
    async fn read<'a>(&'a mut self) -> anyhow::Result<Option<Vec<u8>>> {
        use anyhow::bail;
        use futures_util::StreamExt;
        use tokio_tungstenite::tungstenite::Message;

        loop {
            let Some(message) = self.socket.next().await else {
                return Ok(None);
            };
            match message? {
                Message::Binary(data) => return Ok(Some(data)),
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) => continue,
                _ => bail!("incorrect data type received"),
            }
        }
    }

    async fn write_all<'a>(&'a mut self, buf: &'a [u8]) -> anyhow::Result<()> {
        use futures_util::SinkExt;
        use tokio_tungstenite::tungstenite::Message;

        Ok(self.socket.send(Message::Binary(buf.to_vec())).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packets_survive_the_wire_encoding() {
        let packet = Packet::RequestPacket(Request::PlaceWager {
            member_id: "robin".into(),
            bet_id: "b1".into(),
            amount: 12.5,
            decision: Decision::No,
            party_id: "p1".into(),
            secret: "hunter2".into(),
        });
        let bytes = rmp_serde::to_vec(&packet).unwrap();
        let decoded: Packet = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn error_packets_carry_the_taxonomy() {
        let packet = Packet::Error(ApiError::conflict("bet has already been resolved"));
        let bytes = rmp_serde::to_vec(&packet).unwrap();
        let decoded: Packet = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }
}
