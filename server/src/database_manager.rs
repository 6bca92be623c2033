use surrealdb::sql::Thing;
use tokio::sync::{mpsc, oneshot};

use crate::database::{DatabaseConnection, DbBet, DbMember, DbParty, DbUser, DbWager};

pub type Responder<T> = oneshot::Sender<anyhow::Result<T>>;

pub enum DatabaseRequest {
    GetUserBySecret {
        secret: String,
        responder: Responder<Option<DbUser>>,
    },
    GetParty {
        party_id: Thing,
        responder: Responder<Option<DbParty>>,
    },
    GetPartyByJoinCode {
        join_code: String,
        responder: Responder<Option<DbParty>>,
    },
    CreateParty {
        party: DbParty,
        founder: DbMember,
        responder: Responder<()>,
    },
    AddMember {
        member: DbMember,
        responder: Responder<()>,
    },
    GetMember {
        user_id: Thing,
        party_id: Thing,
        responder: Responder<Option<DbMember>>,
    },
    ListMembers {
        party_id: Thing,
        responder: Responder<Vec<common::PartyMember>>,
    },
    ListBetsForMember {
        party_id: Thing,
        user_id: Thing,
        responder: Responder<Vec<common::BetWithPlacement>>,
    },
    GetBet {
        bet_id: Thing,
        responder: Responder<Option<DbBet>>,
    },
    AddBet {
        bet: DbBet,
        responder: Responder<()>,
    },
    UpdateBet {
        bet: DbBet,
        responder: Responder<()>,
    },
    RemoveBet {
        bet: DbBet,
        responder: Responder<()>,
    },
    GetWager {
        wager_id: Thing,
        responder: Responder<Option<DbWager>>,
    },
    GetOpenWagerFor {
        user_id: Thing,
        bet_id: Thing,
        responder: Responder<Option<DbWager>>,
    },
    ListOpenWagersForBet {
        bet_id: Thing,
        responder: Responder<Vec<DbWager>>,
    },
    PlaceWager {
        wager: DbWager,
        member_id: Thing,
        responder: Responder<()>,
    },
    RemoveWager {
        wager: DbWager,
        member_id: Thing,
        responder: Responder<()>,
    },
    SetLock {
        party_id: Thing,
        locked: bool,
        responder: Responder<()>,
    },
    ApplySettlement {
        bet: DbBet,
        credits: Vec<(Thing, f64)>,
        responder: Responder<()>,
    },
}

/// Send one request to the database actor and await its reply.
pub async fn request<T>(
    requester: &mpsc::Sender<DatabaseRequest>,
    make: impl FnOnce(Responder<T>) -> DatabaseRequest,
) -> anyhow::Result<T> {
    let (resp_tx, resp_rx) = oneshot::channel();
    requester.send(make(resp_tx)).await?;
    resp_rx.await?
}

pub struct DatabaseManager {
    db_connection: DatabaseConnection,
    work_queue: mpsc::Receiver<DatabaseRequest>,
}

pub fn transform_err<T>(error: surrealdb::Result<T>) -> anyhow::Result<T> {
    match error {
        Ok(t) => Ok(t),
        Err(e) => Err(e.into()),
    }
}

impl DatabaseManager {
    pub fn new(
        db_connection: DatabaseConnection,
        work_queue: mpsc::Receiver<DatabaseRequest>,
    ) -> Self {
        Self {
            db_connection,
            work_queue,
        }
    }

    pub async fn manage(&mut self) {
        while let Some(request) = self.work_queue.recv().await {
            // responders may have been dropped by a dead connection
            match request {
                DatabaseRequest::GetUserBySecret { secret, responder } => {
                    let resp = transform_err(self.db_connection.get_user_by_secret(&secret).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetParty { party_id, responder } => {
                    let resp = transform_err(self.db_connection.get_party(&party_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetPartyByJoinCode {
                    join_code,
                    responder,
                } => {
                    let resp =
                        transform_err(self.db_connection.get_party_by_join_code(&join_code).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::CreateParty {
                    party,
                    founder,
                    responder,
                } => {
                    let resp = transform_err(
                        self.db_connection
                            .add_party_with_admin(&party, &founder)
                            .await,
                    );
                    let _ = responder.send(resp);
                }
                DatabaseRequest::AddMember { member, responder } => {
                    let resp = transform_err(self.db_connection.add_member(&member).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetMember {
                    user_id,
                    party_id,
                    responder,
                } => {
                    let resp =
                        transform_err(self.db_connection.get_member(&user_id, &party_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::ListMembers {
                    party_id,
                    responder,
                } => {
                    let resp =
                        transform_err(self.db_connection.get_party_members(&party_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::ListBetsForMember {
                    party_id,
                    user_id,
                    responder,
                } => {
                    let resp = transform_err(
                        self.db_connection
                            .get_all_bets_for_member(&party_id, &user_id)
                            .await,
                    );
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetBet { bet_id, responder } => {
                    let resp = transform_err(self.db_connection.get_bet(&bet_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::AddBet { bet, responder } => {
                    let resp = transform_err(self.db_connection.add_bet(&bet).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::UpdateBet { bet, responder } => {
                    let resp = transform_err(self.db_connection.update_bet(&bet).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::RemoveBet { bet, responder } => {
                    let resp = transform_err(self.db_connection.remove_bet(&bet).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetWager {
                    wager_id,
                    responder,
                } => {
                    let resp = transform_err(self.db_connection.get_wager(&wager_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetOpenWagerFor {
                    user_id,
                    bet_id,
                    responder,
                } => {
                    let resp =
                        transform_err(self.db_connection.open_wager_for(&user_id, &bet_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::ListOpenWagersForBet { bet_id, responder } => {
                    let resp =
                        transform_err(self.db_connection.open_wagers_for_bet(&bet_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::PlaceWager {
                    wager,
                    member_id,
                    responder,
                } => {
                    let resp =
                        transform_err(self.db_connection.place_wager(&wager, &member_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::RemoveWager {
                    wager,
                    member_id,
                    responder,
                } => {
                    let resp =
                        transform_err(self.db_connection.remove_wager(&wager, &member_id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::SetLock {
                    party_id,
                    locked,
                    responder,
                } => {
                    let resp = transform_err(self.db_connection.set_lock(&party_id, locked).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::ApplySettlement {
                    bet,
                    credits,
                    responder,
                } => {
                    let resp =
                        transform_err(self.db_connection.apply_settlement(&bet, &credits).await);
                    let _ = responder.send(resp);
                }
            }
        }
    }
}
