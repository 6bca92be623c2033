use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Db, Mem};
use surrealdb::sql::{Id, Thing};
use surrealdb::{Result, Surreal};

use surrealdb::sql::statements::BeginStatement;
use surrealdb::sql::statements::CommitStatement;

use common::{BetStatus, Decision, UserPlacement};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Record {
    #[allow(dead_code)]
    pub id: Thing,
}

pub fn user_thing(id: &str) -> Thing {
    Thing {
        tb: "user".into(),
        id: Id::String(id.into()),
    }
}

pub fn party_thing(id: &str) -> Thing {
    Thing {
        tb: "party".into(),
        id: Id::String(id.into()),
    }
}

pub fn bet_thing(id: &str) -> Thing {
    Thing {
        tb: "bet".into(),
        id: Id::String(id.into()),
    }
}

pub fn wager_thing(id: &str) -> Thing {
    Thing {
        tb: "wager".into(),
        id: Id::String(id.into()),
    }
}

/// Identity record. Issuance of the secret happens outside this system;
/// users are seeded at startup and looked up by secret on every request.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbUser {
    pub id: Thing,
    pub name: String,
    pub secret: String,
}

impl DbUser {
    pub fn new(name: impl Into<String> + Clone, secret: impl Into<String>) -> Self {
        Self {
            id: Thing {
                tb: "user".into(),
                id: Id::String(name.clone().into()),
            },
            name: name.into(),
            secret: secret.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbParty {
    pub id: Thing,
    pub name: String,
    pub join_code: String,
    pub starting_balance: f64,
    pub bets_locked: bool,
}

impl DbParty {
    pub fn new(name: impl Into<String>, starting_balance: f64) -> Self {
        Self {
            id: Thing {
                tb: "party".into(),
                id: Id::rand(),
            },
            name: name.into(),
            join_code: Id::rand().to_string(),
            starting_balance,
            bets_locked: false,
        }
    }
}

impl Into<common::Party> for DbParty {
    fn into(self) -> common::Party {
        common::Party {
            id: self.id.id.to_string(),
            name: self.name,
            join_code: self.join_code,
            starting_balance: self.starting_balance,
            bets_locked: self.bets_locked,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbMember {
    pub id: Thing,
    pub user: Thing,
    pub party: Thing,
    pub name: String,
    pub admin: bool,
    pub money: f64,
}

impl DbMember {
    pub fn new(user: &DbUser, party: &Thing, admin: bool, money: f64) -> Self {
        Self {
            id: Thing {
                tb: "member".into(),
                id: Id::rand(),
            },
            user: user.id.clone(),
            party: party.clone(),
            name: user.name.clone(),
            admin,
            money,
        }
    }

    pub fn into_member(self, staked: f64) -> common::PartyMember {
        common::PartyMember {
            user_id: self.user.id.to_string(),
            party_id: self.party.id.to_string(),
            name: self.name,
            admin: self.admin,
            total_money: self.money + staked,
            money: self.money,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbBet {
    pub id: Thing,
    pub party: Thing,
    pub name: String,
    pub description: String,
    pub odds_for_yes: u8,
    pub people_involved: Vec<Thing>,
    pub status: BetStatus,
    pub in_progress: bool,
    pub outcome: Option<Decision>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl DbBet {
    pub fn new(
        party: &Thing,
        name: impl Into<String>,
        description: impl Into<String>,
        odds_for_yes: u8,
        people_involved: Vec<Thing>,
        status: BetStatus,
    ) -> Self {
        Self {
            id: Thing {
                tb: "bet".into(),
                id: Id::rand(),
            },
            party: party.clone(),
            name: name.into(),
            description: description.into(),
            odds_for_yes,
            people_involved,
            status,
            in_progress: true,
            outcome: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn odds_for(&self, decision: Decision) -> u8 {
        match decision {
            Decision::Yes => self.odds_for_yes,
            Decision::No => 100 - self.odds_for_yes,
        }
    }
}

impl Into<common::Bet> for DbBet {
    fn into(self) -> common::Bet {
        common::Bet {
            id: self.id.id.to_string(),
            party_id: self.party.id.to_string(),
            name: self.name,
            description: self.description,
            odds_for_yes: self.odds_for_yes,
            people_involved: self
                .people_involved
                .iter()
                .map(|person| person.id.to_string())
                .collect(),
            status: self.status,
            in_progress: self.in_progress,
            outcome: self.outcome,
            created_at: self.created_at,
            ended_at: self.ended_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbWager {
    pub id: Thing,
    pub user: Thing,
    pub party: Thing,
    pub bet: Thing,
    pub amount: f64,
    pub decision: Decision,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl DbWager {
    pub fn new(user: &Thing, party: &Thing, bet: &Thing, amount: f64, decision: Decision) -> Self {
        Self {
            id: Thing {
                tb: "wager".into(),
                id: Id::rand(),
            },
            user: user.clone(),
            party: party.clone(),
            bet: bet.clone(),
            amount,
            decision,
            resolved: false,
            created_at: Utc::now(),
        }
    }
}

impl Into<common::PlacedWager> for DbWager {
    fn into(self) -> common::PlacedWager {
        common::PlacedWager {
            id: self.id.id.to_string(),
            user_id: self.user.id.to_string(),
            bet_id: self.bet.id.to_string(),
            amount: self.amount,
            decision: self.decision,
            resolved: self.resolved,
            created_at: self.created_at,
        }
    }
}

pub struct DatabaseConnection {
    connection: Surreal<Db>,
}

impl DatabaseConnection {
    pub async fn new_memory() -> Result<Self> {
        let db = Surreal::new::<Mem>(()).await?;
        db.use_ns("party_bet").use_db("party_bet").await?;

        Ok(Self { connection: db })
    }

    pub async fn add_user(&mut self, user: &DbUser) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create(("user", &user.name))
            .content(user)
            .await?;

        Ok(())
    }

    pub async fn get_user_by_secret(&self, secret: &str) -> Result<Option<DbUser>> {
        self.connection
            .query("SELECT * FROM user WHERE secret = $secret;")
            .bind(("secret", secret))
            .await?
            .take(0)
    }

    pub async fn add_party_with_admin(&mut self, party: &DbParty, founder: &DbMember) -> Result<()> {
        self.connection
            .query(BeginStatement)
            .query("CREATE $id SET name = $name, join_code = $join_code, starting_balance = $starting_balance, bets_locked = $bets_locked;")
            .bind(party)
            .query("CREATE $member_id SET user = $user, party = $member_party, name = $member_name, admin = $admin, money = $money;")
            .bind(("member_id", &founder.id))
            .bind(("user", &founder.user))
            .bind(("member_party", &founder.party))
            .bind(("member_name", &founder.name))
            .bind(("admin", founder.admin))
            .bind(("money", founder.money))
            .query(CommitStatement)
            .await?;
        Ok(())
    }

    pub async fn add_member(&mut self, member: &DbMember) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create(("member", member.id.id.to_string()))
            .content(member)
            .await?;

        Ok(())
    }

    pub async fn get_party(&self, party_id: &Thing) -> Result<Option<DbParty>> {
        self.connection.select(party_id).await
    }

    pub async fn get_party_by_join_code(&self, join_code: &str) -> Result<Option<DbParty>> {
        self.connection
            .query("SELECT * FROM party WHERE join_code = $join_code;")
            .bind(("join_code", join_code))
            .await?
            .take(0)
    }

    pub async fn get_member(&self, user_id: &Thing, party_id: &Thing) -> Result<Option<DbMember>> {
        self.connection
            .query("SELECT * FROM member WHERE user = $user AND party = $party;")
            .bind(("user", user_id))
            .bind(("party", party_id))
            .await?
            .take(0)
    }

    pub async fn set_lock(&mut self, party_id: &Thing, locked: bool) -> Result<()> {
        self.connection
            .query("UPDATE $party SET bets_locked = $locked;")
            .bind(("party", party_id))
            .bind(("locked", locked))
            .await?;
        Ok(())
    }

    pub async fn add_bet(&mut self, bet: &DbBet) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create(("bet", bet.id.id.to_string()))
            .content(bet)
            .await?;

        Ok(())
    }

    pub async fn update_bet(&mut self, bet: &DbBet) -> Result<()> {
        let _: Option<DbBet> = self.connection.update(&bet.id).content(bet).await?;
        Ok(())
    }

    pub async fn get_bet(&self, bet_id: &Thing) -> Result<Option<DbBet>> {
        self.connection.select(bet_id).await
    }

    pub async fn bets_for_party(&self, party_id: &Thing) -> Result<Vec<DbBet>> {
        self.connection
            .query("SELECT * FROM bet WHERE party = $party;")
            .bind(("party", party_id))
            .await?
            .take(0)
    }

    /// Delete a bet and its wagers, refunding every still-open stake.
    pub async fn remove_bet(&mut self, bet: &DbBet) -> Result<()> {
        let wagers = self.wagers_for_bet(&bet.id).await?;
        for wager in &wagers {
            let member = if wager.resolved {
                None
            } else {
                self.get_member(&wager.user, &wager.party).await?
            };
            match member {
                Some(member) => self.remove_wager(wager, &member.id).await?,
                None => {
                    let _: Option<DbWager> = self.connection.delete(&wager.id).await?;
                }
            }
        }
        let _: Option<DbBet> = self.connection.delete(&bet.id).await?;
        Ok(())
    }

    pub async fn get_wager(&self, wager_id: &Thing) -> Result<Option<DbWager>> {
        self.connection.select(wager_id).await
    }

    pub async fn open_wager_for(&self, user_id: &Thing, bet_id: &Thing) -> Result<Option<DbWager>> {
        self.connection
            .query("SELECT * FROM wager WHERE user = $user AND bet = $bet AND resolved = false;")
            .bind(("user", user_id))
            .bind(("bet", bet_id))
            .await?
            .take(0)
    }

    pub async fn wagers_for_bet(&self, bet_id: &Thing) -> Result<Vec<DbWager>> {
        self.connection
            .query("SELECT * FROM wager WHERE bet = $bet;")
            .bind(("bet", bet_id))
            .await?
            .take(0)
    }

    pub async fn open_wagers_for_bet(&self, bet_id: &Thing) -> Result<Vec<DbWager>> {
        self.connection
            .query("SELECT * FROM wager WHERE bet = $bet AND resolved = false;")
            .bind(("bet", bet_id))
            .await?
            .take(0)
    }

    /// Create the wager and debit the stake from the member's available
    /// money together. Escrow is held against the bet until settlement or
    /// removal.
    pub async fn place_wager(&mut self, wager: &DbWager, member_id: &Thing) -> Result<()> {
        self.connection
            .query(BeginStatement)
            .query("CREATE $id SET user = $user, party = $party, bet = $bet, amount = $amount, decision = $decision, resolved = $resolved, created_at = $created_at;")
            .bind(wager)
            .query("UPDATE $member SET money -= $amount;")
            .bind(("member", member_id))
            .query(CommitStatement)
            .await?;
        Ok(())
    }

    /// Delete an open wager, returning the escrowed stake to the member.
    pub async fn remove_wager(&mut self, wager: &DbWager, member_id: &Thing) -> Result<()> {
        self.connection
            .query(BeginStatement)
            .query("UPDATE $member SET money += $amount;")
            .bind(("member", member_id))
            .bind(("amount", wager.amount))
            .query("DELETE $wager;")
            .bind(("wager", &wager.id))
            .query(CommitStatement)
            .await?;
        Ok(())
    }

    /// Apply a settlement as one transaction: the bet leaves play, every
    /// wager on it is marked resolved, and winners are credited their
    /// payouts. Stakes were escrowed at placement, so losers need no
    /// further adjustment.
    pub async fn apply_settlement(&mut self, bet: &DbBet, credits: &[(Thing, f64)]) -> Result<()> {
        let mut query = self
            .connection
            .query(BeginStatement)
            .query("UPDATE $bet_id SET in_progress = false, outcome = $outcome, ended_at = $ended_at;")
            .bind(("bet_id", &bet.id))
            .bind(("outcome", &bet.outcome))
            .bind(("ended_at", &bet.ended_at))
            .query("UPDATE wager SET resolved = true WHERE bet = $bet_id AND resolved = false;")
            .bind(("party_id", &bet.party));
        for (index, (user_id, payout)) in credits.iter().enumerate() {
            query = query
                .query(format!(
                    "UPDATE member SET money += $payout_{index} WHERE user = $user_{index} AND party = $party_id;"
                ))
                .bind((format!("user_{index}"), user_id))
                .bind((format!("payout_{index}"), *payout));
        }
        query.query(CommitStatement).await?;
        Ok(())
    }

    /// Every bet in the party, annotated with the requesting member's
    /// placement. This is the shape the client cache consumes.
    pub async fn get_all_bets_for_member(
        &self,
        party_id: &Thing,
        user_id: &Thing,
    ) -> Result<Vec<common::BetWithPlacement>> {
        let bets = self.bets_for_party(party_id).await?;
        let wagers: Vec<DbWager> = self
            .connection
            .query("SELECT * FROM wager WHERE party = $party AND user = $user;")
            .bind(("party", party_id))
            .bind(("user", user_id))
            .await?
            .take(0)?;

        Ok(bets
            .into_iter()
            .map(|db_bet| {
                let wager: Option<common::PlacedWager> = wagers
                    .iter()
                    .find(|wager| wager.bet == db_bet.id)
                    .map(|wager| wager.clone().into());
                let bet: common::Bet = db_bet.into();
                let user_placement = UserPlacement::for_wager(&bet, wager.as_ref());
                common::BetWithPlacement {
                    bet,
                    user_placement,
                }
            })
            .collect())
    }

    /// Members with their money figures; `total_money` folds in the value
    /// of every open stake the member holds.
    pub async fn get_party_members(&self, party_id: &Thing) -> Result<Vec<common::PartyMember>> {
        let members: Vec<DbMember> = self
            .connection
            .query("SELECT * FROM member WHERE party = $party;")
            .bind(("party", party_id))
            .await?
            .take(0)?;
        let open_wagers: Vec<DbWager> = self
            .connection
            .query("SELECT * FROM wager WHERE party = $party AND resolved = false;")
            .bind(("party", party_id))
            .await?
            .take(0)?;

        let mut staked: HashMap<String, f64> = HashMap::new();
        for wager in &open_wagers {
            *staked.entry(wager.user.id.to_string()).or_insert(0.0) += wager.amount;
        }

        Ok(members
            .into_iter()
            .map(|member| {
                let held = staked
                    .get(&member.user.id.to_string())
                    .copied()
                    .unwrap_or(0.0);
                member.into_member(held)
            })
            .collect())
    }
}
