use tokio::join;
use tokio::sync::mpsc;
use tracing::{error, warn};

use server::connection_manager::run_listen_server;
use server::database::{DatabaseConnection, DbUser};
use server::database_manager::DatabaseManager;
use server::settlement_manager::SettlementManager;
use server::{config, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    logging::init_tracing(&cfg);

    let mut database = DatabaseConnection::new_memory().await?;
    for (name, secret) in &cfg.seed_users {
        // duplicate seed names are tolerated, the first entry wins
        if let Err(error) = database
            .add_user(&DbUser::new(name.clone(), secret.clone()))
            .await
        {
            warn!(%name, %error, "could not seed user");
        }
    }

    let (db_tx, db_rx) = mpsc::channel(32);
    let mut db_manager = DatabaseManager::new(database, db_rx);

    let db_task = tokio::spawn(async move {
        db_manager.manage().await;
    });

    let (settlement_tx, settlement_rx) = mpsc::channel(32);
    let mut settlement_manager = SettlementManager::new(settlement_rx, db_tx.clone());

    let settlement_task = tokio::spawn(async move {
        settlement_manager.manage().await;
    });

    let bind_addr = cfg.bind_addr.clone();
    let listen_task = tokio::spawn(async move {
        if let Err(error) = run_listen_server(bind_addr, db_tx, settlement_tx).await {
            error!(%error, "listen server stopped");
        }
    });

    let (res1, res2, res3) = join!(db_task, settlement_task, listen_task);
    res1?;
    res2?;
    res3?;
    Ok(())
}
