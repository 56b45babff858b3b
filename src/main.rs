use rent_house::{
    bot::{self, BotData},
    config::{admins, database, settings},
    core::delivery::Orchestrator,
    errors::{Error, Result},
    integrations::{FsArtifactStore, TelegramNotifier, TextInvoiceRenderer},
};
use dotenvy::dotenv;
use std::{env, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Non-secret settings from config.toml
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    info!(
        async_tasks = settings.delivery.async_tasks,
        workers = settings.delivery.worker_count,
        "Settings loaded"
    );

    // 4. Database
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Delivery collaborators
    let telegram_token = env::var("TELEGRAM_BOT_TOKEN")
        .inspect_err(|e| error!("TELEGRAM_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;
    tokio::fs::create_dir_all(&settings.invoices.output_dir).await?;

    let orchestrator = Orchestrator::new(
        db,
        Arc::new(TextInvoiceRenderer),
        Arc::new(FsArtifactStore::new(settings.invoices.output_dir.clone())),
        Arc::new(TelegramNotifier::new(
            &settings.telegram.api_base,
            telegram_token,
        )),
        &settings,
    )?;

    let admin_ids = admins::get_admin_ids();
    if admin_ids.is_empty() {
        warn!("{} is empty; nobody can manage bills", admins::ADMIN_USER_IDS_VAR);
    }

    // 6. Run the bot; the Discord token is read directly before use
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    bot::run_bot(token, BotData::new(orchestrator, admin_ids, settings.alerts)).await
}
