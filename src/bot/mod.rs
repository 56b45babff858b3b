//! Bot layer - Discord-specific interface and command handlers
//!
//! This module provides the Discord interface for the rent house bot: slash
//! commands mapping onto core operations, autocomplete handlers, and the shared
//! bot context. Every command resolves the caller to a policy [`Subject`] and
//! checks it before acting.

/// Discord command implementations (billing, data entry, reports, general)
pub mod commands;
/// Discord interaction handlers (autocomplete, etc.)
pub mod handlers;

use crate::{
    config::AlertSettings,
    core::{
        calculator,
        delivery::{Dispatched, Orchestrator},
        month::parse_month,
        policy::{self, Action, Subject},
        room::get_room_by_number,
        tenant::room_for_discord_user,
    },
    entities::{JobStatus, MonthlyBillModel},
    errors::{Error, Result},
};
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::collections::HashSet;
use tracing::{error, info, instrument};

/// Poise context used by every command.
pub type Context<'a> = poise::Context<'a, BotData, Error>;

/// Shared data available to all bot commands.
/// This structure holds the database connection, the delivery orchestrator and
/// the admin allowlist.
pub struct BotData {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    /// Rendering and delivery of invoices
    pub orchestrator: Orchestrator,
    /// Discord user ids allowed to administer bills
    pub admins: HashSet<String>,
    /// Smart alert thresholds
    pub alerts: AlertSettings,
}

impl BotData {
    /// Creates a new `BotData` instance.
    #[must_use]
    pub fn new(
        orchestrator: Orchestrator,
        admins: HashSet<String>,
        alerts: AlertSettings,
    ) -> Self {
        Self {
            database: orchestrator.db().clone(),
            orchestrator,
            admins,
            alerts,
        }
    }

    /// Resolves a Discord user to a policy subject.
    pub async fn subject_for(&self, discord_user_id: &str) -> Result<Subject> {
        if self.admins.contains(discord_user_id) {
            return Ok(Subject::Admin);
        }
        Ok(match room_for_discord_user(&self.database, discord_user_id).await? {
            Some(room) => Subject::Tenant {
                room_id: Some(room.id),
            },
            None => Subject::Anonymous,
        })
    }
}

/// Checks that the command author may perform `action`.
pub async fn authorize(
    ctx: Context<'_>,
    action: Action,
    bill: Option<&MonthlyBillModel>,
) -> Result<Subject> {
    let subject = ctx
        .data()
        .subject_for(&ctx.author().id.to_string())
        .await?;
    policy::authorize(&subject, action, bill)?;
    Ok(subject)
}

/// Finds the bill of a room for a `YYYY-MM` month.
pub async fn resolve_bill(
    db: &DatabaseConnection,
    room_number: &str,
    month: &str,
) -> Result<MonthlyBillModel> {
    let month = parse_month(month)?;
    let room = get_room_by_number(db, room_number).await?;
    calculator::find_bill(db, room.id, month)
        .await?
        .ok_or_else(|| Error::Validation {
            message: format!(
                "No bill for room {} in {}. Run `/generate_bills` first.",
                room.room_number,
                month.format("%Y-%m")
            ),
        })
}

/// Parses a money amount typed by the user.
pub fn parse_amount(value: &str, field: &str) -> Result<rust_decimal::Decimal> {
    value
        .trim()
        .replace(',', "")
        .parse()
        .map_err(|_| Error::Validation {
            message: format!("{field} must be a number (got '{value}')."),
        })
}

/// Splits a comma-separated room list; `None` when empty.
#[must_use]
pub fn parse_room_list(value: Option<&str>) -> Option<Vec<String>> {
    let rooms: Vec<String> = value?
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(ToString::to_string)
        .collect();
    (!rooms.is_empty()).then_some(rooms)
}

/// One-line reply describing a dispatched bill job.
#[must_use]
pub fn describe_dispatch(dispatched: &Dispatched<MonthlyBillModel>, queued: &str) -> String {
    match dispatched {
        Dispatched::Queued { record, .. } => {
            format!("⏳ Bill #{}: {queued}", record.id)
        }
        Dispatched::Finished(bill) => {
            let icon = match bill.last_job_status {
                Some(JobStatus::Failed) => "❌",
                _ => "✅",
            };
            format!(
                "{icon} Bill #{} ({}): {}",
                bill.id, bill.status, bill.last_job_message
            )
        }
    }
}

/// Framework error hook: command errors are shown to the caller.
pub async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(command = %ctx.command().name, error = %error, "Command failed");
            let reply = poise::CreateReply::default()
                .content(format!("❌ {error}"))
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                error!(error = %e, "Failed to send error message");
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!(error = %e, "Error while handling error");
            }
        }
    }
}

/// Connects to Discord and serves commands until the client stops.
///
/// Commands are registered globally once the bot is ready.
#[instrument(skip(token, data))]
pub async fn run_bot(token: String, data: BotData) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all_commands(),
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::Client::builder(&token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {:?}", e))?;

    info!("Starting bot client...");
    client
        .start()
        .await
        .inspect_err(|e| error!("Client error: {:?}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount() -> Result<()> {
        assert_eq!(parse_amount(" 2,000 ", "Water price")?, dec!(2000));
        assert_eq!(parse_amount("0.5", "Rate")?, dec!(0.5));
        let err = parse_amount("abc", "Rate").err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("Rate must be a number (got 'abc')."));
        Ok(())
    }

    #[test]
    fn test_parse_room_list() {
        assert_eq!(
            parse_room_list(Some("A1, B2,,")),
            Some(vec!["A1".to_string(), "B2".to_string()])
        );
        assert_eq!(parse_room_list(Some(" , ")), None);
        assert_eq!(parse_room_list(None), None);
    }
}

pub use commands::*;
pub use handlers::*;
