//! General Discord commands - ping and help.
//! This module contains simple commands that don't require database operations
//! and provide basic bot functionality and user assistance.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{bot::Context, errors::Result};

    /// Responds with "Pong!" to test bot connectivity.
    ///
    /// This is a simple health check command that doesn't require any database operations.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: Context<'_>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: Context<'_>) -> Result<()> {
        let help_text = "**Rent House Help**\n\
        Monthly bills move through Draft → Issued → Sent → Paid.\n\n\
        **Billing**\n\
        • `/generate_bills <month> [rooms]` - Computes draft bills from readings and rates.\n\
        • `/bills <month>` - Lists bills with status and missing data.\n\
        • `/bill <room> <month>` - Shows one bill in detail.\n\
        • `/regenerate`, `/issue`, `/send`, `/mark_paid` `<room> <month>` - Lifecycle actions.\n\
        • `/edit_bill`, `/delete_bill` - Correct or remove a draft bill.\n\
        • `/bulk_send <month> [rooms]` - Sends invoices to the Telegram group.\n\
        • `/batch_status [id]` - Shows bulk send progress.\n\
        • `/invoice <month> [room] [language]` - Downloads an invoice.\n\n\
        **Data**\n\
        • `/rooms`, `/add_room`, `/add_tenant`, `/set_profile`, `/assign_tenant`\n\
        • `/record_reading <room> <meter> <month> <value>`\n\
        • `/set_rate <month> <water> <electricity> <exchange_rate>`\n\n\
        **Reports and checks**\n\
        • `/report [month]`, `/alerts`, `/ping_tenant`, `/check_telegram`, `/ping`";

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
