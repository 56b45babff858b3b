//! Reporting Discord commands - monthly report and smart alerts.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, authorize},
        core::{
            insights,
            month::{month_start, parse_month, previous_month},
            policy::Action,
            report,
        },
        errors::Result,
    };

    /// Shows income, utility totals and unpaid rooms for a month.
    #[poise::command(slash_command, prefix_command)]
    pub async fn report(
        ctx: Context<'_>,
        #[description = "Month (YYYY-MM, default: last month)"] month: Option<String>,
    ) -> Result<()> {
        authorize(ctx, Action::ViewReport, None).await?;
        let month = match month {
            Some(value) => parse_month(&value)?,
            None => previous_month(month_start(chrono::Local::now().date_naive())),
        };

        let monthly = report::monthly_report(&ctx.data().database, month).await?;
        ctx.say(format!("📊\n```\n{}\n```", report::format_report(&monthly)))
            .await?;
        Ok(())
    }

    /// Evaluates smart alerts now and sends new ones to the admin chat.
    #[poise::command(slash_command, prefix_command)]
    pub async fn alerts(ctx: Context<'_>) -> Result<()> {
        authorize(ctx, Action::ViewReport, None).await?;
        ctx.defer().await?;

        let today = chrono::Local::now().date_naive();
        let run =
            insights::run_smart_alerts(&ctx.data().orchestrator, &ctx.data().alerts, today).await?;

        let sent = if run.sent.is_empty() {
            "no new alerts".to_string()
        } else {
            run.sent_types().join(", ")
        };
        ctx.say(format!("🔔 Smart alerts: {sent} ({} failed).", run.failed))
            .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
