//! Billing Discord commands - generation, lifecycle actions, delivery and downloads.
//!
//! Each command maps onto one core operation and is gated by the access policy.
//! Regenerate, issue, send and bulk send reply as soon as the job is queued.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{
            Context, authorize, describe_dispatch, handlers::autocomplete, parse_amount,
            parse_room_list, resolve_bill,
        },
        core::{
            calculator::{self, GenerationOutcome},
            delivery::Dispatched,
            diagnostics::{self, can_issue, can_send},
            jobs::{self, queued_message},
            month::{month_key, parse_month},
            policy::{Action, Subject},
            report::format_khr,
            room, status,
        },
        entities::{JobType, MonthlyBill, MonthlyBillColumn},
        errors::Result,
        integrations::Language,
    };
    use poise::serenity_prelude as serenity;
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
    use std::collections::HashMap;
    use std::fmt::Write;

    fn language_or_default(ctx: Context<'_>, language: Option<String>) -> Result<Language> {
        language.map_or_else(
            || Ok(ctx.data().orchestrator.default_language()),
            |code| code.parse(),
        )
    }

    /// Generates or refreshes draft bills for a month.
    ///
    /// Issued, sent and paid bills are left untouched and reported as locked.
    #[poise::command(slash_command, prefix_command)]
    pub async fn generate_bills(
        ctx: Context<'_>,
        #[description = "Month (YYYY-MM)"] month: String,
        #[description = "Comma-separated room numbers (default: all rooms)"] rooms: Option<String>,
    ) -> Result<()> {
        authorize(ctx, Action::GenerateBills, None).await?;
        let month = parse_month(&month)?;
        ctx.defer().await?;

        let rooms = parse_room_list(rooms.as_deref());
        let report =
            calculator::generate_bills(&ctx.data().database, month, rooms.as_deref()).await?;

        let mut response = format!("🧾 **Bills for {}**\n\n", month_key(month));
        for (room_number, outcome) in &report.rooms {
            let line = match outcome {
                GenerationOutcome::Generated { bill_id, complete: true } => {
                    format!("✅ {room_number}: bill #{bill_id}")
                }
                GenerationOutcome::Generated { bill_id, complete: false } => {
                    format!("⚠️ {room_number}: bill #{bill_id} (incomplete data)")
                }
                GenerationOutcome::Locked(status) => format!("🔒 {room_number}: {status}"),
                GenerationOutcome::Failed(reason) => format!("❌ {room_number}: {reason}"),
            };
            writeln!(&mut response, "{line}")?;
        }
        writeln!(
            &mut response,
            "\n{} generated, {} incomplete, {} locked, {} failed",
            report.generated(),
            report.incomplete(),
            report.locked(),
            report.failed()
        )?;

        ctx.say(response).await?;
        Ok(())
    }

    /// Lists the bills of a month with their status and readiness.
    #[poise::command(slash_command, prefix_command)]
    pub async fn bills(
        ctx: Context<'_>,
        #[description = "Month (YYYY-MM)"] month: String,
    ) -> Result<()> {
        authorize(ctx, Action::RunDiagnostics, None).await?;
        let db = &ctx.data().database;
        let month = parse_month(&month)?;

        let bills = MonthlyBill::find()
            .filter(MonthlyBillColumn::Month.eq(month))
            .all(db)
            .await?;
        if bills.is_empty() {
            ctx.say(format!(
                "📂 No bills for {}. Run `/generate_bills` first.",
                month_key(month)
            ))
            .await?;
            return Ok(());
        }

        let room_numbers: HashMap<i64, String> = room::list_rooms(db)
            .await?
            .into_iter()
            .map(|r| (r.id, r.room_number))
            .collect();
        let conditions: HashMap<i64, Vec<diagnostics::Condition>> =
            diagnostics::diagnose_bills(db, &bills).await?.into_iter().collect();

        let mut rows: Vec<(String, String)> = bills
            .iter()
            .map(|bill| {
                let room_number = room_numbers.get(&bill.room_id).cloned().unwrap_or_default();
                let found = conditions.get(&bill.id).map_or(&[][..], Vec::as_slice);
                let readiness = if found.is_empty() {
                    "ready".to_string()
                } else {
                    found
                        .iter()
                        .map(|c| c.label())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let pending = if bill.async_job_pending { " ⏳" } else { "" };
                let line = format!(
                    "**{room_number}** #{} {} {}{pending} ({readiness})",
                    bill.id,
                    bill.status,
                    format_khr(bill.total)
                );
                (room_number, line)
            })
            .collect();
        rows.sort();

        let mut response = format!("🧾 **Bills for {}**\n\n", month_key(month));
        for (_, line) in rows {
            writeln!(&mut response, "{line}")?;
        }
        ctx.say(response).await?;
        Ok(())
    }

    /// Shows one bill with its charges, job state and readiness.
    #[poise::command(slash_command, prefix_command)]
    pub async fn bill(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Month (YYYY-MM)"] month: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let bill = resolve_bill(db, &room, &month).await?;
        authorize(ctx, Action::ViewBill, Some(&bill)).await?;
        let conditions = diagnostics::diagnose_bill(db, &bill).await?;

        let mut response = format!("🧾 **Bill #{} - room {room}, {}**\n\n", bill.id, month_key(bill.month));
        writeln!(&mut response, "Status: {}", bill.status)?;
        writeln!(&mut response, "Rent: {}", format_khr(bill.room_cost))?;
        writeln!(&mut response, "Water: {}", format_khr(bill.water_cost))?;
        writeln!(&mut response, "Electricity: {}", format_khr(bill.electricity_cost))?;
        writeln!(&mut response, "**Total: {}**", format_khr(bill.total))?;
        if let Some(name) = &bill.tenant_name_snapshot {
            writeln!(&mut response, "Tenant: {name}")?;
        }
        if bill.has_data_note() {
            writeln!(&mut response, "⚠️ {}", bill.data_note)?;
        }
        if let Some(job_status) = bill.last_job_status {
            writeln!(&mut response, "Last job: {job_status} - {}", bill.last_job_message)?;
        }
        for condition in &conditions {
            writeln!(&mut response, "• {condition}")?;
        }
        writeln!(
            &mut response,
            "Can issue: {} | Can send: {}",
            if can_issue(bill.status, &conditions) { "yes" } else { "no" },
            if can_send(bill.status, &conditions) { "yes" } else { "no" }
        )?;

        ctx.say(response).await?;
        Ok(())
    }

    /// Re-renders a draft bill's invoices in every language.
    #[poise::command(slash_command, prefix_command)]
    pub async fn regenerate(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Month (YYYY-MM)"] month: String,
    ) -> Result<()> {
        let bill = resolve_bill(&ctx.data().database, &room, &month).await?;
        authorize(ctx, Action::Regenerate, Some(&bill)).await?;
        ctx.defer().await?;

        let dispatched = ctx.data().orchestrator.regenerate(bill.id).await?;
        ctx.say(describe_dispatch(&dispatched, queued_message(JobType::Regen)))
            .await?;
        Ok(())
    }

    /// Issues a draft bill, locking its charges.
    #[poise::command(slash_command, prefix_command)]
    pub async fn issue(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Month (YYYY-MM)"] month: String,
    ) -> Result<()> {
        let bill = resolve_bill(&ctx.data().database, &room, &month).await?;
        authorize(ctx, Action::Issue, Some(&bill)).await?;
        ctx.defer().await?;

        let dispatched = ctx.data().orchestrator.issue(bill.id).await?;
        ctx.say(describe_dispatch(&dispatched, queued_message(JobType::Issue)))
            .await?;
        Ok(())
    }

    /// Sends an issued invoice to the tenant on Telegram.
    #[poise::command(slash_command, prefix_command)]
    pub async fn send(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Month (YYYY-MM)"] month: String,
        #[description = "Invoice language (kh, en, fr)"]
        #[autocomplete = "autocomplete::autocomplete_language"]
        language: Option<String>,
    ) -> Result<()> {
        let bill = resolve_bill(&ctx.data().database, &room, &month).await?;
        authorize(ctx, Action::Send, Some(&bill)).await?;
        let language = language_or_default(ctx, language)?;
        ctx.defer().await?;

        let dispatched = ctx.data().orchestrator.send(bill.id, language).await?;
        ctx.say(describe_dispatch(&dispatched, queued_message(JobType::Send)))
            .await?;
        Ok(())
    }

    /// Confirms payment of a sent bill.
    #[poise::command(slash_command, prefix_command)]
    pub async fn mark_paid(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Month (YYYY-MM)"] month: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let bill = resolve_bill(db, &room, &month).await?;
        authorize(ctx, Action::MarkPaid, Some(&bill)).await?;

        let paid = status::mark_paid(db, bill.id).await?;
        ctx.say(format!(
            "💰 Bill #{} for room {room} marked as paid ({}).",
            paid.id,
            format_khr(paid.total)
        ))
        .await?;
        Ok(())
    }

    /// Corrects the charges of a draft bill by hand.
    #[poise::command(slash_command, prefix_command)]
    pub async fn edit_bill(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Month (YYYY-MM)"] month: String,
        #[description = "Rent in KHR"] room_cost: Option<String>,
        #[description = "Water cost in KHR"] water_cost: Option<String>,
        #[description = "Electricity cost in KHR"] electricity_cost: Option<String>,
        #[description = "Data note"] note: Option<String>,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let bill = resolve_bill(db, &room, &month).await?;
        authorize(ctx, Action::EditBill, Some(&bill)).await?;

        let edit = status::BillEdit {
            room_cost: room_cost.as_deref().map(|v| parse_amount(v, "Rent")).transpose()?,
            water_cost: water_cost
                .as_deref()
                .map(|v| parse_amount(v, "Water cost"))
                .transpose()?,
            electricity_cost: electricity_cost
                .as_deref()
                .map(|v| parse_amount(v, "Electricity cost"))
                .transpose()?,
            data_note: note,
        };
        let updated = status::apply_edit(db, bill.id, edit).await?;
        ctx.say(format!(
            "✏️ Bill #{} updated. New total: {}",
            updated.id,
            format_khr(updated.total)
        ))
        .await?;
        Ok(())
    }

    /// Deletes a draft bill.
    #[poise::command(slash_command, prefix_command)]
    pub async fn delete_bill(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Month (YYYY-MM)"] month: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let bill = resolve_bill(db, &room, &month).await?;
        authorize(ctx, Action::DeleteBill, Some(&bill)).await?;

        status::delete_bill(db, bill.id).await?;
        ctx.say(format!("🗑️ Deleted draft bill #{} for room {room}.", bill.id))
            .await?;
        Ok(())
    }

    /// Sends the month's invoices to the tenants' Telegram group as albums.
    #[poise::command(slash_command, prefix_command)]
    pub async fn bulk_send(
        ctx: Context<'_>,
        #[description = "Month (YYYY-MM)"] month: String,
        #[description = "Comma-separated room numbers (default: all rooms)"] rooms: Option<String>,
    ) -> Result<()> {
        authorize(ctx, Action::BulkSend, None).await?;
        let month = parse_month(&month)?;
        ctx.defer().await?;

        let rooms = parse_room_list(rooms.as_deref());
        let dispatched = ctx
            .data()
            .orchestrator
            .bulk_send(month, rooms.as_deref(), Some(ctx.author().id.to_string()))
            .await?;

        let response = match &dispatched {
            Dispatched::Queued { record, .. } => format!(
                "⏳ Batch #{}: {} ({} albums, {} skipped). Check `/batch_status`.",
                record.id,
                queued_message(JobType::BulkSend),
                record.total_units,
                record.skipped_bills
            ),
            Dispatched::Finished(batch) => format!(
                "📨 Batch #{}: {} ({} skipped)",
                batch.id, batch.message, batch.skipped_bills
            ),
        };
        ctx.say(response).await?;
        Ok(())
    }

    /// Shows the progress of a bulk send, or the most recent ones.
    #[poise::command(slash_command, prefix_command)]
    pub async fn batch_status(
        ctx: Context<'_>,
        #[description = "Batch id (default: latest five)"] batch_id: Option<i64>,
    ) -> Result<()> {
        authorize(ctx, Action::BulkSend, None).await?;
        let db = &ctx.data().database;

        let batches = match batch_id {
            Some(id) => vec![jobs::get_batch(db, id).await?],
            None => jobs::recent_batches(db, 5).await?,
        };
        if batches.is_empty() {
            ctx.say("📂 No bulk sends yet.").await?;
            return Ok(());
        }

        let mut response = String::from("📨 **Bulk sends**\n\n");
        for batch in batches {
            writeln!(
                &mut response,
                "#{} {} {}: {}/{} sent, {} failed, {} skipped. {}",
                batch.id,
                month_key(batch.month),
                batch.status,
                batch.completed_units,
                batch.total_units,
                batch.failed_units,
                batch.skipped_bills,
                batch.message
            )?;
        }
        ctx.say(response).await?;
        Ok(())
    }

    /// Downloads an invoice file.
    ///
    /// Tenants get the invoice of their own room once it has been sent.
    #[poise::command(slash_command, prefix_command)]
    pub async fn invoice(
        ctx: Context<'_>,
        #[description = "Month (YYYY-MM)"] month: String,
        #[description = "Room number (admins only; tenants get their own room)"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: Option<String>,
        #[description = "Invoice language (kh, en, fr)"]
        #[autocomplete = "autocomplete::autocomplete_language"]
        language: Option<String>,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let subject = ctx
            .data()
            .subject_for(&ctx.author().id.to_string())
            .await?;
        let room_number = match (&subject, room) {
            (Subject::Tenant { room_id: Some(room_id) }, _) => {
                room::get_room(db, *room_id).await?.room_number
            }
            (_, Some(room)) => room,
            (_, None) => {
                ctx.say("❌ Please choose a room.").await?;
                return Ok(());
            }
        };
        let bill = resolve_bill(db, &room_number, &month).await?;
        authorize(ctx, Action::DownloadInvoice, Some(&bill)).await?;
        let language = language_or_default(ctx, language)?;
        ctx.defer().await?;

        let (file_name, bytes) = ctx
            .data()
            .orchestrator
            .fetch_invoice(bill.id, language)
            .await?;
        ctx.send(
            poise::CreateReply::default()
                .content(format!("🧾 Invoice for room {room_number}, {}", month_key(bill.month)))
                .attachment(serenity::CreateAttachment::bytes(bytes, file_name)),
        )
        .await?;
        Ok(())
    }

    /// Sends the test message to a bill's tenant on Telegram.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping_tenant(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Month (YYYY-MM)"] month: String,
    ) -> Result<()> {
        let bill = resolve_bill(&ctx.data().database, &room, &month).await?;
        authorize(ctx, Action::RunDiagnostics, Some(&bill)).await?;

        ctx.data().orchestrator.ping_tenant(bill.id).await?;
        ctx.say(format!("📶 Test message sent to the tenant of room {room}."))
            .await?;
        Ok(())
    }

    /// Checks the Telegram bot credentials.
    #[poise::command(slash_command, prefix_command)]
    pub async fn check_telegram(ctx: Context<'_>) -> Result<()> {
        authorize(ctx, Action::RunDiagnostics, None).await?;
        let bot_name = ctx.data().orchestrator.check_connection().await?;
        ctx.say(format!("✅ Connected to Telegram as {bot_name}."))
            .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
