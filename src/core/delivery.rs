//! Invoice delivery orchestrator.
//!
//! Coordinates the calculator, the renderer, artifact storage, the notifier and the
//! status machine. The admin operations (regenerate, issue, send, bulk send) check
//! their guards and mark the job pending synchronously, then hand the work to the
//! [`JobQueue`]. Failures inside a job are written to the bill's job fields; they
//! never propagate out of the worker.

use crate::{
    config::{Settings, TelegramSettings},
    core::{
        calculator::{self, get_bill},
        diagnostics,
        jobs::{self, JobHandle, JobQueue},
        month::month_start,
        readings,
        report::group_thousands,
        room::get_room,
        status,
        tenant::load_occupancy,
    },
    entities::{BatchJobModel, BillStatus, JobStatus, JobType, MonthlyBill, MonthlyBillModel, Room,
        monthly_bill, room},
    errors::{Error, Result},
    integrations::{
        AlbumItem, ArtifactKey, ArtifactStore, InvoiceRenderer, InvoiceView, Language,
        Notification, Notifier, RetryPolicy, send_with_retry,
    },
};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{DatabaseConnection, QueryOrder, prelude::*};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Job message after a successful re-render.
pub const MSG_REGENERATED: &str = "Invoice regenerated.";
/// Job message after a successful issue.
pub const MSG_ISSUED: &str = "Invoice issued.";
/// Job message after a successful delivery.
pub const MSG_SENT: &str = "Sent via Telegram.";
/// Per-bill job message after a group album went out.
pub const MSG_SENT_TO_GROUP: &str = "Sent to Telegram group.";

/// What a dispatching operation hands back.
#[derive(Debug)]
pub enum Dispatched<T> {
    /// Work runs in the background; `record` is the state right after dispatch.
    Queued { record: T, handle: JobHandle },
    /// Work already ran inline; this is the final state.
    Finished(T),
}

impl<T> Dispatched<T> {
    /// The record returned with the dispatch.
    pub const fn record(&self) -> &T {
        match self {
            Self::Queued { record, .. } | Self::Finished(record) => record,
        }
    }

    /// Waits for background work, if any.
    pub async fn wait(self) -> Result<()> {
        match self {
            Self::Queued { handle, .. } => handle.wait().await,
            Self::Finished(_) => Ok(()),
        }
    }
}

/// Caption sent with a tenant's invoice.
#[must_use]
pub fn invoice_caption(
    month: NaiveDate,
    room_number: &str,
    total: Decimal,
    exchange_rate: Decimal,
) -> String {
    let usd = if exchange_rate.is_zero() {
        Decimal::ZERO
    } else {
        (total / exchange_rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };
    format!(
        "Invoice for {}\nRoom: {room_number}\nTotal: {} KHR ({usd:.2} USD)\n\nPlease download and check your invoice before paying.",
        month.format("%B %Y"),
        group_thousands(total),
    )
}

/// Caption on the first file of every group album.
#[must_use]
pub fn album_caption(month: NaiveDate) -> String {
    format!(
        "Invoices for {}\nPlease download and check your invoice before paying.",
        month.format("%B %Y")
    )
}

/// Fills `{room_number}`, `{month}` and `{bill_id}` in a test-message template.
#[must_use]
pub fn render_template(template: &str, room_number: &str, month: NaiveDate, bill_id: i64) -> String {
    template
        .replace("{room_number}", room_number)
        .replace("{month}", &month.format("%Y-%m").to_string())
        .replace("{bill_id}", &bill_id.to_string())
}

/// Runs invoice rendering and delivery for bills.
#[derive(Clone)]
pub struct Orchestrator {
    db: DatabaseConnection,
    renderer: Arc<dyn InvoiceRenderer>,
    store: Arc<dyn ArtifactStore>,
    notifier: Arc<dyn Notifier>,
    telegram: TelegramSettings,
    requests: RetryPolicy,
    albums: RetryPolicy,
    album_size: usize,
    default_language: Language,
    queue: JobQueue,
}

impl Orchestrator {
    /// Wires the orchestrator from settings.
    ///
    /// # Errors
    /// `Validation` if the default invoice language is not supported.
    pub fn new(
        db: DatabaseConnection,
        renderer: Arc<dyn InvoiceRenderer>,
        store: Arc<dyn ArtifactStore>,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
    ) -> Result<Self> {
        let queue = if settings.delivery.async_tasks {
            JobQueue::background(settings.delivery.worker_count)
        } else {
            JobQueue::inline()
        };
        Ok(Self {
            db,
            renderer,
            store,
            notifier,
            telegram: settings.telegram.clone(),
            requests: RetryPolicy::for_requests(&settings.delivery),
            albums: RetryPolicy::for_albums(&settings.delivery),
            album_size: settings.delivery.album_size.max(1),
            default_language: settings.invoices.default_language.parse()?,
            queue,
        })
    }

    /// Database handle shared with the bot layer.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Language used when none is requested.
    #[must_use]
    pub const fn default_language(&self) -> Language {
        self.default_language
    }

    /// Telegram targets and templates.
    #[must_use]
    pub const fn telegram(&self) -> &TelegramSettings {
        &self.telegram
    }

    /// Sends one notification under `policy`, turning a refusal into an error.
    async fn notify(
        &self,
        target: &str,
        notification: &Notification,
        policy: &RetryPolicy,
        operation: &str,
    ) -> Result<()> {
        let response = send_with_retry(policy, operation, || {
            self.notifier.send(target, notification)
        })
        .await
        .map_err(|e| Error::Notifier {
            detail: e.to_string(),
        })?;

        if !response.ok {
            return Err(Error::Notifier {
                detail: response
                    .detail
                    .unwrap_or_else(|| "request rejected".to_string()),
            });
        }
        Ok(())
    }

    /// Sends a text message to the landlord's admin chat.
    pub async fn notify_admin(&self, text: &str) -> Result<()> {
        let target = self
            .telegram
            .admin_chat_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::TargetNotConfigured {
                what: "admin chat ID".to_string(),
            })?;
        self.notify(
            target,
            &Notification::Text(text.to_string()),
            &self.requests,
            "admin_alert",
        )
        .await
    }

    /// Recomputes a draft bill and renders it into the store in `languages`.
    ///
    /// # Errors
    /// `InvoiceLocked` once the bill is past draft, `MissingData` when inputs are
    /// incomplete, `Renderer` when rendering fails or times out.
    async fn render_into_store(
        &self,
        bill_id: i64,
        languages: &[Language],
    ) -> Result<MonthlyBillModel> {
        let bill = get_bill(&self.db, bill_id).await?;
        if bill.status != BillStatus::Draft {
            return Err(Error::InvoiceLocked);
        }

        let computation = calculator::compute(&self.db, bill.room_id, bill.month).await?;
        let bill = calculator::store_computation(&self.db, &computation).await?;
        let occupancy = load_occupancy(&self.db, bill.room_id).await?;
        let view = InvoiceView::build(
            &bill,
            &computation,
            occupancy.tenant.as_ref().map(|t| t.display_name()),
        )?;

        for language in languages {
            let bytes = tokio::time::timeout(self.requests.timeout, self.renderer.render(&view, *language))
                .await
                .map_err(|_| Error::Renderer {
                    detail: format!("timed out after {:?}", self.requests.timeout),
                })??;
            let key = ArtifactKey::new(&computation.room.room_number, bill.month, *language);
            self.store.save(&key, &bytes).await?;
        }

        info!(bill_id, languages = languages.len(), "Invoice rendered");
        Ok(bill)
    }

    /// Returns the stored artifact, rendering it first if the bill is still a draft.
    ///
    /// # Errors
    /// `ArtifactMissing` when the artifact is missing and the bill is past draft.
    pub async fn ensure_artifact(
        &self,
        bill: &MonthlyBillModel,
        room_number: &str,
        language: Language,
    ) -> Result<Vec<u8>> {
        let key = ArtifactKey::new(room_number, bill.month, language);
        if let Some(bytes) = self.store.load(&key).await? {
            return Ok(bytes);
        }
        if bill.status != BillStatus::Draft {
            warn!(bill_id = bill.id, %language, "Invoice artifact missing on locked bill");
            return Err(Error::ArtifactMissing);
        }
        self.render_into_store(bill.id, &[language]).await?;
        self.store.load(&key).await?.ok_or(Error::ArtifactMissing)
    }

    async fn ensure_complete_data(&self, bill: &MonthlyBillModel, action: &str) -> Result<()> {
        let conditions = diagnostics::diagnose_bill(&self.db, bill).await?;
        if conditions.iter().any(|c| c.is_data()) {
            return Err(Error::MissingData {
                action: action.to_string(),
            });
        }
        Ok(())
    }

    /// Checks everything a send needs and returns the tenant's chat id.
    async fn send_guard(&self, bill: &MonthlyBillModel) -> Result<String> {
        self.ensure_complete_data(bill, "send").await?;
        status::check_transition(bill.status, BillStatus::Sent)?;
        let occupancy = load_occupancy(&self.db, bill.room_id).await?;
        Ok(occupancy.notification_target()?.to_string())
    }

    /// Delivers a bill's invoice to its tenant and marks it sent.
    ///
    /// Runs inline. Re-delivering a sent bill sends again without changing its status.
    pub async fn deliver(&self, bill_id: i64, language: Language) -> Result<MonthlyBillModel> {
        let bill = get_bill(&self.db, bill_id).await?;
        let target = self.send_guard(&bill).await?;
        let room = get_room(&self.db, bill.room_id).await?;

        let bytes = self.ensure_artifact(&bill, &room.room_number, language).await?;
        let rate = readings::get_rate(&self.db, bill.month).await?;
        let notification = Notification::Document {
            file_name: ArtifactKey::new(&room.room_number, bill.month, language).file_name(),
            bytes,
            caption: invoice_caption(bill.month, &room.room_number, bill.total, rate.exchange_rate),
        };

        self.notify(&target, &notification, &self.requests, "send_invoice")
            .await?;
        status::mark_sent(&self.db, bill_id).await
    }

    /// Submits a job body whose outcome is recorded on the bill.
    async fn run_bill_job<F>(
        &self,
        bill_id: i64,
        job_name: &'static str,
        work: F,
    ) -> Result<Dispatched<MonthlyBillModel>>
    where
        F: Future<Output = Result<&'static str>> + Send + 'static,
    {
        let db = self.db.clone();
        let handle = self
            .queue
            .submit(job_name, async move {
                // A panicking body must still clear the pending flag.
                let (status, message) = match tokio::spawn(work).await {
                    Ok(Ok(message)) => (JobStatus::Success, message.to_string()),
                    Ok(Err(e)) => (JobStatus::Failed, e.to_string()),
                    Err(e) => {
                        error!(bill_id, job = job_name, error = %e, "Job body panicked");
                        let failure = Error::Worker {
                            detail: e.to_string(),
                        };
                        (JobStatus::Failed, failure.to_string())
                    }
                };
                if let Err(e) = jobs::complete(&db, bill_id, status, &message).await {
                    error!(bill_id, job = job_name, error = %e, "Failed to record job result");
                }
            })
            .await;

        let bill = get_bill(&self.db, bill_id).await?;
        Ok(if self.queue.is_background() {
            Dispatched::Queued {
                record: bill,
                handle,
            }
        } else {
            Dispatched::Finished(bill)
        })
    }

    /// Re-renders every language of a draft bill.
    ///
    /// # Errors
    /// `InvoiceLocked` unless the bill is a draft, `JobAlreadyPending` while a job runs.
    pub async fn regenerate(&self, bill_id: i64) -> Result<Dispatched<MonthlyBillModel>> {
        let bill = get_bill(&self.db, bill_id).await?;
        if bill.status != BillStatus::Draft {
            return Err(Error::InvoiceLocked);
        }
        jobs::dispatch(&self.db, bill_id, JobType::Regen).await?;

        let this = self.clone();
        self.run_bill_job(bill_id, "regen", async move {
            this.render_into_store(bill_id, &Language::ALL).await?;
            Ok(MSG_REGENERATED)
        })
        .await
    }

    /// Issues a bill: final recompute, render in every language, then `draft → issued`.
    ///
    /// Guards are checked before anything is queued, so state violations and missing
    /// data are returned directly.
    pub async fn issue(&self, bill_id: i64) -> Result<Dispatched<MonthlyBillModel>> {
        let bill = get_bill(&self.db, bill_id).await?;
        status::issue_guard(&self.db, &bill).await?;
        jobs::dispatch(&self.db, bill_id, JobType::Issue).await?;

        let this = self.clone();
        self.run_bill_job(bill_id, "issue", async move {
            this.render_into_store(bill_id, &Language::ALL).await?;
            status::issue(&this.db, bill_id).await?;
            Ok(MSG_ISSUED)
        })
        .await
    }

    /// Sends an issued or already sent bill to its tenant.
    pub async fn send(&self, bill_id: i64, language: Language) -> Result<Dispatched<MonthlyBillModel>> {
        let bill = get_bill(&self.db, bill_id).await?;
        self.send_guard(&bill).await?;
        jobs::dispatch(&self.db, bill_id, JobType::Send).await?;

        let this = self.clone();
        self.run_bill_job(bill_id, "send", async move {
            this.deliver(bill_id, language).await?;
            Ok(MSG_SENT)
        })
        .await
    }

    /// Sends the month's invoices to the tenants' group chat as albums.
    ///
    /// Bills without a stored artifact in the default language are skipped and
    /// counted. Each album is one batch unit; a failed album never stops the rest.
    pub async fn bulk_send(
        &self,
        month: NaiveDate,
        room_numbers: Option<&[String]>,
        created_by: Option<String>,
    ) -> Result<Dispatched<BatchJobModel>> {
        let month = month_start(month);
        let group = self
            .telegram
            .group_chat_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::TargetNotConfigured {
                what: "group chat ID".to_string(),
            })?
            .to_string();

        let mut rooms_query = Room::find().order_by_asc(room::Column::RoomNumber);
        if let Some(numbers) = room_numbers {
            rooms_query =
                rooms_query.filter(room::Column::RoomNumber.is_in(numbers.iter().map(String::as_str)));
        }
        let rooms = rooms_query.all(&self.db).await?;
        let room_numbers_by_id: HashMap<i64, String> =
            rooms.iter().map(|r| (r.id, r.room_number.clone())).collect();

        let bills = MonthlyBill::find()
            .filter(monthly_bill::Column::Month.eq(month))
            .filter(monthly_bill::Column::RoomId.is_in(room_numbers_by_id.keys().copied()))
            .all(&self.db)
            .await?;
        if bills.is_empty() {
            return Err(Error::Validation {
                message: "No invoices found for the selected month.".to_string(),
            });
        }

        let mut items: Vec<(String, i64, AlbumItem)> = Vec::new();
        let mut skipped = 0_i32;
        for bill in &bills {
            let Some(room_number) = room_numbers_by_id.get(&bill.room_id) else {
                continue;
            };
            let key = ArtifactKey::new(room_number, month, self.default_language);
            match self.store.load(&key).await? {
                Some(bytes) => items.push((
                    room_number.clone(),
                    bill.id,
                    AlbumItem {
                        file_name: key.file_name(),
                        bytes,
                        caption: None,
                    },
                )),
                None => skipped += 1,
            }
        }
        if items.is_empty() {
            return Err(Error::Validation {
                message: "No invoice files found to send.".to_string(),
            });
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));

        let caption = album_caption(month);
        let albums: Vec<Vec<(i64, AlbumItem)>> = items
            .chunks(self.album_size)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .map(|(index, (_, bill_id, item))| {
                        let mut item = item.clone();
                        if index == 0 {
                            item.caption = Some(caption.clone());
                        }
                        (*bill_id, item)
                    })
                    .collect()
            })
            .collect();

        let total_units = i32::try_from(albums.len()).unwrap_or(i32::MAX);
        let batch = jobs::create_batch(
            &self.db,
            JobType::BulkSend,
            month,
            created_by,
            total_units,
            skipped,
        )
        .await?;
        if skipped > 0 {
            warn!(batch_id = batch.id, skipped, "Skipped invoices with missing files");
        }

        let this = self.clone();
        let batch_id = batch.id;
        let handle = self
            .queue
            .submit("bulk_send", async move {
                let db = this.db.clone();
                let outcome =
                    tokio::spawn(async move { this.send_albums(batch_id, &group, albums).await })
                        .await;
                let failure = match outcome {
                    Ok(Ok(_)) => return,
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => Error::Worker {
                        detail: e.to_string(),
                    }
                    .to_string(),
                };
                error!(batch_id, error = %failure, "Bulk send aborted");
                if let Err(e) = jobs::abort_batch(&db, batch_id, &failure).await {
                    error!(batch_id, error = %e, "Failed to mark batch as failed");
                }
            })
            .await;

        Ok(if self.queue.is_background() {
            Dispatched::Queued {
                record: batch,
                handle,
            }
        } else {
            Dispatched::Finished(jobs::get_batch(&self.db, batch_id).await?)
        })
    }

    async fn send_albums(
        &self,
        batch_id: i64,
        group: &str,
        albums: Vec<Vec<(i64, AlbumItem)>>,
    ) -> Result<BatchJobModel> {
        // Bookkeeping errors are logged per unit so the batch always reaches a final status.
        if let Err(e) = jobs::start_batch(&self.db, batch_id).await {
            error!(batch_id, error = %e, "Failed to mark batch running");
        }

        for (index, album) in albums.into_iter().enumerate() {
            let (bill_ids, items): (Vec<i64>, Vec<AlbumItem>) = album.into_iter().unzip();
            let outcome = self
                .notify(group, &Notification::Album(items), &self.albums, "send_album")
                .await;

            let (status, message) = match &outcome {
                Ok(()) => (JobStatus::Success, MSG_SENT_TO_GROUP.to_string()),
                Err(e) => (JobStatus::Failed, e.to_string()),
            };
            for bill_id in &bill_ids {
                if let Err(e) = jobs::record_result(&self.db, *bill_id, status, &message).await {
                    error!(batch_id, bill_id, error = %e, "Failed to record album result");
                }
            }
            if let Err(e) = jobs::record_unit(&self.db, batch_id, outcome.is_ok()).await {
                error!(batch_id, album = index + 1, error = %e, "Failed to count album");
            }
            info!(batch_id, album = index + 1, bills = bill_ids.len(), ok = outcome.is_ok(), "Album processed");
        }

        jobs::finish_batch(&self.db, batch_id).await
    }

    /// Returns the invoice file for download as `(file name, bytes)`.
    ///
    /// Rendering on demand only happens while the bill is a draft.
    pub async fn fetch_invoice(&self, bill_id: i64, language: Language) -> Result<(String, Vec<u8>)> {
        let bill = get_bill(&self.db, bill_id).await?;
        self.ensure_complete_data(&bill, "download").await?;
        let room = get_room(&self.db, bill.room_id).await?;
        let bytes = self
            .ensure_artifact(&bill, &room.room_number, language)
            .await
            .map_err(|e| match e {
                Error::ArtifactMissing if bill.status != BillStatus::Draft => Error::InvoiceLocked,
                other => other,
            })?;
        let file_name = ArtifactKey::new(&room.room_number, bill.month, language).file_name();
        Ok((file_name, bytes))
    }

    /// Sends the configured test message to the bill's tenant.
    pub async fn ping_tenant(&self, bill_id: i64) -> Result<()> {
        let bill = get_bill(&self.db, bill_id).await?;
        let occupancy = load_occupancy(&self.db, bill.room_id).await?;
        let target = occupancy.notification_target()?;
        let text = render_template(
            &self.telegram.test_message_template,
            &occupancy.room.room_number,
            bill.month,
            bill.id,
        );
        self.notify(target, &Notification::Text(text), &self.requests, "ping_tenant")
            .await?;
        info!(bill_id, room = %occupancy.room.room_number, "Test message sent");
        Ok(())
    }

    /// Verifies the bot credentials, returning the bot's name.
    pub async fn check_connection(&self) -> Result<String> {
        send_with_retry(&self.requests, "check_connection", || self.notifier.health_check())
            .await
            .map_err(|e| Error::Notifier {
                detail: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::calculator;
    use crate::test_utils::*;
    use chrono::Datelike;
    use rust_decimal_macros::dec;

    async fn issued_bill(
        orchestrator: &Orchestrator,
        fixture: &BillingFixture,
    ) -> Result<MonthlyBillModel> {
        let bill =
            calculator::recalculate_bill(orchestrator.db(), fixture.room.id, fixture.month).await?;
        let issued = orchestrator.issue(bill.id).await?;
        Ok(issued.record().clone())
    }

    #[test]
    fn test_caption_and_template() {
        let month = test_month();
        let caption = invoice_caption(month, "A1", dec!(440000), dec!(4000));
        assert!(caption.starts_with("Invoice for February 2025"));
        assert!(caption.contains("Room: A1"));
        assert!(caption.contains("Total: 440,000 KHR (110.00 USD)"));

        let text = render_template("Ping {room_number} {month} #{bill_id}", "B2", month, 7);
        assert_eq!(text, "Ping B2 2025-02 #7");
    }

    #[tokio::test]
    async fn test_issue_renders_every_language() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, notifier, store) = test_orchestrator(&db, false)?;

        let bill = issued_bill(&orchestrator, &fixture).await?;
        assert_eq!(bill.status, BillStatus::Issued);
        assert_eq!(bill.last_job_status, Some(JobStatus::Success));
        assert_eq!(bill.last_job_message, MSG_ISSUED);
        assert!(!bill.async_job_pending);
        assert_eq!(store.len(), 3);
        assert_eq!(notifier.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_marks_sent_and_resend_is_idempotent() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, notifier, _store) = test_orchestrator(&db, false)?;
        let issued = issued_bill(&orchestrator, &fixture).await?;

        let sent = orchestrator.send(issued.id, Language::Khmer).await?;
        let sent = sent.record().clone();
        assert_eq!(sent.status, BillStatus::Sent);
        assert_eq!(sent.last_job_message, MSG_SENT);
        let first_sent_at = sent.sent_at;

        let calls = notifier.sent();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "1001");
        assert!(matches!(
            &calls[0].1,
            Notification::Document { caption, file_name, .. }
                if caption.contains("440,000 KHR") && file_name == "invoice_room_A1_2025_02_kh.txt"
        ));

        let again = orchestrator.send(issued.id, Language::Khmer).await?;
        let again = again.record().clone();
        assert_eq!(again.status, BillStatus::Sent);
        assert_eq!(again.sent_at, first_sent_at);
        assert_eq!(again.issued_at, issued.issued_at);
        assert_eq!(notifier.count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_rejects_draft_synchronously() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, notifier, _store) = test_orchestrator(&db, false)?;
        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;

        let result = orchestrator.send(bill.id, Language::Khmer).await;
        assert_eq!(
            result.err().map(|e| e.to_string()).as_deref(),
            Some("Invoice can only be sent when status is Issued or Sent.")
        );
        let bill = calculator::get_bill(&db, bill.id).await?;
        assert!(!bill.async_job_pending);
        assert!(bill.last_job_status.is_none());
        assert_eq!(notifier.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_artifact_on_issued_bill_fails_job() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, notifier, store) = test_orchestrator(&db, false)?;
        let issued = issued_bill(&orchestrator, &fixture).await?;
        store.remove(&ArtifactKey::new("A1", fixture.month, Language::Khmer));

        let result = orchestrator.send(issued.id, Language::Khmer).await?;
        let bill = result.record();
        assert_eq!(bill.status, BillStatus::Issued);
        assert_eq!(bill.last_job_status, Some(JobStatus::Failed));
        assert_eq!(bill.last_job_message, "Invoice file missing.");
        assert!(!bill.async_job_pending);
        assert_eq!(notifier.count(), 0);

        // downloads and re-renders of a locked bill are refused as locked
        let download = orchestrator.fetch_invoice(issued.id, Language::Khmer).await;
        assert!(matches!(download, Err(Error::InvoiceLocked)));
        let regen = orchestrator.regenerate(issued.id).await;
        assert!(matches!(regen, Err(Error::InvoiceLocked)));
        Ok(())
    }

    #[tokio::test]
    async fn test_panicking_job_clears_pending_flag() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, store) =
            test_orchestrator_with_renderer(&db, Arc::new(CrashingRenderer), true)?;
        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;

        let first = orchestrator.regenerate(bill.id).await?;
        assert!(matches!(first, Dispatched::Queued { .. }));
        first.wait().await?;

        let bill = calculator::get_bill(&db, bill.id).await?;
        assert!(!bill.async_job_pending);
        assert!(bill.async_job_type.is_none());
        assert_eq!(bill.last_job_status, Some(JobStatus::Failed));
        assert!(bill.last_job_message.starts_with("Background job failed:"));
        assert!(bill.last_job_message.contains("panicked"));
        assert_eq!(store.len(), 0);

        // the bill accepts a new job afterwards
        let second = orchestrator.regenerate(bill.id).await?;
        second.wait().await?;
        let bill = calculator::get_bill(&db, bill.id).await?;
        assert!(!bill.async_job_pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_network_failures_are_retried() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let notifier = Arc::new(RecordingNotifier::failing_times(2));
        let (orchestrator, store) = test_orchestrator_with(&db, Arc::clone(&notifier), false)?;
        let issued = issued_bill(&orchestrator, &fixture).await?;
        assert_eq!(store.len(), 3);

        let sent = orchestrator.send(issued.id, Language::Khmer).await?;
        assert_eq!(sent.record().status, BillStatus::Sent);
        assert_eq!(notifier.attempts(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_send_keeps_status() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let notifier = Arc::new(RecordingNotifier::rejecting("Bad Request: chat not found"));
        let (orchestrator, _store) = test_orchestrator_with(&db, Arc::clone(&notifier), false)?;
        let issued = issued_bill(&orchestrator, &fixture).await?;

        let result = orchestrator.send(issued.id, Language::Khmer).await?;
        let bill = result.record();
        assert_eq!(bill.status, BillStatus::Issued);
        assert!(bill.sent_at.is_none());
        assert_eq!(bill.last_job_status, Some(JobStatus::Failed));
        assert_eq!(
            bill.last_job_message,
            "Telegram send failed: Bad Request: chat not found"
        );
        // a refusal is not a network error, so it is tried once
        assert_eq!(notifier.attempts(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_background_send_refuses_second_dispatch() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let notifier = Arc::new(RecordingNotifier::gated());
        let (orchestrator, store) = test_orchestrator_with(&db, Arc::clone(&notifier), true)?;

        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;
        orchestrator.issue(bill.id).await?.wait().await?;
        assert_eq!(store.len(), 3);

        let first = orchestrator.send(bill.id, Language::Khmer).await?;
        assert!(matches!(first, Dispatched::Queued { .. }));
        assert!(first.record().async_job_pending);

        let second = orchestrator.send(bill.id, Language::Khmer).await;
        assert!(matches!(second, Err(Error::JobAlreadyPending { .. })));

        notifier.release();
        first.wait().await?;
        let bill = calculator::get_bill(&db, bill.id).await?;
        assert_eq!(bill.status, BillStatus::Sent);
        assert!(!bill.async_job_pending);
        assert_eq!(notifier.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_send_partial_failure() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        // two albums of two; the second album is refused
        let notifier = Arc::new(RecordingNotifier::rejecting_after(1, "Too many files"));
        let (orchestrator, _store) =
            test_orchestrator_with_album_size(&db, Arc::clone(&notifier), 2)?;

        let mut bill_ids = vec![issued_bill(&orchestrator, &fixture).await?.id];
        for (number, chat) in [("A2", "1002"), ("A3", "1003")] {
            let room = add_issuable_room(&db, number, chat).await?;
            let bill = calculator::recalculate_bill(&db, room.id, fixture.month).await?;
            orchestrator.issue(bill.id).await?;
            bill_ids.push(bill.id);
        }
        // a draft without an artifact is skipped
        let bare = create_test_room(&db, "Z9", dec!(50)).await?;
        calculator::recalculate_bill(&db, bare.id, fixture.month).await?;

        let batch = orchestrator.bulk_send(fixture.month, None, Some("admin".to_string())).await?;
        let batch = batch.record().clone();
        assert_eq!(batch.total_units, 2);
        assert_eq!(batch.completed_units, 1);
        assert_eq!(batch.failed_units, 1);
        assert_eq!(batch.skipped_bills, 1);
        assert_eq!(batch.status, JobStatus::Failed);
        assert!(batch.message.starts_with("Some albums failed"));

        let sent = notifier.sent();
        assert_eq!(sent[0].0, "-100200");
        assert!(matches!(
            &sent[0].1,
            Notification::Album(items) if items.len() == 2 && items[0].caption.is_some() && items[1].caption.is_none()
        ));

        let first = calculator::get_bill(&db, bill_ids[0]).await?;
        assert_eq!(first.last_job_message, MSG_SENT_TO_GROUP);
        assert_eq!(first.status, BillStatus::Issued);
        let last = calculator::get_bill(&db, bill_ids[2]).await?;
        assert_eq!(last.last_job_status, Some(JobStatus::Failed));
        assert_eq!(last.last_job_message, "Telegram send failed: Too many files");
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_send_accepts_any_day_of_month() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, notifier, _store) = test_orchestrator(&db, false)?;
        issued_bill(&orchestrator, &fixture).await?;

        let mid_month = fixture.month.with_day(17).unwrap();
        let batch = orchestrator.bulk_send(mid_month, None, None).await?;
        let batch = batch.record().clone();
        assert_eq!(batch.month, fixture.month);
        assert_eq!(batch.total_units, 1);
        assert_eq!(batch.status, JobStatus::Success);
        assert_eq!(notifier.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_send_crash_fails_batch() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let notifier = Arc::new(RecordingNotifier::crashing());
        let (orchestrator, _store) = test_orchestrator_with(&db, notifier, false)?;
        issued_bill(&orchestrator, &fixture).await?;

        let batch = orchestrator.bulk_send(fixture.month, None, None).await?;
        let batch = batch.record().clone();
        assert_eq!(batch.status, JobStatus::Failed);
        assert!(batch.message.starts_with("Background job failed:"));
        assert_eq!(batch.completed_units, 0);

        let latest = jobs::recent_batches(&db, 1).await?;
        assert_eq!(latest[0].status, JobStatus::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_send_needs_group_and_files() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, _notifier, _store) = test_orchestrator(&db, false)?;

        let result = orchestrator.bulk_send(fixture.month, None, None).await;
        assert_eq!(
            result.err().map(|e| e.to_string()).as_deref(),
            Some("No invoices found for the selected month.")
        );

        calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;
        let result = orchestrator.bulk_send(fixture.month, None, None).await;
        assert_eq!(
            result.err().map(|e| e.to_string()).as_deref(),
            Some("No invoice files found to send.")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_invoice_rules() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, _notifier, store) = test_orchestrator(&db, false)?;
        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;

        // draft: rendered on demand
        let (file_name, bytes) = orchestrator.fetch_invoice(bill.id, Language::English).await?;
        assert_eq!(file_name, "invoice_room_A1_2025_02_en.txt");
        assert!(!bytes.is_empty());
        assert_eq!(store.len(), 1);

        // incomplete data is refused
        let empty = create_test_room(&db, "B1", dec!(80)).await?;
        let incomplete = calculator::recalculate_bill(&db, empty.id, fixture.month).await?;
        let result = orchestrator.fetch_invoice(incomplete.id, Language::English).await;
        assert!(matches!(result, Err(Error::MissingData { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_ping_and_connection_check() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let (orchestrator, notifier, _store) = test_orchestrator(&db, false)?;
        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;

        orchestrator.ping_tenant(bill.id).await?;
        let sent = notifier.sent();
        assert_eq!(sent[0], ("1001".to_string(), Notification::Text("Test message for room A1.".to_string())));

        assert_eq!(orchestrator.check_connection().await?, "@test_bot");

        crate::core::tenant::upsert_profile(&db, fixture.tenant.id, None, None).await?;
        let result = orchestrator.ping_tenant(bill.id).await;
        assert!(matches!(result, Err(Error::NoNotificationTarget)));
        Ok(())
    }
}
