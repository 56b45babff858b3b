//! Job tracker - Records long-running operations against bills and batches, and runs them.
//!
//! Dispatch is synchronous and atomic: the pending flag is set with a conditional
//! UPDATE that only matches a bill with no job in flight, so a second dispatch for the
//! same bill is refused. The work itself is handed to a [`JobQueue`], which either runs
//! it on a bounded pool of tokio tasks or inline when background execution is off.

use crate::{
    entities::{BatchJob, BatchJobModel, JobStatus, JobType, MonthlyBill, batch_job, monthly_bill},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*, sea_query::Expr};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Longest job message stored on a bill.
pub const MAX_MESSAGE_LEN: usize = 255;

/// Result message recorded when a job is queued.
#[must_use]
pub const fn queued_message(job_type: JobType) -> &'static str {
    match job_type {
        JobType::Regen => "Re-generate queued.",
        JobType::Issue => "Issue queued.",
        JobType::Send => "Send queued.",
        JobType::BulkSend => "Bulk send queued.",
    }
}

/// Cuts a message to [`MAX_MESSAGE_LEN`] characters.
#[must_use]
pub fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_MESSAGE_LEN).collect()
}

/// Marks a job as pending on a bill.
///
/// # Errors
/// `JobAlreadyPending` if the bill already has a job in flight.
pub async fn dispatch<C>(db: &C, bill_id: i64, job_type: JobType) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = MonthlyBill::update_many()
        .col_expr(monthly_bill::Column::AsyncJobPending, Expr::value(true))
        .col_expr(monthly_bill::Column::AsyncJobType, Expr::value(Some(job_type)))
        .col_expr(
            monthly_bill::Column::LastJobStatus,
            Expr::value(Some(JobStatus::Pending)),
        )
        .col_expr(
            monthly_bill::Column::LastJobMessage,
            Expr::value(queued_message(job_type)),
        )
        .col_expr(monthly_bill::Column::LastJobAt, Expr::value(Utc::now()))
        .filter(monthly_bill::Column::Id.eq(bill_id))
        .filter(monthly_bill::Column::AsyncJobPending.eq(false))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let bill = MonthlyBill::find_by_id(bill_id)
            .one(db)
            .await?
            .ok_or(Error::BillNotFound { bill_id })?;
        let running = bill.async_job_type.unwrap_or(job_type);
        warn!(bill_id, %job_type, %running, "Dispatch refused, job already pending");
        return Err(Error::JobAlreadyPending {
            job_type: running.to_string(),
        });
    }

    info!(bill_id, %job_type, "Job dispatched");
    Ok(())
}

/// Records a job's final result on a bill and clears the pending flag.
pub async fn complete<C>(db: &C, bill_id: i64, status: JobStatus, message: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    MonthlyBill::update_many()
        .col_expr(monthly_bill::Column::AsyncJobPending, Expr::value(false))
        .col_expr(monthly_bill::Column::AsyncJobType, Expr::value(None::<JobType>))
        .col_expr(monthly_bill::Column::LastJobStatus, Expr::value(Some(status)))
        .col_expr(
            monthly_bill::Column::LastJobMessage,
            Expr::value(truncate_message(message)),
        )
        .col_expr(monthly_bill::Column::LastJobAt, Expr::value(Utc::now()))
        .filter(monthly_bill::Column::Id.eq(bill_id))
        .exec(db)
        .await?;

    match status {
        JobStatus::Failed => warn!(bill_id, %status, message, "Job finished"),
        _ => info!(bill_id, %status, message, "Job finished"),
    }
    Ok(())
}

/// Records a per-bill result of a batch operation without touching the pending flag,
/// which belongs to jobs dispatched on the bill itself.
pub async fn record_result<C>(db: &C, bill_id: i64, status: JobStatus, message: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    MonthlyBill::update_many()
        .col_expr(monthly_bill::Column::LastJobStatus, Expr::value(Some(status)))
        .col_expr(
            monthly_bill::Column::LastJobMessage,
            Expr::value(truncate_message(message)),
        )
        .col_expr(monthly_bill::Column::LastJobAt, Expr::value(Utc::now()))
        .filter(monthly_bill::Column::Id.eq(bill_id))
        .exec(db)
        .await?;
    debug!(bill_id, %status, message, "Batch result recorded on bill");
    Ok(())
}

/// Overall status and message of a batch from its unit counts.
///
/// Success only when every unit succeeded; any failure gives a failed batch, with a
/// partial message when some units did go through.
#[must_use]
pub fn batch_outcome(total: i32, completed: i32, failed: i32) -> (JobStatus, String) {
    if failed == 0 && completed == total {
        (JobStatus::Success, "All albums sent.".to_string())
    } else if completed == 0 {
        (JobStatus::Failed, "All albums failed.".to_string())
    } else {
        (
            JobStatus::Failed,
            format!("Some albums failed ({completed} sent, {failed} failed)."),
        )
    }
}

/// Creates a batch record in `pending` state.
pub async fn create_batch<C>(
    db: &C,
    job_type: JobType,
    month: NaiveDate,
    created_by: Option<String>,
    total_units: i32,
    skipped_bills: i32,
) -> Result<BatchJobModel>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let batch = batch_job::ActiveModel {
        job_type: Set(job_type),
        month: Set(month),
        created_by: Set(created_by),
        total_units: Set(total_units),
        completed_units: Set(0),
        failed_units: Set(0),
        skipped_bills: Set(skipped_bills),
        status: Set(JobStatus::Pending),
        message: Set(queued_message(job_type).to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(batch_id = batch.id, %job_type, total_units, skipped_bills, "Batch created");
    Ok(batch)
}

/// Loads a batch by id.
pub async fn get_batch<C>(db: &C, job_id: i64) -> Result<BatchJobModel>
where
    C: ConnectionTrait,
{
    BatchJob::find_by_id(job_id)
        .one(db)
        .await?
        .ok_or(Error::BatchJobNotFound { job_id })
}

/// Most recent batches, newest first.
pub async fn recent_batches<C>(db: &C, limit: u64) -> Result<Vec<BatchJobModel>>
where
    C: ConnectionTrait,
{
    BatchJob::find()
        .order_by_desc(batch_job::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Moves a batch to `running`.
pub async fn start_batch<C>(db: &C, job_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    BatchJob::update_many()
        .col_expr(batch_job::Column::Status, Expr::value(JobStatus::Running))
        .col_expr(batch_job::Column::Message, Expr::value("Sending albums."))
        .col_expr(batch_job::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(batch_job::Column::Id.eq(job_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Counts one finished unit. Each unit's result is committed on its own.
pub async fn record_unit<C>(db: &C, job_id: i64, succeeded: bool) -> Result<()>
where
    C: ConnectionTrait,
{
    let column = if succeeded {
        batch_job::Column::CompletedUnits
    } else {
        batch_job::Column::FailedUnits
    };
    BatchJob::update_many()
        .col_expr(column, Expr::col(column).add(1))
        .col_expr(batch_job::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(batch_job::Column::Id.eq(job_id))
        .exec(db)
        .await?;
    debug!(batch_id = job_id, succeeded, "Batch unit finished");
    Ok(())
}

/// Fails a batch that stopped before all of its units were processed.
///
/// Units already counted keep their results.
pub async fn abort_batch<C>(db: &C, job_id: i64, detail: &str) -> Result<BatchJobModel>
where
    C: ConnectionTrait,
{
    let batch = get_batch(db, job_id).await?;
    let mut active: batch_job::ActiveModel = batch.into();
    active.status = Set(JobStatus::Failed);
    active.message = Set(truncate_message(detail));
    active.updated_at = Set(Utc::now());
    let batch = active.update(db).await?;

    warn!(
        batch_id = batch.id,
        completed = batch.completed_units,
        failed = batch.failed_units,
        detail,
        "Batch aborted"
    );
    Ok(batch)
}

/// Computes and stores the final status of a batch.
pub async fn finish_batch<C>(db: &C, job_id: i64) -> Result<BatchJobModel>
where
    C: ConnectionTrait,
{
    let batch = get_batch(db, job_id).await?;
    let (status, message) =
        batch_outcome(batch.total_units, batch.completed_units, batch.failed_units);

    let mut active: batch_job::ActiveModel = batch.into();
    active.status = Set(status);
    active.message = Set(message);
    active.updated_at = Set(Utc::now());
    let batch = active.update(db).await?;

    info!(
        batch_id = batch.id,
        status = %batch.status,
        completed = batch.completed_units,
        failed = batch.failed_units,
        "Batch finished"
    );
    Ok(batch)
}

/// Runs job bodies either inline or on a bounded set of background tasks.
#[derive(Debug, Clone)]
pub struct JobQueue {
    background: bool,
    permits: Arc<Semaphore>,
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    task: Option<JoinHandle<()>>,
}

impl JobHandle {
    /// Whether the job body has already run to completion.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the job body to finish.
    ///
    /// # Errors
    /// `Worker` if the background task panicked.
    pub async fn wait(self) -> Result<()> {
        match self.task {
            Some(task) => task.await.map_err(|e| Error::Worker {
                detail: e.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl JobQueue {
    /// Background queue allowing `worker_count` jobs at once.
    #[must_use]
    pub fn background(worker_count: usize) -> Self {
        Self {
            background: true,
            permits: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }

    /// Queue that runs every job to completion before `submit` returns.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            background: false,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Whether jobs run on background tasks.
    #[must_use]
    pub const fn is_background(&self) -> bool {
        self.background
    }

    /// Submits a job body. Job bodies record their own results, so they return `()`.
    pub async fn submit<F>(&self, job_name: &'static str, job: F) -> JobHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.background {
            debug!(job = job_name, "Running job inline");
            job.await;
            return JobHandle { task: None };
        }

        let permits = Arc::clone(&self.permits);
        let task = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(job = job_name, "Worker pool closed, job dropped");
                return;
            };
            debug!(job = job_name, "Running job on worker");
            job.await;
        });
        JobHandle { task: Some(task) }
    }
}
