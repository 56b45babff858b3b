//! Batch job entity - Aggregate progress of a group operation spanning many bills.
//!
//! Rows are append-only; progress columns are updated in place while the job runs.

use super::enums::{JobStatus, JobType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Batch job database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batch_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Operation performed
    pub job_type: JobType,
    /// Billing month the batch covers
    pub month: Date,
    /// Discord user id of the initiator
    pub created_by: Option<String>,
    /// Number of units (albums) to process
    pub total_units: i32,
    /// Units delivered successfully
    pub completed_units: i32,
    /// Units that failed after retries
    pub failed_units: i32,
    /// Bills left out because their invoice file was missing
    pub skipped_bills: i32,
    /// Overall status
    pub status: JobStatus,
    /// Human-readable progress message
    pub message: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
