//! Monthly bill entity - One room's computed charges for one calendar month.
//!
//! Money fields are in local currency. `status` only ever moves forward
//! (draft → issued → sent → paid); the job-tracking columns record the most recent
//! background operation run against the bill.

use super::enums::{BillStatus, JobStatus, JobType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Monthly bill database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monthly_bills")]
pub struct Model {
    /// Unique identifier for the bill
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Room being billed
    pub room_id: i64,
    /// First day of the billing month; (room, month) is unique
    pub month: Date,
    /// Rent converted to local currency
    pub room_cost: Decimal,
    /// Water usage times unit price
    pub water_cost: Decimal,
    /// Electricity usage times unit price
    pub electricity_cost: Decimal,
    /// Sum of the three costs
    pub total: Decimal,
    /// Lifecycle status
    pub status: BillStatus,
    /// When the bill was issued
    pub issued_at: Option<DateTimeUtc>,
    /// First successful delivery
    pub sent_at: Option<DateTimeUtc>,
    /// When payment was confirmed
    pub paid_at: Option<DateTimeUtc>,
    /// Non-empty when source data was missing at the last computation
    pub data_note: String,
    /// Occupant name frozen at issue time
    pub tenant_name_snapshot: Option<String>,
    /// A background job is in flight
    pub async_job_pending: bool,
    /// Type of the in-flight job
    pub async_job_type: Option<JobType>,
    /// Outcome of the last job
    pub last_job_status: Option<JobStatus>,
    /// Short result message of the last job
    pub last_job_message: String,
    /// When the last job result was recorded
    pub last_job_at: Option<DateTimeUtc>,
    /// When the bill was first generated
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Whether the computed data was incomplete.
    #[must_use]
    pub fn has_data_note(&self) -> bool {
        !self.data_note.is_empty()
    }
}

/// Defines relationships between `MonthlyBill` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each bill belongs to one room
    #[sea_orm(
        belongs_to = "super::room::Entity",
        from = "Column::RoomId",
        to = "super::room::Column::Id"
    )]
    Room,
}

impl Related<super::room::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Room.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
