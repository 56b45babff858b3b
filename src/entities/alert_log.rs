//! Alert log entity - Remembers which smart alerts were already sent.
//! (month, `alert_type`, `room_id`) is unique so each alert fires once.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Alert log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Billing month the alert refers to
    pub month: Date,
    /// Alert key, e.g. `"unpaid_overdue"`
    pub alert_type: String,
    /// Room for per-room alerts
    pub room_id: Option<i64>,
    /// Message that was delivered
    pub message: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
