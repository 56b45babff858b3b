//! String-backed enums stored in entity columns.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a monthly bill. Declaration order is the lifecycle order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    /// Computed, still editable
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Locked and deliverable
    #[sea_orm(string_value = "issued")]
    Issued,
    /// Delivered to the tenant at least once
    #[sea_orm(string_value = "sent")]
    Sent,
    /// Payment confirmed manually
    #[sea_orm(string_value = "paid")]
    Paid,
}

impl BillStatus {
    /// Position in the lifecycle: draft 0, issued 1, sent 2, paid 3.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Issued => 1,
            Self::Sent => 2,
            Self::Paid => 3,
        }
    }

    /// Capitalised label used in operator messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Issued => "Issued",
            Self::Sent => "Sent",
            Self::Paid => "Paid",
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metered utility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
#[serde(rename_all = "snake_case")]
pub enum Utility {
    /// Water meter, cubic metres
    #[sea_orm(string_value = "water")]
    Water,
    /// Electricity meter, kWh
    #[sea_orm(string_value = "electricity")]
    Electricity,
}

impl Utility {
    /// Both utilities in billing order.
    pub const ALL: [Self; 2] = [Self::Water, Self::Electricity];
}

impl fmt::Display for Utility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Water => "Water",
            Self::Electricity => "Electricity",
        })
    }
}

/// Kind of long-running operation tracked against a bill or batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[sea_orm(string_value = "regen")]
    Regen,
    #[sea_orm(string_value = "issue")]
    Issue,
    #[sea_orm(string_value = "send")]
    Send,
    #[sea_orm(string_value = "bulk_send")]
    BulkSend,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Regen => "regen",
            Self::Issue => "issue",
            Self::Send => "send",
            Self::BulkSend => "bulk_send",
        })
    }
}

/// Progress of a tracked job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl JobStatus {
    /// Success and failure are terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        })
    }
}
