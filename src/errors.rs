//! Unified error type for the billing core, its integrations and the bot layer.
//!
//! Variants are grouped by how they propagate: state violations and data integrity
//! problems are returned to the caller synchronously, external dependency failures
//! are captured into job results once work has moved to the background.

use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Meter readings went backwards between two months.
    #[error(
        "{utility} meter value cannot decrease (previous {previous}, current {current})"
    )]
    DataIntegrity {
        /// Utility whose usage came out negative
        utility: String,
        /// Previous meter value
        previous: i64,
        /// Current meter value
        current: i64,
    },

    /// A status change that would move a bill backwards or skip a step.
    #[error("{reason}")]
    InvalidTransition {
        /// Status the bill was in
        from: String,
        /// Status that was requested
        to: String,
        /// Human-readable reason shown to the operator
        reason: String,
    },

    /// Any field edit or recompute attempted on a non-draft bill.
    #[error("Bill is locked while {status}; only draft bills can be changed.")]
    BillLocked {
        /// Current status of the bill
        status: String,
    },

    /// Deleting an advanced bill.
    #[error("Only draft bills can be deleted (bill is {status}).")]
    DeleteForbidden {
        /// Current status of the bill
        status: String,
    },

    /// Rate entry or readings are absent for an action that needs them.
    #[error("Cannot {action} invoice: required utility data is missing.")]
    MissingData {
        /// Action that was refused ("issue", "send", ...)
        action: String,
    },

    /// A background job for the bill has not finished yet.
    #[error("A {job_type} job is already pending for this bill.")]
    JobAlreadyPending {
        /// Type of the job still running
        job_type: String,
    },

    /// The compare-and-set on the status column lost against a concurrent writer.
    #[error("Bill status changed concurrently (expected {expected}); reload and retry.")]
    StaleStatus {
        /// Status the update expected to find
        expected: String,
    },

    /// The room has no current tenant.
    #[error("Room {room_number} has no occupant.")]
    NoOccupant {
        /// Room number
        room_number: String,
    },

    /// The tenant has no profile record.
    #[error("Tenant profile for {tenant} is missing.")]
    NoProfile {
        /// Tenant display name
        tenant: String,
    },

    /// The tenant profile has no Telegram chat id.
    #[error("Tenant Telegram chat ID is missing.")]
    NoNotificationTarget,

    /// A configured chat/group target is absent.
    #[error("Telegram {what} is not configured.")]
    TargetNotConfigured {
        /// Which setting is missing
        what: String,
    },

    /// The rendered invoice file is absent when it is needed.
    #[error("Invoice file missing.")]
    ArtifactMissing,

    /// The rendered invoice is absent and the bill is past draft.
    #[error("Invoice is locked; re-generate is only allowed in Draft status.")]
    InvoiceLocked,

    /// Room lookup failed.
    #[error("Room '{room}' not found.")]
    RoomNotFound {
        /// Room number or id
        room: String,
    },

    /// Bill lookup failed.
    #[error("Bill {bill_id} not found.")]
    BillNotFound {
        /// Bill id
        bill_id: i64,
    },

    /// Tenant lookup failed.
    #[error("Tenant '{tenant}' not found.")]
    TenantNotFound {
        /// Tenant username or id
        tenant: String,
    },

    /// No rate table entry exists for the month.
    #[error("No unit prices recorded for {month}.")]
    RateNotFound {
        /// Month as `YYYY-MM`
        month: String,
    },

    /// Batch job lookup failed.
    #[error("Batch job {job_id} not found.")]
    BatchJobNotFound {
        /// Batch job id
        job_id: i64,
    },

    /// Caller is not permitted to perform the action.
    #[error("You are not allowed to {action}.")]
    Forbidden {
        /// Action that was denied
        action: String,
    },

    /// Notification sender failure (after retries).
    #[error("Telegram send failed: {detail}")]
    Notifier {
        /// Upstream error detail
        detail: String,
    },

    /// Invoice renderer failure.
    #[error("Invoice rendering failed: {detail}")]
    Renderer {
        /// Upstream error detail
        detail: String,
    },

    /// A background worker task ended abnormally.
    #[error("Background job failed: {detail}")]
    Worker {
        /// Join error detail
        detail: String,
    },

    /// Input validation failure.
    #[error("{message}")]
    Validation {
        /// Explanation of what was wrong
        message: String,
    },

    /// Configuration loading failure.
    #[error("Configuration error: {message}")]
    Config {
        /// Explanation of what was wrong
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

impl Error {
    /// True for failures of the external renderer or notifier.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        matches!(self, Self::Notifier { .. } | Self::Renderer { .. } | Self::Http(_))
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
