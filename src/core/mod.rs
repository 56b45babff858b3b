//! Core business logic, independent of Discord and Telegram.
//!
//! Bills are computed by [`calculator`], moved through their lifecycle by
//! [`status`], and rendered and delivered by [`delivery`], which records job
//! outcomes through [`jobs`].

/// Bill computation, storage and bulk generation
pub mod calculator;
/// Invoice rendering and delivery orchestration
pub mod delivery;
/// Per-bill readiness conditions
pub mod diagnostics;
/// Smart alerts for the admin chat
pub mod insights;
/// Job tracking and the background job queue
pub mod jobs;
/// Billing month helpers
pub mod month;
/// Access policy for every entry point
pub mod policy;
/// Meter readings and the rate table
pub mod readings;
/// Monthly report aggregation
pub mod report;
/// Room management
pub mod room;
/// Bill status machine
pub mod status;
/// Tenants, profiles and occupancy
pub mod tenant;
