//! Shared test utilities for the rent house crate.
//!
//! This module provides helpers for setting up test databases, a fully billable
//! room fixture, and in-memory stand-ins for the notifier and artifact store.

#![allow(clippy::unwrap_used)]

use crate::{
    config::Settings,
    core::{
        calculator,
        delivery::Orchestrator,
        month::previous_month,
        readings, room, status,
        tenant::{self, create_tenant},
    },
    entities::{
        BillStatus, MeterReadingModel, MonthlyBillModel, RoomModel, TenantModel,
        TenantProfileModel, UnitPriceModel, Utility,
    },
    errors::Result,
    integrations::{
        ArtifactKey, ArtifactStore, InvoiceRenderer, InvoiceView, Language, Notification,
        Notifier, NotifierError, NotifierResponse, TextInvoiceRenderer,
    },
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// February 2025, the billing month used throughout the tests.
pub fn test_month() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
}

/// January 2025, the month holding the fixture's previous readings.
pub fn previous_test_month() -> NaiveDate {
    previous_month(test_month())
}

/// First day of the month before `month`.
pub fn previous_month_of(month: NaiveDate) -> NaiveDate {
    previous_month(month)
}

/// Creates a room with the given number and base-currency price.
pub async fn create_test_room(
    db: &DatabaseConnection,
    room_number: &str,
    price: Decimal,
) -> Result<RoomModel> {
    room::create_room(db, room_number, price).await
}

/// Creates a tenant with an empty full name.
pub async fn create_test_tenant(db: &DatabaseConnection, username: &str) -> Result<TenantModel> {
    create_tenant(db, username, "").await
}

/// Records unit prices for a month.
pub async fn create_test_rate(
    db: &DatabaseConnection,
    month: NaiveDate,
    water: Decimal,
    electricity: Decimal,
    exchange_rate: Decimal,
) -> Result<UnitPriceModel> {
    readings::set_rate(db, month, water, electricity, exchange_rate).await
}

/// Records a regular (non-initial) meter reading.
pub async fn create_test_reading(
    db: &DatabaseConnection,
    room_id: i64,
    utility: Utility,
    date: NaiveDate,
    value: i64,
) -> Result<MeterReadingModel> {
    readings::record_reading(db, room_id, utility, date, value, false).await
}

/// A room with everything needed to issue and send its February bill.
#[derive(Debug, Clone)]
pub struct BillingFixture {
    pub room: RoomModel,
    pub tenant: TenantModel,
    pub profile: TenantProfileModel,
    pub month: NaiveDate,
}

async fn occupy(
    db: &DatabaseConnection,
    room: &RoomModel,
    username: &str,
    full_name: &str,
    chat_id: &str,
) -> Result<(RoomModel, TenantModel, TenantProfileModel)> {
    let tenant = create_tenant(db, username, full_name).await?;
    let room = room::assign_occupant(db, room.id, Some(tenant.id)).await?;
    let profile =
        tenant::upsert_profile(db, tenant.id, None, Some(chat_id.to_string())).await?;

    create_test_reading(db, room.id, Utility::Water, previous_test_month(), 50).await?;
    create_test_reading(db, room.id, Utility::Water, test_month(), 60).await?;
    create_test_reading(db, room.id, Utility::Electricity, previous_test_month(), 500).await?;
    create_test_reading(db, room.id, Utility::Electricity, test_month(), 520).await?;
    Ok((room, tenant, profile))
}

/// Sets up the standard billing scenario.
///
/// # Defaults
/// * room `A1` priced 100, occupied by `sokha` ("Sokha Chan") with chat `1001`
/// * February rate: water 2000, electricity 1000, exchange rate 4000
/// * water 50 -> 60, electricity 500 -> 520
///
/// The resulting bill totals 440000.
pub async fn setup_billing_fixture() -> Result<(DatabaseConnection, BillingFixture)> {
    let db = setup_test_db().await?;
    create_test_rate(&db, test_month(), dec!(2000), dec!(1000), dec!(4000)).await?;
    let room = create_test_room(&db, "A1", dec!(100)).await?;
    let (room, tenant, profile) = occupy(&db, &room, "sokha", "Sokha Chan", "1001").await?;
    Ok((
        db,
        BillingFixture {
            room,
            tenant,
            profile,
            month: test_month(),
        },
    ))
}

/// Adds another fully billable room next to the fixture, with the same readings.
pub async fn add_issuable_room(
    db: &DatabaseConnection,
    room_number: &str,
    chat_id: &str,
) -> Result<RoomModel> {
    let room = create_test_room(db, room_number, dec!(100)).await?;
    let username = format!("tenant_{}", room_number.to_lowercase());
    let full_name = format!("Tenant {room_number}");
    let (room, _, _) = occupy(db, &room, &username, &full_name, chat_id).await?;
    Ok(room)
}

/// Generates the fixture bill and walks it forward to `target`.
pub async fn setup_bill_in(target: BillStatus) -> Result<(DatabaseConnection, MonthlyBillModel)> {
    let (db, fixture) = setup_billing_fixture().await?;
    let mut bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;
    if target.ordinal() >= BillStatus::Issued.ordinal() {
        bill = status::issue(&db, bill.id).await?;
    }
    if target.ordinal() >= BillStatus::Sent.ordinal() {
        bill = status::mark_sent(&db, bill.id).await?;
    }
    if target == BillStatus::Paid {
        bill = status::mark_paid(&db, bill.id).await?;
    }
    Ok((db, bill))
}

/// Notifier that records every accepted call.
///
/// Failure modes are configured at construction: a number of leading network
/// errors, refusals (optionally after some accepted calls), or a gate that holds
/// each call until [`RecordingNotifier::release`] is called.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
    attempts: AtomicUsize,
    network_failures: AtomicUsize,
    reject_detail: Option<String>,
    accept_before_reject: Option<usize>,
    gate: Option<Semaphore>,
    crash: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `times` calls with a network error.
    pub fn failing_times(times: usize) -> Self {
        Self {
            network_failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    /// Refuses every call with `detail`.
    pub fn rejecting(detail: &str) -> Self {
        Self {
            reject_detail: Some(detail.to_string()),
            ..Self::default()
        }
    }

    /// Accepts `accepted` calls, then refuses with `detail`.
    pub fn rejecting_after(accepted: usize, detail: &str) -> Self {
        Self {
            reject_detail: Some(detail.to_string()),
            accept_before_reject: Some(accepted),
            ..Self::default()
        }
    }

    /// Holds calls until released.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Panics on every call, like a worker hitting a bug mid-send.
    pub fn crashing() -> Self {
        Self {
            crash: true,
            ..Self::default()
        }
    }

    /// Lets held calls through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Accepted calls as (target, notification).
    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of accepted calls.
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of calls made, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        target: &str,
        notification: &Notification,
    ) -> std::result::Result<NotifierResponse, NotifierError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        assert!(!self.crash, "notifier crashed");
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| NotifierError::Invalid(e.to_string()))?;
        }

        let remaining = self.network_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.network_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(NotifierError::Network("connection reset by peer".to_string()));
        }

        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(detail) = &self.reject_detail {
            if self.accept_before_reject.is_none_or(|limit| sent.len() >= limit) {
                return Ok(NotifierResponse::failure(detail.clone()));
            }
        }
        sent.push((target.to_string(), notification.clone()));
        Ok(NotifierResponse::success())
    }

    async fn health_check(&self) -> std::result::Result<String, NotifierError> {
        Ok("@test_bot".to_string())
    }
}

/// Renderer that panics instead of producing an invoice.
#[derive(Debug, Default)]
pub struct CrashingRenderer;

#[async_trait]
impl InvoiceRenderer for CrashingRenderer {
    async fn render(&self, _view: &InvoiceView, _language: Language) -> Result<Vec<u8>> {
        panic!("renderer crashed");
    }
}

/// Artifact store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    files: Mutex<HashMap<ArtifactKey, Vec<u8>>>,
}

impl MemoryArtifactStore {
    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drops an artifact, as if its file had been deleted.
    pub fn remove(&self, key: &ArtifactKey) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn exists(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key))
    }

    async fn load(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn save(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), bytes.to_vec());
        Ok(())
    }
}

/// Settings with fast retries and both Telegram chats configured.
///
/// # Defaults
/// * group chat `-100200`, admin chat `42`
/// * 3 attempts, 1 ms backoff, 5 s timeouts
pub fn test_settings(background: bool) -> Settings {
    let mut settings = Settings::default();
    settings.telegram.group_chat_id = Some("-100200".to_string());
    settings.telegram.admin_chat_id = Some("42".to_string());
    settings.delivery.async_tasks = background;
    settings.delivery.worker_count = 2;
    settings.delivery.max_attempts = 3;
    settings.delivery.backoff_ms = 1;
    settings.delivery.request_timeout_secs = 5;
    settings.delivery.album_timeout_secs = 5;
    settings.invoices.default_language = "kh".to_string();
    settings
}

fn build_orchestrator(
    db: &DatabaseConnection,
    notifier: Arc<RecordingNotifier>,
    settings: &Settings,
) -> Result<(Orchestrator, Arc<MemoryArtifactStore>)> {
    build_orchestrator_with_renderer(db, Arc::new(TextInvoiceRenderer), notifier, settings)
}

fn build_orchestrator_with_renderer(
    db: &DatabaseConnection,
    renderer: Arc<dyn InvoiceRenderer>,
    notifier: Arc<RecordingNotifier>,
    settings: &Settings,
) -> Result<(Orchestrator, Arc<MemoryArtifactStore>)> {
    let store = Arc::new(MemoryArtifactStore::default());
    let orchestrator = Orchestrator::new(
        db.clone(),
        renderer,
        Arc::clone(&store) as Arc<dyn ArtifactStore>,
        notifier as Arc<dyn Notifier>,
        settings,
    )?;
    Ok((orchestrator, store))
}

/// Orchestrator over a fresh recording notifier and memory store.
pub fn test_orchestrator(
    db: &DatabaseConnection,
    background: bool,
) -> Result<(Orchestrator, Arc<RecordingNotifier>, Arc<MemoryArtifactStore>)> {
    let notifier = Arc::new(RecordingNotifier::new());
    let (orchestrator, store) =
        build_orchestrator(db, Arc::clone(&notifier), &test_settings(background))?;
    Ok((orchestrator, notifier, store))
}

/// Orchestrator over a caller-configured notifier.
pub fn test_orchestrator_with(
    db: &DatabaseConnection,
    notifier: Arc<RecordingNotifier>,
    background: bool,
) -> Result<(Orchestrator, Arc<MemoryArtifactStore>)> {
    build_orchestrator(db, notifier, &test_settings(background))
}

/// Inline orchestrator with a custom album size.
pub fn test_orchestrator_with_album_size(
    db: &DatabaseConnection,
    notifier: Arc<RecordingNotifier>,
    album_size: usize,
) -> Result<(Orchestrator, Arc<MemoryArtifactStore>)> {
    let mut settings = test_settings(false);
    settings.delivery.album_size = album_size;
    build_orchestrator(db, notifier, &settings)
}

/// Orchestrator over a caller-supplied renderer and a fresh recording notifier.
pub fn test_orchestrator_with_renderer(
    db: &DatabaseConnection,
    renderer: Arc<dyn InvoiceRenderer>,
    background: bool,
) -> Result<(Orchestrator, Arc<MemoryArtifactStore>)> {
    build_orchestrator_with_renderer(
        db,
        renderer,
        Arc::new(RecordingNotifier::new()),
        &test_settings(background),
    )
}
