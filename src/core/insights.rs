//! Smart alerts for the landlord's admin chat.
//!
//! Each run evaluates four alerts: unpaid bills overdue after delivery, unusual
//! utility usage per room, a fully paid month and a monthly summary. Every alert is
//! remembered in the alert log under (month, type, room) and fires once. A failed
//! send is logged and not recorded, so the next run tries again.

use crate::{
    config::AlertSettings,
    core::{
        delivery::Orchestrator,
        month::{month_key, previous_month},
        readings,
        report::{self, format_khr},
    },
    entities::{AlertLog, BillStatus, MonthlyBill, Room, Utility, alert_log, monthly_bill},
    errors::Result,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use std::collections::HashMap;
use tracing::{info, warn};

/// Alert key for bills still unpaid after the due period.
pub const UNPAID_OVERDUE: &str = "unpaid_overdue";
/// Alert key for a water usage spike.
pub const WATER_SPIKE: &str = "usage_water_high";
/// Alert key for an electricity usage spike.
pub const ELECTRICITY_SPIKE: &str = "usage_electricity_high";
/// Alert key for a month where every bill is paid.
pub const ALL_PAID: &str = "all_paid";
/// Alert key for the monthly summary.
pub const MONTHLY_SUMMARY: &str = "monthly_summary";

const MAX_LOGGED_MESSAGE: usize = 500;
const SPIKE_HISTORY_MONTHS: usize = 3;

/// One alert that was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub alert_type: &'static str,
    pub month: NaiveDate,
    pub room_id: Option<i64>,
}

/// Result of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertRun {
    /// Alerts delivered and recorded
    pub sent: Vec<SentAlert>,
    /// Alerts whose delivery failed
    pub failed: usize,
}

impl AlertRun {
    /// Alert types delivered, in order.
    #[must_use]
    pub fn sent_types(&self) -> Vec<&'static str> {
        self.sent.iter().map(|a| a.alert_type).collect()
    }
}

/// Whether `current` exceeds the average of `recent` by more than `pct` percent.
///
/// Needs at least two earlier months, and a zero average never counts as a spike.
#[must_use]
pub fn is_usage_spike(current: i64, recent: &[i64], pct: u32) -> bool {
    if recent.len() < 2 {
        return false;
    }
    let sum: i64 = recent.iter().sum();
    if sum == 0 {
        return false;
    }
    let average = Decimal::from(sum) / Decimal::from(recent.len());
    let threshold = average * (Decimal::ONE + Decimal::from(pct) / Decimal::ONE_HUNDRED);
    Decimal::from(current) > threshold
}

async fn already_sent<C>(db: &C, month: NaiveDate, alert_type: &str, room_id: Option<i64>) -> Result<bool>
where
    C: ConnectionTrait,
{
    let mut query = AlertLog::find()
        .filter(alert_log::Column::Month.eq(month))
        .filter(alert_log::Column::AlertType.eq(alert_type));
    query = match room_id {
        Some(id) => query.filter(alert_log::Column::RoomId.eq(id)),
        None => query.filter(alert_log::Column::RoomId.is_null()),
    };
    Ok(query.count(db).await? > 0)
}

async fn record_alert<C>(
    db: &C,
    month: NaiveDate,
    alert_type: &str,
    room_id: Option<i64>,
    message: &str,
) -> Result<()>
where
    C: ConnectionTrait,
{
    alert_log::ActiveModel {
        month: Set(month),
        alert_type: Set(alert_type.to_string()),
        room_id: Set(room_id),
        message: Set(message.chars().take(MAX_LOGGED_MESSAGE).collect()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Evaluates the alerts as of `today` and sends the new ones.
pub struct AlertEngine<'a> {
    orchestrator: &'a Orchestrator,
    settings: &'a AlertSettings,
    run: AlertRun,
}

impl<'a> AlertEngine<'a> {
    #[must_use]
    pub fn new(orchestrator: &'a Orchestrator, settings: &'a AlertSettings) -> Self {
        Self {
            orchestrator,
            settings,
            run: AlertRun::default(),
        }
    }

    /// Sends one alert unless it already fired.
    async fn emit(
        &mut self,
        month: NaiveDate,
        alert_type: &'static str,
        room_id: Option<i64>,
        message: &str,
    ) -> Result<()> {
        let db = self.orchestrator.db();
        if already_sent(db, month, alert_type, room_id).await? {
            return Ok(());
        }
        match self.orchestrator.notify_admin(message).await {
            Ok(()) => {
                record_alert(db, month, alert_type, room_id, message).await?;
                info!(alert = alert_type, month = %month_key(month), ?room_id, "Smart alert sent");
                self.run.sent.push(SentAlert {
                    alert_type,
                    month,
                    room_id,
                });
            }
            Err(e) => {
                warn!(alert = alert_type, month = %month_key(month), error = %e, "Smart alert failed");
                self.run.failed += 1;
            }
        }
        Ok(())
    }

    async fn unpaid_overdue(&mut self, today: NaiveDate) -> Result<()> {
        let db = self.orchestrator.db();
        let months: Vec<NaiveDate> = MonthlyBill::find()
            .select_only()
            .column(monthly_bill::Column::Month)
            .distinct()
            .order_by_desc(monthly_bill::Column::Month)
            .into_tuple()
            .all(db)
            .await?;
        let room_numbers: HashMap<i64, String> = Room::find()
            .all(db)
            .await?
            .into_iter()
            .map(|r| (r.id, r.room_number))
            .collect();

        for month in months {
            let bills = MonthlyBill::find()
                .filter(monthly_bill::Column::Month.eq(month))
                .all(db)
                .await?;
            let Some(latest_send) = bills
                .iter()
                .filter(|b| matches!(b.status, BillStatus::Sent | BillStatus::Paid))
                .filter_map(|b| b.sent_at)
                .max()
            else {
                continue;
            };
            if today <= latest_send.date_naive() + Duration::days(self.settings.due_days) {
                continue;
            }

            let mut unpaid: Vec<&str> = bills
                .iter()
                .filter(|b| matches!(b.status, BillStatus::Issued | BillStatus::Sent))
                .filter_map(|b| room_numbers.get(&b.room_id).map(String::as_str))
                .collect();
            if unpaid.is_empty() {
                continue;
            }
            unpaid.sort_unstable();

            let message = format!(
                "Rooms {} are still unpaid {} days after the {} invoices were sent. Please contact the tenants.",
                unpaid.join(", "),
                self.settings.due_days,
                month.format("%B %Y"),
            );
            self.emit(month, UNPAID_OVERDUE, None, &message).await?;
        }
        Ok(())
    }

    async fn usage_spikes(&mut self, latest_month: NaiveDate) -> Result<()> {
        let db = self.orchestrator.db();
        for room in Room::find().all(db).await? {
            for (utility, alert_type, label) in [
                (Utility::Water, WATER_SPIKE, "Water"),
                (Utility::Electricity, ELECTRICITY_SPIKE, "Electricity"),
            ] {
                let Some(current) =
                    readings::usage_for_month(db, room.id, utility, latest_month).await?
                else {
                    continue;
                };
                let mut recent = Vec::with_capacity(SPIKE_HISTORY_MONTHS);
                let mut cursor = latest_month;
                for _ in 0..SPIKE_HISTORY_MONTHS {
                    cursor = previous_month(cursor);
                    if let Some(usage) = readings::usage_for_month(db, room.id, utility, cursor).await? {
                        recent.push(usage);
                    }
                }
                if !is_usage_spike(current, &recent, self.settings.usage_spike_pct) {
                    continue;
                }
                let message = format!(
                    "{label} usage in room {} is higher than usual ({current} in {}). Please check.",
                    room.room_number,
                    month_key(latest_month),
                );
                self.emit(latest_month, alert_type, Some(room.id), &message)
                    .await?;
            }
        }
        Ok(())
    }

    async fn all_paid(&mut self, latest_month: NaiveDate) -> Result<()> {
        let bills = MonthlyBill::find()
            .filter(monthly_bill::Column::Month.eq(latest_month))
            .all(self.orchestrator.db())
            .await?;
        if bills.is_empty() || bills.iter().any(|b| b.status != BillStatus::Paid) {
            return Ok(());
        }
        let message = format!("All rooms are paid for {}.", latest_month.format("%B %Y"));
        self.emit(latest_month, ALL_PAID, None, &message).await
    }

    async fn monthly_summary(&mut self, latest_month: NaiveDate) -> Result<()> {
        let db = self.orchestrator.db();
        if already_sent(db, latest_month, MONTHLY_SUMMARY, None).await? {
            return Ok(());
        }
        let summary = report::monthly_report(db, latest_month).await?;
        let message = format!(
            "Report for {}\nIncome: {}\nUnpaid: {} rooms\nWater: {} m³\nElectricity: {} kWh",
            latest_month.format("%B %Y"),
            format_khr(summary.income),
            summary.unpaid_rooms.len(),
            summary.water_usage,
            summary.electricity_usage,
        );
        self.emit(latest_month, MONTHLY_SUMMARY, None, &message).await
    }

    /// Runs every alert and reports what was sent.
    pub async fn run(mut self, today: NaiveDate) -> Result<AlertRun> {
        self.unpaid_overdue(today).await?;

        let latest_month: Option<NaiveDate> = MonthlyBill::find()
            .select_only()
            .column_as(monthly_bill::Column::Month.max(), "month")
            .into_tuple::<Option<NaiveDate>>()
            .one(self.orchestrator.db())
            .await?
            .flatten();
        if let Some(latest_month) = latest_month {
            self.usage_spikes(latest_month).await?;
            self.all_paid(latest_month).await?;
            self.monthly_summary(latest_month).await?;
        }

        info!(sent = self.run.sent.len(), failed = self.run.failed, "Smart alerts completed");
        Ok(self.run)
    }
}

/// Evaluates and sends smart alerts as of `today`.
///
/// # Errors
/// Database errors abort the run. Delivery failures are counted in the result.
pub async fn run_smart_alerts(
    orchestrator: &Orchestrator,
    settings: &AlertSettings,
    today: NaiveDate,
) -> Result<AlertRun> {
    AlertEngine::new(orchestrator, settings).run(today).await
}
