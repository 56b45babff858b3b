//! Bill calculator - Turns meter readings and the month's rate entry into a bill.
//!
//! `compute` is read-only and returns the full cost breakdown, including which inputs
//! were missing. Missing readings or a missing rate entry degrade the bill to zero
//! costs with a data note; a meter value that went backwards is a hard error and
//! nothing is written. `recalculate_bill` persists a computation, but only while the
//! bill is still a draft.

use crate::{
    core::{month::month_key, month::month_start, readings},
    entities::{
        BillStatus, MonthlyBill, MonthlyBillModel, Room, RoomModel, UnitPriceModel, Utility,
        monthly_bill, room,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use std::fmt;
use tracing::{debug, info, warn};

/// A prerequisite the calculator could not find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingInput {
    /// No rate table entry for the month
    Rate,
    /// No reading for the billing month
    CurrentReading(Utility),
    /// No reading before the billing month
    PreviousReading(Utility),
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rate => f.write_str("unit prices"),
            Self::CurrentReading(utility) => write!(f, "current {utility} reading"),
            Self::PreviousReading(utility) => write!(f, "previous {utility} reading"),
        }
    }
}

/// Usage and cost of one utility for the billed month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilityUsage {
    /// Which meter
    pub utility: Utility,
    /// Most recent meter value before the month
    pub previous: Option<i64>,
    /// Meter value for the month
    pub current: Option<i64>,
    /// `current - previous`, zero when either side is missing
    pub usage: i64,
    /// `usage * unit price`, zero when anything is missing
    pub cost: Decimal,
}

/// Full result of a bill computation.
#[derive(Debug, Clone)]
pub struct BillComputation {
    pub room: RoomModel,
    pub month: NaiveDate,
    pub rate: Option<UnitPriceModel>,
    pub water: UtilityUsage,
    pub electricity: UtilityUsage,
    /// Room price converted to local currency
    pub room_cost: Decimal,
    pub total: Decimal,
    /// Inputs that were absent, in evaluation order
    pub missing: Vec<MissingInput>,
}

impl BillComputation {
    /// Whether every input was present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Human-readable note for the bill, empty when complete.
    #[must_use]
    pub fn data_note(&self) -> String {
        if self.missing.is_empty() {
            return String::new();
        }
        let items: Vec<String> = self.missing.iter().map(ToString::to_string).collect();
        format!("Missing {}.", items.join(", "))
    }

    /// Usage record for one utility.
    #[must_use]
    pub const fn usage(&self, utility: Utility) -> &UtilityUsage {
        match utility {
            Utility::Water => &self.water,
            Utility::Electricity => &self.electricity,
        }
    }
}

fn unit_price_for(rate: &UnitPriceModel, utility: Utility) -> Decimal {
    match utility {
        Utility::Water => rate.water_unit_price,
        Utility::Electricity => rate.electricity_unit_price,
    }
}

async fn utility_usage<C>(
    db: &C,
    room_id: i64,
    month: NaiveDate,
    utility: Utility,
    rate: Option<&UnitPriceModel>,
    missing: &mut Vec<MissingInput>,
) -> Result<UtilityUsage>
where
    C: ConnectionTrait,
{
    let current = readings::find_reading(db, room_id, utility, month).await?;
    let previous = readings::find_previous_reading(db, room_id, utility, month).await?;

    if current.is_none() {
        missing.push(MissingInput::CurrentReading(utility));
    }
    if previous.is_none() {
        missing.push(MissingInput::PreviousReading(utility));
    }

    let current = current.map(|r| r.meter_value);
    let previous = previous.map(|r| r.meter_value);

    let usage = match (previous, current) {
        (Some(previous), Some(current)) => {
            let usage = current - previous;
            if usage < 0 {
                return Err(Error::DataIntegrity {
                    utility: utility.to_string(),
                    previous,
                    current,
                });
            }
            usage
        }
        _ => 0,
    };

    let cost = match (rate, previous, current) {
        (Some(rate), Some(_), Some(_)) => Decimal::from(usage) * unit_price_for(rate, utility),
        _ => Decimal::ZERO,
    };

    Ok(UtilityUsage {
        utility,
        previous,
        current,
        usage,
        cost,
    })
}

/// Computes a room's bill for a month without writing anything.
///
/// # Errors
/// * `RoomNotFound` if the room does not exist
/// * `DataIntegrity` if a meter value decreased
pub async fn compute<C>(db: &C, room_id: i64, month: NaiveDate) -> Result<BillComputation>
where
    C: ConnectionTrait,
{
    let month = month_start(month);
    let room = Room::find_by_id(room_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::RoomNotFound {
            room: room_id.to_string(),
        })?;

    let mut missing = Vec::new();
    let rate = readings::find_rate(db, month).await?;
    if rate.is_none() {
        missing.push(MissingInput::Rate);
    }

    let water = utility_usage(db, room_id, month, Utility::Water, rate.as_ref(), &mut missing).await?;
    let electricity = utility_usage(
        db,
        room_id,
        month,
        Utility::Electricity,
        rate.as_ref(),
        &mut missing,
    )
    .await?;

    let room_cost = rate
        .as_ref()
        .map_or(Decimal::ZERO, |rate| room.price * rate.exchange_rate);
    let total = room_cost + water.cost + electricity.cost;

    Ok(BillComputation {
        room,
        month,
        rate,
        water,
        electricity,
        room_cost,
        total,
        missing,
    })
}

/// Finds the bill for (room, month), if generated.
pub async fn find_bill<C>(db: &C, room_id: i64, month: NaiveDate) -> Result<Option<MonthlyBillModel>>
where
    C: ConnectionTrait,
{
    MonthlyBill::find()
        .filter(monthly_bill::Column::RoomId.eq(room_id))
        .filter(monthly_bill::Column::Month.eq(month_start(month)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads a bill by id, failing with `BillNotFound`.
pub async fn get_bill<C>(db: &C, bill_id: i64) -> Result<MonthlyBillModel>
where
    C: ConnectionTrait,
{
    MonthlyBill::find_by_id(bill_id)
        .one(db)
        .await?
        .ok_or(Error::BillNotFound { bill_id })
}

/// Computes and stores the bill for (room, month).
///
/// Creates a draft bill if none exists. An existing bill is only rewritten while it is
/// a draft: the update is conditional on `status = draft`, so a bill issued in between
/// is never touched and `BillLocked` is returned instead.
///
/// # Errors
/// * `DataIntegrity` if a meter value decreased (nothing is written)
/// * `BillLocked` if the bill exists and is past draft
pub async fn recalculate_bill<C>(db: &C, room_id: i64, month: NaiveDate) -> Result<MonthlyBillModel>
where
    C: ConnectionTrait,
{
    let computation = compute(db, room_id, month).await?;
    store_computation(db, &computation).await
}

/// Persists an already computed bill under the draft-only rule.
pub async fn store_computation<C>(db: &C, computation: &BillComputation) -> Result<MonthlyBillModel>
where
    C: ConnectionTrait,
{
    let room_id = computation.room.id;
    let month = computation.month;
    let data_note = computation.data_note();

    if let Some(existing) = find_bill(db, room_id, month).await? {
        if existing.status != BillStatus::Draft {
            return Err(Error::BillLocked {
                status: existing.status.to_string(),
            });
        }

        let result = MonthlyBill::update_many()
            .col_expr(monthly_bill::Column::RoomCost, Expr::value(computation.room_cost))
            .col_expr(monthly_bill::Column::WaterCost, Expr::value(computation.water.cost))
            .col_expr(
                monthly_bill::Column::ElectricityCost,
                Expr::value(computation.electricity.cost),
            )
            .col_expr(monthly_bill::Column::Total, Expr::value(computation.total))
            .col_expr(monthly_bill::Column::DataNote, Expr::value(data_note.clone()))
            .filter(monthly_bill::Column::Id.eq(existing.id))
            .filter(monthly_bill::Column::Status.eq(BillStatus::Draft))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            warn!(bill_id = existing.id, "Bill left draft during recompute");
            let current = get_bill(db, existing.id).await?;
            return Err(Error::BillLocked {
                status: current.status.to_string(),
            });
        }

        debug!(
            bill_id = existing.id,
            room = %computation.room.room_number,
            month = %month_key(month),
            total = %computation.total,
            "Draft bill recomputed"
        );
        return get_bill(db, existing.id).await;
    }

    let bill = monthly_bill::ActiveModel {
        room_id: Set(room_id),
        month: Set(month),
        room_cost: Set(computation.room_cost),
        water_cost: Set(computation.water.cost),
        electricity_cost: Set(computation.electricity.cost),
        total: Set(computation.total),
        status: Set(BillStatus::Draft),
        issued_at: Set(None),
        sent_at: Set(None),
        paid_at: Set(None),
        data_note: Set(data_note),
        tenant_name_snapshot: Set(None),
        async_job_pending: Set(false),
        async_job_type: Set(None),
        last_job_status: Set(None),
        last_job_message: Set(String::new()),
        last_job_at: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(
        bill_id = bill.id,
        room = %computation.room.room_number,
        month = %month_key(month),
        total = %bill.total,
        complete = computation.is_complete(),
        "Bill generated"
    );
    Ok(bill)
}

/// Recomputes the bill for (room, month) if one exists and is still a draft.
///
/// Called from the reading and rate write paths inside their transaction. A bill
/// that is absent or past draft is left alone and `None` is returned.
pub async fn on_reading_committed<C>(
    db: &C,
    room_id: i64,
    month: NaiveDate,
) -> Result<Option<MonthlyBillModel>>
where
    C: ConnectionTrait,
{
    match find_bill(db, room_id, month).await? {
        Some(bill) if bill.status == BillStatus::Draft => {
            recalculate_bill(db, room_id, month).await.map(Some)
        }
        _ => Ok(None),
    }
}

/// What happened to one room during bulk generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Bill computed and stored; `complete` is false when a data note was set
    Generated {
        /// Bill id
        bill_id: i64,
        /// All inputs were present
        complete: bool,
    },
    /// Existing bill is past draft and was left untouched
    Locked(BillStatus),
    /// Computation failed; the message is shown to the operator
    Failed(String),
}

/// Per-room outcomes of a bulk generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    /// (room number, outcome) in room-number order
    pub rooms: Vec<(String, GenerationOutcome)>,
}

impl GenerationReport {
    /// Bills written.
    #[must_use]
    pub fn generated(&self) -> usize {
        self.rooms
            .iter()
            .filter(|(_, o)| matches!(o, GenerationOutcome::Generated { .. }))
            .count()
    }

    /// Generated bills carrying a data note.
    #[must_use]
    pub fn incomplete(&self) -> usize {
        self.rooms
            .iter()
            .filter(|(_, o)| matches!(o, GenerationOutcome::Generated { complete: false, .. }))
            .count()
    }

    /// Rooms skipped because the bill is locked.
    #[must_use]
    pub fn locked(&self) -> usize {
        self.rooms
            .iter()
            .filter(|(_, o)| matches!(o, GenerationOutcome::Locked(_)))
            .count()
    }

    /// Rooms whose computation failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.rooms
            .iter()
            .filter(|(_, o)| matches!(o, GenerationOutcome::Failed(_)))
            .count()
    }

    /// Ids of the bills written.
    #[must_use]
    pub fn bill_ids(&self) -> Vec<i64> {
        self.rooms
            .iter()
            .filter_map(|(_, o)| match o {
                GenerationOutcome::Generated { bill_id, .. } => Some(*bill_id),
                _ => None,
            })
            .collect()
    }
}

/// Generates bills for a month, for the given room numbers or every room.
///
/// Each room is processed independently; one failure never stops the run.
pub async fn generate_bills(
    db: &DatabaseConnection,
    month: NaiveDate,
    room_numbers: Option<&[String]>,
) -> Result<GenerationReport> {
    let month = month_start(month);
    let mut query = Room::find().order_by_asc(room::Column::RoomNumber);
    if let Some(numbers) = room_numbers {
        query = query.filter(room::Column::RoomNumber.is_in(numbers.iter().map(String::as_str)));
    }
    let rooms = query.all(db).await?;

    let mut report = GenerationReport::default();
    for room in rooms {
        let outcome = match recalculate_bill(db, room.id, month).await {
            Ok(bill) => GenerationOutcome::Generated {
                bill_id: bill.id,
                complete: !bill.has_data_note(),
            },
            Err(Error::BillLocked { .. }) => {
                let status = find_bill(db, room.id, month)
                    .await?
                    .map_or(BillStatus::Issued, |b| b.status);
                GenerationOutcome::Locked(status)
            }
            Err(e) => {
                warn!(room = %room.room_number, month = %month_key(month), error = %e, "Bill generation failed");
                GenerationOutcome::Failed(e.to_string())
            }
        };
        report.rooms.push((room.room_number, outcome));
    }

    info!(
        month = %month_key(month),
        generated = report.generated(),
        locked = report.locked(),
        failed = report.failed(),
        "Bulk bill generation finished"
    );
    Ok(report)
}
