//! Alert and diagnostics engine - Reports which prerequisites a bill is missing.
//!
//! Read-only. The lookups a diagnosis needs (rate months, sorted reading dates per
//! room and utility, occupants and profiles) are prefetched once for a whole batch
//! of bills by [`DiagnosticsContext::load`], then every bill is checked in memory.

use crate::{
    entities::{
        BillStatus, MeterReading, MonthlyBillModel, Room, RoomModel, Tenant, TenantProfile,
        UnitPrice, Utility, meter_reading, room, tenant, tenant_profile, unit_price,
    },
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// One missing prerequisite. Variants are declared in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    MissingOccupant,
    MissingProfile,
    MissingNotificationTarget,
    MissingRate,
    MissingCurrentWater,
    MissingPreviousWater,
    MissingCurrentElectricity,
    MissingPreviousElectricity,
}

impl Condition {
    /// Conditions about billing data rather than the occupant.
    #[must_use]
    pub const fn is_data(self) -> bool {
        !matches!(
            self,
            Self::MissingOccupant | Self::MissingProfile | Self::MissingNotificationTarget
        )
    }

    /// Short operator-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MissingOccupant => "No occupant",
            Self::MissingProfile => "No tenant profile",
            Self::MissingNotificationTarget => "No Telegram chat ID",
            Self::MissingRate => "No unit prices for the month",
            Self::MissingCurrentWater => "No current water reading",
            Self::MissingPreviousWater => "No previous water reading",
            Self::MissingCurrentElectricity => "No current electricity reading",
            Self::MissingPreviousElectricity => "No previous electricity reading",
        }
    }

    const fn current(utility: Utility) -> Self {
        match utility {
            Utility::Water => Self::MissingCurrentWater,
            Utility::Electricity => Self::MissingCurrentElectricity,
        }
    }

    const fn previous(utility: Utility) -> Self {
        match utility {
            Utility::Water => Self::MissingPreviousWater,
            Utility::Electricity => Self::MissingPreviousElectricity,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the issue action should be offered.
#[must_use]
pub fn can_issue(status: BillStatus, conditions: &[Condition]) -> bool {
    status == BillStatus::Draft && conditions.is_empty()
}

/// Whether the send action should be offered.
///
/// Mirrors the send guard: missing data blocks a send just like a missing target.
#[must_use]
pub fn can_send(status: BillStatus, conditions: &[Condition]) -> bool {
    matches!(status, BillStatus::Issued | BillStatus::Sent) && conditions.is_empty()
}

#[derive(Debug, Clone, Copy, Default)]
struct OccupantFacts {
    has_tenant: bool,
    has_profile: bool,
    has_target: bool,
}

/// Prefetched lookups for a batch of bills.
#[derive(Debug, Default)]
pub struct DiagnosticsContext {
    rate_months: HashSet<NaiveDate>,
    reading_dates: HashMap<(i64, Utility), Vec<NaiveDate>>,
    occupants: HashMap<i64, OccupantFacts>,
}

impl DiagnosticsContext {
    /// Loads everything needed to diagnose `bills` with a fixed number of queries.
    pub async fn load<C>(db: &C, bills: &[MonthlyBillModel]) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        let room_ids: Vec<i64> = bills
            .iter()
            .map(|b| b.room_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let months: Vec<NaiveDate> = bills
            .iter()
            .map(|b| b.month)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if bills.is_empty() {
            return Ok(Self::default());
        }

        let rate_months = UnitPrice::find()
            .filter(unit_price::Column::Date.is_in(months))
            .all(db)
            .await?
            .into_iter()
            .map(|rate| rate.date)
            .collect();

        let mut reading_dates: HashMap<(i64, Utility), Vec<NaiveDate>> = HashMap::new();
        for reading in MeterReading::find()
            .filter(meter_reading::Column::RoomId.is_in(room_ids.clone()))
            .all(db)
            .await?
        {
            reading_dates
                .entry((reading.room_id, reading.utility))
                .or_default()
                .push(reading.date);
        }
        for dates in reading_dates.values_mut() {
            dates.sort_unstable();
        }

        let rooms: Vec<RoomModel> = Room::find()
            .filter(room::Column::Id.is_in(room_ids))
            .all(db)
            .await?;
        let tenant_ids: Vec<i64> = rooms.iter().filter_map(|r| r.tenant_id).collect();
        let tenants: HashSet<i64> = Tenant::find()
            .filter(tenant::Column::Id.is_in(tenant_ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        let profiles: HashMap<i64, bool> = TenantProfile::find()
            .filter(tenant_profile::Column::TenantId.is_in(tenant_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.tenant_id, p.notification_target().is_some()))
            .collect();

        let occupants = rooms
            .into_iter()
            .map(|room| {
                let tenant_id = room.tenant_id.filter(|id| tenants.contains(id));
                let target = tenant_id.and_then(|id| profiles.get(&id).copied());
                let facts = OccupantFacts {
                    has_tenant: tenant_id.is_some(),
                    has_profile: target.is_some(),
                    has_target: target.unwrap_or(false),
                };
                (room.id, facts)
            })
            .collect();

        Ok(Self {
            rate_months,
            reading_dates,
            occupants,
        })
    }

    /// Every condition that applies to `bill`, in reporting order.
    #[must_use]
    pub fn diagnose(&self, bill: &MonthlyBillModel) -> Vec<Condition> {
        let mut conditions = Vec::new();

        let facts = self.occupants.get(&bill.room_id).copied().unwrap_or_default();
        if !facts.has_tenant {
            conditions.push(Condition::MissingOccupant);
        } else if !facts.has_profile {
            conditions.push(Condition::MissingProfile);
        } else if !facts.has_target {
            conditions.push(Condition::MissingNotificationTarget);
        }

        if !self.rate_months.contains(&bill.month) {
            conditions.push(Condition::MissingRate);
        }

        for utility in Utility::ALL {
            let dates = self
                .reading_dates
                .get(&(bill.room_id, utility))
                .map_or(&[][..], Vec::as_slice);
            if dates.binary_search(&bill.month).is_err() {
                conditions.push(Condition::current(utility));
            }
            if dates.partition_point(|date| *date < bill.month) == 0 {
                conditions.push(Condition::previous(utility));
            }
        }

        conditions
    }
}

/// Diagnoses a single bill.
pub async fn diagnose_bill<C>(db: &C, bill: &MonthlyBillModel) -> Result<Vec<Condition>>
where
    C: ConnectionTrait,
{
    let context = DiagnosticsContext::load(db, std::slice::from_ref(bill)).await?;
    Ok(context.diagnose(bill))
}

/// Diagnoses a batch of bills with shared prefetching.
pub async fn diagnose_bills<C>(
    db: &C,
    bills: &[MonthlyBillModel],
) -> Result<Vec<(i64, Vec<Condition>)>>
where
    C: ConnectionTrait,
{
    let context = DiagnosticsContext::load(db, bills).await?;
    Ok(bills
        .iter()
        .map(|bill| (bill.id, context.diagnose(bill)))
        .collect())
}
