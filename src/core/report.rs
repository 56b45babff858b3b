//! Monthly report generation.
//!
//! This module aggregates one month of bills into income, utility totals and the
//! list of unpaid rooms. Functions return structured data; formatting helpers turn
//! it into the text the bot and the admin chat show.

use crate::{
    core::{month::month_start, readings},
    entities::{BillStatus, MonthlyBill, Room, Utility, monthly_bill, room},
    errors::Result,
};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{QueryOrder, prelude::*};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Aggregated figures for one billing month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyReport {
    /// First day of the month
    pub month: NaiveDate,
    /// Number of bills in the month
    pub bill_count: usize,
    /// Sum of bill totals
    pub income: Decimal,
    /// Sum of water costs
    pub water_cost: Decimal,
    /// Sum of electricity costs
    pub electricity_cost: Decimal,
    /// Rooms whose bill is issued or sent but not paid, by room number
    pub unpaid_rooms: Vec<String>,
    /// Water usage over rooms with both readings
    pub water_usage: i64,
    /// Electricity usage over rooms with both readings
    pub electricity_usage: i64,
    /// Exchange rate of the month, when recorded
    pub exchange_rate: Option<Decimal>,
}

impl MonthlyReport {
    /// Water plus electricity cost.
    #[must_use]
    pub fn utility_total(&self) -> Decimal {
        self.water_cost + self.electricity_cost
    }

    /// Income left after utilities.
    #[must_use]
    pub fn profit(&self) -> Decimal {
        self.income - self.utility_total()
    }

    /// Converts a local-currency amount with the month's rate.
    #[must_use]
    pub fn to_usd(&self, amount: Decimal) -> Option<Decimal> {
        self.exchange_rate
            .filter(|rate| !rate.is_zero())
            .map(|rate| (amount / rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

/// Builds the report for `month`.
///
/// Usage totals come from the readings, not from the bills, so they also count
/// rooms whose bill has not been generated yet.
pub async fn monthly_report<C>(db: &C, month: NaiveDate) -> Result<MonthlyReport>
where
    C: ConnectionTrait,
{
    let month = month_start(month);
    let rooms = Room::find()
        .order_by_asc(room::Column::RoomNumber)
        .all(db)
        .await?;
    let room_numbers: HashMap<i64, &str> = rooms
        .iter()
        .map(|r| (r.id, r.room_number.as_str()))
        .collect();

    let bills = MonthlyBill::find()
        .filter(monthly_bill::Column::Month.eq(month))
        .all(db)
        .await?;

    let mut unpaid_rooms: Vec<String> = bills
        .iter()
        .filter(|b| matches!(b.status, BillStatus::Issued | BillStatus::Sent))
        .filter_map(|b| room_numbers.get(&b.room_id).map(ToString::to_string))
        .collect();
    unpaid_rooms.sort();

    let mut water_usage = 0;
    let mut electricity_usage = 0;
    for room in &rooms {
        water_usage += readings::usage_for_month(db, room.id, Utility::Water, month)
            .await?
            .unwrap_or(0);
        electricity_usage += readings::usage_for_month(db, room.id, Utility::Electricity, month)
            .await?
            .unwrap_or(0);
    }

    let exchange_rate = readings::find_rate(db, month)
        .await?
        .map(|rate| rate.exchange_rate);

    Ok(MonthlyReport {
        month,
        bill_count: bills.len(),
        income: bills.iter().map(|b| b.total).sum(),
        water_cost: bills.iter().map(|b| b.water_cost).sum(),
        electricity_cost: bills.iter().map(|b| b.electricity_cost).sum(),
        unpaid_rooms,
        water_usage,
        electricity_usage,
        exchange_rate,
    })
}

/// Formats an amount with thousands separators, rounded to whole units.
///
/// # Examples
/// ```
/// use rust_decimal::Decimal;
/// use rent_house::core::report::group_thousands;
///
/// assert_eq!(group_thousands(Decimal::from(440_000)), "440,000");
/// ```
#[must_use]
pub fn group_thousands(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.insert(0, '-');
    }
    grouped
}

/// `440,000 KHR`
#[must_use]
pub fn format_khr(amount: Decimal) -> String {
    format!("{} KHR", group_thousands(amount))
}

/// Multi-line text rendering of a report.
#[must_use]
pub fn format_report(report: &MonthlyReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Monthly Report {}", report.month.format("%B %Y"));
    let _ = writeln!(out);

    let rows = [
        ("Total income", report.income),
        ("Utility total", report.utility_total()),
        ("Profit", report.profit()),
    ];
    for (label, amount) in rows {
        match report.to_usd(amount) {
            Some(usd) => {
                let _ = writeln!(out, "{label}: {} ({usd:.2} USD)", format_khr(amount));
            }
            None => {
                let _ = writeln!(out, "{label}: {}", format_khr(amount));
            }
        }
    }
    let _ = writeln!(out, "Water cost: {}", format_khr(report.water_cost));
    let _ = writeln!(out, "Electricity cost: {}", format_khr(report.electricity_cost));
    let _ = writeln!(
        out,
        "Usage: {} m³ water, {} kWh electricity",
        report.water_usage, report.electricity_usage
    );
    let _ = writeln!(out);

    let rooms = if report.unpaid_rooms.is_empty() {
        "None".to_string()
    } else {
        report.unpaid_rooms.join(", ")
    };
    let _ = writeln!(out, "Unpaid rooms: {}", report.unpaid_rooms.len());
    let _ = write!(out, "Rooms: {rooms}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{calculator, status};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(dec!(440000)), "440,000");
        assert_eq!(group_thousands(dec!(1234567.6)), "1,234,568");
        assert_eq!(group_thousands(dec!(999)), "999");
        assert_eq!(group_thousands(dec!(-1500)), "-1,500");
        assert_eq!(group_thousands(dec!(0)), "0");
    }

    #[tokio::test]
    async fn test_monthly_report_totals() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let first = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;
        status::issue(&db, first.id).await?;

        let second = add_issuable_room(&db, "A2", "1002").await?;
        let bill = calculator::recalculate_bill(&db, second.id, fixture.month).await?;
        status::issue(&db, bill.id).await?;
        status::mark_sent(&db, bill.id).await?;
        status::mark_paid(&db, bill.id).await?;

        let report = monthly_report(&db, fixture.month).await?;
        assert_eq!(report.bill_count, 2);
        assert_eq!(report.income, dec!(880000));
        assert_eq!(report.water_cost, dec!(40000));
        assert_eq!(report.utility_total(), dec!(80000));
        assert_eq!(report.profit(), dec!(800000));
        assert_eq!(report.unpaid_rooms, vec!["A1".to_string()]);
        assert_eq!(report.water_usage, 20);
        assert_eq!(report.electricity_usage, 40);
        assert_eq!(report.to_usd(report.income), Some(dec!(220)));

        let text = format_report(&report);
        assert!(text.starts_with("Monthly Report February 2025"));
        assert!(text.contains("Total income: 880,000 KHR (220.00 USD)"));
        assert!(text.contains("Rooms: A1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_month_report() -> Result<()> {
        let db = setup_test_db().await?;
        let report = monthly_report(&db, test_month()).await?;
        assert_eq!(report.bill_count, 0);
        assert_eq!(report.income, Decimal::ZERO);
        assert!(report.exchange_rate.is_none());
        assert!(format_report(&report).ends_with("Rooms: None"));
        Ok(())
    }
}
