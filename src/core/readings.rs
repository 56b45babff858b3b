//! Meter readings and the rate table.
//!
//! Lookups used by the calculator and diagnostics live here together with the two
//! write paths. Both writes run in a transaction and recompute the affected draft
//! bills before committing, so a reading or rate change and the bills derived from
//! it are never observed out of step.

use crate::{
    core::{
        calculator,
        month::{month_key, month_start},
    },
    entities::{
        BillStatus, MeterReading, MeterReadingModel, MonthlyBill, UnitPrice, UnitPriceModel,
        Utility, meter_reading, monthly_bill, unit_price,
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::info;

/// Rate table entry for a month, if recorded.
pub async fn find_rate<C>(db: &C, month: NaiveDate) -> Result<Option<UnitPriceModel>>
where
    C: ConnectionTrait,
{
    UnitPrice::find()
        .filter(unit_price::Column::Date.eq(month_start(month)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Rate table entry for a month, failing with `RateNotFound`.
pub async fn get_rate<C>(db: &C, month: NaiveDate) -> Result<UnitPriceModel>
where
    C: ConnectionTrait,
{
    find_rate(db, month)
        .await?
        .ok_or_else(|| Error::RateNotFound {
            month: month_key(month),
        })
}

/// The reading of a utility for exactly this month.
pub async fn find_reading<C>(
    db: &C,
    room_id: i64,
    utility: Utility,
    month: NaiveDate,
) -> Result<Option<MeterReadingModel>>
where
    C: ConnectionTrait,
{
    MeterReading::find()
        .filter(meter_reading::Column::RoomId.eq(room_id))
        .filter(meter_reading::Column::Utility.eq(utility))
        .filter(meter_reading::Column::Date.eq(month_start(month)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// The most recent reading strictly before `before_month`.
pub async fn find_previous_reading<C>(
    db: &C,
    room_id: i64,
    utility: Utility,
    before_month: NaiveDate,
) -> Result<Option<MeterReadingModel>>
where
    C: ConnectionTrait,
{
    MeterReading::find()
        .filter(meter_reading::Column::RoomId.eq(room_id))
        .filter(meter_reading::Column::Utility.eq(utility))
        .filter(meter_reading::Column::Date.lt(month_start(before_month)))
        .order_by_desc(meter_reading::Column::Date)
        .one(db)
        .await
        .map_err(Into::into)
}

/// The earliest reading strictly after `after_month`.
pub async fn find_next_reading<C>(
    db: &C,
    room_id: i64,
    utility: Utility,
    after_month: NaiveDate,
) -> Result<Option<MeterReadingModel>>
where
    C: ConnectionTrait,
{
    MeterReading::find()
        .filter(meter_reading::Column::RoomId.eq(room_id))
        .filter(meter_reading::Column::Utility.eq(utility))
        .filter(meter_reading::Column::Date.gt(month_start(after_month)))
        .order_by_asc(meter_reading::Column::Date)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Usage of a utility in `month`, or `None` when either reading is missing or the
/// meter went backwards.
pub async fn usage_for_month<C>(
    db: &C,
    room_id: i64,
    utility: Utility,
    month: NaiveDate,
) -> Result<Option<i64>>
where
    C: ConnectionTrait,
{
    let Some(current) = find_reading(db, room_id, utility, month).await? else {
        return Ok(None);
    };
    let Some(previous) = find_previous_reading(db, room_id, utility, month).await? else {
        return Ok(None);
    };
    let usage = current.meter_value - previous.meter_value;
    Ok((usage >= 0).then_some(usage))
}

/// Records a meter reading and refreshes the draft bill it feeds.
///
/// The date is normalised to the first of its month and the reading replaces any
/// existing one for (room, utility, month). The bill for that month is recomputed
/// inside the same transaction when it exists and is still a draft, so a reading
/// that would make usage negative rolls the whole write back.
///
/// The next month with a reading for the same utility uses this value as its previous
/// reading, even across a gap of months without readings, and its bill is refreshed
/// the same way.
///
/// # Errors
/// * `Validation` for a negative meter value
/// * `RoomNotFound` for an unknown room
/// * `DataIntegrity` if a refreshed draft bill would get negative usage
pub async fn record_reading(
    db: &DatabaseConnection,
    room_id: i64,
    utility: Utility,
    date: NaiveDate,
    meter_value: i64,
    is_initial: bool,
) -> Result<MeterReadingModel> {
    if meter_value < 0 {
        return Err(Error::Validation {
            message: format!("{utility} meter value cannot be negative (got {meter_value})"),
        });
    }
    let month = month_start(date);

    let txn = db.begin().await?;

    crate::core::room::get_room(&txn, room_id).await?;

    let reading = if let Some(existing) = find_reading(&txn, room_id, utility, month).await? {
        let mut active: meter_reading::ActiveModel = existing.into();
        active.meter_value = Set(meter_value);
        active.is_initial = Set(is_initial);
        active.update(&txn).await?
    } else {
        meter_reading::ActiveModel {
            room_id: Set(room_id),
            utility: Set(utility),
            date: Set(month),
            meter_value: Set(meter_value),
            is_initial: Set(is_initial),
            ..Default::default()
        }
        .insert(&txn)
        .await?
    };

    calculator::on_reading_committed(&txn, room_id, month).await?;
    if let Some(next) = find_next_reading(&txn, room_id, utility, month).await? {
        calculator::on_reading_committed(&txn, room_id, next.date).await?;
    }

    txn.commit().await?;

    info!(
        room_id,
        %utility,
        month = %month_key(month),
        meter_value,
        is_initial,
        "Meter reading recorded"
    );
    Ok(reading)
}

/// Records the month's unit prices and exchange rate, then refreshes the month's
/// draft bills in the same transaction.
///
/// # Errors
/// * `Validation` if any value is not positive
/// * `DataIntegrity` if a refreshed draft bill has bad readings
pub async fn set_rate(
    db: &DatabaseConnection,
    month: NaiveDate,
    water_unit_price: Decimal,
    electricity_unit_price: Decimal,
    exchange_rate: Decimal,
) -> Result<UnitPriceModel> {
    for (name, value) in [
        ("Water unit price", water_unit_price),
        ("Electricity unit price", electricity_unit_price),
        ("Exchange rate", exchange_rate),
    ] {
        if value <= Decimal::ZERO {
            return Err(Error::Validation {
                message: format!("{name} must be positive (got {value})"),
            });
        }
    }
    let month = month_start(month);

    let txn = db.begin().await?;

    let rate = if let Some(existing) = find_rate(&txn, month).await? {
        let mut active: unit_price::ActiveModel = existing.into();
        active.water_unit_price = Set(water_unit_price);
        active.electricity_unit_price = Set(electricity_unit_price);
        active.exchange_rate = Set(exchange_rate);
        active.update(&txn).await?
    } else {
        unit_price::ActiveModel {
            date: Set(month),
            water_unit_price: Set(water_unit_price),
            electricity_unit_price: Set(electricity_unit_price),
            exchange_rate: Set(exchange_rate),
            ..Default::default()
        }
        .insert(&txn)
        .await?
    };

    let drafts = MonthlyBill::find()
        .filter(monthly_bill::Column::Month.eq(month))
        .filter(monthly_bill::Column::Status.eq(BillStatus::Draft))
        .all(&txn)
        .await?;
    let refreshed = drafts.len();
    for bill in drafts {
        calculator::recalculate_bill(&txn, bill.room_id, month).await?;
    }

    txn.commit().await?;

    info!(
        month = %month_key(month),
        %water_unit_price,
        %electricity_unit_price,
        %exchange_rate,
        refreshed,
        "Unit prices recorded"
    );
    Ok(rate)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{calculator, status};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_record_reading_normalises_and_upserts() -> Result<()> {
        let db = setup_test_db().await?;
        let room = create_test_room(&db, "A1", dec!(100)).await?;
        let mid_month = NaiveDate::from_ymd_opt(2025, 2, 17).ok_or(Error::Validation {
            message: "bad date".to_string(),
        })?;

        let first = record_reading(&db, room.id, Utility::Water, mid_month, 10, true).await?;
        assert_eq!(first.date, test_month());

        let second = record_reading(&db, room.id, Utility::Water, test_month(), 12, false).await?;
        assert_eq!(first.id, second.id);
        assert_eq!(second.meter_value, 12);
        assert!(!second.is_initial);
        assert_eq!(MeterReading::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_reading_rejects_negative_and_unknown_room() -> Result<()> {
        let db = setup_test_db().await?;
        let room = create_test_room(&db, "A1", dec!(100)).await?;

        let result = record_reading(&db, room.id, Utility::Water, test_month(), -1, false).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = record_reading(&db, 999, Utility::Water, test_month(), 1, false).await;
        assert!(matches!(result, Err(Error::RoomNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_reading_refreshes_draft_bill() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;
        assert_eq!(bill.water_cost, dec!(20000));

        record_reading(&db, fixture.room.id, Utility::Water, fixture.month, 65, false).await?;
        let bill = calculator::get_bill(&db, bill.id).await?;
        assert_eq!(bill.water_cost, dec!(30000));
        assert_eq!(bill.total, dec!(450000));
        Ok(())
    }

    #[tokio::test]
    async fn test_reading_does_not_touch_issued_bill() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;
        status::issue(&db, bill.id).await?;

        record_reading(&db, fixture.room.id, Utility::Water, fixture.month, 65, false).await?;
        let after = calculator::get_bill(&db, bill.id).await?;
        assert_eq!(after.water_cost, dec!(20000));
        Ok(())
    }

    #[tokio::test]
    async fn test_reading_refreshes_next_bill_across_gap() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let march = fixture.month.checked_add_months(chrono::Months::new(1)).unwrap();
        let april = fixture.month.checked_add_months(chrono::Months::new(2)).unwrap();
        create_test_rate(&db, april, dec!(2000), dec!(1000), dec!(4000)).await?;
        create_test_reading(&db, fixture.room.id, Utility::Water, april, 80).await?;
        let bill = calculator::recalculate_bill(&db, fixture.room.id, april).await?;
        assert_eq!(bill.water_cost, dec!(40000));

        // March fills the gap and becomes April's previous reading
        create_test_reading(&db, fixture.room.id, Utility::Water, march, 70).await?;
        let bill = calculator::get_bill(&db, bill.id).await?;
        assert_eq!(bill.water_cost, dec!(20000));

        let next = find_next_reading(&db, fixture.room.id, Utility::Water, fixture.month).await?;
        assert_eq!(next.map(|r| r.date), Some(march));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_reading_rolls_back() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;

        let result =
            record_reading(&db, fixture.room.id, Utility::Water, fixture.month, 40, false).await;
        assert!(matches!(result, Err(Error::DataIntegrity { .. })));

        let reading = find_reading(&db, fixture.room.id, Utility::Water, fixture.month).await?;
        assert_eq!(reading.map(|r| r.meter_value), Some(60));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_rate_validates_and_refreshes() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let result = set_rate(&db, fixture.month, dec!(0), dec!(1000), dec!(4000)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let bill = calculator::recalculate_bill(&db, fixture.room.id, fixture.month).await?;
        set_rate(&db, fixture.month, dec!(2000), dec!(1000), dec!(4100)).await?;
        let bill = calculator::get_bill(&db, bill.id).await?;
        assert_eq!(bill.room_cost, dec!(410000));
        assert_eq!(UnitPrice::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_usage_for_month() -> Result<()> {
        let (db, fixture) = setup_billing_fixture().await?;
        let water = usage_for_month(&db, fixture.room.id, Utility::Water, fixture.month).await?;
        assert_eq!(water, Some(10));
        let electricity =
            usage_for_month(&db, fixture.room.id, Utility::Electricity, fixture.month).await?;
        assert_eq!(electricity, Some(20));

        // no reading before the previous month
        let first = usage_for_month(&db, fixture.room.id, Utility::Water, previous_test_month()).await?;
        assert_eq!(first, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_rate_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let result = get_rate(&db, test_month()).await;
        assert!(matches!(result, Err(Error::RateNotFound { .. })));
        Ok(())
    }
}
