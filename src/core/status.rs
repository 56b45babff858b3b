//! Bill status machine - Guards and applies the draft → issued → sent → paid lifecycle.
//!
//! Every status write is a compare-and-set: the UPDATE is filtered on the status the
//! guard was evaluated against, so two concurrent transitions of the same bill can
//! never both succeed. Status ordinals never decrease. Once a bill leaves draft the
//! whole record is locked: money fields, notes and deletion are all refused.

use crate::{
    core::{calculator::get_bill, diagnostics, tenant},
    entities::{BillStatus, MonthlyBill, MonthlyBillModel, monthly_bill},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{prelude::*, sea_query::Expr};
use tracing::info;

/// Checks whether `from → to` is a legal transition.
///
/// `sent → sent` is allowed for re-delivery and `draft → draft` is a no-op; every
/// other transition must move exactly one step forward.
pub fn check_transition(from: BillStatus, to: BillStatus) -> Result<()> {
    let invalid = |reason: String| Error::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason,
    };

    if to.ordinal() < from.ordinal() {
        return Err(invalid(format!(
            "Invoice status cannot move backwards from {from} to {to}."
        )));
    }

    match (from, to) {
        (BillStatus::Draft, BillStatus::Draft | BillStatus::Issued)
        | (BillStatus::Issued | BillStatus::Sent, BillStatus::Sent)
        | (BillStatus::Sent, BillStatus::Paid) => Ok(()),
        (_, BillStatus::Issued) => Err(invalid(
            "Invoice can only be issued from Draft status.".to_string(),
        )),
        (_, BillStatus::Sent) => Err(invalid(
            "Invoice can only be sent when status is Issued or Sent.".to_string(),
        )),
        (_, BillStatus::Paid) => Err(invalid(
            "Invoice can only be marked Paid after it is Sent.".to_string(),
        )),
        (_, BillStatus::Draft) => Err(invalid(format!(
            "Invoice status cannot move backwards from {from} to {to}."
        ))),
    }
}

fn ensure_applied(rows_affected: u64, expected: BillStatus) -> Result<()> {
    if rows_affected == 0 {
        return Err(Error::StaleStatus {
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Checks everything `draft → issued` needs without writing.
///
/// # Errors
/// * `InvalidTransition` unless the bill is a draft
/// * `MissingData` if a rate entry or reading is absent
/// * `NoOccupant`, `NoProfile` or `NoNotificationTarget` for the delivery target
pub async fn issue_guard<C>(db: &C, bill: &MonthlyBillModel) -> Result<()>
where
    C: ConnectionTrait,
{
    check_transition(bill.status, BillStatus::Issued)?;

    let conditions = diagnostics::diagnose_bill(db, bill).await?;
    if conditions.iter().any(|c| c.is_data()) {
        return Err(Error::MissingData {
            action: "issue".to_string(),
        });
    }

    tenant::load_occupancy(db, bill.room_id)
        .await?
        .notification_target()?;
    Ok(())
}

/// `draft → issued`: freezes the occupant name and stamps `issued_at`.
pub async fn issue<C>(db: &C, bill_id: i64) -> Result<MonthlyBillModel>
where
    C: ConnectionTrait,
{
    let bill = get_bill(db, bill_id).await?;
    issue_guard(db, &bill).await?;

    let occupancy = tenant::load_occupancy(db, bill.room_id).await?;
    let snapshot = occupancy.tenant.as_ref().map(|t| t.display_name());

    let result = MonthlyBill::update_many()
        .col_expr(monthly_bill::Column::Status, Expr::value(BillStatus::Issued))
        .col_expr(monthly_bill::Column::IssuedAt, Expr::value(Utc::now()))
        .col_expr(monthly_bill::Column::TenantNameSnapshot, Expr::value(snapshot))
        .filter(monthly_bill::Column::Id.eq(bill_id))
        .filter(monthly_bill::Column::Status.eq(BillStatus::Draft))
        .exec(db)
        .await?;
    ensure_applied(result.rows_affected, BillStatus::Draft)?;

    info!(bill_id, room = %occupancy.room.room_number, "Bill issued");
    get_bill(db, bill_id).await
}

/// `issued → sent`, or `sent → sent` after a re-delivery.
///
/// `sent_at` is stamped on the first successful delivery only.
pub async fn mark_sent<C>(db: &C, bill_id: i64) -> Result<MonthlyBillModel>
where
    C: ConnectionTrait,
{
    let bill = get_bill(db, bill_id).await?;
    check_transition(bill.status, BillStatus::Sent)?;

    if bill.status == BillStatus::Sent {
        info!(bill_id, "Bill re-delivered");
        return Ok(bill);
    }

    let result = MonthlyBill::update_many()
        .col_expr(monthly_bill::Column::Status, Expr::value(BillStatus::Sent))
        .col_expr(
            monthly_bill::Column::SentAt,
            Expr::value(bill.sent_at.unwrap_or_else(Utc::now)),
        )
        .filter(monthly_bill::Column::Id.eq(bill_id))
        .filter(monthly_bill::Column::Status.eq(BillStatus::Issued))
        .exec(db)
        .await?;
    ensure_applied(result.rows_affected, BillStatus::Issued)?;

    info!(bill_id, "Bill marked sent");
    get_bill(db, bill_id).await
}

/// `sent → paid`, manual confirmation only.
pub async fn mark_paid<C>(db: &C, bill_id: i64) -> Result<MonthlyBillModel>
where
    C: ConnectionTrait,
{
    let bill = get_bill(db, bill_id).await?;
    check_transition(bill.status, BillStatus::Paid)?;

    let result = MonthlyBill::update_many()
        .col_expr(monthly_bill::Column::Status, Expr::value(BillStatus::Paid))
        .col_expr(monthly_bill::Column::PaidAt, Expr::value(Utc::now()))
        .filter(monthly_bill::Column::Id.eq(bill_id))
        .filter(monthly_bill::Column::Status.eq(BillStatus::Sent))
        .exec(db)
        .await?;
    ensure_applied(result.rows_affected, BillStatus::Sent)?;

    info!(bill_id, "Bill marked paid");
    get_bill(db, bill_id).await
}

/// Applies the transition to `target`, dispatching to the matching operation.
pub async fn transition<C>(db: &C, bill_id: i64, target: BillStatus) -> Result<MonthlyBillModel>
where
    C: ConnectionTrait,
{
    match target {
        BillStatus::Issued => issue(db, bill_id).await,
        BillStatus::Sent => mark_sent(db, bill_id).await,
        BillStatus::Paid => mark_paid(db, bill_id).await,
        BillStatus::Draft => {
            let bill = get_bill(db, bill_id).await?;
            check_transition(bill.status, BillStatus::Draft)?;
            Ok(bill)
        }
    }
}

/// Deletes a draft bill.
///
/// # Errors
/// `DeleteForbidden` once the bill is past draft.
pub async fn delete_bill<C>(db: &C, bill_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let bill = get_bill(db, bill_id).await?;
    if bill.status != BillStatus::Draft {
        return Err(Error::DeleteForbidden {
            status: bill.status.to_string(),
        });
    }

    let result = MonthlyBill::delete_many()
        .filter(monthly_bill::Column::Id.eq(bill_id))
        .filter(monthly_bill::Column::Status.eq(BillStatus::Draft))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        let current = get_bill(db, bill_id).await?;
        return Err(Error::DeleteForbidden {
            status: current.status.to_string(),
        });
    }

    info!(bill_id, "Draft bill deleted");
    Ok(())
}

/// Manual corrections to a draft bill. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct BillEdit {
    pub room_cost: Option<Decimal>,
    pub water_cost: Option<Decimal>,
    pub electricity_cost: Option<Decimal>,
    pub data_note: Option<String>,
}

/// Applies a manual edit to a draft bill; the total is re-derived from the parts.
///
/// # Errors
/// `BillLocked` if the bill is past draft, `Validation` for negative amounts.
pub async fn apply_edit<C>(db: &C, bill_id: i64, edit: BillEdit) -> Result<MonthlyBillModel>
where
    C: ConnectionTrait,
{
    let bill = get_bill(db, bill_id).await?;
    if bill.status != BillStatus::Draft {
        return Err(Error::BillLocked {
            status: bill.status.to_string(),
        });
    }

    let room_cost = edit.room_cost.unwrap_or(bill.room_cost);
    let water_cost = edit.water_cost.unwrap_or(bill.water_cost);
    let electricity_cost = edit.electricity_cost.unwrap_or(bill.electricity_cost);
    if [room_cost, water_cost, electricity_cost]
        .iter()
        .any(|amount| *amount < Decimal::ZERO)
    {
        return Err(Error::Validation {
            message: "Bill amounts cannot be negative".to_string(),
        });
    }
    let data_note = edit.data_note.unwrap_or(bill.data_note);

    let result = MonthlyBill::update_many()
        .col_expr(monthly_bill::Column::RoomCost, Expr::value(room_cost))
        .col_expr(monthly_bill::Column::WaterCost, Expr::value(water_cost))
        .col_expr(monthly_bill::Column::ElectricityCost, Expr::value(electricity_cost))
        .col_expr(
            monthly_bill::Column::Total,
            Expr::value(room_cost + water_cost + electricity_cost),
        )
        .col_expr(monthly_bill::Column::DataNote, Expr::value(data_note))
        .filter(monthly_bill::Column::Id.eq(bill_id))
        .filter(monthly_bill::Column::Status.eq(BillStatus::Draft))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        let current = get_bill(db, bill_id).await?;
        return Err(Error::BillLocked {
            status: current.status.to_string(),
        });
    }

    info!(bill_id, "Draft bill edited");
    get_bill(db, bill_id).await
}
