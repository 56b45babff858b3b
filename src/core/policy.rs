//! Access policy shared by every entry point.
//!
//! Landlord admins may do everything. A tenant may only look at the invoice of the
//! room they occupy, and only once it has been delivered.

use crate::{
    entities::{BillStatus, MonthlyBillModel},
    errors::{Error, Result},
};
use std::fmt;

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    /// Member of the admin allowlist
    Admin,
    /// Tenant linked to a Discord account; `room_id` is the room they occupy, if any
    Tenant { room_id: Option<i64> },
    /// Anyone else
    Anonymous,
}

/// Operation being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewBill,
    DownloadInvoice,
    GenerateBills,
    Regenerate,
    Issue,
    Send,
    MarkPaid,
    EditBill,
    DeleteBill,
    BulkSend,
    ManageData,
    ViewReport,
    RunDiagnostics,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ViewBill => "view this bill",
            Self::DownloadInvoice => "download this invoice",
            Self::GenerateBills => "generate bills",
            Self::Regenerate => "re-generate invoices",
            Self::Issue => "issue bills",
            Self::Send => "send invoices",
            Self::MarkPaid => "mark bills as paid",
            Self::EditBill => "edit bills",
            Self::DeleteBill => "delete bills",
            Self::BulkSend => "send invoices to the group",
            Self::ManageData => "manage rooms, tenants, readings or rates",
            Self::ViewReport => "view reports",
            Self::RunDiagnostics => "run diagnostics",
        };
        f.write_str(text)
    }
}

/// Whether `subject` may perform `action`, optionally on a specific bill.
#[must_use]
pub fn can(subject: &Subject, action: Action, bill: Option<&MonthlyBillModel>) -> bool {
    match subject {
        Subject::Admin => true,
        Subject::Anonymous => false,
        Subject::Tenant { room_id } => {
            let tenant_action = matches!(action, Action::ViewBill | Action::DownloadInvoice);
            let own_delivered = match (room_id, bill) {
                (Some(room_id), Some(bill)) => {
                    bill.room_id == *room_id
                        && matches!(bill.status, BillStatus::Sent | BillStatus::Paid)
                }
                _ => false,
            };
            tenant_action && own_delivered
        }
    }
}

/// Like [`can`], returning `Forbidden` on refusal.
pub fn authorize(subject: &Subject, action: Action, bill: Option<&MonthlyBillModel>) -> Result<()> {
    if can(subject, action, bill) {
        Ok(())
    } else {
        Err(Error::Forbidden {
            action: action.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_tenant_sees_only_own_delivered_bill() -> Result<()> {
        let (_db, sent) = setup_bill_in(BillStatus::Sent).await?;
        let own = Subject::Tenant {
            room_id: Some(sent.room_id),
        };
        let other = Subject::Tenant {
            room_id: Some(sent.room_id + 1),
        };

        assert!(can(&own, Action::ViewBill, Some(&sent)));
        assert!(can(&own, Action::DownloadInvoice, Some(&sent)));
        assert!(!can(&own, Action::MarkPaid, Some(&sent)));
        assert!(!can(&other, Action::ViewBill, Some(&sent)));
        assert!(!can(&Subject::Tenant { room_id: None }, Action::ViewBill, Some(&sent)));
        assert!(!can(&own, Action::ViewBill, None));

        let (_db, issued) = setup_bill_in(BillStatus::Issued).await?;
        let own = Subject::Tenant {
            room_id: Some(issued.room_id),
        };
        assert!(!can(&own, Action::DownloadInvoice, Some(&issued)));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_and_anonymous() -> Result<()> {
        let (_db, paid) = setup_bill_in(BillStatus::Paid).await?;
        assert!(can(&Subject::Admin, Action::DeleteBill, Some(&paid)));
        assert!(can(&Subject::Admin, Action::ManageData, None));
        assert!(!can(&Subject::Anonymous, Action::ViewBill, Some(&paid)));

        let denied = authorize(&Subject::Anonymous, Action::Issue, None);
        assert_eq!(
            denied.err().map(|e| e.to_string()).as_deref(),
            Some("You are not allowed to issue bills.")
        );
        Ok(())
    }
}
