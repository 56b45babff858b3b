//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Bill lifecycle, delivery and download commands
pub mod billing;

/// Rooms, tenants, readings and rates
pub mod data;

/// General utility commands
pub mod general;

/// Monthly report and smart alerts
pub mod reports;

use crate::{bot::BotData, errors::Error};

// Export commands
pub use billing::*;
pub use data::*;
pub use general::*;
pub use reports::*;

/// Every command registered with the framework.
#[must_use]
pub fn all_commands() -> Vec<poise::Command<BotData, Error>> {
    vec![
        ping(),
        help(),
        generate_bills(),
        bills(),
        bill(),
        regenerate(),
        issue(),
        send(),
        mark_paid(),
        edit_bill(),
        delete_bill(),
        bulk_send(),
        batch_status(),
        invoice(),
        ping_tenant(),
        check_telegram(),
        rooms(),
        add_room(),
        add_tenant(),
        set_profile(),
        assign_tenant(),
        record_reading(),
        set_rate(),
        report(),
        alerts(),
    ]
}
