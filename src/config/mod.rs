/// Database configuration and connection management
pub mod database;

/// Application settings loaded from config.toml
pub mod settings;

/// Administrator allowlist from environment variables
pub mod admins;

pub use settings::{
    AlertSettings, DeliverySettings, InvoiceSettings, Settings, TelegramSettings,
};
