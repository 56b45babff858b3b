//! Room entity - A rentable room with a monthly price in the base currency.
//!
//! Each room has at most one current occupant (tenant). Bills and meter readings
//! hang off the room.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Room database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rooms")]
pub struct Model {
    /// Unique identifier for the room
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Room number as printed on the door (e.g., "A1")
    #[sea_orm(unique)]
    pub room_number: String,
    /// Monthly rent in the base currency (USD)
    pub price: Decimal,
    /// Current occupant, if any. A tenant occupies at most one room.
    #[sea_orm(unique)]
    pub tenant_id: Option<i64>,
}

/// Defines relationships between Room and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Current occupant
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
    /// One room has many monthly bills
    #[sea_orm(has_many = "super::monthly_bill::Entity")]
    MonthlyBills,
    /// One room has many meter readings
    #[sea_orm(has_many = "super::meter_reading::Entity")]
    MeterReadings,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::monthly_bill::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonthlyBills.def()
    }
}

impl Related<super::meter_reading::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MeterReadings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
