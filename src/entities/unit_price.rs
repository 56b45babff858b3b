//! Unit price entity - Per-month utility prices and the base-to-local exchange rate.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Rate table entry
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "unit_prices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// First day of the month, one entry per month
    #[sea_orm(unique)]
    pub date: Date,
    /// Local currency per cubic metre of water
    pub water_unit_price: Decimal,
    /// Local currency per kWh
    pub electricity_unit_price: Decimal,
    /// Base currency (USD) to local currency (KHR)
    pub exchange_rate: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
