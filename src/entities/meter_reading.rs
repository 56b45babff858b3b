//! Meter reading entity - One dated utility meter value for a room.
//!
//! Water and electricity share the same shape and are told apart by `utility`.
//! Dates are normalised to the first of the month, and (room, utility, date) is unique.

use super::enums::Utility;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Meter reading database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "meter_readings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Room the meter belongs to
    pub room_id: i64,
    /// Which meter
    pub utility: Utility,
    /// First day of the month the reading belongs to
    pub date: Date,
    /// Non-negative meter value
    pub meter_value: i64,
    /// Initial reading taken at move-in
    pub is_initial: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::room::Entity",
        from = "Column::RoomId",
        to = "super::room::Column::Id"
    )]
    Room,
}

impl Related<super::room::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Room.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
