//! Tenant entity - The person renting a room.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tenant database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login-style handle, unique
    #[sea_orm(unique)]
    pub username: String,
    /// Full name, may be empty
    pub full_name: String,
    /// Discord user id when the tenant uses the bot themselves
    pub discord_user_id: Option<String>,
    /// When the tenant was created
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Full name, falling back to the username.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.full_name.trim().is_empty() {
            self.username.clone()
        } else {
            self.full_name.trim().to_string()
        }
    }
}

/// Defines relationships between Tenant and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Contact profile
    #[sea_orm(has_one = "super::tenant_profile::Entity")]
    Profile,
}

impl Related<super::tenant_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
