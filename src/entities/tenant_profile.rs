//! Tenant profile entity - Contact details, including the Telegram chat used for delivery.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tenant profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenant_profiles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning tenant, one profile per tenant
    #[sea_orm(unique)]
    pub tenant_id: i64,
    /// Phone number
    pub phone: Option<String>,
    /// Telegram chat id that receives invoices
    pub telegram_chat_id: Option<String>,
}

impl Model {
    /// Non-blank chat id, if configured.
    #[must_use]
    pub fn notification_target(&self) -> Option<&str> {
        self.telegram_chat_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
