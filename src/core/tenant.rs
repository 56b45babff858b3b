//! Tenant business logic - Tenants, their contact profiles and occupancy lookups.

use crate::{
    entities::{
        Room, RoomModel, Tenant, TenantModel, TenantProfile, TenantProfileModel, room, tenant,
        tenant_profile,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use tracing::info;

/// Creates a tenant. Usernames are trimmed and must be unique.
pub async fn create_tenant(
    db: &DatabaseConnection,
    username: &str,
    full_name: &str,
) -> Result<TenantModel> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::Validation {
            message: "Tenant username cannot be empty".to_string(),
        });
    }

    let model = tenant::ActiveModel {
        username: Set(username.to_string()),
        full_name: Set(full_name.trim().to_string()),
        discord_user_id: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(tenant = %model.username, "Tenant created");
    Ok(model)
}

/// Finds a tenant by username.
pub async fn get_tenant_by_username<C>(db: &C, username: &str) -> Result<TenantModel>
where
    C: ConnectionTrait,
{
    Tenant::find()
        .filter(tenant::Column::Username.eq(username.trim()))
        .one(db)
        .await?
        .ok_or_else(|| Error::TenantNotFound {
            tenant: username.to_string(),
        })
}

/// Links a Discord account to a tenant so they can view their own invoices.
pub async fn link_discord_user(
    db: &DatabaseConnection,
    tenant_id: i64,
    discord_user_id: Option<String>,
) -> Result<TenantModel> {
    let tenant = Tenant::find_by_id(tenant_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::TenantNotFound {
            tenant: tenant_id.to_string(),
        })?;
    let mut active: tenant::ActiveModel = tenant.into();
    active.discord_user_id = Set(discord_user_id);
    active.update(db).await.map_err(Into::into)
}

/// Creates or replaces the tenant's contact profile.
pub async fn upsert_profile(
    db: &DatabaseConnection,
    tenant_id: i64,
    phone: Option<String>,
    telegram_chat_id: Option<String>,
) -> Result<TenantProfileModel> {
    Tenant::find_by_id(tenant_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::TenantNotFound {
            tenant: tenant_id.to_string(),
        })?;

    let existing = TenantProfile::find()
        .filter(tenant_profile::Column::TenantId.eq(tenant_id))
        .one(db)
        .await?;

    let profile = if let Some(existing) = existing {
        let mut active: tenant_profile::ActiveModel = existing.into();
        active.phone = Set(phone);
        active.telegram_chat_id = Set(telegram_chat_id);
        active.update(db).await?
    } else {
        tenant_profile::ActiveModel {
            tenant_id: Set(tenant_id),
            phone: Set(phone),
            telegram_chat_id: Set(telegram_chat_id),
            ..Default::default()
        }
        .insert(db)
        .await?
    };
    Ok(profile)
}

/// Occupant of a room together with the profile, each possibly absent.
#[derive(Debug, Clone)]
pub struct Occupancy {
    /// The room itself
    pub room: RoomModel,
    /// Current occupant
    pub tenant: Option<TenantModel>,
    /// Occupant's profile
    pub profile: Option<TenantProfileModel>,
}

impl Occupancy {
    /// Resolves the delivery target, distinguishing the three ways it can be missing.
    pub fn notification_target(&self) -> Result<&str> {
        let tenant = self.tenant.as_ref().ok_or_else(|| Error::NoOccupant {
            room_number: self.room.room_number.clone(),
        })?;
        let profile = self.profile.as_ref().ok_or_else(|| Error::NoProfile {
            tenant: tenant.display_name(),
        })?;
        profile
            .notification_target()
            .ok_or(Error::NoNotificationTarget)
    }
}

/// Loads the occupant and profile of a room.
pub async fn load_occupancy<C>(db: &C, room_id: i64) -> Result<Occupancy>
where
    C: ConnectionTrait,
{
    let room = Room::find_by_id(room_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::RoomNotFound {
            room: room_id.to_string(),
        })?;

    let tenant = match room.tenant_id {
        Some(tenant_id) => Tenant::find_by_id(tenant_id).one(db).await?,
        None => None,
    };
    let profile = match &tenant {
        Some(tenant) => {
            TenantProfile::find()
                .filter(tenant_profile::Column::TenantId.eq(tenant.id))
                .one(db)
                .await?
        }
        None => None,
    };

    Ok(Occupancy {
        room,
        tenant,
        profile,
    })
}

/// Room currently occupied by the tenant linked to a Discord user, if any.
pub async fn room_for_discord_user<C>(db: &C, discord_user_id: &str) -> Result<Option<RoomModel>>
where
    C: ConnectionTrait,
{
    let Some(tenant) = Tenant::find()
        .filter(tenant::Column::DiscordUserId.eq(discord_user_id))
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    Room::find()
        .filter(room::Column::TenantId.eq(tenant.id))
        .one(db)
        .await
        .map_err(Into::into)
}
