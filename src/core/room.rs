//! Room business logic - Creating rooms and managing their occupant.

use crate::{
    entities::{Room, RoomModel, Tenant, room},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::info;

/// Creates a room with a monthly price in the base currency.
///
/// The room number is trimmed and must be non-empty; the price must be positive.
pub async fn create_room(
    db: &DatabaseConnection,
    room_number: &str,
    price: Decimal,
) -> Result<RoomModel> {
    let room_number = room_number.trim();
    if room_number.is_empty() {
        return Err(Error::Validation {
            message: "Room number cannot be empty".to_string(),
        });
    }
    if price <= Decimal::ZERO {
        return Err(Error::Validation {
            message: format!("Room price must be positive (got {price})"),
        });
    }

    let model = room::ActiveModel {
        room_number: Set(room_number.to_string()),
        price: Set(price),
        tenant_id: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(room = %model.room_number, %price, "Room created");
    Ok(model)
}

/// All rooms ordered by number.
pub async fn list_rooms<C>(db: &C) -> Result<Vec<RoomModel>>
where
    C: ConnectionTrait,
{
    Room::find()
        .order_by_asc(room::Column::RoomNumber)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a room by its id, failing with `RoomNotFound`.
pub async fn get_room<C>(db: &C, room_id: i64) -> Result<RoomModel>
where
    C: ConnectionTrait,
{
    Room::find_by_id(room_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::RoomNotFound {
            room: room_id.to_string(),
        })
}

/// Finds a room by its number, failing with `RoomNotFound`.
pub async fn get_room_by_number<C>(db: &C, room_number: &str) -> Result<RoomModel>
where
    C: ConnectionTrait,
{
    Room::find()
        .filter(room::Column::RoomNumber.eq(room_number.trim()))
        .one(db)
        .await?
        .ok_or_else(|| Error::RoomNotFound {
            room: room_number.to_string(),
        })
}

/// Sets or clears the room's current occupant.
///
/// A tenant can occupy only one room; assigning a tenant who already lives
/// elsewhere is rejected.
pub async fn assign_occupant(
    db: &DatabaseConnection,
    room_id: i64,
    tenant_id: Option<i64>,
) -> Result<RoomModel> {
    let room = get_room(db, room_id).await?;

    if let Some(tenant_id) = tenant_id {
        Tenant::find_by_id(tenant_id)
            .one(db)
            .await?
            .ok_or_else(|| Error::TenantNotFound {
                tenant: tenant_id.to_string(),
            })?;

        let occupied = Room::find()
            .filter(room::Column::TenantId.eq(tenant_id))
            .filter(room::Column::Id.ne(room_id))
            .one(db)
            .await?;
        if let Some(other) = occupied {
            return Err(Error::Validation {
                message: format!("Tenant already occupies room {}", other.room_number),
            });
        }
    }

    let mut active: room::ActiveModel = room.into();
    active.tenant_id = Set(tenant_id);
    let updated = active.update(db).await?;
    info!(room = %updated.room_number, ?tenant_id, "Room occupant updated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_create_room_validation() -> Result<()> {
        let db = setup_test_db().await?;

        let result = create_room(&db, "  ", dec!(100)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = create_room(&db, "A1", dec!(0)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let room = create_room(&db, " A1 ", dec!(100)).await?;
        assert_eq!(room.room_number, "A1");
        assert_eq!(room.price, dec!(100));
        assert!(room.tenant_id.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_room_number_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        create_room(&db, "A1", dec!(100)).await?;
        assert!(create_room(&db, "A1", dec!(120)).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_room_by_number_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let result = get_room_by_number(&db, "Z9").await;
        assert!(matches!(result, Err(Error::RoomNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_assign_and_clear_occupant() -> Result<()> {
        let db = setup_test_db().await?;
        let room = create_room(&db, "A1", dec!(100)).await?;
        let tenant = create_test_tenant(&db, "sokha").await?;

        let room = assign_occupant(&db, room.id, Some(tenant.id)).await?;
        assert_eq!(room.tenant_id, Some(tenant.id));

        let room = assign_occupant(&db, room.id, None).await?;
        assert!(room.tenant_id.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_tenant_cannot_occupy_two_rooms() -> Result<()> {
        let db = setup_test_db().await?;
        let a1 = create_room(&db, "A1", dec!(100)).await?;
        let a2 = create_room(&db, "A2", dec!(100)).await?;
        let tenant = create_test_tenant(&db, "sokha").await?;

        assign_occupant(&db, a1.id, Some(tenant.id)).await?;
        let result = assign_occupant(&db, a2.id, Some(tenant.id)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_assign_unknown_tenant() -> Result<()> {
        let db = setup_test_db().await?;
        let room = create_room(&db, "A1", dec!(100)).await?;
        let result = assign_occupant(&db, room.id, Some(999)).await;
        assert!(matches!(result, Err(Error::TenantNotFound { .. })));
        Ok(())
    }
}
