//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`;
//! the composite uniqueness rules that the entity attributes cannot express, one bill per
//! (room, month) and one reading per (room, utility, month), are added as unique indexes.

use crate::entities::{
    AlertLog, AlertLogColumn, BatchJob, MeterReading, MeterReadingColumn, MonthlyBill,
    MonthlyBillColumn, Room, Tenant, TenantProfile, UnitPrice,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/rent_house.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    info!(url = %database_url, "Connecting to database");
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table_for<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

fn unique_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("idx_bill_room_month")
            .table(MonthlyBill)
            .col(MonthlyBillColumn::RoomId)
            .col(MonthlyBillColumn::Month)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_reading_room_utility_date")
            .table(MeterReading)
            .col(MeterReadingColumn::RoomId)
            .col(MeterReadingColumn::Utility)
            .col(MeterReadingColumn::Date)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_alert_month_type_room")
            .table(AlertLog)
            .col(AlertLogColumn::Month)
            .col(AlertLogColumn::AlertType)
            .col(AlertLogColumn::RoomId)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

/// Creates all tables and unique indexes if they do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table_for(db, &schema, Tenant).await?;
    create_table_for(db, &schema, TenantProfile).await?;
    create_table_for(db, &schema, Room).await?;
    create_table_for(db, &schema, MeterReading).await?;
    create_table_for(db, &schema, UnitPrice).await?;
    create_table_for(db, &schema, MonthlyBill).await?;
    create_table_for(db, &schema, BatchJob).await?;
    create_table_for(db, &schema, AlertLog).await?;

    for index in unique_indexes() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Database tables and unique indexes ensured");
    Ok(())
}
