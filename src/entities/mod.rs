//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod alert_log;
pub mod batch_job;
pub mod enums;
pub mod meter_reading;
pub mod monthly_bill;
pub mod room;
pub mod tenant;
pub mod tenant_profile;
pub mod unit_price;

// Re-export specific types to avoid conflicts
pub use alert_log::{Column as AlertLogColumn, Entity as AlertLog, Model as AlertLogModel};
pub use batch_job::{Column as BatchJobColumn, Entity as BatchJob, Model as BatchJobModel};
pub use enums::{BillStatus, JobStatus, JobType, Utility};
pub use meter_reading::{
    Column as MeterReadingColumn, Entity as MeterReading, Model as MeterReadingModel,
};
pub use monthly_bill::{
    Column as MonthlyBillColumn, Entity as MonthlyBill, Model as MonthlyBillModel,
};
pub use room::{Column as RoomColumn, Entity as Room, Model as RoomModel};
pub use tenant::{Column as TenantColumn, Entity as Tenant, Model as TenantModel};
pub use tenant_profile::{
    Column as TenantProfileColumn, Entity as TenantProfile, Model as TenantProfileModel,
};
pub use unit_price::{Column as UnitPriceColumn, Entity as UnitPrice, Model as UnitPriceModel};
