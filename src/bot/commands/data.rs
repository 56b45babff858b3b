//! Data entry Discord commands - rooms, tenants, meter readings and unit prices.
//!
//! Readings and rates refresh the affected draft bills as part of the same write.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, authorize, handlers::autocomplete, parse_amount},
        core::{
            month::{month_key, parse_month},
            policy::Action,
            readings, room,
            report::format_khr,
            tenant::{self, load_occupancy},
        },
        entities::Utility,
        errors::Result,
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write;

    /// Meter selector for `/record_reading`.
    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum UtilityChoice {
        Water,
        Electricity,
    }

    impl From<UtilityChoice> for Utility {
        fn from(choice: UtilityChoice) -> Self {
            match choice {
                UtilityChoice::Water => Self::Water,
                UtilityChoice::Electricity => Self::Electricity,
            }
        }
    }

    /// Lists all rooms with their occupant.
    #[poise::command(slash_command, prefix_command)]
    pub async fn rooms(ctx: Context<'_>) -> Result<()> {
        authorize(ctx, Action::ManageData, None).await?;
        let db = &ctx.data().database;

        let all_rooms = room::list_rooms(db).await?;
        if all_rooms.is_empty() {
            ctx.say("🏠 No rooms yet. Add one with `/add_room`.").await?;
            return Ok(());
        }

        let mut response = String::from("🏠 **Rooms**\n\n");
        for r in all_rooms {
            let occupancy = load_occupancy(db, r.id).await?;
            let occupant = occupancy
                .tenant
                .as_ref()
                .map_or_else(|| "vacant".to_string(), |t| t.display_name());
            let chat = if occupancy.notification_target().is_ok() { "📱" } else { "" };
            writeln!(
                &mut response,
                "**{}** - {} USD - {occupant} {chat}",
                r.room_number,
                r.price.normalize()
            )?;
        }
        ctx.say(response).await?;
        Ok(())
    }

    /// Adds a room with its monthly price in USD.
    #[poise::command(slash_command, prefix_command)]
    pub async fn add_room(
        ctx: Context<'_>,
        #[description = "Room number"] room_number: String,
        #[description = "Monthly price in USD"] price: String,
    ) -> Result<()> {
        authorize(ctx, Action::ManageData, None).await?;
        let price = parse_amount(&price, "Price")?;
        let created = room::create_room(&ctx.data().database, &room_number, price).await?;
        ctx.say(format!(
            "✅ Added room **{}** at {} USD per month.",
            created.room_number,
            created.price.normalize()
        ))
        .await?;
        Ok(())
    }

    /// Adds a tenant.
    #[poise::command(slash_command, prefix_command)]
    pub async fn add_tenant(
        ctx: Context<'_>,
        #[description = "Unique username"] username: String,
        #[description = "Full name"] full_name: Option<String>,
        #[description = "Discord account of the tenant"] discord_user: Option<serenity::User>,
    ) -> Result<()> {
        authorize(ctx, Action::ManageData, None).await?;
        let db = &ctx.data().database;

        let created =
            tenant::create_tenant(db, &username, full_name.as_deref().unwrap_or_default()).await?;
        if let Some(user) = discord_user {
            tenant::link_discord_user(db, created.id, Some(user.id.to_string())).await?;
        }
        ctx.say(format!("✅ Added tenant **{}**.", created.display_name()))
            .await?;
        Ok(())
    }

    /// Sets a tenant's phone and Telegram chat id.
    #[poise::command(slash_command, prefix_command)]
    pub async fn set_profile(
        ctx: Context<'_>,
        #[description = "Tenant username"] username: String,
        #[description = "Phone number"] phone: Option<String>,
        #[description = "Telegram chat id"] telegram_chat_id: Option<String>,
    ) -> Result<()> {
        authorize(ctx, Action::ManageData, None).await?;
        let db = &ctx.data().database;

        let found = tenant::get_tenant_by_username(db, &username).await?;
        let profile = tenant::upsert_profile(db, found.id, phone, telegram_chat_id).await?;
        let chat = profile.telegram_chat_id.as_deref().unwrap_or("not set");
        ctx.say(format!(
            "✅ Profile of **{}** saved. Telegram chat: {chat}",
            found.display_name()
        ))
        .await?;
        Ok(())
    }

    /// Moves a tenant into a room, or empties the room.
    #[poise::command(slash_command, prefix_command)]
    pub async fn assign_tenant(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Tenant username (leave empty to vacate)"] username: Option<String>,
    ) -> Result<()> {
        authorize(ctx, Action::ManageData, None).await?;
        let db = &ctx.data().database;

        let target = room::get_room_by_number(db, &room).await?;
        let tenant = match username {
            Some(username) => Some(tenant::get_tenant_by_username(db, &username).await?),
            None => None,
        };
        room::assign_occupant(db, target.id, tenant.as_ref().map(|t| t.id)).await?;

        let message = match tenant {
            Some(t) => format!("✅ **{}** now occupies room {}.", t.display_name(), target.room_number),
            None => format!("✅ Room {} is now vacant.", target.room_number),
        };
        ctx.say(message).await?;
        Ok(())
    }

    /// Records a meter reading and refreshes the affected draft bills.
    #[poise::command(slash_command, prefix_command)]
    pub async fn record_reading(
        ctx: Context<'_>,
        #[description = "Room number"]
        #[autocomplete = "autocomplete::autocomplete_room_number"]
        room: String,
        #[description = "Meter"] utility: UtilityChoice,
        #[description = "Month (YYYY-MM)"] month: String,
        #[description = "Meter value"] value: i64,
        #[description = "Initial reading at move-in (default: false)"] initial: Option<bool>,
    ) -> Result<()> {
        authorize(ctx, Action::ManageData, None).await?;
        let db = &ctx.data().database;
        let month = parse_month(&month)?;

        let target = room::get_room_by_number(db, &room).await?;
        let utility = Utility::from(utility);
        let reading = readings::record_reading(
            db,
            target.id,
            utility,
            month,
            value,
            initial.unwrap_or(false),
        )
        .await?;
        ctx.say(format!(
            "✅ {utility} reading for room {} in {}: {}",
            target.room_number,
            month_key(reading.date),
            reading.meter_value
        ))
        .await?;
        Ok(())
    }

    /// Records the unit prices and exchange rate of a month.
    #[poise::command(slash_command, prefix_command)]
    pub async fn set_rate(
        ctx: Context<'_>,
        #[description = "Month (YYYY-MM)"] month: String,
        #[description = "Water price per m³ in KHR"] water: String,
        #[description = "Electricity price per kWh in KHR"] electricity: String,
        #[description = "KHR per USD"] exchange_rate: String,
    ) -> Result<()> {
        authorize(ctx, Action::ManageData, None).await?;
        let month = parse_month(&month)?;
        let rate = readings::set_rate(
            &ctx.data().database,
            month,
            parse_amount(&water, "Water price")?,
            parse_amount(&electricity, "Electricity price")?,
            parse_amount(&exchange_rate, "Exchange rate")?,
        )
        .await?;
        ctx.say(format!(
            "✅ Rates for {}: water {}, electricity {}, 1 USD = {}",
            month_key(rate.date),
            format_khr(rate.water_unit_price),
            format_khr(rate.electricity_unit_price),
            format_khr(rate.exchange_rate)
        ))
        .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
