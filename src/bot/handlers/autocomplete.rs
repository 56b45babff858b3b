//! Autocomplete handlers for Discord slash command parameters.
//!
//! Suggests room numbers and invoice languages as the user types.

use crate::{
    bot::BotData,
    core::room,
    errors::Error,
    integrations::Language,
};

/// Provides autocomplete suggestions for room numbers.
///
/// Returns up to 25 room numbers containing the partial input, case-insensitively.
pub async fn autocomplete_room_number(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let db = &ctx.data().database;

    let Ok(rooms) = room::list_rooms(db).await else {
        return Vec::new();
    };

    let partial_lower = partial.to_lowercase();
    let mut matching: Vec<String> = rooms
        .into_iter()
        .filter(|r| r.room_number.to_lowercase().contains(&partial_lower))
        .map(|r| r.room_number)
        .take(25) // Discord autocomplete limit
        .collect();

    matching.sort();
    matching
}

/// Provides autocomplete suggestions for invoice languages.
pub async fn autocomplete_language(
    _ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let partial_lower = partial.to_lowercase();
    Language::ALL
        .iter()
        .map(|l| l.code().to_string())
        .filter(|code| code.contains(&partial_lower))
        .collect()
}
