//! Administrator allowlist loaded from environment variables.
//!
//! `ADMIN_USER_IDS` holds a comma-separated list of Discord user ids that may act
//! on bills. Anyone else is treated as a tenant (or an unknown user) by the access policy.

use std::collections::HashSet;

/// Environment variable holding the admin ids.
pub const ADMIN_USER_IDS_VAR: &str = "ADMIN_USER_IDS";

/// Parses a comma-separated id list, ignoring blanks and surrounding whitespace.
#[must_use]
pub fn parse_admin_ids(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Reads the admin allowlist from the environment. Missing variable means no admins.
#[must_use]
pub fn get_admin_ids() -> HashSet<String> {
    std::env::var(ADMIN_USER_IDS_VAR)
        .map(|raw| parse_admin_ids(&raw))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_admin_ids_trims_and_skips_blanks() {
        let ids = parse_admin_ids(" 111, 222 ,,333 ,");
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("111"));
        assert!(ids.contains("222"));
        assert!(ids.contains("333"));
    }

    #[test]
    fn test_parse_admin_ids_empty() {
        assert!(parse_admin_ids("").is_empty());
        assert!(parse_admin_ids(" , ").is_empty());
    }
}
