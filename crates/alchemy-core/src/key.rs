//! Combination keys.
//!
//! A key identifies an unordered pair of element names. Both halves are
//! folded (lowercased, trimmed, inner whitespace runs collapsed to `_`) and
//! sorted by code point before joining with `+`, so `normalize(a, b)` and
//! `normalize(b, a)` always agree.

use crate::constants::{ADMIN_KEY_PREFIX, KEY_SEPARATOR, STARTER_KEY_PREFIX};

/// Fold a single element name into its identity form.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Canonical key for the unordered pair `{a, b}`. Total and deterministic.
pub fn normalize(a: &str, b: &str) -> String {
    let mut halves = [fold_name(a), fold_name(b)];
    halves.sort();
    let [first, second] = halves;
    format!("{first}{KEY_SEPARATOR}{second}")
}

/// Do two display names refer to the same element?
pub fn same_element(a: &str, b: &str) -> bool {
    fold_name(a) == fold_name(b)
}

/// Reserved key of the admin placeholder row for `name`.
pub fn admin_key(name: &str) -> String {
    format!("{ADMIN_KEY_PREFIX}{}", fold_name(name))
}

/// Reserved key of the seeded starter row for `name`.
pub fn starter_key(name: &str) -> String {
    format!("{STARTER_KEY_PREFIX}{}", fold_name(name))
}

/// Does `key` belong to a placeholder row rather than a pair?
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(ADMIN_KEY_PREFIX) || key.starts_with(STARTER_KEY_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric() {
        assert_eq!(normalize("Water", "Fire"), normalize("Fire", "Water"));
        assert_eq!(normalize("Water", "Fire"), "fire+water");
    }

    #[test]
    fn test_case_and_whitespace_collapse() {
        assert_eq!(normalize("Earth", "Water"), normalize("water", "  earth "));
        assert_eq!(
            normalize("Hot   Air", "Wind"),
            normalize("hot air", " WIND")
        );
        assert_eq!(normalize("Hot \t Air", "Wind"), "hot_air+wind");
    }

    #[test]
    fn test_self_pair() {
        assert_eq!(normalize("Fire", "fire"), "fire+fire");
    }

    #[test]
    fn test_empty_inputs_still_total() {
        assert_eq!(normalize("", "  "), "+");
    }

    #[test]
    fn test_code_point_ordering() {
        // Uppercase folds first, so ordering is by folded code point.
        assert_eq!(normalize("Zebra", "apple"), "apple+zebra");
        assert_eq!(normalize("Éclair", "eclair"), "eclair+éclair");
    }

    #[test]
    fn test_reserved_keys_never_collide_with_pairs() {
        let admin = admin_key("Steam Engine");
        assert_eq!(admin, "_admin_steam_engine");
        assert!(is_reserved_key(&admin));
        assert!(is_reserved_key(&starter_key("Earth")));
        assert!(!is_reserved_key(&normalize("_admin", "x")));
        assert!(!admin.contains(KEY_SEPARATOR));
    }

    #[test]
    fn test_same_element() {
        assert!(same_element("Steam", " steam"));
        assert!(same_element("Hot Air", "hot   air"));
        assert!(!same_element("Steam", "Vapor"));
    }
}
