/// The four starter elements every puzzle graph is rooted at: (name, glyph).
pub const STARTERS: [(&str, &str); 4] = [
    ("Earth", "🌍"),
    ("Water", "💧"),
    ("Fire", "🔥"),
    ("Wind", "💨"),
];

/// Maximum length (in chars) of an element name.
pub const MAX_NAME_LEN: usize = 100;

/// Input sentinel marking an admin placeholder row.
pub const ADMIN_SENTINEL: &str = "_ADMIN";

/// Input sentinel marking a seeded definition row (starters).
pub const DEFINED_SENTINEL: &str = "_DEFINED";

/// Key prefix reserved for admin placeholder rows.
pub const ADMIN_KEY_PREFIX: &str = "_admin_";

/// Key prefix reserved for seeded starter rows.
pub const STARTER_KEY_PREFIX: &str = "_starter_";

/// Separator between the two halves of a combination key.
pub const KEY_SEPARATOR: char = '+';

/// Default number of candidate paths requested from the model.
pub const DEFAULT_PATH_COUNT: usize = 3;

/// Upper bound on existing combinations sent as prompt context.
pub const DEFAULT_CONTEXT_LIMIT: usize = 200;

/// Number of nearby combinations shown to the model as a style sample.
pub const STYLE_SAMPLE_SIZE: usize = 12;

/// Longest accepted path (steps) from a model reply.
pub const MAX_PATH_STEPS: usize = 30;

/// Is `name` one of the four starter elements (case-insensitive)?
pub fn is_starter(name: &str) -> bool {
    let folded = name.trim().to_lowercase();
    STARTERS.iter().any(|(s, _)| s.to_lowercase() == folded)
}

/// Glyph of a starter element, if `name` is one.
pub fn starter_glyph(name: &str) -> Option<&'static str> {
    let folded = name.trim().to_lowercase();
    STARTERS
        .iter()
        .find(|(s, _)| s.to_lowercase() == folded)
        .map(|(_, g)| *g)
}

/// Is `input` one of the reserved row sentinels?
pub fn is_sentinel(input: &str) -> bool {
    input == ADMIN_SENTINEL || input == DEFINED_SENTINEL
}
