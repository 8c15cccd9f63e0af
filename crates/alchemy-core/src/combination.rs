use serde::{Deserialize, Serialize};

use crate::constants::{ADMIN_SENTINEL, DEFINED_SENTINEL, is_sentinel};
use crate::key::{admin_key, normalize, starter_key};

/// How a combination row came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    StarterPlaceholder,
    ModelGenerated,
    HumanAuthored,
    AdminPlaceholder,
}

impl Origin {
    pub const ALL: [Origin; 4] = [
        Origin::StarterPlaceholder,
        Origin::ModelGenerated,
        Origin::HumanAuthored,
        Origin::AdminPlaceholder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::StarterPlaceholder => "starter_placeholder",
            Origin::ModelGenerated => "model_generated",
            Origin::HumanAuthored => "human_authored",
            Origin::AdminPlaceholder => "admin_placeholder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Origin::ALL.into_iter().find(|o| o.as_str() == s)
    }
}

/// One stored combination row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combination {
    pub key: String,
    pub input_a: String,
    pub input_b: String,
    pub result_name: String,
    pub result_glyph: String,
    pub origin: Origin,
    pub created_at: String,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverer: Option<String>,
}

impl Combination {
    /// A pair row. The key is derived from the inputs.
    pub fn new(
        input_a: &str,
        input_b: &str,
        result_name: &str,
        result_glyph: &str,
        origin: Origin,
        created_at: &str,
    ) -> Self {
        Self {
            key: normalize(input_a, input_b),
            input_a: input_a.to_string(),
            input_b: input_b.to_string(),
            result_name: result_name.to_string(),
            result_glyph: result_glyph.to_string(),
            origin,
            created_at: created_at.to_string(),
            use_count: 0,
            discoverer: None,
        }
    }

    /// Row asserting that `name` exists without any pair producing it.
    pub fn admin_placeholder(name: &str, glyph: &str, created_at: &str) -> Self {
        Self {
            key: admin_key(name),
            input_a: ADMIN_SENTINEL.to_string(),
            input_b: name.to_string(),
            result_name: name.to_string(),
            result_glyph: glyph.to_string(),
            origin: Origin::AdminPlaceholder,
            created_at: created_at.to_string(),
            use_count: 0,
            discoverer: None,
        }
    }

    /// Seeded definition row for a starter element.
    pub fn starter(name: &str, glyph: &str, created_at: &str) -> Self {
        Self {
            key: starter_key(name),
            input_a: DEFINED_SENTINEL.to_string(),
            input_b: name.to_string(),
            result_name: name.to_string(),
            result_glyph: glyph.to_string(),
            origin: Origin::StarterPlaceholder,
            created_at: created_at.to_string(),
            use_count: 0,
            discoverer: None,
        }
    }

    pub fn with_discoverer(mut self, discoverer: Option<&str>) -> Self {
        self.discoverer = discoverer.map(str::to_string);
        self
    }

    /// Placeholder rows never answer a pair lookup.
    pub fn is_placeholder(&self) -> bool {
        is_sentinel(&self.input_a)
    }

    /// Recompute the key from the current inputs (after a rename).
    pub fn rekey(&mut self) {
        self.key = if self.input_a == ADMIN_SENTINEL {
            admin_key(&self.result_name)
        } else if self.input_a == DEFINED_SENTINEL {
            starter_key(&self.result_name)
        } else {
            normalize(&self.input_a, &self.input_b)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_roundtrip_names() {
        for origin in Origin::ALL {
            assert_eq!(Origin::parse(origin.as_str()), Some(origin));
        }
        assert_eq!(Origin::parse("bogus"), None);
    }

    #[test]
    fn test_origin_serde_matches_as_str() {
        let json = serde_json::to_string(&Origin::ModelGenerated).unwrap();
        assert_eq!(json, "\"model_generated\"");
    }

    #[test]
    fn test_new_derives_key() {
        let c = Combination::new("Water", "Fire", "Steam", "♨️", Origin::ModelGenerated, "t");
        assert_eq!(c.key, "fire+water");
        assert!(!c.is_placeholder());
    }

    #[test]
    fn test_placeholders() {
        let admin = Combination::admin_placeholder("Dragon", "🐉", "t");
        assert!(admin.is_placeholder());
        assert_eq!(admin.key, "_admin_dragon");
        let starter = Combination::starter("Earth", "🌍", "t");
        assert!(starter.is_placeholder());
        assert_eq!(starter.origin, Origin::StarterPlaceholder);
    }

    #[test]
    fn test_rekey_after_rename() {
        let mut c = Combination::new("Water", "Fire", "Steam", "♨️", Origin::ModelGenerated, "t");
        c.input_b = "Lava".to_string();
        c.rekey();
        assert_eq!(c.key, "lava+water");

        let mut admin = Combination::admin_placeholder("Steam", "♨️", "t");
        admin.input_b = "Vapor".to_string();
        admin.result_name = "Vapor".to_string();
        admin.rekey();
        assert_eq!(admin.key, "_admin_vapor");
    }
}
