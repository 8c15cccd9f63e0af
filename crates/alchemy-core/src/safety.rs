//! Result-name safety checks.
//!
//! Every candidate name is normalized the same way before matching:
//! lowercase, map common leet substitutions back to letters, then drop
//! everything that is not a letter. The child-safety check runs on every
//! generated name and cannot be disabled. The profanity list is
//! configurable and only applied when the caller asks for it.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

static NON_LETTERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}]+").unwrap());

/// Direct child-exploitation terms, matched against the compact form.
const CHILD_EXPLOITATION_TERMS: &[&str] = &[
    "childporn",
    "kiddieporn",
    "kiddyporn",
    "csam",
    "pedophil",
    "paedophil",
    "pedobear",
    "jailbait",
    "lolicon",
    "shotacon",
    "childmolest",
    "underagesex",
    "underageporn",
    "preteensex",
];

/// Terms referring to minors. Only dangerous in combination with
/// `EXPLOITATION_TERMS` in the same name.
const CHILD_TERMS: &[&str] = &[
    "child",
    "kid",
    "minor",
    "underage",
    "preteen",
    "toddler",
    "infant",
    "baby",
    "juvenile",
    "schoolgirl",
    "schoolboy",
    "loli",
    "shota",
];

const EXPLOITATION_TERMS: &[&str] = &[
    "porn", "sex", "nude", "naked", "erotic", "fetish", "molest", "rape", "abuse", "lewd",
    "explicit", "grope", "seduc",
];

/// Maintained default profanity and hate list.
const DEFAULT_PROFANITY: &[&str] = &[
    "fuck",
    "fucker",
    "motherfucker",
    "shit",
    "bullshit",
    "bitch",
    "cunt",
    "asshole",
    "bastard",
    "pussy",
    "slut",
    "whore",
    "wank",
    "twat",
    "bollocks",
    "prick",
    "nazi",
    "kkk",
    "hitler",
];

/// Neutral placeholders handed back instead of a refused name.
pub const SAFE_SUBSTITUTES: [(&str, &str); 4] = [
    ("Mystery", "❓"),
    ("Void", "🕳️"),
    ("Paradox", "🔄"),
    ("Null", "⬛"),
];

fn unleet(c: char) -> char {
    match c {
        '0' => 'o',
        '1' => 'i',
        '3' => 'e',
        '4' => 'a',
        '5' => 's',
        '7' => 't',
        '8' => 'b',
        '@' => 'a',
        '$' => 's',
        '!' => 'i',
        '+' => 't',
        other => other,
    }
}

/// Normalized views of a name: the compact letters-only string and its words.
struct Normalized {
    compact: String,
    words: Vec<String>,
}

fn normalize_for_matching(name: &str) -> Normalized {
    let mapped: String = name.to_lowercase().chars().map(unleet).collect();
    let compact = NON_LETTERS.replace_all(&mapped, "").into_owned();
    let words = NON_LETTERS
        .split(&mapped)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    Normalized { compact, words }
}

/// Does `name` reference child exploitation, directly or by co-occurrence?
pub fn contains_child_exploitation(name: &str) -> bool {
    let n = normalize_for_matching(name);
    if n.compact.is_empty() {
        return false;
    }
    if CHILD_EXPLOITATION_TERMS
        .iter()
        .any(|t| n.compact.contains(t))
    {
        return true;
    }
    let child = CHILD_TERMS.iter().any(|t| n.compact.contains(t));
    child && EXPLOITATION_TERMS.iter().any(|t| n.compact.contains(t))
}

/// A profanity/hate term list with whole-word and length-ratio matching.
#[derive(Debug, Clone)]
pub struct ProfanityList {
    terms: Vec<String>,
}

impl Default for ProfanityList {
    fn default() -> Self {
        Self {
            terms: DEFAULT_PROFANITY.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl ProfanityList {
    /// Default list extended with operator-supplied terms.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for term in extra {
            let compact = normalize_for_matching(term.as_ref()).compact;
            if !compact.is_empty() && !list.terms.contains(&compact) {
                list.terms.push(compact);
            }
        }
        list
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whole-word hits always count. A substring hit only counts when the
    /// matched term covers more than half of the compact name, which keeps
    /// names like "Scunthorpe" clean.
    pub fn contains(&self, name: &str) -> bool {
        let n = normalize_for_matching(name);
        if n.compact.is_empty() {
            return false;
        }
        for term in &self.terms {
            if n.words.iter().any(|w| w == term) {
                return true;
            }
            if n.compact.contains(term.as_str()) && term.len() * 2 > n.compact.len() {
                return true;
            }
        }
        false
    }
}

/// Default-list profanity check.
pub fn contains_profanity(name: &str) -> bool {
    ProfanityList::default().contains(name)
}

/// A uniformly chosen neutral `(name, glyph)` placeholder.
pub fn safe_substitute(rng: &mut impl Rng) -> (&'static str, &'static str) {
    SAFE_SUBSTITUTES[rng.random_range(0..SAFE_SUBSTITUTES.len())]
}

pub fn is_safe_substitute(name: &str) -> bool {
    SAFE_SUBSTITUTES
        .iter()
        .any(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
}
