//! Daily Alchemy combination rules.
//!
//! Turns an unordered pair of element names into a combination key, decides
//! whether a candidate result name is safe to keep, parses and classifies
//! model replies, and checks and annotates puzzle solution paths.
//!
//! Zero I/O: persistence lives in `alchemy-store`, model calls and caching
//! in `alchemy-engine`.

pub mod combination;
pub mod constants;
pub mod key;
pub mod path;
pub mod prompt;
pub mod reply;
pub mod safety;
pub mod time;
pub mod validate;

pub use combination::{Combination, Origin};
pub use constants::{
    ADMIN_SENTINEL, DEFAULT_CONTEXT_LIMIT, DEFAULT_PATH_COUNT, DEFINED_SENTINEL, MAX_NAME_LEN,
    STARTERS, is_starter, starter_glyph,
};
pub use key::{admin_key, fold_name, is_reserved_key, normalize, same_element, starter_key};
pub use path::{
    AnnotatedPath, AnnotatedStep, Annotation, Conflict, Path, PathError, PathSummary, Step,
    annotate_path, annotate_step, dedupe_paths, parse_paths, rank_paths,
};
pub use prompt::{combination_prompt, path_prompt};
pub use reply::{CallOutcome, Candidate, FailureKind, ReplyError, parse_candidate};
pub use safety::{
    ProfanityList, SAFE_SUBSTITUTES, contains_child_exploitation, contains_profanity,
    is_safe_substitute, safe_substitute,
};
pub use time::now_iso8601;
pub use validate::{ValidationError, validate_glyph, validate_name};
