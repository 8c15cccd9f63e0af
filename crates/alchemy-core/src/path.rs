//! Solution paths: ordered pairwise steps from the starters to a target.
//!
//! A path is rooted when each input of each step is a starter or the result
//! of an earlier step. Rootedness rules out cycles inside a single path.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::combination::Combination;
use crate::constants::{MAX_PATH_STEPS, is_starter};
use crate::key::{fold_name, normalize, same_element};
use crate::reply::{ReplyError, extract_json_object};
use crate::validate::{ValidationError, validate_glyph, validate_name};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "a")]
    pub input_a: String,
    #[serde(rename = "b")]
    pub input_b: String,
    #[serde(alias = "result")]
    pub result_name: String,
    #[serde(alias = "glyph", alias = "emoji")]
    pub result_glyph: String,
}

impl Step {
    pub fn new(a: &str, b: &str, result: &str, glyph: &str) -> Self {
        Self {
            input_a: a.to_string(),
            input_b: b.to_string(),
            result_name: result.to_string(),
            result_glyph: glyph.to_string(),
        }
    }

    pub fn key(&self) -> String {
        normalize(&self.input_a, &self.input_b)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    TooLong(usize),
    InvalidName { step: usize, error: ValidationError },
    InvalidGlyph { step: usize, error: ValidationError },
    StarterResult { step: usize, name: String },
    Unrooted { step: usize, input: String },
    Contradiction { step: usize, key: String },
    WrongTarget { found: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "path has no steps"),
            PathError::TooLong(n) => write!(f, "path has {n} steps, limit is {MAX_PATH_STEPS}"),
            PathError::InvalidName { step, error } => write!(f, "step {step}: {error}"),
            PathError::InvalidGlyph { step, error } => write!(f, "step {step}: {error}"),
            PathError::StarterResult { step, name } => {
                write!(f, "step {step}: starter '{name}' cannot be a result")
            }
            PathError::Unrooted { step, input } => {
                write!(f, "step {step}: '{input}' is neither a starter nor an earlier result")
            }
            PathError::Contradiction { step, key } => {
                write!(f, "step {step}: pair '{key}' already produced a different result")
            }
            PathError::WrongTarget { found } => write!(f, "path ends at '{found}'"),
        }
    }
}

impl std::error::Error for PathError {}

impl Path {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_rooted(&self) -> bool {
        let mut available: HashSet<String> = HashSet::new();
        for step in &self.steps {
            for input in [&step.input_a, &step.input_b] {
                if !is_starter(input) && !available.contains(&fold_name(input)) {
                    return false;
                }
            }
            available.insert(fold_name(&step.result_name));
        }
        true
    }

    /// Check every structural rule and return the path with trimmed names
    /// and glyphs. `target`, when given, must be the last step's result.
    pub fn validated(&self, target: Option<&str>) -> Result<Path, PathError> {
        if self.steps.is_empty() {
            return Err(PathError::Empty);
        }
        if self.steps.len() > MAX_PATH_STEPS {
            return Err(PathError::TooLong(self.steps.len()));
        }

        let mut available: HashSet<String> = HashSet::new();
        let mut results_by_key: HashMap<String, String> = HashMap::new();
        let mut cleaned = Vec::with_capacity(self.steps.len());

        for (i, step) in self.steps.iter().enumerate() {
            let name = |s: &str| {
                validate_name(s).map_err(|error| PathError::InvalidName { step: i, error })
            };
            let a = name(&step.input_a)?;
            let b = name(&step.input_b)?;
            let result = name(&step.result_name)?;
            let glyph = validate_glyph(&step.result_glyph)
                .map_err(|error| PathError::InvalidGlyph { step: i, error })?;

            if is_starter(&result) {
                return Err(PathError::StarterResult { step: i, name: result });
            }
            for input in [&a, &b] {
                if !is_starter(input) && !available.contains(&fold_name(input)) {
                    return Err(PathError::Unrooted {
                        step: i,
                        input: input.clone(),
                    });
                }
            }

            let key = normalize(&a, &b);
            let folded = fold_name(&result);
            if let Some(previous) = results_by_key.get(&key)
                && *previous != folded
            {
                return Err(PathError::Contradiction { step: i, key });
            }
            results_by_key.insert(key, folded.clone());
            available.insert(folded);
            cleaned.push(Step::new(&a, &b, &result, &glyph));
        }

        if let Some(target) = target
            && let Some(last) = cleaned.last()
            && !same_element(&last.result_name, target)
        {
            return Err(PathError::WrongTarget {
                found: last.result_name.clone(),
            });
        }
        Ok(Path::new(cleaned))
    }

    /// Identity used to drop duplicate paths from one generation batch.
    fn signature(&self) -> Vec<(String, String)> {
        self.steps
            .iter()
            .map(|s| (s.key(), fold_name(&s.result_name)))
            .collect()
    }
}

/// Keep the first occurrence of each distinct path.
pub fn dedupe_paths(paths: Vec<Path>) -> Vec<Path> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.signature()))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePath {
    Steps { steps: Vec<Step> },
    Bare(Vec<Step>),
}

#[derive(Deserialize)]
struct WirePaths {
    paths: Vec<WirePath>,
}

/// Parse a `{"paths": [...]}` reply. Structural checks happen later.
pub fn parse_paths(text: &str) -> Result<Vec<Path>, ReplyError> {
    let json = extract_json_object(text).ok_or(ReplyError::NoJson)?;
    let wire: WirePaths =
        serde_json::from_str(json).map_err(|e| ReplyError::InvalidJson(e.to_string()))?;
    Ok(wire
        .paths
        .into_iter()
        .map(|p| match p {
            WirePath::Steps { steps } | WirePath::Bare(steps) => Path::new(steps),
        })
        .collect())
}

/// How a step relates to the rows already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Annotation {
    New,
    MatchingExisting,
    Conflicting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub existing_result: String,
    pub existing_glyph: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedStep {
    #[serde(flatten)]
    pub step: Step,
    pub annotation: Annotation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
    /// Canonical glyph when the step's glyph disagrees with it. Advisory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji_mismatch: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSummary {
    pub new: usize,
    pub existing: usize,
    pub conflicts: usize,
    pub emoji_mismatches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedPath {
    pub steps: Vec<AnnotatedStep>,
    pub summary: PathSummary,
}

impl AnnotatedPath {
    pub fn path(&self) -> Path {
        Path::new(self.steps.iter().map(|s| s.step.clone()).collect())
    }
}

/// Annotate one step against the row stored under its key (if any) and the
/// canonical glyph of its result (if any).
pub fn annotate_step(
    step: &Step,
    existing: Option<&Combination>,
    canonical_glyph: Option<&str>,
) -> AnnotatedStep {
    let (annotation, conflict) = match existing {
        None => (Annotation::New, None),
        Some(row) if same_element(&row.result_name, &step.result_name) => {
            (Annotation::MatchingExisting, None)
        }
        Some(row) => (
            Annotation::Conflicting,
            Some(Conflict {
                existing_result: row.result_name.clone(),
                existing_glyph: row.result_glyph.clone(),
            }),
        ),
    };
    let emoji_mismatch = canonical_glyph
        .filter(|g| *g != step.result_glyph)
        .map(str::to_string);
    AnnotatedStep {
        step: step.clone(),
        annotation,
        conflict,
        emoji_mismatch,
    }
}

/// Annotate a whole path. `existing` is keyed by combination key and
/// `canonical` by folded result name.
pub fn annotate_path(
    path: &Path,
    existing: &HashMap<String, Combination>,
    canonical: &HashMap<String, String>,
) -> AnnotatedPath {
    let mut summary = PathSummary::default();
    let steps: Vec<AnnotatedStep> = path
        .steps
        .iter()
        .map(|step| {
            let annotated = annotate_step(
                step,
                existing.get(&step.key()),
                canonical
                    .get(&fold_name(&step.result_name))
                    .map(String::as_str),
            );
            match annotated.annotation {
                Annotation::New => summary.new += 1,
                Annotation::MatchingExisting => summary.existing += 1,
                Annotation::Conflicting => summary.conflicts += 1,
            }
            if annotated.emoji_mismatch.is_some() {
                summary.emoji_mismatches += 1;
            }
            annotated
        })
        .collect();
    AnnotatedPath { steps, summary }
}

/// Fewest conflicts first, then fewest steps; ties keep generation order.
pub fn rank_paths(mut paths: Vec<AnnotatedPath>) -> Vec<AnnotatedPath> {
    paths.sort_by_key(|p| (p.summary.conflicts, p.steps.len()));
    paths
}
