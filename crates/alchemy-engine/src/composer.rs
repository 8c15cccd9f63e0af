//! Path Composer: generate, annotate and commit solution paths.

use std::collections::BTreeSet;

use alchemy_core::{
    AnnotatedPath, Annotation, Combination, FailureKind, Origin, Path, annotate_path, dedupe_paths,
    fold_name, is_starter, parse_paths, path_prompt, rank_paths, same_element, validate_glyph,
    validate_name,
};
use alchemy_store::Store;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPaths {
    pub paths: Vec<AnnotatedPath>,
    /// Stored combinations sent to the model as context.
    pub existing_combinations_used: usize,
    /// Proposed paths discarded as unrooted, unsafe, duplicate or off-target.
    pub discarded: usize,
}

/// A step that was not written because its pair already means something else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConflict {
    pub a: String,
    pub b: String,
    pub proposed: String,
    pub existing: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub created: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub errors: usize,
    pub conflict_list: Vec<StepConflict>,
    /// An admin placeholder was written for the target.
    pub target_created: bool,
}

/// Inputs of a validated path are starters or earlier results, so checking
/// results covers every name the path can write.
fn path_is_safe(path: &Path, engine: &Engine) -> bool {
    path.steps.iter().all(|step| !engine.refuses(&step.result_name))
}

/// Annotate `paths` against the current store contents.
fn annotate_all(store: &Store, paths: &[Path]) -> Result<Vec<AnnotatedPath>> {
    let keys: Vec<String> = paths
        .iter()
        .flat_map(|p| p.steps.iter().map(|s| s.key()))
        .collect();
    let results: Vec<String> = paths
        .iter()
        .flat_map(|p| p.steps.iter().map(|s| s.result_name.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let existing = store.bulk_get(&keys)?;
    let canonical = store.canonical_glyphs(&results)?;
    Ok(paths
        .iter()
        .map(|p| annotate_path(p, &existing, &canonical))
        .collect())
}

impl Engine {
    /// Ask the model for up to `count` rooted paths ending at `target`,
    /// annotated and ranked (fewest conflicts, then shortest).
    pub async fn generate_paths(&self, target: &str, count: usize) -> Result<GeneratedPaths> {
        let target = validate_name(target)?;
        if is_starter(&target) {
            return Err(EngineError::InvalidInput(format!(
                "'{target}' is a starter element"
            )));
        }
        let count = count.clamp(1, 10);

        let context = {
            let store = self.store.lock().await;
            store.top_combinations(self.config.model.context_limit)?
        };
        let prompt = path_prompt(&target, count, &context);

        let proposed = self.request_paths(&prompt, &target).await?;
        let total = proposed.len();
        let valid: Vec<Path> = proposed
            .into_iter()
            .filter_map(|p| match p.validated(Some(&target)) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::debug!(element = %target, "discarding path: {e}");
                    None
                }
            })
            .filter(|p| path_is_safe(p, self))
            .collect();
        let valid = dedupe_paths(valid);
        if valid.is_empty() {
            tracing::warn!(element = %target, total, "model produced no usable path");
            return Err(EngineError::Model(FailureKind::ValidationFailed));
        }

        let annotated = {
            let store = self.store.lock().await;
            annotate_all(&store, &valid)?
        };
        let mut paths = rank_paths(annotated);
        let discarded = total - valid.len();
        paths.truncate(count);
        tracing::info!(element = %target, offered = paths.len(), discarded, "generated paths");

        Ok(GeneratedPaths {
            paths,
            existing_combinations_used: context.len(),
            discarded,
        })
    }

    async fn request_paths(&self, prompt: &str, target: &str) -> Result<Vec<Path>> {
        let mut malformed = 0;
        loop {
            let text = self
                .call_model(prompt, self.config.model.path_max_tokens)
                .await
                .map_err(EngineError::Model)?;
            match parse_paths(&text) {
                Ok(paths) if !paths.is_empty() => return Ok(paths),
                Ok(_) => self.note_malformed(target, &mut malformed, "no paths in reply")?,
                Err(e) => self.note_malformed(target, &mut malformed, &e.to_string())?,
            }
        }
    }

    fn note_malformed(&self, target: &str, count: &mut u32, reason: &str) -> Result<()> {
        *count += 1;
        tracing::warn!(element = target, attempt = *count, "unusable path reply: {reason}");
        if *count > 1 {
            return Err(EngineError::Model(FailureKind::ValidationFailed));
        }
        Ok(())
    }

    /// Annotate each path's steps as new, matching or conflicting.
    pub async fn validate_paths(&self, paths: &[Path]) -> Result<Vec<AnnotatedPath>> {
        let store = self.store.lock().await;
        annotate_all(&store, paths)
    }

    /// Write the new steps of `path`, never touching conflicting pairs, and
    /// make sure the target element exists. Committing twice is a no-op.
    pub async fn commit_path(
        &self,
        path: &Path,
        target_name: &str,
        target_glyph: &str,
    ) -> Result<CommitReport> {
        let path = path.validated(None)?;
        let target_name = validate_name(target_name)?;
        let target_glyph = validate_glyph(target_glyph)?;
        if !path_is_safe(&path, self) || self.refuses(&target_name) {
            tracing::warn!(steps = path.len(), "refused path commit with a blocked name");
            return Err(EngineError::InvalidInput(
                "path names an element that is not allowed".to_string(),
            ));
        }

        let store = self.store.lock().await;
        let now = self.clock.now_iso8601();
        let annotated = annotate_all(&store, std::slice::from_ref(&path))?;
        let mut report = CommitReport::default();

        for step in annotated.into_iter().flat_map(|p| p.steps) {
            match step.annotation {
                Annotation::MatchingExisting => report.skipped += 1,
                Annotation::Conflicting => {
                    report.conflicts += 1;
                    report.conflict_list.push(StepConflict {
                        a: step.step.input_a,
                        b: step.step.input_b,
                        proposed: step.step.result_name,
                        existing: step
                            .conflict
                            .map(|c| c.existing_result)
                            .unwrap_or_default(),
                    });
                }
                Annotation::New => {
                    let s = &step.step;
                    let row = Combination::new(
                        &s.input_a,
                        &s.input_b,
                        &s.result_name,
                        &s.result_glyph,
                        Origin::HumanAuthored,
                        &now,
                    );
                    match store.insert_if_absent(&row) {
                        Ok(outcome) if outcome.was_inserted() => report.created += 1,
                        Ok(outcome) if same_element(&outcome.row().result_name, &s.result_name) => {
                            report.skipped += 1
                        }
                        Ok(outcome) => {
                            report.conflicts += 1;
                            report.conflict_list.push(StepConflict {
                                a: s.input_a.clone(),
                                b: s.input_b.clone(),
                                proposed: s.result_name.clone(),
                                existing: outcome.into_row().result_name,
                            });
                        }
                        Err(e) => {
                            report.errors += 1;
                            tracing::warn!(key = %row.key, "path step not written: {e}");
                        }
                    }
                }
            }
        }

        report.target_created = match store.ensure_element(&target_name, &target_glyph, &now) {
            Ok(created) => created,
            Err(e) => {
                report.errors += 1;
                tracing::warn!(element = %fold_name(&target_name), "target placeholder not written: {e}");
                false
            }
        };
        tracing::info!(
            element = %target_name,
            created = report.created,
            skipped = report.skipped,
            conflicts = report.conflicts,
            errors = report.errors,
            "committed path"
        );
        Ok(report)
    }
}
