use std::fs;
use std::path::Path;

use alchemy_core::{
    Combination, Origin, contains_child_exploitation, validate_glyph, validate_name,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::store::Store;

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportFile {
    pub version: u32,
    pub combinations: Vec<Combination>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    /// Key already present (existing rows are never overwritten).
    pub skipped: usize,
    /// Invalid or blocked names, bad glyphs, or protected results.
    pub rejected: usize,
}

/// A name accepted from a file: valid and not child-exploitation content.
fn accepted_name(name: &str) -> Option<String> {
    validate_name(name)
        .ok()
        .filter(|n| !contains_child_exploitation(n))
}

/// Re-check an imported row the way fresh inserts are checked. Keys are
/// recomputed so a hand-edited file cannot smuggle in a mismatched key.
fn sanitize(mut row: Combination) -> Option<Combination> {
    if row.origin == Origin::StarterPlaceholder {
        return None;
    }
    row.result_name = accepted_name(&row.result_name)?;
    row.result_glyph = validate_glyph(&row.result_glyph).ok()?;
    if row.origin == Origin::AdminPlaceholder {
        let placeholder =
            Combination::admin_placeholder(&row.result_name, &row.result_glyph, &row.created_at);
        return Some(Combination {
            use_count: row.use_count,
            ..placeholder
        });
    }
    row.input_a = accepted_name(&row.input_a)?;
    row.input_b = accepted_name(&row.input_b)?;
    row.rekey();
    Some(row)
}

impl Store {
    pub fn import_json_str(&self, json: &str) -> Result<ImportReport> {
        let file: ExportFile = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidData(format!("invalid JSON: {e}")))?;
        if file.version > EXPORT_VERSION {
            return Err(StoreError::InvalidData(format!(
                "export version {} is newer than supported {EXPORT_VERSION}",
                file.version
            )));
        }

        let mut report = ImportReport::default();
        for row in file.combinations {
            let starter_row = row.origin == Origin::StarterPlaceholder;
            let Some(row) = sanitize(row) else {
                if starter_row {
                    report.skipped += 1;
                } else {
                    report.rejected += 1;
                }
                continue;
            };
            match self.insert_if_absent(&row) {
                Ok(outcome) if outcome.was_inserted() => report.inserted += 1,
                Ok(_) => report.skipped += 1,
                Err(StoreError::Protected(_)) => report.rejected += 1,
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            inserted = report.inserted,
            skipped = report.skipped,
            rejected = report.rejected,
            "imported combinations"
        );
        Ok(report)
    }

    pub fn import_json_file(&self, path: &Path) -> Result<ImportReport> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_json_str(&json)
    }

    pub fn export_json_string(&self) -> Result<String> {
        let file = ExportFile {
            version: EXPORT_VERSION,
            combinations: self.all_combinations()?,
        };
        serde_json::to_string_pretty(&file)
            .map_err(|e| StoreError::Corrupt(format!("JSON export failed: {e}")))
    }

    pub fn export_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json_string()?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }
}
