//! Element-level reads: detail, browsing and aggregate stats.

use std::collections::BTreeMap;

use alchemy_core::{fold_name, is_starter, starter_glyph};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::error::Result;
use crate::store::{PAIR_ROWS, Store, query_rows};

pub const MAX_PAGE_SIZE: usize = 200;
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipe {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub with: String,
    pub result_name: String,
    pub result_glyph: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementDetail {
    pub name: String,
    pub glyph: Option<String>,
    pub is_starter: bool,
    pub ways_to_create: Vec<Recipe>,
    pub used_in: Vec<Usage>,
    pub total_uses: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSummary {
    pub name: String,
    pub glyph: Option<String>,
    pub is_starter: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ElementQuery {
    /// Only names starting with this letter (case-insensitive).
    pub letter: Option<String>,
    /// Only names containing this text (case-insensitive).
    pub search: Option<String>,
    /// 1-based.
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementPage {
    pub elements: Vec<ElementSummary>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub combinations: u64,
    pub elements: u64,
    pub total_uses: u64,
    pub by_origin: BTreeMap<String, u64>,
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(fold_name).filter(|t| !t.is_empty())
}

impl Store {
    /// Everything known about one element, or `None` if it appears nowhere.
    pub fn element_detail(&self, name: &str) -> Result<Option<ElementDetail>> {
        let norm = fold_name(name);
        let display: Option<String> = if is_starter(name) {
            alchemy_core::STARTERS
                .iter()
                .find(|(starter, _)| fold_name(starter) == norm)
                .map(|(starter, _)| starter.to_string())
        } else {
            self.conn()
                .query_row(
                    "SELECT result_name FROM combinations WHERE result_norm = ?1
                     ORDER BY rowid LIMIT 1",
                    [&norm],
                    |row| row.get(0),
                )
                .optional()?
        };

        let sql = format!(
            "SELECT key, input_a, input_b, result_name, result_glyph, origin, created_at,
                    use_count, discoverer
             FROM combinations WHERE {PAIR_ROWS} AND result_norm = ?1 ORDER BY rowid"
        );
        let creating = query_rows(self.conn(), &sql, [&norm])?;
        let sql = format!(
            "SELECT key, input_a, input_b, result_name, result_glyph, origin, created_at,
                    use_count, discoverer
             FROM combinations WHERE {PAIR_ROWS} AND (a_norm = ?1 OR b_norm = ?1)
             ORDER BY result_norm, rowid"
        );
        let using = query_rows(self.conn(), &sql, [&norm])?;

        let display = display.or_else(|| {
            using.first().map(|row| {
                if fold_name(&row.input_a) == norm {
                    row.input_a.clone()
                } else {
                    row.input_b.clone()
                }
            })
        });
        let Some(display) = display else {
            return Ok(None);
        };

        let glyph = match starter_glyph(&display) {
            Some(glyph) => Some(glyph.to_string()),
            None => self.canonical_glyph(&display)?,
        };
        let total_uses = creating.iter().map(|row| row.use_count).sum();
        let ways_to_create = creating
            .into_iter()
            .map(|row| Recipe {
                a: row.input_a,
                b: row.input_b,
            })
            .collect();
        let used_in = using
            .into_iter()
            .map(|row| {
                let with = if fold_name(&row.input_a) == norm {
                    row.input_b
                } else {
                    row.input_a
                };
                Usage {
                    with,
                    result_name: row.result_name,
                    result_glyph: row.result_glyph,
                }
            })
            .collect();

        Ok(Some(ElementDetail {
            is_starter: is_starter(&display),
            name: display,
            glyph,
            ways_to_create,
            used_in,
            total_uses,
        }))
    }

    /// One page of known elements, alphabetical by folded name.
    pub fn list_elements(&self, query: &ElementQuery) -> Result<ElementPage> {
        let limit = if query.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            query.limit.min(MAX_PAGE_SIZE)
        };
        let page = query.page.max(1);
        let offset = (page - 1) * limit;
        let letter = non_empty(query.letter.as_deref())
            .and_then(|l| l.chars().next())
            .map(|c| c.to_string());
        let search = non_empty(query.search.as_deref());

        const FILTER: &str = "(?1 IS NULL OR substr(c.result_norm, 1, length(?1)) = ?1)
              AND (?2 IS NULL OR instr(c.result_norm, ?2) > 0)";

        let total: i64 = self.conn().query_row(
            &format!("SELECT COUNT(DISTINCT c.result_norm) FROM combinations c WHERE {FILTER}"),
            params![letter, search],
            |row| row.get(0),
        )?;

        // With a lone MIN() aggregate SQLite takes bare columns from the
        // minimum row, so the display name is the first writer's casing.
        let mut stmt = self.conn().prepare(&format!(
            "SELECT c.result_name, g.glyph, MIN(c.rowid)
             FROM combinations c
             LEFT JOIN canonical_glyphs g ON g.name_norm = c.result_norm
             WHERE {FILTER}
             GROUP BY c.result_norm
             ORDER BY c.result_norm
             LIMIT ?3 OFFSET ?4"
        ))?;
        let elements = stmt
            .query_map(
                params![letter, search, limit as i64, offset as i64],
                |row| {
                    let name: String = row.get(0)?;
                    Ok(ElementSummary {
                        is_starter: is_starter(&name),
                        glyph: row.get(1)?,
                        name,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = total.max(0) as usize;
        Ok(ElementPage {
            has_more: offset + elements.len() < total,
            elements,
            total,
            page,
            limit,
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let (combinations, elements, total_uses): (i64, i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COUNT(DISTINCT result_norm), COALESCE(SUM(use_count), 0)
             FROM combinations",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let mut stmt = self
            .conn()
            .prepare("SELECT origin, COUNT(*) FROM combinations GROUP BY origin")?;
        let by_origin = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        Ok(StoreStats {
            combinations: combinations.max(0) as u64,
            elements: elements.max(0) as u64,
            total_uses: total_uses.max(0) as u64,
            by_origin,
        })
    }
}
