use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use alchemy_core::{Combination, Origin, fold_name, is_starter, same_element};
use rusqlite::{Connection, OptionalExtension, Params, params, params_from_iter};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::schema;

const COLUMNS: &str =
    "key, input_a, input_b, result_name, result_glyph, origin, created_at, use_count, discoverer";

/// Rows that answer pair lookups (placeholders excluded).
pub(crate) const PAIR_ROWS: &str = "input_a NOT IN ('_ADMIN', '_DEFINED')";

/// SQLite parameter limit is 999 on older builds; stay well under it.
const BULK_CHUNK: usize = 500;

pub struct Store {
    conn: Connection,
}

/// What `insert_if_absent` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Combination),
    /// A row with the same key was already there; it is returned untouched.
    Existing(Combination),
}

impl InsertOutcome {
    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }

    pub fn row(&self) -> &Combination {
        match self {
            InsertOutcome::Inserted(row) | InsertOutcome::Existing(row) => row,
        }
    }

    pub fn into_row(self) -> Combination {
        match self {
            InsertOutcome::Inserted(row) | InsertOutcome::Existing(row) => row,
        }
    }
}

/// Result of an element rename, reglyph or delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElementChange {
    pub rows_updated: usize,
    pub rows_merged: usize,
    pub rows_deleted: usize,
    /// Every key whose cached row is stale after the change (old and new).
    #[serde(skip)]
    pub affected_keys: Vec<String>,
}

struct RawRow {
    key: String,
    input_a: String,
    input_b: String,
    result_name: String,
    result_glyph: String,
    origin: String,
    created_at: String,
    use_count: i64,
    discoverer: Option<String>,
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        key: row.get(0)?,
        input_a: row.get(1)?,
        input_b: row.get(2)?,
        result_name: row.get(3)?,
        result_glyph: row.get(4)?,
        origin: row.get(5)?,
        created_at: row.get(6)?,
        use_count: row.get(7)?,
        discoverer: row.get(8)?,
    })
}

impl RawRow {
    fn into_combination(self) -> Result<Combination> {
        let origin = Origin::parse(&self.origin).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown origin '{}' on {}", self.origin, self.key))
        })?;
        Ok(Combination {
            key: self.key,
            input_a: self.input_a,
            input_b: self.input_b,
            result_name: self.result_name,
            result_glyph: self.result_glyph,
            origin,
            created_at: self.created_at,
            use_count: self.use_count.max(0) as u64,
            discoverer: self.discoverer,
        })
    }
}

pub(crate) fn query_rows<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Combination>> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map(params, read_raw)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raws.into_iter().map(RawRow::into_combination).collect()
}

fn get_by_key_on(conn: &Connection, key: &str) -> Result<Option<Combination>> {
    let sql = format!("SELECT {COLUMNS} FROM combinations WHERE key = ?1");
    let raw = conn.query_row(&sql, [key], read_raw).optional()?;
    raw.map(RawRow::into_combination).transpose()
}

fn insert_row_on(conn: &Connection, row: &Combination) -> Result<usize> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO combinations
            (key, input_a, input_b, a_norm, b_norm, result_name, result_norm,
             result_glyph, origin, created_at, use_count, discoverer)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            row.key,
            row.input_a,
            row.input_b,
            fold_name(&row.input_a),
            fold_name(&row.input_b),
            row.result_name,
            fold_name(&row.result_name),
            row.result_glyph,
            row.origin.as_str(),
            row.created_at,
            row.use_count as i64,
            row.discoverer,
        ],
    )?;
    Ok(inserted)
}

fn canonical_glyph_on(conn: &Connection, name_norm: &str) -> Result<Option<String>> {
    let glyph = conn
        .query_row(
            "SELECT glyph FROM canonical_glyphs WHERE name_norm = ?1",
            [name_norm],
            |row| row.get(0),
        )
        .optional()?;
    Ok(glyph)
}

fn keys_where(conn: &Connection, condition: &str, name_norm: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT key FROM combinations WHERE {condition} ORDER BY key"
    ))?;
    let keys = stmt
        .query_map([name_norm], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(keys)
}

const MENTIONS: &str = "a_norm = ?1 OR b_norm = ?1 OR result_norm = ?1";

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Lookups ---

    pub fn get_by_key(&self, key: &str) -> Result<Option<Combination>> {
        get_by_key_on(&self.conn, key)
    }

    /// Row answering the pair `{a, b}`. Placeholder rows never match.
    pub fn get_pair(&self, key: &str) -> Result<Option<Combination>> {
        Ok(self.get_by_key(key)?.filter(|row| !row.is_placeholder()))
    }

    /// Fetch many keys at once. Missing keys are omitted from the map.
    pub fn bulk_get(&self, keys: &[String]) -> Result<HashMap<String, Combination>> {
        let unique: BTreeSet<&String> = keys.iter().collect();
        let unique: Vec<&String> = unique.into_iter().collect();
        let mut found = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(BULK_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT {COLUMNS} FROM combinations WHERE key IN ({placeholders})");
            for row in query_rows(&self.conn, &sql, params_from_iter(chunk.iter()))? {
                found.insert(row.key.clone(), row);
            }
        }
        Ok(found)
    }

    /// The glyph every row with this result name uses.
    pub fn canonical_glyph(&self, name: &str) -> Result<Option<String>> {
        canonical_glyph_on(&self.conn, &fold_name(name))
    }

    /// Canonical glyphs keyed by folded name. Unknown names are omitted.
    pub fn canonical_glyphs(&self, names: &[String]) -> Result<HashMap<String, String>> {
        let folded: BTreeSet<String> = names.iter().map(|n| fold_name(n)).collect();
        let folded: Vec<String> = folded.into_iter().collect();
        let mut found = HashMap::with_capacity(folded.len());
        for chunk in folded.chunks(BULK_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT name_norm, glyph FROM canonical_glyphs WHERE name_norm IN ({placeholders})"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            found.extend(rows);
        }
        Ok(found)
    }

    /// Does any row produce `name`?
    pub fn element_exists(&self, name: &str) -> Result<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM combinations WHERE result_norm = ?1 LIMIT 1",
                [fold_name(name)],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    /// Most-used pair rows, for prompt context.
    pub fn top_combinations(&self, limit: usize) -> Result<Vec<Combination>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM combinations WHERE {PAIR_ROWS}
             ORDER BY use_count DESC, created_at ASC, key ASC LIMIT ?1"
        );
        query_rows(&self.conn, &sql, [limit as i64])
    }

    /// Pair rows sharing an input with `{a, b}`, most used first.
    pub fn nearby_combinations(&self, a: &str, b: &str, limit: usize) -> Result<Vec<Combination>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM combinations
             WHERE {PAIR_ROWS} AND (a_norm IN (?1, ?2) OR b_norm IN (?1, ?2))
             ORDER BY use_count DESC, created_at ASC, key ASC LIMIT ?3"
        );
        query_rows(
            &self.conn,
            &sql,
            params![fold_name(a), fold_name(b), limit as i64],
        )
    }

    pub fn all_combinations(&self) -> Result<Vec<Combination>> {
        let sql = format!("SELECT {COLUMNS} FROM combinations ORDER BY created_at, rowid");
        query_rows(&self.conn, &sql, [])
    }

    /// Keys of every row mentioning `name` in any position.
    pub fn affected_keys(&self, name: &str) -> Result<Vec<String>> {
        keys_where(&self.conn, MENTIONS, &fold_name(name))
    }

    // --- Writes ---

    /// Insert `row` unless its key is taken. Never overwrites.
    ///
    /// The stored glyph is the canonical glyph for the result name when one
    /// exists; otherwise the row's glyph becomes canonical.
    pub fn insert_if_absent(&self, row: &Combination) -> Result<InsertOutcome> {
        if row.origin != Origin::StarterPlaceholder && is_starter(&row.result_name) {
            return Err(StoreError::Protected(row.result_name.clone()));
        }

        let tx = self.conn.unchecked_transaction()?;
        if let Some(existing) = get_by_key_on(&tx, &row.key)? {
            return Ok(InsertOutcome::Existing(existing));
        }

        let norm = fold_name(&row.result_name);
        tx.execute(
            "INSERT OR IGNORE INTO canonical_glyphs (name_norm, glyph) VALUES (?1, ?2)",
            params![norm, row.result_glyph],
        )?;
        let mut stored = row.clone();
        if let Some(glyph) = canonical_glyph_on(&tx, &norm)? {
            stored.result_glyph = glyph;
        }

        if insert_row_on(&tx, &stored)? == 0 {
            // Lost a race between the read and the insert: re-read and adopt.
            let existing = get_by_key_on(&tx, &row.key)?.ok_or_else(|| {
                StoreError::Corrupt(format!("row {} absent after insert race", row.key))
            })?;
            return Ok(InsertOutcome::Existing(existing));
        }
        tx.commit()?;
        Ok(InsertOutcome::Inserted(stored))
    }

    /// Best-effort lookup counter.
    pub fn bump_use_count(&self, key: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE combinations SET use_count = use_count + 1 WHERE key = ?1",
            [key],
        )?;
        Ok(rows > 0)
    }

    /// Make sure some row produces `name`, writing an admin placeholder if
    /// not. Returns whether a placeholder was written.
    pub fn ensure_element(&self, name: &str, glyph: &str, created_at: &str) -> Result<bool> {
        if self.element_exists(name)? {
            return Ok(false);
        }
        let placeholder = Combination::admin_placeholder(name.trim(), glyph, created_at);
        Ok(self.insert_if_absent(&placeholder)?.was_inserted())
    }

    /// Rename an element everywhere it appears and recompute affected keys.
    ///
    /// When a rewritten key lands on an existing row the two are merged if
    /// their results agree; if they differ the whole rename is rejected.
    pub fn rename_element(
        &self,
        old: &str,
        new: &str,
        new_glyph: Option<&str>,
    ) -> Result<ElementChange> {
        let old = old.trim();
        let new = new.trim();
        let old_norm = fold_name(old);
        let new_norm = fold_name(new);
        if new_norm.is_empty() {
            return Err(StoreError::InvalidData("new name is empty".to_string()));
        }
        if is_starter(old) {
            return Err(StoreError::Protected(old.to_string()));
        }
        if is_starter(new) {
            return Err(StoreError::Protected(new.to_string()));
        }

        let tx = self.conn.unchecked_transaction()?;
        let sql = format!("SELECT {COLUMNS} FROM combinations WHERE {MENTIONS} ORDER BY rowid");
        let rows = query_rows(&tx, &sql, [&old_norm])?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(old.to_string()));
        }

        let renaming = new_norm != old_norm;
        let has_result_rows = rows.iter().any(|r| fold_name(&r.result_name) == old_norm);
        let target_glyph = match new_glyph {
            Some(glyph) => glyph.to_string(),
            None => {
                let merged_into = if renaming {
                    canonical_glyph_on(&tx, &new_norm)?
                } else {
                    None
                };
                match merged_into {
                    Some(glyph) => glyph,
                    None => canonical_glyph_on(&tx, &old_norm)?
                        .or_else(|| {
                            rows.iter()
                                .find(|r| fold_name(&r.result_name) == old_norm)
                                .map(|r| r.result_glyph.clone())
                        })
                        .unwrap_or_default(),
                }
            }
        };

        let mut affected: BTreeSet<String> = rows.iter().map(|r| r.key.clone()).collect();
        for row in &rows {
            tx.execute("DELETE FROM combinations WHERE key = ?1", [&row.key])?;
        }

        let mut change = ElementChange::default();
        let mut pending: Vec<Combination> = Vec::with_capacity(rows.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for mut row in rows {
            if fold_name(&row.input_a) == old_norm {
                row.input_a = new.to_string();
            }
            if fold_name(&row.input_b) == old_norm {
                row.input_b = new.to_string();
            }
            if fold_name(&row.result_name) == old_norm {
                row.result_name = new.to_string();
                row.result_glyph = target_glyph.clone();
            }
            row.rekey();
            affected.insert(row.key.clone());

            if let Some(&i) = index.get(&row.key) {
                let kept = &mut pending[i];
                if !same_element(&kept.result_name, &row.result_name) {
                    return Err(StoreError::Conflict(format!(
                        "renaming '{old}' to '{new}' folds '{}' onto '{}'",
                        row.result_name, kept.result_name
                    )));
                }
                kept.use_count += row.use_count;
                change.rows_merged += 1;
                continue;
            }
            if let Some(existing) = get_by_key_on(&tx, &row.key)? {
                if !same_element(&existing.result_name, &row.result_name) {
                    return Err(StoreError::Conflict(format!(
                        "renaming '{old}' to '{new}' makes {} produce both '{}' and '{}'",
                        row.key, existing.result_name, row.result_name
                    )));
                }
                tx.execute(
                    "UPDATE combinations SET use_count = use_count + ?1 WHERE key = ?2",
                    params![row.use_count as i64, row.key],
                )?;
                change.rows_merged += 1;
                continue;
            }
            index.insert(row.key.clone(), pending.len());
            pending.push(row);
        }
        for row in &pending {
            insert_row_on(&tx, row)?;
        }
        change.rows_updated = pending.len();

        if renaming {
            tx.execute("DELETE FROM canonical_glyphs WHERE name_norm = ?1", [&old_norm])?;
        }
        if new_glyph.is_some() {
            affected.extend(keys_where(&tx, "result_norm = ?1", &new_norm)?);
            tx.execute(
                "INSERT INTO canonical_glyphs (name_norm, glyph) VALUES (?1, ?2)
                 ON CONFLICT(name_norm) DO UPDATE SET glyph = excluded.glyph",
                params![new_norm, target_glyph],
            )?;
            tx.execute(
                "UPDATE combinations SET result_glyph = ?1 WHERE result_norm = ?2",
                params![target_glyph, new_norm],
            )?;
        } else if has_result_rows {
            tx.execute(
                "INSERT OR IGNORE INTO canonical_glyphs (name_norm, glyph) VALUES (?1, ?2)",
                params![new_norm, target_glyph],
            )?;
        }

        tx.commit()?;
        change.affected_keys = affected.into_iter().collect();
        tracing::info!(
            old,
            new,
            updated = change.rows_updated,
            merged = change.rows_merged,
            "renamed element"
        );
        Ok(change)
    }

    /// Set the glyph of every row producing `name` and its canonical glyph.
    pub fn reglyph_element(&self, name: &str, glyph: &str) -> Result<ElementChange> {
        let name = name.trim();
        if is_starter(name) {
            return Err(StoreError::Protected(name.to_string()));
        }
        let norm = fold_name(name);
        let tx = self.conn.unchecked_transaction()?;
        let keys = keys_where(&tx, "result_norm = ?1", &norm)?;
        if keys.is_empty() && canonical_glyph_on(&tx, &norm)?.is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let updated = tx.execute(
            "UPDATE combinations SET result_glyph = ?1 WHERE result_norm = ?2",
            params![glyph, norm],
        )?;
        tx.execute(
            "INSERT INTO canonical_glyphs (name_norm, glyph) VALUES (?1, ?2)
             ON CONFLICT(name_norm) DO UPDATE SET glyph = excluded.glyph",
            params![norm, glyph],
        )?;
        tx.commit()?;
        Ok(ElementChange {
            rows_updated: updated,
            affected_keys: keys,
            ..Default::default()
        })
    }

    /// Delete every row in which `name` appears in any position.
    pub fn delete_element(&self, name: &str) -> Result<ElementChange> {
        let name = name.trim();
        if is_starter(name) {
            return Err(StoreError::Protected(name.to_string()));
        }
        let norm = fold_name(name);
        let tx = self.conn.unchecked_transaction()?;
        let keys = keys_where(&tx, MENTIONS, &norm)?;
        if keys.is_empty() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let deleted = tx.execute(&format!("DELETE FROM combinations WHERE {MENTIONS}"), [&norm])?;
        tx.execute("DELETE FROM canonical_glyphs WHERE name_norm = ?1", [&norm])?;
        tx.commit()?;
        tracing::info!(name, deleted, "deleted element");
        Ok(ElementChange {
            rows_deleted: deleted,
            affected_keys: keys,
            ..Default::default()
        })
    }
}
