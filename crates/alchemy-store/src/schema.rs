use alchemy_core::{Combination, STARTERS, fold_name, now_iso8601};
use rusqlite::{Connection, params};

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // `*_norm` columns hold folded names so element identity is
    // case-insensitive while display casing is preserved.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS combinations (
            key          TEXT PRIMARY KEY,
            input_a      TEXT NOT NULL,
            input_b      TEXT NOT NULL,
            a_norm       TEXT NOT NULL,
            b_norm       TEXT NOT NULL,
            result_name  TEXT NOT NULL,
            result_norm  TEXT NOT NULL,
            result_glyph TEXT NOT NULL,
            origin       TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            use_count    INTEGER NOT NULL DEFAULT 0,
            discoverer   TEXT
        );

        CREATE TABLE IF NOT EXISTS canonical_glyphs (
            name_norm TEXT PRIMARY KEY,
            glyph     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_comb_result ON combinations(result_norm);
        CREATE INDEX IF NOT EXISTS idx_comb_a ON combinations(a_norm);
        CREATE INDEX IF NOT EXISTS idx_comb_b ON combinations(b_norm);
        CREATE INDEX IF NOT EXISTS idx_comb_uses ON combinations(use_count DESC);
        ",
    )?;

    seed_starters(conn)?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Insert the four starter rows and their canonical glyphs. Idempotent.
fn seed_starters(conn: &Connection) -> Result<()> {
    let now = now_iso8601();
    let mut seeded = 0;
    for (name, glyph) in STARTERS {
        let row = Combination::starter(name, glyph, &now);
        seeded += conn.execute(
            "INSERT OR IGNORE INTO combinations
                (key, input_a, input_b, a_norm, b_norm, result_name, result_norm,
                 result_glyph, origin, created_at, use_count, discoverer)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, NULL)",
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
            ],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO canonical_glyphs (name_norm, glyph) VALUES (?1, ?2)",
            params![fold_name(name), glyph],
        )?;
    }
    if seeded > 0 {
        tracing::info!("seeded {seeded} starter elements");
    }
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
