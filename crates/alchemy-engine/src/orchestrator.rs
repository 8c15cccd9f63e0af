//! Combine: cache, store, single-flight, model, safety, persist.

use alchemy_core::constants::STYLE_SAMPLE_SIZE;
use alchemy_core::{
    CallOutcome, Candidate, Combination, FailureKind, Origin, combination_prompt,
    normalize, safe_substitute, same_element, validate_name,
};
use serde::Serialize;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// What a combine call returns to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombineOutcome {
    pub result_name: String,
    pub result_glyph: String,
    pub origin: Origin,
    /// True only for the call that created the row.
    pub is_new: bool,
}

impl CombineOutcome {
    fn from_row(row: Combination, is_new: bool) -> Self {
        Self {
            result_name: row.result_name,
            result_glyph: row.result_glyph,
            origin: row.origin,
            is_new,
        }
    }
}

fn substitute() -> (&'static str, &'static str) {
    safe_substitute(&mut rand::rng())
}

impl Engine {
    /// Resolve the result of combining `a` and `b`, generating and storing
    /// it on first sight. Later calls for the same pair return the stored
    /// row unchanged.
    pub async fn combine(&self, a: &str, b: &str, caller: Option<&str>) -> Result<CombineOutcome> {
        let a = validate_name(a)
            .map_err(|e| EngineError::InvalidInput(format!("first element: {e}")))?;
        let b = validate_name(b)
            .map_err(|e| EngineError::InvalidInput(format!("second element: {e}")))?;
        if !self.config.rules.allow_self_combination && same_element(&a, &b) {
            return Err(EngineError::InvalidInput(format!(
                "cannot combine '{a}' with itself"
            )));
        }
        let key = normalize(&a, &b);

        if let Some(row) = self.lookup(&key).await? {
            return Ok(CombineOutcome::from_row(row, false));
        }

        let _leader = self.flight.acquire(&key).await;
        // Whoever led before us has stored the answer by now.
        if let Some(row) = self.lookup(&key).await? {
            tracing::debug!(key, "coalesced onto earlier generation");
            return Ok(CombineOutcome::from_row(row, false));
        }

        let candidate = self.generate(&a, &b, &key).await?;
        let (name, glyph) = self.screen(&key, candidate);

        let store = self.store.lock().await;
        let glyph = store.canonical_glyph(&name)?.unwrap_or(glyph);
        let row = Combination::new(
            &a,
            &b,
            &name,
            &glyph,
            Origin::ModelGenerated,
            &self.clock.now_iso8601(),
        )
        .with_discoverer(caller);
        let outcome = store.insert_if_absent(&row)?;
        let is_new = outcome.was_inserted();
        let row = outcome.into_row();
        self.cache_put(&row);
        drop(store);

        if is_new {
            tracing::info!(key, result = %row.result_name, "new combination");
        } else {
            tracing::debug!(key, "lost insert race, adopted stored row");
        }
        Ok(CombineOutcome::from_row(row, is_new))
    }

    /// Cache, then store. Hits bump the use counter.
    async fn lookup(&self, key: &str) -> Result<Option<Combination>> {
        if let Some(row) = self.cache.as_ref().and_then(|c| c.get(key)) {
            tracing::debug!(key, "cache hit");
            self.bump(key).await;
            return Ok(Some(row));
        }
        let store = self.store.lock().await;
        let Some(row) = store.get_pair(key)? else {
            return Ok(None);
        };
        self.cache_put(&row);
        if let Err(e) = store.bump_use_count(key) {
            tracing::warn!(key, "use count not recorded: {e}");
        }
        Ok(Some(row))
    }

    async fn bump(&self, key: &str) {
        let store = self.store.lock().await;
        if let Err(e) = store.bump_use_count(key) {
            tracing::warn!(key, "use count not recorded: {e}");
        }
    }

    /// Ask the model, allowing one retry for an unusable reply.
    async fn generate(&self, a: &str, b: &str, key: &str) -> Result<Candidate> {
        let examples = {
            let store = self.store.lock().await;
            store.nearby_combinations(a, b, STYLE_SAMPLE_SIZE)?
        };
        let prompt = combination_prompt(a, b, &examples);

        let mut malformed = 0;
        loop {
            let outcome = match self.call_model(&prompt, self.config.model.max_tokens).await {
                Ok(text) => CallOutcome::from_reply(&text),
                Err(kind) => CallOutcome::from_failure(kind),
            };
            match outcome {
                CallOutcome::Parsed(candidate) => return Ok(candidate),
                CallOutcome::Transient(kind) | CallOutcome::Permanent(kind) => {
                    return Err(EngineError::Model(kind));
                }
                CallOutcome::Malformed(reason) => {
                    malformed += 1;
                    tracing::warn!(key, attempt = malformed, "unusable model reply: {reason}");
                    if malformed > 1 {
                        return Err(EngineError::Model(FailureKind::ValidationFailed));
                    }
                }
            }
        }
    }

    /// Replace unsafe candidates. The refused text is never logged.
    fn screen(&self, key: &str, candidate: Candidate) -> (String, String) {
        if self.refuses(&candidate.name) {
            let (name, glyph) = substitute();
            tracing::warn!(key, "candidate replaced by safe substitute");
            return (name.to_string(), glyph.to_string());
        }
        (candidate.name, candidate.glyph)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alchemy_core::{FailureKind, is_safe_substitute};
    use alchemy_store::Store;

    use super::*;
    use crate::cache::{MemoryCache, ResultCache};
    use crate::clock::FixedClock;
    use crate::config::{EngineConfig, ModelConfig};
    use crate::gateway::{GatewayError, ScriptedGateway};

    fn config() -> EngineConfig {
        EngineConfig {
            model: ModelConfig {
                backoff_base_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn engine(gateway: Arc<ScriptedGateway>) -> Engine {
        Engine::new(Store::open_in_memory().unwrap(), gateway, config())
            .with_clock(Arc::new(FixedClock("2026-01-01T00:00:00Z".into())))
    }

    #[tokio::test]
    async fn test_combine_generates_then_reuses() {
        let gateway = Arc::new(ScriptedGateway::always(r#"{"name":"Steam","glyph":"♨️"}"#));
        let engine = engine(gateway.clone());

        let first = engine.combine("Water", "Fire", Some("alice")).await.unwrap();
        assert_eq!(first.result_name, "Steam");
        assert!(first.is_new);

        let second = engine.combine("fire", " WATER ", None).await.unwrap();
        assert_eq!(second.result_name, "Steam");
        assert_eq!(second.result_glyph, "♨️");
        assert!(!second.is_new);
        assert_eq!(gateway.calls(), 1);

        let store = engine.store().lock().await;
        let row = store.get_by_key("fire+water").unwrap().unwrap();
        assert_eq!(row.discoverer.as_deref(), Some("alice"));
        assert_eq!(row.created_at, "2026-01-01T00:00:00Z");
        assert_eq!(row.use_count, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store_read() {
        let gateway = Arc::new(ScriptedGateway::always(r#"{"name":"Steam","glyph":"♨️"}"#));
        let cache = Arc::new(MemoryCache::new(16, std::time::Duration::from_secs(60)));
        let engine = engine(gateway).with_cache(Some(cache.clone() as Arc<dyn ResultCache>));

        engine.combine("Water", "Fire", None).await.unwrap();
        assert!(cache.get("fire+water").is_some());
        let again = engine.combine("Fire", "Water", None).await.unwrap();
        assert_eq!(again.result_name, "Steam");
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let engine = engine(Arc::new(ScriptedGateway::new([])));
        for (a, b) in [("", "Fire"), ("   ", "Fire"), ("_ADMIN", "Fire"), ("Fire", "fire")] {
            let err = engine.combine(a, b, None).await.unwrap_err();
            assert_eq!(err.kind(), "invalid_input", "{a} + {b}");
        }
        let long = "x".repeat(101);
        assert!(engine.combine(&long, "Fire", None).await.is_err());
    }

    #[tokio::test]
    async fn test_self_combination_when_allowed() {
        let mut config = config();
        config.rules.allow_self_combination = true;
        let engine = Engine::new(
            Store::open_in_memory().unwrap(),
            Arc::new(ScriptedGateway::always(r#"{"name":"Inferno","glyph":"🔥"}"#)),
            config,
        );
        let out = engine.combine("Fire", "fire", None).await.unwrap();
        assert_eq!(out.result_name, "Inferno");
    }

    #[tokio::test]
    async fn test_malformed_reply_retried_once() {
        let gateway = Arc::new(ScriptedGateway::new([
            Ok("no json here".to_string()),
            Ok(r#"{"name":"Mud","glyph":"🟫"}"#.to_string()),
        ]));
        let engine = engine(gateway.clone());
        let out = engine.combine("Earth", "Water", None).await.unwrap();
        assert_eq!(out.result_name, "Mud");
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_two_glyph_reply_is_validation_failed() {
        let gateway = Arc::new(ScriptedGateway::always(r#"{"name":"Mud","glyph":"🟫💧"}"#));
        let engine = engine(gateway.clone());
        let err = engine.combine("Earth", "Water", None).await.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::ValidationFailed));
        assert_eq!(gateway.calls(), 2);
        let store = engine.store().lock().await;
        assert!(store.get_by_key("earth+water").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_starter_reply_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::always(r#"{"name":"Earth","glyph":"🌍"}"#));
        let engine = engine(gateway);
        let err = engine.combine("Mud", "Fire", None).await.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::ValidationFailed));
    }

    #[tokio::test]
    async fn test_auth_failure_is_permanent() {
        let gateway = Arc::new(ScriptedGateway::new([Err(GatewayError::from_status(401))]));
        let engine = engine(gateway.clone());
        let err = engine.combine("Earth", "Water", None).await.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::AuthFailed));
        assert_eq!(err.status(), 503);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_profanity_substituted_when_enabled() {
        let gateway = Arc::new(ScriptedGateway::always(r#"{"name":"Shit","glyph":"💩"}"#));
        let engine = engine(gateway);
        let out = engine.combine("Mud", "Water", None).await.unwrap();
        assert!(is_safe_substitute(&out.result_name));
        assert_eq!(out.origin, Origin::ModelGenerated);
    }

    #[tokio::test]
    async fn test_profanity_kept_when_disabled() {
        let mut config = config();
        config.rules.profanity_filter = false;
        let engine = Engine::new(
            Store::open_in_memory().unwrap(),
            Arc::new(ScriptedGateway::always(r#"{"name":"Shit","glyph":"💩"}"#)),
            config,
        );
        let out = engine.combine("Mud", "Water", None).await.unwrap();
        assert_eq!(out.result_name, "Shit");
    }

    #[tokio::test]
    async fn test_canonical_glyph_preferred() {
        let gateway = Arc::new(ScriptedGateway::new([
            Ok(r#"{"name":"Steam","glyph":"♨️"}"#.to_string()),
            Ok(r#"{"name":"steam","glyph":"💨"}"#.to_string()),
        ]));
        let engine = engine(gateway);
        engine.combine("Water", "Fire", None).await.unwrap();
        let out = engine.combine("Water", "Lava", None).await.unwrap();
        assert_eq!(out.result_glyph, "♨️");
    }
}
