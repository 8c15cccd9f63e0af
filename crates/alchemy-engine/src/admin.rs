//! Element maintenance and browsing.
//!
//! Mutations run under the store lock and evict every affected cache key
//! before the lock is released, so no reader pairs a renamed store with a
//! stale cached row.

use alchemy_core::{is_starter, validate_glyph, validate_name};
use alchemy_store::{ElementChange, ElementDetail, ElementPage, ElementQuery, StoreStats};
use serde::Deserialize;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Requested edit to one element. At least one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementEdit {
    pub new_name: Option<String>,
    pub new_glyph: Option<String>,
}

impl Engine {
    pub async fn edit_element(&self, name: &str, edit: &ElementEdit) -> Result<ElementChange> {
        match (&edit.new_name, &edit.new_glyph) {
            (Some(new_name), glyph) => {
                self.rename_element(name, new_name, glyph.as_deref()).await
            }
            (None, Some(glyph)) => self.reglyph_element(name, glyph).await,
            (None, None) => Err(EngineError::InvalidInput(
                "nothing to change: give new_name or new_glyph".to_string(),
            )),
        }
    }

    pub async fn rename_element(
        &self,
        old: &str,
        new: &str,
        new_glyph: Option<&str>,
    ) -> Result<ElementChange> {
        let old = old.trim();
        if old.is_empty() {
            return Err(EngineError::InvalidInput("element name is empty".to_string()));
        }
        let new = validate_name(new)?;
        if self.refuses(&new) {
            return Err(EngineError::InvalidInput("new name is not allowed".to_string()));
        }
        let glyph = new_glyph.map(validate_glyph).transpose()?;

        let store = self.store.lock().await;
        self.cache_invalidate(&store.affected_keys(old)?);
        let change = store.rename_element(old, &new, glyph.as_deref())?;
        self.cache_invalidate(&change.affected_keys);
        Ok(change)
    }

    pub async fn reglyph_element(&self, name: &str, glyph: &str) -> Result<ElementChange> {
        let glyph = validate_glyph(glyph)?;
        let store = self.store.lock().await;
        let change = store.reglyph_element(name, &glyph)?;
        self.cache_invalidate(&change.affected_keys);
        Ok(change)
    }

    pub async fn delete_element(&self, name: &str) -> Result<ElementChange> {
        if is_starter(name) {
            return Err(EngineError::InvalidInput(format!(
                "'{}' is a protected starter element",
                name.trim()
            )));
        }
        let store = self.store.lock().await;
        self.cache_invalidate(&store.affected_keys(name)?);
        let change = store.delete_element(name)?;
        self.cache_invalidate(&change.affected_keys);
        Ok(change)
    }

    pub async fn element_detail(&self, name: &str) -> Result<ElementDetail> {
        let store = self.store.lock().await;
        store
            .element_detail(name)?
            .ok_or_else(|| EngineError::NotFound(name.trim().to_string()))
    }

    pub async fn list_elements(&self, query: &ElementQuery) -> Result<ElementPage> {
        let store = self.store.lock().await;
        Ok(store.list_elements(query)?)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let store = self.store.lock().await;
        Ok(store.stats()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use alchemy_core::{Combination, Origin};
    use alchemy_store::Store;

    use super::*;
    use crate::cache::{MemoryCache, ResultCache};
    use crate::config::EngineConfig;
    use crate::gateway::ScriptedGateway;

    async fn engine_with_cache() -> (Engine, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new(64, Duration::from_secs(60)));
        let engine = Engine::new(
            Store::open_in_memory().unwrap(),
            Arc::new(ScriptedGateway::new([])),
            EngineConfig::default(),
        )
        .with_cache(Some(cache.clone() as Arc<dyn ResultCache>));
        {
            let store = engine.store().lock().await;
            for (a, b, result, glyph) in [
                ("Water", "Fire", "Steam", "♨️"),
                ("Steam", "Wind", "Cloud", "☁️"),
            ] {
                let row = Combination::new(a, b, result, glyph, Origin::ModelGenerated, "t");
                store.insert_if_absent(&row).unwrap();
                cache.put(row);
            }
        }
        (engine, cache)
    }

    #[tokio::test]
    async fn test_rename_evicts_cache() {
        let (engine, cache) = engine_with_cache().await;
        let change = engine.rename_element("Steam", "Vapor", None).await.unwrap();
        assert_eq!(change.rows_updated, 2);
        assert!(cache.get("fire+water").is_none());
        assert!(cache.get("steam+wind").is_none());
    }

    #[tokio::test]
    async fn test_edit_requires_a_field() {
        let (engine, _) = engine_with_cache().await;
        let err = engine
            .edit_element("Steam", &ElementEdit::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_edit_glyph_only_reglyphs() {
        let (engine, cache) = engine_with_cache().await;
        let edit = ElementEdit {
            new_name: None,
            new_glyph: Some("🌫️".into()),
        };
        let change = engine.edit_element("steam", &edit).await.unwrap();
        assert_eq!(change.rows_updated, 1);
        assert!(cache.get("fire+water").is_none());
        assert!(cache.get("steam+wind").is_some());
    }

    #[tokio::test]
    async fn test_rename_validates_new_name() {
        let (engine, _) = engine_with_cache().await;
        let err = engine.rename_element("Steam", "_ADMIN", None).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        let err = engine.rename_element("Steam", "Vapor", Some("ab")).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_rename_refuses_blocked_name() {
        let (engine, cache) = engine_with_cache().await;
        let err = engine
            .rename_element("Steam", "Pedo Bear", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(cache.get("fire+water").is_some());
        let store = engine.store().lock().await;
        assert!(store.element_exists("steam").unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_missing() {
        let (engine, cache) = engine_with_cache().await;
        let change = engine.delete_element("Steam").await.unwrap();
        assert_eq!(change.rows_deleted, 2);
        assert!(cache.is_empty());
        let err = engine.delete_element("Steam").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        let err = engine.delete_element("Earth").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_detail_not_found() {
        let (engine, _) = engine_with_cache().await;
        assert_eq!(
            engine.element_detail("Plasma").await.unwrap_err().kind(),
            "not_found"
        );
        let detail = engine.element_detail("steam").await.unwrap();
        assert_eq!(detail.name, "Steam");
    }

    #[tokio::test]
    async fn test_stats_and_listing() {
        let (engine, _) = engine_with_cache().await;
        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.elements, 6);
        let page = engine
            .list_elements(&ElementQuery {
                search: Some("ea".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = page.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Earth", "Steam"]);
    }
}
