use std::sync::Arc;

use alchemy_core::{ProfanityList, contains_child_exploitation};
use alchemy_store::Store;
use tokio::sync::Mutex;

use crate::cache::ResultCache;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::flight::Flight;
use crate::gateway::ModelGateway;
use crate::ratelimit::{Bucket, RateLimiter};
use crate::retry;

/// Shared handle over the store, cache and model gateway.
///
/// Operations live in `orchestrator` (combine), `composer` (paths) and
/// `admin` (element maintenance).
pub struct Engine {
    pub(crate) store: Arc<Mutex<Store>>,
    pub(crate) cache: Option<Arc<dyn ResultCache>>,
    pub(crate) gateway: Arc<dyn ModelGateway>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) flight: Flight,
    pub(crate) profanity: ProfanityList,
    pub(crate) config: EngineConfig,
    combine_limit: RateLimiter,
    generate_limit: RateLimiter,
}

impl Engine {
    pub fn new(store: Store, gateway: Arc<dyn ModelGateway>, config: EngineConfig) -> Self {
        let profanity = ProfanityList::with_extra(config.rules.extra_blocked_terms.iter());
        Self {
            store: Arc::new(Mutex::new(store)),
            cache: None,
            gateway,
            clock: Arc::new(SystemClock),
            flight: Flight::default(),
            profanity,
            combine_limit: RateLimiter::per_minute(config.rate_limit.combine_per_minute),
            generate_limit: RateLimiter::per_minute(config.rate_limit.generate_per_minute),
            config,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn ResultCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct store access for maintenance commands and tests.
    pub fn store(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }

    /// Count one request against `caller`'s bucket.
    pub fn admit(&self, bucket: Bucket, caller: &str) -> Result<()> {
        let limiter = match bucket {
            Bucket::Combine => &self.combine_limit,
            Bucket::Generate => &self.generate_limit,
        };
        let admitted = limiter.check(caller);
        if admitted.is_err() {
            tracing::info!(caller, ?bucket, "rate limit exhausted");
        }
        admitted
    }

    /// Would `name` be refused as an element name? Child safety always
    /// applies; the profanity list only when the filter is on.
    pub(crate) fn refuses(&self, name: &str) -> bool {
        contains_child_exploitation(name)
            || (self.config.rules.profanity_filter && self.profanity.contains(name))
    }

    pub(crate) async fn call_model(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> std::result::Result<String, alchemy_core::FailureKind> {
        retry::call_with_retry(self.gateway.as_ref(), &self.config.model, prompt, max_tokens).await
    }

    pub(crate) fn cache_put(&self, row: &alchemy_core::Combination) {
        if let Some(cache) = &self.cache {
            cache.put(row.clone());
        }
    }

    pub(crate) fn cache_invalidate(&self, keys: &[String]) {
        if let Some(cache) = &self.cache
            && !keys.is_empty()
        {
            cache.invalidate(keys);
        }
    }
}
