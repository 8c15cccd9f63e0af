use serde::Deserialize;

/// Model gateway and retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    pub base_url: String,
    pub api_key: Option<String>,
    pub primary: String,
    pub fallbacks: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub path_max_tokens: u32,
    /// Deadline for a single gateway call.
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// Zero disables backoff sleeps.
    pub backoff_base_ms: u64,
    /// Existing combinations sent as path-generation context.
    pub context_limit: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            primary: "anthropic/claude-3.5-haiku".to_string(),
            fallbacks: vec!["openai/gpt-4o-mini".to_string()],
            max_tokens: 256,
            temperature: 0.7,
            path_max_tokens: 4096,
            timeout_secs: 10,
            max_attempts: 3,
            backoff_base_ms: 250,
            context_limit: alchemy_core::DEFAULT_CONTEXT_LIMIT,
        }
    }
}

impl ModelConfig {
    /// Model to use on each attempt: primary first, then fallbacks in order,
    /// repeating the last one once they run out.
    pub fn model_for_attempt(&self, attempt: u32) -> &str {
        if attempt == 0 {
            return &self.primary;
        }
        self.fallbacks
            .get(attempt as usize - 1)
            .or(self.fallbacks.last())
            .unwrap_or(&self.primary)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
            ttl_secs: 3600,
        }
    }
}

/// Game rules that are deployment choices rather than invariants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub allow_self_combination: bool,
    pub profanity_filter: bool,
    pub extra_blocked_terms: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            allow_self_combination: false,
            profanity_filter: true,
            extra_blocked_terms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub combine_per_minute: u32,
    pub generate_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            combine_per_minute: 60,
            generate_per_minute: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub model: ModelConfig,
    pub rules: RulesConfig,
    pub rate_limit: RateLimitConfig,
}
