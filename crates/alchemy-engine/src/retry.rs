//! Transient-failure retry around the model gateway.

use std::time::Duration;

use alchemy_core::FailureKind;
use rand::Rng;

use crate::config::ModelConfig;
use crate::gateway::{GatewayError, ModelGateway, ModelRequest};

/// Exponential backoff with jitter before retry number `attempt` (1-based).
fn backoff(base_ms: u64, attempt: u32) -> Duration {
    if base_ms == 0 || attempt == 0 {
        return Duration::ZERO;
    }
    let exp = base_ms.saturating_mul(1u64 << (attempt - 1).min(6));
    let jitter = rand::rng().random_range(0..=base_ms);
    Duration::from_millis(exp.saturating_add(jitter))
}

/// Call the gateway, retrying transient failures against the fallback
/// chain. Each call runs under the configured deadline; expiry counts as
/// `overloaded`. Permanent failures return immediately.
pub(crate) async fn call_with_retry(
    gateway: &dyn ModelGateway,
    config: &ModelConfig,
    prompt: &str,
    max_tokens: u32,
) -> Result<String, FailureKind> {
    let attempts = config.max_attempts.max(1);
    let deadline = Duration::from_secs(config.timeout_secs.max(1));
    let mut last = FailureKind::Unknown;

    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(backoff(config.backoff_base_ms, attempt)).await;
        }
        let model = config.model_for_attempt(attempt);
        let request = ModelRequest {
            prompt,
            model,
            max_tokens,
            temperature: config.temperature,
        };
        let result = match tokio::time::timeout(deadline, gateway.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::new(
                FailureKind::Overloaded,
                "model call deadline exceeded",
            )),
        };
        match result {
            Ok(text) => {
                tracing::debug!(model, attempt, "model replied");
                return Ok(text);
            }
            Err(e) if e.kind.is_transient() => {
                tracing::warn!(model, attempt, kind = %e.kind, "transient model failure: {}", e.message);
                last = e.kind;
            }
            Err(e) => {
                tracing::error!(model, attempt, kind = %e.kind, "model call failed: {}", e.message);
                return Err(e.kind);
            }
        }
    }
    Err(last)
}
