//! Daily Alchemy combination engine.
//!
//! `Engine` ties the store to a result cache, a model gateway and a clock,
//! all passed in as capabilities so tests can swap them for stubs.

pub mod admin;
pub mod cache;
pub mod clock;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod flight;
pub mod gateway;
pub mod orchestrator;
pub mod ratelimit;
mod retry;

pub use admin::ElementEdit;
pub use cache::{MemoryCache, ResultCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use composer::{CommitReport, GeneratedPaths, StepConflict};
pub use config::{CacheConfig, EngineConfig, ModelConfig, RateLimitConfig, RulesConfig};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use gateway::{GatewayError, HttpGateway, ModelGateway, ModelRequest, ScriptedGateway};
pub use orchestrator::CombineOutcome;
pub use ratelimit::{Bucket, RateLimiter};
