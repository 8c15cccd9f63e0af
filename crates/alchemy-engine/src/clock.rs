/// Source of row timestamps.
pub trait Clock: Send + Sync {
    fn now_iso8601(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_iso8601(&self) -> String {
        alchemy_core::now_iso8601()
    }
}

/// Always reports the same instant. For deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now_iso8601(&self) -> String {
        self.0.clone()
    }
}
