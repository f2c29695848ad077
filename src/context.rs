//! Call-context conventions: the typed equivalent of the original's two
//! well-known `context.WithValue` keys (`routing`, `target`).
//!
//! spec.md §4.7/§9 explicitly frames this as a "well-known context key"
//! convention meant to avoid threading an extra parameter through every
//! RPC signature. Go's dynamic key/value map has no clean Rust analogue
//! at the type level, so this is reimplemented as a small typed struct —
//! an intentional Open Question resolution recorded in DESIGN.md.

use std::time::Duration;

/// Per-call routing instruction attached by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingHint {
    /// No hint: round-robin.
    None,
    /// Hash-routing key (spec.md's `routing` context value).
    Hash(String),
    /// 1-based broadcast slot (spec.md's `target` context value).
    Target(u32),
}

impl Default for RoutingHint {
    fn default() -> Self {
        RoutingHint::None
    }
}

/// Everything one outbound call carries: a routing hint and a deadline.
///
/// `target`, when present, always takes precedence over `routing` — see
/// spec.md §4.7 ("If both are set, target takes precedence").
#[derive(Debug, Clone)]
pub struct CallContext {
    pub hint: RoutingHint,
    pub deadline: Duration,
}

impl CallContext {
    pub fn new(deadline: Duration) -> Self {
        Self {
            hint: RoutingHint::None,
            deadline,
        }
    }

    pub fn with_hash(mut self, key: impl Into<String>) -> Self {
        self.hint = RoutingHint::Hash(key.into());
        self
    }

    pub fn with_target(mut self, target: u32) -> Self {
        self.hint = RoutingHint::Target(target);
        self
    }
}

/// Standard 8-second deadline, no hint — spec.md §6's "8 s standard".
pub fn context_with_standard() -> CallContext {
    CallContext::new(Duration::from_secs(8))
}

/// Long-lived call: same deadline as standard (spec.md §6 lists "8 s
/// long" alongside standard), kept distinct so callers can retune either
/// independently later without an API break.
pub fn context_with_long() -> CallContext {
    CallContext::new(Duration::from_secs(8))
}

/// Short 2-second deadline — health checks, fast paths.
pub fn context_with_short() -> CallContext {
    CallContext::new(Duration::from_secs(2))
}

/// Standard-deadline context carrying a hash routing hint.
pub fn context_with_hash(key: impl Into<String>) -> CallContext {
    context_with_standard().with_hash(key)
}

/// Standard-deadline context carrying an explicit broadcast target.
pub fn context_with_target(target: u32) -> CallContext {
    context_with_standard().with_target(target)
}

/// Standard context with an explicit deadline override.
pub fn context_with_deadline(deadline: Duration) -> CallContext {
    CallContext::new(deadline)
}
