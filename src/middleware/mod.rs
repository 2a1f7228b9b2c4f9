// Middleware for resilient gateway calls
//
// Provides circuit breaking and per-call timeouts for the detection and
// translation backends

pub mod circuit_breaker;
pub mod guarded;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use guarded::{GatewayGuard, GuardRejection, GuardedDetector, GuardedTranslator};
