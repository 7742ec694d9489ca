/*!
 * Runtime Limits and Constants
 *
 * Centralized location for pool sizing, naming and environment keys.
 */

/// Fallback worker count when hardware concurrency cannot be detected
pub const FALLBACK_WORKER_THREADS: usize = 4;

/// Prefix for worker thread names ("tracerayer-worker-0", ...)
pub const WORKER_THREAD_PREFIX: &str = "tracerayer-worker";

/// Environment variable overriding the default worker count
pub const ENV_POOL_THREADS: &str = "TRACERAYER_POOL_THREADS";

/// Environment variable enabling JSON trace output
pub const ENV_TRACE_JSON: &str = "TRACERAYER_TRACE_JSON";

/// Default log filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "info";
