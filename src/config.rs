//! Engine configuration

use std::env;
use std::thread;

/// Environment variable overriding the worker thread count.
pub const WORKER_COUNT_ENV: &str = "WORKER_COUNT";

/// Configuration read at engine start
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker threads in the pool
    pub workers: usize,
}

impl EngineConfig {
    /// Create a config with an explicit worker count (0 means detected parallelism)
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: if workers == 0 {
                detected_parallelism()
            } else {
                workers
            },
        }
    }

    /// Read configuration from the environment.
    ///
    /// `WORKER_COUNT` overrides the worker thread count; anything
    /// unset or unparsable falls back to detected parallelism.
    pub fn from_env() -> Self {
        let workers = env::var(WORKER_COUNT_ENV)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or_else(detected_parallelism);
        Self { workers }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: detected_parallelism(),
        }
    }
}

fn detected_parallelism() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_workers() {
        assert!(EngineConfig::default().workers >= 1);
    }

    #[test]
    fn test_explicit_workers() {
        assert_eq!(EngineConfig::with_workers(4).workers, 4);
        assert!(EngineConfig::with_workers(0).workers >= 1);
    }
}
