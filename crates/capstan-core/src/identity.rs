//! Operator identity resolution.
//!
//! The resolution chain: `CAPSTAN_IDENTITY` env > `user@host` computed from
//! `USER` and `HOSTNAME` (each falling back to `unknown`). The identity is
//! written into lock records for diagnostics only — it is not authentication.

use std::env;

const IDENTITY_ENV: &str = "CAPSTAN_IDENTITY";

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

/// Real environment reader.
struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }
}

fn identity_with(env: &dyn EnvReader) -> String {
    if let Some(explicit) = env.get(IDENTITY_ENV) {
        return explicit;
    }
    let user = env.get("USER").unwrap_or_else(|| "unknown".to_string());
    let host = env.get("HOSTNAME").unwrap_or_else(|| "unknown".to_string());
    format!("{user}@{host}")
}

/// Resolve the identity string recorded as the holder of hard and soft locks.
#[must_use]
pub fn identity() -> String {
    identity_with(&RealEnv)
}
