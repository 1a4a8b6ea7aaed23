//! Leader resolution.
//!
//! The session loop asks a [`ResolveLeader`] for the current master
//! endpoint before every connection attempt, and invalidates the resolution
//! after any transport failure. Real redirect-following discovery lives
//! with the transport; [`StaticResolver`] covers the common fixed-candidate
//! deployment by rotating through the list on invalidation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ResolveError};

/// A resolved remote address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    /// Wrap a raw address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The raw address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(address: &str) -> Self {
        Self(address.to_owned())
    }
}

impl From<String> for Endpoint {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Resolves the current leader among candidate endpoints.
#[async_trait]
pub trait ResolveLeader: Send + Sync {
    /// The endpoint to connect to next.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when no leader can be determined; the
    /// session loop retries under its backoff policy.
    async fn resolve(&self) -> Result<Endpoint, ResolveError>;

    /// Discard the current resolution after a transport failure.
    fn invalidate(&self) {}
}

/// Rotates through a fixed, non-empty candidate list.
///
/// `resolve` returns the current candidate; each `invalidate` advances to
/// the next, wrapping around.
#[derive(Debug)]
pub struct StaticResolver {
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
}

impl StaticResolver {
    /// Create a resolver over `endpoints`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoEndpoints`] for an empty list.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ResolveLeader for StaticResolver {
    async fn resolve(&self) -> Result<Endpoint, ResolveError> {
        let index = self.cursor.load(Ordering::Relaxed) % self.endpoints.len();
        Ok(self.endpoints[index].clone())
    }

    fn invalidate(&self) {
        self.cursor.fetch_add(1, Ordering::Relaxed);
    }
}
