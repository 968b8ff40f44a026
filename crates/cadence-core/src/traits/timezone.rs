// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ZIP or region to IANA timezone resolution.

use async_trait::async_trait;

/// Resolves a ZIP code or region to an IANA timezone identifier.
///
/// Called once at contact creation by the surrounding application; results may
/// be cached there.
#[async_trait]
pub trait TimezoneResolver: Send + Sync {
    /// Returns the IANA timezone id for `zip_or_region`.
    async fn resolve(&self, zip_or_region: &str) -> String;
}

/// Resolver that always answers with one configured timezone.
#[derive(Debug, Clone)]
pub struct FixedTimezoneResolver {
    timezone: String,
}

impl FixedTimezoneResolver {
    pub fn new(timezone: impl Into<String>) -> Self {
        Self {
            timezone: timezone.into(),
        }
    }
}

impl Default for FixedTimezoneResolver {
    fn default() -> Self {
        Self::new("America/New_York")
    }
}

#[async_trait]
impl TimezoneResolver for FixedTimezoneResolver {
    async fn resolve(&self, _zip_or_region: &str) -> String {
        self.timezone.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_resolver_ignores_input() {
        let resolver = FixedTimezoneResolver::new("America/Chicago");
        assert_eq!(resolver.resolve("32401").await, "America/Chicago");
        assert_eq!(resolver.resolve("").await, "America/Chicago");
    }

    #[tokio::test]
    async fn default_resolver_is_eastern() {
        let resolver = FixedTimezoneResolver::default();
        assert_eq!(resolver.resolve("10001").await, "America/New_York");
    }
}
