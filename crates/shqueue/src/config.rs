//! Configuration for queue creation, naming, and open-retry behavior.

use std::time::Duration;

/// Retry shape for `Builder::get()` when opening a named shared queue whose
/// creator has not yet published capacity (`Error::NotYetInitialized`).
///
/// The creator publishes `capacity` last, so an opener arriving early must
/// poll until that publish lands.
#[derive(Debug, Clone, Copy)]
pub struct OpenRetry {
    /// Maximum number of open attempts before giving up.
    ///
    /// Default: 50
    pub max_attempts: u32,
    /// Sleep between attempts after the adaptive spin/yield backoff is
    /// exhausted.
    ///
    /// Default: 1ms
    pub sleep: Duration,
}

impl Default for OpenRetry {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            sleep: Duration::from_millis(1),
        }
    }
}

impl OpenRetry {
    /// A single attempt, no retrying: the first `NotYetInitialized` is
    /// surfaced immediately.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            sleep: Duration::ZERO,
        }
    }

    /// Sets the maximum number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the inter-attempt sleep duration.
    #[must_use]
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }
}

/// The system-global shared-memory namespace convention: names begin with a
/// single leading slash and contain no other slashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamePrefix;

impl NamePrefix {
    /// Validates a caller-supplied shared-object name against the naming
    /// convention. Returns the name unchanged if it is already conformant,
    /// otherwise a normalized copy with a single leading slash prepended.
    #[must_use]
    pub fn normalize(name: &str) -> String {
        if name.starts_with('/') {
            name.to_owned()
        } else {
            format!("/{name}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_leading_slash() {
        assert_eq!(NamePrefix::normalize("foo"), "/foo");
        assert_eq!(NamePrefix::normalize("/foo"), "/foo");
    }

    #[test]
    fn open_retry_none_is_single_shot() {
        let r = OpenRetry::none();
        assert_eq!(r.max_attempts, 1);
    }

    #[test]
    fn open_retry_builder_methods() {
        let r = OpenRetry::default()
            .with_max_attempts(5)
            .with_sleep(Duration::from_millis(2));
        assert_eq!(r.max_attempts, 5);
        assert_eq!(r.sleep, Duration::from_millis(2));
    }
}
