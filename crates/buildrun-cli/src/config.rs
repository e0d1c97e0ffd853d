//! CLI configuration.

use std::time::Duration;

use buildrun_follow::AttachPolicy;

/// API address used when neither the flag nor the environment sets one.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8001";

/// Namespace used when neither the flag nor the environment sets one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the platform API (an authenticated proxy).
    pub api_url: String,

    /// Namespace all objects live in.
    pub namespace: String,

    /// Attach attempts while the pod is not ready.
    pub attach_attempts: u32,

    /// Delay between attach attempts (seconds).
    pub attach_delay_secs: u64,

    /// Optional deadline for the whole invocation (seconds).
    pub wait_timeout_secs: Option<u64>,
}

impl Config {
    pub fn attach_policy(&self) -> AttachPolicy {
        AttachPolicy {
            max_attempts: self.attach_attempts,
            retry_delay: Duration::from_secs(self.attach_delay_secs),
        }
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_and_timeout() {
        let config = Config {
            api_url: DEFAULT_API_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            attach_attempts: 4,
            attach_delay_secs: 1,
            wait_timeout_secs: Some(90),
        };
        assert_eq!(
            config.attach_policy(),
            AttachPolicy {
                max_attempts: 4,
                retry_delay: Duration::from_secs(1),
            }
        );
        assert_eq!(config.wait_timeout(), Some(Duration::from_secs(90)));
    }
}
