//! Validation for relay configuration.

use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.level == ValidationLevel::Error)
}

impl Validate for RelayConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let base = self.api.base_url.trim();
        if base.is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "api.base_url.empty",
                message: "api base_url must not be empty".to_string(),
            });
        } else if !base.starts_with("http://") && !base.starts_with("https://") {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "api.base_url.scheme",
                message: "api base_url should start with http:// or https://".to_string(),
            });
        }

        if self.api.api_key_env.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "api.api_key_env.empty",
                message: "api_key_env must name an environment variable".to_string(),
            });
        }

        if self.api.request_timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "api.request_timeout.zero",
                message: "request timeout cannot be 0".to_string(),
            });
        }

        if self.polling.poll_interval_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "polling.poll_interval.zero",
                message: "poll interval cannot be 0".to_string(),
            });
        }

        if self.polling.timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "polling.timeout.zero",
                message: "wait timeout cannot be 0".to_string(),
            });
        } else if self.polling.timeout_secs < 30 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "polling.timeout.low",
                message: format!(
                    "wait timeout {}s is very low; most agents take longer than that",
                    self.polling.timeout_secs
                ),
            });
        }

        if self.polling.timeout_secs > 0
            && self.polling.poll_interval_secs >= self.polling.timeout_secs
        {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "polling.poll_interval.exceeds_timeout",
                message: "poll interval is not shorter than the wait timeout".to_string(),
            });
        }

        if self.polling.completed_check_interval_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "polling.completed_check_interval.zero",
                message: "completed check interval cannot be 0".to_string(),
            });
        }

        if self.polling.notify_timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "polling.notify_timeout.zero",
                message: "notify timeout of 0 drops every progress notification".to_string(),
            });
        }

        if self.targets.cache_ttl_secs < 60 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "targets.cache_ttl.low",
                message: format!(
                    "target cache ttl {}s is below the remote rate limit window of 60s",
                    self.targets.cache_ttl_secs
                ),
            });
        }

        if self.sessions.max_users == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "sessions.max_users.zero",
                message: "session store must hold at least one user".to_string(),
            });
        }

        issues
    }
}
