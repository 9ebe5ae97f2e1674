#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("access to target rejected ({endpoint}): {message}")]
    Access { endpoint: String, message: String },
    #[error("remote endpoint not found ({endpoint}): {message}")]
    NotFound { endpoint: String, message: String },
    #[error("remote rate limit exceeded ({endpoint}) retry_after={retry_after_secs:?}")]
    RateLimited {
        endpoint: String,
        retry_after_secs: Option<u64>,
    },
    #[error("network error contacting {endpoint}: {message}")]
    Network { endpoint: String, message: String },
    #[error("agent is expired or deleted ({endpoint}): {message}")]
    Conflict { endpoint: String, message: String },
    #[error("remote error ({endpoint}) status={status:?}: {message}")]
    Remote {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },
    #[error("http client could not be built: {message}")]
    Client { message: String },
}

/// Flat tag of a [`GatewayError`], used where the payload does not matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    Access,
    NotFound,
    RateLimited,
    Network,
    Conflict,
    Remote,
    Client,
}

impl GatewayError {
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::Access { .. } => GatewayErrorKind::Access,
            GatewayError::NotFound { .. } => GatewayErrorKind::NotFound,
            GatewayError::RateLimited { .. } => GatewayErrorKind::RateLimited,
            GatewayError::Network { .. } => GatewayErrorKind::Network,
            GatewayError::Conflict { .. } => GatewayErrorKind::Conflict,
            GatewayError::Remote { .. } => GatewayErrorKind::Remote,
            GatewayError::Client { .. } => GatewayErrorKind::Client,
        }
    }

    /// Failures after which a cached read-mostly value may be served instead.
    pub fn allows_stale_read(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::Network { .. }
        )
    }
}

/// Maps a non-2xx response onto the failure taxonomy.
pub fn classify_http_failure(
    endpoint: &str,
    status: u16,
    body: &str,
    retry_after_secs: Option<u64>,
) -> GatewayError {
    let message = remote_error_message(body);
    let lowered = body.to_ascii_lowercase();
    let endpoint = endpoint.to_string();

    let body_says_rate_limited = matches!(status, 400 | 500..=599) && lowered.contains("rate limit");
    if status == 429 || body_says_rate_limited {
        return GatewayError::RateLimited {
            endpoint,
            retry_after_secs,
        };
    }

    match status {
        401 | 403 => GatewayError::Access { endpoint, message },
        400 if looks_like_access_rejection(&lowered) => GatewayError::Access { endpoint, message },
        404 => GatewayError::NotFound { endpoint, message },
        409 => GatewayError::Conflict { endpoint, message },
        _ => GatewayError::Remote {
            endpoint,
            status: Some(status),
            message,
        },
    }
}

fn looks_like_access_rejection(lowered_body: &str) -> bool {
    let markers = [
        "access to repository",
        "validate access",
        "not authorized",
        "permission denied",
    ];
    markers.iter().any(|marker| lowered_body.contains(marker))
}

/// Prefers the `error` field of a JSON body, falling back to the raw text.
pub fn remote_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    if let Some(message) = parsed
        .as_ref()
        .and_then(|value| value.get("error"))
        .and_then(|value| match value {
            serde_json::Value::String(text) => Some(text.clone()),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        })
    {
        return message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    truncate_chars(trimmed, 500)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::{classify_http_failure, remote_error_message, GatewayError, GatewayErrorKind};

    #[test]
    fn status_codes_map_onto_taxonomy() {
        let cases = [
            (401, "", GatewayErrorKind::Access),
            (403, "", GatewayErrorKind::Access),
            (404, "", GatewayErrorKind::NotFound),
            (409, r#"{"error":"Agent was deleted"}"#, GatewayErrorKind::Conflict),
            (429, "", GatewayErrorKind::RateLimited),
            (500, "boom", GatewayErrorKind::Remote),
            (400, "bad prompt", GatewayErrorKind::Remote),
        ];
        for (status, body, expected) in cases {
            let err = classify_http_failure("/agents", status, body, None);
            assert_eq!(err.kind(), expected, "status {status}");
        }
    }

    #[test]
    fn repository_access_rejection_is_access_error() {
        let err = classify_http_failure(
            "/agents",
            400,
            r#"{"error":"Failed to validate access to repository"}"#,
            None,
        );
        assert!(matches!(err, GatewayError::Access { ref message, .. }
            if message == "Failed to validate access to repository"));
    }

    #[test]
    fn rate_limit_detected_from_body_text() {
        let err = classify_http_failure(
            "/repositories",
            400,
            r#"{"error":"Rate limit exceeded"}"#,
            Some(42),
        );
        assert!(matches!(
            err,
            GatewayError::RateLimited {
                retry_after_secs: Some(42),
                ..
            }
        ));
        assert!(err.allows_stale_read());
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        assert_eq!(remote_error_message(r#"{"error":"nope"}"#), "nope");
        assert_eq!(
            remote_error_message(r#"{"error":{"message":"nested"}}"#),
            "nested"
        );
        assert_eq!(remote_error_message("  plain text  "), "plain text");
        assert_eq!(remote_error_message(""), "empty response body");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(600);
        let message = remote_error_message(&body);
        assert!(message.ends_with("..."));
        assert_eq!(message.chars().count(), 503);
    }

    #[test]
    fn conflict_is_not_a_stale_read_candidate() {
        let err = classify_http_failure("/agents/a1/followup", 409, "", None);
        assert!(!err.allows_stale_read());
        assert!(err.to_string().contains("expired or deleted"));
    }

    #[test]
    fn rate_limit_text_only_counts_for_bad_request_and_server_errors() {
        let body = r#"{"error":"rate limit exceeded upstream"}"#;
        assert_eq!(
            classify_http_failure("/agents/a1", 404, body, None).kind(),
            GatewayErrorKind::NotFound
        );
        assert_eq!(
            classify_http_failure("/agents/a1/followup", 409, body, None).kind(),
            GatewayErrorKind::Conflict
        );
        assert_eq!(
            classify_http_failure("/agents/a1", 403, body, None).kind(),
            GatewayErrorKind::Access
        );
        assert_eq!(
            classify_http_failure("/repositories", 503, body, None).kind(),
            GatewayErrorKind::RateLimited
        );
    }
}
