//! Shared utility functions.

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{AuditAction, AuditLog};

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Fluent builder for audit log entries written by administrative handlers.
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    ip_address: Option<String>,
    user_agent: Option<String>,
    actor_id: Option<&'a str>,
    action: Option<AuditAction>,
    resource: Option<(&'a str, &'a str)>,
    details: Option<serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    pub fn new(conn: &'a Connection, enabled: bool, headers: &HeaderMap) -> Self {
        let (ip_address, user_agent) = extract_request_info(headers);
        Self {
            conn,
            enabled,
            ip_address,
            user_agent,
            actor_id: None,
            action: None,
            resource: None,
            details: None,
        }
    }

    pub fn actor(mut self, actor_id: &'a str) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn resource(mut self, resource_type: &'a str, resource_id: &'a str) -> Self {
        self.resource = Some((resource_type, resource_id));
        self
    }

    pub fn details(mut self, details: &serde_json::Value) -> Self {
        self.details = Some(details.clone());
        self
    }

    pub fn save(self) -> Result<AuditLog> {
        let action = self.action.ok_or_else(|| {
            crate::error::AppError::Internal("Audit log entry without action".into())
        })?;
        let (resource_type, resource_id) = self.resource.unwrap_or(("system", ""));
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_id,
            action,
            resource_type,
            resource_id,
            self.details.as_ref(),
            self.ip_address.as_deref(),
            self.user_agent.as_deref(),
        )
    }
}
