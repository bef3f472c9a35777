use chrono::Utc;
use rusqlite::{Connection, params, types::Value};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    AUDIT_LOG_COLS, CART_ITEM_COLS, FUNDING_INTENT_COLS, LICENSE_COLS, LICENSE_WITH_SCRIPT_COLS,
    POINT_ENTRY_COLS, SCRIPT_COLS, USER_COLS, query_all, query_one,
};

pub(crate) fn now() -> i64 {
    Utc::now().timestamp()
}

pub(crate) fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Hash a session token for storage/lookup. Raw tokens never touch the database.
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"scriptshop-session-v1:");
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builder for dynamic UPDATE statements with optional fields.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value (including NULL).
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ Users ============

/// Create the user on first login, or refresh their Discord profile on later ones.
pub fn upsert_user_from_discord(conn: &Connection, profile: &DiscordProfile) -> Result<User> {
    let now = now();
    conn.execute(
        "INSERT INTO users (id, discord_id, username, avatar, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(discord_id) DO UPDATE SET
            username = excluded.username,
            avatar = excluded.avatar,
            updated_at = excluded.updated_at",
        params![gen_id(), &profile.discord_id, &profile.username, &profile.avatar, now],
    )?;
    get_user_by_discord_id(conn, &profile.discord_id)?
        .ok_or_else(|| AppError::Internal("Failed to load upserted user".into()))
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_discord_id(conn: &Connection, discord_id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE discord_id = ?1", USER_COLS),
        &[&discord_id],
    )
}

pub fn get_user_points(conn: &Connection, id: &str) -> Result<Option<i64>> {
    use rusqlite::OptionalExtension;
    Ok(conn
        .query_row("SELECT points FROM users WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?)
}

pub fn list_users_paginated(
    conn: &Connection,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<User>, i64)> {
    let pattern = search.map(|s| format!("%{}%", s));
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE ?1 IS NULL OR username LIKE ?1 OR discord_id LIKE ?1",
        params![pattern],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM users
             WHERE ?1 IS NULL OR username LIKE ?1 OR discord_id LIKE ?1
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            USER_COLS
        ),
        params![pattern, limit, offset],
    )?;
    Ok((items, total))
}

pub fn update_user_roles(
    conn: &Connection,
    id: &str,
    role: Role,
    permissions: &[Permission],
) -> Result<bool> {
    let permissions = serde_json::to_string(permissions)
        .map_err(|e| AppError::Internal(format!("Failed to encode permissions: {}", e)))?;
    UpdateBuilder::new("users", id)
        .with_updated_at()
        .set("role", role.as_ref().to_string())
        .set("permissions", permissions)
        .execute(conn)
}

// ============ Sessions ============

/// Issue a session token for a user. Returns the raw token; only its hash is stored.
pub fn create_session(conn: &Connection, user_id: &str, ttl_secs: i64) -> Result<String> {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let now = now();

    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![hash_token(&token), user_id, now, now + ttl_secs],
    )?;
    Ok(token)
}

pub fn get_user_by_session_token(conn: &Connection, token: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM users WHERE id = (
                SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2
             )",
            USER_COLS
        ),
        params![hash_token(token), now()],
    )
}

pub fn purge_expired_sessions(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now()])?)
}

// ============ Scripts ============

pub fn create_script(conn: &Connection, input: &CreateScript) -> Result<Script> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO scripts (id, name, resource_name, price, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            &id,
            input.name.trim(),
            input.resource_name.trim(),
            input.price,
            &input.description,
            now
        ],
    )?;
    Ok(Script {
        id,
        name: input.name.trim().to_string(),
        resource_name: input.resource_name.trim().to_string(),
        price: input.price,
        description: input.description.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_script_by_id(conn: &Connection, id: &str) -> Result<Option<Script>> {
    query_one(
        conn,
        &format!("SELECT {} FROM scripts WHERE id = ?1", SCRIPT_COLS),
        &[&id],
    )
}

pub fn list_scripts(conn: &Connection) -> Result<Vec<Script>> {
    query_all(
        conn,
        &format!("SELECT {} FROM scripts ORDER BY name ASC", SCRIPT_COLS),
        &[],
    )
}

pub fn update_script(conn: &Connection, id: &str, input: &UpdateScript) -> Result<bool> {
    UpdateBuilder::new("scripts", id)
        .with_updated_at()
        .set_opt("name", input.name.as_deref().map(|s| s.trim().to_string()))
        .set_opt(
            "resource_name",
            input.resource_name.as_deref().map(|s| s.trim().to_string()),
        )
        .set_opt("price", input.price)
        .set_opt("description", input.description.clone())
        .execute(conn)
}

// ============ Cart ============

/// Returns false when the script was already in the cart.
pub fn add_cart_item(conn: &Connection, user_id: &str, script_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO cart_items (user_id, script_id, added_at) VALUES (?1, ?2, ?3)",
        params![user_id, script_id, now()],
    )?;
    Ok(affected > 0)
}

pub fn remove_cart_item(conn: &Connection, user_id: &str, script_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM cart_items WHERE user_id = ?1 AND script_id = ?2",
        params![user_id, script_id],
    )?;
    Ok(affected > 0)
}

/// Cart contents joined with current script prices, oldest first.
pub fn list_cart_items(conn: &Connection, user_id: &str) -> Result<Vec<CartItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM cart_items c JOIN scripts s ON s.id = c.script_id
             WHERE c.user_id = ?1 ORDER BY c.added_at ASC, s.name ASC",
            CART_ITEM_COLS
        ),
        &[&user_id],
    )
}

// ============ Funding Intents ============

pub fn create_funding_intent(
    conn: &Connection,
    input: &CreateFundingIntent<'_>,
    now: i64,
) -> Result<FundingIntent> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO funding_intents (id, user_id, method, status, amount, requested_amount, points_to_credit, reference, created_at, expires_at, evidence_url)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &id,
            input.user_id,
            input.method.as_ref(),
            input.amount,
            input.requested_amount,
            input.points_to_credit,
            input.reference,
            now,
            input.expires_at,
            input.evidence_url
        ],
    )?;

    Ok(FundingIntent {
        id,
        user_id: input.user_id.to_string(),
        method: input.method,
        status: FundingStatus::Pending,
        amount: input.amount,
        requested_amount: input.requested_amount,
        points_to_credit: input.points_to_credit,
        reference: input.reference.to_string(),
        created_at: now,
        expires_at: input.expires_at,
        resolved_at: None,
        approver_id: None,
        review_note: None,
        evidence_url: input.evidence_url.map(String::from),
    })
}

pub fn get_funding_intent_by_id(conn: &Connection, id: &str) -> Result<Option<FundingIntent>> {
    query_one(
        conn,
        &format!("SELECT {} FROM funding_intents WHERE id = ?1", FUNDING_INTENT_COLS),
        &[&id],
    )
}

pub fn get_funding_intent_by_reference(
    conn: &Connection,
    reference: &str,
) -> Result<Option<FundingIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM funding_intents WHERE reference = ?1",
            FUNDING_INTENT_COLS
        ),
        &[&reference],
    )
}

/// Whether an unexpired pending intent already asks for exactly this amount.
pub fn pending_amount_in_use(conn: &Connection, amount: i64, now: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM funding_intents
         WHERE amount = ?1 AND status = 'pending' AND (expires_at IS NULL OR expires_at >= ?2)",
        params![amount, now],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_funding_intents_for_user(
    conn: &Connection,
    user_id: &str,
    method: Option<FundingMethod>,
    limit: i64,
) -> Result<Vec<FundingIntent>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM funding_intents
             WHERE user_id = ?1 AND (?2 IS NULL OR method = ?2)
             ORDER BY created_at DESC LIMIT ?3",
            FUNDING_INTENT_COLS
        ),
        params![user_id, method.map(|m| m.as_ref().to_string()), limit],
    )
}

pub fn list_funding_intents_paginated(
    conn: &Connection,
    method: Option<FundingMethod>,
    status: Option<FundingStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<FundingIntent>, i64)> {
    let method = method.map(|m| m.as_ref().to_string());
    let status = status.map(|s| s.as_ref().to_string());
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM funding_intents
         WHERE (?1 IS NULL OR method = ?1) AND (?2 IS NULL OR status = ?2)",
        params![method, status],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM funding_intents
             WHERE (?1 IS NULL OR method = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
            FUNDING_INTENT_COLS
        ),
        params![method, status, limit, offset],
    )?;
    Ok((items, total))
}

/// Move every pending intent whose deadline has passed to `expired`, returning the
/// rows that this call transitioned.
pub fn expire_stale_intents(conn: &Connection, now: i64) -> Result<Vec<FundingIntent>> {
    query_all(
        conn,
        &format!(
            "UPDATE funding_intents SET status = 'expired', resolved_at = ?1
             WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at < ?1
             RETURNING {}",
            FUNDING_INTENT_COLS
        ),
        params![now],
    )
}

// ============ Point Entries ============

pub fn list_point_entries_for_user(
    conn: &Connection,
    user_id: &str,
    limit: i64,
) -> Result<Vec<PointEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM point_entries WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            POINT_ENTRY_COLS
        ),
        params![user_id, limit],
    )
}

pub fn get_point_entry_for_intent(conn: &Connection, intent_id: &str) -> Result<Option<PointEntry>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM point_entries WHERE intent_id = ?1",
            POINT_ENTRY_COLS
        ),
        &[&intent_id],
    )
}

// ============ Licenses ============

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<LicenseGrant>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&id],
    )
}

pub fn get_license_with_script(conn: &Connection, id: &str) -> Result<Option<LicenseWithScript>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses l JOIN scripts s ON s.id = l.script_id WHERE l.id = ?1",
            LICENSE_WITH_SCRIPT_COLS
        ),
        &[&id],
    )
}

pub fn get_license_with_script_by_key(
    conn: &Connection,
    license_key: &str,
) -> Result<Option<LicenseWithScript>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses l JOIN scripts s ON s.id = l.script_id
             WHERE l.license_key = ?1",
            LICENSE_WITH_SCRIPT_COLS
        ),
        &[&license_key],
    )
}

pub fn list_licenses_for_user(conn: &Connection, user_id: &str) -> Result<Vec<LicenseWithScript>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses l JOIN scripts s ON s.id = l.script_id
             WHERE l.user_id = ?1 ORDER BY l.created_at DESC",
            LICENSE_WITH_SCRIPT_COLS
        ),
        &[&user_id],
    )
}

pub fn list_licenses_paginated(
    conn: &Connection,
    user_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<LicenseWithScript>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM licenses WHERE ?1 IS NULL OR user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses l JOIN scripts s ON s.id = l.script_id
             WHERE ?1 IS NULL OR l.user_id = ?1
             ORDER BY l.created_at DESC LIMIT ?2 OFFSET ?3",
            LICENSE_WITH_SCRIPT_COLS
        ),
        params![user_id, limit, offset],
    )?;
    Ok((items, total))
}

/// Atomically bind an unbound license to a server address.
///
/// Returns false if the license already carries a binding, leaving the
/// existing one untouched.
pub fn try_bind_license(conn: &Connection, id: &str, server_address: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET bound_server_address = ?1, updated_at = ?2
         WHERE id = ?3 AND bound_server_address IS NULL",
        params![server_address, now(), id],
    )?;
    Ok(affected > 0)
}

pub fn update_license(conn: &Connection, id: &str, input: &UpdateLicense) -> Result<bool> {
    let mut builder = UpdateBuilder::new("licenses", id)
        .with_updated_at()
        .set_opt("status", input.status.map(|s| s.as_ref().to_string()));
    if let Some(address) = &input.bound_server_address {
        builder = builder.set_nullable("bound_server_address", address.clone());
    }
    builder.execute(conn)
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_id: Option<&str>,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<AuditLog> {
    let id = gen_id();
    let timestamp = now();

    if enabled {
        conn.execute(
            "INSERT INTO audit_logs (id, timestamp, actor_id, action, resource_type, resource_id, details, ip_address, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &id,
                timestamp,
                actor_id,
                action.as_ref(),
                resource_type,
                resource_id,
                details.map(|d| d.to_string()),
                ip_address,
                user_agent
            ],
        )?;
    }

    Ok(AuditLog {
        id,
        timestamp,
        actor_id: actor_id.map(String::from),
        action,
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        details: details.cloned(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    })
}

pub fn list_audit_logs_for_resource(
    conn: &Connection,
    resource_type: &str,
    resource_id: &str,
) -> Result<Vec<AuditLog>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_logs WHERE resource_type = ?1 AND resource_id = ?2
             ORDER BY timestamp DESC",
            AUDIT_LOG_COLS
        ),
        &[&resource_type, &resource_id],
    )
}

/// Delete audit logs older than the retention window. Returns the number of deleted records.
pub fn purge_old_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM audit_logs WHERE timestamp < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
