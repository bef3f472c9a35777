use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, ToSql, types::Type};

use crate::error::Result;
use crate::models::*;

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

pub const USER_COLS: &str =
    "id, discord_id, username, avatar, points, role, permissions, created_at, updated_at";

pub const SCRIPT_COLS: &str =
    "id, name, resource_name, price, description, created_at, updated_at";

pub const FUNDING_INTENT_COLS: &str = "id, user_id, method, status, amount, requested_amount, points_to_credit, reference, created_at, expires_at, resolved_at, approver_id, review_note, evidence_url";

pub const LICENSE_COLS: &str = "id, user_id, script_id, license_key, price_paid, bound_server_address, status, created_at, updated_at";

/// License columns qualified with the `l` alias, followed by the script's name and resource.
pub const LICENSE_WITH_SCRIPT_COLS: &str = "l.id, l.user_id, l.script_id, l.license_key, l.price_paid, l.bound_server_address, l.status, l.created_at, l.updated_at, s.name, s.resource_name";

pub const POINT_ENTRY_COLS: &str =
    "id, user_id, delta, balance_after, reason, intent_id, actor_id, created_at";

pub const CART_ITEM_COLS: &str = "c.script_id, s.name, s.resource_name, s.price, c.added_at";

pub const AUDIT_LOG_COLS: &str =
    "id, timestamp, actor_id, action, resource_type, resource_id, details, ip_address, user_agent";

/// Parse a text column into a strum enum.
fn parse_enum<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            discord_id: row.get(1)?,
            username: row.get(2)?,
            avatar: row.get(3)?,
            points: row.get(4)?,
            role: parse_enum(row, 5)?,
            permissions: parse_json(row, 6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for Script {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Script {
            id: row.get(0)?,
            name: row.get(1)?,
            resource_name: row.get(2)?,
            price: row.get(3)?,
            description: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for FundingIntent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(FundingIntent {
            id: row.get(0)?,
            user_id: row.get(1)?,
            method: parse_enum(row, 2)?,
            status: parse_enum(row, 3)?,
            amount: row.get(4)?,
            requested_amount: row.get(5)?,
            points_to_credit: row.get(6)?,
            reference: row.get(7)?,
            created_at: row.get(8)?,
            expires_at: row.get(9)?,
            resolved_at: row.get(10)?,
            approver_id: row.get(11)?,
            review_note: row.get(12)?,
            evidence_url: row.get(13)?,
        })
    }
}

impl FromRow for LicenseGrant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseGrant {
            id: row.get(0)?,
            user_id: row.get(1)?,
            script_id: row.get(2)?,
            license_key: row.get(3)?,
            price_paid: row.get(4)?,
            bound_server_address: row.get(5)?,
            status: parse_enum(row, 6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for LicenseWithScript {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseWithScript {
            license: LicenseGrant::from_row(row)?,
            script_name: row.get(9)?,
            resource_name: row.get(10)?,
        })
    }
}

impl FromRow for PointEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PointEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            delta: row.get(2)?,
            balance_after: row.get(3)?,
            reason: parse_enum(row, 4)?,
            intent_id: row.get(5)?,
            actor_id: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for CartItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CartItem {
            script_id: row.get(0)?,
            name: row.get(1)?,
            resource_name: row.get(2)?,
            price: row.get(3)?,
            added_at: row.get(4)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(6)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_id: row.get(2)?,
            action: parse_enum(row, 3)?,
            resource_type: row.get(4)?,
            resource_id: row.get(5)?,
            details: details.and_then(|d| serde_json::from_str(&d).ok()),
            ip_address: row.get(7)?,
            user_agent: row.get(8)?,
        })
    }
}

pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Option<T>> {
    Ok(conn.query_row(sql, params, T::from_row).optional()?)
}

pub fn query_all<T: FromRow>(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, T::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}
