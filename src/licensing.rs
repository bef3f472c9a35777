//! License keys and server-address binding.

use std::net::Ipv4Addr;

use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::models::{LicenseGrant, LicenseStatus, VerifyLicenseRequest};

const KEY_PREFIX: &str = "LS";
const KEY_GROUPS: usize = 4;
const KEY_GROUP_LEN: usize = 4;
// No 0/O/1/I so keys survive being read aloud.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a license key of the form `LS-XXXX-XXXX-XXXX-XXXX`.
pub fn generate_license_key() -> String {
    let mut rng = rand::thread_rng();
    let mut key = String::with_capacity(KEY_PREFIX.len() + KEY_GROUPS * (KEY_GROUP_LEN + 1));
    key.push_str(KEY_PREFIX);
    for _ in 0..KEY_GROUPS {
        key.push('-');
        for _ in 0..KEY_GROUP_LEN {
            let idx = rng.gen_range(0..KEY_ALPHABET.len());
            key.push(KEY_ALPHABET[idx] as char);
        }
    }
    key
}

/// Normalize a server address to dotted-quad IPv4 form.
pub fn validate_server_address(address: &str) -> Result<String> {
    address
        .trim()
        .parse::<Ipv4Addr>()
        .map(|ip| ip.to_string())
        .map_err(|_| AppError::BadRequest("Server address must be an IPv4 address".into()))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedLicense {
    pub valid: bool,
    pub license_id: String,
    pub resource_name: String,
    pub server_address: String,
    /// Username of the license owner.
    pub user: String,
    /// True when this call created the server binding.
    pub newly_bound: bool,
}

fn reject(
    events: &EventBus,
    license: &LicenseGrant,
    server_address: &str,
    reason: &'static str,
) -> AppError {
    tracing::warn!(
        license_id = %license.id,
        server_address = %server_address,
        reason,
        "License verification rejected"
    );
    events.publish(DomainEvent::LicenseRejected {
        license_id: license.id.clone(),
        user_id: license.user_id.clone(),
        server_address: server_address.to_string(),
        reason: reason.to_string(),
    });
    AppError::Forbidden(reason.to_string())
}

/// Check a game server's license at script start-up.
///
/// An unbound license is bound to the caller's address on first use. Once bound,
/// only the bound address verifies.
pub fn verify_license(
    conn: &Connection,
    events: &EventBus,
    request: &VerifyLicenseRequest,
) -> Result<VerifiedLicense> {
    let license_key = request.license_key.trim();
    let resource_name = request.resource_name.trim();
    if license_key.is_empty() || resource_name.is_empty() || request.server_address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "licenseKey, resourceName and serverAddress are required".into(),
        ));
    }
    let server_address = validate_server_address(&request.server_address)?;

    let found = queries::get_license_with_script_by_key(conn, license_key)?
        .filter(|l| l.license.status == LicenseStatus::Active)
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    let license = &found.license;

    if found.resource_name != resource_name {
        return Err(reject(
            events,
            license,
            &server_address,
            "License is not valid for this resource",
        ));
    }

    let newly_bound = match &license.bound_server_address {
        Some(bound) if *bound == server_address => false,
        Some(_) => {
            return Err(reject(
                events,
                license,
                &server_address,
                "License is bound to a different server",
            ));
        }
        None if queries::try_bind_license(conn, &license.id, &server_address)? => {
            events.publish(DomainEvent::LicenseBound {
                license_id: license.id.clone(),
                user_id: license.user_id.clone(),
                server_address: server_address.clone(),
            });
            true
        }
        None => {
            // Lost the race to another first-use call; honor whatever it bound.
            let current = queries::get_license_by_id(conn, &license.id)?
                .ok_or_else(|| AppError::NotFound("License not found".into()))?;
            if current.bound_server_address.as_deref() != Some(server_address.as_str()) {
                return Err(reject(
                    events,
                    license,
                    &server_address,
                    "License is bound to a different server",
                ));
            }
            false
        }
    };

    let user = queries::get_user_by_id(conn, &license.user_id)?
        .map(|u| u.username)
        .unwrap_or_default();

    Ok(VerifiedLicense {
        valid: true,
        license_id: license.id.clone(),
        resource_name: found.resource_name.clone(),
        server_address,
        user,
        newly_bound,
    })
}

/// Owner-initiated binding. Owners may set an address once; changing it
/// afterwards is an administrator action.
pub fn set_owner_server_address(
    conn: &Connection,
    events: &EventBus,
    user_id: &str,
    license_id: &str,
    address: &str,
) -> Result<LicenseGrant> {
    let server_address = validate_server_address(address)?;

    let license = queries::get_license_by_id(conn, license_id)?
        .filter(|l| l.user_id == user_id)
        .ok_or_else(|| AppError::NotFound("Purchase not found".into()))?;

    if license.status != LicenseStatus::Active {
        return Err(AppError::BadRequest("License has been revoked".into()));
    }
    if license.bound_server_address.as_deref() == Some(server_address.as_str()) {
        return Ok(license);
    }
    if !queries::try_bind_license(conn, &license.id, &server_address)? {
        return Err(AppError::Conflict(
            "Server address already set; contact an administrator to change it".into(),
        ));
    }

    events.publish(DomainEvent::LicenseBound {
        license_id: license.id.clone(),
        user_id: license.user_id.clone(),
        server_address: server_address.clone(),
    });

    queries::get_license_by_id(conn, &license.id)?
        .ok_or_else(|| AppError::Internal("License vanished after binding".into()))
}
