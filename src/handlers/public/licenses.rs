use axum::extract::State;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::licensing::{self, VerifiedLicense};
use crate::models::VerifyLicenseRequest;

/// Called by game servers when a purchased script starts.
pub async fn verify_license(
    State(state): State<AppState>,
    Json(request): Json<VerifyLicenseRequest>,
) -> Result<Json<VerifiedLicense>> {
    let conn = state.db.get()?;
    let verified = licensing::verify_license(&conn, &state.events, &request)?;
    Ok(Json(verified))
}
