use axum::extract::{Extension, State};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::middleware::AuthContext;
use crate::models::{PointEntry, User};

const RECENT_ENTRIES: i64 = 20;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub is_admin: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    pub points: i64,
    pub recent_entries: Vec<PointEntry>,
}

pub async fn get_me(Extension(ctx): Extension<AuthContext>) -> Json<MeResponse> {
    let is_admin = ctx.user.is_admin();
    Json(MeResponse {
        user: ctx.user,
        is_admin,
    })
}

pub async fn get_points(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<PointsResponse>> {
    let conn = state.db.get()?;
    // Re-read: the balance on the session user may be stale.
    let points = queries::get_user_points(&conn, &ctx.user.id)?.unwrap_or(0);
    let recent_entries = queries::list_point_entries_for_user(&conn, &ctx.user.id, RECENT_ENTRIES)?;
    Ok(Json(PointsResponse {
        points,
        recent_entries,
    }))
}
