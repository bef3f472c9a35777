use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::models::Script;

pub async fn list_scripts(State(state): State<AppState>) -> Result<Json<Vec<Script>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_scripts(&conn)?))
}

pub async fn get_script(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Script>> {
    let conn = state.db.get()?;
    let script = queries::get_script_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Script not found".into()))?;
    Ok(Json(script))
}
