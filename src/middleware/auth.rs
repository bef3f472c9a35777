use std::future::Future;
use std::pin::Pin;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{Permission, User};
use crate::util::extract_bearer_token;

/// What a route group demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Authenticated,
    Admin,
    Permission(Permission),
}

impl Capability {
    pub fn permits(self, user: &User) -> bool {
        match self {
            Capability::Authenticated => true,
            Capability::Admin => user.is_admin(),
            Capability::Permission(p) => user.has_permission(p),
        }
    }
}

/// The authenticated caller, available to handlers via `Extension<AuthContext>`.
#[derive(Clone)]
pub struct AuthContext {
    pub user: User,
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let token = extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;
    let conn = state.db.get()?;
    queries::get_user_by_session_token(&conn, token)?.ok_or(AppError::Unauthorized)
}

pub async fn authorize(
    State(state): State<AppState>,
    capability: Capability,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = authenticate(&state, request.headers())?;
    if !capability.permits(&user) {
        tracing::debug!(user_id = %user.id, ?capability, "Capability check failed");
        return Err(AppError::Forbidden("Insufficient permissions".into()));
    }
    request.extensions_mut().insert(AuthContext { user });
    Ok(next.run(request).await)
}

type AuthFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

/// Middleware function for `axum::middleware::from_fn_with_state` that
/// requires `capability` on every route of the group.
pub fn require(
    capability: Capability,
) -> impl Fn(State<AppState>, Request, Next) -> AuthFuture + Clone + Send + Sync + 'static {
    move |state, request, next| Box::pin(authorize(state, capability, request, next))
}
