use axum::http::StatusCode;
use tower::ServiceExt;

use crate::common::*;

#[tokio::test]
async fn test_health_is_public() {
    let app = app(create_test_app_state());
    let response = app.oneshot(json_request("GET", "/health", None, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_missing_token_returns_401() {
    let app = app(create_test_app_state());
    let response = app.oneshot(json_request("GET", "/me", None, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = read_json(response).await;
    assert_eq!(json["code"], "unauthorized");
}

#[tokio::test]
async fn test_invalid_token_returns_401() {
    let app = app(create_test_app_state());
    let response = app
        .oneshot(json_request("GET", "/cart", Some("not-a-real-token"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_session_returns_401() {
    let state = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "1001");
        queries::create_session(&conn, &user.id, -1).unwrap()
    };

    let response = app(state)
        .oneshot(json_request("GET", "/me", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_the_caller() {
    let state = create_test_app_state();
    let (user, token) = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "1001");
        let token = create_session_token(&conn, &user.id);
        (user, token)
    };

    let response = app(state)
        .oneshot(json_request("GET", "/me", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    assert_eq!(json["id"], user.id);
    assert_eq!(json["discordId"], "1001");
    assert_eq!(json["isAdmin"], false);
    assert_eq!(json["points"], 0);
}

#[tokio::test]
async fn test_plain_user_is_forbidden_from_admin_routes() {
    let state = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "1001");
        create_session_token(&conn, &user.id)
    };

    for uri in ["/admin/users", "/admin/topups", "/admin/payments", "/admin/purchases"] {
        let response = app(state.clone())
            .oneshot(json_request("GET", uri, Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }
}

#[tokio::test]
async fn test_admin_permissions_are_per_area() {
    let state = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let admin = create_test_admin(&conn, "9001", Role::Admin, &[Permission::ManagePoints]);
        create_session_token(&conn, &admin.id)
    };

    let allowed = app(state.clone())
        .oneshot(json_request("GET", "/admin/topups", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let denied = app(state.clone())
        .oneshot(json_request("GET", "/admin/users", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    let json = read_json(denied).await;
    assert_eq!(json["code"], "forbidden");
}

#[tokio::test]
async fn test_superadmin_holds_every_permission() {
    let state = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let admin = create_test_admin(&conn, "9001", Role::Superadmin, &[]);
        create_session_token(&conn, &admin.id)
    };

    for uri in ["/admin/users", "/admin/topups", "/admin/payments", "/admin/purchases"] {
        let response = app(state.clone())
            .oneshot(json_request("GET", uri, Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn test_slip_images_require_manage_points() {
    let state = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "1001");
        create_session_token(&conn, &user.id)
    };

    let anonymous = app(state.clone())
        .oneshot(json_request("GET", "/uploads/slips/slip-test.png", None, None))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let user = app(state)
        .oneshot(json_request("GET", "/uploads/slips/slip-test.png", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(user.status(), StatusCode::FORBIDDEN);
}
