use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use crate::common::*;

fn admin_with(state: &AppState, discord_id: &str, role: Role, permissions: &[Permission]) -> (User, String) {
    let conn = state.db.get().unwrap();
    let admin = create_test_admin(&conn, discord_id, role, permissions);
    let token = create_session_token(&conn, &admin.id);
    (admin, token)
}

#[tokio::test]
async fn test_set_points_is_audited() {
    let state = create_test_app_state();
    let (admin, token) = admin_with(&state, "9001", Role::Admin, &[Permission::ManagePoints]);
    let user = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "1001");
        set_balance(&conn, &user.id, 40);
        user
    };

    let response = app(state.clone())
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{}/points", user.id),
            Some(&token),
            Some(json!({ "points": 500 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["points"], 500);
    assert_eq!(json["previous"], 40);

    {
        let audit = state.audit.get().unwrap();
        let logs = queries::list_audit_logs_for_resource(&audit, "user", &user.id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, AuditAction::SetPoints);
        assert_eq!(logs[0].actor_id.as_deref(), Some(admin.id.as_str()));
    }

    let negative = app(state)
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{}/points", user.id),
            Some(&token),
            Some(json!({ "points": -1 })),
        ))
        .await
        .unwrap();
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_cannot_grant_superadmin() {
    let state = create_test_app_state();
    let (_, token) = admin_with(&state, "9001", Role::Admin, &[Permission::ManageUsers]);
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "1001")
    };

    let response = app(state)
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{}", user.id),
            Some(&token),
            Some(json!({ "role": "superadmin" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_update_normalizes_permissions() {
    let state = create_test_app_state();
    let (_, token) = admin_with(&state, "9001", Role::Superadmin, &[]);
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "1001")
    };

    let response = app(state.clone())
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{}", user.id),
            Some(&token),
            Some(json!({
                "role": "admin",
                "permissions": ["manage_scripts", "manage_scripts", "manage_points"],
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["role"], "admin");
    assert_eq!(json["permissions"], json!(["manage_points", "manage_scripts"]));

    let demoted = app(state)
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{}", user.id),
            Some(&token),
            Some(json!({ "role": "user", "permissions": ["manage_points"] })),
        ))
        .await
        .unwrap();
    assert_eq!(read_json(demoted).await["permissions"], json!([]));
}

#[tokio::test]
async fn test_admin_user_detail_and_search() {
    let state = create_test_app_state();
    let (_, token) = admin_with(&state, "9001", Role::Admin, &[Permission::ManageUsers]);
    let user = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "1001");
        create_test_qr_intent(&conn, &user.id, "10", now());
        user
    };

    let search = app(state.clone())
        .oneshot(json_request("GET", "/admin/users?search=player-1001", Some(&token), None))
        .await
        .unwrap();
    let search = read_json(search).await;
    assert_eq!(search["total"], 1);
    assert_eq!(search["items"][0]["id"], user.id);

    let detail = app(state.clone())
        .oneshot(json_request("GET", &format!("/admin/users/{}", user.id), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(detail.status(), StatusCode::OK);
    let detail = read_json(detail).await;
    assert_eq!(detail["fundingIntents"].as_array().unwrap().len(), 1);

    let missing = app(state)
        .oneshot(json_request("GET", "/admin/users/nope", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_revokes_and_rebinds_purchase() {
    let state = create_test_app_state();
    let (_, token) = admin_with(&state, "9001", Role::Admin, &[Permission::ManagePurchases]);
    let license_id = {
        let mut conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "1001");
        let script = create_test_script(&conn, "Garage", "garage", 50);
        set_balance(&conn, &user.id, 50);
        add_to_cart(&conn, &user.id, &script.id);
        let receipt = scriptshop::db::ledger::checkout_cart(&mut conn, &user.id, now()).unwrap();
        queries::try_bind_license(&conn, &receipt.licenses[0].id, "10.0.0.5").unwrap();
        receipt.licenses[0].id.clone()
    };
    let uri = format!("/admin/purchases/{}", license_id);

    let rebind = app(state.clone())
        .oneshot(json_request("PUT", &uri, Some(&token), Some(json!({ "boundServerAddress": "10.0.0.9" }))))
        .await
        .unwrap();
    assert_eq!(rebind.status(), StatusCode::OK);
    assert_eq!(read_json(rebind).await["boundServerAddress"], "10.0.0.9");

    let invalid = app(state.clone())
        .oneshot(json_request("PUT", &uri, Some(&token), Some(json!({ "boundServerAddress": "nope" }))))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let revoke = app(state.clone())
        .oneshot(json_request("PUT", &uri, Some(&token), Some(json!({ "status": "revoked", "boundServerAddress": null }))))
        .await
        .unwrap();
    assert_eq!(revoke.status(), StatusCode::OK);
    let json = read_json(revoke).await;
    assert_eq!(json["status"], "revoked");
    assert!(json["boundServerAddress"].is_null());

    let listed = app(state)
        .oneshot(json_request("GET", "/admin/purchases", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(read_json(listed).await["total"], 1);
}

#[tokio::test]
async fn test_script_management() {
    let state = create_test_app_state();
    let (_, token) = admin_with(&state, "9001", Role::Admin, &[Permission::ManageScripts]);

    let created = app(state.clone())
        .oneshot(json_request(
            "POST",
            "/admin/scripts",
            Some(&token),
            Some(json!({ "name": "Garage", "resourceName": "garage", "price": 150 })),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let script = read_json(created).await;
    let id = script["id"].as_str().unwrap();

    let updated = app(state.clone())
        .oneshot(json_request(
            "PUT",
            &format!("/admin/scripts/{}", id),
            Some(&token),
            Some(json!({ "price": 175 })),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(read_json(updated).await["price"], 175);

    let invalid = app(state)
        .oneshot(json_request(
            "POST",
            "/admin/scripts",
            Some(&token),
            Some(json!({ "name": " ", "resourceName": "garage", "price": 150 })),
        ))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_payments_listing_filters() {
    let state = create_test_app_state();
    let (_, token) = admin_with(&state, "9001", Role::Admin, &[Permission::ManagePoints]);
    {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "1001");
        create_test_qr_intent(&conn, &user.id, "10", now());
        create_test_qr_intent(&conn, &user.id, "10", now() - 20 * 60);
        create_test_slip_intent(&conn, &user.id, "10");
    }

    let all = app(state.clone())
        .oneshot(json_request("GET", "/admin/payments", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(read_json(all).await["total"], 3);

    // Listing sweeps stale intents first.
    let expired = app(state.clone())
        .oneshot(json_request("GET", "/admin/payments?method=qr&status=expired", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(read_json(expired).await["total"], 1);

    let paged = app(state)
        .oneshot(json_request("GET", "/admin/payments?limit=2&offset=0", Some(&token), None))
        .await
        .unwrap();
    let paged = read_json(paged).await;
    assert_eq!(paged["items"].as_array().unwrap().len(), 2);
    assert_eq!(paged["total"], 3);
}
