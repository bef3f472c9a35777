use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use crate::common::*;

fn shopper(state: &AppState, points: i64) -> (User, String, Script) {
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "1001");
    set_balance(&conn, &user.id, points);
    let token = create_session_token(&conn, &user.id);
    let script = create_test_script(&conn, "Fancy HUD", "fancy_hud", 300);
    (user, token, script)
}

#[tokio::test]
async fn test_catalog_is_public() {
    let state = create_test_app_state();
    let script = {
        let conn = state.db.get().unwrap();
        create_test_script(&conn, "Fancy HUD", "fancy_hud", 300)
    };

    let list = app(state.clone())
        .oneshot(json_request("GET", "/scripts", None, None))
        .await
        .unwrap();
    assert_eq!(list.status(), StatusCode::OK);
    assert_eq!(read_json(list).await.as_array().unwrap().len(), 1);

    let one = app(state.clone())
        .oneshot(json_request("GET", &format!("/scripts/{}", script.id), None, None))
        .await
        .unwrap();
    assert_eq!(read_json(one).await["resourceName"], "fancy_hud");

    let missing = app(state)
        .oneshot(json_request("GET", "/scripts/nope", None, None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cart_add_and_remove() {
    let state = create_test_app_state();
    let (_, token, script) = shopper(&state, 0);
    let add = json!({ "scriptId": script.id });

    let added = app(state.clone())
        .oneshot(json_request("POST", "/cart/items", Some(&token), Some(add.clone())))
        .await
        .unwrap();
    assert_eq!(added.status(), StatusCode::CREATED);
    let cart = read_json(added).await;
    assert_eq!(cart["total"], 300);
    assert_eq!(cart["items"][0]["name"], "Fancy HUD");

    let duplicate = app(state.clone())
        .oneshot(json_request("POST", "/cart/items", Some(&token), Some(add)))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let unknown = app(state.clone())
        .oneshot(json_request("POST", "/cart/items", Some(&token), Some(json!({ "scriptId": "nope" }))))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let removed = app(state.clone())
        .oneshot(json_request("DELETE", &format!("/cart/items/{}", script.id), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::OK);

    let again = app(state)
        .oneshot(json_request("DELETE", &format!("/cart/items/{}", script.id), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_with_insufficient_points() {
    let state = create_test_app_state();
    let (user, token, script) = shopper(&state, 100);
    {
        let conn = state.db.get().unwrap();
        add_to_cart(&conn, &user.id, &script.id);
    }

    let response = app(state)
        .oneshot(json_request("POST", "/cart/checkout", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["code"], "insufficient_points");
    assert_eq!(json["required"], 300);
    assert_eq!(json["current"], 100);
}

#[tokio::test]
async fn test_checkout_then_bind_and_verify() {
    let state = create_test_app_state();
    let (user, token, script) = shopper(&state, 500);
    {
        let conn = state.db.get().unwrap();
        add_to_cart(&conn, &user.id, &script.id);
    }

    let checkout = app(state.clone())
        .oneshot(json_request("POST", "/cart/checkout", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(checkout.status(), StatusCode::OK);
    let receipt = read_json(checkout).await;
    assert_eq!(receipt["remainingPoints"], 200);
    assert_eq!(receipt["totalCost"], 300);
    assert_eq!(receipt["purchases"][0]["resourceName"], "fancy_hud");
    let purchase_id = receipt["purchases"][0]["id"].as_str().unwrap().to_string();
    let license_key = receipt["purchases"][0]["license"].as_str().unwrap().to_string();

    let purchases = app(state.clone())
        .oneshot(json_request("GET", "/purchases", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(read_json(purchases).await.as_array().unwrap().len(), 1);

    let bind = app(state.clone())
        .oneshot(json_request(
            "POST",
            &format!("/purchases/{}/server-address", purchase_id),
            Some(&token),
            Some(json!({ "serverAddress": "203.0.113.10" })),
        ))
        .await
        .unwrap();
    assert_eq!(bind.status(), StatusCode::OK);
    assert_eq!(read_json(bind).await["boundServerAddress"], "203.0.113.10");

    let rebind = app(state.clone())
        .oneshot(json_request(
            "POST",
            &format!("/purchases/{}/server-address", purchase_id),
            Some(&token),
            Some(json!({ "serverAddress": "203.0.113.11" })),
        ))
        .await
        .unwrap();
    assert_eq!(rebind.status(), StatusCode::CONFLICT);

    let verify = |address: &str| {
        json_request(
            "POST",
            "/licenses/verify",
            None,
            Some(json!({
                "licenseKey": license_key,
                "resourceName": "fancy_hud",
                "serverAddress": address,
            })),
        )
    };

    let ok = app(state.clone()).oneshot(verify("203.0.113.10")).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let json = read_json(ok).await;
    assert_eq!(json["valid"], true);
    assert_eq!(json["user"], user.username);

    let foreign = app(state).oneshot(verify("198.51.100.1")).await.unwrap();
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_purchase_detail_is_owner_only() {
    let state = create_test_app_state();
    let (user, _, script) = shopper(&state, 300);
    let (license_id, stranger_token) = {
        let mut conn = state.db.get().unwrap();
        add_to_cart(&conn, &user.id, &script.id);
        let receipt = scriptshop::db::ledger::checkout_cart(&mut conn, &user.id, now()).unwrap();
        let stranger = create_test_user(&conn, "2002");
        (receipt.licenses[0].id.clone(), create_session_token(&conn, &stranger.id))
    };

    let response = app(state)
        .oneshot(json_request("GET", &format!("/purchases/{}", license_id), Some(&stranger_token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_purchase_lookup_by_key_is_owner_only() {
    let state = create_test_app_state();
    let (user, token, script) = shopper(&state, 300);
    let (license_key, stranger_token) = {
        let mut conn = state.db.get().unwrap();
        add_to_cart(&conn, &user.id, &script.id);
        let receipt = scriptshop::db::ledger::checkout_cart(&mut conn, &user.id, now()).unwrap();
        let stranger = create_test_user(&conn, "2002");
        (receipt.licenses[0].license_key.clone(), create_session_token(&conn, &stranger.id))
    };
    let uri = format!("/purchases/by-key/{}", license_key);

    let response = app(state.clone())
        .oneshot(json_request("GET", &uri, Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["licenseKey"], license_key.as_str());
    assert_eq!(json["resourceName"], "fancy_hud");
    assert_eq!(json["status"], "active");

    let foreign = app(state.clone())
        .oneshot(json_request("GET", &uri, Some(&stranger_token), None))
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let unknown = app(state)
        .oneshot(json_request("GET", "/purchases/by-key/LS-NOPE", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
