use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use roadside_dispatch::api::rest::router;
use roadside_dispatch::realtime::{BusEvent, RoomId};
use roadside_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(50.0, 64));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn empty_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn register_mechanic(app: &axum::Router, capabilities: Value) -> String {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({
                "name": "Ravi Motors",
                "phone": "+91-9000000000",
                "role": "provider",
                "provider": {
                    "categories": ["Mechanic"],
                    "capabilities": capabilities,
                    "shop_location": { "lat": 20.9450, "lng": 77.7620 },
                    "is_online": true,
                    "is_verified": true,
                    "rating": { "average_rating": 4.6, "total_reviews": 12 }
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await["id"].as_str().unwrap().to_string()
}

async fn put_rate(app: &axum::Router, rate: Value) {
    let res = app
        .clone()
        .oneshot(json_request("PUT", "/rates", rate))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

async fn create_flat_tire_request(app: &axum::Router, provider_id: &str, customer_id: &str) -> Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/requests",
            json!({
                "customer_id": customer_id,
                "provider_id": provider_id,
                "category": "Mechanic",
                "services": ["Flat Tire"],
                "location": { "lat": 20.9374, "lng": 77.7796 },
                "estimate": { "base_fee": 300.0, "price_per_km": 10.0, "distance_km": 1.23 },
                "vehicle": { "make": "Maruti", "model": "Swift", "plate_number": "MH27 AB 1234" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    body_json(res).await
}

const CUSTOMER_ID: &str = "11111111-1111-1111-1111-111111111111";

async fn register_customer(app: &axum::Router) {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({ "id": CUSTOMER_ID, "name": "Asha Patil", "role": "customer" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["accounts"], 0);
    assert_eq!(body["requests"], 0);
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_sessions"));
}

#[tokio::test]
async fn provider_without_profile_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({ "name": "Nobody", "role": "provider" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn search_scenario_returns_base_price_estimate() {
    let (app, _state) = setup();
    let provider_id = register_mechanic(&app, json!([{ "name": "Flat Tire", "active": true }])).await;
    put_rate(
        &app,
        json!({
            "service_name": "Flat Tire",
            "base_price": 300.0,
            "price_per_km": 0.0,
            "kind": "service",
            "category": "Mechanic"
        }),
    )
    .await;

    let res = app
        .oneshot(json_request(
            "POST",
            "/providers/search",
            json!({
                "origin": { "lat": 20.9374, "lng": 77.7796 },
                "category": "Mechanic",
                "services": ["Flat Tire"]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["provider"]["id"], provider_id);
    assert_eq!(list[0]["total_estimate"], 300.0);
    assert_eq!(list[0]["provider"]["rating"]["total_reviews"], 12);
}

#[tokio::test]
async fn reregistering_provider_keeps_shop_location() {
    let (app, _state) = setup();
    let provider_id = register_mechanic(&app, json!([{ "name": "Flat Tire", "active": true }])).await;

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({
                "id": provider_id,
                "name": "Ravi Motors & Sons",
                "role": "provider",
                "provider": {
                    "categories": ["Mechanic"],
                    "capabilities": [
                        { "name": "Flat Tire", "active": true },
                        { "name": "Dead Battery", "active": true }
                    ],
                    "shop_location": { "lat": 21.1458, "lng": 79.0882 },
                    "is_online": false,
                    "is_verified": true,
                    "rating": { "average_rating": 5.0, "total_reviews": 999 }
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.clone().oneshot(get_request("/accounts")).await.unwrap();
    let accounts = body_json(res).await;
    let stored = &accounts.as_array().unwrap()[0];
    assert_eq!(stored["name"], "Ravi Motors & Sons");
    assert_eq!(stored["provider"]["shop_location"]["lat"], 20.9450);
    assert_eq!(stored["provider"]["shop_location"]["lng"], 77.7620);
    assert_eq!(stored["provider"]["is_online"], true);
    assert_eq!(stored["provider"]["rating"]["total_reviews"], 12);
    assert_eq!(stored["provider"]["capabilities"].as_array().unwrap().len(), 2);

    let res = app
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({ "id": provider_id, "name": "Ravi", "role": "customer" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_requires_a_registered_customer() {
    let (app, _state) = setup();
    let provider_id = register_mechanic(&app, json!([{ "name": "Flat Tire", "active": true }])).await;

    for (customer_id, expected) in [
        (CUSTOMER_ID, StatusCode::NOT_FOUND),
        (provider_id.as_str(), StatusCode::BAD_REQUEST),
    ] {
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/requests",
                json!({
                    "customer_id": customer_id,
                    "provider_id": provider_id,
                    "category": "Mechanic",
                    "services": ["Flat Tire"],
                    "location": { "lat": 20.9374, "lng": 77.7796 },
                    "estimate": { "base_fee": 300.0, "price_per_km": 10.0, "distance_km": 1.23 }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), expected);
    }

    let res = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(body_json(res).await["requests"], 0);
}

#[tokio::test]
async fn search_for_unpriced_service_returns_422() {
    let (app, _state) = setup();
    let res = app
        .oneshot(json_request(
            "POST",
            "/providers/search",
            json!({
                "origin": { "lat": 20.9374, "lng": 77.7796 },
                "category": "Mechanic",
                "services": ["Engine Swap"]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(res).await;
    assert_eq!(body["kind"], "service_not_configured");
}

#[tokio::test]
async fn get_nonexistent_request_returns_404() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/requests/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_otp_returns_failure_without_state_change() {
    let (app, _state) = setup();
    let provider_id = register_mechanic(&app, json!([{ "name": "Flat Tire", "active": true }])).await;
    register_customer(&app).await;
    let request = create_flat_tire_request(&app, &provider_id, CUSTOMER_ID).await;
    let request_id = request["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/accept"),
            json!({ "provider_id": provider_id }),
        ))
        .await
        .unwrap();
    let accepted = body_json(res).await;
    let code = accepted["service_otp"].as_str().unwrap();
    let wrong = if code == "0000" { "1111" } else { "0000" };

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/verify-otp"),
            json!({ "otp": wrong }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "invalid_otp");

    let res = app
        .oneshot(get_request(&format!("/requests/{request_id}")))
        .await
        .unwrap();
    let stored = body_json(res).await;
    assert_eq!(stored["status"], "Accepted");
    assert_eq!(stored["otp_verified"], false);
}

#[tokio::test]
async fn concurrent_accepts_yield_one_conflict() {
    let (app, _state) = setup();
    let provider_id = register_mechanic(&app, json!([{ "name": "Flat Tire", "active": true }])).await;
    register_customer(&app).await;
    let request = create_flat_tire_request(&app, &provider_id, CUSTOMER_ID).await;
    let uri = format!("/requests/{}/accept", request["id"].as_str().unwrap());

    let (first, second) = tokio::join!(
        app.clone()
            .oneshot(json_request("POST", &uri, json!({ "provider_id": provider_id }))),
        app.clone()
            .oneshot(json_request("POST", &uri, json!({ "provider_id": provider_id }))),
    );

    let mut statuses = vec![first.unwrap().status(), second.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);
}

#[tokio::test]
async fn cancel_after_completion_is_rejected() {
    let (app, _state) = setup();
    let provider_id = register_mechanic(&app, json!([{ "name": "Flat Tire", "active": true }])).await;
    register_customer(&app).await;
    let request = create_flat_tire_request(&app, &provider_id, CUSTOMER_ID).await;
    let request_id = request["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/accept"),
            json!({ "provider_id": provider_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(empty_post(&format!("/requests/{request_id}/complete")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let completed = body_json(res).await;
    assert_eq!(completed["status"], "Completed");
    assert_eq!(completed["pricing"]["total_amount"], 313.0);

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/cancel"),
            json!({ "provider_id": provider_id, "reason": "Too late" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_json(res).await;
    assert_eq!(body["kind"], "state_conflict");
}

#[tokio::test]
async fn full_service_flow() {
    let (app, state) = setup();
    let provider_id = register_mechanic(
        &app,
        json!([
            { "name": "Flat Tire", "active": true },
            { "name": "Dead Battery", "active": true }
        ]),
    )
    .await;

    let (session, mut rx) = state.bus.connect();
    let customer = CUSTOMER_ID.parse().unwrap();
    state.bus.subscribe(&session, RoomId::Account(customer)).unwrap();

    register_customer(&app).await;
    let request = create_flat_tire_request(&app, &provider_id, CUSTOMER_ID).await;
    let request_id = request["id"].as_str().unwrap().to_string();
    assert_eq!(request["status"], "Pending");
    assert_eq!(request["pricing"]["total_amount"], 313.0);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/accept"),
            json!({ "provider_id": provider_id, "assignee_name": "Sunil" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let accepted = body_json(res).await;
    assert_eq!(accepted["status"], "Accepted");
    assert_eq!(accepted["assignee"]["name"], "Sunil");
    let code = accepted["service_otp"].as_str().unwrap().to_string();
    assert!(matches!(rx.try_recv(), Ok(BusEvent::RequestAccepted { .. })));

    for expected_message in ["OTP verified. Service started.", "OTP already verified."] {
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/requests/{request_id}/verify-otp"),
                json!({ "otp": code }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], expected_message);
        assert_eq!(body["request"]["status"], "InProgress");
    }
    assert!(matches!(rx.try_recv(), Ok(BusEvent::OtpVerified { .. })));

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/bill"),
            json!({
                "provider_id": provider_id,
                "items": [
                    { "description": "Tube patch", "amount": 40.0 },
                    { "description": "Valve", "amount": 15.5 }
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let billed = body_json(res).await;
    let total = billed["total_amount"].as_f64().unwrap();
    assert!((total - 367.8).abs() < 1e-9);
    assert_eq!(billed["request"]["bill_sent"], true);
    assert!(matches!(rx.try_recv(), Ok(BusEvent::BillReceived { .. })));

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/payment"),
            json!({ "payment_id": "pay_9f2", "status": "success" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let paid = body_json(res).await;
    assert_eq!(paid["request"]["status"], "Completed");
    assert_eq!(paid["request"]["payment_status"], "paid");

    let res = app
        .oneshot(get_request(&format!("/accounts/{CUSTOMER_ID}/requests")))
        .await
        .unwrap();
    let history = body_json(res).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["id"], request_id);
}

#[tokio::test]
async fn announcement_reaches_connected_sessions() {
    let (app, state) = setup();
    let (_session, mut rx) = state.bus.connect();

    let res = app
        .oneshot(json_request(
            "POST",
            "/announcements",
            json!({ "title": "Monsoon advisory", "message": "Expect longer arrival times" }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["delivered"], 1);
    assert!(matches!(rx.try_recv(), Ok(BusEvent::Announcement { .. })));
}
