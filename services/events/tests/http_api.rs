//! Router-level tests: authentication, status codes and response shapes

mod support;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use support::Harness;
use events::{middleware::{Claims, JwtVerifier}, models::User, routes, state::AppState};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

fn app(harness: &Harness) -> Router {
    routes::create_router(AppState::new(harness.storage.clone(), JwtVerifier::new(SECRET)))
}

fn bearer(user: &User) -> String {
    let claims = Claims {
        sub: user.id,
        iat: Some(chrono::Utc::now().timestamp() as u64),
        exp: (chrono::Utc::now().timestamp() + 3600) as u64,
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: &str, uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

fn event_payload() -> Value {
    let date = (chrono::Local::now() + chrono::Duration::days(5)).date_naive();
    json!({
        "name": "Rooftop Cinema",
        "description": "Classic films under the stars",
        "date": date.to_string(),
        "time": "21:00",
        "location": "Galata, Istanbul",
        "image": "",
        "capacity": 2,
        "tags": ["Film", "Outdoor"],
    })
}

#[tokio::test]
async fn test_health_reports_backend() {
    let harness = Harness::new();
    let (status, body) = send(&app(&harness), empty_request("GET", "/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_mutations_require_a_valid_token() {
    let harness = Harness::new();
    let app = app(&harness);

    let (status, body) = send(&app, json_request("POST", "/events", None, event_payload())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHENTICATED");

    let forged = "Bearer not.a.token";
    let (status, _) = send(&app, json_request("POST", "/events", Some(forged), event_payload())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_event_flow_over_http() {
    let harness = Harness::new();
    let app = app(&harness);
    let host = harness.user("Gül").await;
    let guest = harness.user("Hasan").await;
    let late = harness.user("Işıl").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/events", Some(&bearer(&host)), event_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["event"]["attendeeCount"], 1);
    assert_eq!(body["event"]["image"], Value::Null);
    assert_eq!(body["event"]["time"], "21:00");
    let id = body["event"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        empty_request("POST", &format!("/events/{id}/join"), Some(&bearer(&guest))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attendance"]["status"], "joined");

    let (status, body) = send(
        &app,
        empty_request("POST", &format!("/events/{id}/join"), Some(&bearer(&late))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "EVENT_FULL");

    let (status, body) = send(
        &app,
        empty_request("GET", &format!("/events/{id}"), Some(&bearer(&guest))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["isAttending"], true);
    assert_eq!(body["event"]["attendeesList"].as_array().unwrap().len(), 2);
    assert_eq!(body["event"]["creator"]["name"], "Gül");

    let (status, body) = send(&app, empty_request("GET", "/events?tag=Film", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["limit"], 50);
    assert_eq!(body["events"][0]["tags"], json!(["Film", "Outdoor"]));

    let (status, body) = send(
        &app,
        json_request("PUT", &format!("/events/{id}"), Some(&bearer(&guest)), json!({"name": "Mine now"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, body) = send(
        &app,
        json_request("PUT", &format!("/events/{id}"), Some(&bearer(&host)), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NO_UPDATES");

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/events/{id}"),
            Some(&bearer(&host)),
            json!({"capacity": 3, "tags": ["Cinema"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["capacity"], 3);
    assert_eq!(body["event"]["tags"], json!(["Cinema"]));

    let (status, body) = send(
        &app,
        empty_request("GET", "/users/me/stats", Some(&bearer(&guest))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["eventsJoined"], 1);
    assert_eq!(body["stats"]["connections"], 1);
    assert_eq!(body["recentActivity"][0]["type"], "joined");
    assert_eq!(body["recentActivity"][0]["eventName"], "Rooftop Cinema");

    let (status, _) = send(
        &app,
        empty_request("DELETE", &format!("/events/{id}/leave"), Some(&bearer(&guest))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        empty_request("DELETE", &format!("/events/{id}"), Some(&bearer(&host))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Event deleted successfully");

    let (status, body) = send(&app, empty_request("GET", &format!("/events/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_user_listings_over_http() {
    let harness = Harness::new();
    let app = app(&harness);
    let host = harness.user("Jale").await;
    let token = bearer(&host);

    for _ in 0..2 {
        let (status, _) = send(&app, json_request("POST", "/events", Some(&token), event_payload())).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app,
        empty_request("GET", "/users/me/events/created?limit=1", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        empty_request("GET", "/users/me/events/joined", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let joined = body["events"].as_array().unwrap();
    assert_eq!(joined.len(), 2);
    assert!(joined[0].get("joinedAt").is_some());

    let (status, _) = send(&app, empty_request("GET", "/users/me/stats", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_listings_default_to_ten() {
    let harness = Harness::new();
    let app = app(&harness);
    let host = harness.user("Kader").await;
    let token = bearer(&host);

    for day in 1..=12 {
        harness
            .event(&host, support::draft(&format!("Daily Walk {day}"), day, 5))
            .await;
    }

    for uri in ["/users/me/events/created", "/users/me/events/joined"] {
        let (status, body) = send(&app, empty_request("GET", uri, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events"].as_array().unwrap().len(), 10, "{uri}");
    }

    let (_, body) = send(&app, empty_request("GET", "/events", None)).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 12);
}
