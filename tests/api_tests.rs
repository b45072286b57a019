use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use disaster_portal::{
    AppConfig, AppState, MemoryRepository, RepositoryState,
    auth::provision_admin,
    config::BootstrapAdmin,
    create_router,
    models::{AdminIdentity, Donation},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;

const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "correct-horse-battery";

struct TestApp {
    router: Router,
    state: AppState,
    repo: Arc<MemoryRepository>,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_repo(Arc::new(MemoryRepository::new())).await
    }

    async fn with_repo(repo: Arc<MemoryRepository>) -> Self {
        let config = AppConfig::default();
        let state = AppState::new(repo.clone() as RepositoryState, config)
            .expect("state should build");
        let router = create_router(state.clone());
        TestApp {
            router,
            state,
            repo,
        }
    }

    async fn with_admin() -> Self {
        let app = Self::new().await;
        let admin = BootstrapAdmin {
            username: ADMIN_USERNAME.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        };
        provision_admin(&app.state.repo, &admin, app.state.config.bcrypt_cost)
            .await
            .expect("admin should be provisioned");
        app
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None, None).await
    }

    async fn login(&self) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/admin/login",
                None,
                Some(json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }
}

// --- Health and public reads ---

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn test_public_lists_start_empty() {
    let app = TestApp::new().await;

    for uri in [
        "/api/markers",
        "/api/updates",
        "/api/donations",
        "/api/image-groups",
    ] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, json!([]), "{uri}");
    }
}

#[tokio::test]
async fn test_donations_list_hides_inactive_rows() {
    let app = TestApp::new().await;
    app.repo
        .seed_donation(Donation {
            title: "Relief goods".to_string(),
            is_active: true,
            ..Default::default()
        })
        .await;
    app.repo
        .seed_donation(Donation {
            title: "Expired drive".to_string(),
            is_active: false,
            ..Default::default()
        })
        .await;

    let (status, body) = app.get("/api/donations").await;

    assert_eq!(status, StatusCode::OK);
    let donations = body.as_array().unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0]["title"], "Relief goods");
}

#[tokio::test]
async fn test_store_failure_is_generic_500() {
    let app = TestApp::with_repo(Arc::new(MemoryRepository::new_failing())).await;

    let (status, body) = app.get("/api/markers").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert_eq!(body["error"], "internal server error");
    assert!(!body.to_string().to_lowercase().contains("pool"));
}

// --- Login ---

#[tokio::test]
async fn test_login_returns_token_and_username() {
    let app = TestApp::with_admin().await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/login",
            None,
            Some(json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], ADMIN_USERNAME);
    let token = body["token"].as_str().unwrap();
    assert!(app.state.tokens.verify(token).is_ok());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = TestApp::with_admin().await;

    let (wrong_status, wrong_body) = app
        .send(
            Method::POST,
            "/api/admin/login",
            None,
            Some(json!({ "username": ADMIN_USERNAME, "password": "nope" })),
        )
        .await;
    let (unknown_status, unknown_body) = app
        .send(
            Method::POST,
            "/api/admin/login",
            None,
            Some(json!({ "username": "ghost", "password": ADMIN_PASSWORD })),
        )
        .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let app = TestApp::with_admin().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/login",
            None,
            Some(json!({ "username": ADMIN_USERNAME })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELD");
    assert_eq!(body["field"], "password");
}

// --- Admin access control ---

#[tokio::test]
async fn test_admin_routes_require_a_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/update",
            None,
            Some(json!({ "title": "t", "content": "c" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_REQUIRED");
    assert_eq!(app.get("/api/updates").await.1, json!([]));
}

#[tokio::test]
async fn test_admin_routes_reject_bad_tokens() {
    let app = TestApp::with_admin().await;
    let identity = AdminIdentity {
        id: 1,
        username: ADMIN_USERNAME.to_string(),
        password_digest: String::new(),
    };
    let expired = app
        .state
        .tokens
        .issue_at(&identity, Utc::now() - Duration::hours(25))
        .unwrap();

    for token in [expired.as_str(), "not-a-jwt"] {
        let (status, body) = app
            .send(Method::DELETE, "/api/admin/marker/1", Some(token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{token}");
        assert_eq!(body["code"], "AUTH_REJECTED");
    }
}

#[tokio::test]
async fn test_fresh_token_is_accepted_by_every_admin_route() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let requests = [
        (Method::POST, "/api/admin/update", Some(json!({}))),
        (Method::PUT, "/api/admin/update/1", Some(json!({}))),
        (Method::DELETE, "/api/admin/update/1", None),
        (Method::POST, "/api/admin/marker", Some(json!({}))),
        (Method::PUT, "/api/admin/marker/1", Some(json!({}))),
        (Method::DELETE, "/api/admin/marker/1", None),
        (Method::POST, "/api/admin/image-group", Some(json!({}))),
        (Method::PUT, "/api/admin/image-group/1", Some(json!({}))),
        (Method::DELETE, "/api/admin/image-group/1", None),
        (Method::POST, "/api/admin/image", Some(json!({}))),
        (Method::DELETE, "/api/admin/image/1", None),
    ];

    for (method, uri, body) in requests {
        let (status, _) = app.send(method.clone(), uri, Some(&token), body).await;
        assert!(
            status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN,
            "{method} {uri} rejected a fresh token with {status}"
        );
    }
}

// --- Updates ---

#[tokio::test]
async fn test_update_lifecycle() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (status, created) = app
        .send(
            Method::POST,
            "/api/admin/update",
            Some(&token),
            Some(json!({ "title": "Power restored", "content": "Grid is back in Cebu City" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["message"], "Update added successfully");
    let id = created["id"].as_i64().unwrap();

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/admin/update/{id}"),
            Some(&token),
            Some(json!({ "title": "Power restored", "content": "Grid is back everywhere" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = app.get("/api/updates").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["content"], "Grid is back everywhere");

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/admin/update/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/admin/update/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_edit_of_unknown_update_is_not_found() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/admin/update/999999",
            Some(&token),
            Some(json!({ "title": "t", "content": "c" })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(app.get("/api/updates").await.1, json!([]));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/admin/update")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"title\": "))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "MALFORMED_BODY");
}

// --- Markers ---

#[tokio::test]
async fn test_marker_round_trip() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (status, created) = app
        .send(
            Method::POST,
            "/api/admin/marker",
            Some(&token),
            Some(json!({ "latitude": 10.3157, "longitude": 123.8854, "description": "Test" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["message"], "Marker added successfully");

    let (status, markers) = app.get("/api/markers").await;
    assert_eq!(status, StatusCode::OK);
    let markers = markers.as_array().unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0]["id"], created["id"]);
    assert_eq!(markers[0]["latitude"], 10.3157);
    assert_eq!(markers[0]["longitude"], 123.8854);
    assert_eq!(markers[0]["description"], "Test");
    assert!(markers[0]["created_at"].is_string());
}

#[tokio::test]
async fn test_marker_validation_errors() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let cases = [
        (
            json!({ "latitude": 95, "longitude": 10, "description": "x" }),
            "OUT_OF_RANGE",
            "latitude",
        ),
        (
            json!({ "latitude": 10, "longitude": 200, "description": "x" }),
            "OUT_OF_RANGE",
            "longitude",
        ),
        (
            json!({ "longitude": 10, "description": "x" }),
            "MISSING_FIELD",
            "latitude",
        ),
        (
            json!({ "latitude": 10, "longitude": 10, "description": "  " }),
            "MISSING_FIELD",
            "description",
        ),
    ];

    for (payload, code, field) in cases {
        let (status, body) = app
            .send(Method::POST, "/api/admin/marker", Some(&token), Some(payload))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], code);
        assert_eq!(body["field"], field);
    }

    assert_eq!(app.get("/api/markers").await.1, json!([]));
}

#[tokio::test]
async fn test_marker_boundaries_and_form_strings_are_accepted() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let payloads = [
        json!({ "latitude": 90, "longitude": 180, "description": "north-east corner" }),
        json!({ "latitude": -90, "longitude": -180, "description": "south-west corner" }),
        json!({ "latitude": "10.5", "longitude": "120.25", "description": "from a form" }),
    ];
    for payload in payloads {
        let (status, body) = app
            .send(Method::POST, "/api/admin/marker", Some(&token), Some(payload))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (_, markers) = app.get("/api/markers").await;
    assert_eq!(markers.as_array().unwrap().len(), 3);
    assert_eq!(markers[0]["latitude"], 10.5);
}

#[tokio::test]
async fn test_marker_images_and_legacy_image_url() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (_, created) = app
        .send(
            Method::POST,
            "/api/admin/marker",
            Some(&token),
            Some(json!({
                "latitude": 11.0,
                "longitude": 124.0,
                "description": "Collapsed bridge",
                "image_url": "https://cdn.example.org/cover.jpg",
                "images": [
                    { "image_url": "https://cdn.example.org/side.jpg", "caption": "Side view" }
                ]
            })),
        )
        .await;
    let id = created["id"].as_i64().unwrap();

    let (status, marker) = app.get(&format!("/api/markers/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marker["images"][0]["image_url"], "https://cdn.example.org/cover.jpg");
    assert_eq!(marker["images"][1]["caption"], "Side view");

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/admin/marker/{id}"),
            Some(&token),
            Some(json!({ "latitude": 11.0, "longitude": 124.0, "description": "Cleared" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, marker) = app.get(&format!("/api/markers/{id}")).await;
    assert_eq!(marker["description"], "Cleared");
    assert_eq!(marker["images"], json!([]));
    assert_eq!(app.repo.image_count().await, 0);
}

#[tokio::test]
async fn test_marker_cover_image_survives_a_client_round_trip() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (_, created) = app
        .send(
            Method::POST,
            "/api/admin/marker",
            Some(&token),
            Some(json!({
                "latitude": 10.3157,
                "longitude": 123.8854,
                "description": "Shelter",
                "image_url": "https://cdn.example.org/shelter.jpg"
            })),
        )
        .await;
    let id = created["id"].as_i64().unwrap();

    let (_, markers) = app.get("/api/markers").await;
    let listed = &markers[0];
    assert_eq!(listed["image_url"], "https://cdn.example.org/shelter.jpg");

    // The admin form sends back exactly what it listed.
    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/admin/marker/{id}"),
            Some(&token),
            Some(json!({
                "latitude": listed["latitude"],
                "longitude": listed["longitude"],
                "description": "Shelter (full)",
                "image_url": listed["image_url"]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, marker) = app.get(&format!("/api/markers/{id}")).await;
    assert_eq!(marker["description"], "Shelter (full)");
    assert_eq!(marker["image_url"], "https://cdn.example.org/shelter.jpg");
    assert_eq!(marker["images"].as_array().unwrap().len(), 1);
    assert_eq!(
        marker["images"][0]["image_url"],
        "https://cdn.example.org/shelter.jpg"
    );
}

#[tokio::test]
async fn test_marker_without_images_has_null_cover() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    app.send(
        Method::POST,
        "/api/admin/marker",
        Some(&token),
        Some(json!({ "latitude": 1, "longitude": 2, "description": "Bare" })),
    )
    .await;

    let (_, markers) = app.get("/api/markers").await;
    assert_eq!(markers[0]["image_url"], Value::Null);
}

#[tokio::test]
async fn test_non_numeric_ids_get_json_errors() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (status, body) = app.get("/api/markers/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MALFORMED_BODY");

    let (status, body) = app
        .send(Method::DELETE, "/api/admin/image-group/abc", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MALFORMED_BODY");

    // Authentication is still checked before the path.
    let (status, body) = app
        .send(Method::DELETE, "/api/admin/image-group/abc", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn test_concurrent_marker_creates() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;
    let first = app.send(
        Method::POST,
        "/api/admin/marker",
        Some(&token),
        Some(json!({ "latitude": 1, "longitude": 2, "description": "first" })),
    );
    let second = app.send(
        Method::POST,
        "/api/admin/marker",
        Some(&token),
        Some(json!({ "latitude": 1, "longitude": 2, "description": "second" })),
    );

    let ((first_status, first), (second_status, second)) = tokio::join!(first, second);

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_ne!(first["id"], second["id"]);
    assert_eq!(app.get("/api/markers").await.1.as_array().unwrap().len(), 2);
}

// --- Image groups ---

#[tokio::test]
async fn test_image_group_lifecycle() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (status, created) = app
        .send(
            Method::POST,
            "/api/admin/image-group",
            Some(&token),
            Some(json!({ "title": "Odette aftermath", "location_name": "Cebu" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let group_id = created["id"].as_i64().unwrap();

    for (url, order) in [("c.jpg", 2), ("a.jpg", 0), ("b.jpg", 1)] {
        let (status, _) = app
            .send(
                Method::POST,
                "/api/admin/image",
                Some(&token),
                Some(json!({ "group_id": group_id, "image_url": url, "display_order": order })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, groups) = app.get("/api/image-groups").await;
    assert_eq!(groups[0]["image_count"], 3);

    let (_, group) = app.get(&format!("/api/image-groups/{group_id}")).await;
    let urls: Vec<&str> = group["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["image_url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, vec!["a.jpg", "b.jpg", "c.jpg"]);

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/admin/image-group/{group_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/api/image-groups/{group_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/api/image-groups").await.1, json!([]));
    assert_eq!(app.repo.image_count().await, 0);
}

#[tokio::test]
async fn test_image_for_unknown_group_is_conflict() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/image",
            Some(&token),
            Some(json!({ "group_id": 777, "image_url": "orphan.jpg" })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(app.repo.image_count().await, 0);
}

#[tokio::test]
async fn test_image_group_coordinates_must_pair() {
    let app = TestApp::with_admin().await;
    let token = app.login().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/image-group",
            Some(&token),
            Some(json!({ "title": "Half located", "latitude": 10.0 })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "longitude");
}

// --- Live server ---

async fn spawn_server() -> String {
    let app = TestApp::new().await;
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app.router).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn test_live_server_serves_health_and_request_ids() {
    let address = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{address}/health"))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));

    let response = client
        .get(format!("{address}/api/markers"))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let markers: Vec<Value> = response.json().await.unwrap();
    assert!(markers.is_empty());
}
