//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use booking_store::{ClassDefinition, ClassInstance, InMemoryBookingStore, User};
use chrono::{Duration, Utc};
use common::{ClassInstanceId, DanceLevel, DanceStyle};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryBookingStore,
}

fn setup() -> TestApp {
    let store = InMemoryBookingStore::new();
    let app = api::create_app(api::create_state(store.clone()), get_metrics_handle());
    TestApp { app, store }
}

impl TestApp {
    async fn add_class(&self, style: DanceStyle, max_spots: i32) -> ClassInstanceId {
        let definition = ClassDefinition::new(format!("{style} class"), style)
            .level(DanceLevel::Level1)
            .max_spots(max_spots);
        self.schedule(definition).await
    }

    async fn add_taught_class(&self, style: DanceStyle, instructor: &User) -> ClassInstanceId {
        self.store.insert_user(instructor.clone()).await;
        let definition = ClassDefinition::new(format!("{style} class"), style)
            .level(DanceLevel::Level1)
            .instructor(instructor.id);
        self.schedule(definition).await
    }

    async fn schedule(&self, definition: ClassDefinition) -> ClassInstanceId {
        let instance = ClassInstance::schedule(&definition, Utc::now() + Duration::days(2));
        let id = instance.id;
        self.store.insert_class_definition(definition).await;
        self.store.insert_class_instance(instance).await;
        id
    }

    async fn add_student(&self, email: &str) {
        self.store.insert_user(User::student(email, "Student")).await;
    }

    async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn book(
        &self,
        key: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/classes/book")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("idempotency-key", key);
        }
        let request = builder
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }
}

fn booking_body(email: &str, class_id: ClassInstanceId) -> serde_json::Value {
    serde_json::json!({ "email": email, "classInstanceId": class_id.to_string() })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

mod search {
    use super::*;

    #[tokio::test]
    async fn test_search_by_style() {
        let app = setup();
        app.add_class(DanceStyle::Salsa, 20).await;
        app.add_class(DanceStyle::Bachata, 20).await;

        let (status, json) = app.get("/classes/search?type=salsa").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
        assert_eq!(json["classes"][0]["definition"]["style"], "SALSA");

        let (status, json) = app.get("/classes/search?type=any").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert_eq!(json["classes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_defaults_to_any() {
        let app = setup();
        app.add_class(DanceStyle::Reggaeton, 20).await;

        let (status, json) = app.get("/classes/search").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn test_search_rejects_unknown_style() {
        let app = setup();
        let (status, json) = app.get("/classes/search?type=tango").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("tango"));
    }
}

mod details {
    use super::*;

    #[tokio::test]
    async fn test_get_class() {
        let app = setup();
        let class_id = app.add_class(DanceStyle::Salsa, 12).await;

        let (status, json) = app.get(&format!("/classes/{class_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], class_id.to_string());
        assert_eq!(json["type"], "SALSA");
        assert_eq!(json["level"], "LEVEL_1");
        assert_eq!(json["maxSpots"], 12);
        assert_eq!(json["spotsRemaining"], 12);
        assert_eq!(json["date"].as_str().unwrap().len(), "dd/mm/yyyy".len());
        assert_eq!(json["startTime"].as_str().unwrap().len(), "HH:MM".len());
    }

    #[tokio::test]
    async fn test_get_unknown_class() {
        let app = setup();
        let (status, json) = app.get(&format!("/classes/{}", ClassInstanceId::new())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_get_invalid_id() {
        let app = setup();
        let (status, _) = app.get("/classes/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod booking {
    use super::*;

    #[tokio::test]
    async fn test_book_class() {
        let app = setup();
        let class_id = app.add_class(DanceStyle::Salsa, 20).await;
        app.add_student("alpha@example.com").await;

        let (status, json) = app
            .book(Some("key-1"), booking_body("alpha@example.com", class_id))
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["status"], "CONFIRMED");
        assert_eq!(json["idempotencyKey"], "key-1");
        assert_eq!(json["user"]["email"], "alpha@example.com");
        assert_eq!(json["classInstance"]["bookedCount"], 1);

        let (_, details) = app.get(&format!("/classes/{class_id}")).await;
        assert_eq!(details["spotsRemaining"], 19);
    }

    #[tokio::test]
    async fn test_booking_nests_instructor_under_definition() {
        let app = setup();
        let instructor = User::instructor("teacher@example.com", "Teacher");
        let class_id = app.add_taught_class(DanceStyle::Bachata, &instructor).await;
        app.add_student("alpha@example.com").await;

        let (status, json) = app
            .book(Some("key-1"), booking_body("alpha@example.com", class_id))
            .await;

        assert_eq!(status, StatusCode::CREATED);
        let definition = &json["classInstance"]["definition"];
        assert_eq!(definition["instructor"]["id"], instructor.id.to_string());
        assert_eq!(definition["instructor"]["email"], "teacher@example.com");
        assert!(json["classInstance"].get("instructor").is_none());
    }

    #[tokio::test]
    async fn test_replay_returns_same_booking() {
        let app = setup();
        let class_id = app.add_class(DanceStyle::Salsa, 20).await;
        app.add_student("alpha@example.com").await;

        let body = booking_body("alpha@example.com", class_id);
        let (first_status, first) = app.book(Some("key-1"), body.clone()).await;
        let (second_status, second) = app.book(Some("key-1"), body).await;

        assert_eq!(first_status, StatusCode::CREATED);
        assert_eq!(second_status, StatusCode::CREATED);
        assert_eq!(first["id"], second["id"]);
        assert_eq!(app.store.booked_count(class_id).await, Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_booking_conflicts() {
        let app = setup();
        let class_id = app.add_class(DanceStyle::Salsa, 20).await;
        app.add_student("alpha@example.com").await;

        let body = booking_body("alpha@example.com", class_id);
        app.book(Some("key-1"), body.clone()).await;
        let (status, json) = app.book(Some("key-2"), body).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("already booked"));
    }

    #[tokio::test]
    async fn test_full_class_conflicts() {
        let app = setup();
        let class_id = app.add_class(DanceStyle::Bachata, 1).await;
        app.add_student("alpha@example.com").await;
        app.add_student("beta@example.com").await;

        let (status, _) = app
            .book(Some("k1"), booking_body("alpha@example.com", class_id))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = app
            .book(Some("k2"), booking_body("beta@example.com", class_id))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("full"));
    }

    #[tokio::test]
    async fn test_unknown_user_and_class_are_not_found() {
        let app = setup();
        let class_id = app.add_class(DanceStyle::Salsa, 20).await;

        let (status, json) = app
            .book(Some("k1"), booking_body("ghost@example.com", class_id))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("ghost@example.com"));

        let (status, _) = app
            .book(
                Some("k2"),
                booking_body("ghost@example.com", ClassInstanceId::new()),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_idempotency_key() {
        let app = setup();
        let class_id = app.add_class(DanceStyle::Salsa, 20).await;
        app.add_student("alpha@example.com").await;

        let (status, json) = app
            .book(None, booking_body("alpha@example.com", class_id))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("idempotency-key"));

        let (status, _) = app
            .book(Some(""), booking_body("alpha@example.com", class_id))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.booking_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_payloads() {
        let app = setup();
        let class_id = app.add_class(DanceStyle::Salsa, 20).await;

        let (status, json) = app
            .book(Some("k1"), booking_body("not-an-email", class_id))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("email"));

        let (status, json) = app
            .book(
                Some("k1"),
                serde_json::json!({ "email": "alpha@example.com", "classInstanceId": "123" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("classInstanceId"));

        let (status, _) = app
            .book(Some("k1"), serde_json::json!({ "email": "alpha@example.com" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
