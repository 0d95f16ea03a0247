use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Largest accepted lease PDF upload
const DOCUMENT_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // Auth routes
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // Public listing routes
        .route("/public/listings", get(handlers::listings::list_available))
        .route("/public/listings/search", get(handlers::listings::search))
        // Profile routes
        .route(
            "/me",
            get(handlers::profile::get_profile)
                .put(handlers::profile::update_profile)
                .delete(handlers::profile::delete_account),
        )
        .route("/me/password", put(handlers::profile::change_password))
        .route("/me/owner-request", post(handlers::profile::request_owner))
        // Person routes
        .route(
            "/persons",
            get(handlers::persons::list_persons).post(handlers::persons::create_person),
        )
        .route("/persons/owner-requests", get(handlers::persons::list_owner_requests))
        .route("/persons/by-email/:email", get(handlers::persons::get_person_by_email))
        .route("/persons/by-phone/:phone", get(handlers::persons::get_person_by_phone))
        .route(
            "/persons/:id",
            get(handlers::persons::get_person)
                .put(handlers::persons::update_person)
                .delete(handlers::persons::delete_person),
        )
        .route("/persons/:id/approve-owner", post(handlers::persons::approve_owner))
        .route("/persons/:id/reject-owner", post(handlers::persons::reject_owner))
        // Listing routes
        .route(
            "/listings",
            get(handlers::listings::list_listings).post(handlers::listings::create_listing),
        )
        .route("/listings/mine", get(handlers::listings::list_mine))
        .route("/listings/pending", get(handlers::listings::list_pending))
        .route("/listings/pending/count", get(handlers::listings::count_pending))
        .route("/listings/stats", get(handlers::listings::stats))
        .route("/listings/reference/:reference", get(handlers::listings::get_listing_by_reference))
        .route("/listings/owner/:owner_id", get(handlers::listings::list_by_owner))
        .route(
            "/listings/:id",
            get(handlers::listings::get_listing)
                .put(handlers::listings::update_listing)
                .delete(handlers::listings::delete_listing),
        )
        .route("/listings/:id/occupancy", put(handlers::listings::set_occupancy))
        .route("/listings/:id/moderation", put(handlers::listings::moderate))
        // Rental request routes
        .route(
            "/rental-requests",
            get(handlers::rental_requests::list_requests).post(handlers::rental_requests::submit_request),
        )
        .route("/rental-requests/mine", get(handlers::rental_requests::list_mine))
        .route("/rental-requests/pending", get(handlers::rental_requests::list_pending))
        .route("/rental-requests/pending/count", get(handlers::rental_requests::count_pending))
        .route("/rental-requests/:id", get(handlers::rental_requests::get_request))
        .route("/rental-requests/:id/accept", post(handlers::rental_requests::accept_request))
        .route("/rental-requests/:id/refuse", post(handlers::rental_requests::refuse_request))
        // Lease routes
        .route(
            "/leases",
            get(handlers::leases::list_leases).post(handlers::leases::create_lease),
        )
        .route("/leases/mine", get(handlers::leases::list_mine))
        .route("/leases/expire-sweep", post(handlers::leases::expire_sweep))
        .route("/leases/reference/:reference", get(handlers::leases::get_lease_by_reference))
        .route("/leases/tenant/:tenant_id", get(handlers::leases::list_by_tenant))
        .route("/leases/listing/:listing_id", get(handlers::leases::list_by_listing))
        .route("/leases/owner/:owner_id", get(handlers::leases::list_by_owner))
        .route(
            "/leases/:id",
            get(handlers::leases::get_lease)
                .put(handlers::leases::update_lease)
                .delete(handlers::leases::delete_lease),
        )
        .route("/leases/:id/terminate", post(handlers::leases::terminate_lease))
        .route("/leases/:id/payments", get(handlers::leases::list_payments))
        .route(
            "/leases/:id/document",
            get(handlers::leases::download_document)
                .post(handlers::leases::upload_document)
                .layer(DefaultBodyLimit::max(DOCUMENT_BODY_LIMIT)),
        )
        // Payment routes
        .route(
            "/payments",
            get(handlers::payments::list_payments).post(handlers::payments::initiate_payment),
        )
        .route("/payments/mine", get(handlers::payments::list_mine))
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route("/payments/:id/capture", post(handlers::payments::capture_payment))
        .route("/payments/:id/fail", post(handlers::payments::fail_payment))
        .route("/payments/:id/cancel", post(handlers::payments::cancel_payment))
        .route("/payments/:id/receipt", get(handlers::payments::download_receipt));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::healthcheck))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::Store;
    use crate::services::persons::hash_password;
    use crate::storage::DocumentStore;

    struct TestApp {
        router: Router,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = Config {
                jwt_secret: "router-test-secret".to_string(),
                ..Config::default()
            };
            let store = Store::in_memory().await.unwrap();
            store
                .seed_admin(&config.admin_email, &hash_password(&config.admin_password).unwrap())
                .await
                .unwrap();
            let state = Arc::new(AppState {
                store,
                config,
                documents: DocumentStore::new(dir.path().join("documents")),
                receipts: DocumentStore::new(dir.path().join("receipts")),
            });
            Self {
                router: build(state),
                _dir: dir,
            }
        }

        async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let req = match body {
                Some(body) => req
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
                None => req.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(req).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }

        async fn login(&self, email: &str, password: &str) -> String {
            let (status, body) = self
                .call("POST", "/api/v1/auth/login", None, Some(json!({"email": email, "password": password})))
                .await;
            assert_eq!(status, StatusCode::OK, "login failed: {body}");
            body["token"].as_str().unwrap().to_string()
        }

        async fn admin(&self) -> String {
            self.login("admin@rental-hub.local", "Admin@123").await
        }

        async fn register(&self, email: &str, role: &str) -> (i64, String) {
            let (status, body) = self
                .call(
                    "POST",
                    "/api/v1/auth/register",
                    None,
                    Some(json!({
                        "first_name": "Test",
                        "last_name": "User",
                        "email": email,
                        "password": "password-123",
                        "role": role
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
            (body["person_id"].as_i64().unwrap(), body["token"].as_str().unwrap().to_string())
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;
        let (status, body) = app.call("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "rental-hub");
    }

    #[tokio::test]
    async fn test_auth_required_and_roles() {
        let app = TestApp::new().await;
        let (status, _) = app.call("GET", "/api/v1/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = app.call("GET", "/api/v1/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, tenant) = app.register("tenant@example.com", "LOCATAIRE").await;
        let (status, body) = app.call("GET", "/api/v1/me", Some(&tenant), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "LOCATAIRE");
        assert!(body.get("password_hash").is_none());

        let (status, _) = app.call("GET", "/api/v1/persons", Some(&tenant), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call("POST", "/api/v1/auth/login", None, Some(json!({"email": "tenant@example.com", "password": "nope-nope"})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tokens_follow_current_account_state() {
        let app = TestApp::new().await;
        let admin = app.admin().await;
        let (id, token) = app.register("shifting@example.com", "LOCATAIRE").await;
        let uri = format!("/api/v1/persons/{id}");
        let person = |role: &str| {
            json!({
                "first_name": "Test",
                "last_name": "User",
                "email": "shifting@example.com",
                "role": role,
                "verified": true
            })
        };

        let (status, _) = app.call("PUT", &uri, Some(&admin), Some(person("ADMIN"))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("GET", "/api/v1/persons", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        // demoted: the token issued while an admin loses admin access
        let (status, _) = app.call("PUT", &uri, Some(&admin), Some(person("LOCATAIRE"))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("GET", "/api/v1/persons", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // deleted: the token no longer authenticates
        let (status, _) = app.call("DELETE", "/api/v1/me", Some(&token), None).await;
        assert!(status.is_success());
        let (status, _) = app.call("GET", "/api/v1/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let app = TestApp::new().await;
        let (status, body) = app
            .call(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({"first_name": "A", "last_name": "B", "email": "not-an-email", "password": "short"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation failed");
        assert!(body["errors"]["email"].is_array());
        assert!(body["errors"]["password"].is_array());

        let (status, _) = app
            .call(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({"first_name": "A", "last_name": "B", "email": "root@example.com", "password": "password-123", "role": "ADMIN"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rental_flow_over_http() {
        let app = TestApp::new().await;
        let admin = app.admin().await;
        let (landlord_id, _) = app.register("owner@example.com", "PROPRIETAIRE").await;
        let (tenant_id, tenant) = app.register("renter@example.com", "LOCATAIRE").await;

        // landlord needs approval, then a fresh token
        let uri = format!("/api/v1/persons/{landlord_id}/approve-owner");
        let (status, body) = app.call("POST", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);
        let landlord = app.login("owner@example.com", "password-123").await;

        let (status, listing) = app
            .call(
                "POST",
                "/api/v1/listings",
                Some(&landlord),
                Some(json!({
                    "property_type": "STUDIO",
                    "address": "4 Avenue Hassan II",
                    "city": "Casablanca",
                    "postal_code": "20000",
                    "surface": 32.5,
                    "monthly_rent": "3000.00",
                    "charges": "200.00"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{listing}");
        assert_eq!(listing["moderation_status"], "PENDING");
        let listing_id = listing["id"].as_i64().unwrap();

        // rejection needs a reason
        let uri = format!("/api/v1/listings/{listing_id}/moderation");
        let (status, body) = app.call("PUT", &uri, Some(&admin), Some(json!({"status": "REJECTED"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["reason"].is_array());
        let (status, _) = app.call("PUT", &uri, Some(&admin), Some(json!({"status": "VALIDATED"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, public) = app.call("GET", "/api/v1/public/listings/search?city=casablanca", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(public.as_array().unwrap().len(), 1);

        let desired = (chrono::Utc::now().date_naive() + chrono::Duration::days(20)).to_string();
        let (status, request) = app
            .call(
                "POST",
                "/api/v1/rental-requests",
                Some(&tenant),
                Some(json!({"listing_id": listing_id, "desired_start": desired, "duration_months": 12})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{request}");
        let request_id = request["id"].as_i64().unwrap();

        let uri = format!("/api/v1/rental-requests/{request_id}/accept");
        let (status, _) = app.call("POST", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);

        let start = crate::rules::month_start(chrono::Utc::now().date_naive());
        let end = start + chrono::Months::new(12);
        let (status, lease) = app
            .call(
                "POST",
                "/api/v1/leases",
                Some(&admin),
                Some(json!({
                    "rental_request_id": request_id,
                    "start_date": start,
                    "end_date": end,
                    "payment_day": 1,
                    "lease_type": "FURNISHED"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{lease}");
        assert_eq!(lease["tenant_id"].as_i64(), Some(tenant_id));
        let lease_id = lease["id"].as_i64().unwrap();

        let uri = format!("/api/v1/listings/{listing_id}");
        let (_, listing) = app.call("GET", &uri, Some(&tenant), None).await;
        assert_eq!(listing["occupancy_status"], "RENTED");

        let (status, payment) = app
            .call("POST", "/api/v1/payments", Some(&tenant), Some(json!({"lease_id": lease_id})))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{payment}");
        assert_eq!(payment["status"], "PENDING");
        let payment_id = payment["id"].as_i64().unwrap();

        // a body that is present but malformed is refused, not ignored
        let uri = format!("/api/v1/payments/{payment_id}/capture");
        let (status, body) = app.call("POST", &uri, Some(&tenant), Some(json!({"transaction_ref": 5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));
        let (_, unchanged) = app.call("GET", &format!("/api/v1/payments/{payment_id}"), Some(&tenant), None).await;
        assert_eq!(unchanged["status"], "PENDING");

        let (status, captured) = app.call("POST", &uri, Some(&tenant), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(captured["status"], "CAPTURED");

        let (status, body) = app.call("POST", &uri, Some(&tenant), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("already paid"));

        let (status, mine) = app.call("GET", "/api/v1/payments/mine", Some(&tenant), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.as_array().unwrap().len(), 1);

        let uri = format!("/api/v1/leases/{lease_id}/terminate");
        let (status, _) = app.call("POST", &uri, Some(&tenant), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, terminated) = app.call("POST", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(terminated["status"], "TERMINATED");
    }

    #[tokio::test]
    async fn test_receipt_download() {
        let app = TestApp::new().await;
        let admin = app.admin().await;
        let (landlord_id, _) = app.register("owner2@example.com", "PROPRIETAIRE").await;
        let (tenant_id, tenant) = app.register("renter2@example.com", "LOCATAIRE").await;
        app.call("POST", &format!("/api/v1/persons/{landlord_id}/approve-owner"), Some(&admin), None)
            .await;

        let (_, listing) = app
            .call(
                "POST",
                "/api/v1/listings",
                Some(&admin),
                Some(json!({
                    "owner_id": landlord_id,
                    "property_type": "HOUSE",
                    "address": "7 Derb Sidi",
                    "city": "Fes",
                    "postal_code": "30000",
                    "surface": 120,
                    "monthly_rent": "6000"
                })),
            )
            .await;
        let listing_id = listing["id"].as_i64().unwrap();
        app.call(
            "PUT",
            &format!("/api/v1/listings/{listing_id}/moderation"),
            Some(&admin),
            Some(json!({"status": "VALIDATED"})),
        )
        .await;

        let start = crate::rules::month_start(chrono::Utc::now().date_naive());
        let (_, lease) = app
            .call(
                "POST",
                "/api/v1/leases",
                Some(&admin),
                Some(json!({
                    "listing_id": listing_id,
                    "tenant_id": tenant_id,
                    "start_date": start,
                    "end_date": start + chrono::Months::new(6),
                    "lease_type": "UNFURNISHED"
                })),
            )
            .await;
        let lease_id = lease["id"].as_i64().unwrap();
        let (_, payment) = app
            .call("POST", "/api/v1/payments", Some(&tenant), Some(json!({"lease_id": lease_id})))
            .await;
        let payment_id = payment["id"].as_i64().unwrap();

        // no receipt before capture
        let uri = format!("/api/v1/payments/{payment_id}/receipt");
        let (status, _) = app.call("GET", &uri, Some(&tenant), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        app.call("POST", &format!("/api/v1/payments/{payment_id}/capture"), Some(&tenant), None)
            .await;

        let req = Request::builder()
            .method("GET")
            .uri(&uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", tenant))
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let bytes = to_bytes(response.into_body(), 10 * 1024 * 1024).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_document_upload_requires_pdf() {
        let app = TestApp::new().await;
        let admin = app.admin().await;

        let boundary = "rentalhubboundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"document\"; filename=\"notes.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhello\r\n--{b}--\r\n",
            b = boundary
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/leases/999/document")
            .header(header::AUTHORIZATION, format!("Bearer {}", admin))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap();
        let response = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
