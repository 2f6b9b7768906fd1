use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use estate_portal::{
    AppState, create_router,
    config::AppConfig,
    models::{
        Listing, ListingImage, ListingStatus, ModerationStats, PropertyType, Role,
        UpdateListingRequest, User,
    },
    query::{PageSpec, QueryDescriptor, SearchResult, execute_in_memory},
    repository::Repository,
    storage::MockStorageService,
};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

// --- Seeded In-memory Backend ---

// Full-router tests go through `create_router`, so the auth middleware, the
// local x-user-id bypass, and the multipart extractors are all exercised
// end-to-end without a live Postgres or MinIO.
struct SeedRepo {
    listings: Mutex<Vec<Listing>>,
    users: Vec<User>,
}

#[async_trait]
impl Repository for SeedRepo {
    async fn search_listings(
        &self,
        query: &QueryDescriptor,
        page: &PageSpec,
    ) -> Result<SearchResult, sqlx::Error> {
        Ok(execute_in_memory(&self.listings.lock().unwrap(), query, page))
    }
    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>, sqlx::Error> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }
    async fn view_listing(&self, id: Uuid) -> Result<Option<Listing>, sqlx::Error> {
        let mut listings = self.listings.lock().unwrap();
        Ok(listings.iter_mut().find(|l| l.id == id).map(|l| {
            l.views += 1;
            l.clone()
        }))
    }
    async fn create_listing(&self, listing: Listing) -> Result<Listing, sqlx::Error> {
        self.listings.lock().unwrap().push(listing.clone());
        Ok(listing)
    }
    async fn update_listing(
        &self,
        id: Uuid,
        req: UpdateListingRequest,
        images: Option<Vec<ListingImage>>,
    ) -> Result<Option<Listing>, sqlx::Error> {
        let mut listings = self.listings.lock().unwrap();
        Ok(listings.iter_mut().find(|l| l.id == id).map(|l| {
            if let Some(v) = req.title {
                l.title = v;
            }
            if let Some(v) = req.price {
                l.price = v;
            }
            if let Some(v) = images {
                l.images = v;
            }
            l.clone()
        }))
    }
    async fn set_listing_status(
        &self,
        id: Uuid,
        status: ListingStatus,
    ) -> Result<Option<Listing>, sqlx::Error> {
        let mut listings = self.listings.lock().unwrap();
        Ok(listings.iter_mut().find(|l| l.id == id).map(|l| {
            l.status = status;
            l.clone()
        }))
    }
    async fn delete_listing(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut listings = self.listings.lock().unwrap();
        let before = listings.len();
        listings.retain(|l| l.id != id);
        Ok(listings.len() < before)
    }
    async fn distinct_locations(
        &self,
        _search: Option<String>,
    ) -> Result<Vec<String>, sqlx::Error> {
        Ok(vec![])
    }
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }
    async fn get_stats(&self) -> Result<ModerationStats, sqlx::Error> {
        Ok(ModerationStats::default())
    }
}

// --- Test Utilities ---

const AGENT_ID: Uuid = Uuid::from_u128(100);
const BUYER_ID: Uuid = Uuid::from_u128(200);

fn spawn_router(listings: Vec<Listing>) -> Router {
    let users = vec![
        User {
            id: AGENT_ID,
            email: "agent@example.com".to_string(),
            role: Role::Agent,
        },
        User {
            id: BUYER_ID,
            email: "buyer@example.com".to_string(),
            role: Role::Buyer,
        },
    ];
    let state = AppState {
        repo: Arc::new(SeedRepo {
            listings: Mutex::new(listings),
            users,
        }),
        storage: Arc::new(MockStorageService::new()),
        // Default config runs in Env::Local, enabling the x-user-id bypass.
        config: AppConfig::default(),
    };
    create_router(state)
}

fn seeded_listing(title: &str) -> Listing {
    Listing {
        id: Uuid::new_v4(),
        agent_id: AGENT_ID,
        title: title.to_string(),
        description: "A seeded listing".to_string(),
        price: 180_000.0,
        location: "Limerick".to_string(),
        property_type: PropertyType::Apartment,
        ..Listing::default()
    }
}

const BOUNDARY: &str = "test-boundary-0f8a2b";

fn multipart_body(fields: &[(&str, &str)], images: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (filename, content_type, data) in images {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"images\"; \
                 filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Tests ---

#[tokio::test]
async fn health_returns_ok() {
    let router = spawn_router(vec![]);

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn search_returns_the_page_envelope_and_applies_filters() {
    let mut cheap = seeded_listing("Below the bound");
    cheap.price = 80_000.0;
    let router = spawn_router(vec![
        seeded_listing("One"),
        seeded_listing("Two"),
        cheap,
    ]);

    let response = router
        .oneshot(
            Request::get("/properties?priceMin=100000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    // The 80k listing falls outside priceMin, so only two rows survive.
    assert_eq!(json["total"], 2);
    assert_eq!(json["count"], 2);
    assert_eq!(json["page"], 1);
    assert!(json["properties"].is_array());
}

#[tokio::test]
async fn unauthenticated_create_is_rejected() {
    let router = spawn_router(vec![]);

    let response = router
        .oneshot(
            Request::post("/properties")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(&[("title", "Nope")], &[])))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_creates_listing_with_image_via_multipart() {
    let router = spawn_router(vec![]);

    let body = multipart_body(
        &[
            ("title", "Seafront Cottage"),
            ("description", "Two-bed cottage overlooking the bay"),
            ("price", "250000"),
            ("type", "house"),
            ("location", "Galway"),
            ("amenities", "garden, sea view"),
            ("bedrooms", "2"),
        ],
        &[("front.jpg", "image/jpeg", &[0xFF, 0xD8, 0xFF])],
    );

    let response = router
        .oneshot(
            Request::post("/properties")
                .header("x-user-id", AGENT_ID.to_string())
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    let property = &json["property"];
    assert_eq!(property["title"], "Seafront Cottage");
    assert_eq!(property["status"], "active");
    assert_eq!(property["views"], 0);
    assert_eq!(property["amenities"], serde_json::json!(["garden", "sea view"]));
    let key = property["images"][0]["key"].as_str().unwrap();
    assert!(key.starts_with("listings/"));
    assert!(key.ends_with(".jpg"));
}

#[tokio::test]
async fn buyer_cannot_create_listings() {
    let router = spawn_router(vec![]);

    let body = multipart_body(
        &[
            ("title", "Sneaky"),
            ("description", "Should not exist"),
            ("price", "1"),
            ("type", "land"),
        ],
        &[],
    );

    let response = router
        .oneshot(
            Request::post("/properties")
                .header("x-user-id", BUYER_ID.to_string())
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_with_missing_required_fields_is_bad_request() {
    let router = spawn_router(vec![]);

    let response = router
        .oneshot(
            Request::post("/properties")
                .header("x-user-id", AGENT_ID.to_string())
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(&[("title", "Only a title")], &[])))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["message"].as_str().unwrap().contains("price"));
}

#[tokio::test]
async fn traversal_filename_cannot_escape_the_listings_prefix() {
    let router = spawn_router(vec![]);

    let body = multipart_body(
        &[
            ("title", "Odd Upload"),
            ("description", "Filename with navigation segments"),
            ("price", "100000"),
            ("type", "apartment"),
        ],
        &[("../../etc/passwd.jpg", "image/jpeg", &[0xFF])],
    );

    let response = router
        .oneshot(
            Request::post("/properties")
                .header("x-user-id", AGENT_ID.to_string())
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let key = json["property"]["images"][0]["key"].as_str().unwrap();
    assert!(key.starts_with("listings/"));
    assert!(!key.contains(".."));
}

#[tokio::test]
async fn malformed_json_body_still_gets_the_error_envelope() {
    let seeded = seeded_listing("Enveloped");
    let id = seeded.id;
    let router = spawn_router(vec![seeded]);

    let response = router
        .oneshot(
            Request::patch(format!("/properties/{id}/status"))
                .header("x-user-id", AGENT_ID.to_string())
                .header("content-type", "application/json")
                .body(Body::from("{not valid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn owner_updates_title_without_touching_other_fields() {
    let seeded = seeded_listing("Old Title");
    let id = seeded.id;
    let router = spawn_router(vec![seeded]);

    let response = router
        .oneshot(
            Request::put(format!("/properties/{id}"))
                .header("x-user-id", AGENT_ID.to_string())
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(&[("title", "New Title")], &[])))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["property"]["title"], "New Title");
    assert_eq!(json["property"]["location"], "Limerick");
    assert_eq!(json["property"]["price"], 180_000.0);
}

#[tokio::test]
async fn malformed_path_id_is_bad_request_over_http() {
    let router = spawn_router(vec![]);

    let response = router
        .oneshot(
            Request::get("/properties/definitely-not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_routes_reject_plain_agents() {
    let router = spawn_router(vec![]);

    let response = router
        .oneshot(
            Request::get("/admin/stats")
                .header("x-user-id", AGENT_ID.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
