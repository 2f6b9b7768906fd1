use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow, types::Json};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::query::{PageSpec, SearchResult, page_count};

/// Maximum number of images accepted per listing (create or replace).
pub const MAX_IMAGES_PER_LISTING: usize = 5;

// --- Enumerations ---

/// Role
///
/// The RBAC field resolved by the token verifier. `Agent` owns and manages
/// listings; `Admin` may moderate any listing; `Buyer` is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Buyer,
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Role::Buyer),
            "agent" => Ok(Role::Agent),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// PropertyType
///
/// The closed set of listing categories. Values outside the set are rejected
/// by input validation before they ever reach the query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PropertyType {
    House,
    Apartment,
    Condo,
    Land,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::House => "house",
            PropertyType::Apartment => "apartment",
            PropertyType::Condo => "condo",
            PropertyType::Land => "land",
        }
    }
}

impl std::str::FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "house" => Ok(PropertyType::House),
            "apartment" => Ok(PropertyType::Apartment),
            "condo" => Ok(PropertyType::Condo),
            "land" => Ok(PropertyType::Land),
            other => Err(format!(
                "type must be one of house, apartment, condo, land (got '{other}')"
            )),
        }
    }
}

/// ListingStatus
///
/// Lifecycle state of a listing. New listings default to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ListingStatus {
    #[default]
    Active,
    Sold,
    Pending,
    Rented,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
            ListingStatus::Pending => "pending",
            ListingStatus::Rented => "rented",
        }
    }
}

impl std::str::FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ListingStatus::Active),
            "sold" => Ok(ListingStatus::Sold),
            "pending" => Ok(ListingStatus::Pending),
            "rented" => Ok(ListingStatus::Rented),
            other => Err(format!(
                "status must be one of active, sold, pending, rented (got '{other}')"
            )),
        }
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// Coordinates
///
/// A geographic point. Serializes over the wire as a 2-element array in
/// **[lng, lat]** order (GeoJSON convention); stored as two columns in the
/// database. The origin `[0, 0]` is the default for listings created without
/// a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, FromRow)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinates {
    /// Checks the spatial invariant: `lng ∈ [-180, 180]`, `lat ∈ [-90, 90]`.
    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.lng) && (-90.0..=90.0).contains(&self.lat)
    }
}

impl Serialize for Coordinates {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.lng, self.lat].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Coordinates {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [lng, lat] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Coordinates { lng, lat })
    }
}

/// ListingImage
///
/// A stored asset reference: the public URL served to clients plus the object
/// key needed to delete the asset from the store later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ListingImage {
    pub url: String,
    pub key: String,
}

/// Listing
///
/// A property record for sale/rent, the primary data structure of the system.
/// Maps to the `listings` table. The `agent_id` is a weak back-reference:
/// deleting a listing never deletes its agent.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Listing {
    pub id: Uuid,
    /// Owning agent (FK to users.id, lookup only).
    pub agent_id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    /// Free-text location, matched by case-insensitive substring search.
    pub location: String,
    pub property_type: PropertyType,
    /// Amenity tag set. Filter semantics are superset (all-of), not any-of.
    pub amenities: Vec<String>,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub square_footage: i32,
    pub status: ListingStatus,
    /// Monotonically increasing view counter, bumped atomically on single fetch.
    pub views: i64,
    #[ts(type = "Array<ListingImage>")]
    #[schema(value_type = Vec<ListingImage>)]
    pub images: Vec<ListingImage>,
    /// Always [lng, lat] order on the wire.
    #[ts(type = "[number, number]")]
    #[schema(value_type = Vec<f64>)]
    pub coordinates: Coordinates,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Listing {
    fn default() -> Self {
        Listing {
            id: Uuid::nil(),
            agent_id: Uuid::nil(),
            title: String::new(),
            description: String::new(),
            price: 0.0,
            location: String::new(),
            property_type: PropertyType::House,
            amenities: vec![],
            bedrooms: 0,
            bathrooms: 0,
            square_footage: 0,
            status: ListingStatus::Active,
            views: 0,
            images: vec![],
            coordinates: Coordinates::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Manual row mapping: the enums live in TEXT columns, the image list in a
/// JSONB column, and the coordinate pair in two double-precision columns.
impl FromRow<'_, PgRow> for Listing {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let property_type: String = row.try_get("property_type")?;
        let status: String = row.try_get("status")?;
        let images: Json<Vec<ListingImage>> = row.try_get("images")?;

        Ok(Listing {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            location: row.try_get("location")?,
            property_type: property_type
                .parse()
                .map_err(|e: String| sqlx::Error::ColumnDecode {
                    index: "property_type".into(),
                    source: e.into(),
                })?,
            amenities: row.try_get("amenities")?,
            bedrooms: row.try_get("bedrooms")?,
            bathrooms: row.try_get("bathrooms")?,
            square_footage: row.try_get("square_footage")?,
            status: status
                .parse()
                .map_err(|e: String| sqlx::Error::ColumnDecode {
                    index: "status".into(),
                    source: e.into(),
                })?,
            views: row.try_get("views")?,
            images: images.0,
            coordinates: Coordinates {
                lng: row.try_get("lng")?,
                lat: row.try_get("lat")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// User
///
/// The identity record resolved during authentication: who the requester is
/// and which role they hold. Credential material lives upstream in the token
/// issuer and is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl FromRow<'_, PgRow> for User {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            role: role.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "role".into(),
                source: e.into(),
            })?,
        })
    }
}

// --- Request Payloads (Input Schemas) ---

/// ImageUpload
///
/// An image part lifted out of a multipart request body, prior to upload.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// ListingForm
///
/// The decoded multipart form for creating or updating a listing. Every field
/// is optional at this stage; `validate_create` enforces the required set for
/// POST while `validate_update` only checks the fields actually provided.
#[derive(Debug, Clone, Default)]
pub struct ListingForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub property_type: Option<PropertyType>,
    pub amenities: Option<Vec<String>>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub square_footage: Option<i32>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub images: Vec<ImageUpload>,
}

impl ListingForm {
    /// Coordinate pair, only when both halves were supplied together.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lng, self.lat) {
            (Some(lng), Some(lat)) => Some(Coordinates { lng, lat }),
            _ => None,
        }
    }

    fn common_checks(&self, messages: &mut Vec<String>) {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                messages.push("title must not be empty".to_string());
            }
        }
        if let Some(description) = &self.description {
            if description.trim().is_empty() {
                messages.push("description must not be empty".to_string());
            }
        }
        if let Some(price) = self.price {
            if price < 0.0 {
                messages.push("price must be non-negative".to_string());
            }
        }
        for (name, value) in [
            ("bedrooms", self.bedrooms),
            ("bathrooms", self.bathrooms),
            ("squareFootage", self.square_footage),
        ] {
            if value.is_some_and(|v| v < 0) {
                messages.push(format!("{name} must be non-negative"));
            }
        }
        if let Some(coords) = self.coordinates() {
            if !coords.is_valid() {
                messages.push(
                    "coordinates out of range: lng in [-180,180], lat in [-90,90]".to_string(),
                );
            }
        }
        if self.images.len() > MAX_IMAGES_PER_LISTING {
            messages.push(format!("at most {MAX_IMAGES_PER_LISTING} images per listing"));
        }
    }

    /// Validates the form for listing creation: title, description, price and
    /// type are required; everything else falls back to its default.
    pub fn validate_create(&self) -> Result<(), ApiError> {
        let mut messages = Vec::new();

        if self.title.as_deref().is_none_or(|t| t.trim().is_empty()) {
            messages.push("title is required".to_string());
        }
        if self
            .description
            .as_deref()
            .is_none_or(|d| d.trim().is_empty())
        {
            messages.push("description is required".to_string());
        }
        if self.price.is_none() {
            messages.push("price is required and must be a number".to_string());
        }
        if self.property_type.is_none() {
            messages.push("type is required".to_string());
        }

        let mut common = Vec::new();
        self.common_checks(&mut common);
        // Required-field messages already cover the empty-string cases.
        messages.extend(
            common
                .into_iter()
                .filter(|m| !m.contains("must not be empty")),
        );

        if messages.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(messages))
        }
    }

    /// Validates the form for a partial update: only fields that were actually
    /// provided are checked.
    pub fn validate_update(&self) -> Result<(), ApiError> {
        let mut messages = Vec::new();
        self.common_checks(&mut messages);
        if messages.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(messages))
        }
    }

    /// Builds a fresh `Listing` from a create-validated form. Integer specs
    /// default to 0, coordinates to the origin, status to `Active`.
    pub fn into_listing(self, agent_id: Uuid, images: Vec<ListingImage>) -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            agent_id,
            coordinates: self.coordinates().unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            price: self.price.unwrap_or_default(),
            location: self.location.unwrap_or_default(),
            property_type: self.property_type.unwrap_or(PropertyType::House),
            amenities: self.amenities.unwrap_or_default(),
            bedrooms: self.bedrooms.unwrap_or_default(),
            bathrooms: self.bathrooms.unwrap_or_default(),
            square_footage: self.square_footage.unwrap_or_default(),
            status: ListingStatus::Active,
            views: 0,
            images,
            created_at: now,
            updated_at: now,
        }
    }

    /// Projects the form into a partial-update payload, leaving images to the
    /// handler (they require asset-store round trips first).
    pub fn into_update_request(self) -> UpdateListingRequest {
        let coordinates = self.coordinates();
        UpdateListingRequest {
            title: self.title,
            description: self.description,
            price: self.price,
            location: self.location,
            property_type: self.property_type,
            amenities: self.amenities,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            square_footage: self.square_footage,
            coordinates,
        }
    }
}

/// UpdateListingRequest
///
/// Partial update payload: only `Some` fields are written, via COALESCE at the
/// repository layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateListingRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amenities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub square_footage: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// UpdateStatusRequest
///
/// Body of `PATCH /properties/{id}/status`. The status arrives as a raw string
/// so that unknown values produce the uniform validation envelope instead of a
/// serde rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// --- Response Envelopes (Output Schemas) ---

/// ListingPage
///
/// The paginated search envelope shared by the public, agent-scoped, and admin
/// listing endpoints: `count` is the page size actually returned, `total` the
/// match count ignoring pagination, `pages = ceil(total/limit)`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ListingPage {
    pub success: bool,
    pub count: usize,
    pub total: i64,
    pub page: u32,
    pub pages: u32,
    pub properties: Vec<Listing>,
}

impl ListingPage {
    pub fn new(result: SearchResult, page: &PageSpec) -> Self {
        ListingPage {
            success: true,
            count: result.listings.len(),
            total: result.total,
            page: page.page,
            pages: page_count(result.total, page.limit),
            properties: result.listings,
        }
    }
}

/// Single-listing envelope.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ListingResponse {
    pub success: bool,
    pub property: Listing,
}

impl ListingResponse {
    pub fn new(property: Listing) -> Self {
        ListingResponse {
            success: true,
            property,
        }
    }
}

/// Distinct-locations envelope for `GET /properties/locations`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LocationsResponse {
    pub success: bool,
    pub count: usize,
    pub locations: Vec<String>,
}

/// Plain acknowledgement envelope (delete, moderation actions without a body).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// ModerationStats
///
/// Output schema for the admin moderation dashboard (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ModerationStats {
    pub total_listings: i64,
    pub active_listings: i64,
    pub total_agents: i64,
    pub total_views: i64,
}
