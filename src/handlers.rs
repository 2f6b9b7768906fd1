use std::collections::HashMap;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiJson, ApiQuery},
    models::{
        ImageUpload, Listing, ListingForm, ListingImage, ListingPage, ListingResponse,
        LocationsResponse, MessageResponse, ModerationStats, PropertyType, UpdateStatusRequest,
    },
    query::{FilterCriteria, parse_status},
    storage::StorageState,
};

// --- Shared Helpers ---

/// Raw query-string parameters, handed to the query builder untyped so that
/// its permissive numeric parsing (unparseable means absent) is preserved.
type RawParams = HashMap<String, String>;

/// Parses a path identifier, mapping malformed input to a 400 distinct from
/// the 404 an absent listing produces.
fn parse_listing_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidIdentifier)
}

/// Decodes the multipart body shared by the create and update endpoints into
/// a `ListingForm`. Unknown field names are ignored; malformed numeric form
/// values are collected into a single validation failure.
async fn parse_listing_form(mut multipart: Multipart) -> Result<ListingForm, ApiError> {
    let mut form = ListingForm::default();
    let mut problems: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("malformed multipart body".to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "images" {
            let filename = field.file_name().unwrap_or("image.bin").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::Validation("unreadable image part".to_string()))?
                .to_vec();
            form.images.push(ImageUpload {
                filename,
                content_type,
                data,
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|_| ApiError::Validation(format!("unreadable field '{name}'")))?;

        match name.as_str() {
            "title" => form.title = Some(value),
            "description" => form.description = Some(value),
            "location" => form.location = Some(value),
            "price" => match value.trim().parse() {
                Ok(v) => form.price = Some(v),
                Err(_) => problems.push("price must be a number".to_string()),
            },
            "type" => match value.trim().parse::<PropertyType>() {
                Ok(t) => form.property_type = Some(t),
                Err(e) => problems.push(e),
            },
            "amenities" => {
                form.amenities = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }
            "bedrooms" => match value.trim().parse() {
                Ok(v) => form.bedrooms = Some(v),
                Err(_) => problems.push("bedrooms must be an integer".to_string()),
            },
            "bathrooms" => match value.trim().parse() {
                Ok(v) => form.bathrooms = Some(v),
                Err(_) => problems.push("bathrooms must be an integer".to_string()),
            },
            "squareFootage" => match value.trim().parse() {
                Ok(v) => form.square_footage = Some(v),
                Err(_) => problems.push("squareFootage must be an integer".to_string()),
            },
            "lat" => match value.trim().parse() {
                Ok(v) => form.lat = Some(v),
                Err(_) => problems.push("lat must be a number".to_string()),
            },
            "lng" => match value.trim().parse() {
                Ok(v) => form.lng = Some(v),
                Err(_) => problems.push("lng must be a number".to_string()),
            },
            _ => {}
        }
    }

    if problems.is_empty() {
        Ok(form)
    } else {
        Err(ApiError::validation(problems))
    }
}

/// Uploads every image part to the asset store, returning the stored
/// references. Keys are unique per upload; the original filename only
/// contributes its extension.
async fn upload_images(
    storage: &StorageState,
    uploads: Vec<ImageUpload>,
) -> Result<Vec<ListingImage>, ApiError> {
    let mut stored = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let extension = std::path::Path::new(&upload.filename)
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("bin");
        let key = format!("listings/{}.{}", Uuid::new_v4(), extension);
        let image = storage
            .upload_image(&key, &upload.content_type, upload.data)
            .await
            .map_err(ApiError::Storage)?;
        stored.push(image);
    }
    Ok(stored)
}

/// Best-effort asset cleanup: failures are logged and swallowed, never
/// surfaced. There is no transactional coupling to the row mutation.
async fn delete_images_best_effort(storage: &StorageState, images: &[ListingImage]) {
    for image in images {
        if let Err(e) = storage.delete_image(&image.key).await {
            tracing::warn!(key = %image.key, "failed to delete listing image: {e}");
        }
    }
}

/// Fetches a listing and applies the owner-or-admin gate shared by every
/// mutating operation. 404 for an absent row, 403 for a live row the
/// requester does not own.
async fn fetch_gated(state: &AppState, user: &AuthUser, id: Uuid) -> Result<Listing, ApiError> {
    let listing = state
        .repo
        .get_listing(id)
        .await?
        .ok_or(ApiError::NotFound("Property not found"))?;

    if !user.may_manage(listing.agent_id) {
        return Err(ApiError::Forbidden(
            "Not authorized to manage this property",
        ));
    }
    Ok(listing)
}

// --- Listing Search ---

/// search_properties
///
/// [Public Route] Lists properties with the full filter set: location, price
/// and footage ranges, type, amenities, bedrooms/bathrooms, full-text search,
/// geospatial radius, pagination and sorting. All filters combine with AND.
///
/// *Note*: the public endpoint deliberately does not restrict by status; see
/// the design notes.
#[utoipa::path(
    get,
    path = "/properties",
    responses((status = 200, description = "Filtered property page", body = ListingPage))
)]
pub async fn search_properties(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<RawParams>,
) -> Result<Json<ListingPage>, ApiError> {
    let criteria = FilterCriteria::from_params(&params)?;
    let (query, page) = criteria.build();
    let result = state.repo.search_listings(&query, &page).await?;
    Ok(Json(ListingPage::new(result, &page)))
}

/// get_my_properties
///
/// [Authenticated Route] The agent-scoped listing endpoint: the same filter
/// set as the public search plus `status`, always restricted to listings the
/// requesting agent owns.
#[utoipa::path(
    get,
    path = "/properties/user",
    responses((status = 200, description = "The agent's own properties", body = ListingPage))
)]
pub async fn get_my_properties(
    user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<RawParams>,
) -> Result<Json<ListingPage>, ApiError> {
    let criteria = FilterCriteria::from_params(&params)?
        .owned_by(user.id)
        .with_status(parse_status(&params)?);
    let (query, page) = criteria.build();
    let result = state.repo.search_listings(&query, &page).await?;
    Ok(Json(ListingPage::new(result, &page)))
}

/// get_property
///
/// [Public Route] Fetches a single listing by id and atomically increments
/// its view counter, persisted before the response. 400 for a malformed id,
/// 404 for an absent one.
#[utoipa::path(
    get,
    path = "/properties/{id}",
    params(("id" = String, Path, description = "Property ID")),
    responses(
        (status = 200, description = "Found", body = ListingResponse),
        (status = 400, description = "Malformed identifier"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListingResponse>, ApiError> {
    let id = parse_listing_id(&id)?;
    let listing = state
        .repo
        .view_listing(id)
        .await?
        .ok_or(ApiError::NotFound("Property not found"))?;
    Ok(Json(ListingResponse::new(listing)))
}

/// get_locations
///
/// [Public Route] Distinct location strings across all listings, optionally
/// narrowed by a case-insensitive substring filter.
#[utoipa::path(
    get,
    path = "/properties/locations",
    responses((status = 200, description = "Distinct locations", body = LocationsResponse))
)]
pub async fn get_locations(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<RawParams>,
) -> Result<Json<LocationsResponse>, ApiError> {
    let search = params.get("search").map(|s| s.trim().to_string());
    let locations = state
        .repo
        .distinct_locations(search.filter(|s| !s.is_empty()))
        .await?;
    Ok(Json(LocationsResponse {
        success: true,
        count: locations.len(),
        locations,
    }))
}

// --- Listing Mutations ---

/// create_property
///
/// [Authenticated Route] Submits a new listing as multipart form data with up
/// to 5 image parts. Requires the agent (or admin) role. Images are uploaded
/// to the asset store before the row is written; a failure in between can
/// orphan uploaded assets, which is accepted.
#[utoipa::path(
    post,
    path = "/properties",
    responses(
        (status = 201, description = "Created", body = ListingResponse),
        (status = 400, description = "Validation failure"),
        (status = 403, description = "Requires the agent role")
    )
)]
pub async fn create_property(
    user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ListingResponse>), ApiError> {
    if !user.can_list() {
        return Err(ApiError::Forbidden("Only agents can create listings"));
    }

    let form = parse_listing_form(multipart).await?;
    form.validate_create()?;

    let mut form = form;
    let uploads = std::mem::take(&mut form.images);
    let images = upload_images(&state.storage, uploads).await?;

    let listing = state
        .repo
        .create_listing(form.into_listing(user.id, images))
        .await?;

    Ok((StatusCode::CREATED, Json(ListingResponse::new(listing))))
}

/// update_property
///
/// [Authenticated Route] Partial update of an owned listing, as multipart
/// form data. Only provided fields change. When image parts are present they
/// replace the stored set: new assets are uploaded first, the row is updated,
/// then the superseded assets are deleted best-effort.
///
/// *Authorization*: owner-or-admin; 403 otherwise, 404 if absent, 400 for a
/// malformed id.
#[utoipa::path(
    put,
    path = "/properties/{id}",
    params(("id" = String, Path, description = "Property ID")),
    responses(
        (status = 200, description = "Updated", body = ListingResponse),
        (status = 403, description = "Not owner or admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_property(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ListingResponse>, ApiError> {
    let id = parse_listing_id(&id)?;
    let existing = fetch_gated(&state, &user, id).await?;

    let form = parse_listing_form(multipart).await?;
    form.validate_update()?;

    let mut form = form;
    let uploads = std::mem::take(&mut form.images);
    let new_images = if uploads.is_empty() {
        None
    } else {
        Some(upload_images(&state.storage, uploads).await?)
    };
    let replacing = new_images.is_some();

    let updated = state
        .repo
        .update_listing(id, form.into_update_request(), new_images)
        .await?
        .ok_or(ApiError::NotFound("Property not found"))?;

    if replacing {
        delete_images_best_effort(&state.storage, &existing.images).await;
    }

    Ok(Json(ListingResponse::new(updated)))
}

/// update_property_status
///
/// [Authenticated Route] Changes a listing's lifecycle status (active, sold,
/// pending, rented). Owner-or-admin gated.
#[utoipa::path(
    patch,
    path = "/properties/{id}/status",
    params(("id" = String, Path, description = "Property ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated", body = ListingResponse),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Not owner or admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_property_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    let id = parse_listing_id(&id)?;
    let status = payload
        .status
        .trim()
        .parse()
        .map_err(ApiError::Validation)?;

    fetch_gated(&state, &user, id).await?;

    let updated = state
        .repo
        .set_listing_status(id, status)
        .await?
        .ok_or(ApiError::NotFound("Property not found"))?;
    Ok(Json(ListingResponse::new(updated)))
}

/// delete_property
///
/// [Authenticated Route] Removes a listing. Owner-or-admin gated. The row is
/// deleted first, then its images are released from the asset store as
/// independent best-effort calls.
#[utoipa::path(
    delete,
    path = "/properties/{id}",
    params(("id" = String, Path, description = "Property ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not owner or admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_property(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_listing_id(&id)?;
    let listing = fetch_gated(&state, &user, id).await?;

    if !state.repo.delete_listing(id).await? {
        return Err(ApiError::NotFound("Property not found"));
    }

    delete_images_best_effort(&state.storage, &listing.images).await;

    Ok(Json(MessageResponse {
        success: true,
        message: "Property deleted".to_string(),
    }))
}

// --- Administration ---

/// get_admin_properties
///
/// [Admin Route] Lists ALL listings regardless of owner, with the full filter
/// set plus `status`. Explicit admin role check.
#[utoipa::path(
    get,
    path = "/admin/properties",
    responses(
        (status = 200, description = "All properties", body = ListingPage),
        (status = 403, description = "Admin only")
    )
)]
pub async fn get_admin_properties(
    user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<RawParams>,
) -> Result<Json<ListingPage>, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin role required"));
    }

    let criteria = FilterCriteria::from_params(&params)?.with_status(parse_status(&params)?);
    let (query, page) = criteria.build();
    let result = state.repo.search_listings(&query, &page).await?;
    Ok(Json(ListingPage::new(result, &page)))
}

/// get_admin_stats
///
/// [Admin Route] Moderation dashboard counters.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Stats", body = ModerationStats),
        (status = 403, description = "Admin only")
    )
)]
pub async fn get_admin_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ModerationStats>, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin role required"));
    }
    Ok(Json(state.repo.get_stats().await?))
}
