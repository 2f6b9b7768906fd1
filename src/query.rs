use std::collections::HashMap;

use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Listing, ListingStatus, PropertyType};

/// Mean Earth radius in kilometers, used by the great-circle distance filter.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;

// --- Pagination & Sort Directives ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// SortField
///
/// Whitelisted sort keys. Unknown values fall back to `CreatedAt` rather than
/// reaching the storage layer as raw column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    Price,
    Views,
    Bedrooms,
    Bathrooms,
    SquareFootage,
    Title,
}

impl SortField {
    /// Column name in the `listings` table. Static strings only: these are
    /// concatenated into SQL, never bound.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Price => "price",
            SortField::Views => "views",
            SortField::Bedrooms => "bedrooms",
            SortField::Bathrooms => "bathrooms",
            SortField::SquareFootage => "square_footage",
            SortField::Title => "title",
        }
    }

    fn parse(raw: &str) -> SortField {
        match raw {
            "price" => SortField::Price,
            "views" => SortField::Views,
            "bedrooms" => SortField::Bedrooms,
            "bathrooms" => SortField::Bathrooms,
            "squareFootage" | "square_footage" => SortField::SquareFootage,
            "title" => SortField::Title,
            _ => SortField::CreatedAt,
        }
    }
}

/// PageSpec
///
/// Pagination and sort directives: 1-indexed page, page size, and a single
/// sort key with direction. `skip = (page-1)*limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpec {
    pub page: u32,
    pub limit: u32,
    pub sort: SortField,
    pub order: SortOrder,
}

impl Default for PageSpec {
    fn default() -> Self {
        PageSpec {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort: SortField::default(),
            order: SortOrder::default(),
        }
    }
}

impl PageSpec {
    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// Total page count for a match total: `ceil(total/limit)`, 0 iff total is 0.
pub fn page_count(total: i64, limit: u32) -> u32 {
    if total <= 0 {
        return 0;
    }
    ((total as u64).div_ceil(u64::from(limit.max(1)))) as u32
}

// --- Query Descriptor ---

/// Filter
///
/// One storage-agnostic predicate. All filters present on a descriptor
/// combine with logical AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Case-insensitive substring match on the location field.
    LocationContains(String),
    TypeIs(PropertyType),
    /// Superset semantics: the listing's amenity set must contain every tag.
    HasAmenities(Vec<String>),
    BedroomsEq(i32),
    BathroomsEq(i32),
    PriceAtLeast(f64),
    PriceAtMost(f64),
    FootageAtLeast(i32),
    FootageAtMost(i32),
    StatusIs(ListingStatus),
    OwnedBy(Uuid),
    /// Inclusive great-circle radius in kilometers around (lat, lng).
    WithinRadius { lat: f64, lng: f64, radius_km: f64 },
    /// Full-text relevance search over title + description.
    TextMatch(String),
}

/// QueryDescriptor
///
/// The structured output of the query builder: an AND-combined set of
/// predicates that the repository translates to SQL and that `matches`
/// evaluates directly against an in-memory listing (used by the mock
/// repository and the property tests).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDescriptor {
    pub filters: Vec<Filter>,
}

impl QueryDescriptor {
    /// The full-text query string, if any filter carries one.
    pub fn text_query(&self) -> Option<&str> {
        self.filters.iter().find_map(|f| match f {
            Filter::TextMatch(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Evaluates every predicate against a single listing.
    pub fn matches(&self, listing: &Listing) -> bool {
        self.filters.iter().all(|f| f.matches(listing))
    }
}

impl Filter {
    fn matches(&self, listing: &Listing) -> bool {
        match self {
            Filter::LocationContains(needle) => listing
                .location
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Filter::TypeIs(t) => listing.property_type == *t,
            // Exact element equality, same as Postgres array containment.
            Filter::HasAmenities(tags) => tags
                .iter()
                .all(|tag| listing.amenities.iter().any(|a| a == tag)),
            Filter::BedroomsEq(n) => listing.bedrooms == *n,
            Filter::BathroomsEq(n) => listing.bathrooms == *n,
            Filter::PriceAtLeast(p) => listing.price >= *p,
            Filter::PriceAtMost(p) => listing.price <= *p,
            Filter::FootageAtLeast(f) => listing.square_footage >= *f,
            Filter::FootageAtMost(f) => listing.square_footage <= *f,
            Filter::StatusIs(s) => listing.status == *s,
            Filter::OwnedBy(id) => listing.agent_id == *id,
            Filter::WithinRadius {
                lat,
                lng,
                radius_km,
            } => {
                haversine_km(*lat, *lng, listing.coordinates.lat, listing.coordinates.lng)
                    <= *radius_km
            }
            Filter::TextMatch(query) => {
                let title = listing.title.to_lowercase();
                let description = listing.description.to_lowercase();
                // Every token must hit, mirroring plainto_tsquery's AND.
                query
                    .to_lowercase()
                    .split_whitespace()
                    .all(|token| title.contains(token) || description.contains(token))
            }
        }
    }
}

/// Great-circle distance between two points, in kilometers (haversine).
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

// --- Filter Criteria ---

/// FilterCriteria
///
/// Immutable value object parsed from the raw query-string parameters of the
/// listing endpoints. All filter fields are optional; pagination and sorting
/// carry defaults. `build` turns it into the storage-agnostic descriptor plus
/// the page directives, and is the single implementation shared by the
/// public, agent-scoped, and admin listing routes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub location: Option<String>,
    pub property_type: Option<PropertyType>,
    pub amenities: Vec<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub square_footage_min: Option<i32>,
    pub square_footage_max: Option<i32>,
    pub search: Option<String>,
    pub geo: Option<(f64, f64, f64)>, // (lat, lng, radius_km)
    pub status: Option<ListingStatus>,
    pub agent: Option<Uuid>,
    pub page: u32,
    pub limit: u32,
    pub sort: SortField,
    pub order: SortOrder,
}

/// Permissive numeric parse: an unparseable value is treated as absent, never
/// an error.
fn parse_num<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str) -> Option<T> {
    params.get(key).and_then(|s| s.trim().parse().ok())
}

fn parse_text(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parses the `status` parameter for the agent-scoped and admin endpoints.
/// The public endpoint never calls this, so `status` is ignored there.
pub fn parse_status(params: &HashMap<String, String>) -> Result<Option<ListingStatus>, ApiError> {
    match parse_text(params, "status") {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: String| ApiError::Validation(e)),
        None => Ok(None),
    }
}

impl FilterCriteria {
    /// Builds criteria from raw string parameters.
    ///
    /// Numbers parse permissively (unparseable means absent). The geospatial
    /// triple is all-or-nothing: unless `lat`, `lng`, and `radius` are all
    /// present and numeric, no geo filter applies. Only an out-of-enum `type`
    /// is rejected, as a validation failure.
    pub fn from_params(params: &HashMap<String, String>) -> Result<FilterCriteria, ApiError> {
        let property_type = match parse_text(params, "type") {
            Some(raw) => Some(
                raw.parse::<PropertyType>()
                    .map_err(ApiError::Validation)?,
            ),
            None => None,
        };

        let amenities = parse_text(params, "amenities")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let geo = match (
            parse_num::<f64>(params, "lat"),
            parse_num::<f64>(params, "lng"),
            parse_num::<f64>(params, "radius"),
        ) {
            (Some(lat), Some(lng), Some(radius)) => Some((lat, lng, radius)),
            // Partial coordinates are ignored, not an error.
            _ => None,
        };

        Ok(FilterCriteria {
            location: parse_text(params, "location"),
            property_type,
            amenities,
            bedrooms: parse_num(params, "bedrooms"),
            bathrooms: parse_num(params, "bathrooms"),
            price_min: parse_num(params, "priceMin"),
            price_max: parse_num(params, "priceMax"),
            square_footage_min: parse_num(params, "squareFootageMin"),
            square_footage_max: parse_num(params, "squareFootageMax"),
            search: parse_text(params, "search"),
            geo,
            status: None,
            agent: None,
            page: parse_num::<u32>(params, "page").unwrap_or(DEFAULT_PAGE).max(1),
            limit: parse_num::<u32>(params, "limit")
                .unwrap_or(DEFAULT_LIMIT)
                .max(1),
            sort: parse_text(params, "sort")
                .map(|s| SortField::parse(&s))
                .unwrap_or_default(),
            order: match parse_text(params, "order").as_deref() {
                Some("asc") => SortOrder::Asc,
                _ => SortOrder::Desc,
            },
        })
    }

    /// Scopes the criteria to a single agent's listings.
    pub fn owned_by(mut self, agent: Uuid) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Adds a status filter (agent-scoped and admin endpoints only).
    pub fn with_status(mut self, status: Option<ListingStatus>) -> Self {
        self.status = status;
        self
    }

    /// The core contract: criteria in, storage-agnostic descriptor plus
    /// pagination/sort directives out.
    pub fn build(&self) -> (QueryDescriptor, PageSpec) {
        let mut filters = Vec::new();

        if let Some(location) = &self.location {
            filters.push(Filter::LocationContains(location.clone()));
        }
        if let Some(t) = self.property_type {
            filters.push(Filter::TypeIs(t));
        }
        if !self.amenities.is_empty() {
            filters.push(Filter::HasAmenities(self.amenities.clone()));
        }
        if let Some(n) = self.bedrooms {
            filters.push(Filter::BedroomsEq(n));
        }
        if let Some(n) = self.bathrooms {
            filters.push(Filter::BathroomsEq(n));
        }
        if let Some(p) = self.price_min {
            filters.push(Filter::PriceAtLeast(p));
        }
        if let Some(p) = self.price_max {
            filters.push(Filter::PriceAtMost(p));
        }
        if let Some(f) = self.square_footage_min {
            filters.push(Filter::FootageAtLeast(f));
        }
        if let Some(f) = self.square_footage_max {
            filters.push(Filter::FootageAtMost(f));
        }
        if let Some(status) = self.status {
            filters.push(Filter::StatusIs(status));
        }
        if let Some(agent) = self.agent {
            filters.push(Filter::OwnedBy(agent));
        }
        if let Some((lat, lng, radius_km)) = self.geo {
            filters.push(Filter::WithinRadius {
                lat,
                lng,
                radius_km,
            });
        }
        if let Some(search) = &self.search {
            filters.push(Filter::TextMatch(search.clone()));
        }

        (
            QueryDescriptor { filters },
            PageSpec {
                page: self.page,
                limit: self.limit,
                sort: self.sort,
                order: self.order,
            },
        )
    }
}

// --- In-memory Execution ---

/// SearchResult
///
/// One page of matches plus the total match count ignoring pagination.
/// Constructed per request, discarded after the response.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub listings: Vec<Listing>,
    pub total: i64,
}

/// Runs a descriptor against an in-memory slice of listings: filter, sort,
/// paginate. Ordering is deterministic for a fixed sort key and direction;
/// ties keep the input (insertion) order, since the sort is stable.
///
/// Backs the mock repository in tests; the Postgres repository translates the
/// same descriptor to SQL instead.
pub fn execute_in_memory(
    listings: &[Listing],
    query: &QueryDescriptor,
    page: &PageSpec,
) -> SearchResult {
    let mut matched: Vec<Listing> = listings
        .iter()
        .filter(|l| query.matches(l))
        .cloned()
        .collect();

    matched.sort_by(|a, b| {
        let ord = match page.sort {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Price => a.price.total_cmp(&b.price),
            SortField::Views => a.views.cmp(&b.views),
            SortField::Bedrooms => a.bedrooms.cmp(&b.bedrooms),
            SortField::Bathrooms => a.bathrooms.cmp(&b.bathrooms),
            SortField::SquareFootage => a.square_footage.cmp(&b.square_footage),
            SortField::Title => a.title.cmp(&b.title),
        };
        match page.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });

    let total = matched.len() as i64;
    let listings = matched
        .into_iter()
        .skip(page.skip() as usize)
        .take(page.limit as usize)
        .collect();

    SearchResult { listings, total }
}
