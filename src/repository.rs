use crate::models::{
    Listing, ListingImage, ListingStatus, ModerationStats, UpdateListingRequest, User,
};
use crate::query::{Filter, PageSpec, QueryDescriptor, SearchResult, SortOrder};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder, types::Json};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The abstract contract for all persistence operations, shared by the
/// Postgres implementation and the in-memory mock used in tests. Handlers
/// interact with the data layer only through this trait.
///
/// Errors propagate as `sqlx::Error` and are mapped to the generic 500
/// envelope at the request boundary.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Executes a query descriptor with pagination/sort directives. Used by
    /// the public, agent-scoped, and admin listing endpoints alike.
    async fn search_listings(
        &self,
        query: &QueryDescriptor,
        page: &PageSpec,
    ) -> Result<SearchResult, sqlx::Error>;

    /// Plain fetch by id, no side effects. Used for authorization checks.
    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>, sqlx::Error>;

    /// Fetch by id with an atomic view-counter increment persisted before the
    /// row is returned. One successful fetch, exactly one increment.
    async fn view_listing(&self, id: Uuid) -> Result<Option<Listing>, sqlx::Error>;

    async fn create_listing(&self, listing: Listing) -> Result<Listing, sqlx::Error>;

    /// Partial update; only `Some` fields are written. `images`, when given,
    /// replaces the whole image list.
    async fn update_listing(
        &self,
        id: Uuid,
        req: UpdateListingRequest,
        images: Option<Vec<ListingImage>>,
    ) -> Result<Option<Listing>, sqlx::Error>;

    async fn set_listing_status(
        &self,
        id: Uuid,
        status: ListingStatus,
    ) -> Result<Option<Listing>, sqlx::Error>;

    /// Returns true if a row was deleted.
    async fn delete_listing(&self, id: Uuid) -> Result<bool, sqlx::Error>;

    /// Distinct location strings, optionally narrowed by a case-insensitive
    /// substring filter.
    async fn distinct_locations(&self, search: Option<String>)
    -> Result<Vec<String>, sqlx::Error>;

    /// Identity lookup for the auth extractor.
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error>;

    /// Counters for the admin moderation dashboard.
    async fn get_stats(&self) -> Result<ModerationStats, sqlx::Error>;
}

/// The concrete type used to share the persistence layer across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

const LISTING_COLUMNS: &str = "id, agent_id, title, description, price, location, property_type, \
     amenities, bedrooms, bathrooms, square_footage, status, views, images, lng, lat, \
     created_at, updated_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Dynamic filter SQL is
/// assembled with `QueryBuilder` so every user-supplied value is bound, never
/// interpolated.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends one `AND ...` clause per descriptor filter. Shared between the
/// page query and the count query so the two can never drift.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &QueryDescriptor) {
    for filter in &query.filters {
        match filter {
            Filter::LocationContains(s) => {
                builder.push(" AND location ILIKE ");
                builder.push_bind(format!("%{s}%"));
            }
            Filter::TypeIs(t) => {
                builder.push(" AND property_type = ");
                builder.push_bind(t.as_str());
            }
            Filter::HasAmenities(tags) => {
                // Array containment gives superset (all-of) semantics.
                builder.push(" AND amenities @> ");
                builder.push_bind(tags.clone());
            }
            Filter::BedroomsEq(n) => {
                builder.push(" AND bedrooms = ");
                builder.push_bind(*n);
            }
            Filter::BathroomsEq(n) => {
                builder.push(" AND bathrooms = ");
                builder.push_bind(*n);
            }
            Filter::PriceAtLeast(p) => {
                builder.push(" AND price >= ");
                builder.push_bind(*p);
            }
            Filter::PriceAtMost(p) => {
                builder.push(" AND price <= ");
                builder.push_bind(*p);
            }
            Filter::FootageAtLeast(f) => {
                builder.push(" AND square_footage >= ");
                builder.push_bind(*f);
            }
            Filter::FootageAtMost(f) => {
                builder.push(" AND square_footage <= ");
                builder.push_bind(*f);
            }
            Filter::StatusIs(s) => {
                builder.push(" AND status = ");
                builder.push_bind(s.as_str());
            }
            Filter::OwnedBy(agent_id) => {
                builder.push(" AND agent_id = ");
                builder.push_bind(*agent_id);
            }
            Filter::WithinRadius {
                lat,
                lng,
                radius_km,
            } => {
                // Inclusive haversine distance in kilometers; the acos input
                // is clamped against floating-point drift.
                builder.push(" AND (6371.0 * acos(least(1.0, greatest(-1.0, sin(radians(");
                builder.push_bind(*lat);
                builder.push(")) * sin(radians(lat)) + cos(radians(");
                builder.push_bind(*lat);
                builder.push(")) * cos(radians(lat)) * cos(radians(lng - ");
                builder.push_bind(*lng);
                builder.push(")))))) <= ");
                builder.push_bind(*radius_km);
            }
            Filter::TextMatch(s) => {
                builder.push(
                    " AND to_tsvector('english', title || ' ' || description) @@ plainto_tsquery('english', ",
                );
                builder.push_bind(s.clone());
                builder.push(")");
            }
        }
    }
}

/// Appends ORDER BY / LIMIT / OFFSET. When a text search is present the page
/// is ranked by relevance first; ties always break on `id` so ordering is
/// deterministic for a fixed dataset.
fn push_order_and_page(
    builder: &mut QueryBuilder<'_, Postgres>,
    query: &QueryDescriptor,
    page: &PageSpec,
) {
    builder.push(" ORDER BY ");
    if let Some(text) = query.text_query() {
        builder.push(
            "ts_rank(to_tsvector('english', title || ' ' || description), plainto_tsquery('english', ",
        );
        builder.push_bind(text.to_string());
        builder.push(")) DESC, ");
    }
    // Sort columns come from the SortField whitelist, never from user input.
    builder.push(page.sort.column());
    builder.push(match page.order {
        SortOrder::Asc => " ASC",
        SortOrder::Desc => " DESC",
    });
    builder.push(", id ASC");

    builder.push(" LIMIT ");
    builder.push_bind(i64::from(page.limit));
    builder.push(" OFFSET ");
    builder.push_bind(page.skip() as i64);
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn search_listings(
        &self,
        query: &QueryDescriptor,
        page: &PageSpec,
    ) -> Result<SearchResult, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {LISTING_COLUMNS} FROM listings WHERE TRUE"));
        push_filters(&mut builder, query);
        push_order_and_page(&mut builder, query, page);

        let listings = builder
            .build_query_as::<Listing>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM listings WHERE TRUE");
        push_filters(&mut count_builder, query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(SearchResult { listings, total })
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Single-statement increment so concurrent fetches never lose updates.
    async fn view_listing(&self, id: Uuid) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            "UPDATE listings SET views = views + 1 WHERE id = $1 RETURNING {LISTING_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_listing(&self, listing: Listing) -> Result<Listing, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            "INSERT INTO listings \
             (id, agent_id, title, description, price, location, property_type, amenities, \
              bedrooms, bathrooms, square_footage, status, views, images, lng, lat, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {LISTING_COLUMNS}"
        ))
        .bind(listing.id)
        .bind(listing.agent_id)
        .bind(listing.title)
        .bind(listing.description)
        .bind(listing.price)
        .bind(listing.location)
        .bind(listing.property_type.as_str())
        .bind(listing.amenities)
        .bind(listing.bedrooms)
        .bind(listing.bathrooms)
        .bind(listing.square_footage)
        .bind(listing.status.as_str())
        .bind(listing.views)
        .bind(Json(listing.images))
        .bind(listing.coordinates.lng)
        .bind(listing.coordinates.lat)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_listing(
        &self,
        id: Uuid,
        req: UpdateListingRequest,
        images: Option<Vec<ListingImage>>,
    ) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            "UPDATE listings SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                price = COALESCE($4, price), \
                location = COALESCE($5, location), \
                property_type = COALESCE($6, property_type), \
                amenities = COALESCE($7, amenities), \
                bedrooms = COALESCE($8, bedrooms), \
                bathrooms = COALESCE($9, bathrooms), \
                square_footage = COALESCE($10, square_footage), \
                lng = COALESCE($11, lng), \
                lat = COALESCE($12, lat), \
                images = COALESCE($13, images), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {LISTING_COLUMNS}"
        ))
        .bind(id)
        .bind(req.title)
        .bind(req.description)
        .bind(req.price)
        .bind(req.location)
        .bind(req.property_type.map(|t| t.as_str()))
        .bind(req.amenities)
        .bind(req.bedrooms)
        .bind(req.bathrooms)
        .bind(req.square_footage)
        .bind(req.coordinates.map(|c| c.lng))
        .bind(req.coordinates.map(|c| c.lat))
        .bind(images.map(Json))
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_listing_status(
        &self,
        id: Uuid,
        status: ListingStatus,
    ) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            "UPDATE listings SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {LISTING_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_listing(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn distinct_locations(
        &self,
        search: Option<String>,
    ) -> Result<Vec<String>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT DISTINCT location FROM listings WHERE location <> ''");
        if let Some(s) = search {
            builder.push(" AND location ILIKE ");
            builder.push_bind(format!("%{s}%"));
        }
        builder.push(" ORDER BY location ASC");

        builder.build_query_scalar().fetch_all(&self.pool).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, email, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_stats(&self) -> Result<ModerationStats, sqlx::Error> {
        let total_listings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.pool)
            .await?;
        let active_listings: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM listings WHERE status = 'active'")
                .fetch_one(&self.pool)
                .await?;
        let total_agents: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'agent'")
                .fetch_one(&self.pool)
                .await?;
        let total_views: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(views), 0) FROM listings")
            .fetch_one(&self.pool)
            .await?;

        Ok(ModerationStats {
            total_listings,
            active_listings,
            total_agents,
            total_views,
        })
    }
}
