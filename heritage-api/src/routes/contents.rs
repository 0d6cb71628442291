/// Cultural content endpoints
///
/// - `POST /v1/families/:family_id/contents` - editor+, created as draft
/// - `GET /v1/families/:family_id/contents` - filtered, paginated list
/// - `GET|PUT|DELETE /v1/families/:family_id/contents/:content_id`
/// - `PUT /v1/families/:family_id/contents/:content_id/status`
///
/// # Visibility
///
/// Readers only ever see published content; drafts and archived items answer
/// 404 for them. Editors and admins see everything.
///
/// # Status changes
///
/// ```text
/// draft → published    admin only, notifies the family
/// draft → archived     author or admin
/// published → archived author or admin
/// archived → draft     author or admin
/// ```
///
/// Editors who want their draft published file a publication request
/// instead.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{nullable, ApiPath, ApiQuery, ValidJson},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use heritage_shared::{
    auth::{
        authorization::{check_author_or_role, require_membership, require_permission, FamilyPermission},
        middleware::AuthContext,
    },
    models::{
        category::Category,
        content::{
            Content, ContentDetails, ContentFilter, ContentStatus, ContentType, CreateContent,
            UpdateContent,
        },
        media::ContentMedia,
        membership::FamilyRole,
        notification::{NewNotification, Notification, NotificationKind},
    },
    storage::MediaStore,
};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContentRequest {
    pub content_type: ContentType,

    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[serde(default)]
    pub body: String,

    #[validate(length(min = 2, max = 35, message = "Language must be 2-35 characters"))]
    pub language: Option<String>,

    #[validate(length(max = 100, message = "Region must be at most 100 characters"))]
    pub region: Option<String>,

    pub category_id: Option<Uuid>,

    /// Must be tagged with the same kind as `content_type`
    pub details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateContentRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    pub body: Option<String>,

    #[validate(length(min = 2, max = 35, message = "Language must be 2-35 characters"))]
    #[serde(default, deserialize_with = "nullable")]
    pub language: Option<Option<String>>,

    #[validate(length(max = 100, message = "Region must be at most 100 characters"))]
    #[serde(default, deserialize_with = "nullable")]
    pub region: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<Uuid>>,

    pub details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContentListQuery {
    #[serde(rename = "type")]
    pub content_type: Option<ContentType>,

    pub status: Option<ContentStatus>,

    pub category_id: Option<Uuid>,

    #[validate(length(max = 200, message = "Search term too long"))]
    pub search: Option<String>,

    #[validate(range(min = 1, max = 100, message = "Limit must be 1-100"))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[validate(range(min = 0, message = "Offset must not be negative"))]
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangeStatusRequest {
    pub status: ContentStatus,
}

/// One page of a listing
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Loads content the caller may see, with the caller's role
///
/// Non-members get 403; unpublished content is 404 for readers.
pub(crate) async fn load_visible(
    state: &AppState,
    family_id: Uuid,
    content_id: Uuid,
    user_id: Uuid,
) -> ApiResult<(Content, FamilyRole)> {
    let role = require_membership(&state.db, family_id, user_id).await?;

    let content = Content::find_in_family(&state.db, family_id, content_id)
        .await?
        .filter(|c| c.status == ContentStatus::Published || role.can_view_unpublished())
        .ok_or_else(|| ApiError::not_found("Content"))?;

    Ok((content, role))
}

/// Author of the content, or an admin
pub(crate) fn ensure_author_or_admin(
    content: &Content,
    role: FamilyRole,
    user_id: Uuid,
) -> ApiResult<()> {
    // Content whose author left has no author to match
    let author = content.author_id.unwrap_or_else(Uuid::nil);
    check_author_or_role(role, user_id, author, FamilyRole::Admin)?;
    Ok(())
}

async fn ensure_category_in_family(
    state: &AppState,
    family_id: Uuid,
    category_id: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(id) = category_id {
        if Category::find_in_family(&state.db, family_id, id).await?.is_none() {
            return Err(ApiError::BadRequest(
                "Category does not belong to this family".to_string(),
            ));
        }
    }
    Ok(())
}

fn ensure_details_match(details: &ContentDetails, content_type: ContentType) -> ApiResult<()> {
    if !details.matches_type(content_type) {
        return Err(ApiError::BadRequest(format!(
            "Details of kind '{}' do not match content type '{}'",
            details.kind().as_str(),
            content_type.as_str()
        )));
    }
    Ok(())
}

/// Tells the family a content item went public
pub(crate) async fn announce_published(
    conn: &mut PgConnection,
    content: &Content,
    actor: Uuid,
) -> ApiResult<()> {
    Notification::notify_members(
        conn,
        content.family_id,
        actor,
        NewNotification {
            family_id: Some(content.family_id),
            kind: NotificationKind::ContentPublished,
            message: format!("New {} published: {}", content.content_type.as_str(), content.title),
            target_id: Some(content.id),
        },
    )
    .await?;
    Ok(())
}

pub async fn create_content(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<CreateContentRequest>,
) -> ApiResult<(StatusCode, Json<Content>)> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    let details = req
        .details
        .unwrap_or_else(|| ContentDetails::empty_for(req.content_type));
    ensure_details_match(&details, req.content_type)?;
    ensure_category_in_family(&state, family_id, req.category_id).await?;

    let content = Content::create(
        &state.db,
        CreateContent {
            family_id,
            author_id: auth.user_id,
            category_id: req.category_id,
            content_type: req.content_type,
            title: req.title.trim().to_string(),
            body: req.body,
            language: req.language,
            region: req.region,
            details,
        },
    )
    .await?;

    tracing::info!(
        family_id = %family_id,
        content_id = %content.id,
        content_type = content.content_type.as_str(),
        "Content created"
    );

    Ok((StatusCode::CREATED, Json(content)))
}

pub async fn list_contents(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ContentListQuery>,
) -> ApiResult<Json<Page<Content>>> {
    query.validate()?;
    let role = require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    let status = if role.can_view_unpublished() {
        query.status
    } else {
        Some(ContentStatus::Published)
    };

    let filter = ContentFilter {
        content_type: query.content_type,
        status,
        category_id: query.category_id,
        search: query.search.filter(|s| !s.trim().is_empty()),
        limit: query.limit,
        offset: query.offset,
    };

    let items = Content::list(&state.db, family_id, &filter).await?;
    let total = Content::count(&state.db, family_id, &filter).await?;

    Ok(Json(Page {
        items,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

pub async fn get_content(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, content_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<Content>> {
    let (content, _) = load_visible(&state, family_id, content_id, auth.user_id).await?;
    Ok(Json(content))
}

pub async fn update_content(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, content_id)): ApiPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<UpdateContentRequest>,
) -> ApiResult<Json<Content>> {
    let (content, role) = load_visible(&state, family_id, content_id, auth.user_id).await?;
    ensure_author_or_admin(&content, role, auth.user_id)?;

    if let Some(details) = &req.details {
        ensure_details_match(details, content.content_type)?;
    }
    if let Some(category_id) = req.category_id {
        ensure_category_in_family(&state, family_id, category_id).await?;
    }

    let updated = Content::update(
        &state.db,
        family_id,
        content_id,
        UpdateContent {
            title: req.title.map(|t| t.trim().to_string()),
            body: req.body,
            language: req.language,
            region: req.region,
            category_id: req.category_id,
            details: req.details,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Content"))?;

    Ok(Json(updated))
}

pub async fn delete_content(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, content_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let (content, role) = load_visible(&state, family_id, content_id, auth.user_id).await?;
    ensure_author_or_admin(&content, role, auth.user_id)?;

    let media = ContentMedia::list_for_content(&state.db, content.id).await?;

    if !Content::delete(&state.db, family_id, content.id).await? {
        return Err(ApiError::not_found("Content"));
    }

    // Rows are gone with the content; leftover files are only logged
    remove_files(state.media.as_ref(), &media).await;

    tracing::info!(family_id = %family_id, content_id = %content.id, "Content deleted");

    Ok(StatusCode::NO_CONTENT)
}

async fn remove_files(store: &dyn MediaStore, media: &[ContentMedia]) {
    for item in media {
        if let Err(e) = store.delete(&item.stored_name).await {
            tracing::warn!(media_id = %item.id, error = %e, "Failed to remove media file");
        }
    }
}

pub async fn change_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, content_id)): ApiPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<ChangeStatusRequest>,
) -> ApiResult<Json<Content>> {
    let (content, role) = load_visible(&state, family_id, content_id, auth.user_id).await?;

    if !content.status.can_transition_to(req.status) {
        return Err(ApiError::Conflict(format!(
            "Cannot change status from {} to {}",
            content.status.as_str(),
            req.status.as_str()
        )));
    }

    if req.status == ContentStatus::Published {
        if !role.can_publish() {
            return Err(ApiError::Forbidden(
                "Only admins can publish; file a publication request instead".to_string(),
            ));
        }
    } else {
        ensure_author_or_admin(&content, role, auth.user_id)?;
    }

    let mut tx = state.db.begin().await?;

    let updated = Content::transition(&mut *tx, content.id, content.status, req.status)
        .await?
        .ok_or_else(|| ApiError::Conflict("Content status changed concurrently".to_string()))?;

    if updated.status == ContentStatus::Published {
        announce_published(&mut tx, &updated, auth.user_id).await?;
    }

    tx.commit().await?;

    tracing::info!(
        content_id = %updated.id,
        from = content.status.as_str(),
        to = updated.status.as_str(),
        "Content status changed"
    );

    Ok(Json(updated))
}
