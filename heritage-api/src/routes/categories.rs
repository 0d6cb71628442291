/// Per-family content categories
///
/// Listing needs reader access, create and update need editor access, and
/// delete is admin only. Content in a deleted category stays, uncategorized.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{nullable, ApiPath, ValidJson},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use heritage_shared::{
    auth::{
        authorization::{require_permission, FamilyPermission},
        middleware::AuthContext,
    },
    models::category::{Category, CategoryWithCount, UpdateCategory},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    let category = Category::create(&state.db, family_id, req.name.trim(), req.description).await?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<CategoryWithCount>>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    Ok(Json(Category::list_by_family(&state.db, family_id).await?))
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, category_id)): ApiPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<UpdateCategoryRequest>,
) -> ApiResult<Json<Category>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    let category = Category::update(
        &state.db,
        family_id,
        category_id,
        UpdateCategory {
            name: req.name.map(|n| n.trim().to_string()),
            description: req.description,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Category"))?;

    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, category_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    if !Category::delete(&state.db, family_id, category_id).await? {
        return Err(ApiError::not_found("Category"));
    }

    Ok(StatusCode::NO_CONTENT)
}
