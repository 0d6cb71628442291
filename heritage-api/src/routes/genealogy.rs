/// Genealogy tree endpoints
///
/// - `POST|GET /v1/families/:family_id/trees`
/// - `GET|PUT|DELETE /v1/families/:family_id/trees/:tree_id`
/// - `POST /v1/families/:family_id/trees/:tree_id/members`
/// - `PUT|DELETE /v1/families/:family_id/trees/:tree_id/members/:member_id`
///
/// `GET` on a tree returns its members nested under their parents. Parent
/// links stay inside the tree and never loop; both are checked here before
/// anything is written.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{nullable, ApiPath, ValidJson},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::NaiveDate;
use heritage_shared::{
    auth::{
        authorization::{require_permission, FamilyPermission},
        middleware::AuthContext,
    },
    models::genealogy::{
        would_create_cycle, Gender, GenealogyTree, MemberFields, TreeDetail, TreeMember,
    },
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTreeRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTreeRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMemberRequest {
    pub parent_id: Option<Uuid>,

    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,

    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<String>,

    #[serde(default)]
    pub gender: Gender,

    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,

    #[validate(length(max = 150, message = "Birth place must be at most 150 characters"))]
    pub birth_place: Option<String>,

    pub bio: Option<String>,
}

/// Partial update; `null` clears an optional field
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMemberRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<Uuid>>,

    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    #[serde(default, deserialize_with = "nullable")]
    pub last_name: Option<Option<String>>,

    pub gender: Option<Gender>,

    #[serde(default, deserialize_with = "nullable")]
    pub birth_date: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "nullable")]
    pub death_date: Option<Option<NaiveDate>>,

    #[validate(length(max = 150, message = "Birth place must be at most 150 characters"))]
    #[serde(default, deserialize_with = "nullable")]
    pub birth_place: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub bio: Option<Option<String>>,
}

impl UpdateMemberRequest {
    /// Applies the present fields on top of `fields`
    fn merge_into(self, mut fields: MemberFields) -> MemberFields {
        if let Some(parent_id) = self.parent_id {
            fields.parent_id = parent_id;
        }
        if let Some(first_name) = self.first_name {
            fields.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = self.last_name {
            fields.last_name = last_name;
        }
        if let Some(gender) = self.gender {
            fields.gender = gender;
        }
        if let Some(birth_date) = self.birth_date {
            fields.birth_date = birth_date;
        }
        if let Some(death_date) = self.death_date {
            fields.death_date = death_date;
        }
        if let Some(birth_place) = self.birth_place {
            fields.birth_place = birth_place;
        }
        if let Some(bio) = self.bio {
            fields.bio = bio;
        }
        fields
    }
}

fn check_dates(fields: &MemberFields) -> ApiResult<()> {
    if !fields.dates_consistent() {
        return Err(ApiError::BadRequest(
            "Death date cannot be before birth date".to_string(),
        ));
    }
    Ok(())
}

async fn load_tree(state: &AppState, family_id: Uuid, tree_id: Uuid) -> ApiResult<GenealogyTree> {
    GenealogyTree::find_in_family(&state.db, family_id, tree_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tree"))
}

pub async fn create_tree(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<CreateTreeRequest>,
) -> ApiResult<(StatusCode, Json<GenealogyTree>)> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    let tree = GenealogyTree::create(
        &state.db,
        family_id,
        req.name.trim(),
        req.description,
        auth.user_id,
    )
    .await?;

    tracing::info!(family_id = %family_id, tree_id = %tree.id, "Genealogy tree created");

    Ok((StatusCode::CREATED, Json(tree)))
}

pub async fn list_trees(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<GenealogyTree>>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    Ok(Json(GenealogyTree::list_by_family(&state.db, family_id).await?))
}

pub async fn get_tree(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, tree_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<TreeDetail>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    let detail = GenealogyTree::load_detail(&state.db, family_id, tree_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tree"))?;

    Ok(Json(detail))
}

pub async fn update_tree(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, tree_id)): ApiPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<UpdateTreeRequest>,
) -> ApiResult<Json<GenealogyTree>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    let tree = GenealogyTree::update(
        &state.db,
        family_id,
        tree_id,
        req.name.map(|n| n.trim().to_string()),
        req.description,
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Tree"))?;

    Ok(Json(tree))
}

pub async fn delete_tree(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, tree_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    if !GenealogyTree::delete(&state.db, family_id, tree_id).await? {
        return Err(ApiError::not_found("Tree"));
    }

    tracing::info!(family_id = %family_id, tree_id = %tree_id, "Genealogy tree deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, tree_id)): ApiPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<CreateMemberRequest>,
) -> ApiResult<(StatusCode, Json<TreeMember>)> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;
    let tree = load_tree(&state, family_id, tree_id).await?;

    let fields = MemberFields {
        parent_id: req.parent_id,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name,
        gender: req.gender,
        birth_date: req.birth_date,
        death_date: req.death_date,
        birth_place: req.birth_place,
        bio: req.bio,
    };
    check_dates(&fields)?;

    if let Some(parent_id) = fields.parent_id {
        if TreeMember::find_in_tree(&state.db, tree.id, parent_id).await?.is_none() {
            return Err(ApiError::BadRequest(
                "Parent must be a member of the same tree".to_string(),
            ));
        }
    }

    let member = TreeMember::create(&state.db, tree.id, fields).await?;

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn update_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, tree_id, member_id)): ApiPath<(Uuid, Uuid, Uuid)>,
    ValidJson(req): ValidJson<UpdateMemberRequest>,
) -> ApiResult<Json<TreeMember>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    // Checks and write share one transaction under the tree lock
    let mut tx = state.db.begin().await?;

    if !GenealogyTree::lock(&mut *tx, family_id, tree_id).await? {
        return Err(ApiError::not_found("Tree"));
    }

    let existing = TreeMember::find_in_tree(&mut *tx, tree_id, member_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tree member"))?;

    let previous_parent = existing.parent_id;
    let fields = req.merge_into(MemberFields::from(existing));
    check_dates(&fields)?;

    if let Some(parent_id) = fields.parent_id.filter(|p| Some(*p) != previous_parent) {
        let links = TreeMember::parent_links(&mut *tx, tree_id).await?;
        check_parent_change(&links, member_id, parent_id)?;
    }

    let member = TreeMember::replace(&mut *tx, tree_id, member_id, fields)
        .await?
        .ok_or_else(|| ApiError::not_found("Tree member"))?;

    tx.commit().await?;

    Ok(Json(member))
}

/// `links` maps every member of the tree to its current parent
fn check_parent_change(
    links: &HashMap<Uuid, Option<Uuid>>,
    member_id: Uuid,
    parent_id: Uuid,
) -> ApiResult<()> {
    if parent_id == member_id {
        return Err(ApiError::BadRequest(
            "A member cannot be their own parent".to_string(),
        ));
    }
    if !links.contains_key(&parent_id) {
        return Err(ApiError::BadRequest(
            "Parent must be a member of the same tree".to_string(),
        ));
    }
    if would_create_cycle(links, member_id, parent_id) {
        return Err(ApiError::BadRequest(
            "Parent change would create a cycle".to_string(),
        ));
    }
    Ok(())
}

pub async fn delete_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, tree_id, member_id)): ApiPath<(Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;
    let tree = load_tree(&state, family_id, tree_id).await?;

    if !TreeMember::delete(&state.db, tree.id, member_id).await? {
        return Err(ApiError::not_found("Tree member"));
    }

    Ok(StatusCode::NO_CONTENT)
}
