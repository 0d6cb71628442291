/// Media attached to content items
///
/// - `POST /v1/families/:family_id/contents/:content_id/media` - multipart
///   upload of a single `file` field (editor+)
/// - `GET /v1/families/:family_id/contents/:content_id/media`
/// - `DELETE /v1/families/:family_id/contents/:content_id/media/:media_id`
///   (content author or admin)
///
/// Accepted types are images, audio, video and PDF. Files are written by the
/// configured [`MediaStore`](heritage_shared::storage::MediaStore) and served
/// back under `/uploads/`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ApiPath,
    routes::contents::{ensure_author_or_admin, load_visible},
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Extension, Json,
};
use bytes::Bytes;
use heritage_shared::{
    auth::{authorization::check_role, middleware::AuthContext},
    models::{
        media::{is_allowed_mime, ContentMedia, CreateMedia},
        membership::FamilyRole,
    },
};
use uuid::Uuid;

/// Multipart field carrying the upload
const FILE_FIELD: &str = "file";

/// Column sizes of `content_media`
const MAX_NAME_CHARS: usize = 255;
const MAX_MIME_CHARS: usize = 100;

/// The uploaded file, pulled out of the multipart body
struct Upload {
    original_name: String,
    mime_type: String,
    data: Bytes,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the size limit".to_string())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Reads the `file` field, ignoring any others
async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> ApiResult<Upload> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("File name is required".to_string()))?;

        if original_name.chars().count() > MAX_NAME_CHARS {
            return Err(ApiError::BadRequest(format!(
                "File name must be at most {} characters",
                MAX_NAME_CHARS
            )));
        }

        let mime_type = field
            .content_type()
            .map(|m| m.to_ascii_lowercase())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        if mime_type.chars().count() > MAX_MIME_CHARS || !is_allowed_mime(&mime_type) {
            return Err(ApiError::UnsupportedMediaType(format!(
                "Files of type {} are not accepted",
                mime_type
            )));
        }

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "Upload exceeds {} bytes",
                max_bytes
            )));
        }
        if data.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }

        return Ok(Upload {
            original_name,
            mime_type,
            data,
        });
    }

    Err(ApiError::BadRequest(format!(
        "Multipart field '{}' is required",
        FILE_FIELD
    )))
}

pub async fn upload_media(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, content_id)): ApiPath<(Uuid, Uuid)>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<ContentMedia>)> {
    let (content, role) = load_visible(&state, family_id, content_id, auth.user_id).await?;
    check_role(role, FamilyRole::Editor)?;

    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let upload = read_upload(multipart, state.config.uploads.max_bytes).await?;

    let stored = state.media.save(&upload.original_name, upload.data).await?;

    let created = ContentMedia::create(
        &state.db,
        CreateMedia {
            content_id: content.id,
            uploaded_by: auth.user_id,
            original_name: upload.original_name,
            stored_name: stored.stored_name.clone(),
            mime_type: upload.mime_type,
            size_bytes: stored.size_bytes,
            sha256: stored.sha256,
            url: stored.url,
        },
    )
    .await;

    let media = match created {
        Ok(media) => media,
        Err(e) => {
            // Don't leave an orphaned file behind
            if let Err(cleanup) = state.media.delete(&stored.stored_name).await {
                tracing::warn!(error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        content_id = %content.id,
        media_id = %media.id,
        size_bytes = media.size_bytes,
        mime_type = %media.mime_type,
        "Media uploaded"
    );

    Ok((StatusCode::CREATED, Json(media)))
}

pub async fn list_media(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, content_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<ContentMedia>>> {
    let (content, _) = load_visible(&state, family_id, content_id, auth.user_id).await?;

    Ok(Json(ContentMedia::list_for_content(&state.db, content.id).await?))
}

pub async fn delete_media(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, content_id, media_id)): ApiPath<(Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let (content, role) = load_visible(&state, family_id, content_id, auth.user_id).await?;
    ensure_author_or_admin(&content, role, auth.user_id)?;

    let media = ContentMedia::find_for_content(&state.db, content.id, media_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Media"))?;

    ContentMedia::delete(&state.db, media.id).await?;

    if let Err(e) = state.media.delete(&media.stored_name).await {
        tracing::warn!(media_id = %media.id, error = %e, "Failed to remove media file");
    }

    Ok(StatusCode::NO_CONTENT)
}
