/// Media files attached to content items
///
/// Rows record where the bytes went (`stored_name`, `url`) and a SHA-256 of
/// the payload; the bytes themselves live in a
/// [`MediaStore`](crate::storage::MediaStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const MEDIA_COLUMNS: &str = "id, content_id, uploaded_by, original_name, stored_name, mime_type, \
                             size_bytes, sha256, url, created_at";

/// MIME type prefixes accepted for upload; `application/pdf` is matched whole
const ALLOWED_MIME_PREFIXES: [&str; 3] = ["image/", "audio/", "video/"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentMedia {
    pub id: Uuid,
    pub content_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMedia {
    pub content_id: Uuid,
    pub uploaded_by: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub url: String,
}

pub fn is_allowed_mime(mime: &str) -> bool {
    let mime = mime.trim().to_ascii_lowercase();
    mime == "application/pdf" || ALLOWED_MIME_PREFIXES.iter().any(|p| mime.starts_with(p))
}

impl ContentMedia {
    pub async fn create(pool: &PgPool, data: CreateMedia) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ContentMedia>(&format!(
            r#"
            INSERT INTO content_media
                (content_id, uploaded_by, original_name, stored_name, mime_type, size_bytes, sha256, url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {MEDIA_COLUMNS}
            "#
        ))
        .bind(data.content_id)
        .bind(data.uploaded_by)
        .bind(data.original_name)
        .bind(data.stored_name)
        .bind(data.mime_type)
        .bind(data.size_bytes)
        .bind(data.sha256)
        .bind(data.url)
        .fetch_one(pool)
        .await
    }

    pub async fn find_for_content(
        pool: &PgPool,
        content_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ContentMedia>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM content_media WHERE id = $1 AND content_id = $2"
        ))
        .bind(id)
        .bind(content_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_content(
        pool: &PgPool,
        content_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ContentMedia>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM content_media WHERE content_id = $1 ORDER BY created_at ASC"
        ))
        .bind(content_id)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM content_media WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_mime_types() {
        for mime in ["image/png", "image/jpeg", "audio/mpeg", "video/mp4", "application/pdf", "Image/PNG"] {
            assert!(is_allowed_mime(mime), "{}", mime);
        }
    }

    #[test]
    fn test_rejected_mime_types() {
        for mime in ["application/zip", "text/html", "application/pdfx", "application/octet-stream", ""] {
            assert!(!is_allowed_mime(mime), "{}", mime);
        }
    }
}
