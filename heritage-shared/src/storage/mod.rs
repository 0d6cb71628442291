/// Media storage abstraction
///
/// Uploaded files go through a [`MediaStore`]; the API server ships with
/// [`local::LocalMediaStore`], which writes under a directory that is served
/// statically. Stores pick the stored name; callers keep the original name
/// only as metadata.
///
/// # Example
///
/// ```no_run
/// use bytes::Bytes;
/// use heritage_shared::storage::{local::LocalMediaStore, MediaStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalMediaStore::new("./uploads", "/uploads");
/// let stored = store.save("lullaby.mp3", Bytes::from_static(b"ID3...")).await?;
/// println!("{} ({} bytes, sha256 {})", stored.url, stored.size_bytes, stored.sha256);
/// store.delete(&stored.stored_name).await?;
/// # Ok(())
/// # }
/// ```

pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Longest extension carried over from the original file name
const MAX_EXTENSION_LEN: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Name that could escape the storage root
    #[error("Invalid stored name: {0}")]
    InvalidName(String),
}

/// Where and what was stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub stored_name: String,
    pub url: String,
    pub size_bytes: i64,
    pub sha256: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persists `data` under a fresh name derived from `original_name`
    async fn save(&self, original_name: &str, data: Bytes) -> Result<StoredFile, StorageError>;

    /// Removes a stored file; missing files are not an error
    async fn delete(&self, stored_name: &str) -> Result<(), StorageError>;
}

/// Lower-case hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Sanitized extension of `original_name`, without the dot
pub fn extension_of(original_name: &str) -> Option<String> {
    let (stem, ext) = original_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Random stored name keeping the original extension
pub fn generate_stored_name(original_name: &str) -> String {
    match extension_of(original_name) {
        Some(ext) => format!("{}.{}", Uuid::new_v4().simple(), ext),
        None => Uuid::new_v4().simple().to_string(),
    }
}

/// Whether `name` is a plain file name (no separators, no traversal)
pub fn is_safe_stored_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"").len(), 64);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG"), Some("jpg".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("weird.p/h"), None);
        assert_eq!(extension_of("long.abcdefghijk"), None);
    }

    #[test]
    fn test_generated_names_keep_extension() {
        let name = generate_stored_name("grandma's recipe.pdf");
        assert!(name.ends_with(".pdf"));
        assert_eq!(name.len(), 32 + 4);
        assert!(is_safe_stored_name(&name));

        let bare = generate_stored_name("README");
        assert_eq!(bare.len(), 32);
        assert_ne!(generate_stored_name("a.png"), generate_stored_name("a.png"));
    }

    #[test]
    fn test_safe_stored_names() {
        assert!(is_safe_stored_name("0f3c.png"));
        assert!(!is_safe_stored_name("../etc/passwd"));
        assert!(!is_safe_stored_name("a/b.png"));
        assert!(!is_safe_stored_name(".."));
        assert!(!is_safe_stored_name(".hidden"));
        assert!(!is_safe_stored_name(""));
    }
}
