//! Image uploads from multipart forms.
//!
//! Files are identified by their leading bytes, never by the client's
//! declared content type or file name, and stored as `<uuid>.<ext>` under the
//! upload directory, which is served at `/uploads`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::UploadConfig;

/// URL prefix the upload directory is served under.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Errors from reading or storing uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A required file field is absent.
    #[error("{0} image is required")]
    MissingFile(String),

    /// The file isn't a JPEG, PNG, WebP, or GIF image.
    #[error("only JPEG, PNG, WebP and GIF images are allowed")]
    UnsupportedType,

    /// The file exceeds the size limit.
    #[error("image must be at most {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    /// Malformed multipart body.
    #[error("invalid form data: {0}")]
    Multipart(#[from] MultipartError),

    /// Writing or creating the upload directory failed.
    #[error("upload storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageKind {
    /// Identify an image by its magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.len() >= 12
            && bytes.starts_with(b"RIFF")
            && bytes.get(8..12) == Some(b"WEBP".as_slice())
        {
            Some(Self::Webp)
        } else {
            None
        }
    }

    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }
}

/// Text fields and an optional stored image from one form.
#[derive(Debug, Default)]
pub struct ImageForm {
    fields: HashMap<String, String>,
    /// Public path of the stored image, e.g. `/uploads/<uuid>.png`.
    pub image: Option<String>,
}

impl ImageForm {
    /// A trimmed text field; blank values count as absent.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    #[cfg(test)]
    pub(crate) const fn from_fields(
        fields: HashMap<String, String>,
        image: Option<String>,
    ) -> Self {
        Self { fields, image }
    }
}

/// Upload directory and size limit.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl ImageStore {
    /// Create a store from configuration.
    #[must_use]
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            max_bytes: config.max_bytes,
        }
    }

    /// Directory files are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Largest accepted file.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Read a multipart form, storing the file in `file_field` if one was sent.
    ///
    /// The file is written only after the whole body was read successfully.
    /// An empty file part (a form submitted without choosing a file) counts
    /// as no file.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::TooLarge`, `UploadError::UnsupportedType`,
    /// `UploadError::Multipart`, or `UploadError::Io`.
    pub async fn read_form(
        &self,
        mut multipart: Multipart,
        file_field: &str,
    ) -> Result<ImageForm, UploadError> {
        let mut form = ImageForm::default();
        let mut file: Option<Vec<u8>> = None;

        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            if name == file_field {
                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await? {
                    if bytes.len() + chunk.len() > self.max_bytes {
                        return Err(UploadError::TooLarge {
                            max_bytes: self.max_bytes,
                        });
                    }
                    bytes.extend_from_slice(&chunk);
                }
                if !bytes.is_empty() {
                    file = Some(bytes);
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        if let Some(bytes) = file {
            form.image = Some(self.save(&bytes).await?);
        }
        Ok(form)
    }

    /// Store image bytes and return the public path.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::UnsupportedType` for non-images,
    /// `UploadError::TooLarge` over the limit, or `UploadError::Io`.
    pub async fn save(&self, bytes: &[u8]) -> Result<String, UploadError> {
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                max_bytes: self.max_bytes,
            });
        }
        let kind = ImageKind::sniff(bytes).ok_or(UploadError::UnsupportedType)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = format!("{}.{}", Uuid::new_v4(), kind.extension());
        tokio::fs::write(self.dir.join(&file_name), bytes).await?;

        debug!(file = %file_name, size = bytes.len(), "Image stored");
        Ok(format!("{PUBLIC_PREFIX}/{file_name}"))
    }

    /// Delete a previously stored image. Failures are logged, not returned.
    pub async fn remove(&self, public_path: &str) {
        let Some(file_name) = stored_file_name(public_path) else {
            warn!(path = %public_path, "Refusing to delete path outside upload directory");
            return;
        };

        match tokio::fs::remove_file(self.dir.join(file_name)).await {
            Ok(()) => debug!(file = %file_name, "Image removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %file_name, error = %e, "Failed to remove image"),
        }
    }
}

/// File name inside the upload directory for a public path, if it is one.
fn stored_file_name(public_path: &str) -> Option<&str> {
    let name = public_path.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    valid.then_some(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn store(dir: &Path, max_bytes: usize) -> ImageStore {
        ImageStore::new(&UploadConfig {
            dir: dir.to_path_buf(),
            max_bytes,
        })
    }

    #[test]
    fn test_sniff() {
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(PNG), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(b"GIF89a...."), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WAVE"), None);
        assert_eq!(ImageKind::sniff(b"<svg></svg>"), None);
    }

    #[test]
    fn test_stored_file_name() {
        assert_eq!(
            stored_file_name("/uploads/0b6f.png"),
            Some("0b6f.png")
        );
        assert_eq!(stored_file_name("/uploads/../secret"), None);
        assert_eq!(stored_file_name("/uploads/a/b.png"), None);
        assert_eq!(stored_file_name("/static/a.png"), None);
        assert_eq!(stored_file_name("/uploads/"), None);
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 1024);

        let path = store.save(PNG).await.unwrap();
        assert!(path.starts_with("/uploads/"));
        assert!(path.ends_with(".png"));

        let on_disk = dir.path().join(stored_file_name(&path).unwrap());
        assert_eq!(std::fs::read(&on_disk).unwrap(), PNG);

        store.remove(&path).await;
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn test_save_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path(), 1024).save(b"plain text").await.unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType));
    }

    #[tokio::test]
    async fn test_save_rejects_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path(), 8).save(PNG).await.unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { max_bytes: 8 }));
    }

    #[test]
    fn test_form_text_ignores_blanks() {
        let mut form = ImageForm::default();
        form.fields.insert("name".to_string(), "  Mug ".to_string());
        form.fields.insert("description".to_string(), "   ".to_string());
        assert_eq!(form.text("name"), Some("Mug"));
        assert_eq!(form.text("description"), None);
        assert_eq!(form.text("price"), None);
    }
}
