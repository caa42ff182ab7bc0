//! Photo uploads
//!
//! Images are written to one server-controlled directory under generated
//! names (`<unix millis>-<random>.<ext>`). Only that filename is stored on the
//! issue; callers resolve it against the directory when serving.

use rand::Rng;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Default per-image limit, 5 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Extensions longer than this are dropped from generated names
const MAX_EXTENSION_LEN: usize = 10;

/// Error type for upload handling
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File too large. Maximum size is {} bytes", .limit)]
    TooLarge { limit: usize },
    #[error("Only images are allowed! Got '{content_type}'")]
    NotAnImage { content_type: String },
    #[error("Malformed upload: {0}")]
    Malformed(String),
    #[error("Failed to store upload: {0}")]
    Io(#[from] io::Error),
}

/// An image received with a submission, held in memory until stored
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub original_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// The upload directory and its limits
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Reject oversized files and anything not declared as `image/*`
    pub fn check(&self, upload: &ImageUpload) -> Result<(), UploadError> {
        if upload.data.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                limit: self.max_bytes,
            });
        }
        if !upload.content_type.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(UploadError::NotAnImage {
                content_type: upload.content_type.clone(),
            });
        }
        Ok(())
    }

    /// Check and write the image, returning the generated filename
    pub fn save(&self, upload: &ImageUpload) -> Result<String, UploadError> {
        self.check(upload)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut rng = rand::thread_rng();
        let mut attempts = 0;
        loop {
            let filename = generate_filename(
                upload.original_name.as_deref(),
                chrono::Utc::now().timestamp_millis(),
                rng.gen_range(0..1_000_000_000),
            );
            let path = self.dir.join(&filename);

            // create_new so two uploads in the same millisecond never clobber each other
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(&upload.data).and_then(|_| file.sync_all()) {
                        drop(file);
                        let _ = std::fs::remove_file(&path);
                        return Err(e.into());
                    }
                    tracing::debug!(%filename, bytes = upload.data.len(), "stored upload");
                    return Ok(filename);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempts < 5 => {
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove a stored upload whose issue was never created
    pub fn discard(&self, filename: &str) {
        let Some(path) = self.resolve(filename) else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(%filename, "discarded orphaned upload"),
            Err(e) => tracing::warn!(%filename, error = %e, "could not remove orphaned upload"),
        }
    }

    /// Path for a stored filename. `None` unless it is a single plain
    /// path component.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !filename.starts_with('.') => {
                Some(self.dir.join(name))
            }
            _ => None,
        }
    }
}

/// `<millis>-<suffix><.ext>`, keeping the original extension when it is
/// plain alphanumeric
pub fn generate_filename(original_name: Option<&str>, millis: i64, suffix: u32) -> String {
    let extension = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });

    match extension {
        Some(ext) => format!("{}-{}.{}", millis, suffix, ext),
        None => format!("{}-{}", millis, suffix),
    }
}

/// Join a relative URL path onto `base`, refusing anything that could
/// escape it
pub fn safe_join(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }
    let mut path = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) if !part.to_string_lossy().starts_with('.') => path.push(part),
            _ => return None,
        }
    }
    Some(path)
}
