//! Request body decoding
//!
//! Submissions arrive as `multipart/form-data` from the citizen portal, but
//! urlencoded and JSON bodies are accepted too. Multipart parsing is done
//! with `multer` over the already-buffered body.

use crate::model::IssueSubmission;
use crate::upload::{ImageUpload, UploadError};
use futures::executor::block_on;
use multer::{Constraints, Multipart, SizeLimit};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Multipart field carrying the optional photo
pub const IMAGE_FIELD: &str = "image";

/// Allowance for the text fields and multipart framing around an image
pub const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Per text-field limit inside a multipart body
const MAX_TEXT_FIELD_BYTES: u64 = 256 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("Invalid request body: {0}")]
    Body(String),
    #[error("Unsupported content type '{0}'")]
    UnsupportedContentType(String),
}

/// A decoded issue submission and its photo, if one was attached
#[derive(Debug, Default)]
pub struct ParsedSubmission {
    pub submission: IssueSubmission,
    pub image: Option<ImageUpload>,
}

/// Admin status change body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

enum BodyKind {
    Json,
    UrlEncoded,
    Multipart,
}

fn body_kind(content_type: Option<&str>) -> Result<BodyKind, FormError> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match essence.as_str() {
        "application/json" => Ok(BodyKind::Json),
        "application/x-www-form-urlencoded" => Ok(BodyKind::UrlEncoded),
        "multipart/form-data" => Ok(BodyKind::Multipart),
        "" => Err(FormError::UnsupportedContentType("(none)".to_string())),
        other => Err(FormError::UnsupportedContentType(other.to_string())),
    }
}

fn parse_fields<T: DeserializeOwned>(kind: &BodyKind, body: &[u8]) -> Result<T, FormError> {
    match kind {
        BodyKind::Json => serde_json::from_slice(body).map_err(|e| FormError::Body(e.to_string())),
        BodyKind::UrlEncoded => {
            serde_urlencoded::from_bytes(body).map_err(|e| FormError::Body(e.to_string()))
        }
        BodyKind::Multipart => Err(FormError::Body("expected a JSON or form body".to_string())),
    }
}

/// Decode a `POST /api/issues` body
pub fn parse_submission(
    content_type: Option<&str>,
    body: &[u8],
    max_image_bytes: usize,
) -> Result<ParsedSubmission, FormError> {
    let kind = body_kind(content_type)?;
    match kind {
        BodyKind::Multipart => {
            let boundary = content_type
                .map(multer::parse_boundary)
                .transpose()
                .map_err(|e| UploadError::Malformed(e.to_string()))?
                .ok_or_else(|| UploadError::Malformed("missing boundary".to_string()))?;
            block_on(read_multipart(body.to_vec(), boundary, max_image_bytes))
        }
        _ => Ok(ParsedSubmission {
            submission: parse_fields(&kind, body)?,
            image: None,
        }),
    }
}

/// Decode a `PUT /api/issues/:id/status` body
pub fn parse_status_update(content_type: Option<&str>, body: &[u8]) -> Result<StatusUpdate, FormError> {
    parse_fields(&body_kind(content_type)?, body)
}

async fn read_multipart(
    body: Vec<u8>,
    boundary: String,
    max_image_bytes: usize,
) -> Result<ParsedSubmission, FormError> {
    let too_large = |e: multer::Error| -> FormError {
        match e {
            multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. } => {
                UploadError::TooLarge {
                    limit: max_image_bytes,
                }
                .into()
            }
            other => UploadError::Malformed(other.to_string()).into(),
        }
    };

    let constraints = Constraints::new().size_limit(
        SizeLimit::new()
            .per_field(MAX_TEXT_FIELD_BYTES)
            .for_field(IMAGE_FIELD, max_image_bytes as u64),
    );
    let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(body)]);
    let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

    let mut parsed = ParsedSubmission::default();
    while let Some(field) = multipart.next_field().await.map_err(too_large)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        if name == IMAGE_FIELD {
            let content_type = field
                .content_type()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_default();
            let data = field.bytes().await.map_err(too_large)?;

            // An empty file input still sends a part with no filename
            if file_name.as_deref().unwrap_or_default().is_empty() && data.is_empty() {
                continue;
            }
            if parsed.image.is_some() {
                return Err(UploadError::Malformed("only one image may be attached".to_string()).into());
            }
            parsed.image = Some(ImageUpload {
                original_name: file_name,
                content_type,
                data: data.to_vec(),
            });
        } else if file_name.is_some() {
            return Err(UploadError::Malformed(format!("unexpected file field '{}'", name)).into());
        } else {
            let value = field.text().await.map_err(too_large)?;
            if !parsed.submission.set_field(&name, value) {
                tracing::debug!(field = %name, "ignoring unknown form field");
            }
        }
    }
    Ok(parsed)
}
