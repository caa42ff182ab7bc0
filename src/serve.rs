//! HTTP server for the citizen portal and admin dashboard
//!
//! `civic serve` binds the listener, serves the JSON API, uploaded photos
//! and the static portal assets until interrupted.
//!
//! Routing lives in [`Api::handle`], which works on a plain [`ApiRequest`] so
//! it can be exercised without a socket; [`run`] is the tiny_http glue.

use crate::config::Config;
use crate::db::{Database, IssueFilter, Pagination, StoreError, MAX_PAGE_LIMIT};
use crate::form::{self, FormError, FORM_OVERHEAD_BYTES};
use crate::model::{Status, ValidationError};
use crate::upload::{safe_join, UploadError, UploadStore};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, ResponseBox, Server};

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct MessageBody {
    message: &'static str,
}

#[derive(Serialize)]
struct CreatedBody {
    id: i32,
    message: &'static str,
    status: &'static str,
}

/// Error type for request handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Store(StoreError::Validation(e))
    }
}

fn upload_status(e: &UploadError) -> u16 {
    match e {
        UploadError::TooLarge { .. } => 413,
        UploadError::NotAnImage { .. } | UploadError::Malformed(_) => 400,
        UploadError::Io(_) => 500,
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Store(StoreError::Validation(_)) => 400,
            ApiError::Store(StoreError::NotFound(_)) => 404,
            ApiError::Store(StoreError::Connection(_) | StoreError::Storage(_)) => 500,
            ApiError::Form(FormError::Upload(e)) | ApiError::Upload(e) => upload_status(e),
            ApiError::Form(FormError::Body(_)) => 400,
            ApiError::Form(FormError::UnsupportedContentType(_)) => 415,
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound => 404,
        }
    }
}

// ============================================================================
// Request / Reply
// ============================================================================

/// The parts of an HTTP request the router looks at
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus optional query string
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body.into();
        self
    }

    fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or("/")
    }

    fn query(&self) -> &str {
        self.url.split_once('?').map(|(_, q)| q).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Bytes(Vec<u8>),
    File(PathBuf),
    Empty,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: ReplyBody,
    /// Extra headers for CORS preflight
    preflight: bool,
}

impl Reply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        // Serializing our own response types cannot fail
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self {
            status,
            content_type: "application/json",
            body: ReplyBody::Bytes(body),
            preflight: false,
        }
    }

    fn error(err: &ApiError) -> Self {
        let message = err.to_string();
        Self::json(err.status_code(), &ErrorBody { error: &message })
    }

    fn file(path: PathBuf) -> Self {
        let content_type = content_type_for(&path);
        Self {
            status: 200,
            content_type,
            body: ReplyBody::File(path),
            preflight: false,
        }
    }

    fn preflight() -> Self {
        Self {
            status: 204,
            content_type: "text/plain",
            body: ReplyBody::Empty,
            preflight: true,
        }
    }

    /// Body as JSON, for tests and logging
    pub fn json_body(&self) -> Option<serde_json::Value> {
        match &self.body {
            ReplyBody::Bytes(bytes) => serde_json::from_slice(bytes).ok(),
            _ => None,
        }
    }

    fn into_response(self) -> ResponseBox {
        let mut headers = vec![
            header("Content-Type", self.content_type),
            header("Access-Control-Allow-Origin", "*"),
        ];
        if self.preflight {
            headers.push(header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS"));
            headers.push(header("Access-Control-Allow-Headers", "Content-Type"));
        }

        let response = match self.body {
            ReplyBody::Bytes(bytes) => Response::from_data(bytes).boxed(),
            ReplyBody::Empty => Response::empty(self.status).boxed(),
            ReplyBody::File(path) => match std::fs::File::open(&path) {
                Ok(file) => Response::from_file(file).boxed(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not open file");
                    return Response::from_string("Not found").with_status_code(404).boxed();
                }
            },
        };

        headers
            .into_iter()
            .flatten()
            .fold(response.with_status_code(self.status), |r, h| r.with_header(h))
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Router
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

fn parse_number(value: &Option<String>, name: &str, default: u32) -> Result<u32, ApiError> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("{} must be a positive integer", name))),
    }
}

/// Request handler bound to one store and one upload directory
pub struct Api<'a> {
    db: &'a Database,
    uploads: &'a UploadStore,
    static_dir: &'a Path,
}

impl<'a> Api<'a> {
    pub fn new(db: &'a Database, uploads: &'a UploadStore, static_dir: &'a Path) -> Self {
        Self {
            db,
            uploads,
            static_dir,
        }
    }

    /// Largest request body worth reading
    pub fn body_limit(&self) -> usize {
        self.uploads.max_bytes() + FORM_OVERHEAD_BYTES
    }

    pub fn handle(&self, request: &ApiRequest) -> Reply {
        match self.route(request) {
            Ok(reply) => reply,
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    tracing::error!(url = %request.url, error = %e, "request failed");
                } else {
                    tracing::debug!(url = %request.url, status, error = %e, "request rejected");
                }
                Reply::error(&e)
            }
        }
    }

    fn route(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let segments: Vec<&str> = request
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (&request.method, segments.as_slice()) {
            (Method::Options, _) => Ok(Reply::preflight()),

            (Method::Get, ["api", "issues"]) => self.list_issues(request.query()),
            (Method::Get, ["api", "issues", id]) => self.get_issue(id),
            (Method::Post, ["api", "issues"]) => self.create_issue(request),
            (Method::Put, ["api", "issues", id, "status"]) => self.update_status(id, request),
            (Method::Get, ["api", "stats"]) => Ok(Reply::json(200, &self.db.stats()?)),
            (_, ["api", ..]) => Err(ApiError::NotFound),

            (Method::Get, ["uploads", name]) => self
                .uploads
                .resolve(name)
                .filter(|p| p.is_file())
                .map(Reply::file)
                .ok_or(ApiError::NotFound),

            (Method::Get, []) => self.static_file("index.html"),
            (Method::Get, ["admin"]) => self.static_file("admin.html"),
            (Method::Get, _) => self.static_file(request.path()),

            _ => Err(ApiError::NotFound),
        }
    }

    fn static_file(&self, relative: &str) -> Result<Reply, ApiError> {
        safe_join(self.static_dir, relative)
            .filter(|p| p.is_file())
            .map(Reply::file)
            .ok_or(ApiError::NotFound)
    }

    fn list_issues(&self, query: &str) -> Result<Reply, ApiError> {
        let query: ListQuery = serde_urlencoded::from_str(query)
            .map_err(|e| ApiError::BadRequest(format!("Invalid query string: {}", e)))?;

        let page = parse_number(&query.page, "page", 1)?;
        let limit = parse_number(&query.limit, "limit", 10)?.min(MAX_PAGE_LIMIT);
        let pagination = Pagination::new(page, limit)?;

        let filter = IssueFilter {
            status: query.status,
            category: query.category,
            priority: query.priority,
            search: query.search,
        };
        Ok(Reply::json(200, &self.db.list_issues(&filter, pagination)?))
    }

    fn get_issue(&self, id: &str) -> Result<Reply, ApiError> {
        let id = parse_id(id)?;
        Ok(Reply::json(200, &self.db.get_issue(id)?))
    }

    fn create_issue(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        if request.body.len() > self.body_limit() {
            return Err(UploadError::TooLarge {
                limit: self.uploads.max_bytes(),
            }
            .into());
        }

        let form::ParsedSubmission {
            mut submission,
            image,
        } = form::parse_submission(
            request.content_type.as_deref(),
            &request.body,
            self.uploads.max_bytes(),
        )?;

        // Reject bad input before anything touches the disk
        submission.validate()?;
        if let Some(image) = &image {
            self.uploads.check(image)?;
        }

        let stored = image.as_ref().map(|i| self.uploads.save(i)).transpose()?;
        submission.image_path = stored.clone();

        match self.db.create_issue(&submission) {
            Ok(id) => Ok(Reply::json(
                200,
                &CreatedBody {
                    id,
                    message: "Issue reported successfully",
                    status: Status::Reported.as_str(),
                },
            )),
            Err(e) => {
                if let Some(filename) = &stored {
                    self.uploads.discard(filename);
                }
                Err(e.into())
            }
        }
    }

    fn update_status(&self, id: &str, request: &ApiRequest) -> Result<Reply, ApiError> {
        let id = parse_id(id)?;
        let update = form::parse_status_update(request.content_type.as_deref(), &request.body)?;

        let status: Status = update
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("status is required".to_string()))?
            .parse()?;
        let notes = update.admin_notes.as_deref().filter(|n| !n.trim().is_empty());

        self.db.update_status(id, status, notes)?;
        Ok(Reply::json(
            200,
            &MessageBody {
                message: "Issue status updated successfully",
            },
        ))
    }
}

/// Unparseable ids can never match a row
fn parse_id(id: &str) -> Result<i32, ApiError> {
    id.parse::<i32>()
        .map_err(|_| ApiError::Store(StoreError::NotFound(0)))
}

// ============================================================================
// Server
// ============================================================================

/// Start the server and block until Ctrl+C / SIGTERM
pub fn run(config: &Config, db: &Database) -> io::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let server = Arc::new(Server::http(&addr).map_err(|e| io::Error::other(e.to_string()))?);

    let uploads = UploadStore::new(&config.storage.upload_dir, config.upload.max_bytes);
    let api = Api::new(db, &uploads, &config.storage.static_dir);

    let stopper = Arc::clone(&server);
    ctrlc::set_handler(move || {
        tracing::info!("Shutting down gracefully...");
        stopper.unblock();
    })
    .map_err(|e| io::Error::other(e.to_string()))?;

    let url = format!("http://localhost:{}", config.server.port);
    tracing::info!("Civic Issue Reporter server running on {}", addr);
    tracing::info!("Citizen portal: {}", url);
    tracing::info!("Admin dashboard: {}/admin", url);

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(&api, request) {
            tracing::warn!(error = %e, "failed to respond");
        }
    }

    Ok(())
}

fn handle_request(api: &Api<'_>, mut request: Request) -> io::Result<()> {
    let method = request.method().clone();
    let url = request.url().to_string();
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_string());

    let mut body = Vec::new();
    if matches!(method, Method::Post | Method::Put) {
        // One byte past the limit is enough to know it is too large
        request
            .as_reader()
            .take(api.body_limit() as u64 + 1)
            .read_to_end(&mut body)?;
    }

    let api_request = ApiRequest {
        method,
        url,
        content_type,
        body,
    };
    let reply = api.handle(&api_request);
    tracing::debug!(method = ?api_request.method, url = %api_request.url, status = reply.status, "request");
    request.respond(reply.into_response())
}
