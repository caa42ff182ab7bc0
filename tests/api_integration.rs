//! End-to-end tests for the HTTP API
//!
//! Requests go through `Api::handle` against a real SQLite file and upload
//! directory, so everything except the socket is exercised.

use civic::serve::{Api, ApiRequest, ReplyBody};
use civic::upload::DEFAULT_MAX_UPLOAD_BYTES;
use civic::{Database, UploadStore};
use std::path::PathBuf;
use tempfile::TempDir;
use tiny_http::Method;

const BOUNDARY: &str = "----civictestboundary";

struct Env {
    dir: TempDir,
    db: Database,
    uploads: UploadStore,
    static_dir: PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("civic.db")).unwrap();
        let uploads = UploadStore::new(dir.path().join("uploads"), DEFAULT_MAX_UPLOAD_BYTES);
        let static_dir = dir.path().join("public");
        std::fs::create_dir_all(&static_dir).unwrap();
        Self {
            dir,
            db,
            uploads,
            static_dir,
        }
    }

    fn api(&self) -> Api<'_> {
        Api::new(&self.db, &self.uploads, &self.static_dir)
    }

    fn stored_uploads(&self) -> usize {
        match std::fs::read_dir(self.dir.path().join("uploads")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

struct Photo<'a> {
    filename: &'a str,
    content_type: &'a str,
    data: Vec<u8>,
}

fn multipart(fields: &[(&str, &str)], photo: Option<Photo<'_>>) -> ApiRequest {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(photo) = photo {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, photo.filename, photo.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(&photo.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    ApiRequest::new(Method::Post, "/api/issues").with_body(
        &format!("multipart/form-data; boundary={}", BOUNDARY),
        body,
    )
}

fn streetlight_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("title", "Broken streetlight on Main St"),
        ("description", "The light at the corner has been out for two weeks"),
        ("category", "lighting"),
        ("priority", "high"),
        ("latitude", "40.7128"),
        ("longitude", "-74.0060"),
        ("address", "123 Main St"),
    ]
}

fn json_post(env: &Env, body: &str) -> i64 {
    let reply = env.api().handle(
        &ApiRequest::new(Method::Post, "/api/issues").with_body("application/json", body),
    );
    assert_eq!(reply.status, 200, "create failed: {:?}", reply.json_body());
    reply.json_body().unwrap()["id"].as_i64().unwrap()
}

fn get_json(env: &Env, url: &str) -> (u16, serde_json::Value) {
    let reply = env.api().handle(&ApiRequest::new(Method::Get, url));
    (reply.status, reply.json_body().unwrap_or_default())
}

// =============================================================================
// Submission Tests
// =============================================================================

#[test]
fn test_multipart_submission_with_photo() {
    let env = Env::new();
    let reply = env.api().handle(&multipart(
        &streetlight_fields(),
        Some(Photo {
            filename: "lamp.jpg",
            content_type: "image/jpeg",
            data: vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3],
        }),
    ));
    assert_eq!(reply.status, 200, "{:?}", reply.json_body());
    let id = reply.json_body().unwrap()["id"].as_i64().unwrap();

    let (status, issue) = get_json(&env, &format!("/api/issues/{}", id));
    assert_eq!(status, 200);
    assert_eq!(issue["title"], "Broken streetlight on Main St");
    assert_eq!(issue["status"], "reported");
    assert_eq!(issue["priority"], "high");
    assert_eq!(issue["latitude"], 40.7128);
    assert_eq!(issue["longitude"], -74.006);
    assert_eq!(issue["address"], "123 Main St");
    assert!(issue["admin_notes"].is_null());

    let image = issue["image_path"].as_str().unwrap().to_string();
    assert!(image.ends_with(".jpg"));
    assert_eq!(env.stored_uploads(), 1);

    let reply = env
        .api()
        .handle(&ApiRequest::new(Method::Get, format!("/uploads/{}", image)));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type, "image/jpeg");
    match reply.body {
        ReplyBody::File(path) => {
            assert_eq!(std::fs::read(path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3])
        }
        other => panic!("expected a file reply, got {:?}", other),
    }
}

#[test]
fn test_oversized_photo_rejected_without_side_effects() {
    let env = Env::new();
    let reply = env.api().handle(&multipart(
        &streetlight_fields(),
        Some(Photo {
            filename: "huge.png",
            content_type: "image/png",
            data: vec![0u8; 6_000_000],
        }),
    ));
    assert_eq!(reply.status, 413);
    assert!(reply.json_body().unwrap()["error"].is_string());

    let (_, page) = get_json(&env, "/api/issues");
    assert_eq!(page["total"], 0);
    assert_eq!(env.stored_uploads(), 0);
}

#[test]
fn test_non_image_rejected() {
    let env = Env::new();
    let reply = env.api().handle(&multipart(
        &streetlight_fields(),
        Some(Photo {
            filename: "notes.txt",
            content_type: "text/plain",
            data: b"not a photo".to_vec(),
        }),
    ));
    assert_eq!(reply.status, 400);
    assert!(reply.json_body().unwrap()["error"]
        .as_str()
        .unwrap()
        .starts_with("Only images are allowed"));

    let (_, page) = get_json(&env, "/api/issues");
    assert_eq!(page["total"], 0);
    assert_eq!(env.stored_uploads(), 0);
}

#[test]
fn test_invalid_submission_leaves_no_orphaned_photo() {
    let env = Env::new();
    let reply = env.api().handle(&multipart(
        &[("title", "No description"), ("category", "roads")],
        Some(Photo {
            filename: "pothole.png",
            content_type: "image/png",
            data: vec![0x89, b'P', b'N', b'G'],
        }),
    ));
    assert_eq!(reply.status, 400);
    assert_eq!(env.stored_uploads(), 0);
}

#[test]
fn test_submitted_status_is_ignored() {
    let env = Env::new();
    let id = json_post(
        &env,
        r#"{"title":"Overflowing bin","description":"Not emptied","category":"sanitation","status":"resolved"}"#,
    );
    let (_, issue) = get_json(&env, &format!("/api/issues/{}", id));
    assert_eq!(issue["status"], "reported");
}

#[test]
fn test_urlencoded_submission() {
    let env = Env::new();
    let reply = env.api().handle(
        &ApiRequest::new(Method::Post, "/api/issues").with_body(
            "application/x-www-form-urlencoded",
            "title=Blocked+drain&description=Water+pooling&category=drainage",
        ),
    );
    assert_eq!(reply.status, 200);
    let (_, page) = get_json(&env, "/api/issues?category=drainage");
    assert_eq!(page["total"], 1);
    assert_eq!(page["issues"][0]["title"], "Blocked drain");
}

// =============================================================================
// Admin Workflow Tests
// =============================================================================

#[test]
fn test_status_update_and_stats() {
    let env = Env::new();
    let mut ids = Vec::new();
    for (title, category) in [
        ("Pothole", "roads"),
        ("Cracked kerb", "roads"),
        ("Dark path", "lighting"),
        ("Leaking hydrant", "water"),
    ] {
        ids.push(json_post(
            &env,
            &format!(
                r#"{{"title":"{}","description":"Needs attention","category":"{}"}}"#,
                title, category
            ),
        ));
    }

    let reply = env.api().handle(
        &ApiRequest::new(Method::Put, format!("/api/issues/{}/status", ids[3]))
            .with_body("application/json", r#"{"status":"in_progress","admin_notes":"Crew dispatched"}"#),
    );
    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.json_body().unwrap()["message"],
        "Issue status updated successfully"
    );

    let (status, stats) = get_json(&env, "/api/stats");
    assert_eq!(status, 200);
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["reported"], 3);
    assert_eq!(stats["inProgress"], 1);
    assert_eq!(stats["resolved"], 0);
    assert_eq!(stats["categories"][0]["category"], "roads");
    assert_eq!(stats["categories"][0]["count"], 2);

    let (_, issue) = get_json(&env, &format!("/api/issues/{}", ids[3]));
    assert_eq!(issue["status"], "in_progress");
    assert_eq!(issue["admin_notes"], "Crew dispatched");
    assert!(issue["updated_at"].as_str().unwrap() >= issue["created_at"].as_str().unwrap());

    let reply = env.api().handle(
        &ApiRequest::new(Method::Put, "/api/issues/9999/status")
            .with_body("application/json", r#"{"status":"resolved"}"#),
    );
    assert_eq!(reply.status, 404);
    assert_eq!(reply.json_body().unwrap()["error"], "Issue not found");
}

#[test]
fn test_listing_pages_and_filters() {
    let env = Env::new();
    for n in 0..7 {
        json_post(
            &env,
            &format!(
                r#"{{"title":"Issue {}","description":"Details","category":"{}"}}"#,
                n,
                if n % 2 == 0 { "roads" } else { "parks" }
            ),
        );
    }

    let (_, first) = get_json(&env, "/api/issues?page=1&limit=3");
    let (_, last) = get_json(&env, "/api/issues?page=3&limit=3");
    assert_eq!(first["total"], 7);
    assert_eq!(first["issues"].as_array().unwrap().len(), 3);
    assert_eq!(first["issues"][0]["title"], "Issue 6");
    assert_eq!(last["total"], 7);
    assert_eq!(last["issues"].as_array().unwrap().len(), 1);
    assert_eq!(last["issues"][0]["title"], "Issue 0");

    let (_, roads) = get_json(&env, "/api/issues?category=roads&status=reported");
    assert_eq!(roads["total"], 4);

    let (_, none) = get_json(&env, "/api/issues?status=resolved");
    assert_eq!(none["total"], 0);
    assert_eq!(none["issues"].as_array().unwrap().len(), 0);
}
