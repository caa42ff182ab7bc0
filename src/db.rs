//! SQLite issue store with Diesel ORM
//!
//! One table, `issues`. Every write goes through [`IssueSubmission::validate`]
//! or the [`Status`] enum; reads return rows as stored.

use crate::model::{IssueSubmission, NewIssue, Status, ValidationError};
use crate::schema::issues;
use chrono::SecondsFormat;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::{Sqlite, SqliteConnection};
use serde::Serialize;
use std::path::Path;

/// Default database file, relative to the working directory
pub const DEFAULT_DB_FILE: &str = "civic_issues.db";

/// Largest page the list operation will hand out
pub const MAX_PAGE_LIMIT: u32 = 1000;

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable issue row. `admin_notes` is left NULL on creation.
#[derive(Insertable)]
#[diesel(table_name = issues)]
struct NewIssueRow<'a> {
    title: &'a str,
    description: &'a str,
    category: &'a str,
    status: &'a str,
    priority: &'a str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<&'a str>,
    image_path: Option<&'a str>,
    reporter_name: Option<&'a str>,
    reporter_email: Option<&'a str>,
    reporter_phone: Option<&'a str>,
    created_at: &'a str,
    updated_at: &'a str,
}

/// Queryable issue
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = issues)]
pub struct Issue {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: String,
    pub priority: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub image_path: Option<String>,
    pub reporter_name: Option<String>,
    pub reporter_email: Option<String>,
    pub reporter_phone: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub admin_notes: Option<String>,
}

// ============================================================================
// Query Types
// ============================================================================

/// Conjunctive list filter. Empty or missing values are ignored.
///
/// `status`, `category` and `priority` are exact matches against the stored
/// text, so an unknown value simply matches nothing. `search` is a
/// case-insensitive substring match over title and description.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct IssueFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl IssueFilter {
    fn active(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

/// 1-based offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Result<Self> {
        if page == 0 {
            return Err(ValidationError("page must be at least 1".to_string()).into());
        }
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            ))
            .into());
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

/// One page of issues plus the total matching the filter
#[derive(Debug, Clone, Serialize)]
pub struct IssuePage {
    pub issues: Vec<Issue>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// Dashboard counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueStats {
    pub total: i64,
    pub reported: i64,
    #[serde(rename = "inProgress")]
    pub in_progress: i64,
    pub resolved: i64,
    /// Most frequent first
    pub categories: Vec<CategoryCount>,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Issue store handle backed by a pool of SQLite connections
pub struct Database {
    pool: DbPool,
}

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Issue not found")]
    NotFound(i32),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("{0}")]
    Storage(#[from] diesel::result::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Current time as stored in `created_at` / `updated_at`.
/// Fixed-width UTC so text ordering matches time ordering.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    /// Open (creating if needed) the database at `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Connection(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        tracing::debug!(path = %path.display(), "issue store ready");
        Ok(db)
    }

    /// Release the handle. Pooled connections close once dropped.
    pub fn close(self) {
        drop(self.pool);
        tracing::info!("Database connection closed");
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| StoreError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        // AUTOINCREMENT keeps ids from being reused
        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS issues (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'reported',
                priority TEXT NOT NULL DEFAULT 'medium',
                latitude REAL,
                longitude REAL,
                address TEXT,
                image_path TEXT,
                reporter_name TEXT,
                reporter_email TEXT,
                reporter_phone TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                admin_notes TEXT
            )
        "#).execute(&mut conn)?;

        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_issues_category ON issues(category)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues(created_at)").execute(&mut conn)?;
        Ok(())
    }

    // ========================================================================
    // Issue Operations
    // ========================================================================

    /// Validate and insert a citizen submission.
    ///
    /// Any status in the submission is ignored; new issues are always
    /// `reported`. Returns the new id.
    pub fn create_issue(&self, submission: &IssueSubmission) -> Result<i32> {
        let issue = submission.validate()?;
        self.insert(&issue)
    }

    fn insert(&self, issue: &NewIssue) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = timestamp_now();

        let row = NewIssueRow {
            title: &issue.title,
            description: &issue.description,
            category: issue.category.as_str(),
            status: Status::Reported.as_str(),
            priority: issue.priority.as_str(),
            latitude: issue.latitude,
            longitude: issue.longitude,
            address: issue.address.as_deref(),
            image_path: issue.image_path.as_deref(),
            reporter_name: issue.reporter_name.as_deref(),
            reporter_email: issue.reporter_email.as_deref(),
            reporter_phone: issue.reporter_phone.as_deref(),
            created_at: &now,
            updated_at: &now,
        };

        diesel::insert_into(issues::table)
            .values(&row)
            .execute(&mut conn)?;

        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
            .first(&mut conn)?;

        tracing::info!(id, category = %issue.category, "issue reported");
        Ok(id)
    }

    /// Get one issue by id
    pub fn get_issue(&self, id: i32) -> Result<Issue> {
        let mut conn = self.get_conn()?;
        issues::table
            .find(id)
            .first::<Issue>(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound(id))
    }

    /// List one page of issues, newest first
    pub fn list_issues(&self, filter: &IssueFilter, pagination: Pagination) -> Result<IssuePage> {
        let mut conn = self.get_conn()?;

        let total: i64 = filtered(filter).count().get_result(&mut conn)?;
        let issues = filtered(filter)
            .order((issues::created_at.desc(), issues::id.desc()))
            .limit(i64::from(pagination.limit))
            .offset(pagination.offset())
            .load::<Issue>(&mut conn)?;

        Ok(IssuePage {
            issues,
            total,
            page: pagination.page,
            limit: pagination.limit,
        })
    }

    /// Every issue matching the filter, newest first
    pub fn all_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut conn = self.get_conn()?;
        let issues = filtered(filter)
            .order((issues::created_at.desc(), issues::id.desc()))
            .load::<Issue>(&mut conn)?;
        Ok(issues)
    }

    /// Set status and admin notes, refreshing `updated_at`.
    ///
    /// `admin_notes` replaces whatever was there, so `None` clears it.
    pub fn update_status(&self, id: i32, status: Status, admin_notes: Option<&str>) -> Result<()> {
        let mut conn = self.get_conn()?;

        conn.transaction::<_, StoreError, _>(|conn| {
            let previous: String = issues::table
                .find(id)
                .select(issues::updated_at)
                .first(conn)
                .optional()?
                .ok_or(StoreError::NotFound(id))?;

            // Never move updated_at backwards, even if the clock does
            let now = timestamp_now().max(previous);

            diesel::update(issues::table.find(id))
                .set((
                    issues::status.eq(status.as_str()),
                    issues::admin_notes.eq(admin_notes),
                    issues::updated_at.eq(&now),
                ))
                .execute(conn)?;
            Ok(())
        })?;

        tracing::info!(id, status = %status, "issue status updated");
        Ok(())
    }

    /// Totals by status and by category
    pub fn stats(&self) -> Result<IssueStats> {
        let mut conn = self.get_conn()?;

        let total: i64 = issues::table.count().get_result(&mut conn)?;

        let by_status: Vec<(String, i64)> = issues::table
            .group_by(issues::status)
            .select((issues::status, diesel::dsl::count_star()))
            .load(&mut conn)?;
        let status_count = |status: Status| {
            by_status
                .iter()
                .find(|(s, _)| s == status.as_str())
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };

        let mut categories: Vec<CategoryCount> = issues::table
            .group_by(issues::category)
            .select((issues::category, diesel::dsl::count_star()))
            .load::<(String, i64)>(&mut conn)?
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();
        categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));

        Ok(IssueStats {
            total,
            reported: status_count(Status::Reported),
            in_progress: status_count(Status::InProgress),
            resolved: status_count(Status::Resolved),
            categories,
        })
    }
}

/// Escape LIKE wildcards so search text matches literally
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn filtered(filter: &IssueFilter) -> issues::BoxedQuery<'static, Sqlite> {
    let mut query = issues::table.into_boxed();

    if let Some(status) = IssueFilter::active(&filter.status) {
        query = query.filter(issues::status.eq(status.to_string()));
    }
    if let Some(category) = IssueFilter::active(&filter.category) {
        query = query.filter(issues::category.eq(category.to_string()));
    }
    if let Some(priority) = IssueFilter::active(&filter.priority) {
        query = query.filter(issues::priority.eq(priority.to_string()));
    }
    if let Some(search) = IssueFilter::active(&filter.search) {
        let pattern = like_pattern(search);
        query = query.filter(
            issues::title
                .like(pattern.clone())
                .escape('\\')
                .or(issues::description.like(pattern).escape('\\')),
        );
    }
    query
}
