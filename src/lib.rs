//! Civic - municipal issue reporting
//!
//! Citizens report problems (potholes, broken streetlights, overflowing
//! drains) with an optional photo and location; administrators triage them
//! from a dashboard.
//!
//! # Overview
//!
//! Everything is stored in a single SQLite table. The HTTP API in [`serve`]
//! maps requests onto [`Database`] calls one-to-one.
//!
//! # Issue Lifecycle
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `reported` | Every new issue starts here, whatever the submitter sent |
//! | `in_progress` | An administrator has picked it up |
//! | `resolved` | Fixed |
//!
//! Transitions are free-form: any status may follow any other.
//!
//! # Quick Start
//!
//! ```no_run
//! use civic::{Database, IssueFilter, IssueSubmission, Pagination, Status};
//!
//! let db = Database::open_at("civic_issues.db").unwrap();
//!
//! let id = db.create_issue(&IssueSubmission {
//!     title: Some("Broken streetlight on Main St".into()),
//!     description: Some("Out for two weeks".into()),
//!     category: Some("lighting".into()),
//!     ..Default::default()
//! }).unwrap();
//!
//! db.update_status(id, Status::InProgress, Some("Crew scheduled")).unwrap();
//!
//! let page = db.list_issues(&IssueFilter::default(), Pagination::default()).unwrap();
//! println!("{} issues", page.total);
//! ```

pub mod config;
pub mod db;
pub mod export;
pub mod form;
pub mod model;
pub mod schema;
pub mod serve;
pub mod upload;

pub use config::Config;
pub use db::{
    CategoryCount, Database, Issue, IssueFilter, IssuePage, IssueStats, Pagination, StoreError,
};
pub use export::issues_to_csv;
pub use model::{Category, IssueSubmission, Priority, Status, ValidationError};
pub use upload::{UploadError, UploadStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify core types are re-exported from crate root
        assert_eq!(Status::default(), Status::Reported);
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(Category::ALL.len(), 8);
    }
}
