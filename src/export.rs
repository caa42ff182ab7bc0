//! CSV export of issues
//!
//! Same layout as the dashboard's download: free-text columns are quoted
//! with embedded quotes doubled, ids, enum values and timestamps are bare.

use crate::db::Issue;

pub const CSV_HEADERS: [&str; 13] = [
    "ID",
    "Title",
    "Description",
    "Category",
    "Status",
    "Priority",
    "Address",
    "Reporter Name",
    "Reporter Email",
    "Reporter Phone",
    "Created",
    "Updated",
    "Admin Notes",
];

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn quote_opt(s: &Option<String>) -> String {
    quote(s.as_deref().unwrap_or_default())
}

fn csv_row(issue: &Issue) -> String {
    [
        issue.id.to_string(),
        quote(&issue.title),
        quote(&issue.description),
        issue.category.clone(),
        issue.status.clone(),
        issue.priority.clone(),
        quote_opt(&issue.address),
        quote_opt(&issue.reporter_name),
        quote_opt(&issue.reporter_email),
        quote_opt(&issue.reporter_phone),
        issue.created_at.clone(),
        issue.updated_at.clone(),
        quote_opt(&issue.admin_notes),
    ]
    .join(",")
}

/// Render issues as CSV, header first, rows joined by `\n`
pub fn issues_to_csv(issues: &[Issue]) -> String {
    std::iter::once(CSV_HEADERS.join(","))
        .chain(issues.iter().map(csv_row))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `civic-issues-YYYY-MM-DD.csv` for the given date
pub fn export_filename(date: chrono::NaiveDate) -> String {
    format!("civic-issues-{}.csv", date.format("%Y-%m-%d"))
}
