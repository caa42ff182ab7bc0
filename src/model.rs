//! Issue vocabulary and submission validation
//!
//! Categories, statuses and priorities are stored as plain text; these enums
//! are the checked form used on every write path.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Input rejected before it reaches storage
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => {
                        let valid: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        Err(ValidationError(format!(
                            "Invalid {} '{}'. Expected one of: {}",
                            $what,
                            other,
                            valid.join(", ")
                        )))
                    }
                }
            }
        }
    };
}

text_enum! {
    /// What kind of civic problem was reported
    Category, "category" {
        Roads => "roads",
        Sanitation => "sanitation",
        Lighting => "lighting",
        Water => "water",
        Drainage => "drainage",
        Parks => "parks",
        Safety => "safety",
        Other => "other",
    }
}

text_enum! {
    /// Lifecycle tag. Any status may move to any other.
    #[derive(Default)]
    Status, "status" {
        #[default]
        Reported => "reported",
        InProgress => "in_progress",
        Resolved => "resolved",
    }
}

text_enum! {
    #[derive(Default)]
    Priority, "priority" {
        Low => "low",
        #[default]
        Medium => "medium",
        High => "high",
    }
}

/// Raw citizen submission as it arrives from a form or JSON body.
///
/// Every field is optional text; blank values count as absent. Numbers are
/// accepted for any field so JSON clients can send coordinates as numbers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueSubmission {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: Option<String>,
    /// Accepted but never honoured: new issues always start as `reported`
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub latitude: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub longitude: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reporter_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reporter_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reporter_phone: Option<String>,
    /// Set by the server after a successful upload, never by the client
    #[serde(skip)]
    pub image_path: Option<String>,
}

/// A submission that passed validation, ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub image_path: Option<String>,
    pub reporter_name: Option<String>,
    pub reporter_email: Option<String>,
    pub reporter_phone: Option<String>,
}

impl IssueSubmission {
    /// Assign a form field by name. Returns false for unknown names.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "title" => &mut self.title,
            "description" => &mut self.description,
            "category" => &mut self.category,
            "status" => &mut self.status,
            "priority" => &mut self.priority,
            "latitude" => &mut self.latitude,
            "longitude" => &mut self.longitude,
            "address" => &mut self.address,
            "reporter_name" => &mut self.reporter_name,
            "reporter_email" => &mut self.reporter_email,
            "reporter_phone" => &mut self.reporter_phone,
            _ => return false,
        };
        *slot = non_blank(value);
        true
    }

    /// Check required fields and parse enums and coordinates
    pub fn validate(&self) -> Result<NewIssue, ValidationError> {
        let title = required(&self.title, "title")?;
        let description = required(&self.description, "description")?;
        let category: Category = required(&self.category, "category")?.parse()?;
        let priority = match present(&self.priority) {
            Some(p) => p.parse()?,
            None => Priority::default(),
        };

        let latitude = coordinate(&self.latitude, "latitude", 90.0)?;
        let longitude = coordinate(&self.longitude, "longitude", 180.0)?;
        if latitude.is_some() != longitude.is_some() {
            return Err(ValidationError(
                "latitude and longitude must be provided together".to_string(),
            ));
        }

        Ok(NewIssue {
            title,
            description,
            category,
            priority,
            latitude,
            longitude,
            address: present(&self.address),
            image_path: present(&self.image_path),
            reporter_name: present(&self.reporter_name),
            reporter_email: present(&self.reporter_email),
            reporter_phone: present(&self.reporter_phone),
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn required(value: &Option<String>, field: &str) -> Result<String, ValidationError> {
    present(value).ok_or_else(|| ValidationError(format!("{} is required", field)))
}

fn coordinate(value: &Option<String>, field: &str, bound: f64) -> Result<Option<f64>, ValidationError> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    let parsed: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError(format!("{} must be a number, got '{}'", field, raw.trim())))?;
    if !parsed.is_finite() || parsed.abs() > bound {
        return Err(ValidationError(format!(
            "{} must be between -{} and {}",
            field, bound, bound
        )));
    }
    Ok(Some(parsed))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Integer(i64),
    Float(f64),
}

/// Deserialize an optional text field that may arrive as a JSON number
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<TextOrNumber>::deserialize(deserializer)?;
    Ok(match value {
        None => None,
        Some(TextOrNumber::Text(s)) => non_blank(s),
        Some(TextOrNumber::Integer(n)) => Some(n.to_string()),
        Some(TextOrNumber::Float(n)) if n.is_finite() => Some(n.to_string()),
        Some(TextOrNumber::Float(_)) => return Err(de::Error::custom("number out of range")),
    })
}
