use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

pub mod comment;
pub mod project;
pub mod task;
pub mod task_log;
pub mod user;

/// Priority shared by projects and tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(AppError::bad_request(format!(
                "Invalid priority '{other}'. Must be: low, medium, or high"
            ))),
        }
    }
}

/// Tags are stored as a JSON array in a TEXT column.
pub(crate) fn tags_to_column(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn tags_from_column(raw: &str) -> Result<Vec<String>, AppError> {
    serde_json::from_str(raw).map_err(|err| AppError::internal(format!("invalid tags column: {err}")))
}

/// Trims tags and drops empties and duplicates, keeping first-seen order.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parses_lowercase_only() {
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert!("High".parse::<Priority>().is_err());
    }

    #[test]
    fn tags_are_normalized() {
        let tags = normalize_tags(vec![" api ".into(), "".into(), "api".into(), "ui".into()]);
        assert_eq!(tags, vec!["api", "ui"]);
        assert_eq!(tags_from_column(&tags_to_column(&tags)).unwrap(), tags);
    }
}
