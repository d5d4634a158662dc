//! Issue and thesis domain projections.
//!
//! # Responsibility
//! - Define the typed shape of the two entity kinds the history tracks.
//! - Convert between typed records and versioned `Attributes` snapshots.
//!
//! # Invariants
//! - An issue is always a `Root`; a thesis is always a `Child`.
//! - `title` and `summary` are non-blank after trim.
//! - Conversion from attributes rejects missing or mistyped fields instead of
//!   defaulting them.

use super::entity::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Side a thesis argues for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThesisPosition {
    For,
    Against,
}

impl ThesisPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::For => "for",
            Self::Against => "against",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "for" => Some(Self::For),
            "against" => Some(Self::Against),
            _ => None,
        }
    }
}

/// Aggregate root: the question under debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    pub description: String,
}

/// Aggregate child: one argument attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thesis {
    pub summary: String,
    pub position: ThesisPosition,
}

/// Typed projection failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    /// Required field is blank after trim.
    Blank(&'static str),
    /// Required field is absent from the snapshot.
    Missing(&'static str),
    /// Field exists but holds an unexpected value.
    Invalid { field: &'static str, value: String },
}

impl Display for AttributeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank(field) => write!(f, "`{field}` must not be blank"),
            Self::Missing(field) => write!(f, "missing attribute `{field}`"),
            Self::Invalid { field, value } => {
                write!(f, "invalid value `{value}` for attribute `{field}`")
            }
        }
    }
}

impl Error for AttributeError {}

impl Issue {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<(), AttributeError> {
        if self.title.trim().is_empty() {
            return Err(AttributeError::Blank("title"));
        }
        Ok(())
    }

    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("title".to_string(), Value::from(self.title.as_str()));
        attributes.insert(
            "description".to_string(),
            Value::from(self.description.as_str()),
        );
        attributes
    }

    pub fn from_attributes(attributes: &Attributes) -> Result<Self, AttributeError> {
        let issue = Self {
            title: required_str(attributes, "title")?.to_string(),
            description: required_str(attributes, "description")?.to_string(),
        };
        issue.validate()?;
        Ok(issue)
    }
}

impl Thesis {
    pub fn new(summary: impl Into<String>, position: ThesisPosition) -> Self {
        Self {
            summary: summary.into(),
            position,
        }
    }

    pub fn validate(&self) -> Result<(), AttributeError> {
        if self.summary.trim().is_empty() {
            return Err(AttributeError::Blank("summary"));
        }
        Ok(())
    }

    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("summary".to_string(), Value::from(self.summary.as_str()));
        attributes.insert(
            "position".to_string(),
            Value::from(self.position.as_str()),
        );
        attributes
    }

    pub fn from_attributes(attributes: &Attributes) -> Result<Self, AttributeError> {
        let position_text = required_str(attributes, "position")?;
        let position =
            ThesisPosition::parse(position_text).ok_or_else(|| AttributeError::Invalid {
                field: "position",
                value: position_text.to_string(),
            })?;
        let thesis = Self {
            summary: required_str(attributes, "summary")?.to_string(),
            position,
        };
        thesis.validate()?;
        Ok(thesis)
    }
}

fn required_str<'a>(
    attributes: &'a Attributes,
    field: &'static str,
) -> Result<&'a str, AttributeError> {
    match attributes.get(field) {
        None => Err(AttributeError::Missing(field)),
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(other) => Err(AttributeError::Invalid {
            field,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeError, Issue, Thesis, ThesisPosition};
    use serde_json::json;

    #[test]
    fn thesis_attributes_roundtrip() {
        let thesis = Thesis::new("Lower the speed limit", ThesisPosition::Against);
        let attributes = thesis.to_attributes();
        assert_eq!(attributes["position"], json!("against"));
        assert_eq!(Thesis::from_attributes(&attributes).unwrap(), thesis);
    }

    #[test]
    fn thesis_rejects_unknown_position() {
        let mut attributes = Thesis::new("x", ThesisPosition::For).to_attributes();
        attributes.insert("position".to_string(), json!("sideways"));
        let err = Thesis::from_attributes(&attributes).unwrap_err();
        assert!(matches!(err, AttributeError::Invalid { field: "position", .. }));
    }

    #[test]
    fn issue_requires_title() {
        let err = Issue::new("   ", "body").validate().unwrap_err();
        assert_eq!(err, AttributeError::Blank("title"));

        let mut attributes = Issue::new("t", "d").to_attributes();
        attributes.remove("description");
        assert_eq!(
            Issue::from_attributes(&attributes).unwrap_err(),
            AttributeError::Missing("description")
        );
    }
}
