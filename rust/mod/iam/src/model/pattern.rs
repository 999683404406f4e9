use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An exact permission code: `resource.action`.
///
/// This is what route handlers ask about ("may this user do
/// `measurement.create`?"). Codes are always fully qualified — wildcards
/// exist only in stored grants ([`Pattern`]), never in checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionCode {
    pub resource: String,
    pub action: String,
}

impl PermissionCode {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl FromStr for PermissionCode {
    type Err = PatternParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_code(s) {
            Some((resource, action)) if action != "*" => Ok(Self {
                resource: resource.to_string(),
                action: action.to_string(),
            }),
            _ => Err(PatternParseError::new(s)),
        }
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

/// A stored permission pattern.
///
/// Three shapes, modeled as an explicit sum type so matching is total
/// and typo-class strings ("customer.**", "customer.") cannot be stored:
///
/// - `Global` — the `*` wildcard, grants everything
/// - `Resource("customer")` — `customer.*`, grants every action on one resource
/// - `Exact { .. }` — `customer.view`, grants one operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pattern {
    Global,
    Resource(String),
    Exact { resource: String, action: String },
}

impl Pattern {
    /// Whether this pattern grants the given exact code.
    pub fn matches(&self, code: &PermissionCode) -> bool {
        match self {
            Pattern::Global => true,
            Pattern::Resource(resource) => *resource == code.resource,
            Pattern::Exact { resource, action } => {
                *resource == code.resource && *action == code.action
            }
        }
    }

    /// Convenience constructor for an exact pattern.
    pub fn exact(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Pattern::Exact {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Convenience constructor for a resource wildcard.
    pub fn resource(resource: impl Into<String>) -> Self {
        Pattern::Resource(resource.into())
    }
}

impl FromStr for Pattern {
    type Err = PatternParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Pattern::Global);
        }
        match split_code(s) {
            Some((resource, "*")) => Ok(Pattern::Resource(resource.to_string())),
            Some((resource, action)) => Ok(Pattern::Exact {
                resource: resource.to_string(),
                action: action.to_string(),
            }),
            None => Err(PatternParseError::new(s)),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Global => f.write_str("*"),
            Pattern::Resource(resource) => write!(f, "{}.*", resource),
            Pattern::Exact { resource, action } => write!(f, "{}.{}", resource, action),
        }
    }
}

impl TryFrom<String> for Pattern {
    type Error = PatternParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Pattern> for String {
    fn from(p: Pattern) -> Self {
        p.to_string()
    }
}

/// Split `resource.action` into its two segments, rejecting malformed
/// input. Segments are lowercase ASCII identifiers (underscores allowed);
/// the action may be the literal `*`.
fn split_code(s: &str) -> Option<(&str, &str)> {
    let (resource, action) = s.split_once('.')?;
    if !is_segment(resource) {
        return None;
    }
    if action != "*" && !is_segment(action) {
        return None;
    }
    Some((resource, action))
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Error for a string that is not a well-formed pattern or code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternParseError {
    input: String,
}

impl PatternParseError {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

impl fmt::Display for PatternParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed permission pattern '{}'", self.input)
    }
}

impl std::error::Error for PatternParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shapes() {
        assert_eq!("*".parse::<Pattern>().unwrap(), Pattern::Global);
        assert_eq!(
            "customer.*".parse::<Pattern>().unwrap(),
            Pattern::resource("customer")
        );
        assert_eq!(
            "measurement.create".parse::<Pattern>().unwrap(),
            Pattern::exact("measurement", "create")
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", ".", "customer.", ".view", "customer", "Customer.View",
                    "customer.view.extra", "*.view", "customer.**"] {
            assert!(bad.parse::<Pattern>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_code_rejects_wildcards() {
        assert!("*".parse::<PermissionCode>().is_err());
        assert!("customer.*".parse::<PermissionCode>().is_err());
        assert!("customer.view".parse::<PermissionCode>().is_ok());
    }

    #[test]
    fn test_matching() {
        let view: PermissionCode = "customer.view".parse().unwrap();
        let create: PermissionCode = "customer.create".parse().unwrap();
        let stack_view: PermissionCode = "stack.view".parse().unwrap();

        assert!(Pattern::Global.matches(&view));
        assert!(Pattern::resource("customer").matches(&view));
        assert!(Pattern::resource("customer").matches(&create));
        assert!(!Pattern::resource("customer").matches(&stack_view));
        assert!(Pattern::exact("customer", "view").matches(&view));
        assert!(!Pattern::exact("customer", "view").matches(&create));
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["*", "customer.*", "measurement.import"] {
            let p: Pattern = s.parse().unwrap();
            assert_eq!(p.to_string(), s);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let p: Pattern = "report.*".parse().unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"report.*\"");
        let back: Pattern = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);

        // Malformed strings are rejected at deserialization time.
        assert!(serde_json::from_str::<Pattern>("\"not a pattern\"").is_err());
    }
}
