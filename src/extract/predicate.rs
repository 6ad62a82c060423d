//! Element predicates used to locate an anchor.
//!
//! Predicates are written in configuration as short selector strings:
//!
//! | Syntax         | Predicate                    |
//! |----------------|------------------------------|
//! | `#singlePage`  | [`Predicate::Id`]            |
//! | `.article`     | [`Predicate::Class`]         |
//! | `p`            | [`Predicate::Tag`]           |
//! | `[role=main]`  | [`Predicate::Attr`]          |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::node::Node;
use super::tokenizer::Attribute;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Predicate {
    /// Some `id` attribute equals the value.
    Id(String),
    /// Some `class` attribute contains every whitespace-separated token of the value.
    Class(String),
    /// The tag name equals the value (lowercase).
    Tag(String),
    /// Some attribute `name` equals `value`.
    Attr { name: String, value: String },
}

impl Predicate {
    pub fn matches(&self, tag: &str, attrs: &[Attribute]) -> bool {
        match self {
            Predicate::Tag(name) => tag == name.as_str(),
            Predicate::Id(id) => has_attribute(attrs, "id", |v| v == id.as_str()),
            Predicate::Class(class) => has_attribute(attrs, "class", |v| {
                class
                    .split_whitespace()
                    .all(|wanted| v.split_whitespace().any(|token| token == wanted))
            }),
            Predicate::Attr { name, value } => has_attribute(attrs, name, |v| v == value.as_str()),
        }
    }

    pub fn matches_node(&self, node: &Node) -> bool {
        self.matches(&node.name, &node.attrs)
    }
}

fn has_attribute(attrs: &[Attribute], name: &str, accept: impl Fn(&str) -> bool) -> bool {
    attrs.iter().any(|a| a.name == name && accept(&a.value))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Id(id) => write!(f, "#{id}"),
            Predicate::Class(class) => write!(f, ".{class}"),
            Predicate::Tag(tag) => write!(f, "{tag}"),
            Predicate::Attr { name, value } => write!(f, "[{name}={value}]"),
        }
    }
}

impl FromStr for Predicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("invalid predicate `{s}`");

        if let Some(id) = s.strip_prefix('#') {
            return non_empty(id).map(|id| Predicate::Id(id.to_string())).ok_or_else(invalid);
        }
        if let Some(class) = s.strip_prefix('.') {
            return non_empty(class)
                .map(|class| Predicate::Class(class.to_string()))
                .ok_or_else(invalid);
        }
        if let Some(inner) = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let (name, value) = inner.split_once('=').ok_or_else(invalid)?;
            let name = non_empty(name.trim()).ok_or_else(invalid)?;
            let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');
            return Ok(Predicate::Attr {
                name: name.to_ascii_lowercase(),
                value: value.to_string(),
            });
        }
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Ok(Predicate::Tag(s.to_ascii_lowercase()));
        }
        Err(invalid())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

impl TryFrom<String> for Predicate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Predicate> for String {
    fn from(predicate: Predicate) -> Self {
        predicate.to_string()
    }
}
