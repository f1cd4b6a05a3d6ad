//! Tags are `key:value` labels attached to events.
//!
//! Events are filtered by tag containment: a query item with tags `{a:1, b:2}`
//! matches an event whose tag set is a superset of both. Within a record the
//! canonical wire form of a tag is the single string `"key:value"`, split on
//! the first `:`, so a key can never contain a colon while a value may.
//!
//! # Examples
//!
//! ```
//! use dcb::Tag;
//!
//! let tag = Tag::new("course_id", "c1").unwrap();
//! assert_eq!(tag.to_string(), "course_id:c1");
//!
//! let parsed = Tag::parse("course_id:c1").unwrap();
//! assert_eq!(parsed, tag);
//! ```
//!
//! # The `lock:` namespace
//!
//! Tags with the key `lock` are not filter tags. They instruct the store to
//! serialize the append on a named resource and are stripped before the
//! event is persisted, so they never surface through query predicates:
//!
//! ```
//! use dcb::Tag;
//!
//! let directive = Tag::parse("lock:seat:c1").unwrap();
//! assert!(directive.is_lock_directive());
//! assert_eq!(directive.lock_resource(), Some("seat:c1"));
//! ```
use crate::error::ValidationError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Key reserved for lock directives.
pub const LOCK_TAG_KEY: &str = "lock";

/// Maximum length of a tag value in bytes.
pub const MAX_TAG_VALUE_LEN: usize = 256;

/// A validated `(key, value)` pair.
///
/// Tags are semantically unordered within an event; the store keeps them
/// lexicographically sorted so equal tag sets have equal representations.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Creates a tag from a key and a value.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the key does not match
    /// `[a-zA-Z0-9_][a-zA-Z0-9_.-]*`, or if the value is empty, longer than
    /// [`MAX_TAG_VALUE_LEN`] bytes, or contains control characters.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        let value = value.into();
        if !Self::is_valid_key(&key) {
            return Err(ValidationError::InvalidTagKey(key));
        }
        if value.is_empty() {
            return Err(ValidationError::InvalidTagValue {
                key,
                reason: "value is empty".into(),
            });
        }
        if value.len() > MAX_TAG_VALUE_LEN {
            return Err(ValidationError::InvalidTagValue {
                key,
                reason: format!("value exceeds {MAX_TAG_VALUE_LEN} bytes"),
            });
        }
        if value.chars().any(char::is_control) {
            return Err(ValidationError::InvalidTagValue {
                key,
                reason: "value contains control characters".into(),
            });
        }
        Ok(Self { key, value })
    }

    /// Parses the wire form `key:value`, splitting on the first `:`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let (key, value) = s
            .split_once(':')
            .ok_or_else(|| ValidationError::MalformedTag(s.to_string()))?;
        Self::new(key, value)
    }

    /// Whether a string is acceptable as a tag key.
    pub fn is_valid_key(s: &str) -> bool {
        lazy_static! {
            static ref RE: Regex = Regex::new("^[a-zA-Z0-9_][a-zA-Z0-9_.-]*$").unwrap();
        }
        RE.is_match(s)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether this tag is a `lock:` directive rather than a filter tag.
    pub fn is_lock_directive(&self) -> bool {
        self.key == LOCK_TAG_KEY
    }

    /// The named resource of a lock directive, if this tag is one.
    pub fn lock_resource(&self) -> Option<&str> {
        self.is_lock_directive().then_some(self.value.as_str())
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

impl TryFrom<&str> for Tag {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_creates_a_valid_tag() {
        let tag = Tag::new("course_id", "c1").unwrap();
        assert_eq!(tag.key(), "course_id");
        assert_eq!(tag.value(), "c1");
        assert_eq!(tag.to_string(), "course_id:c1");
    }

    #[test]
    fn it_rejects_an_empty_key() {
        let err = Tag::new("", "c1").unwrap_err();
        assert_eq!(err, ValidationError::InvalidTagKey("".into()));
    }

    #[test]
    fn it_rejects_a_key_with_a_colon() {
        let err = Tag::new("course:id", "c1").unwrap_err();
        assert_eq!(err, ValidationError::InvalidTagKey("course:id".into()));
    }

    #[test]
    fn it_rejects_an_empty_value() {
        assert!(matches!(
            Tag::new("course_id", ""),
            Err(ValidationError::InvalidTagValue { .. })
        ));
    }

    #[test]
    fn it_rejects_an_oversized_value() {
        let value = "v".repeat(MAX_TAG_VALUE_LEN + 1);
        assert!(matches!(
            Tag::new("course_id", value),
            Err(ValidationError::InvalidTagValue { .. })
        ));
    }

    #[test]
    fn it_parses_the_wire_form() {
        let tag = Tag::parse("student_id:s42").unwrap();
        assert_eq!(tag.key(), "student_id");
        assert_eq!(tag.value(), "s42");
    }

    #[test]
    fn it_splits_on_the_first_colon_only() {
        let tag = Tag::parse("lock:seat:c1").unwrap();
        assert_eq!(tag.key(), "lock");
        assert_eq!(tag.value(), "seat:c1");
    }

    #[test]
    fn it_rejects_a_wire_form_without_a_colon() {
        let err = Tag::parse("course_id").unwrap_err();
        assert_eq!(err, ValidationError::MalformedTag("course_id".into()));
    }

    #[test]
    fn it_recognizes_lock_directives() {
        let directive = Tag::parse("lock:seat:c1").unwrap();
        assert!(directive.is_lock_directive());
        assert_eq!(directive.lock_resource(), Some("seat:c1"));

        let plain = Tag::new("seat", "c1").unwrap();
        assert!(!plain.is_lock_directive());
        assert_eq!(plain.lock_resource(), None);
    }

    #[test]
    fn it_orders_tags_lexicographically() {
        let mut tags = vec![
            Tag::new("b", "2").unwrap(),
            Tag::new("a", "2").unwrap(),
            Tag::new("a", "1").unwrap(),
        ];
        tags.sort();
        let rendered: Vec<_> = tags.iter().map(Tag::to_string).collect();
        assert_eq!(rendered, ["a:1", "a:2", "b:2"]);
    }
}
