//! Hierarchical property keys.
//!
//! A [`PropertyKey`] names one (possibly nested) property of a styled item,
//! e.g. `background` or `background.color`. Keys are immutable; building a
//! sub-key always allocates a new key. Two keys are equal iff their segment
//! sequences are equal.

use std::fmt;
use std::str::FromStr;

/// Separator between key segments in the string form.
pub const SEPARATOR: char = '.';

/// An immutable, hierarchical property name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey {
    segments: Vec<String>,
}

impl PropertyKey {
    /// Create a single-segment key.
    ///
    /// # Panics
    ///
    /// Panics (debug) if the segment is empty or contains the separator;
    /// use [`PropertyKey::from_str`] or `From<&str>` to parse a dotted path.
    pub fn new(segment: impl Into<String>) -> Self {
        let segment = segment.into();
        debug_assert!(!segment.is_empty(), "key segment must not be empty");
        debug_assert!(
            !segment.contains(SEPARATOR),
            "key segment must not contain '{SEPARATOR}'"
        );
        Self {
            segments: vec![segment],
        }
    }

    /// Build a sub-key by appending one segment: `background` + `color`
    /// gives `background.color`.
    pub fn append(&self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        debug_assert!(!segment.is_empty(), "key segment must not be empty");
        debug_assert!(
            !segment.contains(SEPARATOR),
            "key segment must not contain '{SEPARATOR}'"
        );
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// Build a sub-key by appending all segments of `other`.
    pub fn join(&self, other: &PropertyKey) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// The segments of this key, in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if `prefix` is a (non-strict) prefix of this key.
    pub fn starts_with(&self, prefix: &PropertyKey) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "{SEPARATOR}")?;
            }
            first = false;
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyKey({self})")
    }
}

impl FromStr for PropertyKey {
    type Err = EmptyKey;

    /// Parse a dotted path like `background.color`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<String> = s
            .split(SEPARATOR)
            .filter(|seg| !seg.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(EmptyKey);
        }
        Ok(Self { segments })
    }
}

impl From<&str> for PropertyKey {
    /// Parse a dotted path, panicking on an empty key.
    ///
    /// Convenience for literals; prefer [`PropertyKey::from_str`] for
    /// untrusted input.
    fn from(s: &str) -> Self {
        s.parse().expect("property key must not be empty")
    }
}

/// Error for parsing an empty property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("property key must contain at least one segment")]
pub struct EmptyKey;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment() {
        let key = PropertyKey::new("color");
        assert_eq!(key.depth(), 1);
        assert_eq!(key.to_string(), "color");
    }

    #[test]
    fn append_builds_sub_key() {
        let key = PropertyKey::new("background").append("color");
        assert_eq!(key.depth(), 2);
        assert_eq!(key.to_string(), "background.color");
    }

    #[test]
    fn append_does_not_mutate_original() {
        let base = PropertyKey::new("border");
        let _sub = base.append("width");
        assert_eq!(base.to_string(), "border");
    }

    #[test]
    fn join_concatenates() {
        let a = PropertyKey::new("transition");
        let b = PropertyKey::new("color").append("alpha");
        assert_eq!(a.join(&b).to_string(), "transition.color.alpha");
    }

    #[test]
    fn equality_by_segments() {
        let a = PropertyKey::new("background").append("color");
        let b: PropertyKey = "background.color".into();
        assert_eq!(a, b);
        assert_ne!(a, PropertyKey::new("background"));
    }

    #[test]
    fn parse_dotted_path() {
        let key: PropertyKey = "a.b.c".parse().unwrap();
        assert_eq!(key.segments(), &["a", "b", "c"]);
    }

    #[test]
    fn parse_empty_is_error() {
        assert_eq!("".parse::<PropertyKey>(), Err(EmptyKey));
        assert_eq!("...".parse::<PropertyKey>(), Err(EmptyKey));
    }

    #[test]
    fn starts_with_prefix() {
        let key: PropertyKey = "transition.color".into();
        assert!(key.starts_with(&PropertyKey::new("transition")));
        assert!(key.starts_with(&key));
        assert!(!key.starts_with(&PropertyKey::new("color")));
        assert!(!PropertyKey::new("transition").starts_with(&key));
    }

    #[test]
    fn display_and_debug() {
        let key: PropertyKey = "border.width".into();
        assert_eq!(format!("{key}"), "border.width");
        assert_eq!(format!("{key:?}"), "PropertyKey(border.width)");
    }

    #[test]
    fn hash_matches_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(PropertyKey::from("background.color"));
        assert!(set.contains(&PropertyKey::new("background").append("color")));
    }
}
