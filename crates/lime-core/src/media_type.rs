//! Media types for documents: `type/subtype[+suffix]`.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MediaTypeError;

/// A media type tag: `type/subtype` with an optional `+suffix`.
///
/// The suffix or the subtype being `json` marks the document as JSON-shaped
/// (e.g. `application/vnd.lime.ping+json`, `application/json`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    pub type_: String,
    pub subtype: String,
    pub suffix: Option<String>,
}

impl MediaType {
    /// Create a media type from its parts.
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>, suffix: Option<&str>) -> Self {
        Self {
            type_: type_.into(),
            subtype: subtype.into(),
            suffix: suffix.map(str::to_string),
        }
    }

    /// `text/plain`, the fallback for unknown non-JSON content.
    pub fn text_plain() -> Self {
        Self::new("text", "plain", None)
    }

    /// `application/json`, the fallback for unknown JSON content.
    pub fn application_json() -> Self {
        Self::new("application", "json", None)
    }

    /// `application/vnd.lime.ping+json`, the ping document.
    pub fn ping() -> Self {
        Self::new("application", "vnd.lime.ping", Some("json"))
    }

    /// Whether this media type carries a JSON-shaped body.
    pub fn is_json(&self) -> bool {
        self.suffix.as_deref() == Some("json") || self.subtype == "json"
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.suffix {
            Some(suffix) => write!(f, "{}/{}+{}", self.type_, self.subtype, suffix),
            None => write!(f, "{}/{}", self.type_, self.subtype),
        }
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(MediaTypeError::Empty);
        }
        let (type_, rest) = s
            .split_once('/')
            .filter(|(t, r)| !t.is_empty() && !r.is_empty())
            .ok_or_else(|| MediaTypeError::MissingSubtype(s.to_string()))?;

        let (subtype, suffix) = match rest.split_once('+') {
            Some((subtype, suffix)) if !suffix.is_empty() => (subtype, Some(suffix)),
            _ => (rest, None),
        };
        if subtype.is_empty() {
            return Err(MediaTypeError::MissingSubtype(s.to_string()));
        }

        Ok(Self::new(type_, subtype, suffix))
    }
}

impl Serialize for MediaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parse_with_suffix() {
        let mt: MediaType = "application/vnd.lime.ping+json".parse().unwrap();
        assert_eq!(mt.type_, "application");
        assert_eq!(mt.subtype, "vnd.lime.ping");
        assert_eq!(mt.suffix.as_deref(), Some("json"));
        assert!(mt.is_json());
    }

    #[test]
    fn parse_without_suffix() {
        let mt: MediaType = "text/plain".parse().unwrap();
        assert!(mt.suffix.is_none());
        assert!(!mt.is_json());
    }

    #[test]
    fn json_subtype_is_json() {
        assert!(MediaType::application_json().is_json());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("".parse::<MediaType>().is_err());
        assert!("text".parse::<MediaType>().is_err());
        assert!("text/".parse::<MediaType>().is_err());
        assert!("/plain".parse::<MediaType>().is_err());
    }

    #[test]
    fn display_round_trip() {
        for s in ["text/plain", "application/vnd.lime.ping+json"] {
            let mt: MediaType = s.parse().unwrap();
            assert_eq!(mt.to_string(), s);
        }
    }

    proptest! {
        #[test]
        fn parse_display_round_trip(
            type_ in "[a-z]{1,12}",
            subtype in "[a-z][a-z0-9.-]{0,16}",
            suffix in proptest::option::of("[a-z]{1,8}"),
        ) {
            let mt = MediaType::new(type_, subtype, suffix.as_deref());
            let parsed: MediaType = mt.to_string().parse().unwrap();
            prop_assert_eq!(parsed, mt);
        }
    }
}
