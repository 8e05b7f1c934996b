//! Node and identity addressing.
//!
//! A [`Node`] is an addressable endpoint `name@domain/instance`; an
//! [`Identity`] is the instance-less `name@domain` part. Equality and
//! hashing are case-insensitive over every component, matching the wire
//! protocol's address comparison rules.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::NodeParseError;

/// An identity within a domain: `name@domain`.
#[derive(Debug, Clone, Eq)]
pub struct Identity {
    pub name: String,
    pub domain: String,
}

impl Identity {
    /// Create an identity from its parts.
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
        }
    }

    /// Promote to a node without an instance.
    pub fn to_node(&self) -> Node {
        Node {
            identity: self.clone(),
            instance: None,
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.domain.eq_ignore_ascii_case(&other.domain)
    }
}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.domain.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.domain)
    }
}

impl FromStr for Identity {
    type Err = NodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let node: Node = s.parse()?;
        Ok(node.identity)
    }
}

/// An addressable endpoint: `name@domain/instance`.
///
/// The instance part is optional; a node without an instance addresses
/// the identity as a whole.
#[derive(Debug, Clone, Eq)]
pub struct Node {
    pub identity: Identity,
    pub instance: Option<String>,
}

impl Node {
    /// Create a node from its parts.
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        instance: Option<String>,
    ) -> Self {
        Self {
            identity: Identity::new(name, domain),
            instance,
        }
    }

    /// The identity of this node, stripping the instance.
    pub fn to_identity(&self) -> Identity {
        self.identity.clone()
    }

    /// A copy of this node with the given instance.
    pub fn with_instance(&self, instance: impl Into<String>) -> Self {
        Self {
            identity: self.identity.clone(),
            instance: Some(instance.into()),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.identity != other.identity {
            return false;
        }
        match (&self.instance, &other.instance) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
        self.instance
            .as_deref()
            .map(str::to_ascii_lowercase)
            .hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}/{}", self.identity, instance),
            None => self.identity.fmt(f),
        }
    }
}

impl FromStr for Node {
    type Err = NodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(NodeParseError::Empty);
        }

        let (address, instance) = match s.split_once('/') {
            Some((address, instance)) if !instance.is_empty() => {
                (address, Some(instance.to_string()))
            }
            Some((address, _)) => (address, None),
            None => (s, None),
        };

        let (name, domain) = address
            .split_once('@')
            .filter(|(_, domain)| !domain.is_empty())
            .ok_or_else(|| NodeParseError::MissingDomain(s.to_string()))?;

        if name.is_empty() {
            return Err(NodeParseError::EmptyName(s.to_string()));
        }

        Ok(Node {
            identity: Identity::new(name, domain),
            instance,
        })
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parse_full_node() {
        let node: Node = "alice@example.com/instance1".parse().unwrap();
        assert_eq!(node.identity.name, "alice");
        assert_eq!(node.identity.domain, "example.com");
        assert_eq!(node.instance.as_deref(), Some("instance1"));
    }

    #[test]
    fn parse_without_instance() {
        let node: Node = "alice@example.com".parse().unwrap();
        assert!(node.instance.is_none());
    }

    #[test]
    fn parse_trailing_slash_means_no_instance() {
        let node: Node = "alice@example.com/".parse().unwrap();
        assert!(node.instance.is_none());
    }

    #[test]
    fn parse_rejects_missing_domain() {
        assert!("alice".parse::<Node>().is_err());
        assert!("alice@".parse::<Node>().is_err());
        assert!("".parse::<Node>().is_err());
    }

    #[test]
    fn parse_rejects_empty_name() {
        assert_eq!(
            "@example.com".parse::<Node>(),
            Err(NodeParseError::EmptyName("@example.com".to_string()))
        );
    }

    #[test]
    fn equality_is_case_insensitive() {
        let a: Node = "Alice@Example.com/Home".parse().unwrap();
        let b: Node = "alice@example.COM/home".parse().unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn instance_distinguishes_nodes() {
        let a: Node = "alice@example.com/home".parse().unwrap();
        let b: Node = "alice@example.com/work".parse().unwrap();
        let c: Node = "alice@example.com".parse().unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn to_identity_strips_instance() {
        let node: Node = "alice@example.com/home".parse().unwrap();
        assert_eq!(node.to_identity(), Identity::new("alice", "example.com"));
    }

    #[test]
    fn display_round_trip() {
        for s in ["alice@example.com", "alice@example.com/instance1"] {
            let node: Node = s.parse().unwrap();
            assert_eq!(node.to_string(), s);
        }
    }

    #[test]
    fn serde_as_string() {
        let node: Node = "alice@example.com/home".parse().unwrap();
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "\"alice@example.com/home\"");
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    proptest! {
        #[test]
        fn parse_display_round_trip(
            name in "[a-z][a-z0-9.]{0,12}",
            domain in "[a-z][a-z0-9.]{0,12}",
            instance in proptest::option::of("[a-z0-9]{1,8}"),
        ) {
            let node = Node::new(name, domain, instance);
            let parsed: Node = node.to_string().parse().unwrap();
            prop_assert_eq!(parsed, node);
        }
    }
}
