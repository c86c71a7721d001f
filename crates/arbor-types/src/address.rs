use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ArborError;

/// A node's position: zero-based sibling indices walked down from the top of its tree.
///
/// Addresses are derived coordinates, not identifiers. Any structural mutation
/// between computing an address and resolving it may make it point elsewhere.
/// Ordering is component-wise lexicographic, so a parent sorts before its children
/// and earlier siblings before later ones (document order).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Vec<usize>);

impl Address {
    /// The empty address, denoting the top of a tree.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(components: Vec<usize>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Address of the parent position, or `None` for the root.
    pub fn parent(&self) -> Option<Address> {
        if self.0.is_empty() {
            return None;
        }
        Some(Address(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Address of the `index`-th child of this position.
    pub fn child(&self, index: usize) -> Address {
        let mut components = self.0.clone();
        components.push(index);
        Address(components)
    }

    /// Last sibling index, or `None` for the root.
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Returns `true` if `other` lies strictly below this position.
    pub fn is_ancestor_of(&self, other: &Address) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{}", idx)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Address::root());
        }
        trimmed
            .split('-')
            .map(|part| {
                part.trim().parse::<usize>().map_err(|_| {
                    ArborError::address(format!("'{}' is not a valid address", s))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Address)
    }
}

impl From<Vec<usize>> for Address {
    fn from(components: Vec<usize>) -> Self {
        Address(components)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_with_dashes() {
        assert_eq!(Address::new(vec![2, 0, 1]).to_string(), "2-0-1");
        assert_eq!(Address::root().to_string(), "");
    }

    #[test]
    fn parse_accepts_display_form() {
        let addr: Address = "2-0-1".parse().unwrap();
        assert_eq!(addr.components(), &[2, 0, 1]);
        let root: Address = "".parse().unwrap();
        assert!(root.is_root());
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "1-x".parse::<Address>().unwrap_err();
        assert!(err.is_address());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = Address::new(vec![0, 5]);
        let b = Address::new(vec![1]);
        let c = Address::new(vec![1, 0]);
        assert!(a < b);
        assert!(b < c, "a parent sorts before its children");
        let mut all = vec![c.clone(), a.clone(), b.clone()];
        all.sort();
        assert_eq!(all, vec![a, b, c]);
    }

    #[test]
    fn parent_child_and_ancestry() {
        let addr = Address::new(vec![3, 1]);
        assert_eq!(addr.parent(), Some(Address::new(vec![3])));
        assert_eq!(addr.child(4).to_string(), "3-1-4");
        assert_eq!(addr.last(), Some(1));
        assert!(Address::new(vec![3]).is_ancestor_of(&addr));
        assert!(!addr.is_ancestor_of(&addr));
        assert!(Address::root().parent().is_none());
    }

    #[test]
    fn serde_uses_string_form() {
        let addr = Address::new(vec![1, 2]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"1-2\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
