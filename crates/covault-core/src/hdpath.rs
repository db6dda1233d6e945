//! Slash-separated derivation paths
//!
//! Sub-account paths as the rest of the system passes them around: `0/5`
//! is receive leaf five, `1/0` the first change leaf, `44H/0H/0H` a
//! hardened account root. `H`, `h` and `'` all mark hardening on input;
//! `H` is canonical on output, with no `m/` prefix.

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::ChildNumber;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::hierarchy::HierarchyError;

/// A relative BIP-32 derivation path.
///
/// Serializes as its string form, so it doubles as a JSON map key in the
/// persisted derivation cache and as a wire field in cosigning requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct HdPath(Vec<ChildNumber>);

impl HdPath {
    /// The empty path, denoting the node itself.
    pub fn root() -> Self {
        HdPath(Vec::new())
    }

    pub fn new(segments: Vec<ChildNumber>) -> Self {
        HdPath(segments)
    }

    /// Leaf path `<subchain>/<index>` below an account node.
    pub fn leaf(subchain: Subchain, index: u32) -> Result<Self, HierarchyError> {
        let child = ChildNumber::from_normal_idx(index)
            .map_err(|_| HierarchyError::InvalidPath(format!("{subchain}/{index}")))?;
        Ok(HdPath(vec![
            ChildNumber::Normal {
                index: subchain.index(),
            },
            child,
        ]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any segment needs private-key derivation.
    pub fn is_hardened(&self) -> bool {
        self.0.iter().any(|child| child.is_hardened())
    }

    pub fn push(&mut self, child: ChildNumber) {
        self.0.push(child);
    }

    /// This path extended with `tail`.
    pub fn join(&self, tail: &HdPath) -> HdPath {
        let mut segments = self.0.clone();
        segments.extend_from_slice(&tail.0);
        HdPath(segments)
    }

    pub fn segments(&self) -> &[ChildNumber] {
        &self.0
    }
}

impl AsRef<[ChildNumber]> for HdPath {
    fn as_ref(&self) -> &[ChildNumber] {
        &self.0
    }
}

impl fmt::Display for HdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, child) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match child {
                ChildNumber::Normal { index } => write!(f, "{index}")?,
                ChildNumber::Hardened { index } => write!(f, "{index}H")?,
            }
        }
        Ok(())
    }
}

impl FromStr for HdPath {
    type Err = HierarchyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix("m/").unwrap_or(s);
        let body = if body == "m" { "" } else { body };
        if body.is_empty() {
            return Ok(HdPath::root());
        }
        let mut segments = Vec::with_capacity(body.len() / 2 + 1);
        for part in body.split('/') {
            let child =
                parse_segment(part).ok_or_else(|| HierarchyError::InvalidPath(s.to_string()))?;
            segments.push(child);
        }
        Ok(HdPath(segments))
    }
}

fn parse_segment(part: &str) -> Option<ChildNumber> {
    let (digits, hardened) = match part.as_bytes().last()? {
        b'H' | b'h' | b'\'' => (&part[..part.len() - 1], true),
        _ => (part, false),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u32 = digits.parse().ok()?;
    if hardened {
        ChildNumber::from_hardened_idx(index).ok()
    } else {
        ChildNumber::from_normal_idx(index).ok()
    }
}

impl Serialize for HdPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HdPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The two subchains below an account node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subchain {
    /// External addresses handed out to payers.
    Receive,
    /// Internal addresses for change.
    Change,
}

impl Subchain {
    /// Chain index as it appears in derivation paths.
    pub fn index(self) -> u32 {
        match self {
            Subchain::Receive => 0,
            Subchain::Change => 1,
        }
    }
}

impl fmt::Display for Subchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}
