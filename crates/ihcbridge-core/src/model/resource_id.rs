// ── Resource identity ──
//
// Project files address controller points with a type character followed
// by a hexadecimal number (`O1A`, `I0F`, or the `_0x4b9e1f` form real
// project exports use). Only the numeric part reaches the controller.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── ResourceId ──────────────────────────────────────────────────────

/// Numeric identifier of one controller resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ResourceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ── ResourceRef ─────────────────────────────────────────────────────

/// A resource id as written in the project, with its parsed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    /// Attribute text exactly as it appeared.
    pub raw: String,
    /// Leading type character (`O`, `I`, `_`, ...).
    pub kind: char,
    pub id: ResourceId,
}

impl ResourceRef {
    /// Parse a project id attribute.
    ///
    /// The first character is the type prefix; the rest is hexadecimal,
    /// optionally introduced by `0x`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let malformed = || CoreError::MalformedResourceId {
            raw: raw.to_owned(),
        };

        let mut chars = raw.chars();
        let kind = chars.next().ok_or_else(malformed)?;
        let rest = chars.as_str();
        let digits = rest
            .strip_prefix("0x")
            .or_else(|| rest.strip_prefix("0X"))
            .unwrap_or(rest);

        // from_str_radix tolerates a leading '+', the project format does not
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        let id = u32::from_str_radix(digits, 16).map_err(|_| malformed())?;

        Ok(Self {
            raw: raw.to_owned(),
            kind,
            id: ResourceId(id),
        })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
