//! Positional fragment identifiers.
//!
//! # Responsibility
//! - Encode `(owner_type, owner_id, key, position, variant_type?)` into one
//!   addressable token.
//! - Decode tokens back into their parts.
//! - Classify arbitrary ids as fragment ids (heuristic only).
//!
//! # Invariants
//! - Tokens are `owner_type:owner_id:key:position[:variant_type]`.
//! - `position` is decimal with no leading zeros.
//! - A token with fewer than 4 segments is never produced and never accepted
//!   by `decode`.
//!
//! Identifiers are client-side only; the wire format never carries them.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Segment separator used by every fragment id.
pub const ID_SEPARATOR: char = ':';

/// Minimum number of segments for a token to be a fragment id.
pub const MIN_SEGMENTS: usize = 4;

/// Errors raised while decoding fragment ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentIdError {
    /// Token split into fewer than [`MIN_SEGMENTS`] segments.
    #[error("invalid fragment id format: `{id}` has {segments} segment(s), expected at least 4")]
    Malformed { id: String, segments: usize },
    /// Position segment is not a base-10 integer.
    #[error("fragment id `{id}` has a non-numeric position segment `{segment}`")]
    InvalidPosition { id: String, segment: String },
}

/// Derived identifier of one child fragment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FragmentId(String);

impl FragmentId {
    /// Wraps a token after checking it has at least 4 segments.
    pub fn parse(token: impl Into<String>) -> Result<Self, FragmentIdError> {
        let token = token.into();
        let segments = token.split(ID_SEPARATOR).count();
        if segments < MIN_SEGMENTS {
            return Err(FragmentIdError::Malformed { id: token, segments });
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes this id into its parts.
    pub fn parts(&self) -> Result<FragmentIdParts, FragmentIdError> {
        decode(&self.0)
    }
}

impl Display for FragmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FragmentId {
    type Error = FragmentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FragmentId> for String {
    fn from(value: FragmentId) -> Self {
        value.0
    }
}

impl AsRef<str> for FragmentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decoded components of a fragment id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentIdParts {
    pub owner_type: String,
    pub owner_id: String,
    pub key: String,
    /// `None` when the position segment is not a base-10 integer.
    pub position: Option<usize>,
    pub variant_type: Option<String>,
    raw_position: String,
}

impl FragmentIdParts {
    /// Returns the numeric position or fails for a non-numeric segment.
    pub fn require_position(&self) -> Result<usize, FragmentIdError> {
        self.position.ok_or_else(|| FragmentIdError::InvalidPosition {
            id: self.to_string(),
            segment: self.raw_position.clone(),
        })
    }
}

impl Display for FragmentIdParts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.owner_type,
            self.owner_id,
            self.key,
            self.raw_position,
            sep = ID_SEPARATOR
        )?;
        if let Some(variant) = &self.variant_type {
            write!(f, "{ID_SEPARATOR}{variant}")?;
        }
        Ok(())
    }
}

/// Builds the fragment id for one embedded element.
///
/// `variant_type` is appended as a 5th segment only when present and
/// non-empty.
///
/// ```
/// use fragments_core::model::fragment_id::encode;
///
/// assert_eq!(encode("person", "1", "addresses", 0, None).as_str(), "person:1:addresses:0");
/// assert_eq!(
///     encode("activity", 456, "target", 0, Some("photo")).as_str(),
///     "activity:456:target:0:photo"
/// );
/// ```
pub fn encode(
    owner_type: &str,
    owner_id: impl Display,
    key: &str,
    position: usize,
    variant_type: Option<&str>,
) -> FragmentId {
    let mut token = format!(
        "{owner_type}{sep}{owner_id}{sep}{key}{sep}{position}",
        sep = ID_SEPARATOR
    );
    if let Some(variant) = variant_type.filter(|value| !value.is_empty()) {
        token.push(ID_SEPARATOR);
        token.push_str(variant);
    }
    FragmentId(token)
}

/// Splits a token into its parts.
///
/// A non-numeric position segment is accepted and decodes to
/// `position: None`; use [`FragmentIdParts::require_position`] when a number
/// is mandatory. An empty 5th segment decodes as no variant, and segments past
/// the 5th are ignored.
///
/// # Errors
/// - [`FragmentIdError::Malformed`] when the token has fewer than 4 segments.
pub fn decode(token: &str) -> Result<FragmentIdParts, FragmentIdError> {
    let parts: Vec<&str> = token.split(ID_SEPARATOR).collect();
    if parts.len() < MIN_SEGMENTS {
        return Err(FragmentIdError::Malformed {
            id: token.to_string(),
            segments: parts.len(),
        });
    }

    Ok(FragmentIdParts {
        owner_type: parts[0].to_string(),
        owner_id: parts[1].to_string(),
        key: parts[2].to_string(),
        position: parts[3].parse::<usize>().ok(),
        variant_type: parts
            .get(4)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string()),
        raw_position: parts[3].to_string(),
    })
}

/// Returns whether `token` has the shape of a fragment id.
///
/// Any string with at least 3 separators qualifies, even one never produced
/// by [`encode`].
pub fn looks_like_fragment_id(token: &str) -> bool {
    token.split(ID_SEPARATOR).count() >= MIN_SEGMENTS
}

/// Same as [`looks_like_fragment_id`] for untyped JSON; non-strings are `false`.
pub fn value_looks_like_fragment_id(value: &serde_json::Value) -> bool {
    value.as_str().is_some_and(looks_like_fragment_id)
}

/// Returns the owner id segment of a fragment id.
pub fn owner_id_of(token: &str) -> Result<String, FragmentIdError> {
    decode(token).map(|parts| parts.owner_id)
}

/// Returns the owner type segment of a fragment id.
pub fn owner_type_of(token: &str) -> Result<String, FragmentIdError> {
    decode(token).map(|parts| parts.owner_type)
}

/// Codec seam handed to the transforms at construction time.
pub trait FragmentIdCodec {
    fn encode(
        &self,
        owner_type: &str,
        owner_id: &str,
        key: &str,
        position: usize,
        variant_type: Option<&str>,
    ) -> FragmentId;
    fn decode(&self, token: &str) -> Result<FragmentIdParts, FragmentIdError>;
    fn looks_like_id(&self, token: &str) -> bool;
}

/// Default codec using the `:`-joined token format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColonCodec;

impl FragmentIdCodec for ColonCodec {
    fn encode(
        &self,
        owner_type: &str,
        owner_id: &str,
        key: &str,
        position: usize,
        variant_type: Option<&str>,
    ) -> FragmentId {
        encode(owner_type, owner_id, key, position, variant_type)
    }

    fn decode(&self, token: &str) -> Result<FragmentIdParts, FragmentIdError> {
        decode(token)
    }

    fn looks_like_id(&self, token: &str) -> bool {
        looks_like_fragment_id(token)
    }
}
