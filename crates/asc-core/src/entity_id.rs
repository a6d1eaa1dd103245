//! Entity ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain contains invalid characters (lowercase alphanumeric and underscores, no leading/trailing underscore)")]
    InvalidDomain,

    #[error("object_id contains invalid characters (lowercase alphanumeric and underscores, no leading/trailing underscore)")]
    InvalidObjectId,
}

/// An entity identifier such as `scene.movie_night` or `select.kitchen_scenes`
///
/// Both segments must be non-empty, lowercase alphanumeric with underscores,
/// and may not start or end with an underscore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Create a new EntityId from its two segments
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if !is_valid_segment(&domain) {
            return Err(EntityIdError::InvalidDomain);
        }
        if !is_valid_segment(&object_id) {
            return Err(EntityIdError::InvalidObjectId);
        }

        Ok(Self { domain, object_id })
    }

    /// The domain segment
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The object_id segment
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

fn is_valid_segment(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => {
                Self::new(domain, object_id)
            }
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
