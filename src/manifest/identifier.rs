//! Two-part asset/destination identifier

use crate::core::error::IdentifierError;
use std::fmt;
use std::str::FromStr;

/// Identifies an asset, and optionally one of its destinations
///
/// The textual form is `assetId` or `assetId:destinationId`. An identifier
/// without a destination acts as a wildcard over every destination of the
/// asset when matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetIdentifier {
    asset_id: String,
    destination_id: Option<String>,
}

impl AssetIdentifier {
    pub fn new(asset_id: impl Into<String>, destination_id: Option<&str>) -> Self {
        Self {
            asset_id: asset_id.into(),
            destination_id: destination_id.map(str::to_string),
        }
    }

    /// Parse a ':'-separated string into an identifier
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(IdentifierError::EmptyPart(text.to_string()));
        }

        match parts.as_slice() {
            [asset] => Ok(Self::new(*asset, None)),
            [asset, destination] => Ok(Self::new(*asset, Some(destination))),
            _ => Err(IdentifierError::TooManyParts(text.to_string())),
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn destination_id(&self) -> Option<&str> {
        self.destination_id.as_deref()
    }

    /// True if both refer to the same asset and the destinations are equal
    /// or either one is unspecified
    pub fn matches(&self, other: &AssetIdentifier) -> bool {
        self.asset_id == other.asset_id
            && match (&self.destination_id, &other.destination_id) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl FromStr for AssetIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AssetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.destination_id {
            Some(destination) => write!(f, "{}:{}", self.asset_id, destination),
            None => f.write_str(&self.asset_id),
        }
    }
}
