//! Record identity: type-prefixed ULIDs and tenant scopes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Resource type prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityPrefix {
    /// Fleet vehicle
    Veh,
    /// Inventory item
    Item,
    /// Purchase order
    Po,
    /// Customer invoice
    Inv,
    /// Inventory transaction (stock movement)
    Txn,
}

impl EntityPrefix {
    /// Get the string representation of the prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::Veh => "VEH",
            EntityPrefix::Item => "ITEM",
            EntityPrefix::Po => "PO",
            EntityPrefix::Inv => "INV",
            EntityPrefix::Txn => "TXN",
        }
    }

    /// Get all valid prefixes
    pub fn all() -> &'static [EntityPrefix] {
        &[
            EntityPrefix::Veh,
            EntityPrefix::Item,
            EntityPrefix::Po,
            EntityPrefix::Inv,
            EntityPrefix::Txn,
        ]
    }
}

impl fmt::Display for EntityPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityPrefix {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VEH" => Ok(EntityPrefix::Veh),
            "ITEM" => Ok(EntityPrefix::Item),
            "PO" => Ok(EntityPrefix::Po),
            "INV" => Ok(EntityPrefix::Inv),
            "TXN" => Ok(EntityPrefix::Txn),
            _ => Err(IdParseError::InvalidPrefix(s.to_string())),
        }
    }
}

/// A unique record identifier combining a type prefix and ULID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    prefix: EntityPrefix,
    ulid: Ulid,
}

impl EntityId {
    /// Create a new EntityId with the given prefix
    pub fn new(prefix: EntityPrefix) -> Self {
        Self {
            prefix,
            ulid: Ulid::new(),
        }
    }

    /// Get the prefix of this ID
    pub fn prefix(&self) -> EntityPrefix {
        self.prefix
    }

    /// Get the ULID portion of this ID
    pub fn ulid(&self) -> Ulid {
        self.ulid
    }

    /// Parse an EntityId from a string
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.ulid)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix_str, ulid_str) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingDelimiter(s.to_string()))?;

        let prefix = prefix_str.parse()?;
        let ulid = Ulid::from_string(ulid_str)
            .map_err(|e| IdParseError::InvalidUlid(ulid_str.to_string(), e.to_string()))?;

        Ok(Self { prefix, ulid })
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The owning organization a record is scoped to
///
/// Construction goes through [`TenantId::parse`], so an empty tenant can
/// never reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Parse a tenant identifier, trimming surrounding whitespace
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdParseError::EmptyTenant);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TenantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TenantId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing identifiers
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid record prefix: '{0}' (valid: VEH, ITEM, PO, INV, TXN)")]
    InvalidPrefix(String),

    #[error("missing '-' delimiter in record ID: '{0}'")]
    MissingDelimiter(String),

    #[error("invalid ULID '{0}': {1}")]
    InvalidUlid(String, String),

    #[error("tenant identifier must not be empty")]
    EmptyTenant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_generation() {
        let id = EntityId::new(EntityPrefix::Item);
        assert!(id.to_string().starts_with("ITEM-"));
        assert_eq!(id.to_string().len(), 31); // ITEM- (5) + ULID (26)
    }

    #[test]
    fn test_entity_id_parsing() {
        let original = EntityId::new(EntityPrefix::Veh);
        let parsed = EntityId::parse(&original.to_string()).unwrap();
        assert_eq!(parsed.prefix(), EntityPrefix::Veh);
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_entity_id_invalid_prefix() {
        let err = EntityId::parse("XXX-01HQ3K4N5M6P7R8S9T0VWXYZ12").unwrap_err();
        assert!(matches!(err, IdParseError::InvalidPrefix(_)));
    }

    #[test]
    fn test_entity_id_missing_delimiter() {
        let err = EntityId::parse("ITEM01HQ3K4N5M6P7R8S9T0VWXYZ1").unwrap_err();
        assert!(matches!(err, IdParseError::MissingDelimiter(_)));
    }

    #[test]
    fn test_secondary_number_is_not_an_entity_id() {
        let err = EntityId::parse("ITEM-000042").unwrap_err();
        assert!(matches!(err, IdParseError::InvalidUlid(_, _)));
    }

    #[test]
    fn test_all_prefixes_parse() {
        for prefix in EntityPrefix::all() {
            let id = EntityId::new(*prefix);
            assert_eq!(EntityId::parse(&id.to_string()).unwrap(), id);
            assert_eq!(prefix.as_str().to_lowercase().parse::<EntityPrefix>().unwrap(), *prefix);
        }
    }

    #[test]
    fn test_tenant_rejects_blank() {
        assert!(matches!(TenantId::parse("   "), Err(IdParseError::EmptyTenant)));
        assert_eq!(TenantId::parse(" acme ").unwrap().as_str(), "acme");
    }
}
