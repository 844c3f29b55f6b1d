//! Wire types for the registry and the versioned building documents.
//!
//! Field names are camelCase on disk so that files written by this
//! implementation keep the shape established by the original data roots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One building in the registry.
///
/// `id` is globally unique. Every entry sharing a `foundation_id` carries
/// the same `foundation_name` (denormalized for read convenience; the
/// registry validator enforces agreement). `aliases` accumulates ids the
/// entry previously held, so stale incoming references stay resolvable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildingEntry {
    pub id: String,

    pub name: String,

    pub foundation_id: String,

    pub foundation_name: String,

    /// Previously held ids, populated on rename
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    /// Unknown keys are preserved across rewrites
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl BuildingEntry {
    /// Create a new entry with no aliases or extra fields.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        foundation_id: impl Into<String>,
        foundation_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            foundation_id: foundation_id.into(),
            foundation_name: foundation_name.into(),
            aliases: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Record a previously held id, deduplicated.
    pub fn push_alias(&mut self, old_id: impl Into<String>) {
        let old_id = old_id.into();
        if !old_id.is_empty() && !self.aliases.contains(&old_id) {
            self.aliases.push(old_id);
        }
    }
}

/// Metadata for one uploaded file referenced from a document's files index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub size: u64,
    pub mime: String,
    pub uploaded_at: DateTime<Utc>,
}

/// The "current" document of a building.
///
/// `data` is an opaque structured payload interpreted by external form
/// tooling; the store versions it without looking inside. `data_version`
/// increments by exactly one on every committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildingDocument {
    pub building_id: String,

    pub template_version: String,

    pub data_version: u64,

    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub files_index: HashMap<String, Vec<FileMetadata>>,
}

impl BuildingDocument {
    /// Initial document for a building that has no data yet.
    pub fn initial(building_id: impl Into<String>, template_version: impl Into<String>) -> Self {
        Self {
            building_id: building_id.into(),
            template_version: template_version.into(),
            data_version: 1,
            data: Value::Object(serde_json::Map::new()),
            files_index: HashMap::new(),
        }
    }

    /// Weak entity tag derived from the version counter. Two writers
    /// racing from the same version produce the same tag, which is what
    /// lets the second one be detected as stale.
    pub fn etag(&self) -> String {
        weak_etag(self.data_version)
    }
}

/// Format a weak entity tag for a data version.
pub fn weak_etag(data_version: u64) -> String {
    format!("W/\"{}\"", data_version)
}

/// Snapshot metadata stored next to each snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionMeta {
    pub version_id: String,
    pub created_at: DateTime<Utc>,
    pub data_version: u64,
    pub by: String,
    pub reason: String,
}

/// One row of a version history listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionListItem {
    pub version_id: String,
    pub created_at: String,
    pub data_version: u64,
}

/// A registry backup on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupInfo {
    /// File name of the backup (`<timestamp>-<tag>.json`)
    pub id: String,
    pub size: u64,
    /// Modification time in milliseconds since the epoch
    pub mtime: i64,
}

/// A foundation with its buildings, for tree listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoundationNode {
    pub foundation_id: String,
    pub foundation_name: String,
    pub buildings: Vec<BuildingRef>,
}

/// A building reference inside a tree listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildingRef {
    pub id: String,
    pub name: String,
}

/// The full registry tree with counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryTree {
    pub foundations: Vec<FoundationNode>,
    pub counts: RegistryCounts,
}

/// Entity counts for a tree listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RegistryCounts {
    pub foundations: usize,
    pub buildings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_roundtrip_preserves_unknown_keys() {
        let raw = r#"{
            "id": "a-b1",
            "name": "Bâtiment 1",
            "foundationId": "fa",
            "foundationName": "Fondation A",
            "customField": 42
        }"#;
        let entry: BuildingEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.id, "a-b1");
        assert!(entry.aliases.is_empty());
        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["customField"], 42);
        assert_eq!(back["foundationId"], "fa");
        // empty aliases are not serialized
        assert!(back.get("aliases").is_none());
    }

    #[test]
    fn test_push_alias_dedupes() {
        let mut entry = BuildingEntry::new("b2", "B", "fa", "Fondation A");
        entry.push_alias("b1");
        entry.push_alias("b1");
        entry.push_alias("");
        assert_eq!(entry.aliases, vec!["b1".to_string()]);
    }

    #[test]
    fn test_weak_etag_format() {
        let doc = BuildingDocument::initial("b1", "dev");
        assert_eq!(doc.etag(), "W/\"1\"");
        assert_eq!(weak_etag(7), "W/\"7\"");
    }

    #[test]
    fn test_document_camel_case_wire_shape() {
        let doc = BuildingDocument::initial("b1", "dev");
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["buildingId"], "b1");
        assert_eq!(v["dataVersion"], 1);
        assert!(v.get("filesIndex").is_some());
    }
}
