use serde::{Deserialize, Serialize};

/// Identifier of a storage location (`0` is the default object store).
pub type LocationId = u32;

/// Kind of link requested from the storage service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkType {
    /// Pre-signed HTTP URLs.
    #[default]
    Presigned,
}

impl LinkType {
    /// Query-string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Presigned => "PRESIGNED",
        }
    }
}

/// Destination of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub location_id: LocationId,
    /// Dataset (project) the file belongs to.
    pub dataset_id: String,
    /// Object path inside the location, e.g. `{dataset}/{node}/{name}`.
    pub path: String,
    /// Display name of the file.
    pub name: String,
}

impl UploadTarget {
    /// Target for a file attached to a node of a dataset.
    pub fn for_node(
        location_id: LocationId,
        dataset_id: impl Into<String>,
        node_id: &str,
        name: impl Into<String>,
    ) -> Self {
        let dataset_id = dataset_id.into();
        let name = name.into();
        Self {
            location_id,
            path: format!("{dataset_id}/{node_id}/{name}"),
            dataset_id,
            name,
        }
    }
}

/// What the output slot receives once an upload is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMetadata {
    #[serde(rename = "store")]
    pub location_id: LocationId,
    #[serde(rename = "dataset")]
    pub dataset_id: String,
    pub path: String,
    #[serde(rename = "label")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_tag: Option<String>,
}

impl OutputMetadata {
    /// Metadata for a finalized upload to `target`.
    pub fn from_target(target: &UploadTarget, entity_tag: Option<String>) -> Self {
        Self {
            location_id: target.location_id,
            dataset_id: target.dataset_id.clone(),
            path: target.path.clone(),
            name: target.name.clone(),
            entity_tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_for_node_builds_path() {
        let t = UploadTarget::for_node(0, "study-1", "node-7", "data.csv");
        assert_eq!(t.path, "study-1/node-7/data.csv");
        assert_eq!(t.dataset_id, "study-1");
        assert_eq!(t.name, "data.csv");
    }

    #[test]
    fn output_metadata_wire_names() {
        let t = UploadTarget::for_node(0, "s", "n", "f.bin");
        let meta = OutputMetadata::from_target(&t, None);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"store": 0, "dataset": "s", "path": "s/n/f.bin", "label": "f.bin"})
        );
    }

    #[test]
    fn link_type_serialization() {
        assert_eq!(
            serde_json::to_string(&LinkType::Presigned).unwrap(),
            "\"PRESIGNED\""
        );
        assert_eq!(LinkType::Presigned.as_str(), "PRESIGNED");
        assert_eq!(LinkType::default(), LinkType::Presigned);
    }
}
