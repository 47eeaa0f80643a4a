use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{DocumentId, UserId};

/// Document metadata as stored, without the raw content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub title: String,
    pub document_type: String,
    pub department: Option<String>,
    pub is_sensitive: bool,
    pub patient_id: Option<i64>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(flatten)]
    pub record: DocumentRecord,
    pub content: String,
}

/// Input for creating a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub document_type: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub is_sensitive: bool,
    #[serde(default)]
    pub patient_id: Option<i64>,
}

/// Partial metadata update. `Some(None)` clears `department` or `patient_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub department: Option<Option<String>>,
    #[serde(default)]
    pub is_sensitive: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub patient_id: Option<Option<i64>>,
}

impl DocumentPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.document_type.is_none()
            && self.department.is_none()
            && self.is_sensitive.is_none()
            && self.patient_id.is_none()
    }

    pub fn apply(&self, record: &mut DocumentRecord) {
        if let Some(title) = &self.title {
            record.title.clone_from(title);
        }
        if let Some(document_type) = &self.document_type {
            record.document_type.clone_from(document_type);
        }
        if let Some(department) = &self.department {
            record.department.clone_from(department);
        }
        if let Some(is_sensitive) = self.is_sensitive {
            record.is_sensitive = is_sensitive;
        }
        if let Some(patient_id) = self.patient_id {
            record.patient_id = patient_id;
        }
    }
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// A bounded text segment of a document, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub chunk_index: usize,
    /// Number of leading characters shared with the previous chunk.
    pub overlap: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Filters over document metadata applied before similarity ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    #[serde(default)]
    pub department: Option<String>,
    /// Empty means any type.
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default)]
    pub patient_id: Option<i64>,
}

impl MetadataFilter {
    #[must_use]
    pub fn matches(&self, record: &DocumentRecord) -> bool {
        if let Some(department) = &self.department
            && record.department.as_deref() != Some(department.as_str())
        {
            return false;
        }
        if !self.document_types.is_empty()
            && !self.document_types.contains(&record.document_type)
        {
            return false;
        }
        if let Some(patient_id) = self.patient_id
            && record.patient_id != Some(patient_id)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
pub(crate) fn sample_record(id: i64, department: Option<&str>, sensitive: bool) -> DocumentRecord {
    let now = Utc::now();
    DocumentRecord {
        id: DocumentId(id),
        title: format!("doc {id}"),
        document_type: "protocol".into(),
        department: department.map(str::to_owned),
        is_sensitive: sensitive,
        patient_id: None,
        created_by: UserId(1),
        created_at: now,
        updated_at: now,
        chunk_count: 0,
    }
}
