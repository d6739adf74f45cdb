//! Retrieval results as reported by the remote repository.
//!
//! The remote sometimes encodes a one-element list as a bare object, so the
//! list fields here accept either shape when decoded.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::error::{CoreError, Result};
use crate::types::MemberKey;

/// Member type of the manifest wrapper entry that every retrieval reports
/// about itself. It describes the transfer, not retrieved content.
pub const MANIFEST_WRAPPER_TYPE: &str = "Package";

/// Status of a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrieveStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Canceling,
    Canceled,
}

impl fmt::Display for RetrieveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetrieveStatus::Pending => "Pending",
            RetrieveStatus::InProgress => "InProgress",
            RetrieveStatus::Succeeded => "Succeeded",
            RetrieveStatus::Failed => "Failed",
            RetrieveStatus::Canceling => "Canceling",
            RetrieveStatus::Canceled => "Canceled",
        };
        f.write_str(s)
    }
}

/// A diagnostic message attached to a retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveMessage {
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    pub problem: String,
}

impl RetrieveMessage {
    pub fn new(file_name: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for RetrieveMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file_name.is_empty() {
            f.write_str(&self.problem)
        } else {
            write!(f, "{}: {}", self.file_name, self.problem)
        }
    }
}

/// One retrieved artifact descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperty {
    #[serde(rename = "type")]
    pub member_type: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    /// Path of the artifact relative to the retrieval target directory.
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "lastModifiedDate", default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl FileProperty {
    pub fn new(
        member_type: impl Into<String>,
        full_name: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            member_type: member_type.into(),
            full_name: full_name.into(),
            file_name: file_name.into(),
            id: None,
            last_modified: None,
        }
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(self.member_type.clone(), self.full_name.clone())
    }

    /// Whether this entry describes the manifest wrapper itself.
    pub fn is_manifest_wrapper(&self) -> bool {
        self.member_type == MANIFEST_WRAPPER_TYPE
    }

    /// Return a copy with `full_name` and `file_name` using the host separator.
    pub fn normalized(&self) -> Self {
        Self {
            full_name: normalize_separators(&self.full_name),
            file_name: normalize_separators(&self.file_name),
            ..self.clone()
        }
    }

    /// `file_name` as a host path.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(normalize_separators(&self.file_name))
    }
}

/// Rewrite both `/` and `\` to the host's native separator.
pub fn normalize_separators(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect()
}

/// Strip the leading package root (`unpackaged/`, or a package name) from a
/// retrieved path.
pub fn strip_package_root(path: &Path) -> PathBuf {
    let mut components = path.components();
    components.next();
    components.as_path().to_path_buf()
}

/// Outcome of one retrieve call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub success: bool,
    pub status: RetrieveStatus,
    #[serde(rename = "fileProperties", default, deserialize_with = "one_or_many")]
    pub file_properties: Vec<FileProperty>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub messages: Vec<RetrieveMessage>,
}

impl RetrievalResult {
    /// A successful retrieval of `file_properties`.
    pub fn succeeded(file_properties: Vec<FileProperty>) -> Self {
        Self {
            success: true,
            status: RetrieveStatus::Succeeded,
            file_properties,
            messages: Vec::new(),
        }
    }

    /// The trivial result used when nothing had to be fetched.
    pub fn empty() -> Self {
        Self::succeeded(Vec::new())
    }

    /// A failed retrieval with diagnostic messages.
    pub fn failed(status: RetrieveStatus, messages: Vec<RetrieveMessage>) -> Self {
        Self {
            success: false,
            status,
            file_properties: Vec::new(),
            messages,
        }
    }

    /// Success predicate: flagged successful, status `Succeeded`, and no
    /// messages. Any message, even on a "successful" call, marks a partial
    /// failure.
    pub fn is_succeeded(&self) -> bool {
        self.success && self.status == RetrieveStatus::Succeeded && self.messages.is_empty()
    }

    /// Decode a result from its JSON wire form.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::ResultDecoding(e.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<OneOrMany<T>> = Option::deserialize(deserializer)?;
    Ok(match value {
        None => Vec::new(),
        Some(OneOrMany::One(item)) => vec![item],
        Some(OneOrMany::Many(items)) => items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_predicate() {
        assert!(RetrievalResult::empty().is_succeeded());

        let mut warned = RetrievalResult::empty();
        warned.messages.push(RetrieveMessage::new("x", "bad"));
        assert!(!warned.is_succeeded());

        let mut pending = RetrievalResult::empty();
        pending.status = RetrieveStatus::InProgress;
        assert!(!pending.is_succeeded());

        let mut flagged = RetrievalResult::empty();
        flagged.success = false;
        assert!(!flagged.is_succeeded());
    }

    #[test]
    fn test_decode_single_file_property() {
        let json = br#"{
            "success": true,
            "status": "Succeeded",
            "fileProperties": {
                "type": "ApexClass",
                "fullName": "Foo",
                "fileName": "unpackaged/classes/Foo.cls"
            }
        }"#;
        let result = RetrievalResult::from_json(json).unwrap();
        assert_eq!(result.file_properties.len(), 1);
        assert!(result.messages.is_empty());
        assert!(result.is_succeeded());
    }

    #[test]
    fn test_decode_null_and_list() {
        let json = br#"{
            "success": false,
            "status": "Failed",
            "fileProperties": null,
            "messages": [{"fileName": "a", "problem": "p1"}, {"problem": "p2"}]
        }"#;
        let result = RetrievalResult::from_json(json).unwrap();
        assert!(result.file_properties.is_empty());
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[1].to_string(), "p2");
    }

    #[test]
    fn test_normalize_separators() {
        let fp = FileProperty::new("AuraDefinitionBundle", "a\\b", "unpackaged/aura\\cmp/cmp.cmp");
        let n = fp.normalized();
        let sep = MAIN_SEPARATOR.to_string();
        assert_eq!(n.full_name, format!("a{sep}b"));
        assert_eq!(n.file_name, ["unpackaged", "aura", "cmp", "cmp.cmp"].join(&sep));
    }

    #[test]
    fn test_strip_package_root() {
        let p = PathBuf::from("unpackaged").join("classes").join("Foo.cls");
        assert_eq!(strip_package_root(&p), PathBuf::from("classes").join("Foo.cls"));
    }
}
