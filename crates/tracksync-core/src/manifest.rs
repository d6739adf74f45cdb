//! Retrieval manifests.
//!
//! A manifest is the declarative member list handed to one retrieve call. It
//! is either backed by a file, or the empty sentinel meaning "nothing to
//! fetch".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::types::MemberKey;

/// File name used for manifests written into a scratch directory.
pub const MANIFEST_FILE_NAME: &str = "package.json";

/// Members of one type in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestType {
    pub name: String,
    pub members: Vec<String>,
}

/// Serialized manifest content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub types: Vec<ManifestType>,
}

impl ManifestDocument {
    /// Build a document from member keys. Types and members are sorted and
    /// deduplicated.
    pub fn from_members<'a>(
        api_version: impl Into<String>,
        members: impl IntoIterator<Item = &'a MemberKey>,
    ) -> Self {
        let mut by_type: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for key in members {
            by_type
                .entry(key.member_type.as_str())
                .or_default()
                .push(key.full_name.clone());
        }

        let types = by_type
            .into_iter()
            .map(|(name, mut members)| {
                members.sort();
                members.dedup();
                ManifestType {
                    name: name.to_string(),
                    members,
                }
            })
            .collect();

        Self {
            api_version: api_version.into(),
            types,
        }
    }

    /// All member keys in the document.
    pub fn members(&self) -> Vec<MemberKey> {
        self.types
            .iter()
            .flat_map(|t| t.members.iter().map(|m| MemberKey::new(t.name.clone(), m.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.types.iter().all(|t| t.members.is_empty())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| CoreError::ManifestEncoding(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::ManifestDecoding(e.to_string()))
    }
}

/// A manifest ready to hand to the retrieval gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalManifest {
    /// Nothing to retrieve. No file exists.
    Empty,
    /// A manifest built from a package and written to `path`.
    Built {
        path: PathBuf,
        document: ManifestDocument,
    },
    /// A caller-supplied manifest, used verbatim.
    Provided { path: PathBuf },
}

impl RetrievalManifest {
    pub fn is_empty(&self) -> bool {
        matches!(self, RetrievalManifest::Empty)
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            RetrievalManifest::Empty => None,
            RetrievalManifest::Built { path, .. } | RetrievalManifest::Provided { path } => {
                Some(path)
            }
        }
    }
}
