//! Strong type definitions for tracksync.
//!
//! Member identities are newtypes so a type name can never be passed where a
//! full name is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Identity of a remotely addressable metadata unit: `(type, fullName)`.
///
/// Ordered by type then full name, which keeps manifests and checkpoint
/// dumps deterministic.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberKey {
    #[serde(rename = "type")]
    pub member_type: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
}

impl MemberKey {
    /// Create a member key.
    pub fn new(member_type: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            member_type: member_type.into(),
            full_name: full_name.into(),
        }
    }

    /// Namespace prefix of the full name, if any.
    ///
    /// `acme__Widget__c` and `acme__Invoice` are namespaced (`acme`), while
    /// `Widget__c` only carries a custom suffix and is not.
    pub fn namespace(&self) -> Option<&str> {
        let head = self.full_name.split('.').next().unwrap_or_default();
        let parts: Vec<&str> = head.split("__").collect();
        match parts.len() {
            0 | 1 => None,
            2 if is_custom_suffix(parts[1]) => None,
            _ if parts[0].is_empty() => None,
            _ => Some(parts[0]),
        }
    }
}

/// Suffixes the remote appends to custom names; these are not namespaces.
fn is_custom_suffix(part: &str) -> bool {
    const SUFFIXES: &[&str] = &[
        "c", "mdt", "e", "x", "b", "r", "s", "share", "history", "feed", "kav", "pc",
    ];
    SUFFIXES.contains(&part.to_ascii_lowercase().as_str())
}

impl fmt::Debug for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberKey({}:{})", self.member_type, self.full_name)
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.member_type, self.full_name)
    }
}

impl FromStr for MemberKey {
    type Err = CoreError;

    /// Parse the `type:fullName` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((t, n)) if !t.is_empty() && !n.is_empty() => Ok(Self::new(t, n)),
            _ => Err(CoreError::MalformedMemberKey(s.to_string())),
        }
    }
}

/// Identity of the remote environment a checkpoint belongs to.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    /// Create an environment id. Empty ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::EmptyEnvironment);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EnvironmentId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Debug for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvironmentId({})", self.0)
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member the workspace tracks, with its revision bookkeeping.
///
/// `local_revision` is the checkpoint: the remote revision whose content was
/// last durably written to the workspace. `None` means the member has been
/// observed remotely but never retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedMember {
    pub key: MemberKey,
    pub local_revision: Option<u64>,
    pub last_known_remote_revision: u64,
}

impl TrackedMember {
    /// A member seen remotely at `revision` but not retrieved yet.
    pub fn observed(key: MemberKey, revision: u64) -> Self {
        Self {
            key,
            local_revision: None,
            last_known_remote_revision: revision,
        }
    }

    /// A member whose content at `revision` is in the workspace.
    pub fn retrieved(key: MemberKey, revision: u64) -> Self {
        Self {
            key,
            local_revision: Some(revision),
            last_known_remote_revision: revision,
        }
    }

    /// Whether the member has a checkpointed revision.
    pub fn is_checkpointed(&self) -> bool {
        self.local_revision.is_some()
    }
}

/// A revision counter reported by the remote repository for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRevision {
    pub key: MemberKey,
    pub revision: u64,
    /// The remote reports this member as deleted.
    #[serde(default)]
    pub is_deleted: bool,
}

impl RemoteRevision {
    pub fn new(key: MemberKey, revision: u64) -> Self {
        Self {
            key,
            revision,
            is_deleted: false,
        }
    }

    pub fn deleted(key: MemberKey, revision: u64) -> Self {
        Self {
            key,
            revision,
            is_deleted: true,
        }
    }
}

/// A member deleted remotely since the last checkpoint.
///
/// Obsolete names drive local deletions; they never appear in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObsoleteName {
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "type")]
    pub member_type: String,
}

impl ObsoleteName {
    pub fn new(member_type: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            member_type: member_type.into(),
        }
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(self.member_type.clone(), self.full_name.clone())
    }
}

impl From<&MemberKey> for ObsoleteName {
    fn from(key: &MemberKey) -> Self {
        Self::new(key.member_type.clone(), key.full_name.clone())
    }
}

/// A member changed both locally and remotely since the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub member: MemberKey,
    /// Checkpointed revision the local copy is based on.
    pub local_revision: u64,
    /// Current remote revision.
    pub remote_revision: u64,
}

impl fmt::Display for ConflictEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (local r{}, remote r{})",
            self.member, self.local_revision, self.remote_revision
        )
    }
}

/// A 32-byte Blake3 digest of file content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Hash raw file content.
    pub fn of(content: &[u8]) -> Self {
        Self(*blake3::hash(content).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
