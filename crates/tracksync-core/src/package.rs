//! Packages: the unit of one retrieval call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{MemberKey, ObsoleteName};

/// Name of the package that collects un-namespaced members.
pub const DEFAULT_PACKAGE: &str = "unpackaged";

/// How members are grouped into packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartitionPolicy {
    /// One package per namespace, plus [`DEFAULT_PACKAGE`].
    #[default]
    ByNamespace,
    /// Everything in [`DEFAULT_PACKAGE`].
    Single,
}

impl PartitionPolicy {
    /// The package a member belongs to under this policy.
    pub fn package_for(&self, key: &MemberKey) -> String {
        match self {
            PartitionPolicy::Single => DEFAULT_PACKAGE.to_string(),
            PartitionPolicy::ByNamespace => key
                .namespace()
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_PACKAGE.to_string()),
        }
    }
}

/// A named group of members retrieved in one call, with its share of
/// obsolete names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    /// Members to retrieve, with the remote revision observed for each.
    pub members: Vec<(MemberKey, u64)>,
    pub obsolete: Vec<ObsoleteName>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            obsolete: Vec::new(),
        }
    }

    /// Empty iff there is nothing to retrieve and nothing to delete.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.obsolete.is_empty()
    }

    /// Whether a retrieval call is needed at all.
    pub fn has_retrievals(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn member_keys(&self) -> impl Iterator<Item = &MemberKey> {
        self.members.iter().map(|(k, _)| k)
    }
}

/// Group members and obsolete names into packages.
///
/// Packages come back sorted by name with [`DEFAULT_PACKAGE`] first; empty
/// packages are never produced.
pub fn partition(
    policy: PartitionPolicy,
    members: impl IntoIterator<Item = (MemberKey, u64)>,
    obsolete: impl IntoIterator<Item = ObsoleteName>,
) -> Vec<Package> {
    let mut packages: BTreeMap<String, Package> = BTreeMap::new();

    for (key, revision) in members {
        let name = policy.package_for(&key);
        packages
            .entry(name.clone())
            .or_insert_with(|| Package::new(name))
            .members
            .push((key, revision));
    }

    for name in obsolete {
        let package = policy.package_for(&name.key());
        packages
            .entry(package.clone())
            .or_insert_with(|| Package::new(package))
            .obsolete
            .push(name);
    }

    let mut out: Vec<Package> = packages
        .into_values()
        .map(|mut p| {
            p.members.sort();
            p.members.dedup_by(|a, b| a.0 == b.0);
            p.obsolete.sort();
            p.obsolete.dedup();
            p
        })
        .filter(|p| !p.is_empty())
        .collect();

    // Keep the default package ahead of namespaced ones.
    out.sort_by_key(|p| (p.name != DEFAULT_PACKAGE, p.name.clone()));
    out
}
