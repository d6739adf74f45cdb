//! Applying a retrieval result to the local workspace.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracksync_core::{
    AggregateSourceElements, DescriptorPattern, FileProperty, MemberKey, ObsoleteName,
    RetrievalResult, TypeRegistry,
};

use crate::context::PackageContext;
use crate::error::Result;
use crate::workspace::{CommitOptions, WorkspaceStore};

/// The member that owns a composite sibling file, with its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeOwner {
    pub member: MemberKey,
    /// The bundle's root descriptor. Synthesized from the registry when the
    /// batch did not include it.
    pub descriptor: FileProperty,
    pub descriptor_in_batch: bool,
}

/// Mapping from every composite file in a batch to its owning member.
///
/// Computed once over the whole batch, because a sibling can only be
/// attributed after all descriptors in the batch have been seen.
#[derive(Debug, Clone, Default)]
pub struct CompositeAttribution {
    owners: HashMap<String, CompositeOwner>,
}

impl CompositeAttribution {
    /// Attribute every composite file in `entries`. Entries must already be
    /// normalized.
    pub fn compute(registry: &TypeRegistry, entries: &[FileProperty]) -> Self {
        // Pass 1: best-ranked descriptor per bundle directory.
        let mut descriptors: BTreeMap<PathBuf, (usize, FileProperty)> = BTreeMap::new();
        for fp in entries {
            let Some(loc) = registry.locate(fp) else {
                continue;
            };
            let Some(rank) = loc.descriptor_rank() else {
                continue;
            };
            let better = descriptors
                .get(&loc.bundle_dir)
                .map_or(true, |(best, _)| rank < *best);
            if better {
                descriptors.insert(loc.bundle_dir.clone(), (rank, fp.clone()));
            }
        }

        // Pass 2: every file in a bundle directory gets that bundle's owner.
        let mut owners = HashMap::new();
        for fp in entries {
            let Some(loc) = registry.locate(fp) else {
                continue;
            };
            let member = loc.owner();
            let owner = match descriptors.get(&loc.bundle_dir) {
                Some((_, descriptor)) => CompositeOwner {
                    member,
                    descriptor: descriptor.clone(),
                    descriptor_in_batch: true,
                },
                None => CompositeOwner {
                    descriptor: synthesize_descriptor(
                        &member,
                        &loc.bundle_dir,
                        loc.composite.descriptors.first(),
                    ),
                    member,
                    descriptor_in_batch: false,
                },
            };
            owners.insert(fp.file_name.clone(), owner);
        }

        Self { owners }
    }

    /// Owner of a composite file, or `None` for non-composite files.
    pub fn owner_of(&self, fp: &FileProperty) -> Option<&CompositeOwner> {
        self.owners.get(&fp.file_name)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

fn synthesize_descriptor(
    member: &MemberKey,
    bundle_dir: &Path,
    pattern: Option<&DescriptorPattern>,
) -> FileProperty {
    let path = match pattern {
        Some(DescriptorPattern::Suffix(suffix)) => {
            bundle_dir.join(format!("{}{}", member.full_name, suffix))
        }
        Some(DescriptorPattern::FileName(name)) => bundle_dir.join(name),
        None => bundle_dir.to_path_buf(),
    };
    FileProperty::new(
        member.member_type.clone(),
        member.full_name.clone(),
        path.to_string_lossy().into_owned(),
    )
}

/// Flags the applier passes through to the workspace commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub unsupported_mime_types: Vec<String>,
    pub force_overwrite: bool,
}

/// Writes a retrieval result and a package's deletions into a workspace.
pub struct SyncApplier<'a, W: WorkspaceStore + ?Sized> {
    workspace: &'a W,
    registry: &'a TypeRegistry,
}

impl<'a, W: WorkspaceStore + ?Sized> SyncApplier<'a, W> {
    pub fn new(workspace: &'a W, registry: &'a TypeRegistry) -> Self {
        Self {
            workspace,
            registry,
        }
    }

    /// Apply `result` (retrieved into `ctx.target_dir`) and remove
    /// `obsolete` members.
    ///
    /// No retry: any failure is returned to the caller. A commit rejected by
    /// a check writes nothing; an I/O failure part way through leaves the
    /// workspace index matching the files that were written.
    pub async fn apply(
        &self,
        ctx: &PackageContext,
        result: &RetrievalResult,
        obsolete: &[ObsoleteName],
        options: &ApplyOptions,
    ) -> Result<AggregateSourceElements> {
        let entries: Vec<FileProperty> = result
            .file_properties
            .iter()
            .filter(|fp| !fp.is_manifest_wrapper())
            .map(FileProperty::normalized)
            .collect();

        let attribution = CompositeAttribution::compute(self.registry, &entries);
        tracing::debug!(
            package = %ctx.package,
            entries = entries.len(),
            composite = attribution.len(),
            obsolete = obsolete.len(),
            "applying retrieval"
        );

        let mut aggregate = AggregateSourceElements::new();
        for entry in &entries {
            self.workspace
                .process_entry(&mut aggregate, ctx, entry, &attribution)
                .await?;
        }
        for name in obsolete {
            self.workspace
                .remove_obsolete(&mut aggregate, ctx, name)
                .await?;
        }

        // One retrieval batch cannot contain duplicates.
        let commit = CommitOptions {
            manifest: ctx.manifest.path().map(Path::to_path_buf),
            skip_duplicate_check: true,
            unsupported_mime_types: options.unsupported_mime_types.clone(),
            force_overwrite: options.force_overwrite,
        };
        self.workspace.commit(aggregate, &commit).await
    }
}
