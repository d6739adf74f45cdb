//! Registry of composite (bundle) metadata types.
//!
//! A composite type is one logical member stored as a directory: a root
//! descriptor file plus sibling files (markup, styling, controller logic).
//! Every file under `<directory>/<bundle>/` belongs to the member
//! `(bundle_type, <bundle>)`.
//!
//! The registry also knows the directory of each single-file type, so a local
//! file can be resolved to the member it would belong to.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::retrieve::FileProperty;
use crate::types::MemberKey;

/// How a bundle's root descriptor file is recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptorPattern {
    /// `<bundle><suffix>`, e.g. `root.cmp`.
    Suffix(String),
    /// A fixed file name, e.g. `template-info.json`.
    FileName(String),
}

impl DescriptorPattern {
    fn matches(&self, bundle_name: &str, file_name: &str) -> bool {
        match self {
            DescriptorPattern::Suffix(suffix) => file_name
                .strip_prefix(bundle_name)
                .is_some_and(|rest| rest == suffix),
            DescriptorPattern::FileName(name) => file_name == name,
        }
    }
}

/// One composite metadata type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeType {
    pub bundle_type: String,
    /// Directory segment under which bundles of this type live.
    pub directory: String,
    /// Descriptor patterns in priority order.
    pub descriptors: Vec<DescriptorPattern>,
}

impl CompositeType {
    pub fn new(
        bundle_type: impl Into<String>,
        directory: impl Into<String>,
        descriptors: Vec<DescriptorPattern>,
    ) -> Self {
        Self {
            bundle_type: bundle_type.into(),
            directory: directory.into(),
            descriptors,
        }
    }

    /// Descriptor priority of `file_name` within `bundle_name`, lower is
    /// better. `None` if the file is not a descriptor.
    pub fn descriptor_rank(&self, bundle_name: &str, file_name: &str) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|d| d.matches(bundle_name, file_name))
    }
}

/// Where a file sits inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLocation<'a> {
    pub composite: &'a CompositeType,
    /// Path of the bundle directory, e.g. `unpackaged/aura/root`.
    pub bundle_dir: PathBuf,
    pub bundle_name: String,
    /// File name within the bundle directory.
    pub file_name: String,
}

impl BundleLocation<'_> {
    /// The member that owns the bundle.
    pub fn owner(&self) -> MemberKey {
        MemberKey::new(self.composite.bundle_type.clone(), self.bundle_name.clone())
    }

    pub fn is_descriptor(&self) -> bool {
        self.descriptor_rank().is_some()
    }

    pub fn descriptor_rank(&self) -> Option<usize> {
        self.composite
            .descriptor_rank(&self.bundle_name, &self.file_name)
    }
}

/// A type stored as one file per member, plus an optional `-meta.xml`
/// sidecar, under a fixed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
    pub member_type: String,
    pub directory: String,
}

impl FileType {
    pub fn new(member_type: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            member_type: member_type.into(),
            directory: directory.into(),
        }
    }
}

/// Member name encoded in a file name: `Foo.cls` and `Foo.cls-meta.xml`
/// both name `Foo`.
fn member_name_of(file_name: &str) -> &str {
    let base = file_name.strip_suffix("-meta.xml").unwrap_or(file_name);
    base.rsplit_once('.').map_or(base, |(name, _)| name)
}

fn normal_parts(path: &Path) -> Vec<&str> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect()
}

/// Known composite and single-file types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRegistry {
    composites: Vec<CompositeType>,
    #[serde(default)]
    file_types: Vec<FileType>,
}

impl TypeRegistry {
    /// A registry with no types.
    pub fn empty() -> Self {
        Self {
            composites: Vec::new(),
            file_types: Vec::new(),
        }
    }

    pub fn register(&mut self, composite: CompositeType) {
        self.composites.retain(|c| c.bundle_type != composite.bundle_type);
        self.composites.push(composite);
    }

    pub fn with(mut self, composite: CompositeType) -> Self {
        self.register(composite);
        self
    }

    pub fn register_file_type(&mut self, file_type: FileType) {
        self.file_types
            .retain(|t| t.member_type != file_type.member_type);
        self.file_types.push(file_type);
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.register_file_type(file_type);
        self
    }

    pub fn composites(&self) -> &[CompositeType] {
        &self.composites
    }

    pub fn file_types(&self) -> &[FileType] {
        &self.file_types
    }

    pub fn is_composite_type(&self, member_type: &str) -> bool {
        self.composites.iter().any(|c| c.bundle_type == member_type)
    }

    /// Locate a retrieved file inside a bundle directory.
    ///
    /// Retrieved paths have the shape `<root>/<directory>/<bundle>/<file>...`,
    /// where `<root>` is the package root. If the entry names a composite
    /// type, only that composite is considered.
    pub fn locate(&self, fp: &FileProperty) -> Option<BundleLocation<'_>> {
        let path = fp.path();
        let parts = normal_parts(&path);
        let [root, directory, bundle, rest @ ..] = parts.as_slice() else {
            return None;
        };
        if rest.is_empty() {
            return None;
        }

        let typed = self.is_composite_type(&fp.member_type);
        let composite = self.composites.iter().find(|c| {
            c.directory == *directory && (!typed || c.bundle_type == fp.member_type)
        })?;

        Some(BundleLocation {
            composite,
            bundle_dir: [root, directory, bundle].iter().collect(),
            bundle_name: bundle.to_string(),
            file_name: rest
                .iter()
                .collect::<PathBuf>()
                .to_string_lossy()
                .into_owned(),
        })
    }

    /// The member a package-relative workspace path belongs to, e.g.
    /// `classes/Foo.cls` to `ApexClass:Foo`. `None` for unknown directories.
    pub fn resolve(&self, path: &Path) -> Option<MemberKey> {
        let parts = normal_parts(path);
        let [directory, first, rest @ ..] = parts.as_slice() else {
            return None;
        };

        if let Some(composite) = self.composites.iter().find(|c| c.directory == *directory) {
            return (!rest.is_empty())
                .then(|| MemberKey::new(composite.bundle_type.clone(), first.to_string()));
        }

        let file_type = self.file_types.iter().find(|t| t.directory == *directory)?;
        // Types with a folder per member (`objects/Account/...`) use the folder name.
        let name = if rest.is_empty() {
            member_name_of(first)
        } else {
            *first
        };
        Some(MemberKey::new(file_type.member_type.clone(), name.to_string()))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let suffixes = |s: &[&str]| {
            s.iter()
                .map(|x| DescriptorPattern::Suffix((*x).to_string()))
                .collect::<Vec<_>>()
        };
        let registry = Self::empty()
            .with(CompositeType::new(
                "AuraDefinitionBundle",
                "aura",
                suffixes(&[".cmp", ".app", ".evt", ".intf", ".tokens"]),
            ))
            .with(CompositeType::new(
                "LightningComponentBundle",
                "lwc",
                suffixes(&[".js-meta.xml", ".js"]),
            ))
            .with(CompositeType::new(
                "WaveTemplateBundle",
                "waveTemplates",
                vec![DescriptorPattern::FileName("template-info.json".to_string())],
            ));
        [
            ("ApexClass", "classes"),
            ("ApexTrigger", "triggers"),
            ("ApexPage", "pages"),
            ("ApexComponent", "components"),
            ("CustomObject", "objects"),
            ("Layout", "layouts"),
            ("StaticResource", "staticresources"),
            ("Flow", "flows"),
            ("PermissionSet", "permissionsets"),
            ("Profile", "profiles"),
        ]
        .into_iter()
        .fold(registry, |registry, (member_type, directory)| {
            registry.with_file_type(FileType::new(member_type, directory))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_aura_sibling() {
        let registry = TypeRegistry::default();
        let fp = FileProperty::new(
            "AuraDefinitionBundle",
            "root",
            "unpackaged/aura/root/rootController.js",
        );
        let loc = registry.locate(&fp).unwrap();
        assert_eq!(loc.owner(), MemberKey::new("AuraDefinitionBundle", "root"));
        assert_eq!(loc.bundle_dir, PathBuf::from("unpackaged").join("aura").join("root"));
        assert!(!loc.is_descriptor());
    }

    #[test]
    fn test_locate_descriptor() {
        let registry = TypeRegistry::default();
        let fp = FileProperty::new("AuraDefinitionBundle", "root", "unpackaged/aura/root/root.cmp");
        assert!(registry.locate(&fp).unwrap().is_descriptor());

        let lwc = FileProperty::new(
            "LightningComponentBundle",
            "card",
            "unpackaged/lwc/card/card.js-meta.xml",
        );
        let loc = registry.locate(&lwc).unwrap();
        assert_eq!(loc.descriptor_rank(), Some(0));
    }

    #[test]
    fn test_locate_ignores_plain_files() {
        let registry = TypeRegistry::default();
        let fp = FileProperty::new("ApexClass", "Foo", "unpackaged/classes/Foo.cls");
        assert!(registry.locate(&fp).is_none());

        // A bundle directory entry with no file inside is not a sibling.
        let dir = FileProperty::new("AuraDefinitionBundle", "root", "unpackaged/aura/root");
        assert!(registry.locate(&dir).is_none());
    }

    #[test]
    fn test_locate_requires_directory_after_package_root() {
        let registry = TypeRegistry::default();
        // `lwc` deeper in the path is not a bundle directory.
        let fp = FileProperty::new(
            "ExperienceBundle",
            "site",
            "unpackaged/experiences/site/lwc/foo/x.json",
        );
        assert!(registry.locate(&fp).is_none());

        let static_file = FileProperty::new(
            "StaticResource",
            "assets",
            "unpackaged/staticresources/assets/aura/root/x.js",
        );
        assert!(registry.locate(&static_file).is_none());
    }

    #[test]
    fn test_locate_honours_named_composite_type() {
        let registry = TypeRegistry::default();
        // An aura entry under an lwc directory is not an lwc sibling.
        let fp = FileProperty::new("AuraDefinitionBundle", "card", "unpackaged/lwc/card/card.js");
        assert!(registry.locate(&fp).is_none());
    }

    #[test]
    fn test_resolve_local_paths() {
        let registry = TypeRegistry::default();
        assert_eq!(
            registry.resolve(Path::new("classes/Foo.cls")),
            Some(MemberKey::new("ApexClass", "Foo"))
        );
        assert_eq!(
            registry.resolve(Path::new("classes/Foo.cls-meta.xml")),
            Some(MemberKey::new("ApexClass", "Foo"))
        );
        assert_eq!(
            registry.resolve(Path::new("layouts/Account-Account Layout.layout-meta.xml")),
            Some(MemberKey::new("Layout", "Account-Account Layout"))
        );
        assert_eq!(
            registry.resolve(Path::new("objects/Account/fields/Rating__c.field-meta.xml")),
            Some(MemberKey::new("CustomObject", "Account"))
        );
        assert_eq!(
            registry.resolve(Path::new("aura/root/rootController.js")),
            Some(MemberKey::new("AuraDefinitionBundle", "root"))
        );
        assert_eq!(registry.resolve(Path::new("aura/root")), None);
        assert_eq!(registry.resolve(Path::new("unknown/Foo.txt")), None);
        assert_eq!(registry.resolve(Path::new("README.md")), None);
    }

    #[test]
    fn test_register_replaces() {
        let registry = TypeRegistry::empty()
            .with(CompositeType::new("X", "x", vec![]))
            .with(CompositeType::new("X", "xs", vec![]));
        assert_eq!(registry.composites().len(), 1);
        assert_eq!(registry.composites()[0].directory, "xs");
    }
}
