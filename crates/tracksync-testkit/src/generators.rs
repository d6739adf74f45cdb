//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tracksync_core::MemberKey;

/// A non-composite metadata type and the directory its files live in.
pub fn member_type() -> impl Strategy<Value = (&'static str, &'static str)> {
    prop_oneof![
        Just(("ApexClass", "classes")),
        Just(("ApexTrigger", "triggers")),
        Just(("CustomObject", "objects")),
        Just(("Layout", "layouts")),
    ]
}

/// A member name, optionally namespaced.
pub fn member_name() -> impl Strategy<Value = String> {
    (
        prop::option::of(prop_oneof![Just("acme"), Just("globex")]),
        "[A-Z][a-z]{2,8}[0-9]",
    )
        .prop_map(|(namespace, name)| match namespace {
            Some(ns) => format!("{}__{}", ns, name),
            None => name,
        })
}

/// Generate a random MemberKey.
pub fn member_key() -> impl Strategy<Value = MemberKey> {
    (member_type(), member_name()).prop_map(|((t, _), name)| MemberKey::new(t, name))
}

/// A member to place on a remote: its key, one file path and the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMember {
    pub key: MemberKey,
    pub path: String,
    pub content: String,
}

/// Up to `max` members with distinct keys and distinct file paths.
pub fn remote_members(max: usize) -> impl Strategy<Value = Vec<GeneratedMember>> {
    prop::collection::btree_map(
        (member_type(), member_name()),
        "[a-z ]{0,24}",
        0..=max,
    )
    .prop_map(|members| {
        members
            .into_iter()
            .map(|(((member_type, dir), name), content)| GeneratedMember {
                key: MemberKey::new(member_type, name.clone()),
                path: format!("{}/{}.txt", dir, name),
                content,
            })
            .collect()
    })
}
