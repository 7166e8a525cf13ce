//! Capability label algebra (spec.md §3, §4.1).
//!
//! A [`Capability`] is an immutable `(kind, source)` pair. A [`CapabilitySet`]
//! is an unordered collection of capabilities plus an opaque data identifier.
//! The algebra is closed under [`CapabilitySet::merge`] and
//! [`CapabilitySet::derive_from`]; it is not a full lattice, since `TRUSTED`
//! and `UNTRUSTED` are not ordered relative to each other.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed enumeration of capability kinds (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Permission to read a resource.
    Read,
    /// Permission to write a resource.
    Write,
    /// Permission to execute an action.
    Execute,
    /// Permission to perform network I/O.
    Network,
    /// Data originates from a trusted principal (asserted, never inferred).
    Trusted,
    /// Data originates from, or was derived from, an untrusted source.
    Untrusted,
}

/// An immutable `(kind, source)` label attached to a value or identifier.
///
/// `source` names the origin (e.g. `"user"`, `"email"`,
/// `"ticket:TICKET-001"`). `metadata` is informational only: equality and
/// hashing consider `(kind, source)` alone, per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// The capability kind.
    pub kind: CapabilityKind,
    /// Opaque string naming the origin of this capability.
    pub source: String,
    /// Informational metadata. Never considered for equality or hashing.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Capability {
    /// Construct a capability with no metadata.
    pub fn new(kind: CapabilityKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// A `TRUSTED` capability from the given source.
    pub fn trusted(source: impl Into<String>) -> Self {
        Self::new(CapabilityKind::Trusted, source)
    }

    /// An `UNTRUSTED` capability from the given source.
    pub fn untrusted(source: impl Into<String>) -> Self {
        Self::new(CapabilityKind::Untrusted, source)
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.source == other.source
    }
}

impl Eq for Capability {}

impl std::hash::Hash for Capability {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.source.hash(state);
    }
}

/// An unordered set of [`Capability`] plus an opaque data identifier that is
/// stable for the lifetime of the labelled value (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: HashSet<Capability>,
    /// Opaque identifier for the underlying data, stable across copies
    /// produced by label propagation.
    pub data_id: Uuid,
}

impl CapabilitySet {
    /// An empty capability set with a freshly minted data identifier.
    pub fn new() -> Self {
        Self {
            capabilities: HashSet::new(),
            data_id: Uuid::new_v4(),
        }
    }

    /// Build a set from an iterator of capabilities.
    pub fn from_capabilities(caps: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            capabilities: caps.into_iter().collect(),
            data_id: Uuid::new_v4(),
        }
    }

    /// Add a capability to this set (duplicate `(kind, source)` pairs
    /// collapse, per I3).
    pub fn add(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// Iterate over the capabilities in this set.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// Number of distinct `(kind, source)` capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether this set has no capabilities.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// `true` iff some capability in the set has kind `TRUSTED`.
    pub fn is_trusted(&self) -> bool {
        self.has_kind(CapabilityKind::Trusted)
    }

    /// `true` iff some capability in the set has kind `UNTRUSTED`.
    ///
    /// Per spec.md §4.1: a policy that demands "purely trusted" inputs
    /// must check `!is_untrusted()`, not `is_trusted()` — a set can
    /// legally contain both kinds at once.
    pub fn is_untrusted(&self) -> bool {
        self.has_kind(CapabilityKind::Untrusted)
    }

    /// `true` iff some capability in the set has the given kind.
    pub fn has_kind(&self, kind: CapabilityKind) -> bool {
        self.capabilities.iter().any(|c| c.kind == kind)
    }

    /// `true` iff some capability with the given kind and source exists.
    pub fn has(&self, kind: CapabilityKind, source: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.kind == kind && c.source == source)
    }

    /// All distinct sources contributing to this set (diagnostic use,
    /// grounded on `CapabilitySet.get_sources()` in the Python reference).
    pub fn sources(&self) -> HashSet<&str> {
        self.capabilities.iter().map(|c| c.source.as_str()).collect()
    }

    /// `merge(A, B) = A ∪ B` (spec.md §3). The resulting set keeps `self`'s
    /// data identifier.
    pub fn merge(&self, other: &CapabilitySet) -> CapabilitySet {
        let mut capabilities = self.capabilities.clone();
        capabilities.extend(other.capabilities.iter().cloned());
        CapabilitySet {
            capabilities,
            data_id: self.data_id,
        }
    }

    /// `derive_from(S1, …, Sn) = ⋃ Si ∪ { (UNTRUSTED, "derived") if any Si
    /// is untrusted }` (spec.md §3).
    ///
    /// Invariant I1 (taint monotonicity): this never drops `UNTRUSTED` —
    /// once any source is untrusted, the derived set is untrusted too.
    /// Invariant I2 (trust non-inference): `TRUSTED` is never synthesized
    /// here; it is only ever asserted at an origin.
    pub fn derive_from<'a>(sources: impl IntoIterator<Item = &'a CapabilitySet>) -> CapabilitySet {
        let mut derived = CapabilitySet::new();
        let mut any_untrusted = false;
        for source in sources {
            derived.capabilities.extend(source.capabilities.iter().cloned());
            any_untrusted = any_untrusted || source.is_untrusted();
        }
        if any_untrusted {
            derived.add(Capability::untrusted("derived"));
        }
        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_equality_ignores_metadata() {
        let mut a = Capability::trusted("user");
        a.metadata.insert("note".into(), "a".into());
        let mut b = Capability::trusted("user");
        b.metadata.insert("note".into(), "b".into());
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_capabilities_collapse() {
        let mut set = CapabilitySet::new();
        set.add(Capability::trusted("user"));
        set.add(Capability::trusted("user"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn is_trusted_and_is_untrusted_are_independent() {
        let mut set = CapabilitySet::new();
        set.add(Capability::trusted("user"));
        set.add(Capability::untrusted("email"));
        assert!(set.is_trusted());
        assert!(set.is_untrusted());
    }

    #[test]
    fn merge_is_union() {
        let mut a = CapabilitySet::new();
        a.add(Capability::trusted("user"));
        let mut b = CapabilitySet::new();
        b.add(Capability::untrusted("email"));
        let merged = a.merge(&b);
        assert_eq!(merged.len(), 2);
        assert!(merged.is_trusted());
        assert!(merged.is_untrusted());
    }

    #[test]
    fn derive_from_propagates_untrusted() {
        let mut trusted = CapabilitySet::new();
        trusted.add(Capability::trusted("user"));
        let mut untrusted = CapabilitySet::new();
        untrusted.add(Capability::untrusted("email"));

        let derived = CapabilitySet::derive_from([&trusted, &untrusted]);
        assert!(derived.is_untrusted());
        // I2: TRUSTED from a predecessor is still present (union), but the
        // derived set is not "purely trusted" by virtue of is_trusted()==true.
        assert!(derived.is_trusted());
    }

    #[test]
    fn derive_from_all_trusted_has_no_synthesized_untrusted() {
        let mut a = CapabilitySet::new();
        a.add(Capability::trusted("user"));
        let mut b = CapabilitySet::new();
        b.add(Capability::trusted("user"));

        let derived = CapabilitySet::derive_from([&a, &b]);
        assert!(!derived.is_untrusted());
    }

    #[test]
    fn derive_from_no_sources_is_empty() {
        let derived = CapabilitySet::derive_from([]);
        assert!(derived.is_empty());
    }

    #[test]
    fn derive_from_never_drops_untrusted_transitively() {
        // I1: once untrusted, every derived value stays untrusted.
        let mut root = CapabilitySet::new();
        root.add(Capability::untrusted("ext"));

        let gen1 = CapabilitySet::derive_from([&root]);
        assert!(gen1.is_untrusted());
        let gen2 = CapabilitySet::derive_from([&gen1]);
        assert!(gen2.is_untrusted());
        let gen3 = CapabilitySet::derive_from([&gen2, &CapabilitySet::new()]);
        assert!(gen3.is_untrusted());
    }

    #[test]
    fn sources_reports_distinct_origins() {
        let mut set = CapabilitySet::new();
        set.add(Capability::trusted("user"));
        set.add(Capability::untrusted("email"));
        let sources = set.sources();
        assert_eq!(sources.len(), 2);
        assert!(sources.contains("user"));
        assert!(sources.contains("email"));
    }
}
