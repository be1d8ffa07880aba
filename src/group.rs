//! Groups — ordered collections of references with set-style queries.
//!
//! Membership is id equality and every query is a linear scan; groups hold
//! tens of entries, not thousands.

use bevy::prelude::Component;
use serde::{Deserialize, Serialize, Serializer};

use crate::database::Database;
use crate::marker::{Flag, IntoMarkerId, Marker, MarkerKind};
use crate::reference::{Reference, ValueReference};
use crate::{MarkerId, UNSET_ID};

/// An ordered, duplicate-free collection of marker references.
///
/// # Example
///
/// ```ignore
/// let required = TagGroup::new().with(enemy).with(flying);
/// let on_entity: TagGroup = entity_tags.iter().copied().collect();
///
/// if on_entity.contains_all(&required) {
///     // entity is a flying enemy
/// }
/// ```
///
/// Serializes as a list of ids. Loading goes through [`Group::add_reference`],
/// so duplicates and unset ids in stored data are dropped.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(bound = "", from = "Vec<Reference<K>>")]
pub struct Group<K: MarkerKind> {
    entries: Vec<Reference<K>>,
}

impl<K: MarkerKind> Group<K> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a marker and return self.
    pub fn with(mut self, id: impl IntoMarkerId) -> Self {
        self.add(id);
        self
    }

    /// Append a marker unless it is already present.
    ///
    /// Returns `true` if the marker was newly added. Unset ids are ignored.
    pub fn add(&mut self, id: impl IntoMarkerId) -> bool {
        self.add_reference(Reference::new(id.into_marker_id()))
    }

    /// Append an existing reference, keeping its resolution cache.
    pub fn add_reference(&mut self, reference: Reference<K>) -> bool {
        if !reference.is_set() || self.contains(reference.id()) {
            return false;
        }
        self.entries.push(reference);
        true
    }

    /// Returns `true` if the marker was present.
    pub fn remove(&mut self, id: impl IntoMarkerId) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Option<Reference<K>> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    #[inline]
    pub fn contains(&self, id: impl IntoMarkerId) -> bool {
        self.position(id).is_some()
    }

    /// Index of the marker in this group.
    pub fn position(&self, id: impl IntoMarkerId) -> Option<usize> {
        let id = id.into_marker_id();
        if id == UNSET_ID {
            return None;
        }
        self.entries.iter().position(|r| r.id() == id)
    }

    /// `true` iff every entry of `other` is in this group. Vacuously true for
    /// an empty `other`.
    pub fn contains_all(&self, other: &Group<K>) -> bool {
        other.entries.iter().all(|r| self.contains(r))
    }

    /// `true` if the groups share at least one marker.
    ///
    /// With `valid_if_empty`, an empty group on either side counts as a match
    /// ("no filter configured").
    pub fn contains_any(&self, other: &Group<K>, valid_if_empty: bool) -> bool {
        if valid_if_empty && (self.is_empty() || other.is_empty()) {
            return true;
        }
        self.entries.iter().any(|r| other.contains(r))
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Reference<K>> {
        self.entries.get(index)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Reference<K>> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.entries.iter().map(Reference::id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Resolve every entry, skipping dangling ones.
    pub fn resolve_all<'db>(&mut self, db: &'db Database<K>) -> Vec<&'db Marker<K>> {
        self.entries.iter_mut().filter_map(|r| r.resolve(db)).collect()
    }

    /// Drop entries that no longer resolve. Returns how many were dropped.
    pub fn prune(&mut self, db: &Database<K>) -> usize {
        let before = self.entries.len();
        self.entries.retain_mut(|r| r.resolve(db).is_some());
        before - self.entries.len()
    }
}

impl<K: MarkerKind> Serialize for Group<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<K: MarkerKind> From<Vec<Reference<K>>> for Group<K> {
    fn from(entries: Vec<Reference<K>>) -> Self {
        let mut group = Self::new();
        for reference in entries {
            group.add_reference(reference);
        }
        group
    }
}

impl<K: MarkerKind> FromIterator<MarkerId> for Group<K> {
    fn from_iter<T: IntoIterator<Item = MarkerId>>(iter: T) -> Self {
        let mut group = Self::new();
        group.extend(iter);
        group
    }
}

impl<K: MarkerKind> Extend<MarkerId> for Group<K> {
    fn extend<T: IntoIterator<Item = MarkerId>>(&mut self, iter: T) {
        for id in iter {
            self.add(id);
        }
    }
}

impl<'a, K: MarkerKind> IntoIterator for &'a Group<K> {
    type Item = &'a Reference<K>;
    type IntoIter = std::slice::Iter<'a, Reference<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// =============================================================================
// ValueGroup
// =============================================================================

/// Flag requirements: each entry names a flag and the value it must hold.
///
/// Loading keeps the first requirement per flag and drops unset ids.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<ValueReference>")]
pub struct ValueGroup {
    entries: Vec<ValueReference>,
}

impl ValueGroup {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a requirement and return self.
    pub fn with(mut self, id: impl IntoMarkerId, required: bool) -> Self {
        self.add(id, required);
        self
    }

    /// Add a requirement unless the flag already has one.
    pub fn add(&mut self, id: impl IntoMarkerId, required: bool) -> bool {
        let id = id.into_marker_id();
        if id == UNSET_ID || self.contains(id) {
            return false;
        }
        self.entries.push(ValueReference::new(id, required));
        true
    }

    pub fn remove(&mut self, id: impl IntoMarkerId) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Option<ValueReference> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    #[inline]
    pub fn contains(&self, id: impl IntoMarkerId) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: impl IntoMarkerId) -> Option<usize> {
        let id = id.into_marker_id();
        if id == UNSET_ID {
            return None;
        }
        self.entries.iter().position(|r| r.id() == id)
    }

    /// The value required for a flag, if this group names it.
    pub fn required(&self, id: impl IntoMarkerId) -> Option<bool> {
        self.position(id).map(|idx| self.entries[idx].required())
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ValueReference> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` iff every requirement holds. Vacuously true when empty.
    pub fn all_valid(&mut self, db: &Database<Flag>) -> bool {
        self.entries.iter_mut().all(|r| r.is_valid(db))
    }

    /// `true` if at least one requirement holds.
    pub fn any_valid(&mut self, db: &Database<Flag>) -> bool {
        self.entries.iter_mut().any(|r| r.is_valid(db))
    }

    /// Write every required value (or its inverse) onto the live flags.
    ///
    /// Returns the number of flags that could be resolved and written.
    pub fn apply_all(&mut self, db: &mut Database<Flag>, invert: bool) -> usize {
        let mut applied = 0;
        for entry in &mut self.entries {
            if entry.apply(db, invert) {
                applied += 1;
            }
        }
        applied
    }

    /// Drop requirements whose flag no longer resolves.
    pub fn prune(&mut self, db: &Database<Flag>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain_mut(|r| r.reference_mut().resolve(db).is_some());
        before - self.entries.len()
    }
}

impl Serialize for ValueGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl From<Vec<ValueReference>> for ValueGroup {
    fn from(entries: Vec<ValueReference>) -> Self {
        let mut group = Self::new();
        for entry in entries {
            group.add(entry.id(), entry.required());
        }
        group
    }
}

impl<'a> IntoIterator for &'a ValueGroup {
    type Item = &'a ValueReference;
    type IntoIter = std::slice::Iter<'a, ValueReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
