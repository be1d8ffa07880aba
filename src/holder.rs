//! Holders — ordered, name-sorted containers that own their markers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{IdCollision, RegistryError, Result};
use crate::id::{allocate, next_holder_id, observe};
use crate::marker::{Marker, MarkerKind};
use crate::reference::Reference;
use crate::{HolderId, MarkerId, UNSET_ID};

/// Static definition of a marker (used for holder building from the `holder!` macro).
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerDef<K: MarkerKind> {
    pub id: MarkerId,
    pub name: &'static str,
    /// Initial payload; `None` means the kind's default.
    pub data: Option<K::Data>,
}

impl<K: MarkerKind> MarkerDef<K> {
    pub const fn new(id: MarkerId, name: &'static str, data: Option<K::Data>) -> Self {
        Self { id, name, data }
    }
}

/// An ordered container of markers.
///
/// Provides:
/// - Idempotent, name-keyed marker creation
/// - Id and name lookup (linear; holders hold tens of markers)
/// - Name-sorted enumeration after every structural change
/// - A generation counter that lets references detect stale cached slots
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "", try_from = "HolderRepr<K>")]
pub struct Holder<K: MarkerKind> {
    #[serde(skip)]
    id: HolderId,
    name: String,
    markers: Vec<Marker<K>>,
    /// Next id this holder hands out; persisted so ids are never reused.
    next_id: MarkerId,
    #[serde(skip)]
    generation: u64,
}

impl<K: MarkerKind> Holder<K> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: next_holder_id(),
            name: name.into(),
            markers: Vec::new(),
            next_id: UNSET_ID + 1,
            generation: 0,
        }
    }

    /// Build a holder from static marker definitions (from macro).
    ///
    /// Ids are taken verbatim, so they stay stable across builds.
    pub fn from_defs(name: impl Into<String>, defs: &[MarkerDef<K>]) -> Result<Self> {
        let mut holder = Self::new(name);
        Self::validate_defs(&holder.name, defs)?;

        holder.markers = defs
            .iter()
            .map(|def| {
                let data = def.data.clone().unwrap_or_default();
                Marker::new(def.id, def.name, holder.id, data)
            })
            .collect();
        for def in defs {
            observe(&mut holder.next_id, def.id);
        }
        holder.sort_by_name();
        Ok(holder)
    }

    #[inline]
    pub fn id(&self) -> HolderId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Markers sorted by name.
    #[inline]
    pub fn markers(&self) -> &[Marker<K>] {
        &self.markers
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Marker<K>> {
        self.markers.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.markers.iter().map(Marker::id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Bumped on every structural mutation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The id the next locally created marker will receive.
    #[inline]
    pub fn next_id(&self) -> MarkerId {
        self.next_id
    }

    /// Create a marker, or return the id of the existing marker with this name.
    ///
    /// The id comes from this holder's own counter. Holders authored side by
    /// side should create markers through [`crate::Database::add_marker`] so
    /// ids are drawn from the database-wide counter instead.
    ///
    /// # Errors
    ///
    /// - Returns error if `name` is empty
    /// - Returns error if the id space is exhausted
    pub fn add_marker(&mut self, name: impl Into<String>, data: K::Data) -> Result<MarkerId> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some(existing) = self.find_by_name(&name) {
            return Ok(existing.id());
        }
        let id = allocate(&mut self.next_id)?;
        self.insert(id, name, data);
        Ok(id)
    }

    /// Insert a marker under an id allocated by the caller.
    pub(crate) fn insert(&mut self, id: MarkerId, name: String, data: K::Data) {
        debug!(holder = %self.name, id, name = %name, "{} created", K::LABEL);
        observe(&mut self.next_id, id);
        self.markers.push(Marker::new(id, name, self.id, data));
        self.sort_by_name();
    }

    /// Create many markers at once, sorting a single time at the end.
    ///
    /// Existing names keep their ids, as with [`Holder::add_marker`].
    /// Returns the ids in input order.
    pub fn bulk_load<I, S>(&mut self, items: I) -> Result<Vec<MarkerId>>
    where
        I: IntoIterator<Item = (S, K::Data)>,
        S: Into<String>,
    {
        let items: Vec<(String, K::Data)> = items.into_iter().map(|(name, data)| (name.into(), data)).collect();
        if items.iter().any(|(name, _)| name.is_empty()) {
            return Err(RegistryError::EmptyName);
        }

        let mut ids = Vec::with_capacity(items.len());
        let mut created = 0usize;
        let mut outcome = Ok(());
        for (name, data) in items {
            if let Some(existing) = self.find_by_name(&name) {
                ids.push(existing.id());
                continue;
            }
            match allocate(&mut self.next_id) {
                Ok(id) => {
                    self.markers.push(Marker::new(id, name, self.id, data));
                    ids.push(id);
                    created += 1;
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        debug!(holder = %self.name, created, "bulk load of {}s", K::LABEL);
        self.sort_by_name();
        outcome.map(|()| ids)
    }

    /// Remove a marker. Returns `false` if no marker has this id.
    pub fn remove_marker(&mut self, id: MarkerId) -> bool {
        self.take_marker(id).is_some()
    }

    pub(crate) fn take_marker(&mut self, id: MarkerId) -> Option<Marker<K>> {
        let idx = self.position(id)?;
        let marker = self.markers.remove(idx);
        debug!(holder = %self.name, id, name = marker.name(), "{} removed", K::LABEL);
        self.generation += 1;
        Some(marker)
    }

    /// Take ownership of a marker detached from another holder, keeping its id.
    pub(crate) fn adopt(&mut self, mut marker: Marker<K>) {
        marker.set_holder(self.id);
        observe(&mut self.next_id, marker.id());
        self.markers.push(marker);
        self.sort_by_name();
    }

    /// Rename a marker.
    ///
    /// Returns `false` if the marker does not exist, the name is empty, or
    /// another marker of this holder already uses the name.
    pub fn rename_marker(&mut self, id: MarkerId, new_name: impl Into<String>) -> bool {
        let new_name = new_name.into();
        if new_name.is_empty() {
            return false;
        }
        if let Some(other) = self.find_by_name(&new_name) {
            return other.id() == id;
        }
        let Some(idx) = self.position(id) else {
            return false;
        };
        debug!(holder = %self.name, id, from = self.markers[idx].name(), to = %new_name, "{} renamed", K::LABEL);
        self.markers[idx].set_name(new_name);
        self.sort_by_name();
        true
    }

    #[inline]
    pub fn find_by_id(&self, id: MarkerId) -> Option<&Marker<K>> {
        self.markers.iter().find(|m| m.id() == id)
    }

    #[inline]
    pub fn find_by_name(&self, name: &str) -> Option<&Marker<K>> {
        self.markers.iter().find(|m| m.name() == name)
    }

    /// Index of the marker with this id in [`Holder::markers`].
    #[inline]
    pub fn position(&self, id: MarkerId) -> Option<usize> {
        if id == UNSET_ID {
            return None;
        }
        self.markers.iter().position(|m| m.id() == id)
    }

    #[inline]
    pub fn contains(&self, id: MarkerId) -> bool {
        self.position(id).is_some()
    }

    /// Mutable access for metadata and non-structural payload edits.
    pub fn marker_mut(&mut self, id: MarkerId) -> Option<&mut Marker<K>> {
        self.markers.iter_mut().find(|m| m.id() == id)
    }

    pub(crate) fn marker_at_mut(&mut self, index: usize) -> &mut Marker<K> {
        &mut self.markers[index]
    }

    /// Give the marker at `index` a new id allocated by the caller.
    pub(crate) fn reassign_at(&mut self, index: usize, id: MarkerId) {
        self.markers[index].set_id(id);
        observe(&mut self.next_id, id);
        self.generation += 1;
    }

    /// Total order by name; ties (only possible in imported data) fall back to id.
    pub fn sort_by_name(&mut self) {
        self.markers
            .sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));
        self.generation += 1;
    }

    /// Give every marker that shares an id with an earlier one a fresh id.
    ///
    /// This is a repair path for externally edited data, not a steady-state
    /// operation; each repair is logged as an error.
    pub fn repair_duplicate_ids(&mut self) -> Vec<IdCollision> {
        let mut seen = HashSet::new();
        let mut collisions = Vec::new();
        for idx in 0..self.markers.len() {
            let id = self.markers[idx].id();
            if seen.insert(id) {
                continue;
            }
            let Ok(fresh) = allocate(&mut self.next_id) else {
                error!(holder = %self.name, id, "cannot repair duplicate {} id: id space exhausted", K::LABEL);
                break;
            };
            let kept = self
                .markers
                .iter()
                .find(|m| m.id() == id)
                .map(|m| m.name().to_string())
                .unwrap_or_default();
            let collision = IdCollision {
                id,
                kept: (self.id, kept),
                duplicate: (self.id, self.markers[idx].name().to_string()),
                reassigned: Some(fresh),
            };
            error!(holder = %self.name, "duplicate {} id repaired: {}", K::LABEL, collision);
            self.reassign_at(idx, fresh);
            seen.insert(fresh);
            collisions.push(collision);
        }
        collisions
    }

    /// A reference to `id` whose cache already points at this holder's slot.
    pub fn reference(&self, id: MarkerId) -> Option<Reference<K>> {
        let index = self.position(id)?;
        Some(Reference::cached(id, self.id, index, self.generation))
    }

    fn validate_defs(holder: &str, defs: &[MarkerDef<K>]) -> Result<()> {
        let invalid = |reason: String| RegistryError::InvalidDefinition {
            holder: holder.to_string(),
            reason,
        };
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for def in defs {
            if def.name.is_empty() {
                return Err(invalid(format!("marker {} has an empty name", def.id)));
            }
            if def.id == UNSET_ID {
                return Err(invalid(format!("'{}' uses the reserved id {}", def.name, UNSET_ID)));
            }
            if !ids.insert(def.id) {
                return Err(invalid(format!("duplicate id {} at '{}'", def.id, def.name)));
            }
            if !names.insert(def.name) {
                return Err(invalid(format!("duplicate name '{}'", def.name)));
            }
        }
        Ok(())
    }
}

impl<K: MarkerKind> Clone for Holder<K> {
    /// A clone is a distinct holder: it receives its own runtime id.
    fn clone(&self) -> Self {
        let id = next_holder_id();
        let mut markers = self.markers.clone();
        for marker in &mut markers {
            marker.set_holder(id);
        }
        Self {
            id,
            name: self.name.clone(),
            markers,
            next_id: self.next_id,
            generation: 0,
        }
    }
}

/// On-disk shape of a holder.
#[derive(Deserialize)]
#[serde(bound = "")]
struct HolderRepr<K: MarkerKind> {
    name: String,
    #[serde(default = "Vec::new")]
    markers: Vec<Marker<K>>,
    #[serde(default)]
    next_id: MarkerId,
}

impl<K: MarkerKind> TryFrom<HolderRepr<K>> for Holder<K> {
    type Error = RegistryError;

    /// Rejects empty names and the reserved id. Name clashes are left to
    /// [`crate::Database::validate`], which knows the kind's name scope.
    fn try_from(repr: HolderRepr<K>) -> Result<Self> {
        for marker in &repr.markers {
            let reason = if marker.name().is_empty() {
                format!("marker {} has an empty name", marker.id())
            } else if marker.id() == UNSET_ID {
                format!("'{}' uses the reserved id {}", marker.name(), UNSET_ID)
            } else {
                continue;
            };
            error!(holder = %repr.name, "rejected stored {}: {}", K::LABEL, reason);
            return Err(RegistryError::InvalidDefinition {
                holder: repr.name.clone(),
                reason,
            });
        }

        let mut holder = Self::new(repr.name);
        observe(&mut holder.next_id, repr.next_id.saturating_sub(1));
        holder.markers = repr.markers;
        for marker in &mut holder.markers {
            marker.set_holder(holder.id);
            observe(&mut holder.next_id, marker.id());
        }
        holder.sort_by_name();
        Ok(holder)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{Flag, Rgba, Tag};

    fn assert_sorted<K: MarkerKind>(holder: &Holder<K>) {
        assert!(holder.markers().windows(2).all(|w| w[0].name() <= w[1].name()));
    }

    #[test]
    fn add_is_idempotent_by_name() {
        let mut holder = Holder::<Tag>::new("Palette");
        let a = holder.add_marker("Enemy", Rgba::RED).unwrap();
        let b = holder.add_marker("Enemy", Rgba::BLUE).unwrap();

        assert_eq!(a, b);
        assert_eq!(holder.len(), 1);
        // The first creation wins
        assert_eq!(holder.find_by_id(a).unwrap().color(), Rgba::RED);
    }

    #[test]
    fn ids_count_up_from_one() {
        let mut holder = Holder::<Flag>::new("World");
        assert_eq!(holder.add_marker("Alpha", false), Ok(1));
        assert_eq!(holder.add_marker("Beta", false), Ok(2));
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut holder = Holder::<Flag>::new("World");
        holder.add_marker("A", false).unwrap();
        let b = holder.add_marker("B", false).unwrap();
        assert!(holder.remove_marker(b));
        assert!(!holder.remove_marker(b));

        let c = holder.add_marker("C", false).unwrap();
        assert_ne!(c, b);
    }

    #[test]
    fn markers_stay_sorted() {
        let mut holder = Holder::<Flag>::new("World");
        for name in ["delta", "alpha", "charlie", "bravo"] {
            holder.add_marker(name, false).unwrap();
            assert_sorted(&holder);
        }
        let names: Vec<_> = holder.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["alpha", "bravo", "charlie", "delta"]);
    }

    #[test]
    fn empty_name_rejected() {
        let mut holder = Holder::<Flag>::new("World");
        assert_eq!(holder.add_marker("", false), Err(RegistryError::EmptyName));
    }

    #[test]
    fn rename_rejects_taken_name() {
        let mut holder = Holder::<Flag>::new("World");
        let a = holder.add_marker("A", false).unwrap();
        holder.add_marker("B", false).unwrap();

        assert!(!holder.rename_marker(a, "B"));
        assert!(!holder.rename_marker(a, ""));
        assert!(!holder.rename_marker(99, "Z"));
        assert!(holder.rename_marker(a, "C"));
        assert_eq!(holder.find_by_id(a).unwrap().name(), "C");
        assert_eq!(holder.markers().last().unwrap().id(), a);
    }

    #[test]
    fn structural_changes_bump_generation() {
        let mut holder = Holder::<Flag>::new("World");
        let g0 = holder.generation();
        let a = holder.add_marker("A", false).unwrap();
        let g1 = holder.generation();
        assert!(g1 > g0);

        // Idempotent add is not a structural change
        holder.add_marker("A", false).unwrap();
        assert_eq!(holder.generation(), g1);

        holder.remove_marker(a);
        assert!(holder.generation() > g1);
    }

    #[test]
    fn bulk_load_sorts_once_and_keeps_existing() {
        let mut holder = Holder::<Tag>::new("Palette");
        let existing = holder.add_marker("Neutral", Rgba::WHITE).unwrap();

        let ids = holder
            .bulk_load([("Zombie", Rgba::GREEN), ("Neutral", Rgba::RED), ("Ally", Rgba::BLUE)])
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(ids[1], existing);
        assert_sorted(&holder);
        assert_eq!(holder.markers()[0].name(), "Ally");
    }

    #[test]
    fn from_defs_keeps_ids() {
        let defs = [
            MarkerDef::<Flag>::new(7, "Started", Some(true)),
            MarkerDef::new(3, "DoorOpen", None),
        ];
        let holder = Holder::from_defs("World", &defs).unwrap();

        assert_eq!(holder.find_by_name("Started").unwrap().id(), 7);
        assert!(holder.find_by_id(7).unwrap().value());
        assert!(!holder.find_by_id(3).unwrap().value());
        assert_eq!(holder.next_id(), 8);
        assert_sorted(&holder);
    }

    #[test]
    fn from_defs_rejects_bad_tables() {
        let dup_id = [MarkerDef::<Flag>::new(1, "A", None), MarkerDef::new(1, "B", None)];
        assert!(Holder::from_defs("X", &dup_id).is_err());

        let dup_name = [MarkerDef::<Flag>::new(1, "A", None), MarkerDef::new(2, "A", None)];
        assert!(Holder::from_defs("X", &dup_name).is_err());

        let zero = [MarkerDef::<Flag>::new(0, "A", None)];
        assert!(Holder::from_defs("X", &zero).is_err());
    }

    #[test]
    fn repair_reassigns_later_duplicate() {
        let mut holder = Holder::<Flag>::new("World");
        let a = holder.add_marker("A", false).unwrap();
        let b = holder.add_marker("B", false).unwrap();
        holder.marker_mut(b).unwrap().set_id(a);

        let collisions = holder.repair_duplicate_ids();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].id, a);
        assert_eq!(collisions[0].duplicate.1, "B");

        let ids: HashSet<_> = holder.ids().collect();
        assert_eq!(ids.len(), 2);
        assert!(holder.repair_duplicate_ids().is_empty());
    }

    #[test]
    fn clone_is_a_distinct_holder() {
        let mut holder = Holder::<Flag>::new("World");
        holder.add_marker("A", false).unwrap();
        let copy = holder.clone();

        assert_ne!(copy.id(), holder.id());
        assert!(copy.iter().all(|m| m.holder() == copy.id()));
    }

    #[test]
    fn reference_is_pre_resolved() {
        let mut holder = Holder::<Flag>::new("World");
        let a = holder.add_marker("A", false).unwrap();
        let r = holder.reference(a).unwrap();
        assert_eq!(r.id(), a);
        assert!(holder.reference(99).is_none());
    }

    #[test]
    fn stored_holder_rejects_reserved_id_and_empty_name() {
        let reserved = r#"{"name":"World","markers":[{"id":0,"name":"Started","data":true}]}"#;
        let err = serde_json::from_str::<Holder<Flag>>(reserved).unwrap_err();
        assert!(err.to_string().contains("reserved id"));

        let unnamed = r#"{"name":"Palette","markers":[{"id":4,"name":"","data":{"r":255,"g":0,"b":0,"a":255}}]}"#;
        let err = serde_json::from_str::<Holder<Tag>>(unnamed).unwrap_err();
        assert!(err.to_string().contains("empty name"));
    }
}
