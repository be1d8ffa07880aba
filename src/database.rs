//! Database — project-wide index over every holder of one marker kind.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, warn};

use crate::error::{IdCollision, NameCollision, RegistryError, Result};
use crate::holder::Holder;
use crate::id::{allocate, observe};
use crate::marker::{Flag, IntoMarkerId, Marker, MarkerKind, NameScope};
use crate::notify::{FlagChange, FlagObserver, ObserverId, ObserverPanicPolicy, ObserverSlot};
use crate::reference::Reference;
use crate::{HolderId, MarkerId, UNSET_ID};

/// Database configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// How flag observers that panic are handled. Tag databases carry no
    /// observers and ignore it.
    pub observer_panic_policy: ObserverPanicPolicy,
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer_panic_policy(mut self, policy: ObserverPanicPolicy) -> Self {
        self.observer_panic_policy = policy;
        self
    }
}

/// Supplies the holders a database indexes (e.g. every holder asset on disk).
pub trait HolderSource<K: MarkerKind> {
    fn load_holders(&self) -> Vec<Holder<K>>;
}

impl<K, F> HolderSource<K> for F
where
    K: MarkerKind,
    F: Fn() -> Vec<Holder<K>>,
{
    fn load_holders(&self) -> Vec<Holder<K>> {
        self()
    }
}

/// Index over holders.
///
/// Provides:
/// - Id → marker and (name, holder name) → marker lookup
/// - Database-wide id allocation (ids are never reused)
/// - Cross-holder integrity checks and repair
/// - For flags: value writes with synchronous observer fan-out
#[derive(Debug)]
pub struct Database<K: MarkerKind> {
    holders: Vec<Holder<K>>,
    /// Next id handed out by [`Database::add_marker`].
    next_id: MarkerId,
    loaded: bool,
    /// Change observers; `()` for kinds without value transitions.
    bus: K::Observers,
}

impl<K: MarkerKind> Default for Database<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MarkerKind> Database<K> {
    pub fn new() -> Self {
        Self::with_options(DatabaseOptions::default())
    }

    pub fn with_options(options: DatabaseOptions) -> Self {
        Self {
            holders: Vec::new(),
            next_id: UNSET_ID + 1,
            loaded: false,
            bus: <K::Observers as ObserverSlot>::with_policy(options.observer_panic_policy),
        }
    }

    /// Replace the indexed holders wholesale.
    ///
    /// Marker ids are never touched, so rebuilding from the same holders is
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateIds`] if two markers share an id, or
    /// [`RegistryError::DuplicateNames`] if two markers share a name within the
    /// kind's name scope. The holders are installed regardless (lookups
    /// resolve to the first holder in order); call
    /// [`Database::repair_duplicate_ids`] to fix ids. Names are left to the
    /// author.
    pub fn rebuild(&mut self, holders: impl IntoIterator<Item = Holder<K>>) -> Result<()> {
        self.holders = holders.into_iter().collect();
        self.loaded = true;
        self.sync_next_id();
        debug!(
            holders = self.holders.len(),
            markers = self.len(),
            "{} database rebuilt",
            K::LABEL
        );
        self.warn_duplicate_holder_names();
        self.validate()
    }

    /// Populate from `source` unless already loaded.
    pub fn ensure_loaded(&mut self, source: &impl HolderSource<K>) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.rebuild(source.load_holders())
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Make the next [`Database::ensure_loaded`] re-scan its source.
    pub fn invalidate(&mut self) {
        self.loaded = false;
    }

    /// Index one more holder.
    ///
    /// # Errors
    ///
    /// Same integrity check as [`Database::rebuild`]; the holder stays indexed.
    pub fn add_holder(&mut self, holder: Holder<K>) -> Result<HolderId> {
        let id = holder.id();
        debug!(holder = holder.name(), markers = holder.len(), "{} holder added", K::LABEL);
        self.holders.push(holder);
        self.sync_next_id();
        self.warn_duplicate_holder_names();
        self.validate().map(|()| id)
    }

    /// Stop indexing a holder and hand it back. References into it dangle.
    pub fn remove_holder(&mut self, id: HolderId) -> Option<Holder<K>> {
        let idx = self.holder_index(id)?;
        let holder = self.holders.remove(idx);
        debug!(holder = holder.name(), "{} holder removed", K::LABEL);
        Some(holder)
    }

    /// Hand every holder back, leaving the database empty and unloaded.
    pub fn take_holders(&mut self) -> Vec<Holder<K>> {
        self.loaded = false;
        std::mem::take(&mut self.holders)
    }

    #[inline]
    pub fn holders(&self) -> &[Holder<K>] {
        &self.holders
    }

    pub fn holder(&self, id: HolderId) -> Option<&Holder<K>> {
        self.holders.iter().find(|h| h.id() == id)
    }

    pub fn holder_by_name(&self, name: &str) -> Option<&Holder<K>> {
        self.holders.iter().find(|h| h.name() == name)
    }

    /// Rename a holder. Returns `false` if it is missing, the name is empty,
    /// or another holder already has the name.
    pub fn rename_holder(&mut self, id: HolderId, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.is_empty() {
            return false;
        }
        if let Some(other) = self.holder_by_name(&name) {
            return other.id() == id;
        }
        let Some(idx) = self.holder_index(id) else {
            return false;
        };
        self.holders[idx].set_name(name);
        true
    }

    /// Total number of markers across all holders.
    pub fn len(&self) -> usize {
        self.holders.iter().map(Holder::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.iter().all(Holder::is_empty)
    }

    /// Every marker, holder by holder.
    pub fn iter(&self) -> impl Iterator<Item = &Marker<K>> {
        self.holders.iter().flat_map(Holder::iter)
    }

    /// Holder and index of the marker with this id (first holder wins).
    pub fn locate(&self, id: MarkerId) -> Option<(&Holder<K>, usize)> {
        self.holders
            .iter()
            .find_map(|h| h.position(id).map(|idx| (h, idx)))
    }

    pub fn find(&self, id: impl IntoMarkerId) -> Option<(&Marker<K>, &Holder<K>)> {
        let (holder, idx) = self.locate(id.into_marker_id())?;
        Some((&holder.markers()[idx], holder))
    }

    #[inline]
    pub fn get(&self, id: impl IntoMarkerId) -> Option<&Marker<K>> {
        self.find(id).map(|(marker, _)| marker)
    }

    #[inline]
    pub fn contains(&self, id: impl IntoMarkerId) -> bool {
        self.locate(id.into_marker_id()).is_some()
    }

    /// Look a marker up by its name inside the holder named `holder_name`.
    pub fn find_by_name(&self, name: &str, holder_name: &str) -> Option<&Marker<K>> {
        self.holder_by_name(holder_name)?.find_by_name(name)
    }

    /// First marker with this name in any holder.
    pub fn find_named(&self, name: &str) -> Option<&Marker<K>> {
        self.holders.iter().find_map(|h| h.find_by_name(name))
    }

    /// Mutable access for metadata and non-structural payload edits.
    pub fn marker_mut(&mut self, id: impl IntoMarkerId) -> Option<&mut Marker<K>> {
        let id = id.into_marker_id();
        self.holders.iter_mut().find_map(|h| h.marker_mut(id))
    }

    /// A reference to `id` whose cache already points at the marker.
    pub fn reference(&self, id: MarkerId) -> Option<Reference<K>> {
        let (holder, _) = self.locate(id)?;
        holder.reference(id)
    }

    /// Create a marker in `holder` with a database-wide unique id.
    ///
    /// Returns the existing id if the holder already has a marker with this
    /// name.
    ///
    /// # Errors
    ///
    /// - Returns error if `name` is empty or `holder` is not indexed
    /// - For kinds with database-wide names (tags), returns error if another
    ///   holder already uses the name
    pub fn add_marker(&mut self, holder: HolderId, name: impl Into<String>, data: K::Data) -> Result<MarkerId> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let idx = self
            .holder_index(holder)
            .ok_or(RegistryError::HolderNotFound(holder))?;
        if let Some(existing) = self.holders[idx].find_by_name(&name) {
            return Ok(existing.id());
        }
        if K::NAME_SCOPE == NameScope::Database
            && let Some(other) = self.find_named(&name)
        {
            return Err(RegistryError::DuplicateName {
                name,
                existing: other.id(),
            });
        }
        self.sync_next_id();
        let id = allocate(&mut self.next_id)?;
        self.holders[idx].insert(id, name, data);
        Ok(id)
    }

    /// Remove a marker from whichever holder owns it.
    pub fn remove_marker(&mut self, id: impl IntoMarkerId) -> bool {
        let id = id.into_marker_id();
        self.holders.iter_mut().any(|h| h.remove_marker(id))
    }

    /// Rename a marker, enforcing the kind's name scope.
    pub fn rename_marker(&mut self, id: impl IntoMarkerId, new_name: impl Into<String>) -> bool {
        let id = id.into_marker_id();
        let new_name = new_name.into();
        if K::NAME_SCOPE == NameScope::Database
            && self.iter().any(|m| m.name() == new_name && m.id() != id)
        {
            return false;
        }
        match self.locate_index(id) {
            Some((h, _)) => self.holders[h].rename_marker(id, new_name),
            None => false,
        }
    }

    /// Move a marker to another holder, keeping its id so references stay valid.
    ///
    /// Returns `false` if the marker or target holder is missing, or the
    /// target already has a marker with the same name.
    pub fn move_marker(&mut self, id: impl IntoMarkerId, to: HolderId) -> bool {
        let id = id.into_marker_id();
        let (Some((from, idx)), Some(target)) = (self.locate_index(id), self.holder_index(to)) else {
            return false;
        };
        if from == target {
            return true;
        }
        let name = self.holders[from].markers()[idx].name();
        if self.holders[target].find_by_name(name).is_some() {
            return false;
        }
        let Some(marker) = self.holders[from].take_marker(id) else {
            return false;
        };
        debug!(
            id,
            from = self.holders[from].name(),
            to = self.holders[target].name(),
            "{} moved",
            K::LABEL
        );
        self.holders[target].adopt(marker);
        true
    }

    /// Every id shared by more than one marker. The first occurrence in
    /// holder order is the one that is kept.
    pub fn collisions(&self) -> Vec<IdCollision> {
        let mut seen: HashMap<MarkerId, (HolderId, &str)> = HashMap::new();
        let mut collisions = Vec::new();
        for holder in &self.holders {
            for marker in holder.iter() {
                match seen.get(&marker.id()) {
                    Some(&(kept_holder, kept_name)) => collisions.push(IdCollision {
                        id: marker.id(),
                        kept: (kept_holder, kept_name.to_string()),
                        duplicate: (holder.id(), marker.name().to_string()),
                        reassigned: None,
                    }),
                    None => {
                        seen.insert(marker.id(), (holder.id(), marker.name()));
                    }
                }
            }
        }
        collisions
    }

    /// Every name shared inside the kind's name scope: one holder for flags,
    /// the whole database for tags.
    pub fn name_collisions(&self) -> Vec<NameCollision> {
        let mut seen: HashMap<(Option<HolderId>, &str), (HolderId, MarkerId)> = HashMap::new();
        let mut collisions = Vec::new();
        for holder in &self.holders {
            let scope = match K::NAME_SCOPE {
                NameScope::Holder => Some(holder.id()),
                NameScope::Database => None,
            };
            for marker in holder.iter() {
                match seen.get(&(scope, marker.name())) {
                    Some(&kept) => collisions.push(NameCollision {
                        name: marker.name().to_string(),
                        kept,
                        duplicate: (holder.id(), marker.id()),
                    }),
                    None => {
                        seen.insert((scope, marker.name()), (holder.id(), marker.id()));
                    }
                }
            }
        }
        collisions
    }

    /// Check id uniqueness, then name uniqueness, logging every violation.
    pub fn validate(&self) -> Result<()> {
        let collisions = self.collisions();
        if !collisions.is_empty() {
            for collision in &collisions {
                error!("duplicate {} id: {}", K::LABEL, collision);
            }
            return Err(RegistryError::DuplicateIds(collisions));
        }

        let names = self.name_collisions();
        if names.is_empty() {
            return Ok(());
        }
        for collision in &names {
            error!("duplicate {} name: {}", K::LABEL, collision);
        }
        Err(RegistryError::DuplicateNames(names))
    }

    /// Give every offending marker a fresh database-wide id.
    pub fn repair_duplicate_ids(&mut self) -> Vec<IdCollision> {
        self.sync_next_id();
        let mut seen: HashMap<MarkerId, (HolderId, String)> = HashMap::new();
        let mut repaired = Vec::new();
        for h in 0..self.holders.len() {
            let holder_id = self.holders[h].id();
            for idx in 0..self.holders[h].len() {
                let marker = &self.holders[h].markers()[idx];
                let (id, name) = (marker.id(), marker.name().to_string());
                let Some(kept) = seen.get(&id).cloned() else {
                    seen.insert(id, (holder_id, name));
                    continue;
                };
                let Ok(fresh) = allocate(&mut self.next_id) else {
                    error!("cannot repair duplicate {} id {}: id space exhausted", K::LABEL, id);
                    return repaired;
                };
                self.holders[h].reassign_at(idx, fresh);
                let collision = IdCollision {
                    id,
                    kept,
                    duplicate: (holder_id, name.clone()),
                    reassigned: Some(fresh),
                };
                error!("duplicate {} id repaired: {}", K::LABEL, collision);
                seen.insert(fresh, (holder_id, name));
                repaired.push(collision);
            }
        }
        repaired
    }

    fn holder_index(&self, id: HolderId) -> Option<usize> {
        self.holders.iter().position(|h| h.id() == id)
    }

    fn locate_index(&self, id: MarkerId) -> Option<(usize, usize)> {
        self.holders
            .iter()
            .enumerate()
            .find_map(|(h, holder)| holder.position(id).map(|idx| (h, idx)))
    }

    fn sync_next_id(&mut self) {
        for holder in &self.holders {
            observe(&mut self.next_id, holder.next_id().saturating_sub(1));
            for id in holder.ids() {
                observe(&mut self.next_id, id);
            }
        }
    }

    fn warn_duplicate_holder_names(&self) {
        let mut names = HashSet::new();
        for holder in &self.holders {
            if !names.insert(holder.name()) {
                warn!(holder = holder.name(), "duplicate {} holder name; name lookups use the first", K::LABEL);
            }
        }
    }
}

// =============================================================================
// Flag values and observers
// =============================================================================

impl Database<Flag> {
    /// Current value of a flag; missing flags read as `false`.
    pub fn value(&self, id: impl IntoMarkerId) -> bool {
        self.get(id).is_some_and(Marker::value)
    }

    /// Set a flag's value, notifying observers on a real transition.
    ///
    /// Returns `true` if the value changed.
    pub fn set_value(&mut self, id: impl IntoMarkerId, value: bool) -> bool {
        let id = id.into_marker_id();
        match self.locate_index(id) {
            Some((h, idx)) => self.set_value_at(h, idx, value),
            None => {
                debug!(id, "set_value on unknown flag ignored");
                false
            }
        }
    }

    /// Set every flag to `false`. Returns the number of flags that changed.
    pub fn reset_all(&mut self) -> usize {
        let mut changed = 0;
        for h in 0..self.holders.len() {
            for idx in 0..self.holders[h].len() {
                if self.set_value_at(h, idx, false) {
                    changed += 1;
                }
            }
        }
        debug!(changed, "flags reset");
        changed
    }

    fn set_value_at(&mut self, h: usize, idx: usize, value: bool) -> bool {
        if !self.holders[h].marker_at_mut(idx).set_value(value) {
            return false;
        }
        let holder = &self.holders[h];
        let marker = &holder.markers()[idx];
        self.bus.notify(&FlagChange {
            id: marker.id(),
            name: marker.name(),
            holder: holder.id(),
            holder_name: holder.name(),
            value,
        });
        true
    }

    /// Add an observer; registering twice delivers twice.
    pub fn register(&mut self, observer: impl FlagObserver + 'static) -> ObserverId {
        self.bus.register(observer)
    }

    /// Closure form of [`Database::register`].
    pub fn register_fn<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&FlagChange<'_>) + Send + Sync + 'static,
    {
        self.bus.register(observer)
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        self.bus.unregister(id)
    }

    pub fn observer_count(&self) -> usize {
        self.bus.len()
    }

    pub fn set_observer_panic_policy(&mut self, policy: ObserverPanicPolicy) {
        self.bus.set_policy(policy);
    }
}

// =============================================================================
// Tests
// =============================================================================
