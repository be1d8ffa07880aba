//! References — non-owning handles that resolve a marker id on demand.
//!
//! ```text
//!            set_id / set_marker
//!  Unbound ───────────────────────▶ Unresolved
//!                                     │  resolve()
//!                       found ┌───────┴───────┐ not found
//!                             ▼               ▼
//!                         Resolved ◀────── Dangling ──┐ resolve()
//!                                  found        ▲        │ not found
//!                                               └────────┘ (warned once)
//! ```
//!
//! Every `resolve` on a dangling reference retries the id lookup. Ids are
//! never reused, so it only succeeds when the same marker comes back, for
//! example when its holder is re-added or the marker is moved in.
//!
//! The cache stores `(holder, index, generation)`. Any structural change to
//! the holder bumps its generation, which sends the next resolution back to
//! an id lookup instead of trusting a stale index.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::database::Database;
use crate::holder::Holder;
use crate::marker::{Flag, IntoMarkerId, Marker, MarkerKind};
use crate::{HolderId, MarkerId, UNSET_ID};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    holder: HolderId,
    index: usize,
    generation: u64,
}

/// Resolution state of a [`Reference`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceState {
    /// No id stored.
    Unbound,
    /// Id stored, nothing cached yet.
    Unresolved,
    /// Id stored and the last resolution succeeded.
    Resolved,
    /// Id stored but the last resolution found no marker.
    Dangling,
}

/// Handle to a marker by id.
///
/// Serializes as the bare id. Equality and hashing only consider the id.
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Reference<K: MarkerKind> {
    id: MarkerId,
    /// Holder the marker was last seen in; checked before a full scan.
    #[serde(skip)]
    holder_hint: Option<HolderId>,
    #[serde(skip)]
    slot: Option<Slot>,
    #[serde(skip)]
    dangling: bool,
    #[serde(skip)]
    kind: PhantomData<K>,
}

impl<K: MarkerKind> Reference<K> {
    /// A reference to `id`; [`UNSET_ID`] gives an unbound reference.
    pub fn new(id: MarkerId) -> Self {
        Self {
            id,
            holder_hint: None,
            slot: None,
            dangling: false,
            kind: PhantomData,
        }
    }

    /// A reference that resolves to nothing.
    pub fn unset() -> Self {
        Self::new(UNSET_ID)
    }

    /// A reference to `marker`, remembering its holder for fast resolution.
    pub fn to(marker: &Marker<K>) -> Self {
        let mut reference = Self::new(marker.id());
        reference.holder_hint = Some(marker.holder());
        reference
    }

    pub(crate) fn cached(id: MarkerId, holder: HolderId, index: usize, generation: u64) -> Self {
        let mut reference = Self::new(id);
        reference.holder_hint = Some(holder);
        reference.slot = Some(Slot {
            holder,
            index,
            generation,
        });
        reference
    }

    #[inline]
    pub fn id(&self) -> MarkerId {
        self.id
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.id != UNSET_ID
    }

    /// Point at another id. The cache is dropped only when the id changes.
    pub fn set_id(&mut self, id: MarkerId) {
        if id != self.id {
            *self = Self::new(id);
        }
    }

    /// Point at `marker`, which is already in hand.
    pub fn set_marker(&mut self, marker: &Marker<K>) {
        *self = Self::to(marker);
    }

    pub fn clear(&mut self) {
        *self = Self::unset();
    }

    pub fn state(&self) -> ReferenceState {
        if !self.is_set() {
            ReferenceState::Unbound
        } else if self.dangling {
            ReferenceState::Dangling
        } else if self.slot.is_some() {
            ReferenceState::Resolved
        } else {
            ReferenceState::Unresolved
        }
    }

    /// Resolve against `db`, refreshing the cache.
    ///
    /// A failed resolution logs a warning the first time only; the reference
    /// keeps its id so a later call can succeed once the marker is back.
    pub fn resolve<'db>(&mut self, db: &'db Database<K>) -> Option<&'db Marker<K>> {
        if !self.is_set() {
            return None;
        }
        match self.lookup(db) {
            Some((holder, index)) => {
                self.holder_hint = Some(holder.id());
                self.slot = Some(Slot {
                    holder: holder.id(),
                    index,
                    generation: holder.generation(),
                });
                self.dangling = false;
                holder.markers().get(index)
            }
            None => {
                self.slot = None;
                if !self.dangling {
                    self.dangling = true;
                    warn!(id = self.id, "dangling {} reference: no marker with this id", K::LABEL);
                }
                None
            }
        }
    }

    /// Resolve without touching the cache.
    pub fn get<'db>(&self, db: &'db Database<K>) -> Option<&'db Marker<K>> {
        if !self.is_set() {
            return None;
        }
        let (holder, index) = self.lookup(db)?;
        holder.markers().get(index)
    }

    fn lookup<'db>(&self, db: &'db Database<K>) -> Option<(&'db Holder<K>, usize)> {
        if let Some(slot) = self.slot
            && let Some(holder) = db.holder(slot.holder)
            && holder.generation() == slot.generation
        {
            return Some((holder, slot.index));
        }
        if let Some(hint) = self.holder_hint
            && let Some(holder) = db.holder(hint)
            && let Some(index) = holder.position(self.id)
        {
            return Some((holder, index));
        }
        db.locate(self.id)
    }
}

impl<K: MarkerKind> Default for Reference<K> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<K: MarkerKind> Clone for Reference<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            holder_hint: self.holder_hint,
            slot: self.slot,
            dangling: self.dangling,
            kind: PhantomData,
        }
    }
}

impl<K: MarkerKind> fmt::Debug for Reference<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("kind", &K::LABEL)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl<K: MarkerKind> PartialEq for Reference<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K: MarkerKind> Eq for Reference<K> {}

impl<K: MarkerKind> Hash for Reference<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<K: MarkerKind> From<MarkerId> for Reference<K> {
    fn from(id: MarkerId) -> Self {
        Self::new(id)
    }
}

impl<K: MarkerKind> From<&Marker<K>> for Reference<K> {
    fn from(marker: &Marker<K>) -> Self {
        Self::to(marker)
    }
}

impl<K: MarkerKind> IntoMarkerId for &Reference<K> {
    #[inline]
    fn into_marker_id(self) -> MarkerId {
        self.id
    }
}

// =============================================================================
// ValueReference
// =============================================================================

/// A flag reference paired with the value it requires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueReference {
    flag: Reference<Flag>,
    required: bool,
}

impl ValueReference {
    pub fn new(id: MarkerId, required: bool) -> Self {
        Self {
            flag: Reference::new(id),
            required,
        }
    }

    pub fn to(marker: &Marker<Flag>, required: bool) -> Self {
        Self {
            flag: Reference::to(marker),
            required,
        }
    }

    #[inline]
    pub fn id(&self) -> MarkerId {
        self.flag.id()
    }

    #[inline]
    pub fn reference(&self) -> &Reference<Flag> {
        &self.flag
    }

    #[inline]
    pub fn reference_mut(&mut self) -> &mut Reference<Flag> {
        &mut self.flag
    }

    #[inline]
    pub fn required(&self) -> bool {
        self.required
    }

    pub fn set_required(&mut self, required: bool) {
        self.required = required;
    }

    /// `true` iff the flag resolves and currently holds the required value.
    /// Unbound and dangling references are never valid.
    pub fn is_valid(&mut self, db: &Database<Flag>) -> bool {
        self.flag
            .resolve(db)
            .is_some_and(|flag| flag.value() == self.required)
    }

    /// Write the required value (or its inverse) onto the live flag.
    ///
    /// Returns `false` if the flag could not be resolved.
    pub fn apply(&mut self, db: &mut Database<Flag>, invert: bool) -> bool {
        if self.flag.resolve(db).is_none() {
            return false;
        }
        db.set_value(self.flag.id(), self.required != invert);
        true
    }
}

impl IntoMarkerId for &ValueReference {
    #[inline]
    fn into_marker_id(self) -> MarkerId {
        self.flag.id()
    }
}

// =============================================================================
// Tests
// =============================================================================
