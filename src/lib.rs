//! # Named Marker Registry (bevy-marker)
//!
//! Globally unique, named markers grouped into relocatable holders and
//! referenced indirectly by a small stable id.
//!
//! Two marker kinds share one generic core:
//!
//! - [`Flag`] — a named boolean describing world/game state. Every value
//!   transition is delivered synchronously to the observers registered on the
//!   owning [`Database`].
//! - [`Tag`] — a named classification label carrying a display colour.
//!   Tag names are unique across the whole database.
//!
//! ## Ownership
//!
//! ```text
//! Database ──owns──▶ Holder ──owns──▶ Marker
//!                      ▲                 │
//!                      └── HolderId ─────┘   (back-reference by id, never owning)
//!
//! Reference / Group ── MarkerId ──▶ resolved through the Database on demand
//! ```
//!
//! A [`Reference`] stores only the id of its marker and caches where it was
//! last found. Holders bump a generation counter on every structural change,
//! so a cached slot can never outlive the layout it was computed against.
//!
//! ```ignore
//! use bevy_marker::*;
//!
//! let mut world = FlagHolder::new("World");
//! let door = world.add_marker("DoorOpen", false)?;
//!
//! let mut db = FlagDatabase::new();
//! db.rebuild([world])?;
//! db.register(|change: &FlagChange<'_>| println!("{} -> {}", change.name, change.value));
//!
//! let mut gate = FlagRef::new(door);
//! db.set_value(door, true);
//! assert!(gate.resolve(&db).is_some_and(|flag| flag.value()));
//! ```

pub mod bevy;
pub mod database;
pub mod error;
pub mod group;
pub mod holder;
pub mod id;
pub mod marker;
pub mod notify;
pub mod reference;

pub use bevy_marker_macro::holder;
pub use database::{Database, DatabaseOptions, HolderSource};
pub use error::{IdCollision, NameCollision, RegistryError, Result};
pub use group::{Group, ValueGroup};
pub use holder::{Holder, MarkerDef};
pub use marker::{Flag, IntoMarkerId, Marker, MarkerKind, NameScope, Rgba, Tag};
pub use notify::{ChangeBus, FlagChange, FlagObserver, ObserverId, ObserverPanicPolicy, ObserverSlot};
pub use reference::{Reference, ReferenceState, ValueReference};

/// Marker identifier — stable for the lifetime of the marker.
///
/// `0` is reserved as [`UNSET_ID`]; allocation starts at `1` and never
/// reuses an id inside a database.
pub type MarkerId = u32;

/// The "no marker" sentinel carried by unbound references.
pub const UNSET_ID: MarkerId = 0;

/// Runtime identity of a [`Holder`]. Never persisted.
pub type HolderId = u32;

pub type FlagHolder = Holder<Flag>;
pub type TagHolder = Holder<Tag>;
pub type FlagDatabase = Database<Flag>;
pub type TagDatabase = Database<Tag>;
pub type FlagRef = Reference<Flag>;
pub type TagRef = Reference<Tag>;
pub type FlagGroup = Group<Flag>;
pub type TagGroup = Group<Tag>;
