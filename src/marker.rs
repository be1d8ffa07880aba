//! Markers — the atomic named entities owned by a [`crate::Holder`].

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::notify::{ChangeBus, ObserverSlot};
use crate::{HolderId, MarkerId};

/// Where marker names must be unique.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameScope {
    /// Unique among the markers of one holder.
    Holder,
    /// Unique among every marker of the database.
    Database,
}

/// Compile-time description of a marker kind.
pub trait MarkerKind:
    Copy + Clone + fmt::Debug + Default + PartialEq + Eq + Send + Sync + 'static
{
    /// Kind-specific payload stored on every marker.
    type Data: Clone + fmt::Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Lower-case label used in log output.
    const LABEL: &'static str;

    /// Scope in which marker names are kept unique.
    const NAME_SCOPE: NameScope;

    /// Change observers carried by a database of this kind.
    type Observers: ObserverSlot;
}

/// Named boolean describing world/game state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flag;

impl MarkerKind for Flag {
    type Data = bool;
    const LABEL: &'static str = "flag";
    const NAME_SCOPE: NameScope = NameScope::Holder;
    type Observers = ChangeBus;
}

/// Named classification label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tag;

impl MarkerKind for Tag {
    type Data = Rgba;
    const LABEL: &'static str = "tag";
    const NAME_SCOPE: NameScope = NameScope::Database;
    type Observers = ();
}

/// 8-bit RGBA display colour of a tag.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, IntoBytes, FromBytes, Immutable, KnownLayout,
)]
#[repr(C)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const RED: Self = Self::new(255, 0, 0, 255);
    pub const GREEN: Self = Self::new(0, 255, 0, 255);
    pub const BLUE: Self = Self::new(0, 0, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// `0xRRGGBBAA`
    pub const fn from_hex(rgba: u32) -> Self {
        let [r, g, b, a] = rgba.to_be_bytes();
        Self { r, g, b, a }
    }

    pub const fn to_hex(self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

/// A named marker.
///
/// Identity and name are only changed by the owning holder (or the database
/// indexing it) so that ordering and uniqueness stay enforced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Marker<K: MarkerKind> {
    id: MarkerId,
    name: String,
    /// Back-reference to the owning holder; rewired on load.
    #[serde(skip)]
    holder: HolderId,
    data: K::Data,
    /// Free-form metadata: key → bytes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, Vec<u8>>,
}

impl<K: MarkerKind> Marker<K> {
    pub(crate) fn new(id: MarkerId, name: impl Into<String>, holder: HolderId, data: K::Data) -> Self {
        Self {
            id,
            name: name.into(),
            holder,
            data,
            meta: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> MarkerId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime id of the holder owning this marker.
    #[inline]
    pub fn holder(&self) -> HolderId {
        self.holder
    }

    #[inline]
    pub fn data(&self) -> &K::Data {
        &self.data
    }

    pub(crate) fn set_id(&mut self, id: MarkerId) {
        self.id = id;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_holder(&mut self, holder: HolderId) {
        self.holder = holder;
    }

    /// Store typed metadata.
    ///
    /// The type must implement `zerocopy::IntoBytes + Immutable`.
    /// Returns the previous raw bytes if any.
    pub fn set_meta<T: IntoBytes + Immutable>(&mut self, key: impl Into<String>, value: &T) -> Option<Vec<u8>> {
        self.meta.insert(key.into(), value.as_bytes().to_vec())
    }

    /// Read typed metadata.
    ///
    /// Returns `None` if the key is missing or the stored bytes do not match
    /// the size of `T`.
    pub fn get_meta<T: FromBytes>(&self, key: &str) -> Option<T> {
        T::read_from_bytes(self.meta.get(key)?).ok()
    }

    /// Borrow typed metadata in place.
    ///
    /// Only succeeds for types whose alignment the stored buffer satisfies;
    /// prefer [`Marker::get_meta`] for anything wider than a byte.
    pub fn meta_ref<T: FromBytes + KnownLayout + Immutable>(&self, key: &str) -> Option<&T> {
        T::ref_from_bytes(self.meta.get(key)?).ok()
    }

    pub fn set_meta_raw(&mut self, key: impl Into<String>, value: Vec<u8>) -> Option<Vec<u8>> {
        self.meta.insert(key.into(), value)
    }

    #[inline]
    pub fn meta_raw(&self, key: &str) -> Option<&[u8]> {
        self.meta.get(key).map(Vec::as_slice)
    }

    #[inline]
    pub fn has_meta(&self, key: &str) -> bool {
        self.meta.contains_key(key)
    }

    pub fn remove_meta(&mut self, key: &str) -> Option<Vec<u8>> {
        self.meta.remove(key)
    }

    /// Metadata keys in sorted order.
    pub fn meta_keys(&self) -> impl Iterator<Item = &str> {
        self.meta.keys().map(String::as_str)
    }
}

impl Marker<Flag> {
    #[inline]
    pub fn value(&self) -> bool {
        self.data
    }

    /// Returns `true` on a real transition.
    pub(crate) fn set_value(&mut self, value: bool) -> bool {
        if self.data == value {
            return false;
        }
        self.data = value;
        true
    }
}

impl Marker<Tag> {
    #[inline]
    pub fn color(&self) -> Rgba {
        self.data
    }

    pub fn set_color(&mut self, color: Rgba) {
        self.data = color;
    }
}

impl<K: MarkerKind> fmt::Display for Marker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' (#{})", K::LABEL, self.name, self.id)
    }
}

/// Anything that names a marker by id.
pub trait IntoMarkerId {
    fn into_marker_id(self) -> MarkerId;
}

impl IntoMarkerId for MarkerId {
    #[inline]
    fn into_marker_id(self) -> MarkerId {
        self
    }
}

impl<K: MarkerKind> IntoMarkerId for &Marker<K> {
    #[inline]
    fn into_marker_id(self) -> MarkerId {
        self.id
    }
}
