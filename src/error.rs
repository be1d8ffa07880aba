//! Error types for registry authoring operations.
//!
//! Lookups never fail with an error: a missing marker or holder is reported
//! as `None` (or `false`). Errors are reserved for authoring mistakes.

use std::fmt;

use thiserror::Error;

use crate::{HolderId, MarkerId};

/// Two live markers sharing one id inside the same database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdCollision {
    pub id: MarkerId,
    /// Holder and name of the marker that keeps the id.
    pub kept: (HolderId, String),
    /// Holder and name of the offending marker.
    pub duplicate: (HolderId, String),
    /// Fresh id given to the offender, once repaired.
    pub reassigned: Option<MarkerId>,
}

impl fmt::Display for IdCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {} shared by '{}' (holder {}) and '{}' (holder {})",
            self.id, self.kept.1, self.kept.0, self.duplicate.1, self.duplicate.0
        )?;
        if let Some(fresh) = self.reassigned {
            write!(f, ", offender moved to id {fresh}")?;
        }
        Ok(())
    }
}

/// Two live markers sharing a name inside the scope their kind enforces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameCollision {
    pub name: String,
    /// Holder and id of the first marker carrying the name.
    pub kept: (HolderId, MarkerId),
    pub duplicate: (HolderId, MarkerId),
}

impl fmt::Display for NameCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name '{}' used by marker {} (holder {}) and marker {} (holder {})",
            self.name, self.kept.1, self.kept.0, self.duplicate.1, self.duplicate.0
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Marker and holder names must not be empty.
    #[error("empty marker name is not allowed")]
    EmptyName,

    /// The name is already taken in the scope the marker kind enforces.
    #[error("name '{name}' is already used by marker {existing}")]
    DuplicateName { name: String, existing: MarkerId },

    /// Static definitions or stored holder data are inconsistent.
    #[error("invalid definition in holder '{holder}': {reason}")]
    InvalidDefinition { holder: String, reason: String },

    /// No holder with this id is indexed by the database.
    #[error("holder {0} is not registered")]
    HolderNotFound(HolderId),

    /// The 32-bit id space of a holder or database is used up.
    #[error("marker id space exhausted")]
    IdSpaceExhausted,

    /// Integrity violation: markers share ids across (or inside) holders.
    #[error("{} duplicate marker id(s): {}", .0.len(), join(.0))]
    DuplicateIds(Vec<IdCollision>),

    /// Integrity violation: markers share a name where their kind requires it unique.
    #[error("{} duplicate marker name(s): {}", .0.len(), join(.0))]
    DuplicateNames(Vec<NameCollision>),
}

fn join<T: fmt::Display>(collisions: &[T]) -> String {
    collisions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
