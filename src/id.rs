//! Id allocation.
//!
//! Marker ids come from a monotonic high-water mark. Each holder persists its
//! own mark (`next_id`) and the database keeps the maximum across every holder
//! it indexes, so an id is never handed out twice inside one database, not
//! even after its marker has been removed.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{RegistryError, Result};
use crate::{HolderId, MarkerId, UNSET_ID};

static NEXT_HOLDER_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate a process-unique runtime holder id.
pub(crate) fn next_holder_id() -> HolderId {
    NEXT_HOLDER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Take the next marker id from `next` and advance the mark.
pub(crate) fn allocate(next: &mut MarkerId) -> Result<MarkerId> {
    let id = (*next).max(UNSET_ID + 1);
    *next = id.checked_add(1).ok_or(RegistryError::IdSpaceExhausted)?;
    Ok(id)
}

/// Raise `next` so that it lies strictly above `seen`.
#[inline]
pub(crate) fn observe(next: &mut MarkerId, seen: MarkerId) {
    if seen >= *next {
        *next = seen.saturating_add(1);
    }
}
