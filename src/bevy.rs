//! Bevy integration for flag and tag databases.
//!
//! Provides:
//! - `MarkerPlugin` — builder-pattern plugin that loads both databases as Resources
//! - `RegistryConfig` — the plugin's settings, readable at runtime
//! - `Resource` impl for [`Database`]; `Group` and `ValueGroup` are Components
//!
//! # Example
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_marker::bevy::*;
//! use bevy_marker::{holder, Flag, FlagDatabase, ValueGroup};
//!
//! holder! {
//!     pub mod World: Flag {
//!         DoorOpen = 1;
//!         #[data = true]
//!         Started = 2;
//!     }
//! }
//!
//! fn flag_holders() -> Vec<FlagHolder> {
//!     World::holder().into_iter().collect()
//! }
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(MarkerPlugin::new().with_flags(flag_holders))
//!         .add_systems(Update, open_doors)
//!         .run();
//! }
//!
//! fn open_doors(mut flags: ResMut<FlagDatabase>, mut query: Query<&mut ValueGroup>) {
//!     for mut requirements in &mut query {
//!         if requirements.all_valid(&flags) {
//!             flags.set_value(World::DoorOpen, true);
//!         }
//!     }
//! }
//! ```

use bevy::prelude::*;
use tracing::{error, info};

use crate::database::{Database, DatabaseOptions, HolderSource};
use crate::error::RegistryError;
use crate::holder::Holder;
use crate::marker::{Flag, MarkerKind, Tag};
use crate::notify::ObserverPanicPolicy;

// =============================================================================
// Plugin
// =============================================================================

/// Where a database gets its holders from.
pub type HolderLoader<K> = fn() -> Vec<Holder<K>>;

/// Bevy plugin for the flag and tag databases.
///
/// Use the builder pattern to configure:
///
/// ```ignore
/// App::new()
///     .add_plugins(
///         MarkerPlugin::new()
///             .with_flags(flag_holders)
///             .with_tags(tag_holders)
///             .reset_flags_on_startup(true)
///     )
/// ```
#[derive(Default)]
pub struct MarkerPlugin {
    flags: Option<HolderLoader<Flag>>,
    tags: Option<HolderLoader<Tag>>,
    observer_panic_policy: ObserverPanicPolicy,
    reset_flags_on_startup: bool,
}

impl MarkerPlugin {
    /// Create a plugin with empty databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load flag holders from `source` when the plugin is built.
    pub fn with_flags(mut self, source: HolderLoader<Flag>) -> Self {
        self.flags = Some(source);
        self
    }

    /// Load tag holders from `source` when the plugin is built.
    pub fn with_tags(mut self, source: HolderLoader<Tag>) -> Self {
        self.tags = Some(source);
        self
    }

    /// How panicking flag observers are handled.
    ///
    /// Default: [`ObserverPanicPolicy::Isolate`]
    pub fn observer_panic_policy(mut self, policy: ObserverPanicPolicy) -> Self {
        self.observer_panic_policy = policy;
        self
    }

    /// Set every flag to `false` in the `Startup` schedule.
    ///
    /// Default: `false`
    pub fn reset_flags_on_startup(mut self, reset: bool) -> Self {
        self.reset_flags_on_startup = reset;
        self
    }
}

impl Plugin for MarkerPlugin {
    fn build(&self, app: &mut App) {
        let options = DatabaseOptions::new().observer_panic_policy(self.observer_panic_policy);

        let mut flags = Database::<Flag>::with_options(options);
        if let Some(source) = self.flags {
            load(&mut flags, &source);
        }
        let mut tags = Database::<Tag>::with_options(options);
        if let Some(source) = self.tags {
            load(&mut tags, &source);
        }

        app.insert_resource(flags);
        app.insert_resource(tags);
        app.insert_resource(RegistryConfig {
            observer_panic_policy: self.observer_panic_policy,
            reset_flags_on_startup: self.reset_flags_on_startup,
        });

        if self.reset_flags_on_startup {
            app.add_systems(Startup, reset_flags);
        }
    }
}

/// Load a database, repairing id collisions between holders authored apart.
fn load<K: MarkerKind>(db: &mut Database<K>, source: &impl HolderSource<K>) {
    match db.ensure_loaded(source) {
        Ok(()) => info!(holders = db.holders().len(), markers = db.len(), "{} database loaded", K::LABEL),
        Err(RegistryError::DuplicateIds(_)) => {
            let repaired = db.repair_duplicate_ids();
            match db.validate() {
                Ok(()) => info!(repaired = repaired.len(), "{} database loaded after repair", K::LABEL),
                Err(err) => error!("{} database loaded with unrepaired errors: {}", K::LABEL, err),
            }
        }
        Err(err) => error!("{} database failed to load: {}", K::LABEL, err),
    }
}

fn reset_flags(mut flags: ResMut<Database<Flag>>) {
    flags.reset_all();
}

/// Runtime view of the plugin configuration.
#[derive(Resource, Clone, Copy, Debug)]
pub struct RegistryConfig {
    pub observer_panic_policy: ObserverPanicPolicy,
    pub reset_flags_on_startup: bool,
}

// =============================================================================
// Resource impl for Database
// =============================================================================

impl<K: MarkerKind> Resource for Database<K> {}

// =============================================================================
// Tests
// =============================================================================
