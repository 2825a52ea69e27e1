//! # guid_core
//!
//! Stable, persistent references to runtime entities by 128-bit identifier.
//!
//! This crate provides:
//!
//! - [`Guid`] - the identifier, with its 16-byte persisted layout.
//! - [`GuidRegistry`] - the identifier-to-entity table with late-binding
//!   resolution, add/remove notifications and collision detection.
//! - [`GuidReference`] - a serializable handle that caches the resolved
//!   entity and follows it as it is registered and unregistered.
//! - [`ReferenceRecord`] - the serde form a persistence layer stores.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`): the registry and its
//! references belong to one update loop.
//!
//! ## Usage
//!
//! ```rust
//! use std::rc::Rc;
//! use guid_core::{Guid, Guided, GuidReference, GuidRegistry};
//!
//! struct Lamp {
//!     guid: Guid,
//! }
//!
//! impl Guided for Lamp {
//!     fn guid(&self) -> Guid {
//!         self.guid
//!     }
//! }
//!
//! let registry = GuidRegistry::new();
//! let lamp = Rc::new(Lamp { guid: Guid::new_random() });
//!
//! // References may exist before their target does.
//! let reference = GuidReference::new(&registry, lamp.guid);
//! assert!(reference.entity().unwrap().is_none());
//!
//! registry.register_entity(&lamp).unwrap();
//! assert!(reference.entity().unwrap().is_some());
//!
//! registry.unregister(lamp.guid);
//! assert!(reference.entity().unwrap().is_none());
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod guid;
pub mod record;
pub mod reference;
pub mod registry;

pub use callback::{OnAdd, OnRemove};
pub use config::{ExecutionMode, RegistryConfig};
pub use error::{Collision, GuidError, ReferenceError, Severity};
pub use guid::{GUID_LEN, Guid, Guided};
pub use record::{ReferenceLabel, ReferenceRecord};
pub use reference::{GuidReference, SubscriberId};
pub use registry::GuidRegistry;
