//! The identifier-to-entity table and its resolution protocol.
//!
//! A [`GuidRegistry`] maps each [`Guid`] to at most one live entity plus the
//! callbacks of everyone waiting on that identifier. Entities are owned
//! elsewhere (`Rc<E>`); the registry keeps only weak references and relies on
//! the owning system to call [`register`](GuidRegistry::register) and
//! [`unregister`](GuidRegistry::unregister) as entities come and go.
//!
//! ## Entry lifecycle
//!
//! ```text
//! (absent) --resolve with callbacks--> placeholder --register--> bound
//! (absent) --register--------------------------------------> bound
//! bound --unregister--> placeholder (callbacks remain) | absent (none remain)
//! placeholder --unsubscribe last callback--> absent
//! ```
//!
//! An entry exists only while it has a binding or at least one callback.
//!
//! ## Re-entrancy
//!
//! Callback lists are snapshotted and the table is released before any
//! callback runs, so callbacks may call back into the registry. Callbacks
//! added during a fan-out are not invoked by that same fan-out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, warn};

use crate::callback::{OnAdd, OnRemove};
use crate::config::{ExecutionMode, RegistryConfig};
use crate::error::{Collision, Severity};
use crate::guid::{Guid, Guided};

/// Everything the registry knows about one identifier.
struct GuidEntry<E> {
    /// The bound entity, if any. May be dead if its owner dropped it without
    /// unregistering.
    entity: Option<Weak<E>>,
    on_add: Vec<OnAdd<E>>,
    on_remove: Vec<OnRemove>,
}

impl<E> GuidEntry<E> {
    fn placeholder() -> Self {
        Self {
            entity: None,
            on_add: Vec::new(),
            on_remove: Vec::new(),
        }
    }

    fn bound(entity: &Rc<E>) -> Self {
        Self {
            entity: Some(Rc::downgrade(entity)),
            ..Self::placeholder()
        }
    }

    fn has_listeners(&self) -> bool {
        !self.on_add.is_empty() || !self.on_remove.is_empty()
    }

    fn is_prunable(&self) -> bool {
        self.entity.is_none() && !self.has_listeners()
    }
}

struct RegistryInner<E> {
    config: RegistryConfig,
    entries: HashMap<Guid, GuidEntry<E>>,
}

/// Shared table of identifier bindings and pending callbacks.
///
/// Cloning is cheap and yields another handle to the same table; construct
/// one per application (or per test) and pass it to whoever resolves.
pub struct GuidRegistry<E> {
    inner: Rc<RefCell<RegistryInner<E>>>,
}

impl<E: 'static> GuidRegistry<E> {
    /// Create an empty registry in [`ExecutionMode::Running`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with the given configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                config,
                entries: HashMap::new(),
            })),
        }
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        self.inner.borrow().config
    }

    /// Returns the current execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.inner.borrow().config.mode
    }

    /// Switch execution mode, e.g. when the host enters or leaves play.
    pub fn set_mode(&self, mode: ExecutionMode) {
        self.inner.borrow_mut().config.mode = mode;
    }

    /// Bind `entity` to `guid`.
    ///
    /// Pending add-callbacks fire when this fills a placeholder. Registering
    /// the entity already bound to `guid` succeeds without firing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Collision`] when a different live entity holds `guid`. The
    /// existing binding is kept; the caller should assign its entity a new
    /// identifier and retry.
    pub fn register(&self, guid: Guid, entity: &Rc<E>) -> Result<(), Collision> {
        let pending = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match inner.entries.entry(guid) {
                Entry::Vacant(slot) => {
                    slot.insert(GuidEntry::bound(entity));
                    debug!(%guid, "bound entity");
                    return Ok(());
                }
                Entry::Occupied(mut slot) => {
                    let entry = slot.get_mut();
                    match entry.entity.as_ref().map(Weak::upgrade) {
                        Some(Some(current)) if Rc::ptr_eq(&current, entity) => return Ok(()),
                        Some(Some(_)) => {
                            let severity = inner.config.mode.collision_severity();
                            report_collision(guid, severity);
                            return Err(Collision { guid, severity });
                        }
                        Some(None) => {
                            warn!(%guid, "previous entity was dropped without unregistering, rebinding");
                        }
                        None => {}
                    }
                    entry.entity = Some(Rc::downgrade(entity));
                    debug!(%guid, waiting = entry.on_add.len(), "bound entity to placeholder");
                    entry.on_add.clone()
                }
            }
        };

        for callback in &pending {
            callback.call(entity);
        }
        Ok(())
    }

    /// Notify remove-callbacks for `guid`, then clear its binding.
    ///
    /// Callbacks run while the entity is still bound. The entry is pruned
    /// afterwards if nothing is left in it. Unknown identifiers are ignored.
    pub fn unregister(&self, guid: Guid) {
        let pending = match self.inner.borrow().entries.get(&guid) {
            Some(entry) => entry.on_remove.clone(),
            None => return,
        };

        for callback in &pending {
            callback.call();
        }

        let mut inner = self.inner.borrow_mut();
        let Some(entry) = inner.entries.get_mut(&guid) else {
            return;
        };
        entry.entity = None;
        if entry.is_prunable() {
            inner.entries.remove(&guid);
            debug!(%guid, "unbound entity, entry pruned");
        } else {
            debug!(%guid, "unbound entity");
        }
    }

    /// Look up the entity bound to `guid`, subscribing the given callbacks.
    ///
    /// Creates a placeholder entry when the identifier is unknown and at
    /// least one callback is supplied. Callbacks are not deduplicated:
    /// subscribing the same handle twice means it runs twice.
    pub fn resolve(
        &self,
        guid: Guid,
        on_add: Option<OnAdd<E>>,
        on_remove: Option<OnRemove>,
    ) -> Option<Rc<E>> {
        let mut inner = self.inner.borrow_mut();
        let entry = match inner.entries.entry(guid) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                if on_add.is_none() && on_remove.is_none() {
                    return None;
                }
                debug!(%guid, "created placeholder entry");
                slot.insert(GuidEntry::placeholder())
            }
        };
        entry.on_add.extend(on_add);
        entry.on_remove.extend(on_remove);

        let weak = entry.entity.as_ref()?;
        let entity = weak.upgrade();
        if entity.is_none() {
            warn!(%guid, "bound entity was dropped without unregistering");
        }
        entity
    }

    /// Remove one subscription of each given callback from `guid`.
    ///
    /// The most recent matching subscription goes first. The entry is pruned
    /// if that leaves it empty. Unknown identifiers are ignored.
    pub fn unsubscribe(&self, guid: Guid, on_add: Option<&OnAdd<E>>, on_remove: Option<&OnRemove>) {
        // Removed callbacks are dropped after the table is released; one may
        // own a reference handle whose drop unsubscribes again.
        let _released = {
            let mut inner = self.inner.borrow_mut();
            let Some(entry) = inner.entries.get_mut(&guid) else {
                return;
            };
            let removed_add = on_add.and_then(|cb| take_last(&mut entry.on_add, cb));
            let removed_remove = on_remove.and_then(|cb| take_last(&mut entry.on_remove, cb));
            let pruned = if entry.is_prunable() {
                debug!(%guid, "last subscriber left, entry pruned");
                inner.entries.remove(&guid)
            } else {
                None
            };
            (removed_add, removed_remove, pruned)
        };
    }

    /// Number of entries, bound or placeholder.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Returns `true` if an entry (bound or placeholder) exists for `guid`.
    #[must_use]
    pub fn contains(&self, guid: Guid) -> bool {
        self.inner.borrow().entries.contains_key(&guid)
    }

    /// Returns `true` if a live entity is bound to `guid`.
    #[must_use]
    pub fn is_bound(&self, guid: Guid) -> bool {
        self.inner
            .borrow()
            .entries
            .get(&guid)
            .and_then(|entry| entry.entity.as_ref())
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Number of `(add, remove)` callbacks subscribed to `guid`, or `None`
    /// if there is no entry.
    #[must_use]
    pub fn subscriber_counts(&self, guid: Guid) -> Option<(usize, usize)> {
        self.inner
            .borrow()
            .entries
            .get(&guid)
            .map(|entry| (entry.on_add.len(), entry.on_remove.len()))
    }
}

impl<E: Guided + 'static> GuidRegistry<E> {
    /// Bind `entity` under its own identifier. See [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Returns [`Collision`] when a different live entity holds the identifier.
    pub fn register_entity(&self, entity: &Rc<E>) -> Result<(), Collision> {
        self.register(entity.guid(), entity)
    }
}

impl<E: 'static> Default for GuidRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for GuidRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for GuidRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("GuidRegistry")
                .field("mode", &inner.config.mode)
                .field("entries", &inner.entries.len())
                .finish(),
            Err(_) => f.write_str("GuidRegistry { <borrowed> }"),
        }
    }
}

fn report_collision(guid: Guid, severity: Severity) {
    match severity {
        Severity::Assertion => error!(
            %guid,
            "guid collision between two live entities; assign a new guid or track runtime instances directly"
        ),
        Severity::Warning => warn!(
            %guid,
            "guid collision while authoring, most likely a copied entity; assign a new guid"
        ),
    }
}

fn take_last<T: PartialEq>(list: &mut Vec<T>, item: &T) -> Option<T> {
    let pos = list.iter().rposition(|candidate| candidate == item)?;
    Some(list.remove(pos))
}
