//! Persistent, cached references to entities by identifier.
//!
//! A [`GuidReference`] stores only a [`Guid`]. It resolves through a
//! [`GuidRegistry`], caches the result weakly, and keeps the cache current by
//! subscribing to add/remove notifications for its identifier. Consumers can
//! hook the same notifications through [`GuidReference::on_added`] and
//! [`GuidReference::on_removed`].
//!
//! ## Cache states
//!
//! ```text
//! Unresolved --entity()--> CachedBound | CachedUnbound
//! CachedBound --remove--> Departed (entity() is none)
//! Departed | CachedUnbound --add--> CachedBound
//! any --dispose()--> Disposed (entity() fails with ReferenceError::Disposed)
//! ```
//!
//! The subscription is released by [`GuidReference::dispose`] or on drop.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::callback::{OnAdd, OnRemove};
use crate::error::ReferenceError;
use crate::guid::{GUID_LEN, Guid, Guided};
use crate::record::{ReferenceLabel, ReferenceRecord};
use crate::registry::GuidRegistry;

/// Identifies a consumer subscription on a single [`GuidReference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Cache and consumer subscriptions, shared with the registry callbacks.
struct ReferenceState<E> {
    cached: Option<Weak<E>>,
    cache_valid: bool,
    /// Set from the remove notification until the next add. The registry
    /// still binds the entity while its remove-callbacks run.
    departed: bool,
    added: Vec<(SubscriberId, OnAdd<E>)>,
    removed: Vec<(SubscriberId, OnRemove)>,
    next_subscriber: u64,
}

impl<E> ReferenceState<E> {
    fn new() -> Self {
        Self {
            cached: None,
            cache_valid: false,
            departed: false,
            added: Vec::new(),
            removed: Vec::new(),
            next_subscriber: 0,
        }
    }

    fn invalidate(&mut self) {
        self.cached = None;
        self.cache_valid = false;
    }

    fn allocate_subscriber(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        id
    }

    fn entity_added(state: &RefCell<Self>, entity: &Rc<E>) {
        let subscribers: Vec<OnAdd<E>> = {
            let mut state = state.borrow_mut();
            state.cached = Some(Rc::downgrade(entity));
            state.cache_valid = true;
            state.departed = false;
            state.added.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in &subscribers {
            callback.call(entity);
        }
    }

    fn entity_removed(state: &RefCell<Self>) {
        let subscribers: Vec<OnRemove> = {
            let mut state = state.borrow_mut();
            state.invalidate();
            state.departed = true;
            state.removed.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in &subscribers {
            callback.call();
        }
    }
}

/// A serializable reference to an entity by identifier.
///
/// Cloning produces an independent handle with its own registry subscription
/// and no consumer subscribers.
pub struct GuidReference<E: 'static> {
    registry: GuidRegistry<E>,
    guid: Guid,
    label: Option<ReferenceLabel>,
    state: Rc<RefCell<ReferenceState<E>>>,
    add_handler: OnAdd<E>,
    remove_handler: OnRemove,
    subscribed: Cell<bool>,
    disposed: Cell<bool>,
}

impl<E: 'static> GuidReference<E> {
    /// Create a reference to `guid` and subscribe to it right away.
    #[must_use]
    pub fn new(registry: &GuidRegistry<E>, guid: Guid) -> Self {
        let reference = Self::unresolved(registry, guid);
        reference.refresh();
        reference
    }

    /// Restore a reference from its persisted 16 bytes.
    ///
    /// Bytes of any other length yield a reference to [`Guid::NIL`]. Nothing
    /// is subscribed until the first [`entity`](Self::entity) call.
    #[must_use]
    pub fn from_bytes(registry: &GuidRegistry<E>, bytes: &[u8]) -> Self {
        Self::unresolved(registry, Guid::from_bytes_lenient(bytes))
    }

    /// Restore a reference from a persisted record, including its label.
    #[must_use]
    pub fn from_record(registry: &GuidRegistry<E>, record: &ReferenceRecord) -> Self {
        let mut reference = Self::unresolved(registry, record.guid());
        reference.label = record.label.clone();
        reference
    }

    fn unresolved(registry: &GuidRegistry<E>, guid: Guid) -> Self {
        let state = Rc::new(RefCell::new(ReferenceState::new()));

        let weak_state = Rc::downgrade(&state);
        let add_handler = OnAdd::new(move |entity: &Rc<E>| {
            if let Some(state) = weak_state.upgrade() {
                ReferenceState::entity_added(&state, entity);
            }
        });
        let weak_state = Rc::downgrade(&state);
        let remove_handler = OnRemove::new(move || {
            if let Some(state) = weak_state.upgrade() {
                ReferenceState::entity_removed(&state);
            }
        });

        Self {
            registry: registry.clone(),
            guid,
            label: None,
            state,
            add_handler,
            remove_handler,
            subscribed: Cell::new(false),
            disposed: Cell::new(false),
        }
    }

    /// The referenced identifier.
    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Display-only label, if one was attached.
    #[must_use]
    pub fn label(&self) -> Option<&ReferenceLabel> {
        self.label.as_ref()
    }

    /// Attach or clear the display-only label. Never used for resolution.
    pub fn set_label(&mut self, label: Option<ReferenceLabel>) {
        self.label = label;
    }

    /// Returns `true` while the handle holds registry subscriptions.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.get()
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// The referenced entity, if one is currently bound.
    ///
    /// Served from the cache when valid. Otherwise resolves through the
    /// registry, subscribing on the first resolution only.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::Disposed`] after [`dispose`](Self::dispose).
    pub fn entity(&self) -> Result<Option<Rc<E>>, ReferenceError> {
        if self.disposed.get() {
            return Err(ReferenceError::Disposed(self.guid));
        }
        Ok(self.refresh())
    }

    fn refresh(&self) -> Option<Rc<E>> {
        {
            let state = self.state.borrow();
            if state.departed {
                return None;
            }
            if state.cache_valid {
                match &state.cached {
                    None => return None,
                    Some(weak) => {
                        if let Some(entity) = weak.upgrade() {
                            return Some(entity);
                        }
                        // Dropped by its owner without unregistering; ask the
                        // registry again so the stale binding gets reported.
                    }
                }
            }
        }

        let resolved = if self.subscribed.replace(true) {
            self.registry.resolve(self.guid, None, None)
        } else {
            debug!(guid = %self.guid, "reference subscribed");
            self.registry.resolve(
                self.guid,
                Some(self.add_handler.clone()),
                Some(self.remove_handler.clone()),
            )
        };

        let mut state = self.state.borrow_mut();
        state.cached = resolved.as_ref().map(Rc::downgrade);
        state.cache_valid = true;
        resolved
    }

    /// Run `f` whenever an entity is bound to this reference's identifier.
    pub fn on_added(&self, f: impl Fn(&Rc<E>) + 'static) -> SubscriberId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_subscriber();
        state.added.push((id, OnAdd::new(f)));
        id
    }

    /// Run `f` whenever the bound entity goes away.
    pub fn on_removed(&self, f: impl Fn() + 'static) -> SubscriberId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_subscriber();
        state.removed.push((id, OnRemove::new(f)));
        id
    }

    /// Drop a consumer subscription. Returns `true` if it existed.
    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.added.len() + state.removed.len();
        state.added.retain(|(sub, _)| *sub != id);
        state.removed.retain(|(sub, _)| *sub != id);
        before != state.added.len() + state.removed.len()
    }

    /// The persisted form of the identifier.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; GUID_LEN] {
        self.guid.to_bytes_le()
    }

    /// The persisted record: identifier bytes plus the display label.
    #[must_use]
    pub fn to_record(&self) -> ReferenceRecord {
        ReferenceRecord {
            guid: self.to_bytes().to_vec(),
            label: self.label.clone(),
        }
    }

    /// Replace the identifier from persisted bytes, in place.
    ///
    /// Any existing subscription is released first. The cache is reset and
    /// the next [`entity`](Self::entity) call subscribes to the new
    /// identifier. Revives a disposed handle.
    pub fn restore(&mut self, bytes: &[u8]) {
        self.release();
        self.guid = Guid::from_bytes_lenient(bytes);
        {
            let mut state = self.state.borrow_mut();
            state.invalidate();
            state.departed = false;
        }
        self.disposed.set(false);
    }

    /// Release the registry subscription. Idempotent.
    ///
    /// Consumer subscribers stay attached but will not fire again unless the
    /// handle is revived with [`restore`](Self::restore).
    pub fn dispose(&self) {
        self.release();
        self.disposed.set(true);
    }

    fn release(&self) {
        if self.subscribed.replace(false) {
            self.registry.unsubscribe(
                self.guid,
                Some(&self.add_handler),
                Some(&self.remove_handler),
            );
            debug!(guid = %self.guid, "reference unsubscribed");
        }
    }
}

impl<E: Guided + 'static> GuidReference<E> {
    /// Create a reference to `entity` through its own identifier.
    #[must_use]
    pub fn from_entity(registry: &GuidRegistry<E>, entity: &Rc<E>) -> Self {
        Self::new(registry, entity.guid())
    }
}

impl<E: 'static> Clone for GuidReference<E> {
    fn clone(&self) -> Self {
        let mut copy = Self::unresolved(&self.registry, self.guid);
        copy.label = self.label.clone();
        copy.refresh();
        copy
    }
}

impl<E: 'static> Drop for GuidReference<E> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<E: 'static> fmt::Debug for GuidReference<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuidReference")
            .field("guid", &self.guid)
            .field("label", &self.label)
            .field("subscribed", &self.subscribed.get())
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Door {
        guid: Guid,
    }

    impl Guided for Door {
        fn guid(&self) -> Guid {
            self.guid
        }
    }

    fn door(guid: Guid) -> Rc<Door> {
        Rc::new(Door { guid })
    }

    fn same(found: Option<Rc<Door>>, expected: &Rc<Door>) -> bool {
        found.is_some_and(|entity| Rc::ptr_eq(&entity, expected))
    }

    #[test]
    fn test_new_subscribes_immediately() {
        let registry = GuidRegistry::<Door>::new();
        let guid = Guid::new_random();
        let reference = GuidReference::new(&registry, guid);

        assert!(reference.is_subscribed());
        assert_eq!(registry.subscriber_counts(guid), Some((1, 1)));
        assert!(reference.entity().unwrap().is_none());
    }

    #[test]
    fn test_late_binding_fills_cache() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        let reference = GuidReference::new(&registry, a.guid);

        registry.register_entity(&a).unwrap();
        assert!(same(reference.entity().unwrap(), &a));
    }

    #[test]
    fn test_remove_and_readd_cycle() {
        let registry = GuidRegistry::<Door>::new();
        let guid: Guid = "11111111-1111-1111-1111-111111111111".parse().unwrap();
        let a = door(guid);
        registry.register_entity(&a).unwrap();

        let handle = GuidReference::from_entity(&registry, &a);
        assert!(same(handle.entity().unwrap(), &a));

        registry.unregister(guid);
        assert!(handle.entity().unwrap().is_none());

        registry.register_entity(&a).unwrap();
        assert!(same(handle.entity().unwrap(), &a));

        // Still exactly one subscription after the cycle.
        assert_eq!(registry.subscriber_counts(guid), Some((1, 1)));
    }

    #[test]
    fn test_cached_entity_served_without_registry() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        registry.register_entity(&a).unwrap();
        let reference = GuidReference::from_entity(&registry, &a);

        // A stray registration elsewhere does not disturb the cached value.
        registry.register_entity(&door(Guid::new_random())).unwrap();
        assert!(same(reference.entity().unwrap(), &a));
    }

    #[test]
    fn test_consumer_subscribers_receive_events() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        let reference = GuidReference::new(&registry, a.guid);

        let events = Rc::new(RefCell::new(Vec::new()));
        let added = Rc::clone(&events);
        reference.on_added(move |entity| added.borrow_mut().push(format!("add {}", entity.guid)));
        let removed = Rc::clone(&events);
        let remove_id = reference.on_removed(move || removed.borrow_mut().push("remove".into()));

        registry.register_entity(&a).unwrap();
        registry.unregister(a.guid);
        assert!(reference.remove_subscriber(remove_id));
        assert!(!reference.remove_subscriber(remove_id));
        registry.register_entity(&a).unwrap();
        registry.unregister(a.guid);

        assert_eq!(
            *events.borrow(),
            vec![
                format!("add {}", a.guid),
                "remove".to_string(),
                format!("add {}", a.guid),
            ]
        );
    }

    #[test]
    fn test_subscriber_may_read_entity_during_remove() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        registry.register_entity(&a).unwrap();
        let reference = Rc::new(GuidReference::from_entity(&registry, &a));

        let seen_none = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen_none);
        let weak_ref = Rc::downgrade(&reference);
        reference.on_removed(move || {
            if let Some(reference) = weak_ref.upgrade() {
                flag.set(reference.entity().unwrap().is_none());
            }
        });

        registry.unregister(a.guid);
        assert!(seen_none.get());
    }

    #[test]
    fn test_departing_entity_not_recached_by_later_callback() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        registry.register_entity(&a).unwrap();
        let reference = Rc::new(GuidReference::from_entity(&registry, &a));
        assert!(reference.entity().unwrap().is_some());

        // Subscribed after the reference, so it runs after the reference
        // has been told about the removal but before the binding is cleared.
        let seen = Rc::new(Cell::new(None));
        let flag = Rc::clone(&seen);
        let weak_ref = Rc::downgrade(&reference);
        let inner_registry = registry.clone();
        let guid = a.guid;
        let on_remove = OnRemove::new(move || {
            if let Some(reference) = weak_ref.upgrade() {
                flag.set(Some((
                    inner_registry.is_bound(guid),
                    reference.entity().unwrap().is_some(),
                )));
            }
        });
        registry.resolve(guid, None, Some(on_remove.clone()));

        registry.unregister(guid);
        assert_eq!(seen.get(), Some((true, false)));
        assert!(reference.entity().unwrap().is_none());

        registry.register_entity(&a).unwrap();
        let found = reference.entity().unwrap().unwrap();
        assert!(Rc::ptr_eq(&found, &a));
        registry.unsubscribe(guid, None, Some(&on_remove));
    }

    #[test]
    fn test_dispose_removes_subscription() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        let reference = GuidReference::new(&registry, a.guid);

        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        reference.on_added(move |_| counter.set(counter.get() + 1));

        reference.dispose();
        reference.dispose();
        assert!(!registry.contains(a.guid));

        registry.register_entity(&a).unwrap();
        registry.unregister(a.guid);
        assert_eq!(fired.get(), 0);
        assert!(matches!(
            reference.entity(),
            Err(ReferenceError::Disposed(guid)) if guid == a.guid
        ));
    }

    #[test]
    fn test_drop_releases_subscription() {
        let registry = GuidRegistry::<Door>::new();
        let guid = Guid::new_random();
        {
            let _reference = GuidReference::new(&registry, guid);
            assert!(registry.contains(guid));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clone_has_independent_subscription() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        let original = GuidReference::new(&registry, a.guid);
        let copy = original.clone();
        assert_eq!(copy.guid(), original.guid());
        assert_eq!(registry.subscriber_counts(a.guid), Some((2, 2)));

        drop(original);
        assert_eq!(registry.subscriber_counts(a.guid), Some((1, 1)));

        registry.register_entity(&a).unwrap();
        assert!(same(copy.entity().unwrap(), &a));
    }

    #[test]
    fn test_from_bytes_defers_subscription() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        registry.register_entity(&a).unwrap();

        let restored = GuidReference::from_bytes(&registry, &a.guid.to_bytes_le());
        assert_eq!(restored.guid(), a.guid);
        assert!(!restored.is_subscribed());
        assert_eq!(registry.subscriber_counts(a.guid), Some((0, 0)));

        assert!(same(restored.entity().unwrap(), &a));
        assert!(restored.is_subscribed());
        assert_eq!(registry.subscriber_counts(a.guid), Some((1, 1)));
    }

    #[test]
    fn test_malformed_bytes_restore_nil() {
        let registry = GuidRegistry::<Door>::new();
        assert_eq!(GuidReference::from_bytes(&registry, &[1, 2, 3]).guid(), Guid::NIL);
        assert_eq!(GuidReference::from_bytes(&registry, &[]).guid(), Guid::NIL);
    }

    #[test]
    fn test_restore_moves_subscription() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        let b = door(Guid::new_random());
        registry.register_entity(&a).unwrap();
        registry.register_entity(&b).unwrap();

        let mut reference = GuidReference::from_entity(&registry, &a);
        reference.restore(&[0u8; GUID_LEN]);
        assert_eq!(reference.guid(), Guid::NIL);
        assert_eq!(registry.subscriber_counts(a.guid), Some((0, 0)));

        reference.restore(&b.guid.to_bytes_le());
        assert!(same(reference.entity().unwrap(), &b));
    }

    #[test]
    fn test_restore_revives_disposed_reference() {
        let registry = GuidRegistry::<Door>::new();
        let a = door(Guid::new_random());
        registry.register_entity(&a).unwrap();

        let mut reference = GuidReference::from_entity(&registry, &a);
        reference.dispose();
        assert!(reference.entity().is_err());

        reference.restore(&a.guid.to_bytes_le());
        assert!(same(reference.entity().unwrap(), &a));
    }

    #[test]
    fn test_record_carries_label() {
        let registry = GuidRegistry::<Door>::new();
        let guid = Guid::new_random();
        let mut reference = GuidReference::new(&registry, guid);
        reference.set_label(Some(ReferenceLabel::new("front door").with_scene("lobby")));

        let bytes = rmp_serde::to_vec(&reference.to_record()).unwrap();
        let record: ReferenceRecord = rmp_serde::from_slice(&bytes).unwrap();
        let restored = GuidReference::from_record(&registry, &record);

        assert_eq!(restored.guid(), guid);
        assert_eq!(restored.label().map(|l| l.name.as_str()), Some("front door"));
    }
}
