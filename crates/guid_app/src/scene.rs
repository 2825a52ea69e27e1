//! Scene objects that own their identifiers and keep the registry informed.
//!
//! The [`Scene`] plays the role of the entity lifecycle owner: it registers
//! objects as they become live and unregisters them when they leave. On a
//! collision it assigns the newcomer a fresh identifier and retries, which is
//! how duplicated objects get repaired.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Result, bail};
use tracing::{info, warn};

use guid_core::{Guid, GuidRegistry, Guided, ReferenceLabel};

/// Attempts before giving up on finding a free identifier.
const MAX_REGISTER_ATTEMPTS: usize = 4;

/// A named object carrying a persistent identifier.
#[derive(Debug)]
pub struct SceneObject {
    name: String,
    guid: Cell<Guid>,
}

impl SceneObject {
    /// Create an object with the given identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, guid: Guid) -> Self {
        Self {
            name: name.into(),
            guid: Cell::new(guid),
        }
    }

    /// The object's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the identifier with a fresh random one. Only valid while the
    /// object is not registered.
    fn reassign_guid(&self) -> Guid {
        let guid = Guid::new_random();
        self.guid.set(guid);
        guid
    }
}

impl Guided for SceneObject {
    fn guid(&self) -> Guid {
        self.guid.get()
    }
}

/// Owns the live objects of one scene.
#[derive(Debug)]
pub struct Scene {
    name: String,
    registry: GuidRegistry<SceneObject>,
    objects: Vec<Rc<SceneObject>>,
}

impl Scene {
    /// Create an empty scene backed by `registry`.
    #[must_use]
    pub fn new(name: impl Into<String>, registry: GuidRegistry<SceneObject>) -> Self {
        Self {
            name: name.into(),
            registry,
            objects: Vec::new(),
        }
    }

    /// Create a live object. Without a `guid` a random one is assigned.
    ///
    /// # Errors
    ///
    /// Fails if no free identifier could be found.
    pub fn spawn(&mut self, name: &str, guid: Option<Guid>) -> Result<Rc<SceneObject>> {
        let object = Rc::new(SceneObject::new(
            name,
            guid.unwrap_or_else(Guid::new_random),
        ));
        self.attach(&object)?;
        Ok(object)
    }

    /// Copy an object, identifier included, and bring the copy live. The
    /// copy collides with its source and is given a fresh identifier.
    ///
    /// # Errors
    ///
    /// Fails if no free identifier could be found.
    pub fn duplicate(&mut self, source: &SceneObject) -> Result<Rc<SceneObject>> {
        let copy = Rc::new(SceneObject::new(
            format!("{} (copy)", source.name()),
            source.guid(),
        ));
        self.attach(&copy)?;
        Ok(copy)
    }

    /// Bring an existing object live, registering it under its identifier
    /// and reassigning on collision.
    ///
    /// # Errors
    ///
    /// Fails if no free identifier could be found.
    pub fn attach(&mut self, object: &Rc<SceneObject>) -> Result<()> {
        for _ in 0..MAX_REGISTER_ATTEMPTS {
            match self.registry.register_entity(object) {
                Ok(()) => {
                    if !self.objects.iter().any(|live| Rc::ptr_eq(live, object)) {
                        self.objects.push(Rc::clone(object));
                    }
                    info!(scene = %self.name, name = object.name(), guid = %object.guid(), "object live");
                    return Ok(());
                }
                Err(collision) => {
                    let fresh = object.reassign_guid();
                    warn!(
                        name = object.name(),
                        old = %collision.guid,
                        new = %fresh,
                        "reassigned guid after collision"
                    );
                }
            }
        }
        bail!(
            "could not register {} after {MAX_REGISTER_ATTEMPTS} attempts",
            object.name()
        )
    }

    /// Take the object with `guid` out of the scene.
    ///
    /// Returns the object, or `None` if nothing live has that identifier.
    pub fn despawn(&mut self, guid: Guid) -> Option<Rc<SceneObject>> {
        let pos = self.objects.iter().position(|object| object.guid() == guid)?;
        let object = self.objects.swap_remove(pos);
        self.registry.unregister(guid);
        info!(scene = %self.name, name = object.name(), %guid, "object removed");
        Some(object)
    }

    /// Live object with `guid`, if any.
    #[must_use]
    pub fn find(&self, guid: Guid) -> Option<&Rc<SceneObject>> {
        self.objects.iter().find(|object| object.guid() == guid)
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the scene has no live objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Display label for references to `object`.
    #[must_use]
    pub fn label_for(&self, object: &SceneObject) -> ReferenceLabel {
        ReferenceLabel::new(object.name()).with_scene(self.name.clone())
    }
}
