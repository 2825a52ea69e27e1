//! # guid_app
//!
//! Demonstration host for the GUID registry. Builds a scene, holds references
//! to its objects by identifier, and walks them through the situations the
//! registry exists for.
//!
//! ## Sequence
//!
//! 1. A reference is created before its target exists (late binding).
//! 2. The target spawns, despawns and respawns; the reference follows.
//! 3. The target is duplicated; the copy collides and is reassigned.
//! 4. The reference is persisted with MessagePack and restored.
//!
//! Set `GUID_REGISTRY_MODE=authoring` to report collisions as warnings.

mod scene;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use guid_core::{Guid, GuidReference, GuidRegistry, Guided, ReferenceRecord, RegistryConfig};
use scene::{Scene, SceneObject};

/// Identifier of the object the demo references before it exists.
const LAMP_GUID: &str = "11111111-1111-1111-1111-111111111111";

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("guid_app=info".parse()?)
                .add_directive("guid_core=info".parse()?),
        )
        .init();

    let config = RegistryConfig::from_env();
    info!(mode = ?config.mode, "guid registry starting");

    let registry = GuidRegistry::<SceneObject>::with_config(config);
    let mut scene = Scene::new("demo", registry.clone());

    let lamp_guid: Guid = LAMP_GUID.parse()?;
    let reference = GuidReference::new(&registry, lamp_guid);
    reference.on_added(|object| info!(name = object.name(), "reference target appeared"));
    reference.on_removed(|| info!("reference target went away"));
    info!(resolved = %describe(&reference)?, "reference created before target");

    let lamp = scene.spawn("lamp", Some(lamp_guid))?;
    info!(resolved = %describe(&reference)?, "after spawn");

    let lamp = scene
        .despawn(lamp.guid())
        .context("lamp should be live")?;
    info!(resolved = %describe(&reference)?, "after despawn");

    scene.attach(&lamp)?;
    info!(resolved = %describe(&reference)?, "after respawn");

    let copy = scene.duplicate(&lamp)?;
    info!(
        original = %lamp.guid(),
        copy = %copy.guid(),
        live = scene.len(),
        "duplicate repaired"
    );

    let mut labelled = reference.clone();
    labelled.set_label(Some(scene.label_for(&lamp)));
    let record = labelled.to_record();
    let bytes = rmp_serde::to_vec(&record)?;
    info!(
        record = %serde_json::to_string(&record)?,
        bytes = bytes.len(),
        "persisted reference"
    );

    let decoded: ReferenceRecord = rmp_serde::from_slice(&bytes)?;
    let restored = GuidReference::from_record(&registry, &decoded);
    info!(
        guid = %restored.guid(),
        resolved = %describe(&restored)?,
        found = scene.find(restored.guid()).is_some(),
        "restored reference"
    );

    for guid in [lamp.guid(), copy.guid()] {
        scene.despawn(guid);
    }
    info!(empty = scene.is_empty(), "scene cleared");

    reference.dispose();
    labelled.dispose();
    restored.dispose();
    info!(entries = registry.len(), "guid registry shut down");
    Ok(())
}

fn describe(reference: &GuidReference<SceneObject>) -> Result<String> {
    Ok(reference
        .entity()?
        .map_or_else(|| "<unbound>".to_string(), |object| object.name().to_string()))
}
