//! Hybrid Sync -- keeps scene-side transforms and entity-side transform data
//! in step.
//!
//! Authored objects bind their [`Transform`](transform::Transform) into a
//! shared [`TransformContainer`](container::TransformContainer) and choose,
//! through tag components, which direction each property flows. A
//! [`FrameLoop`](frame::FrameLoop) runs the fixed frame schedule: command
//! playback, transform-to-entity sync, simulation, entity-to-transform sync
//! and sync-state reset.
//!
//! # Quick Start
//!
//! ```
//! use glam::Vec3;
//! use hybrid_sync::prelude::*;
//!
//! let hybrid = HybridWorld::new(&HybridConfig::default()).unwrap();
//! let mut frames = FrameLoop::new(hybrid);
//!
//! let mut actor = EntityBehaviour::new(
//!     frames.hybrid().world().registry(),
//!     vec![
//!         Box::new(TransformSupplier::new(Transform::from_position(Vec3::new(1.0, 2.0, 3.0)))),
//!         Box::new(SyncStateSupplier::new(SyncState::POSITION_TO_ENTITY)),
//!     ],
//! )
//! .unwrap();
//! let entity = actor.initialize(frames.hybrid_mut()).unwrap();
//!
//! frames.frame().unwrap();
//! assert_eq!(
//!     frames.hybrid().world().get::<Position>(entity),
//!     Some(&Position(Vec3::new(1.0, 2.0, 3.0)))
//! );
//! ```

#![deny(unsafe_code)]

pub mod authoring;
pub mod components;
pub mod config;
pub mod container;
pub mod frame;
pub mod sync_state;
pub mod systems;
pub mod transform;
pub mod world;

use hybrid_ecs::entity::Entity;
use hybrid_ecs::handle_table::SlotId;
use hybrid_ecs::EcsError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the sync layer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// An [`EntityTransform`](container::EntityTransform) was set up while
    /// still bound.
    #[error("transform is already bound to entity {entity:?} at slot {slot}; clean it up first")]
    TransformAlreadyBound { entity: Entity, slot: SlotId },

    /// An [`EntityBehaviour`](authoring::EntityBehaviour) was used before
    /// `initialize` or after `cleanup`.
    #[error("entity behaviour is not initialized")]
    NotInitialized,

    #[error("a simulation system named '{name}' is already registered")]
    DuplicateSystem { name: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::authoring::{
        ComponentSupplier, EntityBehaviour, EntitySupplier, SyncStateSupplier, TransformSupplier,
    };
    pub use crate::components::*;
    pub use crate::config::HybridConfig;
    pub use crate::container::{EntityTransform, TransformContainer};
    pub use crate::frame::{FrameDiagnostics, FrameLoop, SystemFn};
    pub use crate::sync_state::SyncState;
    pub use crate::systems::SyncReport;
    pub use crate::transform::{look_rotation, Transform};
    pub use crate::world::{HybridWorld, SetupContext};
    pub use crate::SyncError;
}
