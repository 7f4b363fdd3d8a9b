//! Orbit demo -- scene code moves transforms around a circle while a
//! simulation system spins each entity; both sides stay in step.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example orbit -p hybrid-sync

use glam::{Quat, Vec3};
use hybrid_ecs::command::CommandBuffer;
use hybrid_ecs::world::World;
use hybrid_sync::prelude::*;

const SATELLITES: usize = 6;
const FRAMES: u64 = 120;
const RADIUS: f32 = 10.0;

/// Simulation side: turn every synced rotation a little each frame.
fn spin(world: &World, cmds: &mut CommandBuffer) {
    let step = Quat::from_rotation_y(0.05);
    for entity in world.entities_with::<SyncRotationToTransform>() {
        if let Some(r) = world.get::<Rotation>(entity) {
            if let Err(e) = cmds.set(world.registry(), entity, &Rotation(step * r.0)) {
                tracing::warn!(%entity, error = %e, "spin skipped");
            }
        }
    }
}

fn orbit_point(index: usize, frame: u64) -> Vec3 {
    let phase = index as f32 / SATELLITES as f32 * std::f32::consts::TAU;
    let angle = phase + frame as f32 * 0.02;
    Vec3::new(angle.cos() * RADIUS, 0.0, angle.sin() * RADIUS)
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = HybridConfig::from_json_str(r#"{"container": {"min_parallel_len": 2}}"#)?;
    let mut frames = FrameLoop::new(HybridWorld::new(&config)?);
    frames.add_system("spin", spin)?;

    let mut satellites = Vec::with_capacity(SATELLITES);
    for i in 0..SATELLITES {
        let mut sat = EntityBehaviour::new(
            frames.hybrid().world().registry(),
            vec![
                Box::new(TransformSupplier::new(Transform::from_position(orbit_point(i, 0)))),
                Box::new(SyncStateSupplier::new(
                    SyncState::POSITION_TO_ENTITY | SyncState::ROTATION_TO_TRANSFORM,
                )),
                Box::new(ComponentSupplier::new(SyncPositionOffset(Vec3::new(0.0, 1.0, 0.0)))),
            ],
        )?;
        sat.initialize(frames.hybrid_mut())?;
        satellites.push(sat);
    }
    tracing::info!(
        satellites = SATELLITES,
        layouts = frames.hybrid().cache().len(),
        "scene ready"
    );

    for frame in 0..FRAMES {
        // Scene side: move transforms along the orbit.
        for (i, sat) in satellites.iter().enumerate() {
            if let Some(t) = sat.transform_mut(frames.hybrid_mut().container_mut()) {
                t.set_position(orbit_point(i, frame));
            }
        }

        // Halfway through, hold the first satellite's transform rotation for
        // one frame.
        if frame == FRAMES / 2 {
            satellites[0].skip_sync_one_frame(frames.hybrid_mut())?;
        }

        let diag = frames.frame()?;
        if frame % 30 == 0 {
            tracing::info!(
                frame,
                to_entity = diag.sync.position_to_entity,
                to_transform = diag.sync.rotation_to_transform,
                total_us = diag.total_time.as_micros() as u64,
                "frame"
            );
        }
    }

    for (i, sat) in satellites.iter().enumerate() {
        let world = frames.hybrid().world();
        let position = sat.get::<Position>(world).map(|p| p.0).unwrap_or_default();
        let facing = sat
            .transform(frames.hybrid().container())
            .map(|t| t.forward())
            .unwrap_or_default();
        tracing::info!(satellite = i, ?position, ?facing, "final");
    }

    for sat in &mut satellites {
        sat.cleanup(frames.hybrid_mut())?;
    }
    frames.frame()?;
    tracing::info!(
        entities = frames.hybrid().world().entity_count(),
        live_transforms = frames.hybrid().container().live_count(),
        "torn down"
    );
    Ok(())
}
