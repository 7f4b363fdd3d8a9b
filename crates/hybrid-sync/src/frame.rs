//! The fixed per-frame schedule.
//!
//! Each call to [`FrameLoop::frame`] runs four stages in order:
//!
//! 1. **Begin frame**: play back the next-frame buffer, then the begin-frame
//!    buffer. Commands queued by authoring code and by last frame's sync
//!    reset take effect here.
//! 2. **Before simulation**: copy transform position and rotation into the
//!    world for entities tagged to receive them.
//! 3. **Simulation**: run registered systems in registration order. Systems
//!    read the world and record into a shared simulation buffer, which is
//!    applied once all of them have run.
//! 4. **After simulation**: write entity data back to tagged transforms,
//!    queue removal of every `DontSyncOneFrame` tag into the next-frame
//!    buffer, then play back the after-simulation buffer.
//!
//! # Example
//!
//! ```
//! use hybrid_sync::prelude::*;
//! use hybrid_ecs::{command::CommandBuffer, world::World};
//!
//! fn idle(_world: &World, _cmds: &mut CommandBuffer) {}
//!
//! let mut frames = FrameLoop::new(HybridWorld::new(&HybridConfig::default()).unwrap());
//! frames.add_system("idle", idle).unwrap();
//! for _ in 0..3 {
//!     frames.frame().unwrap();
//! }
//! assert_eq!(frames.frame_count(), 3);
//! ```

use std::time::{Duration, Instant};

use tracing::debug_span;

use hybrid_ecs::command::CommandBuffer;
use hybrid_ecs::world::World;

use crate::systems::{sync_to_entity, sync_to_transform, SyncReport};
use crate::world::HybridWorld;
use crate::SyncError;

// ---------------------------------------------------------------------------
// SystemFn
// ---------------------------------------------------------------------------

/// A simulation system. Reads the world, records mutations.
pub type SystemFn = fn(&World, &mut CommandBuffer);

#[derive(Debug)]
struct RegisteredSystem {
    name: String,
    func: SystemFn,
}

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// Wall-clock time per stage.
#[derive(Debug, Clone, Default)]
pub struct StageTimes {
    pub begin_frame: Duration,
    pub before_simulation: Duration,
    pub simulation: Duration,
    pub after_simulation: Duration,
}

/// What happened during the last frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Zero-based index of the frame these numbers belong to.
    pub frame: u64,
    pub next_frame_commands: usize,
    pub begin_frame_commands: usize,
    pub simulation_commands: usize,
    pub after_simulation_commands: usize,
    /// `DontSyncOneFrame` removals queued for the next frame.
    pub sync_resets_queued: usize,
    pub sync: SyncReport,
    /// Per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    pub stage_times: StageTimes,
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// Runs the frame schedule against an owned [`HybridWorld`].
#[derive(Debug)]
pub struct FrameLoop {
    hybrid: HybridWorld,
    systems: Vec<RegisteredSystem>,
    simulation_buffer: CommandBuffer,
    frame_counter: u64,
    last_diagnostics: FrameDiagnostics,
}

impl FrameLoop {
    pub fn new(hybrid: HybridWorld) -> Self {
        Self {
            hybrid,
            systems: Vec::new(),
            simulation_buffer: CommandBuffer::new(),
            frame_counter: 0,
            last_diagnostics: FrameDiagnostics::default(),
        }
    }

    /// Append a simulation system. Names must be unique.
    pub fn add_system(&mut self, name: &str, func: SystemFn) -> Result<(), SyncError> {
        if self.systems.iter().any(|s| s.name == name) {
            return Err(SyncError::DuplicateSystem { name: name.to_owned() });
        }
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            func,
        });
        Ok(())
    }

    /// Names of registered systems in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn hybrid(&self) -> &HybridWorld {
        &self.hybrid
    }

    pub fn hybrid_mut(&mut self) -> &mut HybridWorld {
        &mut self.hybrid
    }

    /// Hand the context back, dropping the schedule.
    pub fn into_hybrid(self) -> HybridWorld {
        self.hybrid
    }

    /// Frames completed so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.last_diagnostics
    }

    /// Run one frame.
    pub fn frame(&mut self) -> Result<&FrameDiagnostics, SyncError> {
        let frame_start = Instant::now();
        let mut diag = FrameDiagnostics {
            frame: self.frame_counter,
            ..Default::default()
        };

        // Stage 1: begin frame.
        {
            let _span = debug_span!("begin_frame", frame = self.frame_counter).entered();
            let start = Instant::now();
            let (next, begin) = self.hybrid.play_frame_start();
            diag.next_frame_commands = next;
            diag.begin_frame_commands = begin;
            diag.stage_times.begin_frame = start.elapsed();
        }

        // Stage 2: transform -> entity.
        {
            let _span = debug_span!("before_simulation", frame = self.frame_counter).entered();
            let start = Instant::now();
            let (world, container) = self.hybrid.sync_parts();
            sync_to_entity(world, container, &mut diag.sync);
            diag.stage_times.before_simulation = start.elapsed();
        }

        // Stage 3: simulation.
        {
            let _span = debug_span!("simulation", frame = self.frame_counter).entered();
            let start = Instant::now();
            diag.system_times.reserve(self.systems.len());
            for system in &self.systems {
                let sys_start = Instant::now();
                (system.func)(self.hybrid.world(), &mut self.simulation_buffer);
                diag.system_times.push((system.name.clone(), sys_start.elapsed()));
            }
            diag.simulation_commands = self.hybrid.apply(&mut self.simulation_buffer);
            diag.stage_times.simulation = start.elapsed();
        }

        // Stage 4: entity -> transform, reset, playback.
        {
            let _span = debug_span!("after_simulation", frame = self.frame_counter).entered();
            let start = Instant::now();
            let (world, container) = self.hybrid.sync_parts();
            sync_to_transform(world, container, &mut diag.sync);
            diag.sync_resets_queued = self.hybrid.queue_sync_reset()?;
            diag.after_simulation_commands = self.hybrid.play_after_simulation();
            diag.stage_times.after_simulation = start.elapsed();
        }

        self.frame_counter += 1;
        diag.total_time = frame_start.elapsed();
        tracing::trace!(
            frame = diag.frame,
            simulation_commands = diag.simulation_commands,
            sync = ?diag.sync,
            "frame complete"
        );
        self.last_diagnostics = diag;
        Ok(&self.last_diagnostics)
    }

    /// Run `count` frames, stopping at the first error.
    pub fn run_frames(&mut self, count: u64) -> Result<(), SyncError> {
        for _ in 0..count {
            self.frame()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Position;
    use crate::config::HybridConfig;
    use glam::Vec3;

    fn new_loop() -> FrameLoop {
        FrameLoop::new(HybridWorld::new(&HybridConfig::default()).unwrap())
    }

    fn noop(_: &World, _: &mut CommandBuffer) {}

    fn nudge(world: &World, cmds: &mut CommandBuffer) {
        for entity in world.entities_with::<Position>() {
            if let Some(p) = world.get::<Position>(entity) {
                let _ = cmds.set(world.registry(), entity, &Position(p.0 + Vec3::X));
            }
        }
    }

    #[test]
    fn duplicate_system_name_is_rejected() {
        let mut frames = new_loop();
        frames.add_system("a", noop).unwrap();
        assert!(matches!(
            frames.add_system("a", noop),
            Err(SyncError::DuplicateSystem { .. })
        ));
        assert_eq!(frames.system_names(), vec!["a"]);
    }

    #[test]
    fn simulation_commands_apply_within_the_frame() {
        let mut frames = new_loop();
        frames.add_system("nudge", nudge).unwrap();
        let e = frames.hybrid_mut().world_mut().spawn_empty();
        frames.hybrid_mut().world_mut().add_component(e, Position::default()).unwrap();

        let diag = frames.frame().unwrap();
        assert_eq!(diag.simulation_commands, 1);
        assert_eq!(diag.system_times.len(), 1);
        frames.frame().unwrap();
        assert_eq!(
            frames.hybrid().world().get::<Position>(e),
            Some(&Position(Vec3::new(2.0, 0.0, 0.0)))
        );
        assert_eq!(frames.frame_count(), 2);
        assert_eq!(frames.last_diagnostics().frame, 1);
    }

    #[test]
    fn begin_frame_buffer_plays_at_next_frame_start() {
        let mut frames = new_loop();
        let e = frames.hybrid_mut().world_mut().spawn_empty();
        {
            let ctx = frames.hybrid_mut().setup_context();
            ctx.buffer.add(ctx.world.registry(), e, &Position(Vec3::Z)).unwrap();
        }
        assert!(!frames.hybrid().world().has::<Position>(e));

        let diag = frames.frame().unwrap();
        assert_eq!(diag.begin_frame_commands, 1);
        assert!(frames.hybrid().world().has::<Position>(e));
    }
}
