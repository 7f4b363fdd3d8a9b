//! Deferred structural mutations.
//!
//! A [`CommandBuffer`] records spawns, component changes and despawns while
//! systems only hold a shared borrow of the [`World`], and plays them back
//! later in strict insertion order. Component values travel as
//! [`serde_json::Value`] keyed by registered component name; the typed
//! helpers resolve the name through the [`ComponentRegistry`] and serialize
//! the value up front, so a mistyped component fails at record time rather
//! than at playback.
//!
//! # Example
//!
//! ```
//! use hybrid_ecs::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Health(u32);
//!
//! let mut world = World::new();
//! world.register_component::<Health>("health").unwrap();
//! let entity = world.spawn_empty();
//!
//! let mut cmds = CommandBuffer::new();
//! cmds.add(world.registry(), entity, &Health(50)).unwrap();
//!
//! let applied = cmds.apply(&mut world);
//! assert!(applied[0].applied_successfully);
//! assert_eq!(world.get::<Health>(entity), Some(&Health(50)));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::archetype::ArchetypeId;
use crate::component::{Component, ComponentRegistry};
use crate::entity::Entity;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// CommandKind
// ---------------------------------------------------------------------------

/// What a command does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandKind {
    /// Spawn an entity of `archetype` and then attach `components`.
    Spawn {
        archetype: ArchetypeId,
        /// `(registered name, value)` pairs, attached in order.
        components: Vec<(String, serde_json::Value)>,
    },
    /// Attach a component, overwriting any existing value.
    AddComponent {
        component_name: String,
        value: serde_json::Value,
    },
    /// Overwrite a component the target must already have.
    SetComponent {
        component_name: String,
        value: serde_json::Value,
    },
    /// Detach a component. Detaching an absent component is not a failure.
    RemoveComponent { component_name: String },
    /// Despawn the target.
    Despawn,
}

impl CommandKind {
    fn component_name(&self) -> Option<&str> {
        match self {
            CommandKind::AddComponent { component_name, .. }
            | CommandKind::SetComponent { component_name, .. }
            | CommandKind::RemoveComponent { component_name } => Some(component_name),
            CommandKind::Spawn { .. } | CommandKind::Despawn => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A single recorded mutation.
///
/// `target` is `None` only for spawns; after [`CommandBuffer::apply`] the
/// spawned handle is in `spawned_entity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub target: Option<Entity>,
    pub kind: CommandKind,
    /// Position in the buffer at record time.
    pub command_index: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub spawned_entity: Option<Entity>,
    /// `false` until applied, and stays `false` if playback failed.
    #[serde(default)]
    pub applied_successfully: bool,
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Outcome counters of the last [`CommandBuffer::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// (entity, component) pairs touched by more than one command. The last
    /// one in insertion order wins.
    pub conflict_count: usize,
    pub failed_count: usize,
    pub success_count: usize,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// FIFO queue of [`Command`]s.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_index: u32,
    last_apply_report: ApplyReport,
}

impl CommandBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    // -- recording ----------------------------------------------------------

    /// Queue a spawn of `archetype` with every component defaulted.
    pub fn spawn(&mut self, archetype: ArchetypeId) {
        self.spawn_with(archetype, Vec::new());
    }

    /// Queue a spawn of `archetype` followed by the given named components.
    pub fn spawn_with(
        &mut self,
        archetype: ArchetypeId,
        components: Vec<(String, serde_json::Value)>,
    ) {
        self.push(
            None,
            CommandKind::Spawn {
                archetype,
                components,
            },
        );
    }

    /// Queue attaching a JSON-encoded component by name.
    pub fn add_component_json(
        &mut self,
        target: Entity,
        component_name: &str,
        value: serde_json::Value,
    ) {
        self.push(
            Some(target),
            CommandKind::AddComponent {
                component_name: component_name.to_owned(),
                value,
            },
        );
    }

    /// Queue overwriting a JSON-encoded component by name.
    pub fn set_component_json(
        &mut self,
        target: Entity,
        component_name: &str,
        value: serde_json::Value,
    ) {
        self.push(
            Some(target),
            CommandKind::SetComponent {
                component_name: component_name.to_owned(),
                value,
            },
        );
    }

    /// Queue detaching a component by name.
    pub fn remove_component_by_name(&mut self, target: Entity, component_name: &str) {
        self.push(
            Some(target),
            CommandKind::RemoveComponent {
                component_name: component_name.to_owned(),
            },
        );
    }

    /// Queue attaching `value`.
    pub fn add<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        target: Entity,
        value: &T,
    ) -> Result<(), EcsError> {
        let (name, json) = encode(registry, value)?;
        self.add_component_json(target, &name, json);
        Ok(())
    }

    /// Queue attaching `T::default()`. Used for tag components.
    pub fn add_default<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        target: Entity,
    ) -> Result<(), EcsError> {
        self.add(registry, target, &T::default())
    }

    /// Queue overwriting `T`, which the target must have at playback.
    pub fn set<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        target: Entity,
        value: &T,
    ) -> Result<(), EcsError> {
        let (name, json) = encode(registry, value)?;
        self.set_component_json(target, &name, json);
        Ok(())
    }

    /// Queue detaching `T`.
    pub fn remove<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        target: Entity,
    ) -> Result<(), EcsError> {
        let name = registry.info_of::<T>()?.name.clone();
        self.remove_component_by_name(target, &name);
        Ok(())
    }

    /// Queue a despawn.
    pub fn despawn(&mut self, target: Entity) {
        self.push(Some(target), CommandKind::Despawn);
    }

    /// Append a pre-built command, renumbering it for this buffer.
    pub fn push_raw(&mut self, mut cmd: Command) {
        cmd.command_index = self.next_index;
        self.next_index += 1;
        self.commands.push(cmd);
    }

    /// Move every command of `other` to the end of this buffer.
    pub fn append(&mut self, other: &mut CommandBuffer) {
        for cmd in other.commands.drain(..) {
            self.push_raw(cmd);
        }
        other.next_index = 0;
    }

    // -- inspection ---------------------------------------------------------

    /// Queued commands in insertion order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Counters from the last [`apply`](Self::apply); all zero before the
    /// first one.
    pub fn last_apply_report(&self) -> &ApplyReport {
        &self.last_apply_report
    }

    /// Drop every queued command.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.next_index = 0;
    }

    // -- playback -----------------------------------------------------------

    /// Play every command back against `world` in insertion order and empty
    /// the buffer.
    ///
    /// A failing command is logged and counted; playback continues with the
    /// next one. Every command is returned, with `applied_successfully` and
    /// `spawned_entity` filled in.
    pub fn apply(&mut self, world: &mut World) -> Vec<Command> {
        let mut commands = std::mem::take(&mut self.commands);
        self.next_index = 0;

        let conflict_count = log_conflicts(&commands);

        let mut success_count = 0;
        let mut failed_count = 0;
        for cmd in &mut commands {
            match apply_one(world, cmd) {
                Ok(()) => {
                    cmd.applied_successfully = true;
                    success_count += 1;
                }
                Err(e) => {
                    failed_count += 1;
                    warn!(
                        command_index = cmd.command_index,
                        target = ?cmd.target,
                        error = %e,
                        "command application failed"
                    );
                }
            }
        }

        self.last_apply_report = ApplyReport {
            conflict_count,
            failed_count,
            success_count,
        };
        commands
    }

    fn push(&mut self, target: Option<Entity>, kind: CommandKind) {
        let command_index = self.next_index;
        self.next_index += 1;
        self.commands.push(Command {
            target,
            kind,
            command_index,
            spawned_entity: None,
            applied_successfully: false,
        });
    }
}

fn encode<T: Component>(
    registry: &ComponentRegistry,
    value: &T,
) -> Result<(String, serde_json::Value), EcsError> {
    let name = registry.info_of::<T>()?.name.clone();
    let json = serde_json::to_value(value).map_err(|e| EcsError::ComponentSerialization {
        component: name.clone(),
        details: e.to_string(),
    })?;
    Ok((name, json))
}

fn log_conflicts(commands: &[Command]) -> usize {
    let mut seen: HashMap<(Entity, &str), Vec<u32>> = HashMap::new();
    for cmd in commands {
        if let (Some(target), Some(name)) = (cmd.target, cmd.kind.component_name()) {
            seen.entry((target, name)).or_default().push(cmd.command_index);
        }
    }

    let mut conflict_count = 0;
    for ((entity, component), indices) in &seen {
        if indices.len() > 1 {
            conflict_count += 1;
            warn!(
                entity = ?entity,
                component = %component,
                command_indices = ?indices,
                "{} commands target the same entity and component (last write wins)",
                indices.len()
            );
        }
    }
    conflict_count
}

fn apply_one(world: &mut World, cmd: &mut Command) -> Result<(), EcsError> {
    let target = cmd.target.unwrap_or(Entity::NULL);
    match &cmd.kind {
        CommandKind::Spawn {
            archetype,
            components,
        } => {
            let entity = world.spawn(*archetype)?;
            cmd.spawned_entity = Some(entity);
            // The entity exists from here on; a bad component below fails
            // the command but does not roll the spawn back.
            for (name, value) in components {
                world.add_component_json(entity, name, value)?;
            }
            Ok(())
        }
        CommandKind::AddComponent {
            component_name,
            value,
        } => world.add_component_json(target, component_name, value),
        CommandKind::SetComponent {
            component_name,
            value,
        } => world.set_component_json(target, component_name, value),
        CommandKind::RemoveComponent { component_name } => {
            world.remove_component_by_name(target, component_name).map(|_| ())
        }
        CommandKind::Despawn => world.despawn(target),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
