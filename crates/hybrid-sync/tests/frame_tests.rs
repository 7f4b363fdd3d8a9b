//! Whole-frame behaviour: buffers, sync directions and object lifetimes
//! across several frames.

use glam::Vec3;
use proptest::prelude::*;

use hybrid_ecs::command::CommandBuffer;
use hybrid_ecs::world::World;
use hybrid_sync::prelude::*;

const EPS: f32 = 1e-4;

fn new_loop() -> FrameLoop {
    FrameLoop::new(HybridWorld::new(&HybridConfig::default()).unwrap())
}

fn actor(
    frames: &FrameLoop,
    at: Vec3,
    state: SyncState,
    extra: Vec<Box<dyn EntitySupplier>>,
) -> EntityBehaviour {
    let mut suppliers: Vec<Box<dyn EntitySupplier>> = vec![
        Box::new(TransformSupplier::new(Transform::from_position(at))),
        Box::new(SyncStateSupplier::new(state)),
    ];
    suppliers.extend(extra);
    EntityBehaviour::new(frames.hybrid().world().registry(), suppliers).unwrap()
}

fn drift(world: &World, cmds: &mut CommandBuffer) {
    for entity in world.entities_with::<Position>() {
        if let Some(p) = world.get::<Position>(entity) {
            cmds.set(world.registry(), entity, &Position(p.0 + Vec3::X)).unwrap();
        }
    }
}

fn close(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPS
}

#[test]
fn transform_moves_show_up_in_the_next_frame() {
    let mut frames = new_loop();
    let mut obj = actor(&frames, Vec3::ZERO, SyncState::POSITION_TO_ENTITY, vec![]);
    let entity = obj.initialize(frames.hybrid_mut()).unwrap();

    frames.frame().unwrap();
    assert_eq!(obj.get::<Position>(frames.hybrid().world()), Some(&Position(Vec3::ZERO)));

    obj.transform_mut(frames.hybrid_mut().container_mut())
        .unwrap()
        .set_position(Vec3::new(4.0, 0.0, -1.0));
    let diag = frames.frame().unwrap();
    assert_eq!(diag.sync.position_to_entity, 1);
    assert_eq!(diag.sync.position_to_transform, 0);
    assert_eq!(
        frames.hybrid().world().get::<Position>(entity),
        Some(&Position(Vec3::new(4.0, 0.0, -1.0)))
    );
}

#[test]
fn position_offset_is_added_on_the_way_in() {
    let mut frames = new_loop();
    let mut obj = actor(
        &frames,
        Vec3::X,
        SyncState::POSITION_TO_ENTITY,
        vec![Box::new(ComponentSupplier::new(SyncPositionOffset(Vec3::Y)))],
    );
    obj.initialize(frames.hybrid_mut()).unwrap();

    frames.frame().unwrap();
    let p = obj.get::<Position>(frames.hybrid().world()).unwrap();
    assert!(close(p.0, Vec3::new(1.0, 1.0, 0.0)));
}

#[test]
fn simulation_results_flow_back_to_the_transform() {
    let mut frames = new_loop();
    frames.add_system("drift", drift).unwrap();
    let mut obj = actor(
        &frames,
        Vec3::ZERO,
        SyncState::POSITION_TO_ENTITY | SyncState::POSITION_TO_TRANSFORM,
        vec![],
    );
    obj.initialize(frames.hybrid_mut()).unwrap();

    frames.run_frames(3).unwrap();
    let t = obj.transform(frames.hybrid().container()).unwrap();
    assert!(close(t.position(), Vec3::new(3.0, 0.0, 0.0)));
    assert_eq!(frames.last_diagnostics().sync.position_to_transform, 1);
}

#[test]
fn dont_sync_one_frame_holds_for_exactly_one_frame() {
    let mut frames = new_loop();
    let mut obj = actor(
        &frames,
        Vec3::ZERO,
        SyncState::POSITION_TO_TRANSFORM,
        vec![Box::new(ComponentSupplier::new(Position(Vec3::new(5.0, 0.0, 0.0))))],
    );
    obj.initialize(frames.hybrid_mut()).unwrap();
    obj.skip_sync_one_frame(frames.hybrid_mut()).unwrap();

    let diag = frames.frame().unwrap();
    assert_eq!(diag.sync.position_to_transform, 0);
    assert_eq!(diag.sync_resets_queued, 1);
    assert!(obj.has::<DontSyncOneFrame>(frames.hybrid().world()));
    assert!(close(obj.transform(frames.hybrid().container()).unwrap().position(), Vec3::ZERO));

    let diag = frames.frame().unwrap();
    assert_eq!(diag.next_frame_commands, 1);
    assert_eq!(diag.sync.position_to_transform, 1);
    assert!(!obj.has::<DontSyncOneFrame>(frames.hybrid().world()));
    assert!(close(
        obj.transform(frames.hybrid().container()).unwrap().position(),
        Vec3::new(5.0, 0.0, 0.0)
    ));
}

#[test]
fn up_direction_turns_the_transform() {
    let mut frames = new_loop();
    let mut obj = actor(
        &frames,
        Vec3::ZERO,
        SyncState::empty(),
        vec![
            Box::new(ComponentSupplier::new(SyncUpToTransform)),
            Box::new(ComponentSupplier::new(UpDirection(Vec3::X))),
        ],
    );
    obj.initialize(frames.hybrid_mut()).unwrap();

    let diag = frames.frame().unwrap();
    assert_eq!(diag.sync.up_to_transform, 1);
    let t = obj.transform(frames.hybrid().container()).unwrap();
    assert!(close(t.up(), Vec3::X));
    assert!(close(t.forward(), Vec3::Z));
}

#[test]
fn world_position_wins_over_local_position() {
    let mut frames = new_loop();
    let mut obj = actor(
        &frames,
        Vec3::ZERO,
        SyncState::POSITION_TO_TRANSFORM,
        vec![
            Box::new(ComponentSupplier::new(Position(Vec3::new(0.0, 0.0, 9.0)))),
            Box::new(ComponentSupplier::new(SyncLocalPositionToTransform)),
            Box::new(ComponentSupplier::new(LocalPosition(Vec3::new(0.0, 3.0, 0.0)))),
        ],
    );
    obj.initialize(frames.hybrid_mut()).unwrap();

    let diag = frames.frame().unwrap();
    assert_eq!(diag.sync.local_position_to_transform, 1);
    assert_eq!(diag.sync.position_to_transform, 1);
    let t = obj.transform(frames.hybrid().container()).unwrap();
    assert!(close(t.position(), Vec3::new(0.0, 0.0, 9.0)));
}

#[test]
fn cleanup_despawns_at_the_next_frame_and_frees_the_slot() {
    let mut frames = new_loop();
    let mut first = actor(&frames, Vec3::X, SyncState::POSITION_TO_ENTITY, vec![]);
    let entity = first.initialize(frames.hybrid_mut()).unwrap();
    let slot = first.transform_slot().unwrap();
    frames.frame().unwrap();

    first.cleanup(frames.hybrid_mut()).unwrap();
    assert!(frames.hybrid().world().is_alive(entity));
    frames.frame().unwrap();
    assert!(!frames.hybrid().world().is_alive(entity));
    assert!(!frames.hybrid().container().is_live(slot));

    let mut second = actor(&frames, Vec3::Y, SyncState::POSITION_TO_ENTITY, vec![]);
    second.initialize(frames.hybrid_mut()).unwrap();
    let reused = second.transform_slot().unwrap();
    assert_eq!(reused.index(), slot.index());
    assert_ne!(reused.generation(), slot.generation());
    assert!(frames.hybrid().container().payload(slot).is_none());
}

#[test]
fn slots_of_despawned_entities_are_skipped() {
    let mut frames = new_loop();
    let mut obj = actor(&frames, Vec3::X, SyncState::POSITION_TO_ENTITY, vec![]);
    let entity = obj.initialize(frames.hybrid_mut()).unwrap();
    frames.frame().unwrap();

    frames.hybrid_mut().world_mut().despawn(entity).unwrap();
    let diag = frames.frame().unwrap();
    assert_eq!(diag.sync.position_to_entity, 0);
    assert_eq!(frames.hybrid().container().live_count(), 1);

    obj.cleanup(frames.hybrid_mut()).unwrap();
    assert!(!frames.hybrid().has_pending_commands());
}

#[test]
fn many_objects_sync_through_the_parallel_path() {
    let config = HybridConfig::from_json_str(
        r#"{"cache": {"verify_component_sets": true}, "container": {"min_parallel_len": 8}}"#,
    )
    .unwrap();
    let mut frames = FrameLoop::new(HybridWorld::new(&config).unwrap());

    let mut objects: Vec<EntityBehaviour> = (0..200)
        .map(|i| {
            let at = Vec3::new(i as f32, 0.0, 0.0);
            actor(&frames, at, SyncState::POSITION_TO_ENTITY, vec![])
        })
        .collect();
    for obj in &mut objects {
        obj.initialize(frames.hybrid_mut()).unwrap();
    }
    assert_eq!(frames.hybrid().cache().stats().misses, 1);
    assert_eq!(frames.hybrid().cache().stats().hits, 199);

    let diag = frames.frame().unwrap();
    assert_eq!(diag.sync.position_to_entity, 200);
    for (i, obj) in objects.iter().enumerate() {
        assert_eq!(
            obj.get::<Position>(frames.hybrid().world()),
            Some(&Position(Vec3::new(i as f32, 0.0, 0.0)))
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever sync state an object is authored with is what the world
    /// reports after the first frame.
    #[test]
    fn authored_sync_state_survives_the_first_frame(
        bits in prop::collection::vec(0u8..16, 1..12),
    ) {
        let mut frames = new_loop();
        let mut objects = Vec::new();
        for &b in &bits {
            let state = SyncState::from_bits_truncate(b);
            let mut obj = actor(&frames, Vec3::ZERO, state, vec![]);
            obj.initialize(frames.hybrid_mut()).unwrap();
            objects.push((state, obj));
        }

        frames.frame().unwrap();
        for (state, obj) in &objects {
            prop_assert_eq!(obj.pack_sync_state(frames.hybrid().world()), *state);
        }
    }
}
