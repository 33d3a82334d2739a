//! End-to-end tests: originator → durable write → broadcast → every mounted
//! store folds the patch, with the optimistic overlay on top.

use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};

use worldsync_core::{Character, CharacterPatch, Clock, World};
use worldsync_realtime::{
    default_handlers, InMemoryRepository, LocalTransport, NoPending, Originator, PubSub,
    SubmissionTracker, WorldChannel, WorldRepository, WorldStore, PATCH_EVENT,
};

async fn wait_until(check: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within timeout");
}

struct Fixture {
    repository: Arc<InMemoryRepository>,
    transport: Arc<LocalTransport>,
    originator: Originator,
    world: World,
}

fn fixture() -> Fixture {
    let mut world = World::new("Eldermoor");
    world.characters.push(Character::new("Rook"));
    world.characters.push(Character::new("Vex"));
    world.clocks.push(Clock::new("Ritual"));

    let repository = Arc::new(InMemoryRepository::new());
    repository.insert_world(world.clone());

    let transport = Arc::new(LocalTransport::new());
    let originator = Originator::new(repository.clone(), transport.clone());
    Fixture {
        repository,
        transport,
        originator,
        world,
    }
}

fn mount_viewer(fixture: &Fixture) -> Arc<WorldStore> {
    let channel = WorldChannel::new(fixture.transport.clone(), fixture.world.id);
    WorldStore::mount(channel, fixture.world.clone(), Arc::new(NoPending))
}

#[tokio::test]
async fn test_two_viewers_converge() {
    let fixture = fixture();
    let viewer_a = mount_viewer(&fixture);
    let viewer_b = mount_viewer(&fixture);
    let rook = fixture.world.characters[0].id;

    fixture
        .originator
        .update_character(
            rook,
            CharacterPatch {
                name: Some("Bishop".into()),
                ..CharacterPatch::default()
            },
        )
        .unwrap();

    wait_until(|| viewer_a.view().characters[0].name == "Bishop").await;
    wait_until(|| viewer_b.view().characters[0].name == "Bishop").await;
    assert_eq!(viewer_a.view(), viewer_b.view());
}

#[tokio::test]
async fn test_full_session_flow() {
    let fixture = fixture();
    let viewer = mount_viewer(&fixture);

    let added = fixture.originator.add_character(fixture.world.id).unwrap();
    fixture
        .originator
        .delete_character(fixture.world.characters[1].id)
        .unwrap();
    fixture.originator.rename_world(fixture.world.id, "Umbermarsh").unwrap();
    let clock = fixture.originator.add_clock(fixture.world.id).unwrap();
    fixture
        .originator
        .update_clock(
            clock.id,
            worldsync_core::ClockPatch {
                progress: Some(2),
                ..worldsync_core::ClockPatch::default()
            },
        )
        .unwrap();

    wait_until(|| {
        let view = viewer.view();
        view.name == "Umbermarsh"
            && view.characters.len() == 2
            && view.clock(clock.id).map(|c| c.progress) == Some(2)
    })
    .await;

    let view = viewer.view();
    assert!(view.character(added.id).is_some());
    assert!(view.character(fixture.world.characters[1].id).is_none());

    // The viewer's copy matches the system of record.
    assert_eq!(view, fixture.repository.world(fixture.world.id).unwrap());
}

#[tokio::test]
async fn test_worlds_are_isolated() {
    let fixture = fixture();
    let viewer = mount_viewer(&fixture);

    let mut other = World::new("Umbermarsh");
    other.characters.push(Character::new("Moth"));
    fixture.repository.insert_world(other.clone());
    let other_channel = WorldChannel::new(fixture.transport.clone(), other.id);
    let other_viewer = WorldStore::mount(other_channel, other.clone(), Arc::new(NoPending));

    fixture
        .originator
        .update_character(
            other.characters[0].id,
            CharacterPatch {
                name: Some("Lantern".into()),
                ..CharacterPatch::default()
            },
        )
        .unwrap();

    wait_until(|| other_viewer.view().characters[0].name == "Lantern").await;
    assert_eq!(viewer.view().characters[0].name, "Rook");
}

#[tokio::test]
async fn test_optimistic_overlay_until_confirmation() {
    let fixture = fixture();
    let rook = fixture.world.characters[0].id;

    let tracker = Arc::new(SubmissionTracker::new());
    let channel = WorldChannel::new(fixture.transport.clone(), fixture.world.id);
    let viewer = WorldStore::mount(channel, fixture.world.clone(), tracker.clone());

    // Local edit goes in flight: visible immediately, baseline untouched.
    let edit = CharacterPatch {
        name: Some("Bishop".into()),
        ..CharacterPatch::default()
    };
    tracker.begin_character(rook, edit.clone());
    assert_eq!(viewer.view().characters[0].name, "Bishop");
    assert_eq!(viewer.baseline().characters[0].name, "Rook");

    // Submission reaches the originator; authoritative broadcast folds in.
    fixture.originator.update_character(rook, edit).unwrap();
    wait_until(|| viewer.baseline().characters[0].name == "Bishop").await;

    // Tracker drops the entry; displayed value never flickers.
    assert_eq!(viewer.view().characters[0].name, "Bishop");
    tracker.complete_character(rook);
    assert_eq!(viewer.view().characters[0].name, "Bishop");
}

#[tokio::test]
async fn test_disconnected_viewer_catches_up_after_remount() {
    let fixture = fixture();
    let rook = fixture.world.characters[0].id;

    fixture.transport.set_connected(false);
    let channel = WorldChannel::new(fixture.transport.clone(), fixture.world.id);
    let viewer = WorldStore::mount(channel, fixture.world.clone(), Arc::new(NoPending));
    assert!(!viewer.is_live());

    // Mutation while the viewer is down: the write still lands.
    fixture
        .originator
        .update_character(
            rook,
            CharacterPatch {
                stress: Some(3),
                ..CharacterPatch::default()
            },
        )
        .unwrap();
    assert_eq!(viewer.view().characters[0].stress, 0);

    // Transport comes back; a fresh baseline is reloaded on remount.
    fixture.transport.set_connected(true);
    let fresh_baseline = fixture.repository.world(fixture.world.id).unwrap();
    let channel = WorldChannel::new(fixture.transport.clone(), fixture.world.id);
    let remounted = WorldStore::mount(channel, fresh_baseline, Arc::new(NoPending));
    assert!(remounted.is_live());
    assert_eq!(remounted.view().characters[0].stress, 3);

    // And live again for subsequent patches.
    fixture
        .originator
        .update_character(
            rook,
            CharacterPatch {
                stress: Some(4),
                ..CharacterPatch::default()
            },
        )
        .unwrap();
    wait_until(|| remounted.view().characters[0].stress == 4).await;
}

#[tokio::test]
async fn test_bad_sender_does_not_break_other_viewers() {
    let fixture = fixture();
    let viewer = mount_viewer(&fixture);
    let rook = fixture.world.characters[0].id;

    // A misbehaving publisher on the same scope.
    let scope = format!("world-{}", fixture.world.id);
    fixture
        .transport
        .publish(&scope, PATCH_EVENT, b"{\"characters\":{\"$shuffle\":[]}}")
        .unwrap();
    fixture.transport.publish(&scope, PATCH_EVENT, b"\xFF").unwrap();

    fixture
        .originator
        .update_character(
            rook,
            CharacterPatch {
                name: Some("Bishop".into()),
                ..CharacterPatch::default()
            },
        )
        .unwrap();

    wait_until(|| viewer.view().characters[0].name == "Bishop").await;
    // Baseline intact apart from the one valid patch.
    assert_eq!(viewer.view().characters.len(), 2);
}

#[tokio::test]
async fn test_dispatch_through_handler_table() {
    let fixture = fixture();
    let viewer = mount_viewer(&fixture);
    let handlers = default_handlers();

    handlers
        .dispatch(
            "rename-world",
            &fixture.originator,
            serde_json::json!({ "worldId": fixture.world.id, "name": "Umbermarsh" }),
        )
        .unwrap();

    wait_until(|| viewer.view().name == "Umbermarsh").await;
}

#[tokio::test]
async fn test_concurrent_edits_to_disjoint_characters() {
    let fixture = fixture();
    let viewer = mount_viewer(&fixture);
    let rook = fixture.world.characters[0].id;
    let vex = fixture.world.characters[1].id;

    // Two originating viewers editing different characters; any interleaving
    // converges to the same state.
    fixture
        .originator
        .update_character(
            rook,
            CharacterPatch {
                condition: Some("weary".into()),
                ..CharacterPatch::default()
            },
        )
        .unwrap();
    fixture
        .originator
        .update_character(
            vex,
            CharacterPatch {
                condition: Some("bleeding".into()),
                ..CharacterPatch::default()
            },
        )
        .unwrap();

    wait_until(|| {
        let view = viewer.view();
        view.character(rook).map(|c| c.condition.as_str()) == Some("weary")
            && view.character(vex).map(|c| c.condition.as_str()) == Some("bleeding")
    })
    .await;
    assert_eq!(
        viewer.view(),
        fixture.repository.world(fixture.world.id).unwrap()
    );
}

#[tokio::test]
async fn test_unmounted_viewer_is_discarded() {
    let fixture = fixture();
    let viewer = mount_viewer(&fixture);
    let rook = fixture.world.characters[0].id;

    viewer.unmount();
    sleep(Duration::from_millis(20)).await;

    fixture
        .originator
        .update_character(
            rook,
            CharacterPatch {
                name: Some("Bishop".into()),
                ..CharacterPatch::default()
            },
        )
        .unwrap();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(viewer.view().characters[0].name, "Rook");
}
