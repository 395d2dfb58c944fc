//! Loading, sharing and releasing assets against a real install on disk

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Fixture, Manager, name, outcome, pump};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use strata_client_storage::file_system::file_system_path;
use strata_client_storage::{CheckVersionListResult, StorageEvent};
use strata_crypto::ResourceHash;
use strata_formats::version_list::{PackageResource, PackageVersionList, UpdatableResource, UpdatableVersionList};
use strata_formats::{LoadType, ResourceName, ResourcePayload};
use strata_loader::{
    BinaryLocation, HasAssetResult, LoadEvent, LoadStatus, LoaderError, ReadSource,
};

fn package_resource(name: &ResourceName, load_type: LoadType, plain: &[u8]) -> PackageResource {
    PackageResource::new(name.clone(), load_type, plain.len() as u32, ResourceHash::of(plain))
}

fn asset_of(event: &LoadEvent<String>) -> Arc<String> {
    match event {
        LoadEvent::AssetSuccess { asset, .. } => Arc::clone(asset),
        other => panic!("expected success, got {other:?}"),
    }
}

fn rejected_status(result: strata_loader::Result<u64>) -> LoadStatus {
    result.unwrap_err().status().unwrap()
}

/// `hero/mesh` depends on `ui/atlas`; both loose and loaded from file
fn hero_install(fixture: &Fixture) -> Manager {
    let ui = name("ui");
    let hero = name("hero");
    fixture.ship(&ui, LoadType::LoadFromFile, b"ui atlas");
    fixture.ship(&hero, LoadType::LoadFromFile, b"hero mesh");
    let list = PackageVersionList::builder("1.0.0", 1)
        .resource(package_resource(&ui, LoadType::LoadFromFile, b"ui atlas"))
        .resource(package_resource(&hero, LoadType::LoadFromFile, b"hero mesh"))
        .asset(&ui, "ui/atlas", &[])
        .asset(&hero, "hero/mesh", &["ui/atlas"])
        .build()
        .unwrap();
    fixture.package(&list)
}

#[test]
fn concurrent_requests_share_one_pooled_asset() {
    let fixture = Fixture::new();
    let mut manager = hero_install(&fixture);

    let first = manager.load_asset("ui/atlas", 0).unwrap();
    let second = manager.load_asset("ui/atlas", 0).unwrap();
    assert_ne!(first, second);

    let events = pump(&mut manager, second);
    let a = asset_of(outcome(&events, first));
    let b = asset_of(outcome(&events, second));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(*a, "ui/atlas@ui atlas");

    let loader = manager.loader();
    assert_eq!(loader.asset_spawn_count("ui/atlas"), Some(2));
    assert_eq!(loader.resource_spawn_count(&name("ui")), Some(1));
    // The container was read once
    assert_eq!(fixture.log.borrow().reads.len(), 1);
    assert_eq!(
        fixture.log.borrow().reads[0],
        ReadSource::File(fixture.read_only.join("ui.dat"))
    );
}

#[test]
fn dependency_is_loaded_first_and_counted() {
    let fixture = Fixture::new();
    let mut manager = hero_install(&fixture);

    let ticket = manager.load_asset("hero/mesh", 0).unwrap();
    let events = pump(&mut manager, ticket);
    assert_eq!(*asset_of(outcome(&events, ticket)), "hero/mesh@hero mesh");
    assert!(events.iter().any(|e| matches!(
        e,
        LoadEvent::DependencyLoaded { dependency_asset_name, loaded_count: 1, total_count: 1, .. }
            if dependency_asset_name == "ui/atlas"
    )));
    assert_eq!(fixture.log.borrow().extracted, vec!["ui/atlas", "hero/mesh"]);

    let loader = manager.loader();
    assert_eq!(loader.asset_spawn_count("hero/mesh"), Some(1));
    assert_eq!(loader.asset_spawn_count("ui/atlas"), Some(1));
    assert_eq!(loader.asset_dependency_count("ui/atlas"), Some(1));
    assert_eq!(loader.resource_dependency_count(&name("ui")), Some(1));
    assert_eq!(loader.resource_dependency_count(&name("hero")), Some(0));
}

#[test]
fn dependent_blocks_release_until_it_is_released() {
    let fixture = Fixture::new();
    let mut manager = hero_install(&fixture);
    let ticket = manager.load_asset("hero/mesh", 0).unwrap();
    pump(&mut manager, ticket);

    manager.unload_asset("hero/mesh").unwrap();
    let loader = manager.loader_mut();
    assert_eq!(loader.asset_spawn_count("hero/mesh"), Some(0));
    assert_eq!(loader.asset_spawn_count("ui/atlas"), Some(0));

    // Nothing holds the atlas, but the mesh still depends on it
    assert!(!loader.try_release_asset("ui/atlas").unwrap());
    assert!(!loader.try_release_resource(&name("ui")).unwrap());

    assert!(loader.try_release_asset("hero/mesh").unwrap());
    assert_eq!(loader.asset_dependency_count("ui/atlas"), Some(0));
    assert!(loader.try_release_asset("ui/atlas").unwrap());
    assert!(!loader.try_release_resource(&name("ui")).unwrap());
    assert!(loader.try_release_resource(&name("hero")).unwrap());
    assert!(loader.try_release_resource(&name("ui")).unwrap());
    assert_eq!(loader.asset_count(), 0);
    assert_eq!(loader.resource_count(), 0);

    let log = fixture.log.borrow();
    assert_eq!(
        log.released_assets,
        vec!["hero/mesh@hero mesh", "ui/atlas@ui atlas"]
    );
    assert_eq!(log.released_containers, vec!["hero mesh", "ui atlas"]);
}

#[test]
fn release_all_unused_cascades_through_dependencies() {
    let fixture = Fixture::new();
    let mut manager = hero_install(&fixture);
    let ticket = manager.load_asset("hero/mesh", 0).unwrap();
    pump(&mut manager, ticket);

    // Still held: nothing goes
    assert_eq!(manager.release_all_unused().unwrap(), 0);

    manager.unload_asset("hero/mesh").unwrap();
    assert_eq!(manager.release_all_unused().unwrap(), 4);
    assert_eq!(manager.loader().asset_count(), 0);
    assert_eq!(manager.loader().resource_count(), 0);
    assert_eq!(fixture.log.borrow().released_containers.len(), 2);
}

#[test]
fn released_asset_is_loaded_again_from_disk() {
    let fixture = Fixture::new();
    let mut manager = hero_install(&fixture);
    let ticket = manager.load_asset("ui/atlas", 0).unwrap();
    pump(&mut manager, ticket);
    manager.unload_asset("ui/atlas").unwrap();
    manager.release_all_unused().unwrap();

    let ticket = manager.load_asset("ui/atlas", 0).unwrap();
    let events = pump(&mut manager, ticket);
    assert_eq!(*asset_of(outcome(&events, ticket)), "ui/atlas@ui atlas");
    assert_eq!(fixture.log.borrow().reads.len(), 2);
}

#[test]
fn unload_requires_a_holder() {
    let fixture = Fixture::new();
    let mut manager = hero_install(&fixture);
    assert!(matches!(
        manager.unload_asset("ui/atlas"),
        Err(LoaderError::InvalidState(_))
    ));

    let ticket = manager.load_asset("ui/atlas", 0).unwrap();
    pump(&mut manager, ticket);
    manager.unload_asset("ui/atlas").unwrap();
    assert!(matches!(
        manager.unload_asset("ui/atlas"),
        Err(LoaderError::InvalidState(_))
    ));
}

#[test]
fn requests_are_rejected_before_queueing() {
    let fixture = Fixture::new();
    let a = name("a");
    let b = name("b");
    let c = name("c");
    let movie = name("movie");
    for (n, text) in [(&a, "a"), (&b, "b"), (&c, "c")] {
        fixture.ship(n, LoadType::LoadFromFile, text.as_bytes());
    }
    fixture.ship(&movie, LoadType::LoadFromBinary, b"frames");
    let list = PackageVersionList::builder("1.0.0", 1)
        .resource(package_resource(&a, LoadType::LoadFromFile, b"a"))
        .resource(package_resource(&b, LoadType::LoadFromFile, b"b"))
        .resource(package_resource(&c, LoadType::LoadFromFile, b"c"))
        .resource(package_resource(&movie, LoadType::LoadFromBinary, b"frames"))
        .asset(&a, "a/x", &["b/x"])
        .asset(&b, "b/x", &["a/x"])
        .asset(&c, "c/x", &["movie/intro.bin"])
        .asset(&movie, "movie/intro.bin", &[])
        .build()
        .unwrap();
    let mut manager = fixture.package(&list);

    assert_eq!(rejected_status(manager.load_asset("missing", 0)), LoadStatus::NotExist);
    assert_eq!(rejected_status(manager.load_asset("a/x", 0)), LoadStatus::DependencyError);
    assert_eq!(rejected_status(manager.load_asset("movie/intro.bin", 0)), LoadStatus::TypeError);
    assert_eq!(rejected_status(manager.load_asset("c/x", 0)), LoadStatus::DependencyError);

    let message = manager.load_asset("a/x", 0).unwrap_err().to_string();
    assert!(message.contains("circular dependency"), "{message}");

    assert_eq!(manager.loader().waiting_task_count(), 0);
    manager.update(Duration::from_millis(16)).unwrap();
    assert!(manager.poll_load_event().is_none());
}

#[test]
fn broken_dependency_fails_the_parent_and_drops_its_siblings() {
    let fixture = Fixture::new();
    let ui = name("ui");
    let fx = name("fx");
    let hero = name("hero");
    fixture.ship(&ui, LoadType::LoadFromFile, b"ui atlas");
    fixture.ship(&fx, LoadType::LoadFromFile, b"sparks");
    fixture.ship(&hero, LoadType::LoadFromFile, b"hero mesh");
    let list = PackageVersionList::builder("1.0.0", 1)
        .resource(package_resource(&ui, LoadType::LoadFromFile, b"ui atlas"))
        .resource(package_resource(&fx, LoadType::LoadFromFile, b"sparks"))
        .resource(package_resource(&hero, LoadType::LoadFromFile, b"hero mesh"))
        .asset(&ui, "ui/atlas", &[])
        .asset(&fx, "fx/spark", &[])
        .asset(&hero, "hero/mesh", &["ui/atlas", "fx/spark"])
        .build()
        .unwrap();
    let mut manager = fixture.package(&list);
    fixture.log.borrow_mut().broken.insert("fx/spark".to_string());

    let ticket = manager.load_asset("hero/mesh", 0).unwrap();
    let events = pump(&mut manager, ticket);
    match outcome(&events, ticket) {
        LoadEvent::Failure { asset_name, status, message, .. } => {
            assert_eq!(asset_name, "hero/mesh");
            assert_eq!(*status, LoadStatus::DependencyError);
            assert!(message.contains("fx/spark"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // Exactly one final event for the ticket
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let loader = manager.loader();
    assert_eq!(loader.asset_spawn_count("ui/atlas"), Some(0));
    assert_eq!(loader.asset_spawn_count("fx/spark"), None);
    assert_eq!(loader.asset_spawn_count("hero/mesh"), None);
    assert_eq!(loader.resource_spawn_count(&fx), Some(0));
}

#[test]
fn broken_asset_reports_asset_error() {
    let fixture = Fixture::new();
    let mut manager = hero_install(&fixture);
    fixture.log.borrow_mut().broken.insert("ui/atlas".to_string());

    let ticket = manager.load_asset("ui/atlas", 3).unwrap();
    let events = pump(&mut manager, ticket);
    assert!(matches!(
        outcome(&events, ticket),
        LoadEvent::Failure { status: LoadStatus::AssetError, .. }
    ));
    assert_eq!(manager.loader().asset_spawn_count("ui/atlas"), None);
    assert_eq!(manager.loader().resource_spawn_count(&name("ui")), Some(0));
    assert_eq!(manager.loader().free_agent_count(), 3);
}

#[test]
fn memory_resource_is_decrypted_before_parsing() {
    let fixture = Fixture::new();
    let hero = name("hero");
    let plain = b"hero mesh with a long enough body to cross keys".repeat(8);
    fixture.ship_in("chars", &hero, LoadType::LoadFromMemoryAndDecrypt, &plain);
    let list = PackageVersionList::builder("1.0.0", 1)
        .resource(package_resource(&hero, LoadType::LoadFromMemoryAndDecrypt, &plain))
        .asset(&hero, "hero/mesh", &[])
        .file_system("chars", &hero)
        .build()
        .unwrap();
    let mut manager = fixture.package(&list);
    assert_eq!(manager.has_asset("hero/mesh"), HasAssetResult::AssetOnFileSystem);

    let ticket = manager.load_asset("hero/mesh", 0).unwrap();
    let events = pump(&mut manager, ticket);
    let expected = format!("hero/mesh@{}", String::from_utf8(plain.clone()).unwrap());
    assert_eq!(*asset_of(outcome(&events, ticket)), expected);

    let log = fixture.log.borrow();
    assert_eq!(log.parsed, vec![plain.clone()]);
    match &log.reads[0] {
        ReadSource::FileSystem { path, entry, length, .. } => {
            assert_eq!(*path, file_system_path(&fixture.read_only, "chars"));
            assert_eq!(entry, "hero.dat");
            assert_eq!(*length as usize, plain.len());
        }
        other => panic!("expected a file system read, got {other:?}"),
    }
}

#[test]
fn binaries_are_read_and_decrypted_directly() {
    let fixture = Fixture::new();
    let movie = name("movie");
    let voice = name("voice");
    let ui = name("ui");
    let movie_plain: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
    let voice_plain: Vec<u8> = (0..600u32).map(|i| (i * 7 % 256) as u8).collect();
    fixture.ship(&movie, LoadType::LoadFromBinaryAndQuickDecrypt, &movie_plain);
    fixture.ship_in("audio", &voice, LoadType::LoadFromBinaryAndDecrypt, &voice_plain);
    fixture.ship(&ui, LoadType::LoadFromFile, b"ui atlas");
    let list = PackageVersionList::builder("1.0.0", 1)
        .resource(package_resource(&movie, LoadType::LoadFromBinaryAndQuickDecrypt, &movie_plain))
        .resource(package_resource(&voice, LoadType::LoadFromBinaryAndDecrypt, &voice_plain))
        .resource(package_resource(&ui, LoadType::LoadFromFile, b"ui atlas"))
        .asset(&movie, "movie/intro.bin", &[])
        .asset(&voice, "voice/line.bin", &[])
        .asset(&ui, "ui/atlas", &[])
        .file_system("audio", &voice)
        .build()
        .unwrap();
    let mut manager = fixture.package(&list);

    assert_eq!(manager.has_asset("movie/intro.bin"), HasAssetResult::BinaryOnDisk);
    assert_eq!(manager.has_asset("voice/line.bin"), HasAssetResult::BinaryOnFileSystem);
    assert_eq!(manager.has_asset("ui/atlas"), HasAssetResult::AssetOnDisk);
    assert_eq!(manager.has_asset("nothing"), HasAssetResult::NotExist);

    assert_eq!(manager.load_binary("movie/intro.bin").unwrap(), movie_plain);
    assert_eq!(manager.load_binary("voice/line.bin").unwrap(), voice_plain);
    assert_eq!(
        manager.load_binary_from_file_system("voice/line.bin").unwrap(),
        voice_plain
    );
    assert_eq!(
        manager
            .load_binary_segment_from_file_system("voice/line.bin", 200, 100)
            .unwrap(),
        voice_plain[200..300]
    );
    // Clamped to the entry
    assert_eq!(
        manager
            .load_binary_segment_from_file_system("voice/line.bin", 550, 100)
            .unwrap(),
        voice_plain[550..]
    );

    assert_eq!(
        manager.binary_path("movie/intro.bin").unwrap(),
        BinaryLocation::File(fixture.read_only.join("movie.dat"))
    );
    assert_eq!(
        manager.binary_path("voice/line.bin").unwrap(),
        BinaryLocation::FileSystem {
            path: file_system_path(&fixture.read_only, "audio"),
            entry: "voice.dat".to_string(),
        }
    );
    assert_eq!(manager.binary_length("movie/intro.bin").unwrap(), 600);

    let status = |result: strata_loader::Result<Vec<u8>>| result.unwrap_err().status().unwrap();
    assert_eq!(status(manager.load_binary("ui/atlas")), LoadStatus::TypeError);
    assert_eq!(
        status(manager.load_binary_from_file_system("movie/intro.bin")),
        LoadStatus::TypeError
    );
    assert_eq!(status(manager.load_binary("nothing")), LoadStatus::NotExist);
}

#[test]
fn scene_holds_its_dependencies_until_unloaded() {
    let fixture = Fixture::new();
    let ui = name("ui");
    let level = name("level");
    fixture.ship(&ui, LoadType::LoadFromFile, b"ui atlas");
    fixture.ship(&level, LoadType::LoadFromFile, b"level one");
    let list = PackageVersionList::builder("1.0.0", 1)
        .resource(package_resource(&ui, LoadType::LoadFromFile, b"ui atlas"))
        .resource(package_resource(&level, LoadType::LoadFromFile, b"level one"))
        .asset(&ui, "ui/atlas", &[])
        .asset(&level, "level/one", &["ui/atlas"])
        .build()
        .unwrap();
    let mut manager = fixture.package(&list);

    let ticket = manager.load_scene("level/one", 0).unwrap();
    assert!(matches!(
        manager.load_scene("level/one", 0),
        Err(LoaderError::InvalidState(_))
    ));
    let events = pump(&mut manager, ticket);
    assert!(matches!(
        outcome(&events, ticket),
        LoadEvent::SceneSuccess { scene_asset_name, .. } if scene_asset_name == "level/one"
    ));
    assert!(manager.loader().is_scene_loaded("level/one"));
    assert_eq!(manager.loader().asset_spawn_count("ui/atlas"), Some(1));
    assert_eq!(manager.loader().resource_spawn_count(&level), Some(1));
    assert!(matches!(
        manager.load_scene("level/one", 0),
        Err(LoaderError::InvalidState(_))
    ));

    manager.unload_scene("level/one").unwrap();
    assert!(!manager.loader().is_scene_loaded("level/one"));
    assert_eq!(manager.loader().asset_spawn_count("ui/atlas"), Some(0));
    assert_eq!(manager.loader().resource_spawn_count(&level), Some(0));
    assert_eq!(fixture.log.borrow().unloaded_scenes, vec!["level/one"]);
    assert!(matches!(
        manager.unload_scene("level/one"),
        Err(LoaderError::InvalidState(_))
    ));
}

fn tick_until(manager: &mut Manager, done: impl Fn(&StorageEvent) -> bool) -> Vec<StorageEvent> {
    let mut seen = Vec::new();
    for _ in 0..64 {
        manager.update(Duration::from_millis(16)).unwrap();
        while let Some(event) = manager.poll_storage_event() {
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }
    panic!("condition not reached; events: {seen:#?}");
}

#[test]
fn asset_becomes_loadable_once_its_resource_is_updated() {
    let fixture = Fixture::new();
    let ui = name("ui");
    let plain = b"downloaded atlas".to_vec();
    let payload = ResourcePayload::encode(LoadType::LoadFromFile, &plain, false).unwrap();
    let manifest = UpdatableVersionList::builder("1.0.0", 1)
        .resource(UpdatableResource::new(
            ui.clone(),
            LoadType::LoadFromFile,
            payload.length,
            payload.hash,
            payload.compressed_length,
            payload.compressed_hash,
        ))
        .asset(&ui, "ui/atlas", &[])
        .build()
        .unwrap();
    let pointer = fixture.publish_manifest(&manifest);
    fixture.publish_resource(&ui, &payload);

    let mut manager = fixture.manager(&strata_loader::LoaderConfig::new());
    assert_eq!(
        manager.check_version_list(&pointer).unwrap(),
        CheckVersionListResult::NeedUpdate
    );
    manager.update_version_list(&pointer).unwrap();
    tick_until(&mut manager, |e| matches!(e, StorageEvent::VersionListUpdateSuccess { .. }));
    manager.check_resources().unwrap();
    tick_until(&mut manager, |e| matches!(e, StorageEvent::CheckComplete(_)));
    assert!(manager.is_checked());

    assert_eq!(manager.has_asset("ui/atlas"), HasAssetResult::NotReady);
    assert_eq!(rejected_status(manager.load_asset("ui/atlas", 0)), LoadStatus::NotReady);

    manager.update_resources("").unwrap();
    tick_until(&mut manager, |e| matches!(e, StorageEvent::UpdateAllComplete));
    assert_eq!(manager.has_asset("ui/atlas"), HasAssetResult::AssetOnDisk);

    let ticket = manager.load_asset("ui/atlas", 0).unwrap();
    let events = pump(&mut manager, ticket);
    assert_eq!(*asset_of(outcome(&events, ticket)), "ui/atlas@downloaded atlas");
    assert_eq!(
        fixture.log.borrow().reads[0],
        ReadSource::File(fixture.read_write.join("ui.dat"))
    );
}

#[test]
fn binaries_are_not_located_before_their_resource_is_ready() {
    let fixture = Fixture::new();
    let movie = name("movie");
    let plain = b"intro frames".repeat(8);
    let payload = ResourcePayload::encode(LoadType::LoadFromBinary, &plain, false).unwrap();
    let manifest = UpdatableVersionList::builder("1.0.0", 1)
        .resource(UpdatableResource::new(
            movie.clone(),
            LoadType::LoadFromBinary,
            payload.length,
            payload.hash,
            payload.compressed_length,
            payload.compressed_hash,
        ))
        .asset(&movie, "movie/intro.bin", &[])
        .build()
        .unwrap();
    let pointer = fixture.publish_manifest(&manifest);

    let mut manager = fixture.manager(&strata_loader::LoaderConfig::new());
    manager.update_version_list(&pointer).unwrap();
    tick_until(&mut manager, |e| matches!(e, StorageEvent::VersionListUpdateSuccess { .. }));
    manager.check_resources().unwrap();
    tick_until(&mut manager, |e| matches!(e, StorageEvent::CheckComplete(_)));

    assert_eq!(manager.has_asset("movie/intro.bin"), HasAssetResult::NotReady);
    let path = manager.binary_path("movie/intro.bin").unwrap_err();
    assert_eq!(path.status(), Some(LoadStatus::NotReady));
    let length = manager.binary_length("movie/intro.bin").unwrap_err();
    assert_eq!(length.status(), Some(LoadStatus::NotReady));
    assert!(!fixture.read_write.join("movie.dat").exists());
}
