//! Snapshot round trips and lossy loads.

mod common;

use std::sync::Arc;

use lamina_overlay::{
	DataRecord, LoadReport, OverlaySnapshot, PersistError, Role, SNAPSHOT_VERSION, SetRecord,
};
use lamina_registry::ModifierId;
use pretty_assertions::assert_eq;

use common::{Recorder, house_store, ids, modifier};

fn key(path: &str) -> String {
	path.to_owned()
}

fn populated() -> lamina_overlay::OverlayStore<common::House> {
	let store = house_store(Role::Authority, Arc::new(Recorder::default()));
	let red = modifier(&store, "paint/red");
	let blue = modifier(&store, "paint/blue");
	let varnish = modifier(&store, "varnish");

	store.add_modifier(&key("house/wall-1"), &red, Some("#110000".into())).expect("wall-1");
	store.add_modifier(&key("house/wall-1"), &varnish, None).expect("wall-1 varnish");
	store.add_modifier(&key("house/wall-2"), &red, Some("#220000".into())).expect("wall-2");
	store.add_modifier(&key("house/wall-2"), &varnish, None).expect("wall-2 varnish");
	store.add_modifier(&key("house/roof"), &blue, None).expect("roof");
	store
}

#[test]
fn test_round_trip_preserves_sets_and_data() {
	let source = populated();
	let snapshot = source.snapshot();
	assert_eq!(snapshot.version, SNAPSHOT_VERSION);
	assert_eq!(snapshot.sets.len(), 2, "walls share one canonical set");

	let bytes = snapshot.to_bytes().expect("encode");
	let decoded = OverlaySnapshot::<String>::from_bytes(&bytes).expect("decode");

	let target = house_store(Role::Authority, Arc::new(Recorder::default()));
	let report = target.load(decoded).expect("load");
	assert_eq!(
		report,
		LoadReport {
			keys: 3,
			sets: 2,
			data_entries: 3,
			dropped_keys: 0,
			dropped_data: 0,
		}
	);

	for path in ["house/wall-1", "house/wall-2", "house/roof"] {
		let k = key(path);
		assert_eq!(ids(&target.get_modifiers(&k)), ids(&source.get_modifiers(&k)), "{path}");
		for id in ["paint/red", "paint/blue", "varnish"] {
			let id = ModifierId::from(id);
			assert_eq!(target.get_data(&k, &id), source.get_data(&k, &id), "{path} {id}");
		}
	}
	assert!(
		target
			.get_modifiers(&key("house/wall-1"))
			.ptr_eq(&target.get_modifiers(&key("house/wall-2")))
	);
}

#[test]
fn test_json_round_trip_and_attach() {
	let source = populated();
	let json = source.snapshot().to_json().expect("encode json");

	let target = house_store(Role::Authority, Arc::new(Recorder::default()));
	target
		.load(OverlaySnapshot::from_json(&json).expect("decode json"))
		.expect("load");
	assert!(target.topology().finish("house/roof").is_none());

	// Three stored keys plus the window and door below the walls.
	assert_eq!(target.attach(), 5);
	let roof = target.topology().finish("house/roof").expect("roof recomputed");
	assert_eq!(roof.color.as_deref(), Some("#0000ff"));
}

#[test]
fn test_load_drops_what_no_longer_resolves() {
	let store = house_store(Role::Authority, Arc::new(Recorder::default()));
	let snapshot = OverlaySnapshot {
		version: SNAPSHOT_VERSION,
		sets: vec![
			SetRecord {
				modifiers: vec![ModifierId::from("paint/red")],
				keys: vec![key("house/wall-1"), key("barn")],
			},
			SetRecord {
				modifiers: vec![ModifierId::from("paint/red"), ModifierId::from("glitter")],
				keys: vec![key("house/wall-2"), key("house/roof")],
			},
		],
		data: vec![
			DataRecord {
				modifier: ModifierId::from("paint/red"),
				entries: vec![
					(key("house/wall-1"), "#abcdef".into()),
					(key("house/wall-1/window-0"), "#abcdef".into()),
					(key("barn"), "#abcdef".into()),
				],
			},
			DataRecord {
				modifier: ModifierId::from("glitter"),
				entries: vec![(key("house/wall-2"), "sparkle".into())],
			},
		],
	};

	let report = store.load(snapshot).expect("lossy load still succeeds");
	assert_eq!(
		report,
		LoadReport {
			keys: 1,
			sets: 1,
			data_entries: 1,
			dropped_keys: 3,
			dropped_data: 3,
		}
	);
	assert_eq!(store.keys(), [key("house/wall-1")]);
	assert_eq!(
		store.get_data(&key("house/wall-1"), &ModifierId::from("paint/red")).as_deref(),
		Some("#abcdef")
	);
}

#[test]
fn test_load_drops_malformed_data() {
	let store = house_store(Role::Authority, Arc::new(Recorder::default()));
	let snapshot = OverlaySnapshot {
		version: SNAPSHOT_VERSION,
		sets: vec![SetRecord {
			modifiers: vec![ModifierId::from("paint/blue")],
			keys: vec![key("house/roof")],
		}],
		data: vec![DataRecord {
			modifier: ModifierId::from("paint/blue"),
			entries: vec![(key("house/roof"), "navy".into())],
		}],
	};

	let report = store.load(snapshot).expect("load");
	assert_eq!(report.keys, 1);
	assert_eq!(report.dropped_data, 1);
	assert_eq!(store.get_data(&key("house/roof"), &ModifierId::from("paint/blue")), None);
}

#[test]
fn test_load_replaces_existing_contents() {
	let store = populated();
	let report = store.load(OverlaySnapshot::default()).expect("load empty");
	assert_eq!(report, LoadReport::default());
	assert!(store.keys().is_empty());
}

#[test]
fn test_unknown_version_is_refused() {
	let store = populated();
	let snapshot = OverlaySnapshot::<String> {
		version: SNAPSHOT_VERSION + 1,
		..Default::default()
	};

	let err = store.load(snapshot).unwrap_err();
	assert!(matches!(err, PersistError::UnsupportedVersion { found: 2, expected: 1 }));
	assert_eq!(store.keys().len(), 3, "a refused load keeps the old state");
}

#[test]
fn test_snapshot_to_file() {
	let store = populated();
	let dir = tempfile::tempdir().expect("temp dir");
	let path = dir.path().join("overlay.bin");

	std::fs::write(&path, store.snapshot().to_bytes().expect("encode")).expect("write");
	let bytes = std::fs::read(&path).expect("read");
	let restored = OverlaySnapshot::<String>::from_bytes(&bytes).expect("decode");
	assert_eq!(restored, store.snapshot());
}
