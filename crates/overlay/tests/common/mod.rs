//! Common fixtures for overlay integration tests.
//!
//! Targets are slash-separated paths such as `house/wall-1/window-0`; a path's
//! parent is everything before its last slash.

#![allow(dead_code)]

use std::sync::Arc;

use lamina_bag::InterningBag;
use lamina_overlay::{
	ModifierBag, MutationCall, OverlayStore, PeerId, Rejection, Role, Topology, Transport,
};
use lamina_registry::{Modifier, ModifierDefinition, ModifierId, ModifierRegistry};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

/// Base state of a surface plus the paints already layered on it.
#[derive(Debug, Clone)]
pub struct Surface {
	pub path: String,
	pub paints: Vec<ModifierId>,
}

/// Resolved look of a surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Finish {
	pub color: Option<String>,
	pub coats: Vec<String>,
}

pub type Mod = Modifier<Surface, Finish>;

#[derive(Default)]
pub struct House {
	paths: Mutex<FxHashSet<String>>,
	pub finishes: Mutex<FxHashMap<String, Finish>>,
}

impl House {
	pub fn new<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
		let house = Self::default();
		house.paths.lock().extend(paths.into_iter().map(str::to_owned));
		house
	}

	pub fn demolish(&self, path: &str) {
		self.paths.lock().retain(|p| p != path && !p.starts_with(&format!("{path}/")));
	}

	pub fn finish(&self, path: &str) -> Option<Finish> {
		self.finishes.lock().get(path).cloned()
	}
}

impl Topology for House {
	type Key = String;
	type PersistedKey = String;
	type Context = Surface;
	type Output = Finish;

	fn try_get_parent(&self, key: &String) -> Option<String> {
		key.rsplit_once('/').map(|(parent, _)| parent.to_owned())
	}

	fn get_children(&self, key: &String, out: &mut Vec<String>) {
		let paths = self.paths.lock();
		out.extend(
			paths
				.iter()
				.filter(|p| p.rsplit_once('/').is_some_and(|(parent, _)| parent == key))
				.cloned(),
		);
	}

	fn try_create_context(&self, key: &String, modifiers: &InterningBag<Mod>) -> Option<Surface> {
		if !self.paths.lock().contains(key) {
			return None;
		}
		Some(Surface {
			path: key.clone(),
			paints: modifiers
				.iter()
				.filter(|m| m.id().as_str().starts_with("paint/"))
				.map(|m| m.id().clone())
				.collect(),
		})
	}

	fn create_output(&self, _key: &String, _ctx: &Surface) -> Finish {
		Finish::default()
	}

	fn apply_output(&self, key: &String, _ctx: &Surface, output: Finish) {
		self.finishes.lock().insert(key.clone(), output);
	}

	fn persist_key(&self, key: &String) -> String {
		key.clone()
	}

	fn resolve_key(&self, key: &String) -> Option<String> {
		self.paths.lock().contains(key).then(|| key.clone())
	}
}

/// A solid color. Adding one paint replaces any other.
pub struct Paint {
	id: ModifierId,
	default_color: &'static str,
}

impl ModifierDefinition<Surface, Finish> for Paint {
	fn id(&self) -> &ModifierId {
		&self.id
	}

	fn can_apply(&self, _ctx: &Surface) -> bool {
		true
	}

	fn should_evict(&self, other: &Mod) -> bool {
		other.id() != &self.id && other.id().as_str().starts_with("paint/")
	}

	fn create_data(&self, _ctx: &Surface) -> Option<String> {
		Some(self.default_color.to_owned())
	}

	fn validate_data(&self, data: &str) -> bool {
		data.starts_with('#') && data.len() == 7
	}

	fn apply(&self, _ctx: &Surface, data: Option<&str>, output: &mut Finish) {
		output.color = Some(data.unwrap_or(self.default_color).to_owned());
	}
}

/// Clear coat; only sticks to painted surfaces.
pub struct Varnish;

impl ModifierDefinition<Surface, Finish> for Varnish {
	fn id(&self) -> &ModifierId {
		static ID: std::sync::OnceLock<ModifierId> = std::sync::OnceLock::new();
		ID.get_or_init(|| ModifierId::from("varnish"))
	}

	fn can_apply(&self, ctx: &Surface) -> bool {
		!ctx.paints.is_empty()
	}

	fn apply(&self, _ctx: &Surface, _data: Option<&str>, output: &mut Finish) {
		output.coats.push("varnish".to_owned());
	}
}

/// Strips paint off; needs paint to work on.
pub struct Stripper;

impl ModifierDefinition<Surface, Finish> for Stripper {
	fn id(&self) -> &ModifierId {
		static ID: std::sync::OnceLock<ModifierId> = std::sync::OnceLock::new();
		ID.get_or_init(|| ModifierId::from("stripper"))
	}

	fn can_apply(&self, ctx: &Surface) -> bool {
		!ctx.paints.is_empty()
	}

	fn should_evict(&self, other: &Mod) -> bool {
		other.id().as_str().starts_with("paint/")
	}

	fn apply(&self, _ctx: &Surface, _data: Option<&str>, output: &mut Finish) {
		output.color = None;
	}
}

pub fn registry() -> Arc<ModifierRegistry<Surface, Finish>> {
	let registry = ModifierRegistry::new("house");
	registry
		.register_all([
			Modifier::new(Paint {
				id: ModifierId::from("paint/red"),
				default_color: "#ff0000",
			}),
			Modifier::new(Paint {
				id: ModifierId::from("paint/blue"),
				default_color: "#0000ff",
			}),
			Modifier::new(Varnish),
			Modifier::new(Stripper),
		])
		.expect("register house modifiers");
	Arc::new(registry)
}

pub const PATHS: [&str; 6] = [
	"house",
	"house/wall-1",
	"house/wall-1/window-0",
	"house/wall-2",
	"house/wall-2/door",
	"house/roof",
];

/// Peer that mirrors built by [`house_store`] follow.
pub const AUTHORITY: PeerId = PeerId(0);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn house_store(role: Role, transport: Arc<Recorder>) -> OverlayStore<House> {
	init_tracing();
	OverlayStore::builder(House::new(PATHS), registry())
		.role(role)
		.authority(AUTHORITY)
		.transport(transport)
		.trust(Arc::new(|peer: PeerId, key: &String| peer == PeerId(1) || key.starts_with("house/roof")))
		.build()
}

pub fn modifier(store: &OverlayStore<House>, id: &str) -> Mod {
	store.registry().get(id).expect("modifier registered")
}

pub fn ids(set: &ModifierBag<House>) -> Vec<String> {
	let mut out: Vec<String> = set.iter().map(|m| m.id().to_string()).collect();
	out.sort();
	out
}

/// Transport that remembers what it was asked to do.
#[derive(Default)]
pub struct Recorder {
	pub broadcasts: Mutex<Vec<(MutationCall<String>, Option<PeerId>)>>,
	pub rejections: Mutex<Vec<(PeerId, MutationCall<String>, Rejection)>>,
}

impl Transport<String> for Recorder {
	fn broadcast(&self, call: &MutationCall<String>, except: Option<PeerId>) {
		self.broadcasts.lock().push((call.clone(), except));
	}

	fn reject(&self, peer: PeerId, call: &MutationCall<String>, reason: &Rejection) {
		self.rejections
			.lock()
			.push((peer, call.clone(), reason.clone()));
	}
}
