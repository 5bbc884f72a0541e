use std::sync::Arc;
use std::thread;

use crate::{DuplicatePolicy, Modifier, ModifierDefinition, ModifierId, ModifierRegistry, RegisterError};

/// Context is the set of tags already on the target; output collects applied ids.
type Ctx = Vec<&'static str>;
type Out = Vec<String>;

struct Tag {
	id: ModifierId,
	requires: Option<&'static str>,
	version: u32,
}

impl Tag {
	fn new(id: &str) -> Self {
		Self {
			id: ModifierId::from(id),
			requires: None,
			version: 1,
		}
	}
}

impl ModifierDefinition<Ctx, Out> for Tag {
	fn id(&self) -> &ModifierId {
		&self.id
	}

	fn can_apply(&self, ctx: &Ctx) -> bool {
		self.requires.is_none_or(|req| ctx.contains(&req))
	}

	fn apply(&self, _ctx: &Ctx, data: Option<&str>, output: &mut Out) {
		output.push(format!("{}@{}:{}", self.id, self.version, data.unwrap_or("")));
	}
}

fn tag(id: &str) -> Modifier<Ctx, Out> {
	Modifier::new(Tag::new(id))
}

#[test]
fn test_lookup_by_id() {
	let registry = ModifierRegistry::new("test");
	registry.register(tag("paint.red")).expect("register red");
	registry.register(tag("paint.blue")).expect("register blue");

	assert_eq!(registry.len(), 2);
	assert!(registry.contains("paint.red"));
	assert_eq!(registry.get("paint.blue").map(|m| m.id().clone()), Some(ModifierId::from("paint.blue")));
	assert!(registry.get("paint.green").is_none());
}

#[test]
fn test_first_wins_rejects_duplicate() {
	let registry = ModifierRegistry::new("test");
	registry.register(tag("glow")).expect("first registration");

	let err = registry.register(tag("glow")).unwrap_err();
	match err {
		RegisterError::Duplicate { label, id } => {
			assert_eq!(label, "test");
			assert_eq!(id.as_str(), "glow");
		}
	}
	assert_eq!(registry.len(), 1);
}

#[test]
fn test_last_wins_replaces_but_old_handles_survive() {
	let registry = ModifierRegistry::with_policy("test", DuplicatePolicy::LastWins);
	registry.register(tag("glow")).expect("v1");
	let old = registry.get("glow").expect("glow present");

	let mut v2 = Tag::new("glow");
	v2.version = 2;
	registry.register(Modifier::new(v2)).expect("v2 replaces");

	let mut out = Vec::new();
	old.apply(&Vec::new(), None, &mut out);
	registry.get("glow").expect("glow present").apply(&Vec::new(), Some("x"), &mut out);
	assert_eq!(out, vec!["glow@1:".to_string(), "glow@2:x".to_string()]);
}

#[test]
fn test_handles_compare_by_id() {
	let a = tag("same");
	let b = tag("same");
	assert_eq!(a, b);
	assert_ne!(a, tag("other"));
}

#[test]
fn test_can_apply_sees_context() {
	let mut gloss = Tag::new("gloss");
	gloss.requires = Some("paint");
	let gloss = Modifier::new(gloss);

	assert!(!gloss.can_apply(&vec![]));
	assert!(gloss.can_apply(&vec!["paint"]));
}

#[test]
fn test_unregister_removes_entry() {
	let registry = ModifierRegistry::new("test");
	registry.register(tag("a")).expect("register a");
	assert!(registry.unregister("a").is_some());
	assert!(registry.unregister("a").is_none());
	assert!(registry.is_empty());
}

#[test]
fn test_concurrent_registration_loses_nothing() {
	let registry = Arc::new(ModifierRegistry::new("test"));
	let handles: Vec<_> = (0..8)
		.map(|t| {
			let registry = registry.clone();
			thread::spawn(move || {
				for i in 0..32 {
					registry
						.register(tag(&format!("m{t}.{i}")))
						.expect("unique ids never collide");
				}
			})
		})
		.collect();
	for handle in handles {
		handle.join().expect("registration thread panicked");
	}
	assert_eq!(registry.len(), 8 * 32);
}

#[test]
fn test_id_serializes_as_plain_string() {
	let id = ModifierId::from("paint.red");
	let json = serde_json::to_string(&id).expect("serialize id");
	assert_eq!(json, "\"paint.red\"");
	let back: ModifierId = serde_json::from_str(&json).expect("deserialize id");
	assert_eq!(back, id);
}

#[test]
fn test_all_is_sorted() {
	let registry = ModifierRegistry::new("test");
	registry
		.register_all([tag("c"), tag("a"), tag("b")])
		.expect("register all");
	let ids: Vec<_> = registry.all().iter().map(|m| m.id().to_string()).collect();
	assert_eq!(ids, ["a", "b", "c"]);
}
