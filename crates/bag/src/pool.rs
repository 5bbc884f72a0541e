//! Intern table and buffer reuse for [`InterningBag`].
//!
//! # Role
//!
//! Owns the sharded table that maps content hashes to weak references of
//! canonical bags. Candidates are built without any lock held; only the probe
//! and install step contends on a single shard.

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::{FxBuildHasher, FxHashMap};
use serde::Deserialize;
use smallvec::SmallVec;

use crate::bag::{BagInner, InterningBag};

/// Tuning knobs for a [`BagPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
	/// Number of intern table shards. Rounded up to a power of two.
	pub shards: usize,
	/// Maximum number of spare candidate buffers kept for reuse.
	pub reuse_capacity: usize,
	/// Sweep dead table entries after this many installs. Zero disables
	/// opportunistic sweeping.
	pub sweep_every: usize,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			shards: 16,
			reuse_capacity: 64,
			sweep_every: 256,
		}
	}
}

/// Point-in-time counters for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
	/// Live non-empty canonical bags.
	pub canonical: usize,
	/// Table entries whose bag has been dropped but not yet swept.
	pub dead: usize,
	/// Spare buffers waiting in the reuse pool.
	pub reusable_buffers: usize,
	/// Shard count.
	pub shards: usize,
}

type Bucket<T> = SmallVec<[Weak<BagInner<T>>; 1]>;

pub(crate) struct Shared<T> {
	shards: Box<[Mutex<FxHashMap<u64, Bucket<T>>>]>,
	reuse: Mutex<Vec<Vec<T>>>,
	reuse_capacity: usize,
	sweep_every: usize,
	installs: AtomicUsize,
	pub(crate) empty: Arc<BagInner<T>>,
}

/// Canonicalizing factory for [`InterningBag`]s.
///
/// Cloning a pool is cheap and yields a handle to the same table. Bags remember
/// the pool that produced them, so `with`/`without` need no pool argument.
pub struct BagPool<T> {
	shared: Arc<Shared<T>>,
}

impl<T> Clone for BagPool<T> {
	fn clone(&self) -> Self {
		Self {
			shared: self.shared.clone(),
		}
	}
}

impl<T: Eq + Hash + Clone> Default for BagPool<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> std::fmt::Debug for BagPool<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BagPool")
			.field("shards", &self.shared.shards.len())
			.finish_non_exhaustive()
	}
}

impl<T: Eq + Hash + Clone> BagPool<T> {
	/// Creates a pool with default tuning.
	pub fn new() -> Self {
		Self::with_config(PoolConfig::default())
	}

	/// Creates a pool with the given tuning.
	pub fn with_config(config: PoolConfig) -> Self {
		let shard_count = config.shards.max(1).next_power_of_two();
		let shards = (0..shard_count)
			.map(|_| Mutex::new(FxHashMap::default()))
			.collect::<Vec<_>>()
			.into_boxed_slice();
		Self {
			shared: Arc::new(Shared {
				shards,
				reuse: Mutex::new(Vec::new()),
				reuse_capacity: config.reuse_capacity,
				sweep_every: config.sweep_every,
				installs: AtomicUsize::new(0),
				empty: Arc::new(BagInner::new(Box::default(), content_hash::<T>(&[]))),
			}),
		}
	}

	/// Returns the shared empty bag.
	pub fn empty(&self) -> InterningBag<T> {
		InterningBag::from_parts(self.shared.empty.clone(), self.shared.clone())
	}

	/// Returns the canonical bag holding the distinct elements of `elements`.
	pub fn of<I>(&self, elements: I) -> InterningBag<T>
	where
		I: IntoIterator<Item = T>,
	{
		let iter = elements.into_iter();
		let mut buf = self.shared.take_buffer(iter.size_hint().0);
		for element in iter {
			if !buf.contains(&element) {
				buf.push(element);
			}
		}
		self.shared.intern(buf)
	}

	/// Returns a bag with the same contents that is canonical in this pool.
	///
	/// Bags produced by this pool are returned as-is.
	pub fn adopt(&self, bag: &InterningBag<T>) -> InterningBag<T> {
		if bag.is_from(&self.shared) {
			return bag.clone();
		}
		self.of(bag.iter().cloned())
	}

	/// Returns true if `bag` was produced by this pool.
	pub fn owns(&self, bag: &InterningBag<T>) -> bool {
		bag.is_from(&self.shared)
	}

	/// Drops table entries whose bag is no longer referenced.
	///
	/// Returns the number of entries removed.
	pub fn purge(&self) -> usize {
		self.shared.purge()
	}

	/// Returns current table and reuse counters.
	pub fn stats(&self) -> PoolStats {
		let mut stats = PoolStats {
			shards: self.shared.shards.len(),
			reusable_buffers: self.shared.reuse.lock().len(),
			..PoolStats::default()
		};
		for shard in self.shared.shards.iter() {
			for weak in shard.lock().values().flatten() {
				if weak.strong_count() > 0 {
					stats.canonical += 1;
				} else {
					stats.dead += 1;
				}
			}
		}
		stats
	}
}

impl<T: Eq + Hash + Clone> Shared<T> {
	pub(crate) fn take_buffer(&self, capacity: usize) -> Vec<T> {
		match self.reuse.lock().pop() {
			Some(mut buf) => {
				buf.reserve(capacity);
				buf
			}
			None => Vec::with_capacity(capacity),
		}
	}

	fn recycle(&self, mut buf: Vec<T>) {
		buf.clear();
		let mut reuse = self.reuse.lock();
		if reuse.len() < self.reuse_capacity {
			reuse.push(buf);
		}
	}

	/// Canonicalizes a duplicate-free candidate buffer.
	pub(crate) fn intern(self: &Arc<Self>, candidate: Vec<T>) -> InterningBag<T> {
		if candidate.is_empty() {
			self.recycle(candidate);
			return InterningBag::from_parts(self.empty.clone(), self.clone());
		}

		let hash = content_hash(&candidate);
		let shard = &self.shards[hash as usize & (self.shards.len() - 1)];
		let mut table = shard.lock();
		let bucket = table.entry(hash).or_default();
		bucket.retain(|weak| weak.strong_count() > 0);

		let existing = bucket
			.iter()
			.filter_map(Weak::upgrade)
			.find(|inner| same_elements(inner.items(), &candidate));
		if let Some(existing) = existing {
			drop(table);
			self.recycle(candidate);
			return InterningBag::from_parts(existing, self.clone());
		}

		// Installed instances are shared from here on and must never grow.
		let inner = Arc::new(BagInner::new(candidate.into_boxed_slice(), hash));
		bucket.push(Arc::downgrade(&inner));
		drop(table);

		let installs = self.installs.fetch_add(1, Ordering::Relaxed) + 1;
		if self.sweep_every > 0 && installs % self.sweep_every == 0 {
			self.purge();
		}

		InterningBag::from_parts(inner, self.clone())
	}

	fn purge(&self) -> usize {
		let mut removed = 0;
		for shard in self.shards.iter() {
			let mut table = shard.lock();
			table.retain(|_, bucket| {
				let before = bucket.len();
				bucket.retain(|weak| weak.strong_count() > 0);
				removed += before - bucket.len();
				!bucket.is_empty()
			});
		}
		removed
	}
}

/// Order-independent content hash.
pub(crate) fn content_hash<T: Hash>(items: &[T]) -> u64 {
	let sum = items
		.iter()
		.fold(0u64, |acc, item| acc.wrapping_add(mix(FxBuildHasher.hash_one(item))));
	sum ^ (items.len() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn mix(mut h: u64) -> u64 {
	h ^= h >> 33;
	h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
	h ^= h >> 33;
	h
}

/// Both slices are duplicate-free.
fn same_elements<T: Eq>(a: &[T], b: &[T]) -> bool {
	a.len() == b.len() && a.iter().all(|item| b.contains(item))
}
