use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::pool::Shared;

pub(crate) struct BagInner<T> {
	items: Box<[T]>,
	hash: u64,
}

impl<T> BagInner<T> {
	pub(crate) fn new(items: Box<[T]>, hash: u64) -> Self {
		Self { items, hash }
	}

	pub(crate) fn items(&self) -> &[T] {
		&self.items
	}
}

/// Immutable, canonical, order-independent set.
///
/// Cloning is a reference count bump. Two bags from the same pool compare equal
/// exactly when they are the same allocation, which the pool guarantees is the
/// case exactly when their contents are equal.
///
/// Iteration yields elements in the insertion order of whichever candidate
/// first became canonical for this content; callers must not rely on it.
pub struct InterningBag<T> {
	inner: Arc<BagInner<T>>,
	pool: Arc<Shared<T>>,
}

impl<T> InterningBag<T> {
	pub(crate) fn from_parts(inner: Arc<BagInner<T>>, pool: Arc<Shared<T>>) -> Self {
		Self { inner, pool }
	}

	pub(crate) fn is_from(&self, pool: &Arc<Shared<T>>) -> bool {
		Arc::ptr_eq(&self.pool, pool)
	}

	/// Number of elements.
	#[inline]
	pub fn len(&self) -> usize {
		self.inner.items.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.inner.items.is_empty()
	}

	/// Returns the elements as a slice.
	#[inline]
	pub fn as_slice(&self) -> &[T] {
		&self.inner.items
	}

	pub fn iter(&self) -> Iter<'_, T> {
		Iter {
			inner: self.inner.items.iter(),
		}
	}

	/// Returns true if both handles point at the same canonical instance.
	#[inline]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Cached content hash.
	#[inline]
	pub fn content_hash(&self) -> u64 {
		self.inner.hash
	}
}

impl<T: Eq + Hash + Clone> InterningBag<T> {
	/// Returns true if `element` is in the bag.
	pub fn contains(&self, element: &T) -> bool {
		self.inner.items.contains(element)
	}

	/// Returns the canonical bag for `self ∪ {element}`.
	///
	/// Returns `self` unchanged when the element is already present.
	pub fn with(&self, element: &T) -> Self {
		if self.contains(element) {
			return self.clone();
		}
		let mut buf = self.pool.take_buffer(self.len() + 1);
		buf.extend_from_slice(&self.inner.items);
		buf.push(element.clone());
		self.pool.intern(buf)
	}

	/// Returns the canonical bag for `self \ {element}`.
	///
	/// Returns `self` unchanged when the element is absent, and the pool's empty
	/// bag when the last element is removed.
	pub fn without(&self, element: &T) -> Self {
		let Some(pos) = self.inner.items.iter().position(|item| item == element) else {
			return self.clone();
		};
		let mut buf = self.pool.take_buffer(self.len() - 1);
		buf.extend_from_slice(&self.inner.items[..pos]);
		buf.extend_from_slice(&self.inner.items[pos + 1..]);
		self.pool.intern(buf)
	}

	/// Removes every element matching `predicate` in one canonicalization.
	pub fn without_where<F>(&self, mut predicate: F) -> Self
	where
		F: FnMut(&T) -> bool,
	{
		if !self.inner.items.iter().any(&mut predicate) {
			return self.clone();
		}
		let mut buf = self.pool.take_buffer(self.len());
		buf.extend(self.inner.items.iter().filter(|item| !predicate(*item)).cloned());
		self.pool.intern(buf)
	}
}

impl<T> Clone for InterningBag<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
			pool: self.pool.clone(),
		}
	}
}

impl<T> PartialEq for InterningBag<T> {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

impl<T> Eq for InterningBag<T> {}

impl<T> Hash for InterningBag<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.inner.hash);
	}
}

impl<T: fmt::Debug> fmt::Debug for InterningBag<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.inner.items.iter()).finish()
	}
}

impl<'a, T> IntoIterator for &'a InterningBag<T> {
	type Item = &'a T;
	type IntoIter = Iter<'a, T>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

/// Borrowing iterator over an [`InterningBag`].
#[derive(Debug, Clone)]
pub struct Iter<'a, T> {
	inner: std::slice::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
	type Item = &'a T;

	#[inline]
	fn next(&mut self) -> Option<Self::Item> {
		self.inner.next()
	}

	#[inline]
	fn size_hint(&self) -> (usize, Option<usize>) {
		self.inner.size_hint()
	}
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
