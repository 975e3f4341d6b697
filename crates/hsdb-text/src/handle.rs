//! Shared, swappable reference to a built index.
use std::sync::{Arc, RwLock};

use hsdb_core::error::{Error, Result};
use hsdb_core::types::{Collection, CollectionKind};

use crate::NgramIndex;

/// Readers clone an `Arc` to the current index and query it lock-free.
/// A rebuild constructs the replacement off to the side and swaps it in,
/// so a query sees either the old or the new index, never a mix.
#[derive(Debug)]
pub struct IndexHandle {
	kind: CollectionKind,
	current: RwLock<Option<Arc<NgramIndex>>>,
}

impl IndexHandle {
	/// A handle with nothing built yet; queries fail until [`rebuild`](Self::rebuild).
	pub fn unbuilt(kind: CollectionKind) -> Self { Self { kind, current: RwLock::new(None) } }

	pub fn build(collection: impl Into<Arc<Collection>>) -> Self {
		let index = NgramIndex::build(collection);
		let handle = Self::unbuilt(index.kind());
		handle.install(index);
		handle
	}

	pub fn kind(&self) -> CollectionKind { self.kind }

	pub fn current(&self) -> Result<Arc<NgramIndex>> {
		let guard = self.current.read().map_err(|_| Error::IndexUnavailable(format!("{} index lock poisoned", self.kind)))?;
		guard.clone().ok_or_else(|| Error::IndexUnavailable(format!("{} index is not built", self.kind)))
	}

	pub fn is_ready(&self) -> bool { self.current().is_ok() }

	/// Build from `collection` without holding the lock, then swap.
	pub fn rebuild(&self, collection: impl Into<Arc<Collection>>) -> Arc<NgramIndex> {
		self.install(NgramIndex::build(collection))
	}

	/// Withdraw the index, e.g. while its collection is being reloaded.
	pub fn invalidate(&self) {
		match self.current.write() {
			Ok(mut guard) => *guard = None,
			Err(poisoned) => *poisoned.into_inner() = None,
		}
	}

	fn install(&self, index: NgramIndex) -> Arc<NgramIndex> {
		let index = Arc::new(index);
		match self.current.write() {
			Ok(mut guard) => *guard = Some(index.clone()),
			Err(poisoned) => *poisoned.into_inner() = Some(index.clone()),
		}
		index
	}
}
