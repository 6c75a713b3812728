use crate::types::{Keyword, UI};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OnceCell, SetError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub sop_instance_uid: UI,
	pub tag: Keyword,
}

impl CacheKey {
	pub fn new(sop_instance_uid: impl Into<UI>, tag: impl Into<Keyword>) -> Self {
		Self {
			sop_instance_uid: sop_instance_uid.into(),
			tag: tag.into(),
		}
	}
}

/// Memoizes direct URLs per `(SOPInstanceUID, tag)`.
///
/// Each key owns a [`OnceCell`], so that concurrent resolutions of the same attribute share a
/// single retrieval: the first caller initializes the cell while the others wait for it. If the
/// initialization fails, the cell stays empty and the next waiter takes over.
#[derive(Debug, Default)]
pub struct DirectUrlCache {
	entries: Mutex<HashMap<CacheKey, Arc<OnceCell<String>>>>,
}

impl DirectUrlCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the URL if the attribute has been resolved already.
	pub fn get(&self, key: &CacheKey) -> Option<String> {
		self.lock().get(key).and_then(|cell| cell.get().cloned())
	}

	/// Returns the cell for `key`, creating an empty one if necessary.
	pub fn entry(&self, key: CacheKey) -> Arc<OnceCell<String>> {
		Arc::clone(self.lock().entry(key).or_default())
	}

	/// Stores `url` unless another caller resolved the attribute first, and returns the winner.
	pub fn insert(&self, key: CacheKey, url: String) -> String {
		let cell = self.entry(key);
		match cell.set(url) {
			// A retrieval of the same attribute is in flight and will populate the cell
			Err(SetError::InitializingError(url)) => url,
			Ok(()) | Err(SetError::AlreadyInitializedError(_)) => cell
				.get()
				.cloned()
				.expect("cell should be initialized"),
		}
	}

	/// Drops all entries of an instance. Returns the number of resolved URLs that were dropped.
	///
	/// Object URLs handed out earlier remain valid; revoking them is up to the allocator's owner.
	pub fn forget_instance(&self, sop_instance_uid: &str) -> usize {
		let mut entries = self.lock();
		let mut resolved = 0;
		entries.retain(|key, cell| {
			let keep = key.sop_instance_uid != sop_instance_uid;
			if !keep && cell.initialized() {
				resolved += 1;
			}
			keep
		});
		resolved
	}

	pub fn clear(&self) {
		self.lock().clear();
	}

	/// Number of resolved URLs.
	pub fn len(&self) -> usize {
		self.lock()
			.values()
			.filter(|cell| cell.initialized())
			.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<OnceCell<String>>>> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
