//! localStorage synchronisation.
//!
//! Every mutation goes through [`StorageSync`], which tracks known and deleted keys and decides
//! whether a flush has anything new to tell the server. The deleted set and the live map never
//! share a key: a removed key is otherwise indistinguishable from one that was never set.

use crate::error::Error;
use core::cell::RefCell;
use hashbrown::HashSet;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, instrument, trace};

/// Live key/value snapshot, sorted so equal contents hash equally.
pub type Snapshot = BTreeMap<String, String>;

/// Direct access to the browser's key/value store.
pub trait StorageAdapter {
	fn snapshot(&self) -> Snapshot;
	fn get(&self, key: &str) -> Option<String>;

	/// # Errors
	///
	/// When the store refuses the write, e.g. because its quota is exhausted.
	fn set(&self, key: &str, value: &str) -> Result<(), Error>;

	fn remove(&self, key: &str);
	fn clear(&self);
}

/// In-process store, for non-browser hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryStorage(RefCell<Snapshot>);

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
		Self(RefCell::new(entries.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect()))
	}
}

impl StorageAdapter for MemoryStorage {
	fn snapshot(&self) -> Snapshot {
		self.0.borrow().clone()
	}

	fn get(&self, key: &str) -> Option<String> {
		self.0.borrow().get(key).cloned()
	}

	fn set(&self, key: &str, value: &str) -> Result<(), Error> {
		self.0.borrow_mut().insert(key.to_owned(), value.to_owned());
		Ok(())
	}

	fn remove(&self, key: &str) {
		self.0.borrow_mut().remove(key);
	}

	fn clear(&self) {
		self.0.borrow_mut().clear();
	}
}

/// `_metadata` of a sync payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncMetadata {
	pub timestamp: f64,
	pub previous_timestamp: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub force_refresh: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub deleted_keys: Option<Vec<String>>,
}

/// Body posted to the current page URL on flush.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncPayload {
	#[serde(rename = "_local_storage")]
	pub local_storage: Snapshot,
	#[serde(rename = "_metadata")]
	pub metadata: SyncMetadata,
}

/// A storage change made by another page, as reported by the native change signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalChange {
	/// `None` when the other page cleared the store.
	pub key: Option<String>,
	pub new_value: Option<String>,
}

#[derive(Debug)]
struct SyncState {
	known: HashSet<String>,
	deleted: HashSet<String>,
	last_hash: Option<String>,
	last_sync: f64,
}

pub struct StorageSync<S> {
	store: S,
	state: RefCell<SyncState>,
}

/// Content hash of a snapshot.
pub fn hash_snapshot(snapshot: &Snapshot) -> String {
	let json = serde_json::to_string(snapshot).unwrap_or_default();
	let mut hasher = Sha256::new();
	hasher.update(json.as_bytes());
	format!("{:x}", hasher.finalize())
}

fn sorted(keys: &HashSet<String>) -> Vec<String> {
	let mut keys: Vec<_> = keys.iter().cloned().collect();
	keys.sort_unstable();
	keys
}

impl<S: StorageAdapter> StorageSync<S> {
	/// `now` becomes the previous timestamp of the first flush.
	pub fn new(store: S, now: f64) -> Self {
		let known = store.snapshot().into_iter().map(|(key, _)| key).collect();
		Self {
			store,
			state: RefCell::new(SyncState {
				known,
				deleted: HashSet::new(),
				last_hash: None,
				last_sync: now,
			}),
		}
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	pub fn snapshot(&self) -> Snapshot {
		self.store.snapshot()
	}

	/// Sorted keys removed since the last successful flush.
	pub fn deleted_keys(&self) -> Vec<String> {
		sorted(&self.state.borrow().deleted)
	}

	pub fn is_known(&self, key: &str) -> bool {
		self.state.borrow().known.contains(key)
	}

	/// # Errors
	///
	/// If the store rejected the write; the tracking sets are left unchanged then.
	#[instrument(skip(self, value))]
	pub fn set(&self, key: &str, value: &str) -> Result<(), Error> {
		if cfg!(feature = "dangerous-logging") {
			trace!(value, "Storing value.");
		}
		self.store.set(key, value)?;
		let mut state = self.state.borrow_mut();
		state.known.insert(key.to_owned());
		state.deleted.remove(key);
		Ok(())
	}

	/// Removing an absent key records nothing.
	#[instrument(skip(self))]
	pub fn remove(&self, key: &str) {
		if self.store.get(key).is_some() {
			let mut state = self.state.borrow_mut();
			state.deleted.insert(key.to_owned());
			state.known.remove(key);
		}
		self.store.remove(key);
	}

	#[instrument(skip(self))]
	pub fn clear(&self) {
		let keys = self.store.snapshot();
		{
			let mut state = self.state.borrow_mut();
			state.deleted.extend(keys.into_iter().map(|(key, _)| key));
			state.known.clear();
		}
		self.store.clear();
	}

	/// Applies a server-sent value: strings are stored verbatim, other JSON as its text, `None` deletes.
	///
	/// # Errors
	///
	/// See [`StorageSync::set`].
	pub fn apply_server_value(&self, key: &str, value: Option<&Value>) -> Result<(), Error> {
		match value {
			None | Some(Value::Null) => {
				self.remove(key);
				Ok(())
			}
			Some(Value::String(text)) => self.set(key, text),
			Some(other) => self.set(key, &other.to_string()),
		}
	}

	/// Tracks a change another page already made to the shared store.
	#[instrument(skip(self))]
	pub fn observe_external(&self, change: &ExternalChange) {
		let mut state = self.state.borrow_mut();
		match (&change.key, &change.new_value) {
			(None, _) => {
				let live = self.store.snapshot();
				state.known = live.keys().cloned().collect();
				state.deleted.retain(|key| !live.contains_key(key));
			}
			(Some(key), None) => {
				state.known.remove(key);
				state.deleted.insert(key.clone());
			}
			(Some(key), Some(_)) => {
				state.known.insert(key.clone());
				state.deleted.remove(key);
			}
		}
	}

	/// Builds the next flush payload, or `None` if the content is unchanged and `force` is off.
	///
	/// The hash is taken from the map at call time, so mutations scheduled in the same tick coalesce.
	#[instrument(skip(self))]
	pub fn prepare_flush(&self, force: bool, now: f64) -> Option<SyncPayload> {
		let snapshot = self.store.snapshot();
		let hash = hash_snapshot(&snapshot);
		let mut state = self.state.borrow_mut();
		if !force && state.last_hash.as_deref() == Some(hash.as_str()) {
			trace!("Storage unchanged since last flush.");
			return None;
		}
		state.last_hash = Some(hash);

		let deleted = sorted(&state.deleted);
		let payload = SyncPayload {
			local_storage: snapshot,
			metadata: SyncMetadata {
				timestamp: now,
				previous_timestamp: state.last_sync,
				force_refresh: Some(force),
				deleted_keys: if deleted.is_empty() { None } else { Some(deleted) },
			},
		};
		state.last_sync = now;
		debug!(keys = payload.local_storage.len(), force, "Prepared storage flush.");
		Some(payload)
	}

	/// The unload payload always carries the deleted keys and never consults the hash.
	pub fn prepare_unload(&self, now: f64) -> SyncPayload {
		let state = self.state.borrow();
		SyncPayload {
			local_storage: self.store.snapshot(),
			metadata: SyncMetadata {
				timestamp: now,
				previous_timestamp: state.last_sync,
				force_refresh: None,
				deleted_keys: Some(sorted(&state.deleted)),
			},
		}
	}

	/// Metadata sent along with a page navigation. Doesn't count as a flush.
	pub fn navigation_metadata(&self, now: f64) -> SyncMetadata {
		let state = self.state.borrow();
		let deleted = sorted(&state.deleted);
		SyncMetadata {
			timestamp: now,
			previous_timestamp: state.last_sync,
			force_refresh: None,
			deleted_keys: if deleted.is_empty() { None } else { Some(deleted) },
		}
	}

	/// Forgets deletions the server has now seen.
	pub fn acknowledge(&self, payload: &SyncPayload) {
		if let Some(sent) = &payload.metadata.deleted_keys {
			let mut state = self.state.borrow_mut();
			for key in sent {
				state.deleted.remove(key);
			}
		}
	}

	/// Makes the next unforced flush go through, e.g. after a failed one.
	pub fn invalidate(&self) {
		self.state.borrow_mut().last_hash = None;
	}
}
