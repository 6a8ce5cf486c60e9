use crate::{
	error::Error,
	storage::{Snapshot, StorageAdapter},
};
use tracing::error;
use web_sys::{Storage, Window};

/// `window.localStorage`.
pub struct WebStorage(Storage);

impl WebStorage {
	/// # Errors
	///
	/// If the page may not use local storage.
	pub fn local(window: &Window) -> Result<Self, Error> {
		window
			.local_storage()?
			.map(Self)
			.ok_or_else(|| Error::Storage("localStorage is unavailable".to_owned()))
	}

	pub fn is(&self, other: &Storage) -> bool {
		&self.0 == other
	}
}

impl StorageAdapter for WebStorage {
	fn snapshot(&self) -> Snapshot {
		let length = self.0.length().unwrap_or_default();
		(0..length)
			.filter_map(|index| self.0.key(index).ok().flatten())
			.filter_map(|key| self.get(&key).map(|value| (key, value)))
			.collect()
	}

	fn get(&self, key: &str) -> Option<String> {
		self.0.get_item(key).ok().flatten()
	}

	fn set(&self, key: &str, value: &str) -> Result<(), Error> {
		self.0.set_item(key, value).map_err(|error| Error::Storage(format!("{:?}", error)))
	}

	fn remove(&self, key: &str) {
		if let Err(error) = self.0.remove_item(key) {
			error!("Failed to remove storage item: {:?}", error);
		}
	}

	fn clear(&self) {
		if let Err(error) = self.0.clear() {
			error!("Failed to clear storage: {:?}", error);
		}
	}
}
