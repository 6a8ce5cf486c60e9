use crate::{error::Error, names};
use futures::future::LocalBoxFuture;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
	pub status: u16,
	pub content_type: Option<String>,
	pub body: String,
}

impl HttpResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Declared JSON, or a body that looks like a JSON object.
	pub fn looks_like_json(&self) -> bool {
		if self.declares_json() {
			return true;
		}
		let body = self.body.trim();
		body.starts_with('{') && body.ends_with('}')
	}

	pub fn declares_json(&self) -> bool {
		self.content_type.as_deref().map_or(false, |content_type| content_type.contains(names::JSON))
	}
}

pub type Headers = Vec<(String, String)>;

/// One POST round trip. No retries, no cancellation.
pub trait Transport {
	fn post<'a>(&'a self, url: &'a str, headers: Headers, body: String) -> LocalBoxFuture<'a, Result<HttpResponse, Error>>;

	/// Completes before returning. Only used while the page is unloading.
	///
	/// # Errors
	///
	/// On network failure.
	fn post_blocking(&self, url: &str, headers: Headers, body: String) -> Result<HttpResponse, Error>;
}
