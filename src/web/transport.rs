use crate::{
	error::Error,
	names,
	transport::{Headers, HttpResponse, Transport},
};
use futures::{future::LocalBoxFuture, FutureExt};
use tracing::{instrument, trace};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestCredentials, RequestInit, Response, Window, XmlHttpRequest};

fn network(error: JsValue) -> Error {
	Error::transport(None, format!("{:?}", error))
}

/// `fetch` for round trips, synchronous `XMLHttpRequest` for the unload flush.
pub struct FetchTransport {
	window: Window,
}

impl FetchTransport {
	pub fn new(window: Window) -> Self {
		Self { window }
	}

	async fn fetch(&self, url: &str, headers: Headers, body: String) -> Result<HttpResponse, Error> {
		let mut init = RequestInit::new();
		init.method("POST")
			.credentials(RequestCredentials::SameOrigin)
			.body(Some(&JsValue::from_str(&body)));
		let request = Request::new_with_str_and_init(url, &init)?;
		for (name, value) in &headers {
			request.headers().set(name, value)?;
		}

		let response: Response = JsFuture::from(self.window.fetch_with_request(&request))
			.await
			.map_err(network)?
			.dyn_into()?;
		let content_type = response.headers().get(names::HEADER_CONTENT_TYPE)?;
		let body = JsFuture::from(response.text()?).await.map_err(network)?.as_string().unwrap_or_default();
		trace!(status = response.status(), len = body.len(), "Received response.");
		Ok(HttpResponse {
			status: response.status(),
			content_type,
			body,
		})
	}
}

impl Transport for FetchTransport {
	fn post<'a>(&'a self, url: &'a str, headers: Headers, body: String) -> LocalBoxFuture<'a, Result<HttpResponse, Error>> {
		self.fetch(url, headers, body).boxed_local()
	}

	#[instrument(skip(self, headers, body))]
	fn post_blocking(&self, url: &str, headers: Headers, body: String) -> Result<HttpResponse, Error> {
		let request = XmlHttpRequest::new()?;
		request.open_with_async("POST", url, false)?;
		for (name, value) in &headers {
			request.set_request_header(name, value)?;
		}
		request.send_with_opt_str(Some(&body)).map_err(network)?;
		Ok(HttpResponse {
			status: request.status()?,
			content_type: request.get_response_header(names::HEADER_CONTENT_TYPE)?,
			body: request.response_text()?.unwrap_or_default(),
		})
	}
}
