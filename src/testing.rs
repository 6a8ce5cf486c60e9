//! In-memory stand-ins for the platform seams, so the runtime can be driven without a browser.

use crate::{
	dispatch::ElementKey,
	document::{Document, FormControl, Mutation, ScrollContainer},
	error::Error,
	names,
	scheduler::Scheduler,
	transport::{Headers, HttpResponse, Transport},
};
use core::cell::{Cell, RefCell};
use futures::{
	executor::{LocalPool, LocalSpawner},
	future::LocalBoxFuture,
	task::LocalSpawnExt,
	FutureExt,
};
use hashbrown::HashMap;
use serde_json::Value;
use std::collections::VecDeque;

struct Timer {
	handle: u64,
	due: f64,
	task: Box<dyn FnOnce()>,
}

/// A clock that only moves when told to.
pub struct ManualScheduler {
	now: Cell<f64>,
	next_handle: Cell<u64>,
	timers: RefCell<Vec<Timer>>,
	frames: RefCell<Vec<Box<dyn FnOnce()>>>,
	pool: RefCell<LocalPool>,
	spawner: LocalSpawner,
}

impl ManualScheduler {
	pub fn new() -> Self {
		let pool = LocalPool::new();
		let spawner = pool.spawner();
		Self {
			now: Cell::new(0.0),
			next_handle: Cell::new(0),
			timers: RefCell::new(Vec::new()),
			frames: RefCell::new(Vec::new()),
			pool: RefCell::new(pool),
			spawner,
		}
	}

	/// Moves the clock forward, firing due timers in order. Timers scheduled meanwhile fire too if due.
	pub fn advance(&self, ms: f64) {
		let target = self.now.get() + ms;
		loop {
			let next = {
				let mut timers = self.timers.borrow_mut();
				let position = timers
					.iter()
					.enumerate()
					.filter(|(_, timer)| timer.due <= target)
					.min_by(|(_, a), (_, b)| a.due.partial_cmp(&b.due).unwrap().then(a.handle.cmp(&b.handle)))
					.map(|(index, _)| index);
				position.map(|index| timers.remove(index))
			};
			match next {
				Some(timer) => {
					self.now.set(timer.due.max(self.now.get()));
					(timer.task)();
					self.run_spawned();
				}
				None => break,
			}
		}
		self.now.set(target);
		self.run_spawned();
	}

	/// Polls spawned futures until none can make progress.
	pub fn run_spawned(&self) {
		self.pool.borrow_mut().run_until_stalled();
	}

	/// Runs the callbacks queued for the next animation frame.
	pub fn run_frames(&self) {
		let frames = self.frames.replace(Vec::new());
		for frame in frames {
			frame();
		}
		self.run_spawned();
	}

	pub fn pending_timers(&self) -> usize {
		self.timers.borrow().len()
	}
}

impl Scheduler for ManualScheduler {
	type Handle = u64;

	fn now(&self) -> f64 {
		self.now.get()
	}

	fn set_timeout(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> u64 {
		let handle = self.next_handle.get();
		self.next_handle.set(handle + 1);
		self.timers.borrow_mut().push(Timer {
			handle,
			due: self.now.get() + f64::from(delay_ms),
			task,
		});
		handle
	}

	fn clear_timeout(&self, handle: u64) {
		self.timers.borrow_mut().retain(|timer| timer.handle != handle);
	}

	fn next_frame(&self, task: Box<dyn FnOnce()>) {
		self.frames.borrow_mut().push(task);
	}

	fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
		self.spawner.spawn_local(future).expect("local pool is alive");
	}
}

#[derive(Debug, Default)]
struct NodeData {
	parent: Option<usize>,
	children: Vec<usize>,
	attributes: Vec<(String, String)>,
	inner: String,
	scroll_top: f64,
	scroll_writes: usize,
}

/// A node arena. Node `0` is the document root; nodes without a path to it are detached.
///
/// Markup isn't parsed: [`MemoryDocument::register_markup`] declares which root element a piece of HTML stands for.
pub struct MemoryDocument {
	nodes: RefCell<Vec<NodeData>>,
	markup: RefCell<HashMap<String, Vec<(String, String)>>>,
	selectors: RefCell<Vec<(usize, String, usize)>>,
	controls: RefCell<HashMap<usize, Vec<FormControl>>>,
	selects: RefCell<Vec<usize>>,
	selected_indices: RefCell<HashMap<usize, i32>>,
	selections: RefCell<HashMap<usize, (u32, u32)>>,
	focused: Cell<Option<usize>>,
	style: RefCell<Option<String>>,
	language: RefCell<Option<String>>,
	url: RefCell<String>,
	history: RefCell<Vec<String>>,
	location: RefCell<Option<String>>,
	pages: RefCell<Vec<String>>,
	has_app_root: Cell<bool>,
}

impl MemoryDocument {
	pub fn new() -> Self {
		Self {
			nodes: RefCell::new(vec![NodeData::default()]),
			markup: RefCell::default(),
			selectors: RefCell::default(),
			controls: RefCell::default(),
			selects: RefCell::default(),
			selected_indices: RefCell::default(),
			selections: RefCell::default(),
			focused: Cell::new(None),
			style: RefCell::new(None),
			language: RefCell::new(None),
			url: RefCell::new("/page".to_owned()),
			history: RefCell::default(),
			location: RefCell::new(None),
			pages: RefCell::default(),
			has_app_root: Cell::new(true),
		}
	}

	pub fn root(&self) -> usize {
		0
	}

	fn create(&self, attributes: &[(String, String)]) -> usize {
		let mut nodes = self.nodes.borrow_mut();
		nodes.push(NodeData {
			attributes: attributes.to_vec(),
			..NodeData::default()
		});
		nodes.len() - 1
	}

	pub fn add_element(&self, parent: usize, attributes: &[(&str, &str)]) -> usize {
		let attributes: Vec<_> = attributes.iter().map(|(n, v)| ((*n).to_owned(), (*v).to_owned())).collect();
		let node = self.create(&attributes);
		let mut nodes = self.nodes.borrow_mut();
		nodes[node].parent = Some(parent);
		nodes[parent].children.push(node);
		node
	}

	/// Declares the root element `html` parses to.
	pub fn register_markup(&self, html: &str, attributes: &[(&str, &str)]) {
		let attributes = attributes.iter().map(|(n, v)| ((*n).to_owned(), (*v).to_owned())).collect();
		self.markup.borrow_mut().insert(html.to_owned(), attributes);
	}

	pub fn register_selector(&self, root: usize, selector: &str, node: usize) {
		self.selectors.borrow_mut().push((root, selector.to_owned(), node));
	}

	pub fn set_form_controls(&self, component: usize, controls: Vec<FormControl>) {
		self.controls.borrow_mut().insert(component, controls);
	}

	pub fn mark_select(&self, node: usize) {
		self.selects.borrow_mut().push(node);
	}

	pub fn set_language(&self, language: &str) {
		*self.language.borrow_mut() = Some(language.to_owned());
	}

	pub fn set_url(&self, url: &str) {
		*self.url.borrow_mut() = url.to_owned();
	}

	pub fn remove_app_root(&self) {
		self.has_app_root.set(false);
	}

	pub fn inner_html(&self, node: usize) -> String {
		self.nodes.borrow()[node].inner.clone()
	}

	pub fn is_attached(&self, node: usize) -> bool {
		let nodes = self.nodes.borrow();
		let mut current = node;
		while current != 0 {
			match nodes[current].parent {
				Some(parent) => current = parent,
				None => return false,
			}
		}
		true
	}

	pub fn scroll_writes(&self, node: &usize) -> usize {
		self.nodes.borrow()[*node].scroll_writes
	}

	pub fn focused(&self) -> Option<usize> {
		self.focused.get()
	}

	pub fn selection(&self, node: &usize) -> Option<(u32, u32)> {
		self.selections.borrow().get(node).copied()
	}

	pub fn selected_index(&self, node: &usize) -> Option<i32> {
		self.selected_indices.borrow().get(node).copied()
	}

	pub fn history(&self) -> Vec<String> {
		self.history.borrow().clone()
	}

	pub fn location(&self) -> Option<String> {
		self.location.borrow().clone()
	}

	pub fn installed_pages(&self) -> Vec<String> {
		self.pages.borrow().clone()
	}

	/// Attached descendants of `root` in document order, `root` excluded.
	fn descendants(&self, root: usize) -> Vec<usize> {
		let nodes = self.nodes.borrow();
		let mut found = Vec::new();
		let mut stack: Vec<usize> = nodes[root].children.iter().rev().copied().collect();
		while let Some(node) = stack.pop() {
			found.push(node);
			stack.extend(nodes[node].children.iter().rev().copied());
		}
		found
	}

	fn find_attached(&self, name: &str, value: &str) -> Option<usize> {
		self.descendants(0)
			.into_iter()
			.find(|&node| self.attribute(&node, name).as_deref() == Some(value))
	}

	fn swap(&self, old: usize, new: usize) {
		let mut nodes = self.nodes.borrow_mut();
		if let Some(parent) = nodes[old].parent.take() {
			if let Some(slot) = nodes[parent].children.iter_mut().find(|child| **child == old) {
				*slot = new;
			}
			nodes[new].parent = Some(parent);
		}
	}
}

impl Document for MemoryDocument {
	type Node = usize;

	#[allow(clippy::cast_possible_truncation)]
	fn element_key(&self, node: &usize) -> ElementKey {
		ElementKey(*node as u32)
	}

	fn find_component(&self, id: &str) -> Option<usize> {
		self.find_attached(names::COMPONENT_ID, id)
	}

	fn component_ids(&self) -> Vec<String> {
		self.descendants(0)
			.into_iter()
			.filter_map(|node| self.attribute(&node, names::COMPONENT_ID))
			.collect()
	}

	fn attributes(&self, node: &usize) -> Vec<(String, String)> {
		self.nodes.borrow()[*node].attributes.clone()
	}

	fn has_parent(&self, node: &usize) -> bool {
		self.nodes.borrow()[*node].parent.is_some()
	}

	fn find_update_targets(&self, within: Option<&usize>, prefix: &str) -> Vec<(usize, String)> {
		self.descendants(within.copied().unwrap_or(0))
			.into_iter()
			.filter_map(|node| {
				self.attribute(&node, names::UPDATE)
					.filter(|update| update.starts_with(prefix))
					.map(|update| (node, update))
			})
			.collect()
	}

	fn parse_component(&self, html: &str) -> Option<usize> {
		let attributes = self.markup.borrow().get(html).cloned()?;
		if !attributes.iter().any(|(name, _)| name == names::COMPONENT_ID) {
			return None;
		}
		Some(self.create(&attributes))
	}

	fn form_controls(&self, component: &usize) -> Vec<FormControl> {
		self.controls.borrow().get(component).cloned().unwrap_or_default()
	}

	fn language(&self) -> Option<String> {
		self.language.borrow().clone()
	}

	fn apply(&self, mutation: Mutation<usize>) -> Option<usize> {
		match mutation {
			Mutation::SetAttribute { target, name, value } => {
				let mut nodes = self.nodes.borrow_mut();
				let attributes = &mut nodes[target].attributes;
				match attributes.iter_mut().find(|(n, _)| *n == name) {
					Some(existing) => existing.1 = value,
					None => attributes.push((name, value)),
				}
				Some(target)
			}
			Mutation::ReplaceNode { old, new } => {
				self.swap(old, new);
				Some(new)
			}
			Mutation::ReplaceWithMarkup { target, html } => {
				let parsed = self.markup.borrow().get(&html).cloned();
				match parsed {
					Some(attributes) => {
						let new = self.create(&attributes);
						self.swap(target, new);
						Some(new)
					}
					None => {
						self.nodes.borrow_mut()[target].inner = html;
						Some(target)
					}
				}
			}
		}
	}

	fn style_text(&self) -> Option<String> {
		self.style.borrow().clone()
	}

	fn set_style_text(&self, css: &str) {
		*self.style.borrow_mut() = Some(css.to_owned());
	}

	fn scroll_containers(&self) -> Vec<ScrollContainer<usize>> {
		self.descendants(0)
			.into_iter()
			.filter_map(|node| self.attribute(&node, names::SAVE_SCROLL).map(|marker| ScrollContainer { node, marker }))
			.collect()
	}

	fn scroll_top(&self, node: &usize) -> f64 {
		self.nodes.borrow()[*node].scroll_top
	}

	fn set_scroll_top(&self, node: &usize, top: f64) {
		let mut nodes = self.nodes.borrow_mut();
		nodes[*node].scroll_top = top;
		nodes[*node].scroll_writes += 1;
	}

	fn element_by_id(&self, id: &str) -> Option<usize> {
		self.find_attached("id", id)
	}

	fn query_within(&self, root: &usize, selector: &str) -> Option<usize> {
		if let Some(&(_, _, node)) = self.selectors.borrow().iter().find(|(r, s, _)| r == root && s == selector) {
			return Some(node);
		}
		let id = selector.strip_prefix('#')?;
		self.descendants(*root)
			.into_iter()
			.find(|node| self.attribute(node, "id").as_deref() == Some(id))
	}

	fn is_select(&self, node: &usize) -> bool {
		self.selects.borrow().contains(node)
	}

	fn set_selected_index(&self, node: &usize, index: i32) {
		self.selected_indices.borrow_mut().insert(*node, index);
	}

	fn focus(&self, node: &usize) {
		self.focused.set(Some(*node));
	}

	fn set_selection_range(&self, node: &usize, start: u32, end: u32) -> bool {
		self.selections.borrow_mut().insert(*node, (start, end));
		true
	}

	fn url(&self) -> String {
		self.url.borrow().clone()
	}

	fn replace_location(&self, url: &str) {
		*self.location.borrow_mut() = Some(url.to_owned());
	}

	fn push_history(&self, url: &str) {
		self.history.borrow_mut().push(url.to_owned());
	}

	fn swap_page(&self, html: &str) -> bool {
		if !self.has_app_root.get() {
			return false;
		}
		self.pages.borrow_mut().push(html.to_owned());
		true
	}
}

/// One captured POST.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
	pub url: String,
	pub headers: Headers,
	pub body: String,
	pub blocking: bool,
}

impl RecordedRequest {
	pub fn json(&self) -> Value {
		serde_json::from_str(&self.body).expect("request body is JSON")
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
	}
}

/// Replies from a queue, `200 {}` once it runs dry, and records every request.
#[derive(Default)]
pub struct RecordingTransport {
	responses: RefCell<VecDeque<Result<HttpResponse, Error>>>,
	requests: RefCell<Vec<RecordedRequest>>,
}

impl RecordingTransport {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn reply(&self, status: u16, content_type: &str, body: &str) {
		self.responses.borrow_mut().push_back(Ok(HttpResponse {
			status,
			content_type: Some(content_type.to_owned()),
			body: body.to_owned(),
		}));
	}

	pub fn reply_json(&self, body: &Value) {
		self.reply(200, names::JSON, &body.to_string());
	}

	pub fn fail(&self, error: Error) {
		self.responses.borrow_mut().push_back(Err(error));
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.requests.borrow().clone()
	}

	fn record(&self, url: &str, headers: Headers, body: String, blocking: bool) -> Result<HttpResponse, Error> {
		self.requests.borrow_mut().push(RecordedRequest {
			url: url.to_owned(),
			headers,
			body,
			blocking,
		});
		self.responses.borrow_mut().pop_front().unwrap_or_else(|| {
			Ok(HttpResponse {
				status: 200,
				content_type: Some(names::JSON.to_owned()),
				body: "{}".to_owned(),
			})
		})
	}
}

impl Transport for RecordingTransport {
	fn post<'a>(&'a self, url: &'a str, headers: Headers, body: String) -> LocalBoxFuture<'a, Result<HttpResponse, Error>> {
		futures::future::ready(self.record(url, headers, body, false)).boxed_local()
	}

	fn post_blocking(&self, url: &str, headers: Headers, body: String) -> Result<HttpResponse, Error> {
		self.record(url, headers, body, true)
	}
}
