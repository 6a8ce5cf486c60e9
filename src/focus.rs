//! Keeping scroll offsets and focus/caret position across destructive patches.

use crate::{config::RetryPolicy, document::Document, error::Error, scheduler::Scheduler};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Where the user was typing when an action was dispatched. Lives for one round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocusInfo {
	pub active_element_id: Option<String>,
	pub active_element_selector: Option<String>,
	pub selection_start: Option<u32>,
	pub selection_end: Option<u32>,
	pub selected_index: Option<i32>,
	/// `data-update` key of a targeted patch, forwarded as the request's `update`.
	pub update_target: Option<String>,
}

impl FocusInfo {
	pub fn for_target(update_target: Option<String>) -> Self {
		Self { update_target, ..Self::default() }
	}

	/// Whether there is anything to refocus.
	pub fn has_focus_target(&self) -> bool {
		self.active_element_id.as_deref().map_or(false, |id| !id.trim().is_empty()) || self.active_element_selector.is_some()
	}
}

/// Scroll offsets of marked containers, keyed by marker value or `scroll-<index>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollSnapshot(Vec<(String, f64)>);

impl ScrollSnapshot {
	pub fn get(&self, identifier: &str) -> Option<f64> {
		self.0.iter().find(|(id, _)| id == identifier).map(|&(_, top)| top)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

fn identifier(marker: &str, index: usize) -> String {
	if marker.is_empty() {
		format!("scroll-{}", index)
	} else {
		marker.to_owned()
	}
}

/// Records every marked container that is scrolled away from the top.
pub fn capture_scroll<D: Document>(document: &D) -> ScrollSnapshot {
	ScrollSnapshot(
		document
			.scroll_containers()
			.into_iter()
			.enumerate()
			.filter_map(|(index, container)| {
				let top = document.scroll_top(&container.node);
				if top > 0.0 {
					Some((identifier(&container.marker, index), top))
				} else {
					None
				}
			})
			.collect(),
	)
}

/// Writes saved offsets back once per scheduled delay, then corrects any drift beyond the tolerance.
///
/// Containers are looked up again on every pass since the patch may have replaced them.
pub fn restore_scroll<D, S>(document: &Rc<D>, scheduler: &Rc<S>, snapshot: ScrollSnapshot, policy: &RetryPolicy)
where
	D: Document + 'static,
	S: Scheduler + 'static,
{
	if snapshot.is_empty() {
		return;
	}
	let snapshot = Rc::new(snapshot);
	for &delay in &policy.delays_ms {
		let document = Rc::clone(document);
		let task_scheduler = Rc::clone(scheduler);
		let snapshot = Rc::clone(&snapshot);
		let corrective_delay = policy.corrective_delay_ms;
		let tolerance = policy.tolerance_px;
		scheduler.set_timeout(
			delay,
			Box::new(move || {
				for (index, container) in document.scroll_containers().into_iter().enumerate() {
					let saved = match snapshot.get(&identifier(&container.marker, index)) {
						Some(saved) if saved > 0.0 => saved,
						_ => continue,
					};
					document.set_scroll_top(&container.node, saved);

					let document = Rc::clone(&document);
					task_scheduler.set_timeout(
						corrective_delay,
						Box::new(move || {
							if (document.scroll_top(&container.node) - saved).abs() > tolerance {
								trace!(saved, "Correcting scroll drift.");
								document.set_scroll_top(&container.node, saved);
							}
						}),
					);
				}
			}),
		);
	}
}

/// Finds the element to refocus: the id in the whole document, then `#id` inside `root`, then the selector inside `root`.
///
/// # Errors
///
/// [`Error::FocusTargetMissing`] if none resolves.
pub fn resolve_focus_target<D: Document>(document: &D, root: &D::Node, focus: &FocusInfo) -> Result<D::Node, Error> {
	let id = focus.active_element_id.as_deref().filter(|id| !id.trim().is_empty());
	if let Some(found) = id.and_then(|id| document.element_by_id(id)) {
		return Ok(found);
	}
	if let Some(selector) = &focus.active_element_selector {
		if let Some(found) = id.and_then(|id| document.query_within(root, &format!("#{}", id))) {
			return Ok(found);
		}
		if let Some(found) = document.query_within(root, selector) {
			return Ok(found);
		}
		warn!(%selector, "Unable to find the element to refocus. Give it an id to make it reachable.");
	}
	Err(Error::FocusTargetMissing)
}

/// Refocuses after the DOM swap has been committed; the caret is restored one frame after focusing
/// so the browser doesn't reset it.
pub fn restore_focus<D, S>(document: &Rc<D>, scheduler: &Rc<S>, root: D::Node, focus: FocusInfo)
where
	D: Document + 'static,
	S: Scheduler + 'static,
{
	if !focus.has_focus_target() {
		return;
	}
	let document = Rc::clone(document);
	let frame_scheduler = Rc::clone(scheduler);
	scheduler.set_timeout(
		0,
		Box::new(move || {
			let element = match resolve_focus_target(&*document, &root, &focus) {
				Ok(element) => element,
				Err(error) => return debug!("Skipping focus restoration: {}", error),
			};
			if let Some(index) = focus.selected_index {
				if document.is_select(&element) {
					document.set_selected_index(&element, index);
				}
			}
			document.focus(&element);

			if let (Some(start), Some(end)) = (focus.selection_start, focus.selection_end) {
				frame_scheduler.next_frame(Box::new(move || {
					if !document.set_selection_range(&element, start, end) {
						trace!("Focused element has no selection range.");
					}
				}));
			}
		}),
	);
}
