#![doc(html_root_url = "https://docs.rs/impulse-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

//! Client runtime for server-rendered Impulse components.
//!
//! The core ([`runtime::Runtime`] and everything it calls) is written against the
//! [`document::Document`], [`transport::Transport`], [`storage::StorageAdapter`] and
//! [`scheduler::Scheduler`] seams. [`web`] implements them on top of `web-sys`.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod collaborators;
pub mod collect;
pub mod config;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod events;
pub mod focus;
pub mod logging;
pub mod names;
pub mod patch;
pub mod request;
pub mod response;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod styles;
pub mod transport;
pub mod web;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::Error;
pub use runtime::Runtime;
