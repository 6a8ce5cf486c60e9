//! Attribute, header and event names shared with the server.

pub const COMPONENT_ID: &str = "data-impulse-id";
pub const STATES: &str = "data-states";
pub const SLOT: &str = "data-slot";
pub const UPDATE: &str = "data-update";
pub const SAVE_SCROLL: &str = "data-save-scroll";
pub const ACTION_DEBOUNCE: &str = "data-action-debounce";
pub const ACTION_THROTTLE: &str = "data-action-throttle";
pub const ACTION_UPDATE: &str = "data-action-update";
pub const PERSISTENT: &str = "data-persistent";

/// `data-*` attributes owned by the server that a full replace never carries over.
pub const RESERVED_DATA_ATTRIBUTES: [&str; 3] = [COMPONENT_ID, STATES, SLOT];

/// Copied from the old component node when the new one lacks them.
pub const PRESERVED_ATTRIBUTES: [&str; 2] = ["style", "title"];

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_COMPONENTS: &str = "X-Impulse-Components";
pub const HEADER_LANGUAGE: &str = "Accept-Language";
pub const HEADER_REQUESTED_WITH: &str = "X-Requested-With";
pub const HEADER_STORAGE_SYNC: &str = "X-LocalStorage-Sync";
pub const HEADER_CACHE_CONTROL: &str = "Cache-Control";

pub const JSON: &str = "application/json";
pub const XML_HTTP_REQUEST: &str = "XMLHttpRequest";
