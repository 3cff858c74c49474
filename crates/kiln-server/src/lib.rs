//! Development server with live reload for kiln.
//!
//! Serves the build output, watches sources, reruns the affected task on
//! change, and tells connected browsers to reload or swap stylesheets.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{inject_script, rebuild, DevServer, ServerError};
pub use watcher::{Debouncer, FileWatcher, TaskRoutes, WatchEvent};
pub use websocket::{client_script, ReloadHub, ReloadMessage, CLIENT_PATH, WS_PATH};
