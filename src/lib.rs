//! zsm-console: a terminal controller for ZSM cluster deployments.
//!
//! The library holds the event-driven core (session lifecycle, progress
//! channel, deployment step tracking and view refresh) behind trait seams for
//! the REST backend and the progress transport. The `zsm` binary in
//! `main.rs` wires it to HTTP, WebSockets and the terminal.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod nodes;
pub mod progress;
pub mod refresh;
pub mod view;

pub use dashboard::Dashboard;
pub use refresh::Section;
pub use view::{ViewHandle, ViewUpdate};
