#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod backend;
pub mod board;
pub mod config;
pub mod data;
pub mod depth;
pub mod engagement;
pub mod error;
pub mod model;
pub mod names;
pub mod sort;
pub mod storage;
pub mod thread;
pub mod validate;
pub mod wall;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
pub use depth::{can_reply, DEFAULT_MAX_DEPTH};
pub use thread::{build_sorted_tree, toggle_collapse, ThreadNode};
