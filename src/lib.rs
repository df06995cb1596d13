//! LayerForge: the composition, filter and history engine of a layered
//! image editor. [`project::EditorSession`] is the entry point.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod document;
pub mod error;
pub mod geometry;
pub mod io;
pub mod ops;
pub mod presets;
pub mod project;
pub mod settings;

pub use error::{EditorError, Result};
pub use project::EditorSession;
