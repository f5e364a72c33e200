//! Scroll-synchronized table of contents for chat threads.
//!
//! The crate models the host page (`dom`, `window`, `storage`) and runs the
//! TOC engine against it (`toc` for the individual stages, `engine` for the
//! controller that sequences them).

pub mod dom;
pub mod engine;
pub mod storage;
pub mod toc;
pub mod window;

pub use engine::{TocController, TocEvent};
pub use toc::{TocConfig, TocError};
