//! Core types for Prism

mod event;
mod notification;

pub use event::*;
pub use notification::*;
