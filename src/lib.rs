//! pssgfont
pub mod atlas;
pub mod core;
pub mod library;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod pssg;
pub mod template;
pub mod tools;
pub mod verify;
