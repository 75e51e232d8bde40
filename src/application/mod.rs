//! Application services: rendering, dispatch and process lifecycle.

pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod render;
