//! printrelay: HTML-to-PDF rendering with a local headless engine and
//! round-robin failover across peer renderers.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
