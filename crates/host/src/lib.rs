//! mfx host: configuration, the local directory backend and the service
//! graph the `mfx` binary runs on

pub mod app;
pub mod config;
pub mod local;
