pub mod api;
pub mod app;
pub mod config;
pub mod config_io;
pub mod download;
pub mod install;
