pub mod app;
pub mod cache_control;
pub mod config;
pub mod convert;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod faa;
pub mod fs_util;
pub mod metadata;
pub mod output;
