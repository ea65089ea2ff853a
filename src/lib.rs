pub mod app;
pub mod config;
pub mod converter;
pub mod domain;
pub mod entities;
pub mod error;
pub mod fmaps;
pub mod fs_util;
pub mod organize;
pub mod output;
pub mod purpose;
pub mod runs;
pub mod series;
pub mod sidecar;
pub mod store;
pub mod translator;
