//! plygate - cached image-to-PLY generation service
//!
//! Wraps an external image-to-point-cloud generator behind an HTTP API,
//! caching results by the SHA-256 of the source image.

pub mod bootstrap;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod image_info;
pub mod ledger;
pub mod remote;
pub mod server;

pub use error::{PlygateError, PlygateResult};
