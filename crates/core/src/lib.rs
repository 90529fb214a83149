//! Core library: audio buffers, catalog scanning and tagging, mix synthesis.

pub mod audio;
pub mod catalog;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod error;
pub mod mixer;
pub mod models;
pub mod pipeline;
pub mod provenance;
pub mod scanner;
