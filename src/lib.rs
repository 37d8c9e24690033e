//! Builds semantic Table Models from live database schemas, indexes them for
//! similarity search and derives explicit and generated relationships
//! between tables.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod db;
pub mod errors;
pub mod index;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod synth;
