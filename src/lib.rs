//! Strato serves a catalog of spatial layers discovered from an embedded
//! DuckDB database, with a bounded in-memory response cache and a small
//! authenticated admin surface.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
