//! taskdeck - personal task manager backed by a hosted Postgres/auth provider.
//!
//! The library holds the task model, the insights aggregation, the
//! `/task-insights` HTTP service and the terminal client.

pub mod api;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod insights;
pub mod models;
pub mod parser;
pub mod server;
pub mod session;
pub mod store;
pub mod ui;
