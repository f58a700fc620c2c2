//! sqlexec - a transaction-aware SQL statement execution layer
//!
//! This crate accepts batches of SQL statements from client sessions, drives
//! explicit and implicit transactions against a transactional store, and keeps
//! exact operational counters for what happened.

pub mod api;
pub mod config;
pub mod core;
pub mod query;
pub mod services;
pub mod storage;
pub mod transaction;
pub mod utils;
