//! Core domain types
//!
//! This module contains the core domain structures used across Cryo crates.
//! These types represent the fundamental business entities and are shared
//! between the worker (for execution) and the clients (for transfer).

pub mod checkpoint;
pub mod job;
pub mod worker;
