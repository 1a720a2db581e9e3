//! Cryo Core
//!
//! Core types and abstractions for the Cryo checkpointed-worker system.
//!
//! This crate contains:
//! - Domain types: Core business entities (JobId, RemotePath, CheckpointSequence, etc.)
//! - DTOs: Data transfer objects for controller/worker communication
//! - Message vocabulary: typed headers carried by control and report messages

pub mod domain;
pub mod dto;
pub mod message;
