//! Waypoint Engine Library
//!
//! This library provides the core functionality of the Waypoint itinerary
//! planner. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// In-process memory store
pub mod memory;

/// Message bus for session events
pub mod message_bus;

/// Greedy itinerary optimizer
pub mod optimizer;

/// Session state machine and stage coordination
pub mod orchestrator;

/// Candidate pool
pub mod pool;

/// Conflict resolution and plan compilation
pub mod resolver;

/// Rule-based and catalog-backed stages
pub mod stages;

/// Telemetry and Observability
pub mod telemetry;

/// Travel-time providers and matrix
pub mod travel;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
