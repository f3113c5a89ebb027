//! # inox - Incremental Sketch Compiler
//!
//! inox builds Arduino-style sketches for embedded toolchains. It works out
//! which libraries a sketch needs by preprocessing it and following the
//! headers the preprocessor cannot find, then compiles everything in
//! parallel, skipping objects that are already up to date.
//!
//! ## Features
//!
//! - **Library Discovery**: missing headers are resolved against every installed library, with a deterministic priority
//! - **Replayable Cache**: unchanged sketches replay the previous discovery without running the preprocessor
//! - **Incremental Builds**: dependency files decide which objects are stale
//! - **Parallel Builds**: bounded worker pool that stops at the first failure
//!
//! ## Quick Start
//!
//! ```bash
//! # Build the sketch in the current folder (configured by inox.toml)
//! inox build
//!
//! # Which library provides a header?
//! inox libs --header Servo.h
//! ```
//!
//! ## Module Organization
//!
//! - [`build`] - Compilation pipeline, scheduler and staleness checks
//! - [`detector`] - Library discovery loop and its cache
//! - [`library`] - Installed libraries and header resolution
//! - [`sketch`] - Sketch loading and preparation
//! - [`config`] - Configuration parsing (`inox.toml`)

/// Compilation pipeline with parallel, incremental builds.
pub mod build;

/// Configuration file parsing (`inox.toml`).
pub mod config;

/// Library discovery by iterative preprocessing.
pub mod detector;

/// Typed errors for discovery and compilation.
pub mod error;

/// Installed libraries, the catalog and the header resolver.
pub mod library;

/// Sketch loading, `.ino` merging and preparation.
pub mod sketch;

/// Terminal UI utilities (tables).
pub mod ui;

pub use build::logger::init_tracing;
pub use error::{BuildError, DiscoveryError};
