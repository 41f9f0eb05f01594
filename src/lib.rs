//! yamlenv: hierarchical YAML configuration with per-environment overrides
//!
//! Layers, innermost first:
//! - `domain`: tree pair, alignment, anchors, variables, compiler
//! - `application`: edit session and configuration file service
//! - `infrastructure`: I/O traits and dependency wiring
//! - `cli`: argument parsing and command dispatch

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
