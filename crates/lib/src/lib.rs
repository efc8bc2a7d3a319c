//! quarry-lib: Build-script orchestration engine
//!
//! This crate provides the machinery for running build-time helper programs:
//! - `directive`: the stdout line protocol and its parser
//! - `script`: helper compilation and sandboxed execution
//! - `attrs`: aggregation of directives into per-unit attribute sets
//! - `fingerprint`: change detection and cached attribute reuse
//! - `orchestrate`: DAG scheduling of units across a worker pool

pub mod attrs;
pub mod consts;
pub mod directive;
pub mod fingerprint;
pub mod orchestrate;
pub mod script;
pub mod util;
