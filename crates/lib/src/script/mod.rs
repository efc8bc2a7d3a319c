//! Helper program lifecycle: compile, then execute in a sandboxed
//! working directory.

pub mod compile;
pub mod exec;
pub mod types;

pub use compile::{HelperCompiler, RustcCompiler};
pub use exec::run_helper;
pub use types::{CompileSpec, ExecutionResult, HelperArtifact, HelperEnv, ScriptError};
