//! Crate-wide constants.

/// Number of hex characters kept for unit identity hashes.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Default wall-clock budget for one helper execution, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Environment variable overriding the state directory root.
pub const STATE_DIR_ENV: &str = "QUARRY_STATE_DIR";

/// Directory name for fingerprint records within the state directory.
pub const FINGERPRINTS_DIR: &str = "fingerprints";

/// Directory name for per-unit working directories within the state directory.
pub const WORK_DIR: &str = "work";

/// Informational variables injected into every helper environment.
pub const ENV_PKG_NAME: &str = "QUARRY_PKG_NAME";
pub const ENV_PKG_VERSION: &str = "QUARRY_PKG_VERSION";
pub const ENV_TARGET: &str = "TARGET";
pub const ENV_OUT_DIR: &str = "OUT_DIR";
pub const ENV_OPT_LEVEL: &str = "OPT_LEVEL";
