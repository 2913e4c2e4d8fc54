// -
// Work directory layout

pub(crate) const CONF_DIR: &str = "conf";
pub(crate) const LOG_DIR: &str = "log";

/// Shared overlay included by every node file
pub(crate) const CUSTOM_OVERLAY: &str = "custom.cnf";
pub(crate) const ENCRYPTION_OVERLAY: &str = "encryption.cnf";

pub(crate) const NODE_PREFIX: &str = "node";

// -
// Port allocation

/// Randomized base is a multiple of `PORT_STRIDE` in this range
pub(crate) const PORT_BASE_MIN_HUNDREDS: u16 = 35;
pub(crate) const PORT_BASE_MAX_HUNDREDS: u16 = 43;
pub(crate) const PORT_STRIDE: u16 = 100;

/// Galera ports derived from the node's client port
pub(crate) const GALERA_GROUP_PORT_OFFSET: u16 = 8;
pub(crate) const GALERA_IST_PORT_OFFSET: u16 = 9;
pub(crate) const GALERA_SST_PORT_OFFSET: u16 = 10;

pub(crate) const SERVER_ID_BASE: u32 = 100;

/// Admin interface used by the thread pool runs
pub(crate) const ADMIN_PORT_BASE: u16 = 33062;

// -
// Readiness polling

pub(crate) const DEFAULT_READY_ATTEMPTS: usize = 120;
pub(crate) const DEFAULT_READY_INTERVAL_MS: u64 = 1000;

pub(crate) const ROOT_USER: &str = "root";
