//! Limits and defaults for the warden daemon.
//!
//! This module centralizes the magic numbers and strings shared by the
//! setting store and the supervisor engine.

/// Maximum number of services the setting file may declare.
pub const MAX_SERVICES: usize = 30;

/// Maximum length of a service name in bytes.
pub const MAX_SERVICE_NAME_LEN: usize = 24;

/// Setting file consulted when `--config` is not given.
pub const DEFAULT_SETTING_FILE: &str = "warden.setting.xml";

/// Suffix appended to the setting path for the temporary sibling used by
/// atomic writes.
pub const SETTING_TMP_SUFFIX: &str = ".tmp";
