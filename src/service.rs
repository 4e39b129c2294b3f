//! Service records, lifecycle status, and the in-memory service table.

use std::{process::Child, str::FromStr};

use strum_macros::{AsRefStr, Display};

use crate::{error::SupervisorError, ptree::NodeId, setting::ServiceEntry};

/// Lifecycle status of a managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceStatus {
    /// The service is not running and no start has been requested.
    Stopped,
    /// A start has been requested and the spawn is in flight.
    Starting,
    /// The service has a supervised child process, or is awaiting a
    /// scheduled restart after an unexpected exit.
    Running,
    /// A stop has been requested and termination is in flight.
    Stopping,
    /// The service failed to start, or exhausted its retry budget.
    Error,
    /// The supervisor shut down while this record existed.
    Terminated,
}

/// Startup policy determining whether the supervisor launches the service
/// at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StartupType {
    /// Launched by the supervisor at boot.
    Automatic,
    /// Launched only on an explicit start request.
    Manual,
}

impl FromStr for StartupType {
    type Err = SupervisorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "automatic" => Ok(StartupType::Automatic),
            "manual" => Ok(StartupType::Manual),
            other => Err(SupervisorError::InvalidParam(format!(
                "unknown startup type '{other}'"
            ))),
        }
    }
}

/// One managed service: its declared configuration plus supervised runtime
/// state.
#[derive(Debug)]
pub struct ServiceRecord {
    /// Unique short name, the key for every management operation.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Optional version string.
    pub version: Option<String>,
    /// Absolute path of the command to launch.
    pub cmd_path: String,
    /// Optional argument string, split on whitespace at spawn time.
    pub cmd_param: Option<String>,
    /// Startup policy.
    pub startup_type: StartupType,
    /// Handle of the `startupType` tree node, kept so a policy change can
    /// be written back without searching the tree again.
    pub startup_node: NodeId,
    /// Current lifecycle status.
    pub status: ServiceStatus,
    /// Consecutive failed start attempts in the current burst.
    pub retry_count: u8,
    /// Child process handle while the service is supervised-running.
    pub child: Option<Child>,
}

impl ServiceRecord {
    fn from_entry(entry: ServiceEntry) -> Self {
        Self {
            name: entry.name,
            description: entry.description,
            version: entry.version,
            cmd_path: entry.cmd_path,
            cmd_param: entry.cmd_param,
            startup_type: entry.startup_type,
            startup_node: entry.startup_node,
            status: ServiceStatus::Stopped,
            retry_count: 0,
            child: None,
        }
    }

    /// The command line as logged: path and arguments joined by a single
    /// space.
    pub fn command_line(&self) -> String {
        match &self.cmd_param {
            Some(param) => format!("{} {param}", self.cmd_path),
            None => self.cmd_path.clone(),
        }
    }

    /// Copy of the operator-visible fields.
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name.clone(),
            status: self.status,
            startup_type: self.startup_type,
        }
    }
}

/// Operator-visible snapshot of a service record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Lifecycle status at snapshot time.
    pub status: ServiceStatus,
    /// Startup policy at snapshot time.
    pub startup_type: StartupType,
}

/// Ordered registry of service records.
///
/// Declaration order from the setting file is preserved so operators get a
/// deterministic listing. Lookup is a linear scan with case-sensitive,
/// byte-for-byte name comparison.
#[derive(Debug, Default)]
pub struct ServiceTable {
    records: Vec<ServiceRecord>,
}

impl ServiceTable {
    /// Builds the table from parsed setting entries.
    pub fn from_entries(entries: Vec<ServiceEntry>) -> Self {
        Self {
            records: entries.into_iter().map(ServiceRecord::from_entry).collect(),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at a table index.
    pub fn get(&self, index: usize) -> &ServiceRecord {
        &self.records[index]
    }

    /// Mutable record at a table index.
    pub fn get_mut(&mut self, index: usize) -> &mut ServiceRecord {
        &mut self.records[index]
    }

    /// Iterates records in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.records.iter()
    }

    /// Iterates records mutably in declaration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ServiceRecord> {
        self.records.iter_mut()
    }

    /// Index of the record with the given name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|record| record.name == name)
    }

    /// Record with the given name.
    pub fn find(&self, name: &str) -> Result<&ServiceRecord, SupervisorError> {
        self.records
            .iter()
            .find(|record| record.name == name)
            .ok_or_else(|| SupervisorError::ServiceNotFound(name.to_string()))
    }
}
