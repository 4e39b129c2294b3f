//! Load, persist, and mutate the service-management setting file.
//!
//! The setting file is XML; parsing builds a property tree and the typed
//! catalogue in one pass. The tree is kept alive for the life of the daemon
//! so that persistent mutations (currently only a service's startup type)
//! rewrite the original document, unknown elements included, instead of
//! regenerating it from the typed model.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    constants::{MAX_SERVICES, MAX_SERVICE_NAME_LEN, SETTING_TMP_SUFFIX},
    error::SupervisorError,
    ptree::{NodeId, PropertyTree},
    service::StartupType,
    xml::{self, XmlDocument},
};

/// The root node name of the setting file.
const SETTING_ROOT: &str = "servMgmtSetting";

/// The node path of the version.
const SETTING_VERSION: &str = "servMgmtSetting.version";

/// The node path of the max failure retry count.
const SETTING_MAX_FAILURE_RETRY_COUNT: &str =
    "servMgmtSetting.globalSetting.maxFailureRetryCount";

/// The node path of one service setting.
const SETTING_SERVICE: &str = "servMgmtSetting.serviceSetting.service";

const SERVICE_NAME: &str = "name";
const SERVICE_DESCRIPTION: &str = "description";
const SERVICE_VERSION: &str = "version";
const SERVICE_STARTUP_TYPE: &str = "startupType";
const SERVICE_CMD_PATH: &str = "cmdPath";
const SERVICE_CMD_PARAM: &str = "cmdParam";

/// Persistent subset of one service record, parsed from a `<service>` node.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    /// Unique service name.
    pub name: String,
    /// Human-readable description; empty when the element is absent.
    pub description: String,
    /// Optional version string.
    pub version: Option<String>,
    /// Absolute command path.
    pub cmd_path: String,
    /// Optional command argument string.
    pub cmd_param: Option<String>,
    /// Startup policy.
    pub startup_type: StartupType,
    /// Handle of the `startupType` node, bound for later write-back.
    pub startup_node: NodeId,
}

/// The setting store: the parsed document plus the typed global settings.
#[derive(Debug)]
pub struct Setting {
    path: PathBuf,
    document: XmlDocument,
    /// Opaque version string, preserved on round-trip.
    pub version: String,
    /// Hard cap on consecutive restart attempts per service.
    pub max_failure_retry_count: u8,
    services: Vec<ServiceEntry>,
}

impl Setting {
    /// Loads and validates the setting file.
    ///
    /// Fails with [`SupervisorError::MalformedSetting`] when the document is
    /// not well-formed and with [`SupervisorError::InvalidSetting`] when a
    /// required node is missing, more than [`MAX_SERVICES`] services are
    /// declared, or two services share a name. A `<service>` entry missing
    /// one of its own required fields is skipped with a warning so one bad
    /// record does not take the daemon down.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SupervisorError> {
        let path = path.into();
        info!(file = %path.display(), "reading service setting");

        let document = xml::parse_file(&path)?;
        let tree = &document.tree;
        if tree.name(tree.root()) != SETTING_ROOT {
            return Err(SupervisorError::InvalidSetting(format!(
                "root element is not {SETTING_ROOT}"
            )));
        }

        let version = required_value(tree, SETTING_VERSION)?.to_string();
        let retry_raw = required_value(tree, SETTING_MAX_FAILURE_RETRY_COUNT)?;
        let max_failure_retry_count = retry_raw.trim().parse::<u8>().map_err(|_| {
            SupervisorError::InvalidSetting(format!(
                "maxFailureRetryCount '{retry_raw}' is not a decimal u8"
            ))
        })?;

        let service_nodes = tree.find_all_nodes(SETTING_SERVICE);
        if service_nodes.len() > MAX_SERVICES {
            return Err(SupervisorError::InvalidSetting(format!(
                "{} services declared, at most {MAX_SERVICES} are supported",
                service_nodes.len()
            )));
        }

        let mut services: Vec<ServiceEntry> = Vec::with_capacity(service_nodes.len());
        for node in service_nodes {
            match parse_service(tree, node) {
                Ok(entry) => {
                    if services.iter().any(|known| known.name == entry.name) {
                        return Err(SupervisorError::InvalidSetting(format!(
                            "duplicate service name '{}'",
                            entry.name
                        )));
                    }
                    services.push(entry);
                }
                Err(err) => {
                    warn!(error = %err, "skipping malformed service entry");
                }
            }
        }

        info!(
            version = %version,
            retry_cap = max_failure_retry_count,
            services = services.len(),
            "service setting loaded"
        );
        for entry in &services {
            info!(
                service = %entry.name,
                startup_type = %entry.startup_type,
                cmd_path = %entry.cmd_path,
                "loaded service"
            );
        }

        Ok(Self {
            path,
            document,
            version,
            max_failure_retry_count,
            services,
        })
    }

    /// Moves the parsed service entries out of the store.
    pub fn take_services(&mut self) -> Vec<ServiceEntry> {
        std::mem::take(&mut self.services)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read access to the parsed document, mainly for tests.
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// Writes the document back to disk.
    ///
    /// The serialisation goes through a temporary sibling which is renamed
    /// into place, so readers never observe a torn file.
    pub fn save(&self) -> Result<(), SupervisorError> {
        info!(file = %self.path.display(), "writing service setting");
        let rendered = xml::serialize(&self.document);
        let tmp = temp_sibling(&self.path);
        fs::write(&tmp, rendered).map_err(SupervisorError::PersistFailed)?;
        fs::rename(&tmp, &self.path).map_err(SupervisorError::PersistFailed)?;
        Ok(())
    }

    /// Rewrites the bound startup-type node and persists the document.
    ///
    /// On a failed write the node value is restored, leaving the in-memory
    /// tree consistent with the file on disk.
    pub fn change_startup_type(
        &mut self,
        node: NodeId,
        startup_type: StartupType,
    ) -> Result<(), SupervisorError> {
        let previous = self.document.tree.value(node).map(str::to_string);
        self.document
            .tree
            .set_value(node, Some(startup_type.as_ref().to_string()));
        match self.save() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.document.tree.set_value(node, previous);
                Err(err)
            }
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(SETTING_TMP_SUFFIX);
    path.with_file_name(name)
}

fn required_value<'a>(
    tree: &'a PropertyTree,
    path: &str,
) -> Result<&'a str, SupervisorError> {
    let node = tree.find_node(path).ok_or_else(|| {
        SupervisorError::InvalidSetting(format!("missing node {path}"))
    })?;
    tree.value(node).ok_or_else(|| {
        SupervisorError::InvalidSetting(format!("node {path} has no value"))
    })
}

fn required_child<'a>(
    tree: &'a PropertyTree,
    service: NodeId,
    name: &str,
) -> Result<(NodeId, &'a str), SupervisorError> {
    let node = tree.find_child(service, None, name).ok_or_else(|| {
        SupervisorError::InvalidSetting(format!("service entry missing {name}"))
    })?;
    let value = tree.value(node).ok_or_else(|| {
        SupervisorError::InvalidSetting(format!("service entry has empty {name}"))
    })?;
    Ok((node, value))
}

fn optional_child_value(
    tree: &PropertyTree,
    service: NodeId,
    name: &str,
) -> Option<String> {
    tree.find_child(service, None, name)
        .and_then(|node| tree.value(node))
        .map(str::to_string)
}

fn parse_service(tree: &PropertyTree, node: NodeId) -> Result<ServiceEntry, SupervisorError> {
    let (_, name) = required_child(tree, node, SERVICE_NAME)?;
    if name.len() > MAX_SERVICE_NAME_LEN {
        return Err(SupervisorError::InvalidSetting(format!(
            "service name '{name}' exceeds {MAX_SERVICE_NAME_LEN} bytes"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(SupervisorError::InvalidSetting(
            "service name contains control characters".into(),
        ));
    }

    let (_, cmd_path) = required_child(tree, node, SERVICE_CMD_PATH)?;
    let (startup_node, startup_raw) = required_child(tree, node, SERVICE_STARTUP_TYPE)?;
    let startup_type: StartupType = startup_raw.parse()?;

    Ok(ServiceEntry {
        name: name.to_string(),
        description: optional_child_value(tree, node, SERVICE_DESCRIPTION)
            .unwrap_or_default(),
        version: optional_child_value(tree, node, SERVICE_VERSION),
        cmd_path: cmd_path.to_string(),
        cmd_param: optional_child_value(tree, node, SERVICE_CMD_PARAM),
        startup_type,
        startup_node,
    })
}
