//! Deployment topology.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! election_id = 1
//! signature_devices = ["s1"]
//!
//! [[device]]
//! name = "s1"
//! address = "127.0.0.1:50051"
//! device_id = 0
//! proto_dump_file = "logs/s1-p4runtime-requests.txt"
//!
//! [[host_route]]
//! ingress = "s1"
//! egress = "s3"
//! ingress_port = 3
//! egress_port = 1
//! dst_mac = "00:00:00:00:03:03"
//! dst_ip = "10.0.3.3"
//! ```
//!
//! Without a file, [`Topology::default`] describes the two-switch lab
//! deployment.

use crate::error::{ControllerError, Result};
use p4_runtime::{DeviceHandle, ElectionId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One managed switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub address: String,
    pub device_id: u64,
    #[serde(default)]
    pub proto_dump_file: Option<PathBuf>,
}

impl DeviceConfig {
    pub fn to_handle(&self) -> DeviceHandle {
        let handle = DeviceHandle::new(&self.name, &self.address, self.device_id);
        match &self.proto_dump_file {
            Some(path) => handle.with_proto_dump_file(path),
            None => handle,
        }
    }
}

/// Forwarding between two hosts through an ingress and an egress switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRoute {
    pub ingress: String,
    pub egress: String,
    /// Port the ingress switch forwards out of.
    pub ingress_port: u32,
    /// Port the egress switch forwards out of.
    pub egress_port: u32,
    pub dst_mac: String,
    pub dst_ip: String,
}

/// Which end of a host route a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSide {
    Ingress,
    Egress,
}

impl fmt::Display for RouteSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSide::Ingress => f.write_str("ingress"),
            RouteSide::Egress => f.write_str("egress"),
        }
    }
}

/// One static forwarding rule, bound to the device it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub device: String,
    pub side: RouteSide,
    pub port: u32,
    pub dst_mac: String,
    /// Destination host address; matched as a /32.
    pub dst_ip: String,
}

impl HostRoute {
    /// Expands into the ingress-side and egress-side rules, in that order.
    pub fn rules(&self) -> [RouteRule; 2] {
        [
            RouteRule {
                device: self.ingress.clone(),
                side: RouteSide::Ingress,
                port: self.ingress_port,
                dst_mac: self.dst_mac.clone(),
                dst_ip: self.dst_ip.clone(),
            },
            RouteRule {
                device: self.egress.clone(),
                side: RouteSide::Egress,
                port: self.egress_port,
                dst_mac: self.dst_mac.clone(),
                dst_ip: self.dst_ip.clone(),
            },
        ]
    }
}

/// Names of the pipeline objects rules are compiled against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default = "default_route_table")]
    pub route_table: String,
    #[serde(default = "default_route_match_field")]
    pub route_match_field: String,
    #[serde(default = "default_route_action")]
    pub route_action: String,
    #[serde(default = "default_route_mac_param")]
    pub route_mac_param: String,
    #[serde(default = "default_route_port_param")]
    pub route_port_param: String,
    #[serde(default = "default_signature_table")]
    pub signature_table: String,
    /// Namespace prepended to every signature field name.
    #[serde(default = "default_signature_field_prefix")]
    pub signature_field_prefix: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            route_table: default_route_table(),
            route_match_field: default_route_match_field(),
            route_action: default_route_action(),
            route_mac_param: default_route_mac_param(),
            route_port_param: default_route_port_param(),
            signature_table: default_signature_table(),
            signature_field_prefix: default_signature_field_prefix(),
        }
    }
}

/// Complete deployment description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(rename = "device", default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(rename = "host_route", default)]
    pub host_routes: Vec<HostRoute>,

    /// Devices receiving the fingerprint rules.
    #[serde(default)]
    pub signature_devices: Vec<String>,

    /// Controller identity for mastership arbitration.
    #[serde(default = "default_election_id")]
    pub election_id: u64,

    #[serde(default)]
    pub tables: TablesConfig,
}

// Default functions
fn default_route_table() -> String {
    "MyIngress.ipv4_lpm".to_string()
}

fn default_route_match_field() -> String {
    "hdr.ipv4.dstAddr".to_string()
}

fn default_route_action() -> String {
    "MyIngress.ipv4_forward".to_string()
}

fn default_route_mac_param() -> String {
    "dstAddr".to_string()
}

fn default_route_port_param() -> String {
    "port".to_string()
}

fn default_signature_table() -> String {
    "MyIngress.result_match".to_string()
}

fn default_signature_field_prefix() -> String {
    "meta.p0f_metadata.".to_string()
}

fn default_election_id() -> u64 {
    1
}

impl Default for Topology {
    fn default() -> Self {
        let device = |name: &str, port: u16, device_id: u64| DeviceConfig {
            name: name.to_string(),
            address: format!("127.0.0.1:{}", port),
            device_id,
            proto_dump_file: Some(PathBuf::from(format!("logs/{}-p4runtime-requests.txt", name))),
        };
        Self {
            devices: vec![device("s1", 50051, 0), device("s3", 50052, 1)],
            host_routes: vec![
                // h1 -> h3
                HostRoute {
                    ingress: "s1".to_string(),
                    egress: "s3".to_string(),
                    ingress_port: 3,
                    egress_port: 1,
                    dst_mac: "00:00:00:00:03:03".to_string(),
                    dst_ip: "10.0.3.3".to_string(),
                },
                // h3 -> h1
                HostRoute {
                    ingress: "s3".to_string(),
                    egress: "s1".to_string(),
                    ingress_port: 2,
                    egress_port: 1,
                    dst_mac: "00:00:00:00:01:01".to_string(),
                    dst_ip: "10.0.1.1".to_string(),
                },
            ],
            signature_devices: vec!["s1".to_string()],
            election_id: default_election_id(),
            tables: TablesConfig::default(),
        }
    }
}

impl Topology {
    /// Parses and validates a TOML topology.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let topology: Topology = toml::from_str(content)
            .map_err(|e| ControllerError::config(format!("Failed to parse topology: {}", e)))?;
        topology.validate()?;
        Ok(topology)
    }

    /// Loads and validates a topology file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ControllerError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks device references and identities.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(ControllerError::config("no devices configured"));
        }
        if self.election_id == 0 {
            return Err(ControllerError::config("election_id must be non-zero"));
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for device in &self.devices {
            if !names.insert(device.name.as_str()) {
                return Err(ControllerError::config(format!(
                    "duplicate device name '{}'",
                    device.name
                )));
            }
            if !ids.insert(device.device_id) {
                return Err(ControllerError::config(format!(
                    "duplicate device_id {} ('{}')",
                    device.device_id, device.name
                )));
            }
        }

        let check = |name: &str, context: &str| {
            if names.contains(name) {
                Ok(())
            } else {
                Err(ControllerError::config(format!(
                    "{} references unknown device '{}'",
                    context, name
                )))
            }
        };
        for (idx, route) in self.host_routes.iter().enumerate() {
            let context = format!("host_route #{}", idx);
            check(&route.ingress, &context)?;
            check(&route.egress, &context)?;
        }
        let mut targets = HashSet::new();
        for name in &self.signature_devices {
            check(name, "signature_devices")?;
            if !targets.insert(name.as_str()) {
                return Err(ControllerError::config(format!(
                    "signature_devices lists '{}' more than once",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn election_id(&self) -> ElectionId {
        ElectionId(self.election_id)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// All route rules in install order: per host route, ingress then egress.
    pub fn route_rules(&self) -> Vec<RouteRule> {
        self.host_routes.iter().flat_map(HostRoute::rules).collect()
    }
}
