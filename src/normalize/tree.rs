//! Block-device forest built from `lsblk -J` output.
//!
//! Raw enumeration JSON is deserialized into loosely-typed structs first and
//! then materialized depth-first into owned [`DeviceNode`]s, so every node is
//! validated (name present, size parseable) before the forest is returned.

use serde::{Deserialize, Serialize};

use crate::error::{DiskmonError, Result};

use super::render::TreeLines;
use super::size::parse_size;

/// Deepest nesting accepted from the enumeration command.
pub const MAX_DEPTH: usize = 32;

/// Kind of block device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Disk,
    Partition,
    Raid,
    Loop,
    Unknown,
}

impl DeviceType {
    /// Map an lsblk TYPE column value
    pub fn from_lsblk(kind: &str) -> Self {
        let kind = kind.trim().to_ascii_lowercase();
        match kind.as_str() {
            "disk" => Self::Disk,
            "part" | "partition" => Self::Partition,
            "loop" => Self::Loop,
            "md" | "raid" => Self::Raid,
            k if k.starts_with("raid") => Self::Raid,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Partition => "partition",
            Self::Raid => "raid",
            Self::Loop => "loop",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One block device and the devices stacked on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub children: Vec<DeviceNode>,
}

impl DeviceNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, including self
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(DeviceNode::count).sum::<usize>()
    }
}

/// All root devices reported by one enumeration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceForest {
    pub devices: Vec<DeviceNode>,
}

impl DeviceForest {
    /// Parse raw enumeration output (`{"blockdevices": [...]}` or `{"devices": [...]}`)
    pub fn from_json(raw: &str) -> Result<Self> {
        let raw: RawEnumeration = serde_json::from_str(raw)
            .map_err(|e| DiskmonError::Parse(format!("enumeration output is not valid: {}", e)))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnumeration) -> Result<Self> {
        let devices = raw
            .devices
            .into_iter()
            .map(|device| materialize(device, "", 0))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { devices })
    }

    pub fn roots(&self) -> &[DeviceNode] {
        &self.devices
    }

    /// Total number of nodes across all trees
    pub fn len(&self) -> usize {
        self.devices.iter().map(DeviceNode::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Depth-first search by device name
    pub fn find(&self, name: &str) -> Option<&DeviceNode> {
        fn walk<'a>(nodes: &'a [DeviceNode], name: &str) -> Option<&'a DeviceNode> {
            for node in nodes {
                if node.name == name {
                    return Some(node);
                }
                if let Some(found) = walk(&node.children, name) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.devices, name)
    }

    /// Root devices of type disk, in enumeration order
    pub fn disks(&self) -> impl Iterator<Item = &DeviceNode> {
        self.devices.iter().filter(|d| d.device_type == DeviceType::Disk)
    }

    /// Indented text rendering. Every call starts a fresh walk.
    pub fn lines(&self) -> TreeLines<'_> {
        TreeLines::new(&self.devices)
    }
}

#[derive(Debug, Deserialize)]
struct RawEnumeration {
    #[serde(alias = "blockdevices")]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    size: Option<RawSize>,
    #[serde(default)]
    children: Vec<RawDevice>,
    mountpoint: Option<String>,
    /// lsblk >= 2.37 reports every mount point
    #[serde(default)]
    mountpoints: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Text(String),
}

fn materialize(raw: RawDevice, parent: &str, depth: usize) -> Result<DeviceNode> {
    if depth >= MAX_DEPTH {
        return Err(DiskmonError::Parse(format!(
            "device tree under '{}' nests deeper than {} levels",
            parent, MAX_DEPTH
        )));
    }

    let name = match raw.name {
        Some(name) if !name.trim().is_empty() => name,
        _ if parent.is_empty() => {
            return Err(DiskmonError::Parse("root device without a name".to_string()));
        }
        _ => {
            return Err(DiskmonError::Parse(format!("child of '{}' has no name", parent)));
        }
    };

    let size_bytes = match raw.size {
        None => 0,
        Some(RawSize::Bytes(bytes)) => bytes,
        Some(RawSize::Text(text)) => parse_size(&text)
            .map_err(|e| DiskmonError::Parse(format!("device '{}': {}", name, e)))?,
    };

    let device_type = raw
        .kind
        .as_deref()
        .map(DeviceType::from_lsblk)
        .unwrap_or(DeviceType::Unknown);

    let mountpoint = raw
        .mountpoint
        .or_else(|| raw.mountpoints.into_iter().flatten().next())
        .filter(|m| !m.is_empty());

    let children = raw
        .children
        .into_iter()
        .map(|child| materialize(child, &name, depth + 1))
        .collect::<Result<Vec<_>>>()?;

    Ok(DeviceNode {
        name,
        device_type,
        size_bytes,
        mountpoint,
        children,
    })
}
