//! Output normalization
//!
//! Turns raw diagnostic/enumeration output into typed models.

pub mod render;
pub mod size;
pub mod smart;
pub mod tree;

pub use render::{TreeLines, describe};
pub use size::{format_size, parse_size};
pub use smart::{SmartStatus, classify};
pub use tree::{DeviceForest, DeviceNode, DeviceType};
