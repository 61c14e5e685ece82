//! Indented text rendering of a device forest.
//!
//! Produces one line per device in depth-first order:
//!
//! ```text
//! sda (disk, 447.1G)
//! ├─ sda1 (partition, 600M) /boot
//! └─ sda2 (partition, 446.5G) /
//! ```

use super::size::format_size;
use super::tree::DeviceNode;

const BRANCH: &str = "├─ ";
const LAST_BRANCH: &str = "└─ ";
const PIPE: &str = "│  ";
const BLANK: &str = "   ";

/// Format a single device without any tree prefix
pub fn describe(node: &DeviceNode) -> String {
    let mut line = format!("{} ({}, {})", node.name, node.device_type, format_size(node.size_bytes));
    if let Some(mountpoint) = &node.mountpoint {
        line.push(' ');
        line.push_str(mountpoint);
    }
    line
}

struct Frame<'a> {
    siblings: &'a [DeviceNode],
    index: usize,
    prefix: String,
}

/// Lazy depth-first line iterator over a slice of root devices
pub struct TreeLines<'a> {
    stack: Vec<Frame<'a>>,
}

impl<'a> TreeLines<'a> {
    pub fn new(roots: &'a [DeviceNode]) -> Self {
        Self {
            stack: vec![Frame {
                siblings: roots,
                index: 0,
                prefix: String::new(),
            }],
        }
    }
}

impl Iterator for TreeLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let depth = self.stack.len();
            let frame = self.stack.last_mut()?;

            let Some(node) = frame.siblings.get(frame.index) else {
                self.stack.pop();
                continue;
            };
            frame.index += 1;
            let is_last = frame.index == frame.siblings.len();

            // roots carry no glyph
            let (line, child_prefix) = if depth == 1 {
                (describe(node), String::new())
            } else {
                let glyph = if is_last { LAST_BRANCH } else { BRANCH };
                let cont = if is_last { BLANK } else { PIPE };
                (
                    format!("{}{}{}", frame.prefix, glyph, describe(node)),
                    format!("{}{}", frame.prefix, cont),
                )
            };

            if !node.children.is_empty() {
                self.stack.push(Frame {
                    siblings: &node.children,
                    index: 0,
                    prefix: child_prefix,
                });
            }

            return Some(line);
        }
    }
}
