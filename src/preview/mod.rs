pub mod capture;
pub mod document;
pub mod registry;
pub mod sandbox;

use serde::{Deserialize, Serialize};

/// Fixed preview container widths. Device mode changes nothing about
/// evaluation or isolation, only how wide the sandbox container is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMode {
    Desktop,
    Tablet,
    Mobile,
}

impl DeviceMode {
    pub const ALL: [DeviceMode; 3] = [DeviceMode::Desktop, DeviceMode::Tablet, DeviceMode::Mobile];

    /// `None` means full width.
    pub fn width(&self) -> Option<f32> {
        match self {
            Self::Desktop => None,
            Self::Tablet => Some(768.0),
            Self::Mobile => Some(375.0),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Desktop => "Desktop",
            Self::Tablet => "Tablet",
            Self::Mobile => "Mobile",
        }
    }
}
