//! Class colors.
//!
//! Views color samples by class; colors come from the project configuration
//! either as `#rrggbb`/`#rrggbbaa` hex strings or as `[0, 1]` float channels.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An RGBA color with `[0, 1]` float channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    /// Create a fully opaque color.
    pub fn opaque(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse a hex color string: `#rrggbb` or `#rrggbbaa`, `#` optional.
    pub fn from_hex(hex: &str) -> Result<Self, CoreError> {
        let trimmed = hex.trim().trim_start_matches('#');
        if trimmed.len() != 6 && trimmed.len() != 8 {
            return Err(CoreError::InvalidColor(hex.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| -> Result<f32, CoreError> {
            u8::from_str_radix(&trimmed[range], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| CoreError::InvalidColor(hex.to_string()))
        };

        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
            a: if trimmed.len() == 8 { channel(6..8)? } else { 1.0 },
        })
    }

    /// Return the same color with a different alpha.
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { a: alpha, ..self }
    }
}

/// Default color for the reserved "unclassified" class: opaque yellow.
impl Default for Rgba {
    fn default() -> Self {
        Self::opaque(1.0, 1.0, 0.0)
    }
}
