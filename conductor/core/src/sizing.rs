//! Window Sizing
//!
//! The avatar window grows to fit the chat bubble and shrinks back to the
//! bare avatar when the bubble is hidden. [`compute_size`] is the pure rule;
//! [`SizingReactor`] remembers what the host last accepted so identical
//! inputs never trigger a second `resize_avatar_window`.
//!
//! The host resizes around the window's bottom-right corner
//! ([`WindowGeometry::resize_anchored`]) so the avatar stays put on screen
//! while the bubble expands up and to the left.

use serde::{Deserialize, Serialize};

/// Window size in logical pixels
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowDimensions {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl WindowDimensions {
    /// Create dimensions
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Layout constants for the avatar window
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Size when only the avatar is shown
    pub default_size: WindowDimensions,
    /// Bubble width before scaling
    pub bubble_width: f64,
    /// Padding around the bubble content
    pub bubble_padding: f64,
    /// Space reserved for the avatar below the bubble
    pub avatar_height: f64,
    /// Upper bound for the scaled window height
    pub max_height: f64,
    /// UI scale factor
    pub scale: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            default_size: WindowDimensions::new(200.0, 200.0),
            bubble_width: 360.0,
            bubble_padding: 32.0,
            avatar_height: 200.0,
            max_height: 640.0,
            scale: 1.0,
        }
    }
}

/// Target window size for the current bubble state
///
/// Without a visible turn, or before the bubble has a usable measurement
/// (finite and positive), the window falls back to the avatar-only size.
#[must_use]
pub fn compute_size(
    turn_visible: bool,
    measured: Option<f64>,
    config: &SizingConfig,
) -> WindowDimensions {
    let measured = match measured {
        Some(height) if turn_visible && height.is_finite() && height > 0.0 => height,
        _ => return config.default_size,
    };

    let height = (measured + config.bubble_padding + config.avatar_height) * config.scale;
    WindowDimensions {
        width: config.bubble_width * config.scale,
        height: height.min(config.max_height),
    }
}

/// Tracks bubble measurements and the last size pushed to the host
#[derive(Debug, Default)]
pub struct SizingReactor {
    measured: Option<f64>,
    last_pushed: Option<WindowDimensions>,
}

impl SizingReactor {
    /// Create a reactor that has pushed nothing yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bubble content height reported by the view
    pub fn set_measurement(&mut self, height: f64) {
        self.measured = Some(height);
    }

    /// Forget the measurement (new turn, nothing laid out yet)
    pub fn clear_measurement(&mut self) {
        self.measured = None;
    }

    /// Dimensions the host last accepted
    #[must_use]
    pub fn last_pushed(&self) -> Option<WindowDimensions> {
        self.last_pushed
    }

    /// Target size, or `None` if the host already has it
    ///
    /// Nothing is recorded until [`Self::commit`], so a push the host
    /// rejected is attempted again on the next observation.
    #[must_use]
    pub fn target(&self, turn_visible: bool, config: &SizingConfig) -> Option<WindowDimensions> {
        let target = compute_size(turn_visible, self.measured, config);
        (self.last_pushed != Some(target)).then_some(target)
    }

    /// Record that the host applied `dims`
    pub fn commit(&mut self, dims: WindowDimensions) {
        self.last_pushed = Some(dims);
    }
}

/// On-screen window rectangle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowGeometry {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl WindowGeometry {
    /// Right edge
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Resize keeping the right and bottom edges fixed
    #[must_use]
    pub fn resize_anchored(&self, size: WindowDimensions) -> Self {
        Self {
            x: self.right() - size.width,
            y: self.bottom() - size.height,
            width: size.width,
            height: size.height,
        }
    }
}
