//! Collector configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placement timeout used by [`crate::collect_collision_boxes_and_features`]
pub const DEFAULT_PLACEMENT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Interval at which the placement state is polled
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Sign of the padding applied to the bottom edge of a box
///
/// Two historical variants of the renderer's box computation disagree on this edge. The
/// top, left and right edges are always padded outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BottomPadding {
    /// `br_y = (y2 * scale + padding) * tile_to_viewport + screen_y`
    #[default]
    Outward,
    /// `br_y = (y2 * scale - padding) * tile_to_viewport + screen_y`
    Inward,
}

impl BottomPadding {
    /// Padding term added to the bottom edge
    #[inline]
    pub fn signed(self, padding: f64) -> f64 {
        match self {
            Self::Outward => padding,
            Self::Inward => -padding,
        }
    }
}

/// Configuration for collision box collection
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollectorConfig {
    /// How long to wait for a pending placement pass before giving up.
    /// Default: 5 s
    pub placement_timeout: Duration,
    /// Interval between two checks of the placement state.
    /// Default: 30 ms
    pub poll_interval: Duration,
    /// Padding sign of the bottom edge.
    /// Default: [`BottomPadding::Outward`]
    pub bottom_padding: BottomPadding,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            placement_timeout: DEFAULT_PLACEMENT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            bottom_padding: BottomPadding::default(),
        }
    }
}
