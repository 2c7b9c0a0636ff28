//! Screen-space boxes and their pairing with features

use crate::host::QueryFeature;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Axis-aligned box in screen pixel coordinates
///
/// Corners are kept exactly as computed: a degenerate or inverted box (for instance
/// `tl_x > br_x`) is a legitimate result and is never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScreenBox {
    /// X-coordinate of the top-left corner
    pub tl_x: f64,
    /// Y-coordinate of the top-left corner
    pub tl_y: f64,
    /// X-coordinate of the bottom-right corner
    pub br_x: f64,
    /// Y-coordinate of the bottom-right corner
    pub br_y: f64,
}

impl ScreenBox {
    /// Create a box from its top-left and bottom-right corners
    pub fn new(tl_x: f64, tl_y: f64, br_x: f64, br_y: f64) -> Self {
        Self {
            tl_x,
            tl_y,
            br_x,
            br_y,
        }
    }

    /// Whether the box has zero width or zero height
    pub fn is_degenerate(&self) -> bool {
        self.tl_x == self.br_x || self.tl_y == self.br_y
    }
}

/// A collision box together with the feature it was placed for
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureBox {
    /// Box of the feature's icon on screen
    pub screen_box: ScreenBox,
    /// Feature as returned by the renderer's query index
    pub feature: QueryFeature,
}

/// Returns whether two boxes intersect
///
/// Uses strict comparisons, so boxes that only touch along an edge do not intersect.
/// Well defined for any pair of boxes, including inverted ones.
#[inline]
pub fn boxes_intersect(box1: &ScreenBox, box2: &ScreenBox) -> bool {
    box1.tl_x < box2.br_x && box1.tl_y < box2.br_y && box2.tl_x < box1.br_x && box2.tl_y < box1.br_y
}
