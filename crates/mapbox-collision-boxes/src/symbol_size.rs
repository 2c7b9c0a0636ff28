//! Symbol size evaluation at a zoom level
//!
//! Reproduces how the renderer turns a bucket's icon size descriptor into the size uniforms
//! of the current frame. Camera-scoped sizes resolve to a concrete size here; composite sizes
//! only resolve their zoom fraction and leave the feature-dependent part to the bucket.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interpolation curve between two zoom stops
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InterpolationDescriptor {
    Linear,
    Exponential { base: f64 },
    CubicBezier { control_points: [f64; 4] },
}

/// Size descriptor of a symbol bucket
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SizeDescriptor {
    /// Same size everywhere
    Constant { layout_size: f64 },
    /// Data-driven only, no zoom dependency
    Source,
    /// Zoom-driven only
    Camera {
        min_zoom: f64,
        max_zoom: f64,
        min_size: f64,
        max_size: f64,
        interpolation: Option<InterpolationDescriptor>,
    },
    /// Zoom- and data-driven
    Composite {
        min_zoom: f64,
        max_zoom: f64,
        interpolation: Option<InterpolationDescriptor>,
    },
}

/// Partially evaluated size for one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InterpolatedSize {
    /// Concrete size (constant and camera descriptors)
    pub size: f64,
    /// Zoom interpolation fraction (composite descriptors)
    pub size_t: f64,
}

/// Evaluate a size descriptor at `zoom`
pub fn evaluate_size_for_zoom(descriptor: &SizeDescriptor, zoom: f64) -> InterpolatedSize {
    match *descriptor {
        SizeDescriptor::Constant { layout_size } => InterpolatedSize {
            size: layout_size,
            size_t: 0.0,
        },
        SizeDescriptor::Source => InterpolatedSize::default(),
        SizeDescriptor::Camera {
            min_zoom,
            max_zoom,
            min_size,
            max_size,
            interpolation,
        } => {
            let t = clamped_factor(interpolation.as_ref(), zoom, min_zoom, max_zoom);
            InterpolatedSize {
                size: interpolate(min_size, max_size, t),
                size_t: 0.0,
            }
        }
        SizeDescriptor::Composite {
            min_zoom,
            max_zoom,
            interpolation,
        } => InterpolatedSize {
            size: 0.0,
            size_t: clamped_factor(interpolation.as_ref(), zoom, min_zoom, max_zoom),
        },
    }
}

fn clamped_factor(
    interpolation: Option<&InterpolationDescriptor>,
    zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
) -> f64 {
    match interpolation {
        Some(interpolation) => {
            interpolation_factor(interpolation, zoom, min_zoom, max_zoom).clamp(0.0, 1.0)
        }
        None => 0.0,
    }
}

/// Fraction of the way `input` lies between `lower` and `upper` along an interpolation curve
///
/// Not clamped: inputs outside the stops extrapolate (except for cubic-bezier curves, whose
/// solver clamps to the curve ends).
pub fn interpolation_factor(
    interpolation: &InterpolationDescriptor,
    input: f64,
    lower: f64,
    upper: f64,
) -> f64 {
    match *interpolation {
        InterpolationDescriptor::Exponential { base } => {
            exponential_interpolation(input, base, lower, upper)
        }
        InterpolationDescriptor::Linear => exponential_interpolation(input, 1.0, lower, upper),
        InterpolationDescriptor::CubicBezier { control_points: [x1, y1, x2, y2] } => {
            UnitBezier::new(x1, y1, x2, y2).solve(
                exponential_interpolation(input, 1.0, lower, upper),
                UnitBezier::DEFAULT_EPSILON,
            )
        }
    }
}

#[inline]
fn interpolate(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

fn exponential_interpolation(input: f64, base: f64, lower: f64, upper: f64) -> f64 {
    let difference = upper - lower;
    let progress = input - lower;
    if difference == 0.0 {
        0.0
    } else if base == 1.0 {
        progress / difference
    } else {
        (base.powf(progress) - 1.0) / (base.powf(difference) - 1.0)
    }
}

/// Cubic Bézier easing curve through `(0, 0)` and `(1, 1)`
///
/// Same solver as the renderer's: a few Newton steps, then bisection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitBezier {
    ax: f64,
    bx: f64,
    cx: f64,
    ay: f64,
    by: f64,
    cy: f64,
}

impl UnitBezier {
    pub const DEFAULT_EPSILON: f64 = 1e-6;

    const NEWTON_ITERATIONS: usize = 8;
    const BISECTION_ITERATIONS: usize = 20;

    /// Create a curve from its two inner control points
    pub fn new(p1x: f64, p1y: f64, p2x: f64, p2y: f64) -> Self {
        let cx = 3.0 * p1x;
        let bx = 3.0 * (p2x - p1x) - cx;
        let ay_cy = 3.0 * p1y;
        let by = 3.0 * (p2y - p1y) - ay_cy;
        Self {
            ax: 1.0 - cx - bx,
            bx,
            cx,
            ay: 1.0 - ay_cy - by,
            by,
            cy: ay_cy,
        }
    }

    #[inline]
    fn sample_curve_x(&self, t: f64) -> f64 {
        ((self.ax * t + self.bx) * t + self.cx) * t
    }

    #[inline]
    fn sample_curve_y(&self, t: f64) -> f64 {
        ((self.ay * t + self.by) * t + self.cy) * t
    }

    #[inline]
    fn sample_curve_derivative_x(&self, t: f64) -> f64 {
        (3.0 * self.ax * t + 2.0 * self.bx) * t + self.cx
    }

    /// Curve parameter whose x-coordinate is `x`
    pub fn solve_curve_x(&self, x: f64, epsilon: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        if x > 1.0 {
            return 1.0;
        }

        let mut t = x;
        for _ in 0..Self::NEWTON_ITERATIONS {
            let x2 = self.sample_curve_x(t) - x;
            if x2.abs() < epsilon {
                return t;
            }
            let d2 = self.sample_curve_derivative_x(t);
            if d2.abs() < 1e-6 {
                break;
            }
            t -= x2 / d2;
        }

        // Newton did not converge
        let mut t0 = 0.0;
        let mut t1 = 1.0;
        t = x;
        for _ in 0..Self::BISECTION_ITERATIONS {
            let x2 = self.sample_curve_x(t);
            if (x2 - x).abs() < epsilon {
                break;
            }
            if x > x2 {
                t0 = t;
            } else {
                t1 = t;
            }
            t = (t1 - t0) * 0.5 + t0;
        }
        t
    }

    /// The curve's y-coordinate at x-coordinate `x`
    pub fn solve(&self, x: f64, epsilon: f64) -> f64 {
        self.sample_curve_y(self.solve_curve_x(x, epsilon))
    }
}
