//! Running width totals.

use std::ops::{Add, AddAssign, Sub, SubAssign};

use paragon_utils::Scaled;

use crate::glue::GlueSpec;

/// A six-component width total: natural width, stretch at each infinity
/// order, and shrink. The breaker keeps several of these running while it
/// scans (`background`, `active_width`, `cur_active_width`, `break_width`)
/// and stores their differences in delta nodes.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct WidthVec {
    pub width: Scaled,
    /// Stretch by glue order: normal, fil, fill, filll.
    pub stretch: [Scaled; 4],
    pub shrink: Scaled,
}

impl WidthVec {
    /// The all-zero total.
    pub const ZERO: Self = Self {
        width: Scaled::ZERO,
        stretch: [Scaled::ZERO; 4],
        shrink: Scaled::ZERO,
    };

    /// Adds a glue specification's contributions.
    pub fn add_spec(&mut self, spec: &GlueSpec) {
        self.width += spec.width;
        self.stretch[spec.stretch_order.index()] += spec.stretch;
        self.shrink += spec.shrink;
    }

    /// Removes a glue specification's contributions.
    pub fn sub_spec(&mut self, spec: &GlueSpec) {
        self.width -= spec.width;
        self.stretch[spec.stretch_order.index()] -= spec.stretch;
        self.shrink -= spec.shrink;
    }

    /// Whether any infinite stretch is available.
    pub fn has_infinite_stretch(&self) -> bool {
        !self.stretch[1].is_zero()
            || !self.stretch[2].is_zero()
            || !self.stretch[3].is_zero()
    }
}

impl Add for WidthVec {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for WidthVec {
    fn add_assign(&mut self, rhs: Self) {
        self.width += rhs.width;
        for (a, b) in self.stretch.iter_mut().zip(rhs.stretch) {
            *a += b;
        }
        self.shrink += rhs.shrink;
    }
}

impl Sub for WidthVec {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        self -= rhs;
        self
    }
}

impl SubAssign for WidthVec {
    fn sub_assign(&mut self, rhs: Self) {
        self.width -= rhs.width;
        for (a, b) in self.stretch.iter_mut().zip(rhs.stretch) {
            *a -= b;
        }
        self.shrink -= rhs.shrink;
    }
}
