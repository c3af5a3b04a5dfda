//! Fixed-point arithmetic for Paragon.

mod scaled;

pub use scaled::{badness, fract, xn_over_d, Scaled, INF_BAD, MAX_HALFWORD, UNITY};
