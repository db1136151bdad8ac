//! Shared test utilities for the ioc-overlays workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Record, geometry and descriptor fixtures
//! - A recording [`MapBackend`](layer_engine::MapBackend)
//! - A scripted [`LayerFetcher`](layer_engine::LayerFetcher)
//! - Approximate float assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, RecordingBackend, ScriptedFetcher};
//! ```

pub mod backend;
pub mod fetcher;
pub mod fixtures;

pub use backend::{BackendEvent, BackendLog, RecordingBackend};
pub use fetcher::{Scripted, ScriptedFetcher};

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Approximate equality of two positions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_position_approx_eq;
///
/// assert_position_approx_eq!(Position::new(-6.2, 106.8), Position::new(-6.2000001, 106.8), 1e-6);
/// ```
#[macro_export]
macro_rules! assert_position_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        $crate::assert_approx_eq!(left.lat, right.lat, $epsilon);
        $crate::assert_approx_eq!(left.lng, right.lng, $epsilon);
    }};
}
