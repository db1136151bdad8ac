//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::Position;

/// A geographic bounding box in degrees.
///
/// `x` is longitude and `y` is latitude, matching the order map backends
/// expect for viewport fits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A zero-extent box around a single position.
    pub fn around(position: Position) -> Self {
        Self::new(position.lng, position.lat, position.lng, position.lat)
    }

    /// Smallest box enclosing every finite position, or `None` if there are none.
    pub fn from_positions<I>(positions: I) -> Option<Self>
    where
        I: IntoIterator<Item = Position>,
    {
        let mut bbox: Option<BoundingBox> = None;
        for p in positions {
            if !p.is_finite() {
                continue;
            }
            match bbox.as_mut() {
                Some(b) => b.extend(p),
                None => bbox = Some(Self::around(p)),
            }
        }
        bbox
    }

    /// Grow the box to include a position.
    pub fn extend(&mut self, position: Position) {
        self.min_x = self.min_x.min(position.lng);
        self.max_x = self.max_x.max(position.lng);
        self.min_y = self.min_y.min(position.lat);
        self.max_y = self.max_y.max(position.lat);
    }

    /// Width of the bounding box in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Zero width or zero height.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// All four corners are finite.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// Expand a zero-extent axis by `margin` degrees on each side.
    pub fn padded_if_degenerate(mut self, margin: f64) -> Self {
        if self.width() <= 0.0 {
            self.min_x -= margin;
            self.max_x += margin;
        }
        if self.height() <= 0.0 {
            self.min_y -= margin;
            self.max_y += margin;
        }
        self
    }

    /// Check if a position is contained within this bbox.
    pub fn contains(&self, position: Position) -> bool {
        position.lng >= self.min_x
            && position.lng <= self.max_x
            && position.lat >= self.min_y
            && position.lat <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_positions() {
        let bbox = BoundingBox::from_positions(vec![
            Position::new(-6.20, 106.80),
            Position::new(-6.25, 106.85),
            Position::new(-6.10, 106.70),
        ])
        .unwrap();
        assert_eq!(bbox.min_x, 106.70);
        assert_eq!(bbox.max_x, 106.85);
        assert_eq!(bbox.min_y, -6.25);
        assert_eq!(bbox.max_y, -6.10);
    }

    #[test]
    fn test_from_positions_skips_non_finite() {
        let bbox = BoundingBox::from_positions(vec![
            Position::new(f64::NAN, 106.80),
            Position::new(-6.2, f64::INFINITY),
        ]);
        assert!(bbox.is_none());
    }

    #[test]
    fn test_padding_only_touches_zero_axes() {
        let bbox = BoundingBox::new(106.0, -6.0, 107.0, -6.0).padded_if_degenerate(0.5);
        assert_eq!(bbox.min_x, 106.0);
        assert_eq!(bbox.max_x, 107.0);
        assert_eq!(bbox.min_y, -6.5);
        assert_eq!(bbox.max_y, -5.5);
        assert!(!bbox.is_degenerate());
    }
}
