//! Geographic bounding boxes and longitude convention handling.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// `min_x`/`max_x` are the west/east longitudes, `min_y`/`max_y` the
/// south/north latitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from (west, south, east, north).
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parse a "west,south,east,north" string.
    pub fn from_extent_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let parse = |value: &str| {
            value
                .parse::<f64>()
                .map_err(|_| BboxParseError::InvalidNumber(value.to_string()))
        };

        Ok(Self {
            min_x: parse(parts[0])?,
            min_y: parse(parts[1])?,
            max_x: parse(parts[2])?,
            max_y: parse(parts[3])?,
        })
    }

    /// Convert a signed-longitude (-180..180) box into the unsigned
    /// "degrees_east" (0..360) convention used by remote grid sources.
    ///
    /// Negative longitudes become `360 + lon`; latitudes pass through.
    /// Boxes straddling the 0/360 seam come out with `min_x > max_x` and
    /// are returned as-is.
    pub fn to_unsigned_longitude(&self) -> BoundingBox {
        let wrap = |lon: f64| if lon < 0.0 { 360.0 + lon } else { lon };
        BoundingBox {
            min_x: wrap(self.min_x),
            min_y: self.min_y,
            max_x: wrap(self.max_x),
            max_y: self.max_y,
        }
    }

    /// True when the normalized box wraps the 0/360 seam and a plain
    /// `[min_x, max_x]` range over a longitude axis will be empty.
    pub fn crosses_seam(&self) -> bool {
        self.min_x > self.max_x
    }

    /// Check if a point is contained within this bbox (inclusive bounds).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Tuple form `(west, south, east, north)`.
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid extent format: {0}. Expected 'west,south,east,north'")]
    InvalidFormat(String),

    #[error("Invalid number in extent: {0}")]
    InvalidNumber(String),
}
