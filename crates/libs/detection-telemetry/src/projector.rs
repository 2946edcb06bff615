//! Projection of bounding boxes onto a resolution-independent grid

use serde::{Deserialize, Serialize};

use crate::config::FrameConfig;
use crate::detection::BoundingBox;

/// A box center on the coarse grid, each axis in `[0, grid_size]`
///
/// Ordering is lexicographic on `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: u32,
    pub y: u32,
}

impl GridPosition {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in grid units
    pub fn distance(&self, other: &GridPosition) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Maps pixel boxes of a fixed-size frame onto the grid
#[derive(Debug, Clone, Copy)]
pub struct GridProjector {
    frame_width: f64,
    frame_height: f64,
    grid_size: u32,
}

impl GridProjector {
    pub fn new(frame_width: u32, frame_height: u32, grid_size: u32) -> Self {
        Self {
            frame_width: frame_width as f64,
            frame_height: frame_height as f64,
            grid_size,
        }
    }

    pub fn from_config(config: &FrameConfig) -> Self {
        Self::new(config.width, config.height, config.grid_size)
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Project a box center; degenerate boxes clamp to the grid edges
    pub fn project(&self, bbox: &BoundingBox) -> GridPosition {
        let (cx, cy) = bbox.center();
        GridPosition {
            x: self.to_cell(cx as f64, self.frame_width),
            y: self.to_cell(cy as f64, self.frame_height),
        }
    }

    fn to_cell(&self, center: f64, extent: f64) -> u32 {
        let grid = self.grid_size as f64;
        let scaled = (center / extent * grid).round();
        if scaled.is_nan() {
            return 0;
        }
        scaled.clamp(0.0, grid) as u32
    }
}
