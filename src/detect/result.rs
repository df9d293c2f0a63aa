/// Axis-aligned box in normalized image coordinates (0..1 of width/height).
///
/// Backends own the conversion from their native output order; SSD-style models
/// emit `[y_min, x_min, y_max, x_max]` and must be mapped field by field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Build from the SSD output layout `[y_min, x_min, y_max, x_max]`.
    pub fn from_yxyx(coords: [f32; 4]) -> Self {
        Self::new(coords[1], coords[0], coords[3], coords[2])
    }

    /// Horizontal center of the box.
    pub fn center_x(&self) -> f32 {
        (self.x_min + self.x_max) / 2.0
    }
}

/// One raw object proposal from a backend. Lives for a single request.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    /// Confidence in [0, 1].
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: u32, score: f32) -> Self {
        Self {
            bbox,
            class_id,
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yxyx_layout_maps_x_from_odd_indices() {
        let bbox = BoundingBox::from_yxyx([0.1, 0.2, 0.5, 0.6]);
        assert_eq!(bbox.x_min, 0.2);
        assert_eq!(bbox.y_min, 0.1);
        assert_eq!(bbox.x_max, 0.6);
        assert_eq!(bbox.y_max, 0.5);
        assert!((bbox.center_x() - 0.4).abs() < 1e-6);
    }
}
