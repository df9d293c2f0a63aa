//! Confidence filtering and left/center/right bucketing.
//!
//! Everything here is a pure function of its inputs. Thresholds and bounds
//! are injected so the same code can be exercised across any configuration.

use serde::Serialize;

use crate::detect::Detection;
use crate::labels::LabelTable;

/// Coarse horizontal position of an object relative to the camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Left,
    Center,
    Right,
}

impl Location {
    /// Bucket a horizontal center. The left test runs first, so with
    /// inverted bounds nothing is ever `Center`.
    pub fn from_center(center_x: f32, left_bound: f32, right_bound: f32) -> Self {
        if center_x < left_bound {
            Location::Left
        } else if center_x > right_bound {
            Location::Right
        } else {
            Location::Center
        }
    }
}

/// A detection resolved to a label and a spatial bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocatedObject {
    pub label: String,
    pub location: Location,
}

impl LocatedObject {
    pub fn new(label: impl Into<String>, location: Location) -> Self {
        Self {
            label: label.into(),
            location,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocatorParams {
    pub confidence_threshold: f32,
    pub left_bound: f32,
    pub right_bound: f32,
    pub max_objects: usize,
}

/// Filter, bucket, and order detections, without truncation.
///
/// Drops detections below the threshold or without a label, then moves every
/// `Center` object ahead of the rest. The sort is stable, so detector order
/// is kept inside each group.
pub fn locate_all(
    detections: &[Detection],
    labels: &LabelTable,
    params: &LocatorParams,
) -> Vec<LocatedObject> {
    let mut located: Vec<LocatedObject> = detections
        .iter()
        .filter(|d| d.score >= params.confidence_threshold)
        .filter_map(|d| {
            let label = labels.get(d.class_id)?;
            let location =
                Location::from_center(d.bbox.center_x(), params.left_bound, params.right_bound);
            Some(LocatedObject::new(label, location))
        })
        .collect();
    located.sort_by_key(|obj| obj.location != Location::Center);
    located
}

/// [`locate_all`] truncated to `params.max_objects`.
pub fn filter_and_locate(
    detections: &[Detection],
    labels: &LabelTable,
    params: &LocatorParams,
) -> Vec<LocatedObject> {
    let mut located = locate_all(detections, labels, params);
    located.truncate(params.max_objects);
    located
}
