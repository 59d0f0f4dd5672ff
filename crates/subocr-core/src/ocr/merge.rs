//! Line merging of word-level boxes.

use tracing::debug;

use crate::geometry::{Point2D, Quad};

/// Default vertical distance, in pixels, between neighbouring box centers
/// that still counts as the same line.
pub const DEFAULT_MERGE_THRESHOLD: f32 = 10.0;

/// Groups boxes into lines by the mean y of their corners.
///
/// Boxes are sorted by mean y and a new line starts whenever the gap to the
/// previous box exceeds the threshold. The gap is measured against the
/// immediate neighbour, not the first box of the line, so a slow drift can
/// chain many boxes into one line even when its ends are far apart.
#[derive(Debug, Clone, Copy)]
pub struct LineMerger {
    threshold: f32,
}

impl Default for LineMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_THRESHOLD)
    }
}

impl LineMerger {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Sort boxes by mean y and split them into line groups.
    pub fn group(&self, mut boxes: Vec<Quad>) -> Vec<Vec<Quad>> {
        boxes.sort_by(|a, b| a.mean_y().total_cmp(&b.mean_y()));

        let mut groups: Vec<Vec<Quad>> = Vec::new();
        let mut prev_y: Option<f32> = None;
        for quad in boxes {
            let y = quad.mean_y();
            let new_line = prev_y.is_none_or(|prev| y - prev > self.threshold);
            match groups.last_mut() {
                Some(group) if !new_line => group.push(quad),
                _ => groups.push(vec![quad]),
            }
            prev_y = Some(y);
        }
        groups
    }

    /// Merge boxes into one enclosing quad per line, top line first.
    pub fn merge(&self, boxes: Vec<Quad>) -> Vec<Quad> {
        let count = boxes.len();
        let merged: Vec<Quad> = self.group(boxes).iter().map(|g| merge_group(g)).collect();
        debug!("Merged {} boxes into {} lines", count, merged.len());
        merged
    }
}

/// Elementwise min over top-left and bottom-left corners, max over top-right
/// and bottom-right corners.
fn merge_group(group: &[Quad]) -> Quad {
    let corner = |index: usize, pick: fn(f32, f32) -> f32| {
        let mut points = group.iter().map(|q| q.0[index]);
        let first = points.next().unwrap_or_default();
        points.fold(first, |acc, p| Point2D::new(pick(acc.x, p.x), pick(acc.y, p.y)))
    };

    Quad::new(
        corner(0, f32::min),
        corner(1, f32::max),
        corner(2, f32::max),
        corner(3, f32::min),
    )
}
