use crate::types::{AreaCount, CleanRecord, ProtectedArea};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::BTreeMap;
use tracing::debug;

// Wrapper for RTree indexing
struct AreaEntry {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Protected areas plus an R-tree over their bounding boxes.
///
/// Built once and shared read-only between requests.
pub struct AreaIndex {
    areas: Vec<ProtectedArea>,
    tree: RTree<AreaEntry>,
}

impl AreaIndex {
    pub fn new(areas: Vec<ProtectedArea>) -> Self {
        let entries: Vec<AreaEntry> = areas
            .iter()
            .enumerate()
            .filter_map(|(index, area)| {
                // empty geometries have no box and can never contain a point
                let rect = area.geometry.bounding_rect()?;
                Some(AreaEntry {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        debug!("Built spatial index for {} areas", entries.len());

        AreaIndex {
            areas,
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Indices of every area whose polygon contains the point. Points on a
    /// boundary are not contained.
    fn containing(&self, point: &Point<f64>) -> Vec<usize> {
        let envelope = AABB::from_point([point.x(), point.y()]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| self.areas[entry.index].geometry.contains(point))
            .map(|entry| entry.index)
            .collect()
    }

    /// Left spatial join: number of records inside each area, keyed by area
    /// code in ascending order. Areas with no records report zero; a record
    /// inside overlapping areas counts once for each.
    pub fn count_records(&self, records: &[CleanRecord]) -> Vec<AreaCount> {
        let per_area = records
            .par_iter()
            .filter_map(|record| record.location.as_ref())
            .fold(
                || vec![0usize; self.areas.len()],
                |mut counts, point| {
                    for index in self.containing(point) {
                        counts[index] += 1;
                    }
                    counts
                },
            )
            .reduce(
                || vec![0usize; self.areas.len()],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            );

        let mut by_code: BTreeMap<&str, usize> = BTreeMap::new();
        for (area, count) in self.areas.iter().zip(per_area) {
            *by_code.entry(area.code.as_str()).or_insert(0) += count;
        }

        by_code
            .into_iter()
            .map(|(code, count)| AreaCount {
                code: code.to_string(),
                count,
            })
            .collect()
    }
}
