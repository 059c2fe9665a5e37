//! In-memory R-tree over region polygons.
//!
//! Candidate regions are found by bounding box, then confirmed with an
//! exact point-in-polygon test. Regions are expected to tile the country
//! without overlap; if they do overlap, the region listed first wins.

use geo::{BoundingRect, Contains, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};

use crate::Region;

/// A region's bounding box stored in the R-tree, pointing back into the
/// region slice.
struct RegionEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index for point-in-region lookups.
///
/// Borrows the region slice; built once per run and shared read-only
/// across worker threads.
pub struct RegionIndex<'a> {
    regions: &'a [Region],
    tree: RTree<RegionEntry>,
}

impl<'a> RegionIndex<'a> {
    /// Bulk-loads the R-tree from `regions`.
    #[must_use]
    pub fn build(regions: &'a [Region]) -> Self {
        let entries = regions
            .iter()
            .enumerate()
            .map(|(index, region)| RegionEntry {
                index,
                envelope: compute_envelope(&region.polygon),
            })
            .collect();

        let tree = RTree::bulk_load(entries);
        log::debug!("Built region index over {} regions", tree.size());

        Self { regions, tree }
    }

    /// The indexed regions.
    #[must_use]
    pub const fn regions(&self) -> &'a [Region] {
        self.regions
    }

    /// Returns the index of the region whose interior contains the point.
    ///
    /// Points on a shared boundary belong to no region. When several
    /// regions contain the point, the lowest index wins.
    #[must_use]
    pub fn locate(&self, lon: f64, lat: f64) -> Option<usize> {
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| self.regions[entry.index].polygon.contains(&point))
            .map(|entry| entry.index)
            .min()
    }

    /// Returns the region containing the point, if any.
    #[must_use]
    pub fn lookup(&self, lon: f64, lat: f64) -> Option<&'a Region> {
        self.locate(lon, lat).map(|i| &self.regions[i])
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::square;

    #[test]
    fn locates_containing_region() {
        let regions = vec![
            square("01101", 141.0, 43.0, 1.0),
            square("01102", 142.0, 43.0, 1.0),
        ];
        let index = RegionIndex::build(&regions);

        assert_eq!(index.locate(141.5, 43.5), Some(0));
        assert_eq!(index.locate(142.5, 43.5), Some(1));
        assert_eq!(
            index.lookup(142.5, 43.5).map(|r| r.code.as_str()),
            Some("01102")
        );
    }

    #[test]
    fn outside_and_boundary_points_are_unassigned() {
        let regions = vec![square("01101", 141.0, 43.0, 1.0)];
        let index = RegionIndex::build(&regions);

        assert_eq!(index.locate(150.0, 43.5), None);
        assert_eq!(index.locate(141.0, 43.5), None);
    }

    #[test]
    fn overlapping_regions_prefer_first_listed() {
        let regions = vec![
            square("13101", 139.0, 35.0, 1.0),
            square("13102", 139.5, 35.0, 1.0),
        ];
        let index = RegionIndex::build(&regions);
        assert_eq!(index.locate(139.75, 35.5), Some(0));
    }
}
