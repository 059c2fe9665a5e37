//! Single-band raster grid and cell-centre zonal statistics.

use geo::{BoundingRect, Contains, MultiPolygon, Point};

use crate::SpatialError;

/// Affine georeference of a north-up raster.
///
/// Cell (`col`, `row`) covers `[origin_x + col * pixel_width, ...)`;
/// `pixel_height` is negative when rows run from north to south.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner of the upper-left cell.
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner of the upper-left cell.
    pub origin_y: f64,
    /// Cell width in map units.
    pub pixel_width: f64,
    /// Cell height in map units (negative for north-up rasters).
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Creates a transform.
    #[must_use]
    pub const fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of the centre of a cell.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            (col as f64 + 0.5).mul_add(self.pixel_width, self.origin_x),
            (row as f64 + 0.5).mul_add(self.pixel_height, self.origin_y),
        )
    }
}

/// Inclusive index range of cells whose centres fall within `[a, b]`
/// along one axis, clamped to `0..len`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn center_span(origin: f64, step: f64, a: f64, b: f64, len: usize) -> Option<(usize, usize)> {
    if len == 0 || step == 0.0 {
        return None;
    }
    let ia = (a - origin) / step;
    let ib = (b - origin) / step;
    let (lo, hi) = if ia <= ib { (ia, ib) } else { (ib, ia) };

    // Cell i has its centre at i + 0.5 in index space.
    let first = (lo - 0.5).ceil().max(0.0);
    let last = (hi - 0.5).floor().min(len as f64 - 1.0);
    if !first.is_finite() || !last.is_finite() || first > last {
        return None;
    }
    Some((first as usize, last as usize))
}

/// A row-major single-band raster.
#[derive(Debug, Clone)]
pub struct Raster {
    width: usize,
    height: usize,
    transform: GeoTransform,
    data: Vec<f64>,
    nodata: Option<f64>,
}

/// Running sum over the valid cells inside one polygon.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZonalSum {
    /// Sum of valid cell values.
    pub sum: f64,
    /// Number of valid cells.
    pub count: u64,
}

impl ZonalSum {
    /// Mean of the valid cells, or `0.0` when there were none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_or_zero(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl Raster {
    /// Creates a raster from row-major `data`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidRaster`] if `data.len()` is not
    /// `width * height` or the cell size is zero.
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        data: Vec<f64>,
        nodata: Option<f64>,
    ) -> Result<Self, SpatialError> {
        if data.len() != width * height {
            return Err(SpatialError::InvalidRaster {
                message: format!(
                    "expected {width}x{height}={} cells, got {}",
                    width * height,
                    data.len()
                ),
            });
        }
        if transform.pixel_width == 0.0 || transform.pixel_height == 0.0 {
            return Err(SpatialError::InvalidRaster {
                message: "cell size must be non-zero".to_string(),
            });
        }

        Ok(Self {
            width,
            height,
            transform,
            data,
            nodata,
        })
    }

    /// Raster width in cells.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Raster height in cells.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// The georeference.
    #[must_use]
    pub const fn transform(&self) -> GeoTransform {
        self.transform
    }

    /// The no-data sentinel, if any.
    #[must_use]
    pub const fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Replaces the no-data sentinel.
    #[must_use]
    pub const fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Returns the cell value, or `None` if out of bounds, non-finite, or
    /// equal to the no-data sentinel.
    #[must_use]
    pub fn valid_value(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let value = self.data[row * self.width + col];
        if !value.is_finite() {
            return None;
        }
        #[allow(clippy::float_cmp)]
        if self.nodata.is_some_and(|nd| value == nd) {
            return None;
        }
        Some(value)
    }

    /// Sums the valid cells whose centres lie strictly inside `polygon`.
    #[must_use]
    pub fn zonal_sum(&self, polygon: &MultiPolygon<f64>) -> ZonalSum {
        let Some(rect) = polygon.bounding_rect() else {
            return ZonalSum::default();
        };
        let t = &self.transform;
        let Some((col_lo, col_hi)) = center_span(
            t.origin_x,
            t.pixel_width,
            rect.min().x,
            rect.max().x,
            self.width,
        ) else {
            return ZonalSum::default();
        };
        let Some((row_lo, row_hi)) = center_span(
            t.origin_y,
            t.pixel_height,
            rect.min().y,
            rect.max().y,
            self.height,
        ) else {
            return ZonalSum::default();
        };

        let mut acc = ZonalSum::default();
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                let Some(value) = self.valid_value(col, row) else {
                    continue;
                };
                let (x, y) = t.cell_center(col, row);
                if polygon.contains(&Point::new(x, y)) {
                    acc.sum += value;
                    acc.count += 1;
                }
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    /// 4x4 raster over lon 139..140, lat 35..36 (0.25° cells).
    fn grid(data: Vec<f64>) -> Raster {
        Raster::new(
            4,
            4,
            GeoTransform::new(139.0, 36.0, 0.25, -0.25),
            data,
            Some(-999.0),
        )
        .unwrap()
    }

    fn lower_left_quadrant() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 139.0, y: 35.0),
            (x: 139.5, y: 35.0),
            (x: 139.5, y: 35.5),
            (x: 139.0, y: 35.5),
            (x: 139.0, y: 35.0),
        ]])
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let result = Raster::new(2, 2, GeoTransform::new(0.0, 0.0, 1.0, -1.0), vec![1.0], None);
        assert!(result.is_err());
    }

    #[test]
    fn cell_centers_follow_transform() {
        let t = GeoTransform::new(139.0, 36.0, 0.25, -0.25);
        assert_eq!(t.cell_center(0, 0), (139.125, 35.875));
        assert_eq!(t.cell_center(3, 3), (139.875, 35.125));
    }

    #[test]
    fn zonal_sum_uses_cell_centres_inside_polygon() {
        #[rustfmt::skip]
        let raster = grid(vec![
            1.0, 1.0, 1.0, 1.0,
            1.0, 1.0, 1.0, 1.0,
            2.0, 4.0, 9.0, 9.0,
            6.0, 8.0, 9.0, 9.0,
        ]);
        let acc = raster.zonal_sum(&lower_left_quadrant());
        assert_eq!(acc.count, 4);
        assert!((acc.mean_or_zero() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn zonal_sum_skips_nodata_and_nan() {
        #[rustfmt::skip]
        let raster = grid(vec![
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0,
            -999.0, 4.0, 0.0, 0.0,
            f64::NAN, 8.0, 0.0, 0.0,
        ]);
        let acc = raster.zonal_sum(&lower_left_quadrant());
        assert_eq!(acc.count, 2);
        assert!((acc.mean_or_zero() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn polygon_outside_raster_has_zero_mean() {
        let raster = grid(vec![5.0; 16]);
        let far = MultiPolygon(vec![polygon![
            (x: 130.0, y: 30.0),
            (x: 131.0, y: 30.0),
            (x: 131.0, y: 31.0),
            (x: 130.0, y: 30.0),
        ]]);
        let acc = raster.zonal_sum(&far);
        assert_eq!(acc.count, 0);
        assert!(acc.mean_or_zero().abs() < f64::EPSILON);
    }
}
