//! Single-band GeoTIFF reader.
//!
//! Georeferencing comes from the `ModelPixelScale` and `ModelTiepoint`
//! tags (north-up rasters only; `ModelTransformation` is not supported).
//! The GDAL no-data tag is honoured unless the caller overrides it.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use urbanity_map_spatial::{GeoTransform, Raster};

use crate::IngestError;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GDAL_NODATA: u16 = 42113;

/// Resolves a numeric tag code to the decoder's tag key.
fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Reads the first band of a GeoTIFF.
///
/// `nodata_override` replaces the file's GDAL no-data value when set.
///
/// # Errors
///
/// * [`IngestError::NotFound`] if the file does not exist
/// * [`IngestError::Tiff`] if decoding fails
/// * [`IngestError::InvalidRaster`] if georeferencing tags are missing
pub fn read_geotiff(path: &Path, nodata_override: Option<f64>) -> Result<Raster, IngestError> {
    if !path.exists() {
        return Err(IngestError::NotFound {
            path: path.display().to_string(),
        });
    }
    let invalid = |message: String| IngestError::InvalidRaster {
        path: path.display().to_string(),
        message,
    };

    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;

    let scale = decoder
        .get_tag_f64_vec(tag(MODEL_PIXEL_SCALE))
        .map_err(|e| invalid(format!("missing ModelPixelScale: {e}")))?;
    let tiepoint = decoder
        .get_tag_f64_vec(tag(MODEL_TIEPOINT))
        .map_err(|e| invalid(format!("missing ModelTiepoint: {e}")))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(invalid(format!(
            "malformed georeference: scale {scale:?}, tiepoint {tiepoint:?}"
        )));
    }

    // Tiepoint maps raster (i, j) to model (x, y).
    let transform = GeoTransform::new(
        scale[0].mul_add(-tiepoint[0], tiepoint[3]),
        scale[1].mul_add(tiepoint[1], tiepoint[4]),
        scale[0],
        -scale[1],
    );

    let file_nodata = decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());
    let nodata = nodata_override.or(file_nodata);

    let data = decoding_to_f64(decoder.read_image()?);
    let raster = Raster::new(width as usize, height as usize, transform, data, nodata)
        .map_err(|e| invalid(e.to_string()))?;

    log::info!(
        "Read {width}x{height} raster from {} (nodata {nodata:?})",
        path.display()
    );
    Ok(raster)
}

#[allow(clippy::cast_precision_loss)]
fn decoding_to_f64(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    }
}
