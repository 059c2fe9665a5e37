//! Columnar point-sample cache.
//!
//! Parsing a national OSM extract takes minutes, so parsed point clouds
//! are written next to the other intermediates as MessagePack
//! struct-of-arrays files keyed by the source's canonical path. A cache
//! file is trusted whenever it exists; delete it to force a re-parse
//! after the source changes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use urbanity_map_spatial::PointSample;

use crate::IngestError;

/// Struct-of-arrays form of a point cloud.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleColumns {
    /// Longitudes.
    pub lon: Vec<f64>,
    /// Latitudes.
    pub lat: Vec<f64>,
    /// Optional attribute per point.
    pub value: Vec<Option<f64>>,
}

impl SampleColumns {
    /// Splits samples into columns.
    #[must_use]
    pub fn from_samples(samples: &[PointSample]) -> Self {
        let mut columns = Self {
            lon: Vec::with_capacity(samples.len()),
            lat: Vec::with_capacity(samples.len()),
            value: Vec::with_capacity(samples.len()),
        };
        for s in samples {
            columns.lon.push(s.lon);
            columns.lat.push(s.lat);
            columns.value.push(s.value);
        }
        columns
    }

    /// Reassembles samples, or `None` if the columns differ in length.
    #[must_use]
    pub fn into_samples(self) -> Option<Vec<PointSample>> {
        if self.lon.len() != self.lat.len() || self.lon.len() != self.value.len() {
            return None;
        }
        Some(
            self.lon
                .into_iter()
                .zip(self.lat)
                .zip(self.value)
                .map(|((lon, lat), value)| PointSample { lon, lat, value })
                .collect(),
        )
    }
}

/// Hex digits of the path digest kept in cache file names.
const SOURCE_KEY_LEN: usize = 16;

/// Cache file for `source` within `cache_dir`.
///
/// Named after the layer, the source file name and a digest of the
/// source's canonical path, so same-named sources in different
/// directories never share a cache file. Sources that cannot be
/// canonicalized (e.g. not yet on disk) are keyed by the path as given.
#[must_use]
pub fn cache_path(cache_dir: &Path, layer: &str, source: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .map_or_else(|| "source".to_string(), |n| n.to_string_lossy().into_owned());
    let identity = std::fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
    let digest = hex::encode(Sha256::digest(identity.to_string_lossy().as_bytes()));
    cache_dir.join(format!(
        "{layer}-{file_name}-{}.msgpack",
        &digest[..SOURCE_KEY_LEN]
    ))
}

/// Writes samples to `path`, creating parent directories.
///
/// The file is written beside `path` and renamed into place once fully
/// flushed, so an interrupted write never leaves a partial cache behind.
///
/// # Errors
///
/// Returns an error if the file cannot be created, encoding fails, or
/// the final flush or rename fails.
pub fn write_cache(path: &Path, samples: &[PointSample]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = path.with_extension("tmp");
    let result = write_columns(&partial, samples).and_then(|()| {
        std::fs::rename(&partial, path)?;
        Ok(())
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result?;
    log::debug!("Cached {} samples to {}", samples.len(), path.display());
    Ok(())
}

fn write_columns(path: &Path, samples: &[PointSample]) -> Result<(), IngestError> {
    let mut writer = BufWriter::new(File::create(path)?);
    rmp_serde::encode::write_named(&mut writer, &SampleColumns::from_samples(samples))?;
    writer.flush()?;
    Ok(())
}

/// Reads samples from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded, or its
/// columns are ragged.
pub fn read_cache(path: &Path) -> Result<Vec<PointSample>, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    let columns: SampleColumns = rmp_serde::decode::from_read(reader)?;
    columns.into_samples().ok_or_else(|| IngestError::CorruptCache {
        path: path.display().to_string(),
    })
}

/// Returns cached samples if `path` exists, otherwise runs `parse` and
/// caches its output.
///
/// A cache file that cannot be decoded is reported and rebuilt.
///
/// # Errors
///
/// Propagates errors from `parse` and from writing the cache.
pub fn load_or_parse(
    path: &Path,
    parse: impl FnOnce() -> Result<Vec<PointSample>, IngestError>,
) -> Result<Vec<PointSample>, IngestError> {
    if path.exists() {
        match read_cache(path) {
            Ok(samples) => {
                log::info!(
                    "Loaded {} samples from cache {}",
                    samples.len(),
                    path.display()
                );
                return Ok(samples);
            }
            Err(e) => log::warn!("Ignoring unreadable cache {}: {e}", path.display()),
        }
    }

    let samples = parse()?;
    write_cache(path, &samples)?;
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_uses_layer_and_file_name() {
        let path = cache_path(
            Path::new("/tmp/cache"),
            "poi",
            Path::new("/data/japan-latest.osm.pbf"),
        );
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(path.parent(), Some(Path::new("/tmp/cache")));
        assert!(name.starts_with("poi-japan-latest.osm.pbf-"), "{name}");
        assert!(
            Path::new(&name)
                .extension()
                .is_some_and(|ext| ext == "msgpack")
        );
    }

    #[test]
    fn same_named_sources_get_separate_caches() {
        let dir = std::env::temp_dir().join("urbanity_map_cache_same_name");
        let _ = std::fs::remove_dir_all(&dir);
        let cache_dir = dir.join("cache");
        let older = dir.join("2023").join("japan-latest.osm.pbf");
        let newer = dir.join("2024").join("japan-latest.osm.pbf");
        for source in [&older, &newer] {
            std::fs::create_dir_all(source.parent().unwrap()).unwrap();
            std::fs::write(source, b"").unwrap();
        }

        let older_cache = cache_path(&cache_dir, "poi", &older);
        let newer_cache = cache_path(&cache_dir, "poi", &newer);
        assert_ne!(older_cache, newer_cache);

        // The same file reached through a detour shares its cache.
        let detour = dir.join("2024").join("..").join("2024").join("japan-latest.osm.pbf");
        assert_eq!(cache_path(&cache_dir, "poi", &detour), newer_cache);

        let older_samples = vec![PointSample::at(1.0, 1.0)];
        let newer_samples = vec![PointSample::at(2.0, 2.0), PointSample::at(3.0, 3.0)];
        let first = load_or_parse(&older_cache, || Ok(older_samples.clone())).unwrap();
        let second = load_or_parse(&newer_cache, || Ok(newer_samples.clone())).unwrap();
        assert_eq!(first, older_samples);
        assert_eq!(second, newer_samples);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn writes_leave_no_partial_file() {
        let dir = std::env::temp_dir().join("urbanity_map_cache_partial");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("poi-source.msgpack");

        write_cache(&path, &[PointSample::at(139.7, 35.6)]).unwrap();
        assert!(path.is_file());
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(read_cache(&path).unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn truncated_cache_is_rebuilt() {
        let dir = std::env::temp_dir().join("urbanity_map_cache_truncated");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("poi-source.msgpack");

        let samples = vec![PointSample::at(139.7, 35.6), PointSample::at(135.5, 34.7)];
        write_cache(&path, &samples).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(read_cache(&path).is_err());

        let rebuilt = load_or_parse(&path, || Ok(samples.clone())).unwrap();
        assert_eq!(rebuilt, samples);
        assert_eq!(read_cache(&path).unwrap(), samples);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn second_load_skips_parsing() {
        let dir = std::env::temp_dir().join("urbanity_map_cache_test");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("poi.msgpack");

        let samples = vec![
            PointSample::at(139.7, 35.6),
            PointSample {
                lon: 135.5,
                lat: 34.7,
                value: Some(3.0),
            },
        ];

        let first = load_or_parse(&path, || Ok(samples.clone())).unwrap();
        assert_eq!(first, samples);

        let second = load_or_parse(&path, || panic!("cache should be used")).unwrap();
        assert_eq!(second, samples);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let columns = SampleColumns {
            lon: vec![1.0, 2.0],
            lat: vec![1.0],
            value: vec![None, None],
        };
        assert!(columns.into_samples().is_none());
    }
}
