//! Writing and reloading the output artifacts.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write as _},
    path::Path,
};

use geojson::{FeatureCollection, JsonObject, JsonValue};
use serde::Serialize;
use urbanity_map_geography::region_code_property;
use urbanity_map_geography_models::{CompositeRecord, RegionCode};

use crate::{ScoreStore, StoreError};

fn create_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Writes `value` as pretty-printed JSON, creating parent directories.
///
/// # Errors
///
/// Returns [`StoreError`] if serialization or the write fails.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    create_parent(path)?;
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Writes the code-keyed score document.
///
/// # Errors
///
/// Returns [`StoreError`] if serialization or the write fails.
pub fn write_scores(path: &Path, store: &ScoreStore) -> Result<(), StoreError> {
    write_json(path, store.records())?;
    log::info!("Wrote {} records to {}", store.len(), path.display());
    Ok(())
}

/// Reads a score document written by [`write_scores`].
///
/// # Errors
///
/// Returns [`StoreError`] if the file cannot be read or parsed.
pub fn read_scores(path: &Path) -> Result<ScoreStore, StoreError> {
    let contents = std::fs::read_to_string(path)?;
    let records: BTreeMap<RegionCode, CompositeRecord> = serde_json::from_str(&contents)?;
    Ok(ScoreStore::from_records(records))
}

fn record_fields(code: &str, record: &CompositeRecord) -> Result<JsonObject, StoreError> {
    match serde_json::to_value(record)? {
        JsonValue::Object(fields) => Ok(fields),
        _ => Err(StoreError::NotAnObject {
            code: code.to_string(),
        }),
    }
}

/// Writes `collection` with every record field attached to each feature's
/// properties.
///
/// Features are matched through `code_field`. Features with no usable
/// code, or whose code has no record, get every field as `null` so the
/// output schema is uniform. Existing properties are kept unless a record
/// field has the same name. Returns the number of matched features.
///
/// # Errors
///
/// Returns [`StoreError`] if serialization or the write fails.
pub fn write_scored_geojson(
    path: &Path,
    collection: &FeatureCollection,
    code_field: &str,
    store: &ScoreStore,
) -> Result<usize, StoreError> {
    let null_fields: JsonObject = record_fields("default", &CompositeRecord::default())?
        .into_iter()
        .map(|(key, _)| (key, JsonValue::Null))
        .collect();

    let mut out = collection.clone();
    let mut matched = 0_usize;

    for feature in &mut out.features {
        let record = region_code_property(feature, code_field)
            .and_then(|code| store.get(&code).map(|record| (code, record)));

        let fields = match record {
            Some((code, record)) => {
                matched += 1;
                record_fields(code.as_str(), record)?
            }
            None => null_fields.clone(),
        };

        feature
            .properties
            .get_or_insert_with(JsonObject::new)
            .extend(fields);
    }

    create_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &out)?;
    writer.flush()?;

    let unmatched = out.features.len() - matched;
    if unmatched > 0 {
        log::warn!("{unmatched} features in the boundary collection have no score record");
    }
    log::info!(
        "Wrote {} features ({matched} scored) to {}",
        out.features.len(),
        path.display()
    );
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use geojson::{Feature, Geometry, Value};
    use serde_json::json;
    use urbanity_map_geography_models::{AuxiliaryIndicators, LayerBreakdown};

    use super::*;

    fn store() -> ScoreStore {
        let mut records = BTreeMap::new();
        records.insert(
            RegionCode::parse("13101").unwrap(),
            CompositeRecord {
                urbanity: 98.7,
                layers: LayerBreakdown {
                    light_pollution: 100.0,
                    night_light: 100.0,
                    population: 60.0,
                    poi: 100.0,
                    poi_count: Some(4210),
                    poi_density: Some(361.5),
                },
                auxiliary: AuxiliaryIndicators {
                    avg_income: Some(9_870_000.0),
                    ..AuxiliaryIndicators::default()
                },
            },
        );
        ScoreStore::from_records(records)
    }

    fn feature(code: Option<&str>) -> Feature {
        let mut properties = JsonObject::new();
        properties.insert("N03_004".to_string(), json!("千代田区"));
        if let Some(code) = code {
            properties.insert("N03_007".to_string(), json!(code));
        }
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(vec![139.75, 35.69]))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }

    #[test]
    fn scores_round_trip_through_disk() {
        let dir = std::env::temp_dir().join("urbanity_store_scores");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("urbanity-scores.json");

        write_scores(&path, &store()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["13101"]["urbanity"], 98.7);
        assert_eq!(json["13101"]["poi_count"], 4210);
        assert!(json["13101"]["land_price"].is_null());

        let back = read_scores(&path).unwrap();
        assert_eq!(back, store());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn attaches_fields_and_nulls_unmatched_features() {
        let dir = std::env::temp_dir().join("urbanity_store_geojson");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("regions-with-scores.geojson");

        let collection = FeatureCollection {
            bbox: None,
            features: vec![feature(Some("13101")), feature(Some("13102")), feature(None)],
            foreign_members: None,
        };
        let matched = write_scored_geojson(&path, &collection, "N03_007", &store()).unwrap();
        assert_eq!(matched, 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        let features = json["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);

        let scored = &features[0]["properties"];
        assert_eq!(scored["N03_004"], "千代田区");
        assert_eq!(scored["urbanity"], 98.7);
        assert_eq!(scored["avg_income"], 9_870_000.0);
        assert!(scored["max_snow"].is_null());

        for unscored in &features[1..] {
            let props = unscored["properties"].as_object().unwrap();
            assert!(props["urbanity"].is_null());
            assert!(props["light_pollution"].is_null());
            assert!(props.contains_key("max_temp"));
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
