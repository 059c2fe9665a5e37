//! Joining scores and auxiliary indicators into [`CompositeRecord`]s.

use std::collections::BTreeMap;

use urbanity_map_geography_models::{
    AuxiliaryIndicators, CompositeRecord, LayerBreakdown, RegionCode,
};

/// Normalized scores of the fused layers.
///
/// A region absent from a layer scores 0 in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerScores {
    pub night_light: BTreeMap<RegionCode, f64>,
    pub population: BTreeMap<RegionCode, f64>,
    pub poi: BTreeMap<RegionCode, f64>,
}

/// Raw per-region indicators reported alongside the scores.
///
/// A region absent from a map has no data for that indicator and is
/// written as `null`. `land_price` and `avg_income` are published for
/// coarser units, so lookups fall back along
/// [`RegionCode::fallback_chain`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryLayers {
    pub poi_count: BTreeMap<RegionCode, u64>,
    pub poi_density: BTreeMap<RegionCode, f64>,
    pub population_count: BTreeMap<RegionCode, u64>,
    pub land_price: BTreeMap<RegionCode, f64>,
    pub avg_income: BTreeMap<RegionCode, f64>,
    pub pop_growth: BTreeMap<RegionCode, f64>,
    pub elderly_ratio: BTreeMap<RegionCode, f64>,
    pub max_temp: BTreeMap<RegionCode, f64>,
    pub max_snow: BTreeMap<RegionCode, f64>,
}

/// Looks `code` up in `map`, then its parent codes: last digit `0`,
/// then last two digits `00`.
#[must_use]
pub fn lookup_with_fallback<'a, V>(
    map: &'a BTreeMap<RegionCode, V>,
    code: &RegionCode,
) -> Option<&'a V> {
    code.fallback_chain()
        .iter()
        .find_map(|candidate| map.get(candidate))
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (x * factor).round_ties_even() / factor
}

/// The merged, code-keyed output records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreStore {
    records: BTreeMap<RegionCode, CompositeRecord>,
}

impl ScoreStore {
    /// Builds one record per region in `composite`.
    ///
    /// `light_pollution` repeats the night-light score. Money values are
    /// rounded to whole yen, rates to two decimals, temperature to one
    /// decimal and snow depth to whole centimetres.
    #[must_use]
    pub fn merge(
        composite: &BTreeMap<RegionCode, f64>,
        layers: &LayerScores,
        auxiliary: &AuxiliaryLayers,
    ) -> Self {
        let score = |map: &BTreeMap<RegionCode, f64>, code: &RegionCode| {
            map.get(code).copied().unwrap_or(0.0)
        };
        let mut inherited = 0_usize;

        let records = composite
            .iter()
            .map(|(code, urbanity)| {
                let night_light = score(&layers.night_light, code);

                let land_price = lookup_with_fallback(&auxiliary.land_price, code);
                let avg_income = lookup_with_fallback(&auxiliary.avg_income, code);
                if (land_price.is_some() && !auxiliary.land_price.contains_key(code))
                    || (avg_income.is_some() && !auxiliary.avg_income.contains_key(code))
                {
                    inherited += 1;
                }

                let record = CompositeRecord {
                    urbanity: *urbanity,
                    layers: LayerBreakdown {
                        light_pollution: night_light,
                        night_light,
                        population: score(&layers.population, code),
                        poi: score(&layers.poi, code),
                        poi_count: auxiliary.poi_count.get(code).copied(),
                        poi_density: auxiliary.poi_density.get(code).map(|v| round_to(*v, 2)),
                    },
                    auxiliary: AuxiliaryIndicators {
                        population_count: auxiliary.population_count.get(code).copied(),
                        land_price: land_price.map(|v| v.round_ties_even()),
                        avg_income: avg_income.map(|v| v.round_ties_even()),
                        pop_growth: auxiliary.pop_growth.get(code).map(|v| round_to(*v, 2)),
                        elderly_ratio: auxiliary.elderly_ratio.get(code).map(|v| round_to(*v, 2)),
                        max_temp: auxiliary.max_temp.get(code).map(|v| round_to(*v, 1)),
                        max_snow: auxiliary.max_snow.get(code).map(|v| v.round_ties_even()),
                    },
                };
                (code.clone(), record)
            })
            .collect::<BTreeMap<_, _>>();

        log::debug!(
            "Merged {} records ({inherited} inherit a parent code's land price or income)",
            records.len()
        );

        Self { records }
    }

    /// Wraps already-built records, e.g. ones read back from disk.
    #[must_use]
    pub const fn from_records(records: BTreeMap<RegionCode, CompositeRecord>) -> Self {
        Self { records }
    }

    /// All records, ordered by code.
    #[must_use]
    pub const fn records(&self) -> &BTreeMap<RegionCode, CompositeRecord> {
        &self.records
    }

    /// The record for `code`, if the region was scored.
    #[must_use]
    pub fn get(&self, code: &RegionCode) -> Option<&CompositeRecord> {
        self.records.get(code)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Composite scores in code order.
    #[must_use]
    pub fn urbanity_values(&self) -> Vec<f64> {
        self.records.values().map(|r| r.urbanity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> RegionCode {
        RegionCode::parse(s).unwrap()
    }

    fn map<V: Copy>(entries: &[(&str, V)]) -> BTreeMap<RegionCode, V> {
        entries.iter().map(|(c, v)| (code(c), *v)).collect()
    }

    #[test]
    fn ward_inherits_parent_city_value() {
        let prices = map(&[("01100", 80_000.0)]);
        assert_eq!(lookup_with_fallback(&prices, &code("01101")), Some(&80_000.0));

        let prices = map(&[("14100", 300_000.0)]);
        assert_eq!(lookup_with_fallback(&prices, &code("14118")), Some(&300_000.0));

        let prices = map(&[("14118", 1.0), ("14100", 2.0)]);
        assert_eq!(lookup_with_fallback(&prices, &code("14118")), Some(&1.0));

        assert_eq!(lookup_with_fallback(&prices, &code("13101")), None);
    }

    #[test]
    fn merges_scores_and_keeps_missing_indicators_null() {
        let composite = map(&[("01101", 62.5), ("01202", 0.0)]);
        let layers = LayerScores {
            night_light: map(&[("01101", 80.0), ("01202", 0.0)]),
            population: map(&[("01101", 55.0)]),
            poi: BTreeMap::new(),
        };
        let auxiliary = AuxiliaryLayers {
            poi_count: map(&[("01101", 120), ("01202", 0)]),
            poi_density: map(&[("01101", 2.345_6)]),
            land_price: map(&[("01100", 81_234.6)]),
            max_temp: map(&[("01101", 33.25)]),
            max_snow: map(&[("01202", 98.0)]),
            ..AuxiliaryLayers::default()
        };

        let store = ScoreStore::merge(&composite, &layers, &auxiliary);
        assert_eq!(store.len(), 2);

        let sapporo = store.get(&code("01101")).unwrap();
        assert!((sapporo.urbanity - 62.5).abs() < f64::EPSILON);
        assert!((sapporo.layers.light_pollution - 80.0).abs() < f64::EPSILON);
        assert!((sapporo.layers.night_light - 80.0).abs() < f64::EPSILON);
        assert!(sapporo.layers.poi.abs() < f64::EPSILON);
        assert_eq!(sapporo.layers.poi_count, Some(120));
        assert_eq!(sapporo.layers.poi_density, Some(2.35));
        assert_eq!(sapporo.auxiliary.land_price, Some(81_235.0));
        assert_eq!(sapporo.auxiliary.max_temp, Some(33.2));
        assert_eq!(sapporo.auxiliary.max_snow, None);
        assert_eq!(sapporo.auxiliary.avg_income, None);

        let hakodate = store.get(&code("01202")).unwrap();
        assert_eq!(hakodate.layers.poi_count, Some(0));
        assert_eq!(hakodate.layers.poi_density, None);
        assert_eq!(hakodate.auxiliary.land_price, None);
        assert_eq!(hakodate.auxiliary.max_snow, Some(98.0));
    }

    #[test]
    fn regions_outside_composite_are_not_emitted() {
        let composite = map(&[("01101", 10.0)]);
        let layers = LayerScores {
            night_light: map(&[("01101", 10.0), ("99999", 50.0)]),
            ..LayerScores::default()
        };
        let store = ScoreStore::merge(&composite, &layers, &AuxiliaryLayers::default());
        assert_eq!(store.len(), 1);
        assert!(store.get(&code("99999")).is_none());
        assert_eq!(store.urbanity_values(), vec![10.0]);
    }
}
