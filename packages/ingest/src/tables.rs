//! Code-keyed CSV tables (tax income, demographics, growth rates).

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use urbanity_map_geography_models::RegionCode;

use crate::IngestError;

/// Which value to derive from each row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableColumn {
    /// A single numeric column.
    Value {
        /// Column header.
        column: String,
    },
    /// `numerator / denominator * multiplier`.
    Ratio {
        /// Numerator column header.
        numerator: String,
        /// Denominator column header.
        denominator: String,
        /// Scale factor (e.g. `1000` for thousand-yen amounts, `100` for
        /// percentages).
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
}

const fn default_multiplier() -> f64 {
    1.0
}

/// A parsed code-keyed table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeTable {
    /// Derived value per region code.
    pub values: BTreeMap<RegionCode, f64>,
    /// Rows skipped for an invalid code or non-numeric cell.
    pub parse_errors: u64,
}

/// Parses a cell, tolerating thousands separators. Placeholders such as
/// `-`, `*` or `…` yield `None`.
#[must_use]
pub fn parse_number(cell: &str) -> Option<f64> {
    let n = cell.trim().replace(',', "").parse::<f64>().ok()?;
    n.is_finite().then_some(n)
}

/// Reads `path` keyed by `code_column`, deriving one value per row.
///
/// Later rows for the same code replace earlier ones. Rows whose
/// denominator is zero are parse errors.
///
/// # Errors
///
/// * [`IngestError::Csv`] if the file cannot be read
/// * [`IngestError::MissingColumn`] if a named column is absent
pub fn read_code_table(
    path: &Path,
    code_column: &str,
    column: &TableColumn,
) -> Result<CodeTable, IngestError> {
    let csv_error = |source: csv::Error| IngestError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let headers = reader.headers().map_err(csv_error)?.clone();
    let index_of = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}') == name)
            .ok_or_else(|| IngestError::MissingColumn {
                path: path.display().to_string(),
                column: name.to_string(),
            })
    };

    let code_idx = index_of(code_column)?;
    let extract: Box<dyn Fn(&csv::StringRecord) -> Option<f64>> = match column {
        TableColumn::Value { column } => {
            let idx = index_of(column)?;
            Box::new(move |row| parse_number(row.get(idx)?))
        }
        TableColumn::Ratio {
            numerator,
            denominator,
            multiplier,
        } => {
            let num_idx = index_of(numerator)?;
            let den_idx = index_of(denominator)?;
            let multiplier = *multiplier;
            Box::new(move |row| {
                let num = parse_number(row.get(num_idx)?)?;
                let den = parse_number(row.get(den_idx)?)?;
                (den != 0.0).then(|| num / den * multiplier)
            })
        }
    };

    let mut table = CodeTable::default();
    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                log::trace!("skipping malformed row: {e}");
                table.parse_errors += 1;
                continue;
            }
        };

        let Some(code) = row.get(code_idx).and_then(|c| RegionCode::parse(c).ok()) else {
            table.parse_errors += 1;
            continue;
        };
        let Some(value) = extract(&row) else {
            table.parse_errors += 1;
            continue;
        };
        if table.values.insert(code.clone(), value).is_some() {
            log::debug!("{}: duplicate row for {code}", path.display());
        }
    }

    if table.parse_errors > 0 {
        log::warn!(
            "{}: skipped {} rows with invalid codes or values",
            path.display(),
            table.parse_errors
        );
    }
    log::info!("Read {} rows from {}", table.values.len(), path.display());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(name: &str, body: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("urbanity_map_tables_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn parses_numbers_and_placeholders() {
        assert_eq!(parse_number(" 1,234 "), Some(1234.0));
        assert_eq!(parse_number("-3.5"), Some(-3.5));
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("*"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn reads_ratio_columns_with_canonical_codes() {
        let path = write(
            "income.csv",
            "code,name,income,taxpayers\n\
             011002,札幌市,\"1,500\",3\n\
             1202,函館市,900,0\n\
             13101,千代田区,*,10\n\
             x,bad,1,1\n\
             13102,中央区,2000,4\n",
        );
        let table = read_code_table(
            &path,
            "code",
            &TableColumn::Ratio {
                numerator: "income".to_string(),
                denominator: "taxpayers".to_string(),
                multiplier: 1000.0,
            },
        )
        .unwrap();

        let get = |c: &str| table.values.get(&RegionCode::parse(c).unwrap()).copied();
        assert_eq!(get("01100"), Some(500_000.0));
        assert_eq!(get("13102"), Some(500_000.0));
        assert_eq!(get("01202"), None);
        assert_eq!(get("13101"), None);
        assert_eq!(table.parse_errors, 3);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn value_column_and_missing_header() {
        let path = write("growth.csv", "code,growth\n13101,1.25\n13101,1.5\n");
        let table = read_code_table(
            &path,
            "code",
            &TableColumn::Value {
                column: "growth".to_string(),
            },
        )
        .unwrap();
        assert_eq!(table.values.len(), 1);
        assert_eq!(table.values.values().next(), Some(&1.5));

        let err = read_code_table(
            &path,
            "code",
            &TableColumn::Value {
                column: "nope".to_string(),
            },
        );
        assert!(matches!(err, Err(IngestError::MissingColumn { .. })));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn column_spec_deserializes() {
        let column: TableColumn =
            toml::de::from_str("kind = \"ratio\"\nnumerator = \"a\"\ndenominator = \"b\"").unwrap();
        assert_eq!(
            column,
            TableColumn::Ratio {
                numerator: "a".to_string(),
                denominator: "b".to_string(),
                multiplier: 1.0,
            }
        );
    }
}
