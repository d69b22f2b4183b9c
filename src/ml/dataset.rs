use std::fs::File;
use std::io::Read;
use std::path::Path;

use linfa::Dataset;
use ndarray::{s, Array1, Array2, Ix1};
use tracing::{debug, info};

use super::error::{ModelError, ModelResult};
use super::features::FeatureSchema;

/// Feature records `[n, 7]` in schema order with one power target per row.
pub type SolarDataset = Dataset<f64, f64, Ix1>;

/// Load a headered CSV file, resolving columns by name into schema order.
pub fn load_csv(path: impl AsRef<Path>, schema: &FeatureSchema) -> ModelResult<SolarDataset> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ModelError::io(path, e))?;
    let dataset = read_csv(file, schema)?;
    info!(
        "Loaded {} rows x {} features from {}",
        dataset.records().nrows(),
        dataset.records().ncols(),
        path.display()
    );
    Ok(dataset)
}

pub fn read_csv<R: Read>(reader: R, schema: &FeatureSchema) -> ModelResult<SolarDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();

    let find = |name: &str| -> ModelResult<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ModelError::MissingColumn(name.to_string()))
    };
    let feature_idx: Vec<usize> = schema
        .columns
        .iter()
        .map(|c| find(c.as_str()))
        .collect::<ModelResult<_>>()?;
    let target_idx = find(schema.target.as_str())?;

    let mut values = Vec::new();
    let mut targets = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (&idx, column) in feature_idx.iter().zip(&schema.columns) {
            values.push(parse_cell(&record, idx, row + 1, column)?);
        }
        targets.push(parse_cell(&record, target_idx, row + 1, &schema.target)?);
    }

    if targets.is_empty() {
        return Err(ModelError::EmptyDataset);
    }

    let records = Array2::from_shape_vec((targets.len(), feature_idx.len()), values)?;
    Ok(Dataset::new(records, Array1::from(targets)).with_feature_names(schema.columns.clone()))
}

fn parse_cell(record: &csv::StringRecord, idx: usize, row: usize, column: &str) -> ModelResult<f64> {
    let raw = record.get(idx).unwrap_or("");
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ModelError::InvalidValue {
            row,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Split without shuffling: the first rows train, the trailing `test_fraction` tests.
pub fn chronological_split(
    dataset: &SolarDataset,
    test_fraction: f64,
) -> ModelResult<(SolarDataset, SolarDataset)> {
    let n = dataset.records().nrows();
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if !(test_fraction > 0.0 && test_fraction < 1.0) || n_test == 0 || n_test >= n {
        return Err(ModelError::SplitTooSmall {
            rows: n,
            fraction: test_fraction,
        });
    }
    let n_train = n - n_test;
    debug!("Chronological split: {} train / {} test", n_train, n_test);

    let names = dataset.feature_names();
    let records = dataset.records();
    let targets = dataset.targets();

    let train = Dataset::new(
        records.slice(s![..n_train, ..]).to_owned(),
        targets.slice(s![..n_train]).to_owned(),
    )
    .with_feature_names(names.clone());
    let test = Dataset::new(
        records.slice(s![n_train.., ..]).to_owned(),
        targets.slice(s![n_train..]).to_owned(),
    )
    .with_feature_names(names);

    Ok((train, test))
}

/// Observed (min, max) of the target column.
pub fn target_range(targets: &Array1<f64>) -> (f64, f64) {
    targets
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::FEATURE_SPECS;

    fn header() -> String {
        let mut cols: Vec<&str> = FEATURE_SPECS.iter().map(|s| s.column).collect();
        cols.push("generated_power_kw");
        cols.join(",")
    }

    fn csv_with_rows(rows: &[[f64; 8]]) -> String {
        let mut out = header();
        out.push('\n');
        for r in rows {
            let line: Vec<String> = r.iter().map(|v| v.to_string()).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_read_csv_in_schema_order() {
        let data = csv_with_rows(&[
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 100.0],
            [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 200.0],
        ]);
        let ds = read_csv(data.as_bytes(), &FeatureSchema::current()).unwrap();

        assert_eq!(ds.records().dim(), (2, 7));
        assert_eq!(ds.records()[[1, 0]], 10.0);
        assert_eq!(ds.records()[[0, 6]], 7.0);
        assert_eq!(ds.targets()[1], 200.0);
        assert_eq!(ds.feature_names()[0], "shortwave_radiation_backwards_sfc");
    }

    #[test]
    fn test_columns_resolved_by_name_not_position() {
        // zenith first, an extra column in the middle, radiation last
        let data = "zenith,timestamp,generated_power_kw,angle_of_incidence,total_cloud_cover_sfc,\
wind_speed_10_m_above_gnd,relative_humidity_2_m_above_gnd,temperature_2_m_above_gnd,shortwave_radiation_backwards_sfc\n\
7,2020-01-01,99,6,5,4,3,2,1\n";
        let ds = read_csv(data.as_bytes(), &FeatureSchema::current()).unwrap();

        assert_eq!(ds.records().row(0).to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(ds.targets()[0], 99.0);
    }

    #[test]
    fn test_missing_column_is_named() {
        let data = "zenith,generated_power_kw\n1,2\n";
        match read_csv(data.as_bytes(), &FeatureSchema::current()) {
            Err(ModelError::MissingColumn(col)) => assert_eq!(col, "shortwave_radiation_backwards_sfc"),
            other => panic!("unexpected: {:?}", other.map(|d| d.records().nrows())),
        }
    }

    #[test]
    fn test_invalid_cell_reports_row_and_column() {
        let mut data = csv_with_rows(&[[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 100.0]]);
        data.push_str("1,2,3,4,5,6,7,n/a\n");
        match read_csv(data.as_bytes(), &FeatureSchema::current()) {
            Err(ModelError::InvalidValue { row, column, value }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "generated_power_kw");
                assert_eq!(value, "n/a");
            }
            other => panic!("unexpected: {:?}", other.map(|d| d.records().nrows())),
        }
    }

    #[test]
    fn test_header_only_is_empty() {
        let data = format!("{}\n", header());
        assert!(matches!(
            read_csv(data.as_bytes(), &FeatureSchema::current()),
            Err(ModelError::EmptyDataset)
        ));
    }

    #[test]
    fn test_chronological_split_keeps_order() {
        let rows: Vec<[f64; 8]> = (0..10)
            .map(|i| {
                let v = i as f64;
                [v, v, v, v, v, v, v, v * 10.0]
            })
            .collect();
        let ds = read_csv(csv_with_rows(&rows).as_bytes(), &FeatureSchema::current()).unwrap();
        let (train, test) = chronological_split(&ds, 0.2).unwrap();

        assert_eq!(train.records().nrows(), 8);
        assert_eq!(test.records().nrows(), 2);
        assert_eq!(train.targets().to_vec(), vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        assert_eq!(test.targets().to_vec(), vec![80.0, 90.0]);
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let rows: Vec<[f64; 8]> = (0..11).map(|i| [i as f64; 8]).collect();
        let ds = read_csv(csv_with_rows(&rows).as_bytes(), &FeatureSchema::current()).unwrap();
        let (train, test) = chronological_split(&ds, 0.2).unwrap();
        // ceil(11 * 0.2) = 3
        assert_eq!(train.records().nrows(), 8);
        assert_eq!(test.records().nrows(), 3);
    }

    #[test]
    fn test_split_requires_both_halves() {
        let ds = read_csv(
            csv_with_rows(&[[1.0; 8]]).as_bytes(),
            &FeatureSchema::current(),
        )
        .unwrap();
        assert!(matches!(
            chronological_split(&ds, 0.2),
            Err(ModelError::SplitTooSmall { rows: 1, .. })
        ));
    }

    #[test]
    fn test_target_range() {
        let t = Array1::from(vec![3.0, -1.0, 12.5, 0.0]);
        assert_eq!(target_range(&t), (-1.0, 12.5));
    }
}
