use crate::error::{AppError, Result};
use crate::models::{LabeledSample, SoilSample, CROP_LABEL_KEY, FEATURE_KEYS, N_FEATURES};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Cell contents treated as a missing value
const MISSING_MARKERS: [&str; 7] = ["", "na", "nan", "n/a", "null", "none", "#n/a"];

/// Where the raw CSV comes from
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    Path(PathBuf),
    Url(String),
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSource::Path(p) => write!(f, "{}", p.display()),
            DatasetSource::Url(u) => write!(f, "{}", u),
        }
    }
}

/// Row accounting for one parse
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningStats {
    pub rows_read: usize,
    pub dropped_missing: usize,
    pub dropped_unparseable: usize,
}

impl CleaningStats {
    pub fn rows_kept(&self) -> usize {
        self.rows_read - self.dropped_missing - self.dropped_unparseable
    }
}

/// Labeled samples that survived cleaning
#[derive(Debug, Clone)]
pub struct CleanDataset {
    pub samples: Vec<LabeledSample>,
    pub stats: CleaningStats,
}

/// Download or read the raw dataset bytes
pub async fn fetch(source: &DatasetSource) -> Result<Vec<u8>> {
    match source {
        DatasetSource::Path(path) => {
            debug!(path = %path.display(), "Reading dataset from disk");
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                AppError::Dataset(format!("cannot read {}: {}", path.display(), e))
            })?;
            Ok(bytes)
        }
        DatasetSource::Url(url) => {
            info!(url = %url, "Downloading dataset");
            let response = reqwest::get(url).await?.error_for_status()?;
            let bytes = response.bytes().await?;
            info!(bytes = bytes.len(), "Dataset downloaded");
            Ok(bytes.to_vec())
        }
    }
}

/// SHA-256 of the raw bytes, hex encoded
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn is_missing(cell: &str) -> bool {
    let lowered = cell.to_ascii_lowercase();
    MISSING_MARKERS.contains(&lowered.as_str())
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| AppError::Dataset(format!("dataset has no '{}' column", name)))
}

/// Parse and clean the CSV. Headers and cells are trimmed; rows with a
/// missing cell or an unparseable number are dropped and counted.
pub fn parse_csv(bytes: &[u8]) -> Result<CleanDataset> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let headers = rdr.headers()?.clone();
    let feature_idx = FEATURE_KEYS
        .iter()
        .map(|key| column_index(&headers, key))
        .collect::<Result<Vec<usize>>>()?;
    let label_idx = column_index(&headers, CROP_LABEL_KEY)?;

    let extra: Vec<&str> = headers
        .iter()
        .filter(|h| *h != CROP_LABEL_KEY && !FEATURE_KEYS.contains(h))
        .collect();
    if !extra.is_empty() {
        warn!(columns = ?extra, "Ignoring unknown dataset columns");
    }

    let mut stats = CleaningStats::default();
    let mut samples = Vec::new();

    for result in rdr.records() {
        let record = result?;
        stats.rows_read += 1;

        let cell = |idx: usize| record.get(idx).unwrap_or("");
        if feature_idx.iter().chain(std::iter::once(&label_idx)).any(|&i| is_missing(cell(i))) {
            stats.dropped_missing += 1;
            continue;
        }

        let mut numeric = [0.0; N_FEATURES - 1];
        let mut parsed = true;
        for (slot, &idx) in numeric.iter_mut().zip(&feature_idx[1..]) {
            match cell(idx).parse::<f64>() {
                Ok(v) if v.is_finite() => *slot = v,
                _ => {
                    parsed = false;
                    break;
                }
            }
        }
        if !parsed {
            stats.dropped_unparseable += 1;
            continue;
        }

        samples.push(LabeledSample {
            sample: SoilSample::from_parts(cell(feature_idx[0]), numeric),
            crop: cell(label_idx).to_string(),
        });
    }

    if stats.dropped_unparseable > 0 {
        warn!(
            rows = stats.dropped_unparseable,
            "Dropped rows with non-numeric feature values"
        );
    }
    if samples.is_empty() {
        return Err(AppError::Dataset(format!(
            "no usable rows out of {}",
            stats.rows_read
        )));
    }

    info!(
        rows_read = stats.rows_read,
        rows_kept = stats.rows_kept(),
        dropped_missing = stats.dropped_missing,
        "Dataset cleaned"
    );

    Ok(CleanDataset { samples, stats })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = " Soil Type ,Soil depth(cm),pH,Bulk density Gm/cc,Ec (dsm-1),Organic carbon (%),Soil moisture retention  (%),Available water capacity(m/m),Infiltration rate cm/hr,Clay %,Crops to be taken ";

    fn csv(rows: &[&str]) -> Vec<u8> {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text.into_bytes()
    }

    #[test]
    fn test_parse_trims_headers_and_cells() {
        let data = csv(&["Red soil , 40,6.5,1.3,0.2,0.5,30,0.14,2.0,25, Groundnut "]);
        let parsed = parse_csv(&data).unwrap();

        assert_eq!(parsed.samples.len(), 1);
        let row = &parsed.samples[0];
        assert_eq!(row.sample.soil_type, "Red soil");
        assert_eq!(row.sample.ph, 6.5);
        assert_eq!(row.crop, "Groundnut");
    }

    #[test]
    fn test_incomplete_rows_dropped() {
        let data = csv(&[
            "Red soil,40,6.5,1.3,0.2,0.5,30,0.14,2.0,25,Groundnut",
            "Black soil,,7.5,1.2,0.3,0.7,45,0.2,1.1,40,Cotton",
            "Black soil,55,NaN,1.2,0.3,0.7,45,0.2,1.1,40,Cotton",
            "Alluvial,60,7.0,1.4,0.1,0.4,35,0.16,1.5",
            "Alluvial,60,seven,1.4,0.1,0.4,35,0.16,1.5,30,Rice",
        ]);
        let parsed = parse_csv(&data).unwrap();

        assert_eq!(parsed.samples.len(), 1);
        assert_eq!(parsed.stats.rows_read, 5);
        assert_eq!(parsed.stats.dropped_missing, 3);
        assert_eq!(parsed.stats.dropped_unparseable, 1);
        assert_eq!(parsed.stats.rows_kept(), 1);
    }

    #[test]
    fn test_missing_column_rejected() {
        let data = b"Soil Type,pH,Crops to be taken\nRed,6.5,Rice".to_vec();
        let err = parse_csv(&data).unwrap_err();
        assert!(err.to_string().contains("Soil depth(cm)"));
    }

    #[test]
    fn test_no_usable_rows_rejected() {
        let data = csv(&[",,,,,,,,,,"]);
        assert!(parse_csv(&data).is_err());
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_source_display() {
        let source = DatasetSource::Url("http://example.com/data.csv".to_string());
        assert_eq!(source.to_string(), "http://example.com/data.csv");
    }
}
