//! Shared fixtures for the integration tests: a small, well separated
//! soil dataset and a training configuration that fits it quickly.

#![allow(dead_code)]

use crop_recommender::dataset::{self, DatasetSource};
use crop_recommender::ml::{ArtifactBundle, DatasetProvenance, MlpConfig, Trainer, TrainingConfig};
use serde_json::{json, Value};

pub const HEADER: &str = "Soil Type,Soil depth(cm),pH,Bulk density Gm/cc,Ec (dsm-1),Organic carbon (%),Soil moisture retention  (%),Available water capacity(m/m),Infiltration rate cm/hr,Clay %,Crops to be taken";

/// (soil type, crop, centre of the nine numeric features)
const PROFILES: [(&str, &str, [f64; 9]); 3] = [
    ("Black soil", "Cotton", [90.0, 8.0, 1.2, 0.6, 0.8, 60.0, 0.22, 0.6, 55.0]),
    ("Red soil", "Groundnut", [40.0, 6.0, 1.5, 0.2, 0.4, 30.0, 0.12, 2.5, 20.0]),
    ("Alluvial soil", "Rice", [150.0, 7.0, 1.3, 0.4, 1.2, 45.0, 0.17, 1.2, 35.0]),
];

pub const ROWS_PER_CROP: usize = 40;

/// Deterministic jitter in [-0.5, 0.5)
fn jitter(row: usize, feature: usize) -> f64 {
    (((row * 7 + feature * 13) % 11) as f64 / 11.0) - 0.5
}

/// CSV text in the dataset layout
pub fn synthetic_csv() -> String {
    let mut text = HEADER.to_string();
    for row in 0..ROWS_PER_CROP {
        for (soil, crop, centre) in PROFILES.iter() {
            let values: Vec<String> = centre
                .iter()
                .enumerate()
                .map(|(f, c)| format!("{:.4}", c + jitter(row, f) * c * 0.05))
                .collect();
            text.push('\n');
            text.push_str(&format!("{},{},{}", soil, values.join(","), crop));
        }
    }
    text.push('\n');
    text
}

/// A training configuration small enough for tests
pub fn fast_config() -> TrainingConfig {
    TrainingConfig {
        mlp: MlpConfig {
            hidden_units: 16,
            max_epochs: 200,
            learning_rate: 0.01,
            ..MlpConfig::default()
        },
        ..TrainingConfig::default()
    }
}

/// Fit a bundle in memory from the synthetic dataset
pub fn trained_bundle() -> ArtifactBundle {
    let raw = synthetic_csv().into_bytes();
    let cleaned = dataset::parse_csv(&raw).unwrap();
    let provenance = DatasetProvenance {
        source: DatasetSource::Path("synthetic.csv".into()).to_string(),
        sha256: dataset::fingerprint(&raw),
    };
    Trainer::new(fast_config())
        .unwrap()
        .fit(&cleaned, provenance)
        .unwrap()
}

/// A payload sitting at the centre of the given profile
pub fn payload_for(profile: usize) -> Value {
    let (soil, _, c) = PROFILES[profile];
    json!({
        "Soil Type": soil,
        "Soil depth(cm)": c[0],
        "pH": c[1],
        "Bulk density Gm/cc": c[2],
        "Ec (dsm-1)": c[3],
        "Organic carbon (%)": c[4],
        "Soil moisture retention  (%)": c[5],
        "Available water capacity(m/m)": c[6],
        "Infiltration rate cm/hr": c[7],
        "Clay %": c[8],
    })
}

/// Crop expected for a profile
pub fn crop_for(profile: usize) -> &'static str {
    PROFILES[profile].1
}

pub const N_PROFILES: usize = PROFILES.len();
