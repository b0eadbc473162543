use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the categorical soil attribute
pub const SOIL_TYPE_KEY: &str = "Soil Type";

/// Key of the label column in the training dataset
pub const CROP_LABEL_KEY: &str = "Crops to be taken";

/// Number of features in a model input vector
pub const N_FEATURES: usize = 10;

/// Feature keys in model input order. These are both the dataset headers
/// and the prediction payload keys; the double space is part of the name.
pub const FEATURE_KEYS: [&str; N_FEATURES] = [
    SOIL_TYPE_KEY,
    "Soil depth(cm)",
    "pH",
    "Bulk density Gm/cc",
    "Ec (dsm-1)",
    "Organic carbon (%)",
    "Soil moisture retention  (%)",
    "Available water capacity(m/m)",
    "Infiltration rate cm/hr",
    "Clay %",
];

/// Numeric feature keys, i.e. everything after the soil type
pub fn numeric_keys() -> &'static [&'static str] {
    &FEATURE_KEYS[1..]
}

/// One soil sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilSample {
    #[serde(rename = "Soil Type")]
    pub soil_type: String,

    #[serde(rename = "Soil depth(cm)")]
    pub soil_depth_cm: f64,

    #[serde(rename = "pH")]
    pub ph: f64,

    #[serde(rename = "Bulk density Gm/cc")]
    pub bulk_density: f64,

    /// Electrical conductivity
    #[serde(rename = "Ec (dsm-1)")]
    pub ec: f64,

    #[serde(rename = "Organic carbon (%)")]
    pub organic_carbon: f64,

    #[serde(rename = "Soil moisture retention  (%)")]
    pub moisture_retention: f64,

    #[serde(rename = "Available water capacity(m/m)")]
    pub available_water_capacity: f64,

    #[serde(rename = "Infiltration rate cm/hr")]
    pub infiltration_rate: f64,

    #[serde(rename = "Clay %")]
    pub clay_percent: f64,
}

impl SoilSample {
    /// Build a sample from the soil type and the nine numeric values in
    /// `FEATURE_KEYS` order
    pub fn from_parts(soil_type: impl Into<String>, numeric: [f64; N_FEATURES - 1]) -> Self {
        let [
            soil_depth_cm,
            ph,
            bulk_density,
            ec,
            organic_carbon,
            moisture_retention,
            available_water_capacity,
            infiltration_rate,
            clay_percent,
        ] = numeric;

        Self {
            soil_type: soil_type.into(),
            soil_depth_cm,
            ph,
            bulk_density,
            ec,
            organic_carbon,
            moisture_retention,
            available_water_capacity,
            infiltration_rate,
            clay_percent,
        }
    }

    /// Parse a sample out of a prediction payload
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self> {
        require_keys(payload)?;
        let numeric = numeric_features(payload)?;
        Ok(Self::from_parts(soil_type_of(payload), numeric))
    }

    /// Numeric attributes in `FEATURE_KEYS` order
    pub fn numeric_values(&self) -> [f64; N_FEATURES - 1] {
        [
            self.soil_depth_cm,
            self.ph,
            self.bulk_density,
            self.ec,
            self.organic_carbon,
            self.moisture_retention,
            self.available_water_capacity,
            self.infiltration_rate,
            self.clay_percent,
        ]
    }

    /// Model input vector with the already encoded soil type in front
    pub fn feature_vector(&self, soil_code: usize) -> [f64; N_FEATURES] {
        let mut features = [0.0; N_FEATURES];
        features[0] = soil_code as f64;
        features[1..].copy_from_slice(&self.numeric_values());
        features
    }
}

/// A soil sample together with its recommended crop
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub sample: SoilSample,
    pub crop: String,
}

/// Check that every feature key is present, reporting the first missing one
pub fn require_keys(payload: &Map<String, Value>) -> Result<()> {
    match FEATURE_KEYS.iter().find(|key| !payload.contains_key(**key)) {
        Some(missing) => Err(AppError::MissingField(missing.to_string())),
        None => Ok(()),
    }
}

/// Soil type as used for encoder lookup. Non-string values are rendered as
/// JSON so they surface as an unseen category rather than a type error.
pub fn soil_type_of(payload: &Map<String, Value>) -> String {
    match payload.get(SOIL_TYPE_KEY) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// The nine numeric attributes, each of which must be a JSON number
pub fn numeric_features(payload: &Map<String, Value>) -> Result<[f64; N_FEATURES - 1]> {
    let mut values = [0.0; N_FEATURES - 1];
    for (slot, key) in values.iter_mut().zip(numeric_keys()) {
        let raw = payload
            .get(*key)
            .ok_or_else(|| AppError::MissingField(key.to_string()))?;
        *slot = raw.as_f64().ok_or_else(|| {
            AppError::Prediction(format!("could not convert '{}' to a number: {}", key, raw))
        })?;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Map<String, Value> {
        let value = json!({
            "Soil Type": "Red loam",
            "Soil depth(cm)": 45.0,
            "pH": 6.4,
            "Bulk density Gm/cc": 1.3,
            "Ec (dsm-1)": 0.2,
            "Organic carbon (%)": 0.6,
            "Soil moisture retention  (%)": 32.0,
            "Available water capacity(m/m)": 0.15,
            "Infiltration rate cm/hr": 2.1,
            "Clay %": 28
        });
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_sample_from_payload() {
        let sample = SoilSample::from_payload(&payload()).unwrap();
        assert_eq!(sample.soil_type, "Red loam");
        assert_eq!(sample.ph, 6.4);
        assert_eq!(sample.clay_percent, 28.0);
    }

    #[test]
    fn test_first_missing_key_is_reported() {
        let mut p = payload();
        p.remove("pH");
        p.remove("Clay %");
        match require_keys(&p) {
            Err(AppError::MissingField(key)) => assert_eq!(key, "pH"),
            other => panic!("expected missing field, got {:?}", other),
        }
    }

    #[test]
    fn test_single_space_moisture_key_is_missing() {
        let mut p = payload();
        let v = p.remove("Soil moisture retention  (%)").unwrap();
        p.insert("Soil moisture retention (%)".to_string(), v);
        assert!(matches!(
            require_keys(&p),
            Err(AppError::MissingField(key)) if key == "Soil moisture retention  (%)"
        ));
    }

    #[test]
    fn test_non_numeric_field_is_catch_all() {
        let mut p = payload();
        p.insert("pH".to_string(), json!("acidic"));
        let err = numeric_features(&p).unwrap_err();
        assert_eq!(err.error_code(), "PREDICTION_ERROR");
    }

    #[test]
    fn test_non_string_soil_type_renders_as_json() {
        let mut p = payload();
        p.insert(SOIL_TYPE_KEY.to_string(), json!(3));
        assert_eq!(soil_type_of(&p), "3");
    }

    #[test]
    fn test_feature_vector_order() {
        let sample = SoilSample::from_payload(&payload()).unwrap();
        let v = sample.feature_vector(2);
        assert_eq!(v[0], 2.0);
        assert_eq!(v[1], 45.0);
        assert_eq!(v[2], 6.4);
        assert_eq!(v[9], 28.0);
    }
}
