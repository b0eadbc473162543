use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Bijective mapping between category strings and dense integer codes.
///
/// Codes follow the sorted order of the distinct values seen in `fit`, so a
/// given dataset always produces the same encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoder {
    /// Name of the encoded attribute, used in error messages
    field: String,

    /// Known classes, index = code
    classes: Vec<String>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PartialEq for LabelEncoder {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.classes == other.classes
    }
}

impl LabelEncoder {
    /// Fit an encoder on the given values
    pub fn fit<I, S>(field: impl Into<String>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let field = field.into();
        let distinct: BTreeSet<String> = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect();

        if distinct.is_empty() {
            return Err(AppError::Dataset(format!(
                "cannot fit encoder for '{}' on zero values",
                field
            )));
        }

        Ok(Self::from_classes(field, distinct.into_iter().collect()))
    }

    fn from_classes(field: String, classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(code, class)| (class.clone(), code))
            .collect();
        Self {
            field,
            classes,
            index,
        }
    }

    /// Rebuild the lookup table after deserialization
    pub fn rebuild_index(mut self) -> Self {
        self.index = self
            .classes
            .iter()
            .enumerate()
            .map(|(code, class)| (class.clone(), code))
            .collect();
        self
    }

    /// Code for a value, failing on anything not seen during `fit`
    pub fn transform(&self, value: &str) -> Result<usize> {
        self.index
            .get(value)
            .copied()
            .ok_or_else(|| AppError::UnseenCategory {
                field: self.field.clone(),
                value: value.to_string(),
            })
    }

    /// Encode many values at once
    pub fn transform_all<S: AsRef<str>>(&self, values: &[S]) -> Result<Vec<usize>> {
        values.iter().map(|v| self.transform(v.as_ref())).collect()
    }

    /// Value for a code
    pub fn inverse_transform(&self, code: usize) -> Result<&str> {
        self.classes.get(code).map(String::as_str).ok_or_else(|| {
            AppError::Prediction(format!(
                "{} code {} is outside the {} known classes",
                self.field,
                code,
                self.classes.len()
            ))
        })
    }

    /// Known classes in code order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}
