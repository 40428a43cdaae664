use serde::{Deserialize, Serialize};

/// An activity peak found on the chromatogram.
///
/// `index`, `start_idx` and `end_idx` are positions in the activity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub number: usize,
    pub index: usize,
    pub start_idx: usize,
    pub end_idx: usize,
    pub retention_time: f64,
    #[serde(rename = "start_RT")]
    pub start_rt: f64,
    #[serde(rename = "end_RT")]
    pub end_rt: f64,
    pub intensity: f64,
    #[serde(rename = "AUC")]
    pub auc: f64,
    #[serde(default)]
    pub correlated_feature_ids: Vec<String>,
    #[serde(default)]
    pub correlation_coeff_features: Vec<f64>,
}

impl Peak {
    /// Pairs of linked feature id and shape correlation, in link order.
    pub fn correlations(&self) -> impl Iterator<Item = (&str, f64)> {
        self.correlated_feature_ids
            .iter()
            .map(String::as_str)
            .zip(self.correlation_coeff_features.iter().copied())
    }

    pub fn clear_correlations(&mut self) {
        self.correlated_feature_ids.clear();
        self.correlation_coeff_features.clear();
    }
}
