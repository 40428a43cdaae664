//! Activity chromatograms: peak detection on the spot layout and
//! correlation of activity peaks with LC-MS features.

pub mod annotator;
pub mod correlation;
pub mod features;
pub mod peak;
pub mod peak_detector;
pub mod table;

pub use annotator::{ActivityAnnotator, AnnotatorSettings};
pub use features::{Chromatogram, Feature, FeatureChromatograms, FeatureTable};
pub use peak::Peak;
pub use peak_detector::{ActivityPeakDetector, PeakDetection, PeakDetectorSettings};
pub use table::{ActivityRecord, ActivityTable, WideTable};

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("activity table is empty")]
    EmptyTable,

    #[error("table row {position} has no retention time, assign retention times first")]
    MissingRetentionTime { position: usize },


    #[error("table row {position} has no row/column index")]
    MissingIndex { position: usize },

    #[error("no table row at row `{row_name}`, column {column}")]
    UnknownCell { row_name: String, column: u32 },

    #[error("feature `{0}` is not in the feature table")]
    UnknownFeature(String),

    #[error("no chromatogram for feature `{0}`")]
    MissingChromatogram(String),

    #[error("baseline window of {window} sampled spots cannot fit a degree {polyorder} polynomial")]
    BaselineWindow { window: usize, polyorder: usize },

    #[error("invalid retention time range {start}..{end}")]
    InvalidTimeRange { start: f64, end: f64 },

    #[error("{context}: expected slices of the same length, got {expected} and {other}")]
    LengthMismatch {
        expected: usize,
        other: usize,
        context: &'static str,
    },
}
