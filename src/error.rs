use crate::activity::ActivityError;
use crate::halo::DetectionError;
use crate::imaging::greyscale::ImageLoadError;
use crate::settings::SettingsError;
use crate::spots::indexer::IndexingError;
use crate::spots::spot_list::SpotListError;
use crate::well_range::WellRangeError;

/// Any failure surfaced by the reader's pipelines.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    ImageLoad(#[from] ImageLoadError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    SpotList(#[from] SpotListError),

    #[error(transparent)]
    Indexing(#[from] IndexingError),

    #[error(transparent)]
    WellRange(#[from] WellRangeError),

    #[error(transparent)]
    Activity(#[from] ActivityError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
