//! Spot values, the spot collection and the services that detect, correct
//! and index spots.

pub mod corrector;
pub mod detector;
pub mod indexer;
pub mod record;
pub mod spot;
pub mod spot_list;

pub use corrector::{SpotCorrector, SpotCorrectorSettings};
pub use detector::{SpotDetector, SpotDetectorSettings};
pub use indexer::{IndexingError, SpotIndexer};
pub use record::SpotRecord;
pub use spot::{Spot, SpotIndex, SpotProvenance, SpotRole, row_name, row_number};
pub use spot_list::{SamplingReport, SpotList, SpotListError};
