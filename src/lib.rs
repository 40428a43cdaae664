//! Reads bioactivity signals from grid-arrayed microspot assay images and links
//! the resulting activity chromatogram to LC-MS features.
//!
//! The image side runs spot detection, grid detection, grid-based correction and
//! row/column indexing. The chromatogram side detects activity peaks on the
//! row × column layout and correlates them with MS features by retention time
//! and elution shape.

pub mod activity;
pub mod error;
pub mod grid;
pub mod halo;
pub mod imaging;
pub mod pipeline;
pub mod settings;
pub mod spots;
pub mod test_image_gen;
pub mod well_range;

pub use activity::{ActivityAnnotator, ActivityPeakDetector, ActivityTable, Peak};
pub use error::{Error, Result};
pub use grid::{Grid, GridDetector, GridLine, GridPoint};
pub use halo::{Halo, HaloDetector};
pub use imaging::{GrayImageF, ImageLoader};
pub use settings::Settings;
pub use spots::{Spot, SpotCorrector, SpotDetector, SpotIndexer, SpotList};
pub use well_range::WellRange;
