//! Low-level image operations shared by the spot, grid and halo detectors.

pub mod edges;
pub mod greyscale;
pub mod histogram;
pub mod hough;
pub mod morphology;
pub mod peaks;

pub use greyscale::{GrayImageF, ImageLoader, ImageLoaderSettings};
pub use hough::{CircleCandidate, CircleSearch, LineCandidate, LineSearch};
pub use peaks::{PeakSearch, find_peaks_2d};
