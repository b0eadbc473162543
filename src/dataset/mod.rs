/// Soil dataset acquisition and cleaning
///
/// Reads the crop CSV from a local file or a URL, trims headers and cells,
/// drops incomplete rows and yields labeled soil samples for training.

pub mod loader;

pub use loader::{fetch, fingerprint, parse_csv, CleanDataset, CleaningStats, DatasetSource};
