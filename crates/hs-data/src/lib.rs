//! # hs-data
//!
//! Dataset providers for HyperSweep: a seeded synthetic classification
//! generator and a CSV loader. Both produce an immutable [`Dataset`] that is
//! built once before any study starts.
//!
//! [`Dataset`]: hs_types::Dataset

pub mod loaders;
pub mod synthetic;

pub use loaders::CsvLoader;
pub use synthetic::SyntheticSpec;
