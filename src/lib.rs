//! Reconstruction of usable data from raw NAND flash dumps.
//!
//! A raw dump interleaves user data, out-of-band metadata and BCH parity in controller-specific
//! ways. Given a [`config::Config`] describing each partition's page layout, [`PartitionSet`]
//! corrects every page and extracts the user data of each partition into one linear, read-only
//! buffer.

pub mod config;
pub mod ecc;
pub mod error;
pub mod image;
pub mod nand;

pub use error::{Error, Resource, Result};
pub use nand::{CorrectedPartition, PartitionSet};
