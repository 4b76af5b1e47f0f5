//! Abstractions and code to reconstruct NAND flash contents from a raw dump

pub mod layout;
pub mod page;
pub mod partition;

pub use layout::{Chunk, EccScheme, EtfsLayout, Layout, LayoutParams, Region};
pub use page::{PageCorrector, PageOutcome, PageState};
pub use partition::{CorrectedPartition, PartitionBuilder, PartitionSet, PartitionSpec};

/// Convenience methods for operating on `[u8]`s that represent page contents
pub trait PageUtil {
    /// Does this page contain the all-1s bit pattern?
    fn is_erased(&self) -> bool;
}

impl PageUtil for [u8] {
    fn is_erased(&self) -> bool {
        self.iter().all(|&x| x == 0xFF)
    }
}

/// A pub-fields struct describing the raw geometry of a NAND flash page and block
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Geometry {
    /// Bytes in the main data area of a page
    pub pagesize: usize,

    /// Bytes in the spare (out-of-band) area of a page
    pub oobsize: usize,

    pub pages_per_block: usize,
}

impl Geometry {
    /// Bytes per page as dumped, i.e. data area followed by OOB
    pub fn raw_pagesize(&self) -> usize {
        self.pagesize + self.oobsize
    }

    /// Bytes per block as dumped
    pub fn blocksize(&self) -> usize {
        self.raw_pagesize() * self.pages_per_block
    }

    /// Number of whole blocks in an image of `image_len` bytes
    pub fn blocks_in(&self, image_len: usize) -> usize {
        image_len / self.blocksize()
    }
}

#[test]
fn test_is_erased() {
    assert!([0xFFu8; 16].is_erased());
    assert!([0u8; 0].is_erased());
    assert!(![0xFF, 0xFF, 0xFE, 0xFF].is_erased());
}

#[test]
fn test_geometry() {
    let geometry = Geometry {
        pagesize: 2048,
        oobsize: 64,
        pages_per_block: 64,
    };
    assert_eq!(geometry.raw_pagesize(), 2112);
    assert_eq!(geometry.blocksize(), 135168);
    assert_eq!(geometry.blocks_in(135168 * 3 + 100), 3);
}
