//! Reconstruction of whole partitions: every page of a block range is corrected and its user data
//! appended, in order, to one linear buffer.

use std::ops::RangeInclusive;

use bytes::Bytes;
use log::{info, warn};

use super::layout::Layout;
use super::page::PageCorrector;
use crate::error::{ensure_config, Error, Result};

/// Where a partition lives in the image, and how its pages are laid out
#[derive(Debug, Clone)]
pub struct PartitionSpec {
    pub name: String,
    pub start_block: usize,

    /// Last block of the partition (inclusive), or None for the last block of the image
    pub end_block: Option<usize>,

    pub layout: Layout,
}

/// Drives the correction of one partition of a raw image
#[derive(Debug)]
pub struct PartitionBuilder<'a> {
    name: &'a str,
    image: &'a [u8],
    layout: &'a Layout,
    start_block: usize,
    end_block: usize,
}

/// Running totals kept while a partition is corrected
#[derive(Debug, Default)]
struct Stats {
    corrected_bits: u64,
    uncorrectable_pages: Vec<u64>,
}

impl<'a> PartitionBuilder<'a> {
    /// Bind a partition to the image, resolving and checking its block range
    pub fn new(spec: &'a PartitionSpec, image: &'a [u8]) -> Result<Self> {
        let layout = &spec.layout;
        let image_blocks = layout.geometry().blocks_in(image.len());

        let end_block = match spec.end_block {
            Some(end) => end,
            None => image_blocks.checked_sub(1).ok_or_else(|| {
                Error::config(format!(
                    "partition {}: image of {} bytes holds no whole {}-byte block",
                    spec.name,
                    image.len(),
                    layout.blocksize()
                ))
            })?,
        };

        ensure_config!(
            spec.start_block <= end_block,
            "partition {}: start block {} is after end block {end_block}",
            spec.name,
            spec.start_block
        );
        ensure_config!(
            end_block < image_blocks,
            "partition {}: end block {end_block} is beyond the image's {image_blocks} blocks",
            spec.name
        );

        Ok(Self {
            name: &spec.name,
            image,
            layout,
            start_block: spec.start_block,
            end_block,
        })
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn num_blocks(&self) -> usize {
        self.end_block - self.start_block + 1
    }

    /// Bytes of the image covered by this partition
    pub fn raw_size(&self) -> usize {
        self.num_blocks() * self.layout.blocksize()
    }

    /// Bytes the corrected partition will occupy
    pub fn corrected_partition_size(&self) -> usize {
        self.num_blocks() * self.layout.pages_per_block() * self.layout.corrected_pagesize()
    }

    /// Correct every page of the partition and concatenate the extracted bytes.
    ///
    /// Under a strict layout, the first uncorrectable page aborts the build.
    pub fn correct_partition(self) -> Result<CorrectedPartition> {
        info!("Start building partition: {}", self.name);

        let mut corrected = Vec::with_capacity(self.corrected_partition_size());
        let mut stats = Stats::default();
        let result = self.correct_pages(&mut corrected, &mut stats);

        info!(
            "Partition {}: corrected {} bits",
            self.name, stats.corrected_bits
        );
        result?;

        if corrected.len() != self.corrected_partition_size() {
            return Err(Error::SizeMismatch {
                partition: self.name.to_string(),
                expected: self.corrected_partition_size(),
                actual: corrected.len(),
            });
        }

        info!("Done building partition: {}", self.name);
        Ok(CorrectedPartition {
            name: self.name.to_string(),
            blocks: self.start_block..=self.end_block,
            corrected: corrected.into(),
            corrected_bits: stats.corrected_bits,
            uncorrectable_pages: stats.uncorrectable_pages,
        })
    }

    fn correct_pages(&self, out: &mut Vec<u8>, stats: &mut Stats) -> Result<()> {
        let raw_pagesize = self.layout.raw_pagesize();
        let start = self.start_block * self.layout.blocksize();
        let end = start + self.raw_size();

        let rpt = howudoin::new()
            .label(format!("Correcting {}", self.name))
            .set_len(u64::try_from(self.raw_size() / raw_pagesize).ok());

        let mut corrector = PageCorrector::new(self.layout);
        for offset in (start..end).step_by(raw_pagesize) {
            let raw = &self.image[offset..offset + raw_pagesize];

            let page = match corrector.as_mut() {
                None => raw,
                Some(corrector) => {
                    let outcome = corrector.correct_page(raw)?;
                    stats.corrected_bits += outcome.flips as u64;

                    if outcome.uncorrectable {
                        let offset = offset as u64;
                        if self.layout.ecc_strict() {
                            rpt.close();
                            return Err(Error::Uncorrectable {
                                partition: self.name.to_string(),
                                offset,
                            });
                        }
                        warn!(
                            "Uncorrectable bitflips in page at: {offset:#010x}, resuming with corrupt data"
                        );
                        stats.uncorrectable_pages.push(offset);
                    }

                    corrector.page()
                }
            };

            self.layout.extract(page, out);
            rpt.inc();
        }

        rpt.close();
        Ok(())
    }
}

/// A fully corrected partition. Its contents never change once built.
#[derive(Debug, Clone)]
pub struct CorrectedPartition {
    name: String,
    blocks: RangeInclusive<usize>,
    corrected: Bytes,
    corrected_bits: u64,
    uncorrectable_pages: Vec<u64>,
}

impl CorrectedPartition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw blocks this partition was built from
    pub fn blocks(&self) -> RangeInclusive<usize> {
        self.blocks.clone()
    }

    /// Size of the corrected contents, in bytes
    pub fn size(&self) -> usize {
        self.corrected.len()
    }

    /// Total number of bitflips corrected
    pub fn corrected_bits(&self) -> u64 {
        self.corrected_bits
    }

    /// Image offsets of pages that could not be corrected, and were kept as read
    pub fn uncorrectable_pages(&self) -> &[u64] {
        &self.uncorrectable_pages
    }

    /// The whole corrected contents
    pub fn bytes(&self) -> &Bytes {
        &self.corrected
    }

    /// Read up to `len` bytes at `offset`, clamped to the end of the partition
    pub fn read(&self, offset: usize, len: usize) -> Bytes {
        let start = offset.min(self.size());
        let end = start.saturating_add(len).min(self.size());
        self.corrected.slice(start..end)
    }
}

/// Every configured partition of one image, corrected
#[derive(Debug, Clone, Default)]
pub struct PartitionSet {
    partitions: Vec<CorrectedPartition>,
}

impl PartitionSet {
    /// Build (and eagerly correct) every partition.
    ///
    /// All block ranges are checked against the image before any page is corrected.
    pub fn build(image: &[u8], specs: &[PartitionSpec]) -> Result<Self> {
        let builders = specs
            .iter()
            .map(|spec| PartitionBuilder::new(spec, image))
            .collect::<Result<Vec<_>>>()?;

        let partitions = builders
            .into_iter()
            .map(PartitionBuilder::correct_partition)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { partitions })
    }

    /// Look up a partition by name
    pub fn get(&self, name: &str) -> Option<&CorrectedPartition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// The partitions, in configuration order
    pub fn iter(&self) -> std::slice::Iter<'_, CorrectedPartition> {
        self.partitions.iter()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

impl<'a> IntoIterator for &'a PartitionSet {
    type Item = &'a CorrectedPartition;
    type IntoIter = std::slice::Iter<'a, CorrectedPartition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod test_image {
    //! Helpers to synthesize images of programmed pages

    use super::PartitionSpec;
    use crate::nand::page::program_page;
    pub use crate::nand::{EtfsLayout, Geometry, Layout, LayoutParams};

    pub const GEOMETRY: Geometry = Geometry {
        pagesize: 512,
        oobsize: 32,
        pages_per_block: 4,
    };

    /// 512 bytes of data plus a 12-byte ETFS header in the OOB, all under one BCH-4 codeword
    pub fn etfs_params() -> LayoutParams {
        let mut params = LayoutParams::new(GEOMETRY);
        params.user_data = vec![vec![0..512]];
        params.protected_data = vec![vec![0..512, 519..531]];
        params.ecc = vec![vec![512..519]];
        params.bch = Some((0x201B, 4));
        params.etfs = Some(EtfsLayout {
            fid: 519..521,
            cluster: 521..525,
            nclusters: 525..527,
            sequence: 527..531,
        });
        params
    }

    pub fn spec(
        name: &str,
        params: LayoutParams,
        start: usize,
        end: Option<usize>,
    ) -> PartitionSpec {
        PartitionSpec {
            name: name.to_string(),
            start_block: start,
            end_block: end,
            layout: Layout::new(params).unwrap(),
        }
    }

    /// An image of `blocks` blocks, each page filled with a distinct pattern and programmed
    pub fn image(layout: &Layout, blocks: usize) -> Vec<u8> {
        let raw_pagesize = layout.raw_pagesize();
        let mut image = vec![0u8; blocks * layout.blocksize()];
        for (n, page) in image.chunks_exact_mut(raw_pagesize).enumerate() {
            for (i, byte) in page.iter_mut().enumerate() {
                *byte = ((i * 7 + n * 13) ^ (i >> 4)) as u8;
            }
            program_page(layout, page).unwrap();
        }
        image
    }
}

#[test]
fn test_size_invariant() -> anyhow::Result<()> {
    use test_image::*;

    let mut params = etfs_params();
    let etfs_spec = spec("etfs", params.clone(), 1, Some(2));
    let image = image(&etfs_spec.layout, 4);

    let builder = PartitionBuilder::new(&etfs_spec, &image)?;
    assert_eq!(builder.num_blocks(), 2);
    assert_eq!(builder.raw_size(), 2 * 4 * 544);
    assert_eq!(builder.corrected_partition_size(), 2 * 4 * (512 + 16));
    let partition = builder.correct_partition()?;
    assert_eq!(partition.size(), 2 * 4 * (512 + 16));
    assert_eq!(partition.corrected_bits(), 0);

    // First page of block 1: its data, then the transaction record from its OOB
    let page = &image[4 * 544..][..544];
    assert_eq!(partition.read(0, 512), page[..512]);
    let transaction = partition.read(512, 16);
    assert_eq!(transaction[..2], page[519..521]);
    assert_eq!(transaction[2..4], [0, 0]);
    assert_eq!(transaction[4..10], page[521..527]);
    assert_eq!(transaction[10..12], [0, 0]);
    assert_eq!(transaction[12..], page[527..531]);

    params.etfs = None;
    let plain_spec = spec("plain", params, 1, Some(2));
    let partition = PartitionBuilder::new(&plain_spec, &image)?.correct_partition()?;
    assert_eq!(partition.size(), 2 * 4 * 512);
    assert_eq!(partition.bytes()[..512], image[4 * 544..][..512]);
    Ok(())
}

#[test]
fn test_block_range() -> anyhow::Result<()> {
    use test_image::*;

    let params = LayoutParams {
        user_data: vec![vec![0..512]],
        ..LayoutParams::new(GEOMETRY)
    };
    let blocksize = GEOMETRY.blocksize();
    let image = vec![0x5Au8; blocksize * 3 + 100];

    let last = spec("last", params.clone(), 1, None);
    let builder = PartitionBuilder::new(&last, &image)?;
    assert_eq!(builder.num_blocks(), 2);

    let beyond = spec("beyond", params.clone(), 0, Some(3));
    assert!(matches!(
        PartitionBuilder::new(&beyond, &image),
        Err(Error::Config(_))
    ));

    let backwards = spec("backwards", params.clone(), 2, Some(1));
    assert!(PartitionBuilder::new(&backwards, &image).is_err());

    let empty = spec("empty", params, 0, None);
    assert!(PartitionBuilder::new(&empty, &image[..100]).is_err());
    Ok(())
}

#[test]
fn test_passthrough() -> anyhow::Result<()> {
    use test_image::*;

    let params = LayoutParams {
        user_data: vec![vec![512..528], vec![0..16]],
        ..LayoutParams::new(GEOMETRY)
    };
    let raw = spec("raw", params, 0, None);
    let image: Vec<u8> = (0..GEOMETRY.blocksize()).map(|i| (i % 251) as u8).collect();

    let partition = PartitionBuilder::new(&raw, &image)?.correct_partition()?;
    assert_eq!(partition.size(), 4 * 32);
    assert_eq!(partition.read(0, 16), image[512..528]);
    assert_eq!(partition.read(16, 16), image[0..16]);
    assert_eq!(partition.read(32, 16), image[544 + 512..][..16]);
    Ok(())
}

#[test]
fn test_corrects_flips() -> anyhow::Result<()> {
    use test_image::*;

    let mut params = etfs_params();
    params.etfs = None;
    let flash = spec("flash", params, 0, None);
    let original = image(&flash.layout, 2);

    let mut image = original.clone();
    image[3] ^= 0x01;
    image[500] ^= 0x20;
    image[544 * 5 + 520] ^= 0x04; // protected OOB byte
    image[544 * 6 + 515] ^= 0x80; // parity

    // A fully erased page
    image[544 * 7..544 * 8].fill(0xFF);

    let partition = PartitionBuilder::new(&flash, &image)?.correct_partition()?;
    assert_eq!(partition.corrected_bits(), 4);
    assert!(partition.uncorrectable_pages().is_empty());
    for page in 0..7 {
        assert_eq!(
            partition.read(page * 512, 512),
            original[page * 544..][..512],
            "page {page}"
        );
    }
    assert!(partition.read(7 * 512, 512).iter().all(|&x| x == 0xFF));
    Ok(())
}

#[test]
fn test_strict_policy() -> anyhow::Result<()> {
    use test_image::*;

    let mut params = etfs_params();
    params.etfs = None;
    let strict = spec("strict", params.clone(), 0, None);
    let mut image = image(&strict.layout, 2);

    // Five flips in page 2, one more than BCH-4 can handle
    let bad_page = 2 * 544;
    for i in 0..5 {
        image[bad_page + 50 + 90 * i] ^= 0x08;
    }

    match PartitionBuilder::new(&strict, &image)?.correct_partition() {
        Err(Error::Uncorrectable { partition, offset }) => {
            assert_eq!(partition, "strict");
            assert_eq!(offset, bad_page as u64);
        }
        other => panic!("expected uncorrectable page, got {other:?}"),
    }

    params.ecc_strict = false;
    let lenient = spec("lenient", params, 0, None);
    let partition = PartitionBuilder::new(&lenient, &image)?.correct_partition()?;
    // The offset is only recorded on the path that warns and carries on
    assert_eq!(partition.uncorrectable_pages(), [bad_page as u64]);
    assert_eq!(partition.size(), 2 * 4 * 512);
    assert_eq!(partition.read(2 * 512, 512), image[bad_page..][..512]);
    Ok(())
}

#[test]
fn test_read_clamping() -> anyhow::Result<()> {
    use test_image::*;

    let params = LayoutParams {
        user_data: vec![vec![0..8]],
        ..LayoutParams::new(GEOMETRY)
    };
    let small = spec("small", params, 0, None);
    let image = vec![0x11u8; GEOMETRY.blocksize()];
    let partition = PartitionBuilder::new(&small, &image)?.correct_partition()?;

    assert_eq!(partition.size(), 32);
    assert_eq!(partition.read(0, 100).len(), 32);
    assert_eq!(partition.read(30, 10).len(), 2);
    assert!(partition.read(32, 10).is_empty());
    assert!(partition.read(1000, 10).is_empty());
    assert!(partition.read(4, usize::MAX).len() == 28);
    Ok(())
}

#[test]
fn test_partition_set() -> anyhow::Result<()> {
    use test_image::*;

    let mut params = etfs_params();
    params.etfs = None;
    let boot = spec(
        "BOOT",
        LayoutParams {
            user_data: vec![vec![0..544]],
            ..LayoutParams::new(GEOMETRY)
        },
        0,
        Some(0),
    );
    let data = spec("DATA", params, 1, None);
    let image = image(&data.layout, 3);

    let set = PartitionSet::build(&image, &[boot.clone(), data.clone()])?;
    assert_eq!(set.len(), 2);
    let names: Vec<_> = set.iter().map(|p| p.name()).collect();
    assert_eq!(names, ["BOOT", "DATA"]);
    assert_eq!(set.get("BOOT").map(|p| p.size()), Some(4 * 544));
    assert_eq!(set.get("DATA").map(|p| p.blocks()), Some(1..=2));
    assert!(set.get("NOPE").is_none());

    // One bad range fails the whole set before anything is corrected
    let bad = spec("BAD", LayoutParams::new(GEOMETRY), 5, Some(6));
    assert!(PartitionSet::build(&image, &[boot, data, bad]).is_err());
    Ok(())
}
