//! Correction of a single raw page.

use log::debug;

use super::layout::{Layout, Region};
use super::PageUtil;
use crate::ecc::{shift_nibble_left, shift_nibble_right, BchCodec, BchError};
use crate::error::{ensure_config, Result};

/// What the corrector found a page to be
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum PageState {
    /// Every protected byte is 0xFF: never written, so never ECC-checked
    Erased,

    /// The page holds data, and every protected chunk was run through the codec
    Protected,
}

/// The result of correcting one page
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct PageOutcome {
    pub state: PageState,

    /// Bitflips corrected across all chunks of the page
    pub flips: usize,

    /// At least one chunk could not be corrected; its bytes are as read, not to be trusted
    pub uncorrectable: bool,
}

/// Concatenate the bytes of `chunk`'s regions into `out`
fn gather(chunk: &[Region], page: &[u8], out: &mut Vec<u8>) {
    out.clear();
    for region in chunk {
        out.extend_from_slice(&page[region.clone()]);
    }
}

/// Split `buf` back up along `chunk`'s regions, writing each piece to its place in `page`.
///
/// `buf` must be exactly as long as the regions combined.
fn scatter(chunk: &[Region], buf: &[u8], page: &mut [u8]) -> Result<()> {
    let mut rest = buf;
    for region in chunk {
        ensure_config!(
            rest.len() >= region.len(),
            "buffer too short to refill region {region:?}"
        );
        let (piece, tail) = rest.split_at(region.len());
        page[region.clone()].copy_from_slice(piece);
        rest = tail;
    }
    ensure_config!(
        rest.is_empty(),
        "{} bytes left over after refilling chunk",
        rest.len()
    );
    Ok(())
}

/// Corrects pages of one layout, reusing its buffers from page to page
#[derive(Debug)]
pub struct PageCorrector<'a> {
    layout: &'a Layout,
    codec: &'a BchCodec,

    /// The corrected page, rebuilt on every call
    page: Vec<u8>,

    data: Vec<u8>,
    ecc: Vec<u8>,
}

impl<'a> PageCorrector<'a> {
    /// Create a corrector, or None if the layout doesn't call for ECC
    pub fn new(layout: &'a Layout) -> Option<Self> {
        let codec = layout.codec()?;
        Some(Self {
            layout,
            codec,
            page: vec![0xFF; layout.raw_pagesize()],
            data: Vec::new(),
            ecc: Vec::new(),
        })
    }

    /// The page produced by the last call to [`correct_page`](Self::correct_page)
    pub fn page(&self) -> &[u8] {
        &self.page
    }

    /// Correct one raw page (`pagesize + oobsize` bytes).
    ///
    /// The corrected page is available from [`page`](Self::page) afterward. Only the protected
    /// data and parity regions are carried over; every other byte of it reads as erased.
    pub fn correct_page(&mut self, raw: &[u8]) -> Result<PageOutcome> {
        let layout = self.layout;
        ensure_config!(
            raw.len() == layout.raw_pagesize(),
            "page is {} bytes, layout expects {}",
            raw.len(),
            layout.raw_pagesize()
        );

        self.page.fill(0xFF);
        let mut erased = true;
        for region in layout.protected_regions() {
            let bytes = &raw[region.clone()];
            erased &= bytes.is_erased();
            self.page[region.clone()].copy_from_slice(bytes);
        }

        let mut outcome = PageOutcome {
            state: PageState::Erased,
            flips: 0,
            uncorrectable: false,
        };
        if erased {
            return Ok(outcome);
        }
        outcome.state = PageState::Protected;

        for (data_chunk, ecc_chunk) in layout.chunks() {
            if ecc_chunk.is_empty() {
                continue;
            }

            gather(data_chunk, &self.page, &mut self.data);
            gather(ecc_chunk, &self.page, &mut self.ecc);

            layout.data_transform().apply(&mut self.data);
            layout.ecc_transform().apply(&mut self.ecc);
            if layout.nibble_shift() {
                shift_nibble_left(&mut self.ecc);
            }

            match self.codec.decode_and_correct(&mut self.data, &mut self.ecc) {
                Ok(0) => (),
                Ok(flips) => {
                    debug!("Detected {flips} flips");
                    outcome.flips += flips;
                }
                Err(BchError::Uncorrectable) => outcome.uncorrectable = true,
                Err(e) => return Err(e.into()),
            }

            // Undo the transforms, so the buffers are as stored on flash again
            if layout.nibble_shift() {
                shift_nibble_right(&mut self.ecc);
            }
            layout.ecc_transform().apply(&mut self.ecc);
            layout.data_transform().apply(&mut self.data);

            scatter(data_chunk, &self.data, &mut self.page)?;
            scatter(ecc_chunk, &self.ecc, &mut self.page)?;
        }

        Ok(outcome)
    }
}

/// Fill in the parity regions of a page, as the flash controller would when programming it
#[cfg(test)]
pub(crate) fn program_page(layout: &Layout, page: &mut [u8]) -> anyhow::Result<()> {
    let codec = layout.codec().ok_or(anyhow::anyhow!("layout has no ECC"))?;
    let mut data = Vec::new();
    for (data_chunk, ecc_chunk) in layout.chunks() {
        if ecc_chunk.is_empty() {
            continue;
        }
        gather(data_chunk, page, &mut data);
        layout.data_transform().apply(&mut data);
        let mut ecc = codec.encode(&data)?;
        if layout.nibble_shift() {
            shift_nibble_right(&mut ecc);
        }
        layout.ecc_transform().apply(&mut ecc);
        scatter(ecc_chunk, &ecc, page)?;
    }
    Ok(())
}

#[cfg(test)]
fn test_page(len: usize, seed: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 31 + seed) ^ (i >> 5)) as u8)
        .collect()
}

#[cfg(test)]
fn simple_layout() -> Layout {
    use super::{Geometry, LayoutParams};

    let mut params = LayoutParams::new(Geometry {
        pagesize: 2048,
        oobsize: 64,
        pages_per_block: 4,
    });
    params.user_data = vec![vec![0..2048]];
    params.protected_data = vec![vec![0..2048]];
    params.ecc = vec![vec![2050..2058]];
    params.bch = Some((0x8003, 4));
    Layout::new(params).unwrap()
}

#[test]
fn test_no_codec() -> anyhow::Result<()> {
    use super::{Geometry, LayoutParams};

    let mut params = LayoutParams::new(Geometry {
        pagesize: 512,
        oobsize: 16,
        pages_per_block: 4,
    });
    params.user_data = vec![vec![0..512]];
    params.protected_data = vec![vec![0..512]];
    params.ecc = vec![vec![512..519]];
    let layout = Layout::new(params)?;
    assert!(PageCorrector::new(&layout).is_none());
    Ok(())
}

#[test]
fn test_correct_two_flips() -> anyhow::Result<()> {
    let layout = simple_layout();
    let mut original = test_page(layout.raw_pagesize(), 1);
    program_page(&layout, &mut original)?;

    let mut raw = original.clone();
    raw[17] ^= 0x04;
    raw[2000] ^= 0x80;

    let mut corrector = PageCorrector::new(&layout).unwrap();
    let outcome = corrector.correct_page(&raw)?;
    assert_eq!(
        outcome,
        PageOutcome {
            state: PageState::Protected,
            flips: 2,
            uncorrectable: false,
        }
    );
    assert_eq!(corrector.page()[..2048], original[..2048]);
    assert_eq!(corrector.page()[2050..2058], original[2050..2058]);

    // Bytes outside every region read back as erased
    assert!(corrector.page()[2048..2050].is_erased());
    assert!(corrector.page()[2058..].is_erased());

    // A clean page comes back unchanged, with nothing counted
    let outcome = corrector.correct_page(&original)?;
    assert_eq!(outcome.flips, 0);
    assert!(!outcome.uncorrectable);
    assert_eq!(corrector.page()[..2048], original[..2048]);
    assert_eq!(corrector.page()[2050..2058], original[2050..2058]);
    Ok(())
}

#[test]
fn test_erased_page() -> anyhow::Result<()> {
    let layout = simple_layout();
    let raw = vec![0xFF; layout.raw_pagesize()];

    let mut corrector = PageCorrector::new(&layout).unwrap();
    let outcome = corrector.correct_page(&raw)?;
    assert_eq!(outcome.state, PageState::Erased);
    assert_eq!(outcome.flips, 0);
    assert!(!outcome.uncorrectable);
    assert_eq!(corrector.page(), &raw[..]);
    Ok(())
}

#[test]
fn test_uncorrectable_page() -> anyhow::Result<()> {
    let layout = simple_layout();
    let mut original = test_page(layout.raw_pagesize(), 2);
    program_page(&layout, &mut original)?;

    let mut raw = original.clone();
    for i in 0..5 {
        raw[100 + 300 * i] ^= 0x10;
    }

    let mut corrector = PageCorrector::new(&layout).unwrap();
    let outcome = corrector.correct_page(&raw)?;
    assert_eq!(outcome.state, PageState::Protected);
    assert!(outcome.uncorrectable);
    assert_eq!(outcome.flips, 0);

    // Best effort: the bytes are passed through as read
    assert_eq!(corrector.page()[..2048], raw[..2048]);
    Ok(())
}

#[test]
fn test_split_chunks_with_transforms() -> anyhow::Result<()> {
    use super::{Geometry, LayoutParams};
    use crate::ecc::BufferTransform;

    let mut params = LayoutParams::new(Geometry {
        pagesize: 1024,
        oobsize: 32,
        pages_per_block: 4,
    });
    params.user_data = vec![vec![0..1024]];
    params.protected_data = vec![vec![0..256, 300..556], vec![600..1000]];
    params.ecc = vec![vec![1024..1028, 1040..1043], vec![1030..1037]];
    params.data_transform = BufferTransform {
        invert: true,
        reverse: true,
    };
    params.ecc_transform = BufferTransform {
        invert: true,
        reverse: false,
    };
    params.left_shift = 4;
    params.bch = Some((0x201B, 4));
    let layout = Layout::new(params)?;

    let mut original = test_page(layout.raw_pagesize(), 3);
    program_page(&layout, &mut original)?;

    let mut raw = original.clone();
    raw[310] ^= 0x01; // first chunk, second data region
    raw[1041] ^= 0x10; // first chunk, second parity region
    raw[700] ^= 0x42; // second chunk, two bits

    let mut corrector = PageCorrector::new(&layout).unwrap();
    let outcome = corrector.correct_page(&raw)?;
    assert_eq!(outcome.flips, 4);
    assert!(!outcome.uncorrectable);
    for region in layout.protected_regions() {
        assert_eq!(corrector.page()[region.clone()], original[region.clone()]);
    }

    // Bytes covered by no region are dropped
    assert!(corrector.page()[256..300].is_erased());
    Ok(())
}

#[test]
fn test_scatter_lengths() {
    let chunk = vec![0..4, 8..10];
    let mut page = [0u8; 12];
    let mut buf = Vec::new();

    scatter(&chunk, &[1, 2, 3, 4, 5, 6], &mut page).unwrap();
    assert_eq!(page, [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 0, 0]);
    gather(&chunk, &page, &mut buf);
    assert_eq!(buf, [1, 2, 3, 4, 5, 6]);

    assert!(scatter(&chunk, &[1, 2, 3, 4, 5], &mut page).is_err());
    assert!(scatter(&chunk, &[1, 2, 3, 4, 5, 6, 7], &mut page).is_err());
}
