//! The static description of how one partition's raw pages are laid out: which byte ranges hold
//! user data, which are covered by ECC, where the parity lives, and how the controller mangled
//! the bits before computing it.

use std::ops::Range;

use super::Geometry;
use crate::ecc::{BchCodec, BufferTransform};
use crate::error::{ensure_config, Result};

/// A half-open byte range within one raw page
pub type Region = Range<usize>;

/// One or more regions that are treated as a single contiguous buffer, concatenated in order
pub type Chunk = Vec<Region>;

/// Total number of bytes covered by a chunk's regions
pub fn chunk_len(chunk: &[Region]) -> usize {
    chunk.iter().map(|r| r.len()).sum()
}

/// How (and whether) a partition's pages are protected
#[derive(Debug, Clone, Default)]
pub enum EccScheme {
    /// Pages are passed through as dumped
    #[default]
    None,

    /// Each protected chunk has BCH parity in its matching ECC chunk
    Bch(BchCodec),
}

/// The page regions from which an ETFS transaction record is synthesized
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EtfsLayout {
    pub fid: Region,
    pub cluster: Region,
    pub nclusters: Region,
    pub sequence: Region,
}

impl EtfsLayout {
    /// Size of one transaction record
    pub const RECORD_LEN: usize = 16;

    /// Bytes of padding in the record: two after the file ID, and the (zeroed) transaction and
    /// data area codes
    const PADDING_LEN: usize = 4;

    fn fields(&self) -> [&Region; 4] {
        [&self.fid, &self.cluster, &self.nclusters, &self.sequence]
    }

    /// The length of the record this layout produces
    pub fn record_len(&self) -> usize {
        self.fields().iter().map(|r| r.len()).sum::<usize>() + Self::PADDING_LEN
    }

    /// Append the transaction record for a (corrected) page to `out`
    pub fn build_transaction(&self, page: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(&page[self.fid.clone()]);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&page[self.cluster.clone()]);
        out.extend_from_slice(&page[self.nclusters.clone()]);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&page[self.sequence.clone()]);
    }
}

/// The unvalidated parameters of a [`Layout`], as read from configuration
#[derive(Debug, Clone)]
pub struct LayoutParams {
    pub geometry: Geometry,

    /// Regions making up the extracted payload, in output order
    pub user_data: Vec<Chunk>,

    /// ECC-protected data; chunk `i` is protected by `ecc[i]`
    pub protected_data: Vec<Chunk>,

    /// Parity chunks
    pub ecc: Vec<Chunk>,

    pub data_transform: BufferTransform,
    pub ecc_transform: BufferTransform,

    /// Nibble shift applied to the parity around decoding (0 or 4)
    pub left_shift: u8,

    /// Fail on uncorrectable pages, instead of warning and continuing
    pub ecc_strict: bool,

    /// `(primitive polynomial, t)` of the BCH code, if any
    pub bch: Option<(u32, usize)>,

    pub etfs: Option<EtfsLayout>,
}

impl LayoutParams {
    /// Parameters for an unprotected layout with every modifier at its default
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            user_data: Vec::new(),
            protected_data: Vec::new(),
            ecc: Vec::new(),
            data_transform: BufferTransform::default(),
            ecc_transform: BufferTransform::default(),
            left_shift: 0,
            ecc_strict: true,
            bch: None,
            etfs: None,
        }
    }
}

/// A validated page layout. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Layout {
    geometry: Geometry,
    user_data: Vec<Chunk>,
    protected_data: Vec<Chunk>,
    ecc: Vec<Chunk>,
    data_transform: BufferTransform,
    ecc_transform: BufferTransform,
    nibble_shift: bool,
    ecc_strict: bool,
    ecc_scheme: EccScheme,
    etfs: Option<EtfsLayout>,

    /// Bytes of output produced per page
    corrected_pagesize: usize,
}

impl Layout {
    /// Validate the parameters and compute the derived sizes
    pub fn new(params: LayoutParams) -> Result<Self> {
        let LayoutParams {
            geometry,
            user_data,
            protected_data,
            ecc,
            data_transform,
            ecc_transform,
            left_shift,
            ecc_strict,
            bch,
            etfs,
        } = params;

        ensure_config!(geometry.pagesize > 0, "pagesize must be non-zero");
        ensure_config!(
            geometry.pages_per_block > 0,
            "pages_per_block must be non-zero"
        );

        let raw_pagesize = geometry.raw_pagesize();
        let check_region = |kind: &str, region: &Region| -> Result<()> {
            ensure_config!(
                region.start < region.end && region.end <= raw_pagesize,
                "{kind} region {region:?} is not within the {raw_pagesize}-byte page"
            );
            Ok(())
        };
        for (kind, chunks) in [
            ("user data", &user_data),
            ("protected data", &protected_data),
            ("ecc", &ecc),
        ] {
            for region in chunks.iter().flatten() {
                check_region(kind, region)?;
            }
        }

        ensure_config!(
            protected_data.len() == ecc.len(),
            "{} protected data chunks but {} ecc chunks",
            protected_data.len(),
            ecc.len()
        );
        ensure_config!(
            left_shift == 0 || left_shift == 4,
            "left_shift_ecc_buf must be 0 or 4, not {left_shift}"
        );

        let ecc_scheme = match bch {
            None => EccScheme::None,
            Some((poly, t)) => {
                let codec = BchCodec::new(poly, t)?;
                for (i, (data, parity)) in protected_data.iter().zip(&ecc).enumerate() {
                    let parity_len = chunk_len(parity);
                    ensure_config!(
                        parity_len == 0 || parity_len == codec.ecc_bytes(),
                        "ecc chunk {i} is {parity_len} bytes, BCH({poly:#x}, {t}) needs {}",
                        codec.ecc_bytes()
                    );
                    ensure_config!(
                        chunk_len(data) <= codec.max_data_bytes(),
                        "protected data chunk {i} is {} bytes, BCH({poly:#x}, {t}) fits {}",
                        chunk_len(data),
                        codec.max_data_bytes()
                    );
                }
                EccScheme::Bch(codec)
            }
        };

        if let Some(etfs) = &etfs {
            for region in etfs.fields() {
                check_region("etfs", region)?;
            }
            ensure_config!(
                etfs.record_len() == EtfsLayout::RECORD_LEN,
                "etfs fields make a {}-byte transaction, expected {}",
                etfs.record_len(),
                EtfsLayout::RECORD_LEN
            );
        }

        let corrected_pagesize = user_data.iter().map(|c| chunk_len(c)).sum::<usize>()
            + etfs.as_ref().map_or(0, |_| EtfsLayout::RECORD_LEN);

        Ok(Self {
            geometry,
            user_data,
            protected_data,
            ecc,
            data_transform,
            ecc_transform,
            nibble_shift: left_shift == 4,
            ecc_strict,
            ecc_scheme,
            etfs,
            corrected_pagesize,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn raw_pagesize(&self) -> usize {
        self.geometry.raw_pagesize()
    }

    pub fn blocksize(&self) -> usize {
        self.geometry.blocksize()
    }

    pub fn pages_per_block(&self) -> usize {
        self.geometry.pages_per_block
    }

    pub fn user_data(&self) -> &[Chunk] {
        &self.user_data
    }

    /// Pairs of (protected data, parity) chunks, in declared order
    pub fn chunks(&self) -> impl Iterator<Item = (&Chunk, &Chunk)> {
        self.protected_data.iter().zip(&self.ecc)
    }

    /// Every protected data and parity region
    pub fn protected_regions(&self) -> impl Iterator<Item = &Region> {
        self.protected_data.iter().chain(&self.ecc).flatten()
    }

    pub fn data_transform(&self) -> BufferTransform {
        self.data_transform
    }

    pub fn ecc_transform(&self) -> BufferTransform {
        self.ecc_transform
    }

    /// Is the parity stored one nibble off from where the codec expects it?
    pub fn nibble_shift(&self) -> bool {
        self.nibble_shift
    }

    pub fn ecc_strict(&self) -> bool {
        self.ecc_strict
    }

    pub fn ecc_scheme(&self) -> &EccScheme {
        &self.ecc_scheme
    }

    pub fn etfs(&self) -> Option<&EtfsLayout> {
        self.etfs.as_ref()
    }

    /// The codec to correct pages with, or None if pages should be passed through as-is
    pub fn codec(&self) -> Option<&BchCodec> {
        match &self.ecc_scheme {
            EccScheme::Bch(codec) if !self.protected_data.is_empty() => Some(codec),
            _ => None,
        }
    }

    /// Bytes of output per page: the user data plus, for ETFS, the transaction record
    pub fn corrected_pagesize(&self) -> usize {
        self.corrected_pagesize
    }

    /// Append the user data (and ETFS transaction, if configured) of a corrected page to `out`
    pub fn extract(&self, page: &[u8], out: &mut Vec<u8>) {
        for region in self.user_data.iter().flatten() {
            out.extend_from_slice(&page[region.clone()]);
        }
        if let Some(etfs) = &self.etfs {
            etfs.build_transaction(page, out);
        }
    }
}

#[cfg(test)]
const TEST_GEOMETRY: Geometry = Geometry {
    pagesize: 2048,
    oobsize: 64,
    pages_per_block: 64,
};

#[cfg(test)]
fn test_etfs() -> EtfsLayout {
    EtfsLayout {
        fid: 2048..2050,
        cluster: 2050..2054,
        nclusters: 2054..2056,
        sequence: 2056..2060,
    }
}

#[test]
fn test_derived_sizes() -> anyhow::Result<()> {
    let mut params = LayoutParams::new(TEST_GEOMETRY);
    params.user_data = vec![vec![0..1024], vec![1024..2048, 2100..2104]];
    let layout = Layout::new(params.clone())?;
    assert_eq!(layout.blocksize(), 2112 * 64);
    assert_eq!(layout.corrected_pagesize(), 2052);
    assert!(layout.codec().is_none());
    assert!(layout.ecc_strict());

    params.etfs = Some(test_etfs());
    let layout = Layout::new(params)?;
    assert_eq!(layout.corrected_pagesize(), 2052 + 16);
    Ok(())
}

#[test]
fn test_validation() -> anyhow::Result<()> {
    let mut params = LayoutParams::new(TEST_GEOMETRY);
    params.user_data = vec![vec![0..2048]];
    params.protected_data = vec![vec![0..512], vec![512..1024]];
    params.ecc = vec![vec![2064..2071], vec![2071..2078]];
    params.bch = Some((0x201B, 4));
    let layout = Layout::new(params.clone())?;
    assert_eq!(layout.chunks().count(), 2);
    assert!(layout.codec().is_some());

    // Chunk count mismatch
    let mut bad = params.clone();
    bad.ecc.pop();
    assert!(matches!(Layout::new(bad), Err(crate::Error::Config(_))));

    // Parity not the size the codec produces
    let mut bad = params.clone();
    bad.ecc[1][0].end = 2077;
    assert!(Layout::new(bad).is_err());

    // Region past the end of the page
    let mut bad = params.clone();
    bad.user_data = vec![vec![2100..2113]];
    assert!(Layout::new(bad).is_err());

    // Too much data for a GF(2^13) codeword
    let mut bad = params.clone();
    bad.protected_data[0][0].end = 1024;
    assert!(Layout::new(bad).is_err());

    let mut bad = params.clone();
    bad.left_shift = 2;
    assert!(Layout::new(bad).is_err());

    let mut bad = params.clone();
    bad.bch = Some((0x11, 4));
    assert!(Layout::new(bad).is_err());

    let mut bad = params.clone();
    let mut etfs = test_etfs();
    etfs.sequence = 2056..2058;
    bad.etfs = Some(etfs);
    assert!(Layout::new(bad).is_err());

    // Empty parity leaves a chunk unprotected, which is allowed
    let mut ok = params;
    ok.ecc[1] = vec![];
    Layout::new(ok)?;

    Ok(())
}

#[test]
fn test_extract() -> anyhow::Result<()> {
    let mut params = LayoutParams::new(TEST_GEOMETRY);
    params.user_data = vec![vec![4..6], vec![0..2]];
    params.etfs = Some(test_etfs());
    let layout = Layout::new(params)?;

    let page: Vec<u8> = (0..2112).map(|i| i as u8).collect();
    let mut out = Vec::new();
    layout.extract(&page, &mut out);
    assert_eq!(
        out,
        [
            4, 5, 0, 1, // user data, in declared order
            0x00, 0x01, 0, 0, // fid, padding
            0x02, 0x03, 0x04, 0x05, // cluster
            0x06, 0x07, // nclusters
            0, 0, // tacode, dacode
            0x08, 0x09, 0x0A, 0x0B, // sequence
        ]
    );
    assert_eq!(out.len(), layout.corrected_pagesize());
    Ok(())
}
