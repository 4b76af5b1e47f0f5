//! A binary BCH codec, compatible with the layout used by the Linux kernel's `lib/bch.c` (and
//! therefore by most NAND controllers' software fallbacks).
//!
//! The codeword is the data, fed MSB-first, followed by the parity. The parity is the remainder
//! of `data(x) * x^ecc_bits` divided by the generator polynomial, packed MSB-first into
//! `ceil(ecc_bits / 8)` bytes with the pad bits at the very end left zero.

use thiserror::Error;

/// Reasons why the codec refused to (or could not) decode a buffer pair
#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum BchError {
    /// More bits flipped than the code can correct, or the syndromes are inconsistent.
    #[error("uncorrectable number of bitflips")]
    Uncorrectable,

    /// The polynomial/`t` pair does not describe a usable code.
    #[error("invalid BCH parameters: {0}")]
    InvalidParameters(String),

    /// The parity buffer is not exactly `ecc_bytes` long.
    #[error("parity is {actual} bytes, expected {expected}")]
    ParityLength { expected: usize, actual: usize },

    /// The data and parity together exceed the codeword length `2^m - 1`.
    #[error("{bits} bits of data and parity exceed the {max}-bit codeword")]
    DataTooLong { bits: usize, max: usize },
}

/// A BCH code over GF(2^m), correcting up to `t` bitflips per codeword.
///
/// All state is fixed at construction, so a single codec may be shared freely between threads.
#[derive(Debug, Clone)]
pub struct BchCodec {
    /// The primitive polynomial, with the `x^m` term included
    poly: u32,

    /// Degree of the Galois field
    m: u32,

    /// Number of correctable bits
    t: usize,

    /// Multiplicative order of the field, `2^m - 1`, which is also the maximum codeword length
    n: usize,

    /// `exp[i]` is alpha^i; doubled in length so a sum of two logarithms can index it directly
    exp: Box<[u32]>,

    /// `log[alpha^i]` is i; `log[0]` is meaningless
    log: Box<[u32]>,

    /// Degree of the generator polynomial, i.e. number of parity bits
    ecc_bits: usize,

    /// Number of u64 words holding a left-aligned parity register
    ecc_words: usize,

    /// Generator polynomial without its leading term, left-aligned
    gen_mask: Box<[u64]>,

    /// Remainder of `v(x) * x^ecc_bits` for every byte value `v`, `ecc_words` words per entry
    table: Box<[u64]>,
}

impl BchCodec {
    /// Construct the codec for a primitive polynomial (e.g. `0x201B` for GF(2^13)) and a
    /// correction capability `t`.
    pub fn new(poly: u32, t: usize) -> Result<Self, BchError> {
        let invalid = |msg: String| Err(BchError::InvalidParameters(msg));

        if poly == 0 {
            return invalid("primitive polynomial is zero".to_string());
        }
        let m = 31 - poly.leading_zeros();
        if !(2..=16).contains(&m) {
            return invalid(format!("polynomial {poly:#x} has unsupported degree {m}"));
        }
        if t == 0 {
            return invalid("t must be at least 1".to_string());
        }

        let n = (1usize << m) - 1;
        let mut exp = vec![0u32; 2 * n];
        let mut log = vec![0u32; n + 1];

        // Walk the powers of alpha; hitting 1 (or 0) early means `poly` isn't primitive.
        let mut x: u32 = 1;
        for i in 0..n {
            if x == 0 || (i > 0 && x == 1) {
                return invalid(format!("polynomial {poly:#x} is not primitive"));
            }
            exp[i] = x;
            exp[i + n] = x;
            log[x as usize] = i as u32;
            x <<= 1;
            if x & (1 << m) != 0 {
                x ^= poly;
            }
        }
        if x != 1 {
            return invalid(format!("polynomial {poly:#x} is not primitive"));
        }

        let mut codec = Self {
            poly,
            m,
            t,
            n,
            exp: exp.into(),
            log: log.into(),
            ecc_bits: 0,
            ecc_words: 0,
            gen_mask: Box::default(),
            table: Box::default(),
        };

        let generator = codec.generator_polynomial()?;
        let ecc_bits = generator.len() - 1;
        if ecc_bits >= n {
            return invalid(format!("t = {t} leaves no room for data in GF(2^{m})"));
        }

        codec.ecc_bits = ecc_bits;
        codec.ecc_words = ecc_bits.div_ceil(64);

        // Coefficients x^(ecc_bits-1) .. x^0, left-aligned
        let mut gen_mask = vec![0u64; codec.ecc_words];
        for k in 0..ecc_bits {
            if generator[ecc_bits - 1 - k] {
                gen_mask[k / 64] |= 1 << (63 - k % 64);
            }
        }
        codec.gen_mask = gen_mask.into();

        let mut table = vec![0u64; 256 * codec.ecc_words];
        for (value, entry) in table.chunks_exact_mut(codec.ecc_words).enumerate() {
            for bit in (0..8).rev() {
                codec.lfsr_step(entry, (value >> bit) & 1 != 0);
            }
        }
        codec.table = table.into();

        Ok(codec)
    }

    /// The primitive polynomial this codec was built from
    pub fn poly(&self) -> u32 {
        self.poly
    }

    /// Degree of the Galois field
    pub fn m(&self) -> u32 {
        self.m
    }

    /// Maximum number of correctable bitflips per codeword
    pub fn t(&self) -> usize {
        self.t
    }

    /// Number of parity bits per codeword
    pub fn ecc_bits(&self) -> usize {
        self.ecc_bits
    }

    /// Number of bytes of parity per codeword
    pub fn ecc_bytes(&self) -> usize {
        self.ecc_bits.div_ceil(8)
    }

    /// The largest data buffer, in bytes, that still fits a codeword
    pub fn max_data_bytes(&self) -> usize {
        (self.n - self.ecc_bits) / 8
    }

    /// Compute the parity for a data buffer
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, BchError> {
        self.check_data_len(data.len())?;
        let remainder = self.remainder(data);
        Ok(self.pack(&remainder))
    }

    /// Check `data` against `ecc`, correcting both in place.
    ///
    /// Returns the number of bitflips corrected (0 if the codeword was clean). On
    /// [`BchError::Uncorrectable`] neither buffer has been modified.
    pub fn decode_and_correct(&self, data: &mut [u8], ecc: &mut [u8]) -> Result<usize, BchError> {
        if ecc.len() != self.ecc_bytes() {
            return Err(BchError::ParityLength {
                expected: self.ecc_bytes(),
                actual: ecc.len(),
            });
        }
        self.check_data_len(data.len())?;

        // Remainder of the received codeword, from which all syndromes follow
        let mut remainder = self.remainder(data);
        for (word, received) in remainder.iter_mut().zip(self.unpack(ecc)) {
            *word ^= received;
        }
        if remainder.iter().all(|&w| w == 0) {
            return Ok(0);
        }

        let syndromes = self.syndromes(&remainder);
        let locator = self.berlekamp_massey(&syndromes)?;

        let data_bits = data.len() * 8;
        let nbits = data_bits + self.ecc_bits;
        for degree in self.chien_search(&locator, nbits)? {
            let pos = nbits - 1 - degree;
            if pos < data_bits {
                data[pos / 8] ^= 0x80 >> (pos % 8);
            } else {
                let pos = pos - data_bits;
                ecc[pos / 8] ^= 0x80 >> (pos % 8);
            }
        }

        Ok(locator.len() - 1)
    }

    fn check_data_len(&self, len: usize) -> Result<(), BchError> {
        let bits = len * 8 + self.ecc_bits;
        if bits > self.n {
            return Err(BchError::DataTooLong { bits, max: self.n });
        }
        Ok(())
    }

    fn mul(&self, a: u32, b: u32) -> u32 {
        if a == 0 || b == 0 {
            0
        } else {
            self.exp[(self.log[a as usize] + self.log[b as usize]) as usize]
        }
    }

    fn div(&self, a: u32, b: u32) -> u32 {
        if a == 0 {
            0
        } else {
            self.exp[self.log[a as usize] as usize + self.n - self.log[b as usize] as usize]
        }
    }

    /// The product of the minimal polynomials of alpha^1, alpha^3, ..., alpha^(2t-1).
    ///
    /// Returned as binary coefficients, lowest degree first.
    fn generator_polynomial(&self) -> Result<Vec<bool>, BchError> {
        let mut is_root = vec![false; self.n];
        for j in (1..2 * self.t).step_by(2) {
            let mut e = j % self.n;
            while !is_root[e] {
                is_root[e] = true;
                e = (2 * e) % self.n;
            }
        }

        let mut g: Vec<u32> = vec![1];
        for root in (0..self.n).filter(|&e| is_root[e]) {
            let alpha = self.exp[root];
            let mut next = vec![0u32; g.len() + 1];
            for (i, &coef) in g.iter().enumerate() {
                next[i + 1] ^= coef;
                next[i] ^= self.mul(coef, alpha);
            }
            g = next;
        }

        g.into_iter()
            .map(|coef| match coef {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(BchError::InvalidParameters(
                    "generator polynomial is not binary".to_string(),
                )),
            })
            .collect()
    }

    /// Feed one bit through the encoder's LFSR
    fn lfsr_step(&self, reg: &mut [u64], bit: bool) {
        let feedback = bit ^ (reg[0] >> 63 != 0);
        for i in 0..reg.len() {
            let carry = reg.get(i + 1).map_or(0, |w| w >> 63);
            reg[i] = (reg[i] << 1) | carry;
        }
        if feedback {
            for (word, g) in reg.iter_mut().zip(self.gen_mask.iter()) {
                *word ^= g;
            }
        }
    }

    /// Compute `data(x) * x^ecc_bits mod g(x)`, left-aligned in u64 words
    fn remainder(&self, data: &[u8]) -> Vec<u64> {
        let words = self.ecc_words;
        let mut reg = vec![0u64; words];
        for &byte in data {
            let index = ((reg[0] >> 56) as u8 ^ byte) as usize;
            for i in 0..words {
                let carry = reg.get(i + 1).map_or(0, |w| w >> 56);
                reg[i] = (reg[i] << 8) | carry;
            }
            for (word, t) in reg.iter_mut().zip(&self.table[index * words..][..words]) {
                *word ^= t;
            }
        }
        reg
    }

    fn pack(&self, reg: &[u64]) -> Vec<u8> {
        (0..self.ecc_bytes())
            .map(|k| (reg[k / 8] >> (56 - 8 * (k % 8))) as u8)
            .collect()
    }

    /// Inverse of `pack`, with the pad bits masked off
    fn unpack(&self, ecc: &[u8]) -> Vec<u64> {
        let mut reg = vec![0u64; self.ecc_words];
        for (k, &byte) in ecc.iter().enumerate() {
            reg[k / 8] |= u64::from(byte) << (56 - 8 * (k % 8));
        }
        for (w, word) in reg.iter_mut().enumerate() {
            let valid = std::cmp::min(64, self.ecc_bits - 64 * w);
            if valid < 64 {
                *word &= !(u64::MAX >> valid);
            }
        }
        reg
    }

    /// Evaluate the remainder at alpha^1 .. alpha^2t
    fn syndromes(&self, remainder: &[u64]) -> Vec<u32> {
        let mut syndromes = vec![0u32; 2 * self.t];
        for k in 0..self.ecc_bits {
            if remainder[k / 64] & (1 << (63 - k % 64)) == 0 {
                continue;
            }
            let degree = self.ecc_bits - 1 - k;
            for (j, s) in syndromes.iter_mut().enumerate() {
                *s ^= self.exp[((j + 1) * degree) % self.n];
            }
        }
        syndromes
    }

    /// Find the error locator polynomial, lowest degree first, trimmed to its degree
    fn berlekamp_massey(&self, syndromes: &[u32]) -> Result<Vec<u32>, BchError> {
        let len = syndromes.len() + 1;
        let mut c = vec![0u32; len];
        let mut b = vec![0u32; len];
        c[0] = 1;
        b[0] = 1;

        let mut l = 0usize;
        let mut shift = 1usize;
        let mut last_discrepancy = 1u32;

        for k in 0..syndromes.len() {
            let mut d = syndromes[k];
            for i in 1..=l.min(k) {
                d ^= self.mul(c[i], syndromes[k - i]);
            }

            if d == 0 {
                shift += 1;
                continue;
            }

            let coef = self.div(d, last_discrepancy);
            let previous = c.clone();
            for i in 0..len - shift.min(len) {
                c[i + shift] ^= self.mul(coef, b[i]);
            }

            if 2 * l <= k {
                l = k + 1 - l;
                b = previous;
                last_discrepancy = d;
                shift = 1;
            } else {
                shift += 1;
            }
        }

        let degree = c.iter().rposition(|&x| x != 0).unwrap_or(0);
        if l > self.t || degree != l {
            return Err(BchError::Uncorrectable);
        }
        c.truncate(degree + 1);
        Ok(c)
    }

    /// Find the degrees `d < nbits` where `locator(alpha^-d) == 0`.
    ///
    /// Every root must land inside the codeword, or the error pattern is uncorrectable.
    fn chien_search(&self, locator: &[u32], nbits: usize) -> Result<Vec<usize>, BchError> {
        let wanted = locator.len() - 1;
        let n = self.n as u32;

        // Logarithms of each term's current value, or None for zero coefficients
        let mut terms: Vec<Option<u32>> = locator
            .iter()
            .map(|&c| (c != 0).then(|| self.log[c as usize]))
            .collect();

        let mut found = Vec::with_capacity(wanted);
        for degree in 0..nbits {
            let sum = terms
                .iter()
                .flatten()
                .fold(0, |acc, &e| acc ^ self.exp[e as usize]);
            if sum == 0 {
                found.push(degree);
                if found.len() == wanted {
                    break;
                }
            }

            for (i, term) in terms.iter_mut().enumerate() {
                if let Some(e) = term {
                    let step = (i as u32) % n;
                    *e = (*e + n - step) % n;
                }
            }
        }

        if found.len() != wanted {
            return Err(BchError::Uncorrectable);
        }
        Ok(found)
    }
}

#[cfg(test)]
fn test_data(len: usize, seed: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 23 + seed * 7) ^ (i >> 3)) as u8)
        .collect()
}

#[cfg(test)]
fn flip_bit(buf: &mut [u8], pos: usize) {
    buf[pos / 8] ^= 0x80 >> (pos % 8);
}

#[test]
fn test_parameters() -> anyhow::Result<()> {
    let bch = BchCodec::new(0x201B, 4)?;
    assert_eq!(bch.m(), 13);
    assert_eq!(bch.ecc_bits(), 52);
    assert_eq!(bch.ecc_bytes(), 7);

    let bch = BchCodec::new(0x8003, 4)?;
    assert_eq!(bch.m(), 15);
    assert_eq!(bch.ecc_bits(), 60);
    assert_eq!(bch.ecc_bytes(), 8);
    assert!(bch.max_data_bytes() >= 2048);

    let bch = BchCodec::new(0x25, 2)?;
    assert_eq!(bch.ecc_bits(), 10);

    // x^4 + 1 is not even irreducible
    assert!(matches!(
        BchCodec::new(0x11, 1),
        Err(BchError::InvalidParameters(_))
    ));
    assert!(BchCodec::new(0x201B, 0).is_err());
    assert!(BchCodec::new(0, 4).is_err());

    Ok(())
}

#[test]
fn test_length_checks() -> anyhow::Result<()> {
    let bch = BchCodec::new(0x25, 1)?;
    assert_eq!(
        bch.encode(&[0u8; 4]),
        Err(BchError::DataTooLong { bits: 37, max: 31 })
    );

    let bch = BchCodec::new(0x201B, 4)?;
    let mut data = test_data(512, 0);
    let mut ecc = vec![0u8; 6];
    assert_eq!(
        bch.decode_and_correct(&mut data, &mut ecc),
        Err(BchError::ParityLength {
            expected: 7,
            actual: 6
        })
    );
    Ok(())
}

#[test]
fn test_clean_codeword() -> anyhow::Result<()> {
    let bch = BchCodec::new(0x201B, 4)?;
    let data = test_data(512, 1);
    let ecc = bch.encode(&data)?;

    // The four pad bits at the end of the parity are always zero
    assert_eq!(ecc[6] & 0x0F, 0);

    let (mut data_out, mut ecc_out) = (data.clone(), ecc.clone());
    assert_eq!(bch.decode_and_correct(&mut data_out, &mut ecc_out), Ok(0));
    assert_eq!(data_out, data);
    assert_eq!(ecc_out, ecc);

    // Pad bits don't take part in decoding
    ecc_out[6] |= 0x0F;
    assert_eq!(bch.decode_and_correct(&mut data_out, &mut ecc_out), Ok(0));

    // All-zero data has all-zero parity
    assert_eq!(bch.encode(&[0u8; 512])?, vec![0u8; 7]);
    Ok(())
}

#[test]
fn test_single_flip() -> anyhow::Result<()> {
    let bch = BchCodec::new(0x201B, 4)?;
    let data = test_data(512, 2);
    let ecc = bch.encode(&data)?;

    let mut flipped = data.clone();
    flipped[510] ^= 0x01;
    let mut ecc_out = ecc.clone();
    assert_eq!(bch.decode_and_correct(&mut flipped, &mut ecc_out), Ok(1));
    assert_eq!(flipped, data);
    assert_eq!(ecc_out, ecc);

    Ok(())
}

#[test]
fn test_max_flips() -> anyhow::Result<()> {
    let bch = BchCodec::new(0x8003, 4)?;
    let data = test_data(2048, 3);
    let ecc = bch.encode(&data)?;

    // Two in the data, two in the parity
    let (mut data_out, mut ecc_out) = (data.clone(), ecc.clone());
    flip_bit(&mut data_out, 0);
    flip_bit(&mut data_out, 12345);
    flip_bit(&mut ecc_out, 3);
    flip_bit(&mut ecc_out, 59);
    assert_eq!(bch.decode_and_correct(&mut data_out, &mut ecc_out), Ok(4));
    assert_eq!(data_out, data);
    assert_eq!(ecc_out, ecc);

    Ok(())
}

#[test]
fn test_exhaustive_small_code() -> anyhow::Result<()> {
    // GF(2^5), t = 2: 16 bits of data and 10 of parity, so every 1- and 2-bit error pattern of
    // the 26-bit codeword can be tried.
    let bch = BchCodec::new(0x25, 2)?;
    let data = [0xA5u8, 0x3C];
    let ecc = bch.encode(&data)?;
    assert_eq!(ecc.len(), 2);

    let flip = |data: &mut [u8], ecc: &mut [u8], pos: usize| {
        if pos < 16 {
            flip_bit(data, pos);
        } else {
            flip_bit(ecc, pos - 16);
        }
    };

    for a in 0..26 {
        for b in a..26 {
            let (mut data_out, mut ecc_out) = (data, ecc.clone());
            flip(&mut data_out, &mut ecc_out, a);
            let expected = if a == b {
                1
            } else {
                flip(&mut data_out, &mut ecc_out, b);
                2
            };
            assert_eq!(
                bch.decode_and_correct(&mut data_out, &mut ecc_out),
                Ok(expected),
                "flips at {a}, {b}"
            );
            assert_eq!(data_out, data);
            assert_eq!(ecc_out, ecc);
        }
    }
    Ok(())
}

#[test]
fn test_uncorrectable() -> anyhow::Result<()> {
    let bch = BchCodec::new(0x201B, 4)?;
    let data = test_data(512, 4);

    let mut data_out = data.clone();
    let mut ecc_out = vec![0u8; 7];
    assert_eq!(
        bch.decode_and_correct(&mut data_out, &mut ecc_out),
        Err(BchError::Uncorrectable)
    );
    assert_eq!(data_out, data);
    assert_eq!(ecc_out, vec![0u8; 7]);
    Ok(())
}

/// A 512-byte chunk and its parity as computed by the Linux BCH library for BCH(0x201B, 4)
#[cfg(test)]
const REFERENCE_CHUNK: [u8; 512] = [
    0xe9, 0xbd, 0x44, 0x03, 0x61, 0x4a, 0xd1, 0x1b, 0x4b, 0xee, 0xa0, 0xd7, 0x9e, 0x0b, 0x11, 0xb1,
    0x8d, 0x2b, 0x78, 0xe1, 0x0b, 0x42, 0xad, 0x96, 0x88, 0xbe, 0x27, 0x2a, 0x8a, 0x13, 0x2c, 0xe3,
    0x79, 0xa3, 0x5b, 0x3f, 0xec, 0xd5, 0xc7, 0x7b, 0x66, 0x16, 0xe4, 0xd7, 0x47, 0xe5, 0x02, 0x98,
    0x1c, 0xa6, 0xec, 0xfc, 0x44, 0x5f, 0x17, 0xeb, 0xc8, 0x82, 0x26, 0x09, 0xf0, 0x9a, 0xf8, 0x98,
    0xeb, 0xf3, 0x98, 0x3b, 0xa5, 0x99, 0xcc, 0x83, 0x0c, 0x7a, 0xef, 0x2b, 0xce, 0xe0, 0xed, 0x83,
    0x40, 0x7b, 0xe2, 0xfd, 0x91, 0xf7, 0xeb, 0xdc, 0xd7, 0x44, 0x7f, 0x43, 0xc6, 0xcd, 0x78, 0x6a,
    0x03, 0x00, 0xc3, 0x0d, 0xce, 0xc6, 0x52, 0x4f, 0x8e, 0x82, 0xbf, 0xdc, 0x7b, 0xc6, 0xf4, 0x97,
    0x01, 0x41, 0x2e, 0x9f, 0xd9, 0xe9, 0xda, 0x82, 0xe6, 0x51, 0xf2, 0x8c, 0x38, 0xed, 0x4f, 0x74,
    0x8a, 0xb2, 0x3d, 0x6f, 0x30, 0x5d, 0x71, 0x5c, 0xc4, 0xbe, 0xe0, 0x08, 0x8c, 0x98, 0x58, 0x60,
    0x1f, 0xfd, 0x24, 0x26, 0xd4, 0x10, 0x23, 0x08, 0xcc, 0xc9, 0xb3, 0xd1, 0x71, 0xff, 0x04, 0xd8,
    0xdb, 0x28, 0x22, 0x58, 0x9e, 0x62, 0x59, 0x6c, 0xde, 0xfb, 0x38, 0x97, 0xdc, 0xe6, 0xd9, 0xb7,
    0xeb, 0x96, 0x0f, 0x08, 0x60, 0x08, 0x65, 0x08, 0xbd, 0xef, 0x8a, 0xe6, 0xed, 0xdd, 0x20, 0xe7,
    0xd9, 0xac, 0x5c, 0x2d, 0xad, 0xbb, 0xaa, 0xc8, 0x40, 0x1f, 0xc7, 0x44, 0xa1, 0xb3, 0xb5, 0x2f,
    0x0a, 0xa0, 0xca, 0xa7, 0x4a, 0xd3, 0xac, 0x4b, 0x24, 0x13, 0x15, 0x21, 0xd0, 0xc6, 0xf8, 0xd8,
    0x3e, 0xbc, 0x04, 0x29, 0x70, 0x16, 0xdb, 0xe9, 0xff, 0x31, 0xfa, 0x70, 0x0d, 0x13, 0xf2, 0x9e,
    0xc5, 0x51, 0x5d, 0x16, 0x06, 0xe4, 0x8e, 0xe1, 0xcb, 0x45, 0xcb, 0xee, 0x96, 0xc1, 0x25, 0x40,
    0xb0, 0x23, 0xb5, 0x8a, 0x64, 0x29, 0x36, 0x5f, 0x34, 0x9c, 0x8c, 0x75, 0x2c, 0x3c, 0x3c, 0xc9,
    0x39, 0x02, 0x88, 0x02, 0x82, 0x38, 0x92, 0x03, 0xe9, 0xca, 0xf1, 0xf2, 0xdd, 0x66, 0xe4, 0xbf,
    0x60, 0xc6, 0x52, 0x73, 0x43, 0x76, 0xa8, 0xd3, 0x60, 0x68, 0x04, 0xa6, 0x7c, 0x01, 0xa1, 0xed,
    0xe6, 0xa9, 0xaf, 0xe6, 0xc9, 0x00, 0x5c, 0x7c, 0x67, 0x7e, 0x73, 0xbb, 0xba, 0xb9, 0xbc, 0x27,
    0xb1, 0x7d, 0x55, 0x54, 0x53, 0x86, 0x64, 0xd6, 0xf3, 0x6a, 0x4a, 0x5f, 0xc7, 0x16, 0xe6, 0x93,
    0x30, 0xd6, 0x1a, 0x2e, 0x21, 0x50, 0x5d, 0xcc, 0xaa, 0x1c, 0xd3, 0x7d, 0x0a, 0x7f, 0x64, 0xc9,
    0xa1, 0xa6, 0x91, 0xe9, 0x44, 0x27, 0xfb, 0x3f, 0xe7, 0xde, 0x83, 0xed, 0x72, 0x5f, 0x6e, 0x74,
    0x01, 0xea, 0x99, 0x59, 0x0f, 0x39, 0x3d, 0xcd, 0x2e, 0x1b, 0x7a, 0xd2, 0xd9, 0x65, 0xc9, 0x75,
    0x09, 0x0e, 0x23, 0x29, 0x4f, 0xd9, 0xc0, 0xd2, 0xe8, 0x93, 0x3c, 0x64, 0xdc, 0xbd, 0x31, 0xea,
    0xd6, 0x97, 0x5c, 0x58, 0x1d, 0xf8, 0x4c, 0x1d, 0xda, 0x83, 0x08, 0xdd, 0xbd, 0x53, 0x62, 0x8a,
    0x36, 0x32, 0xce, 0x9f, 0xe5, 0x5d, 0x48, 0xfc, 0xec, 0xcc, 0xf2, 0x83, 0xdd, 0xa4, 0xc6, 0xcb,
    0xd7, 0x2d, 0xe4, 0x9d, 0x73, 0xb9, 0xe9, 0xa1, 0xff, 0x34, 0xd4, 0x97, 0xda, 0x82, 0x4c, 0xa8,
    0x64, 0xd9, 0x53, 0xd3, 0x67, 0xa4, 0x9e, 0x4d, 0x95, 0xd7, 0x16, 0x3e, 0xcf, 0xfc, 0xf6, 0x0a,
    0x84, 0x28, 0x4d, 0x8b, 0x0d, 0xee, 0x27, 0x8d, 0x94, 0xca, 0x75, 0x9b, 0xa1, 0xe3, 0x2a, 0xe0,
    0x91, 0x41, 0xac, 0xc6, 0x45, 0x05, 0xe2, 0x39, 0x10, 0x6a, 0x35, 0x0a, 0xfb, 0x07, 0x36, 0xf4,
    0xf9, 0x32, 0xcb, 0xcc, 0x57, 0x17, 0xad, 0x66, 0x5e, 0x5b, 0xe5, 0x19, 0x54, 0xc6, 0x75, 0xd5,
];

#[cfg(test)]
const REFERENCE_ECC: [u8; 7] = [0xbd, 0x22, 0x82, 0xbe, 0x18, 0x35, 0xa0];

#[test]
fn test_reference_vector() -> anyhow::Result<()> {
    let bch = BchCodec::new(0x201B, 4)?;
    assert_eq!(bch.encode(&REFERENCE_CHUNK)?, REFERENCE_ECC);

    let mut data = REFERENCE_CHUNK;
    let mut ecc = REFERENCE_ECC;
    assert_eq!(bch.decode_and_correct(&mut data, &mut ecc), Ok(0));

    data[510] ^= 0x01;
    assert_eq!(bch.decode_and_correct(&mut data, &mut ecc), Ok(1));
    assert_eq!(data, REFERENCE_CHUNK);
    assert_eq!(ecc, REFERENCE_ECC);

    let mut zero_ecc = [0u8; 7];
    assert_eq!(
        bch.decode_and_correct(&mut data, &mut zero_ecc),
        Err(BchError::Uncorrectable)
    );
    Ok(())
}
