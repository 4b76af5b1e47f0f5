//! Bit-level transforms applied to data and parity buffers around the BCH codec.
//!
//! Controllers disagree with the codec about how bits are stored: some invert every bit, some
//! feed bytes LSB-first, and at least one stores its parity a nibble off from where the codec
//! expects it. Every transform here is an involution (or, for the nibble shifts, paired with its
//! inverse), so "undoing" a transform is a matter of applying it again.

/// Invert and/or bit-reverse every byte of `buffer`, in place.
///
/// Inversion is applied first, then reversal; both commute, so the order never matters for the
/// result. An empty buffer is left untouched.
pub fn transform(buffer: &mut [u8], invert: bool, reverse: bool) {
    if !invert && !reverse {
        return;
    }

    for byte in buffer.iter_mut() {
        if invert {
            *byte ^= 0xFF;
        }
        if reverse {
            *byte = byte.reverse_bits();
        }
    }
}

/// A pair of transform flags, as configured for one kind of buffer (data or parity)
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct BufferTransform {
    pub invert: bool,
    pub reverse: bool,
}

impl BufferTransform {
    /// Apply (or, equivalently, undo) this transform
    pub fn apply(self, buffer: &mut [u8]) {
        transform(buffer, self.invert, self.reverse)
    }

    /// Does this transform leave every buffer unchanged?
    pub fn is_identity(self) -> bool {
        !self.invert && !self.reverse
    }
}

/// Shift the whole buffer left by one nibble (4 bits), shifting in zeroes at the end.
///
/// Viewed as a hex string, this drops the first digit and appends a `0`.
pub fn shift_nibble_left(buffer: &mut [u8]) {
    let len = buffer.len();
    for i in 0..len {
        let next = buffer.get(i + 1).copied().unwrap_or(0);
        buffer[i] = (buffer[i] << 4) | (next >> 4);
    }
}

/// Shift the whole buffer right by one nibble (4 bits), shifting in zeroes at the start.
///
/// Viewed as a hex string, this drops the last digit and prepends a `0`.
pub fn shift_nibble_right(buffer: &mut [u8]) {
    for i in (0..buffer.len()).rev() {
        let prev = if i == 0 { 0 } else { buffer[i - 1] };
        buffer[i] = (buffer[i] >> 4) | (prev << 4);
    }
}

#[cfg(test)]
const SAMPLE: [u8; 10] = [0xde, 0x3d, 0x54, 0xd9, 0x9b, 0xfa, 0xd6, 0x65, 0x3b, 0xff];

#[test]
fn test_transform() {
    let mut buf = SAMPLE;
    transform(&mut buf, false, false);
    assert_eq!(buf, SAMPLE);

    let mut buf = SAMPLE;
    transform(&mut buf, true, false);
    assert_eq!(
        buf,
        [0x21, 0xc2, 0xab, 0x26, 0x64, 0x05, 0x29, 0x9a, 0xc4, 0x00]
    );

    let mut buf = SAMPLE;
    transform(&mut buf, false, true);
    assert_eq!(
        buf,
        [0x7b, 0xbc, 0x2a, 0x9b, 0xd9, 0x5f, 0x6b, 0xa6, 0xdc, 0xff]
    );

    let mut buf = SAMPLE;
    transform(&mut buf, true, true);
    assert_eq!(
        buf,
        [0x84, 0x43, 0xd5, 0x64, 0x26, 0xa0, 0x94, 0x59, 0x23, 0x00]
    );

    let mut empty: [u8; 0] = [];
    transform(&mut empty, true, true);
    assert!(empty.is_empty());
}

#[test]
fn test_transform_involution() {
    let all: Vec<u8> = (0..=255).collect();
    for (invert, reverse) in [(true, false), (false, true), (true, true)] {
        let mut buf = all.clone();
        transform(&mut buf, invert, reverse);
        transform(&mut buf, invert, reverse);
        assert_eq!(buf, all);
    }

    // The fixed points of bit reversal include both all-zeroes and all-ones
    let mut buf = [0x00, 0xFF, 0x81, 0x18];
    transform(&mut buf, false, true);
    assert_eq!(
        buf,
        [0x00, 0xFF, 0x81, 0x18]
    );

    let mut buf = [0x01, 0x80, 0x0F];
    BufferTransform {
        invert: false,
        reverse: true,
    }
    .apply(&mut buf);
    assert_eq!(
        buf,
        [0x80, 0x01, 0xF0]
    );
}

#[test]
fn test_nibble_shift() {
    let mut buf = [0x12, 0x34, 0x56];
    shift_nibble_left(&mut buf);
    assert_eq!(
        buf,
        [0x23, 0x45, 0x60]
    );
    shift_nibble_right(&mut buf);
    assert_eq!(
        buf,
        [0x02, 0x34, 0x56]
    );

    let mut empty: [u8; 0] = [];
    shift_nibble_left(&mut empty);
    shift_nibble_right(&mut empty);
}
