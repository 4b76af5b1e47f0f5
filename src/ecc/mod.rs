//! Error correction: the BCH codec and the bit transforms that adapt controller-specific parity
//! layouts to it.

pub mod bch;
pub mod transform;

pub use bch::{BchCodec, BchError};
pub use transform::{shift_nibble_left, shift_nibble_right, transform, BufferTransform};
