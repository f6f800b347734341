//! # Entropycoder Library
//!
//! Entropy and predictive codecs for symbol streams and integer sample arrays.
//! * `huffman` builds optimal prefix trees and runs the tree-based prefix codec
//! * `rice` holds the fixed-width, unary, and Golomb-Rice codecs
//! * `sfe` is the Shannon-Fano-Elias interval codec
//! * `arith` is the finite-precision arithmetic codec, with an adaptive-pmf variant
//! * `predictive` composes a sample predictor with a residual codec for images
//! * `transform` is the blockwise DCT + quantize + residual codec for images
//! * `envelope` is the length-prefixed container shared by all serialized codecs
//!
//! Encoders consume a full message and emit a byte string; decoders are lazy,
//! pulling a bounded number of bits per demanded symbol.  Every serialized
//! codec can rebuild itself from its envelope alone.
//!
//! ## Buffer Example
//!
//! ```rs
//! use entropycoder::huffman::TreeBasedCodec;
//! let message = "a small example message".as_bytes();
//! let codec = TreeBasedCodec::from_message(message).expect("bad message");
//! let packaged = codec.serialize(message).expect("encoding failed");
//! let restored = TreeBasedCodec::decode_byte_stream(&packaged).expect("decoding failed");
//! assert_eq!(message,restored);
//! ```

pub mod tools;
pub mod huffman;
pub mod rice;
pub mod sfe;
pub mod arith;
pub mod predictive;
pub mod transform;
pub mod envelope;
pub mod pgm;

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Codec Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("symbol outside the code's alphabet")]
    InvalidSymbol,
    #[error("corrupt bit stream")]
    CorruptStream,
    #[error("length overflows envelope field")]
    SizeOverflow,
    #[error("bad configuration: {0}")]
    ConfigError(String),
    #[error("file format mismatch")]
    FileFormatMismatch
}
