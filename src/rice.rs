//! Fixed-width, unary, and Golomb-Rice codecs.
//!
//! All three operate on an ordered alphabet of distinct symbols; the
//! alphabet index is the integer actually coded.  `RiceCodec` composes the
//! other two: the quotient of the index goes out unary, the remainder goes
//! out as an R-bit fixed-width code.  `auto_encode` searches R for the
//! shortest stream, the winning R becomes part of the codec configuration
//! and travels in the envelope.

use std::collections::HashMap;
use std::hash::Hash;
use bit_vec::BitVec;
use num_traits::{PrimInt,Signed};
use crate::Error;
use crate::tools::bits::{pack,BitCursor};
use crate::envelope;

/// largest accepted Rice parameter, the remainder table has `2^R` entries
const MAX_RICE_PARAM: usize = 16;

/// distinct symbols of a message in first-occurrence order
pub fn distinct_symbols<T: Copy + Eq + Hash>(message: &[T]) -> Vec<T> {
    let mut seen = HashMap::new();
    let mut ans = Vec::new();
    for symbol in message {
        if seen.insert(*symbol,()).is_none() {
            ans.push(*symbol);
        }
    }
    ans
}

/// Zig-zag alphabet `[0, 1, -1, 2, -2, ...]` over `[lo, hi]`, the natural
/// residual ordering for signed prediction errors.
pub fn zigzag_alphabet<T: PrimInt + Signed>(lo: T,hi: T) -> Vec<T> {
    let mut ans = vec![T::zero()];
    let mut k = T::one();
    while k <= hi || -k >= lo {
        if k <= hi {
            ans.push(k);
        }
        if -k >= lo {
            ans.push(-k);
        }
        k = k + T::one();
    }
    ans
}

fn index_map<T: Copy + Eq + Hash>(alphabet: &[T]) -> Result<HashMap<T,usize>,Error> {
    if alphabet.is_empty() {
        return Err(Error::ConfigError("empty alphabet".to_string()));
    }
    let mut index = HashMap::new();
    for (i,symbol) in alphabet.iter().enumerate() {
        if index.insert(*symbol,i).is_some() {
            return Err(Error::ConfigError("alphabet contains duplicate symbols".to_string()));
        }
    }
    Ok(index)
}

/// Fixed-length binary code over a finite alphabet, `ceil(log2 |A|)` bits
/// per symbol, MSB-first.  A one-symbol alphabet codes to zero bits.
pub struct FixedCodec<T> {
    alphabet: Vec<T>,
    index: HashMap<T,usize>,
    num_bits: usize
}

impl <T: Copy + Eq + Hash> FixedCodec<T> {
    pub fn new(alphabet: Vec<T>) -> Result<Self,Error> {
        let index = index_map(&alphabet)?;
        let num_bits = match alphabet.len() - 1 {
            0 => 0,
            n => 64 - (n as u64).leading_zeros() as usize
        };
        Ok(Self {
            alphabet,
            index,
            num_bits
        })
    }
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }
    fn push_codeword(&self,n: usize,bits: &mut BitVec) {
        for b in (0..self.num_bits).rev() {
            bits.push((n >> b) & 1 != 0);
        }
    }
    pub fn encode_to_bits(&self,message: &[T]) -> Result<BitVec,Error> {
        let mut bits = BitVec::new();
        for symbol in message {
            match self.index.get(symbol) {
                Some(n) => self.push_codeword(*n,&mut bits),
                None => return Err(Error::InvalidSymbol)
            }
        }
        Ok(bits)
    }
    pub fn encode(&self,message: &[T]) -> Result<Vec<u8>,Error> {
        Ok(pack(&self.encode_to_bits(message)?))
    }
    /// Read one alphabet index, `None` on a clean end of stream.
    /// A truncated codeword or an out-of-range index is corrupt.
    pub(crate) fn read_index(&self,curs: &mut BitCursor) -> Result<Option<usize>,Error> {
        if self.num_bits == 0 {
            return Ok(None);
        }
        let mut n: usize = match curs.next_bit() {
            Some(bit) => bit as usize,
            None => return Ok(None)
        };
        for _i in 1..self.num_bits {
            match curs.next_bit() {
                Some(bit) => n = (n << 1) | bit as usize,
                None => return Err(Error::CorruptStream)
            }
        }
        if n >= self.alphabet.len() {
            return Err(Error::CorruptStream);
        }
        Ok(Some(n))
    }
    pub fn decode(&self,byte_stream: &[u8],max_length: Option<usize>) -> Result<Vec<T>,Error> {
        let mut curs = BitCursor::new(byte_stream);
        let mut ans = Vec::new();
        while max_length.is_none() || ans.len() < max_length.unwrap() {
            match self.read_index(&mut curs)? {
                Some(n) => ans.push(self.alphabet[n]),
                None => break
            }
        }
        Ok(ans)
    }
}

/// Unary code: alphabet index `n` becomes `n` zeros and a one.
pub struct UnaryCodec<T> {
    alphabet: Vec<T>,
    index: HashMap<T,usize>
}

impl <T: Copy + Eq + Hash> UnaryCodec<T> {
    pub fn new(alphabet: Vec<T>) -> Result<Self,Error> {
        let index = index_map(&alphabet)?;
        Ok(Self {
            alphabet,
            index
        })
    }
    pub fn encode_to_bits(&self,message: &[T]) -> Result<BitVec,Error> {
        let mut bits = BitVec::new();
        for symbol in message {
            match self.index.get(symbol) {
                Some(n) => {
                    for _i in 0..*n {
                        bits.push(false);
                    }
                    bits.push(true);
                },
                None => return Err(Error::InvalidSymbol)
            }
        }
        Ok(bits)
    }
    pub fn encode(&self,message: &[T]) -> Result<Vec<u8>,Error> {
        Ok(pack(&self.encode_to_bits(message)?))
    }
    /// Count zeros up to the next one.  Exhausting the stream first is a
    /// clean stop, the remaining bits are padding.
    pub(crate) fn read_index(&self,curs: &mut BitCursor) -> Result<Option<usize>,Error> {
        let mut n = 0;
        loop {
            match curs.next_bit() {
                Some(1) => break,
                Some(_) => n += 1,
                None => return Ok(None)
            }
        }
        if n >= self.alphabet.len() {
            return Err(Error::CorruptStream);
        }
        Ok(Some(n))
    }
    pub fn decode(&self,byte_stream: &[u8],max_length: Option<usize>) -> Result<Vec<T>,Error> {
        let mut curs = BitCursor::new(byte_stream);
        let mut ans = Vec::new();
        while max_length.is_none() || ans.len() < max_length.unwrap() {
            match self.read_index(&mut curs)? {
                Some(n) => ans.push(self.alphabet[n]),
                None => break
            }
        }
        Ok(ans)
    }
}

/// Golomb-Rice code with parameter R over an ordered alphabet.
pub struct RiceCodec<T> {
    r: usize,
    alphabet: Vec<T>,
    index: HashMap<T,usize>,
    unary: UnaryCodec<usize>,
    fixed: FixedCodec<usize>
}

impl <T: Copy + Eq + Hash> RiceCodec<T> {
    pub fn new(r: usize,alphabet: Vec<T>) -> Result<Self,Error> {
        if r > MAX_RICE_PARAM {
            return Err(Error::ConfigError(format!("rice parameter {} too large",r)));
        }
        let index = index_map(&alphabet)?;
        let unary = UnaryCodec::new((0..alphabet.len()).collect())?;
        let fixed = FixedCodec::new((0..1 << r).collect())?;
        Ok(Self {
            r,
            alphabet,
            index,
            unary,
            fixed
        })
    }
    /// Encode under every R below `r_max` and keep the shortest stream.
    /// Returns the winning codec along with the packed bytes.
    pub fn auto_encode(message: &[T],alphabet: Vec<T>,r_max: usize) -> Result<(Self,Vec<u8>),Error> {
        if r_max == 0 {
            return Err(Error::ConfigError("auto_encode needs at least one candidate".to_string()));
        }
        let mut best: Option<(Self,BitVec)> = None;
        for r in 0..r_max {
            let codec = Self::new(r,alphabet.clone())?;
            let bits = codec.encode_to_bits(message)?;
            log::debug!("rice R={} codes {} bits",r,bits.len());
            best = match best {
                Some((b_codec,b_bits)) if b_bits.len() <= bits.len() => Some((b_codec,b_bits)),
                _ => Some((codec,bits))
            };
        }
        let (codec,bits) = best.unwrap();
        Ok((codec,pack(&bits)))
    }
    pub fn rice_param(&self) -> usize {
        self.r
    }
    pub fn encode_to_bits(&self,message: &[T]) -> Result<BitVec,Error> {
        let mut bits = BitVec::new();
        for symbol in message {
            let n = match self.index.get(symbol) {
                Some(n) => *n,
                None => return Err(Error::InvalidSymbol)
            };
            let quotient = n >> self.r;
            let remainder = n - (quotient << self.r);
            bits.extend(self.unary.encode_to_bits(&[quotient])?.iter());
            bits.extend(self.fixed.encode_to_bits(&[remainder])?.iter());
        }
        Ok(bits)
    }
    pub fn encode(&self,message: &[T]) -> Result<Vec<u8>,Error> {
        Ok(pack(&self.encode_to_bits(message)?))
    }
    pub fn decoder<'a>(&'a self,byte_stream: &'a [u8],max_length: Option<usize>) -> RiceDecoder<'a,T> {
        RiceDecoder {
            codec: self,
            curs: BitCursor::new(byte_stream),
            remaining: max_length,
            failed: false
        }
    }
    pub fn decode(&self,byte_stream: &[u8],max_length: Option<usize>) -> Result<Vec<T>,Error> {
        self.decoder(byte_stream,max_length).collect()
    }
}

/// Lazy Rice decoder, each demanded symbol advances the bit cursor by one
/// unary run plus R bits.
pub struct RiceDecoder<'a,T> {
    codec: &'a RiceCodec<T>,
    curs: BitCursor<'a>,
    remaining: Option<usize>,
    failed: bool
}

impl <'a,T: Copy + Eq + Hash> Iterator for RiceDecoder<'a,T> {
    type Item = Result<T,Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == Some(0) {
            return None;
        }
        let quotient = match self.codec.unary.read_index(&mut self.curs) {
            Ok(Some(q)) => q,
            Ok(None) => return None,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        let remainder = match self.codec.r {
            0 => 0,
            _ => match self.codec.fixed.read_index(&mut self.curs) {
                Ok(Some(rem)) => rem,
                // a quotient with a truncated remainder
                Ok(None) | Err(_) => {
                    self.failed = true;
                    return Some(Err(Error::CorruptStream));
                }
            }
        };
        let n = (quotient << self.codec.r) + remainder;
        if n >= self.codec.alphabet.len() {
            self.failed = true;
            return Some(Err(Error::CorruptStream));
        }
        if let Some(rem) = self.remaining {
            self.remaining = Some(rem - 1);
        }
        Some(Ok(self.codec.alphabet[n]))
    }
}

impl RiceCodec<u8> {
    /// package R, the alphabet, and the payload into the envelope
    pub fn serialize(&self,message: &[u8]) -> Result<Vec<u8>,Error> {
        let mut codec_data = vec![self.r as u8];
        codec_data.extend((self.alphabet.len() as u16).to_be_bytes());
        codec_data.extend(&self.alphabet);
        envelope::wrap(&codec_data,&self.encode(message)?,message.len())
    }
    pub fn decode_byte_stream(byte_stream: &[u8]) -> Result<Vec<u8>,Error> {
        let (codec_data,payload,count) = envelope::parse(byte_stream)?;
        if codec_data.len() < 3 {
            return Err(Error::CorruptStream);
        }
        let r = codec_data[0] as usize;
        let len = u16::from_be_bytes([codec_data[1],codec_data[2]]) as usize;
        if codec_data.len() != 3 + len {
            return Err(Error::CorruptStream);
        }
        let codec = Self::new(r,codec_data[3..].to_vec())?;
        codec.decode(payload,Some(count))
    }
}

// *************** TESTS *****************

#[test]
fn fixed_codec_width() {
    let codec = FixedCodec::new(vec![b'a',b'b',b'c',b'd',b'e']).expect("bad alphabet");
    assert_eq!(codec.num_bits(),3);
    let degenerate = FixedCodec::new(vec![b'a']).expect("bad alphabet");
    assert_eq!(degenerate.num_bits(),0);
    assert_eq!(degenerate.decode(&[0xff],None).expect("decode failed"),Vec::<u8>::new());
}

#[test]
fn fixed_codec_round_trip() {
    let codec = FixedCodec::new(vec![b'a',b'b',b'c',b'd']).expect("bad alphabet");
    let message = b"dcabbc";
    let encoded = codec.encode(message).expect("encoding failed");
    assert_eq!(codec.decode(&encoded,Some(6)).expect("decoding failed"),message.to_vec());
}

#[test]
fn unary_codewords() {
    let codec = UnaryCodec::new(vec![b'a',b'b',b'c',b'd']).expect("bad alphabet");
    let bits = codec.encode_to_bits(b"d").expect("encoding failed");
    let expect = crate::tools::bits::bits_from_string("0001").unwrap();
    assert_eq!(bits,expect);
    let encoded = codec.encode(b"adbc").expect("encoding failed");
    assert_eq!(codec.decode(&encoded,Some(4)).expect("decoding failed"),b"adbc".to_vec());
}

#[test]
fn rice_round_trip() {
    let message = b"what about this?";
    let alphabet = distinct_symbols(message);
    let codec = RiceCodec::new(2,alphabet).expect("bad alphabet");
    let encoded = codec.encode(message).expect("encoding failed");
    let decoded = codec.decode(&encoded,Some(16)).expect("decoding failed");
    assert_eq!(decoded,message.to_vec());
}

#[test]
fn auto_selection_is_no_worse_than_any_r() {
    let message = b"the auto rice parameter search must win or tie";
    let alphabet = distinct_symbols(message);
    let (best,bytes) = RiceCodec::auto_encode(message,alphabet.clone(),5).expect("auto encode failed");
    for r in 0..5 {
        let codec = RiceCodec::new(r,alphabet.clone()).expect("bad alphabet");
        let bits = codec.encode_to_bits(message).expect("encoding failed");
        assert!(8 * bytes.len() <= bits.len() + 7);
    }
    let decoded = best.decode(&bytes,Some(message.len())).expect("decoding failed");
    assert_eq!(decoded,message.to_vec());
}

#[test]
fn zigzag_alphabet_ordering() {
    let alphabet = zigzag_alphabet(-128i32,127i32);
    assert_eq!(alphabet.len(),256);
    assert_eq!(&alphabet[0..5],&[0,1,-1,2,-2]);
    assert_eq!(alphabet[255],-128);
    let small = zigzag_alphabet(-2i32,3i32);
    assert_eq!(small,vec![0,1,-1,2,-2,3]);
}

#[test]
fn rice_envelope_round_trip() {
    let message = b"some residual-ish data 0012345";
    let alphabet = distinct_symbols(message);
    let (codec,_) = RiceCodec::auto_encode(message,alphabet,5).expect("auto encode failed");
    let packaged = codec.serialize(message).expect("serialize failed");
    let restored = RiceCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,message.to_vec());
}

#[test]
fn signed_alphabet_round_trip() {
    let residuals: Vec<i32> = vec![0,-1,2,0,0,5,-3,1,0,-255,255];
    let alphabet: Vec<i32> = (-255..=255).collect();
    let codec = RiceCodec::new(4,alphabet).expect("bad alphabet");
    let encoded = codec.encode(&residuals).expect("encoding failed");
    let decoded = codec.decode(&encoded,Some(residuals.len())).expect("decoding failed");
    assert_eq!(decoded,residuals);
}
