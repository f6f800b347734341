//! Finite-precision arithmetic codec.
//!
//! Interval widths carry U bits, probability masses carry V bits, and the
//! lower bound B carries U+V bits plus a carry position; everything fits in
//! a u64 for U+V up to 62.  Emitted bits whose polarity depends on a future
//! carry are held in the pending counter `c` and flushed as `0 1 1 ...` (or
//! inverted by the carry) once resolved.  After a multi-bit carry flush one
//! pending zero is retained so a later carry always has a bit to land in.
//!
//! The adaptive variant requantizes its running symbol counts before every
//! symbol, on both sides, so no probability table has to travel with the
//! payload.

use std::collections::HashMap;
use std::hash::Hash;
use bit_vec::BitVec;
use crate::Error;
use crate::tools::bits::{pack,BitCursor};
use crate::envelope;

/// leading zeros of `n` viewed as a `bits`-wide word
fn leading_zeros(n: u64,bits: usize) -> usize {
    let length = 64 - n.leading_zeros() as usize;
    if length >= bits {
        0
    } else {
        bits - length
    }
}

/// trailing ones of `n` viewed as a `bits`-wide word
fn trailing_ones(n: u64,bits: usize) -> usize {
    (n.trailing_ones() as usize).min(bits)
}

/// Shared encoder state: interval width A, lower bound B, pending bits c.
struct Encoder {
    u_bits: usize,
    v_bits: usize,
    a: u64,
    b: u64,
    c: i64,
    bits: BitVec
}

impl Encoder {
    fn new(u_bits: usize,v_bits: usize) -> Self {
        Self {
            u_bits,
            v_bits,
            a: (1 << u_bits) - 1,
            b: 0,
            c: 0,
            bits: BitVec::new()
        }
    }
    /// Resolve an overflow of B into the carry position: the held prefix
    /// `0 1 1 ...` has become `1 0 0 ...`, all but one pending zero of
    /// which can go out now.
    fn handle_carry(&mut self) {
        let uv = self.u_bits + self.v_bits;
        if (self.b >> uv) & 1 == 1 {
            self.b &= !(1u64 << uv);
            self.bits.push(true);
            self.c -= 1;
            if self.c > 1 {
                for _i in 0..self.c - 1 {
                    self.bits.push(false);
                }
                self.c = 1;
            }
        }
    }
    /// one symbol with mass `p` and cumulative mass `clo`, both V-bit
    fn step(&mut self,p: u64,clo: u64) {
        let uv = self.u_bits + self.v_bits;
        let a_ast = self.a * p;
        let delta_z = leading_zeros(a_ast,uv);
        self.b += self.a * clo;
        self.handle_carry();
        // the delta_z bits peeled off the top of B are about to become
        // definite, except for a trailing run of ones which stays pending
        if delta_z > 0 {
            let window = self.b >> (uv - delta_z);
            let n1 = trailing_ones(window,delta_z);
            if n1 < delta_z {
                if self.c > 0 {
                    self.bits.push(false);
                    self.c -= 1;
                }
                while self.c > 0 {
                    self.bits.push(true);
                    self.c -= 1;
                }
                for i in 0..delta_z - n1 - 1 {
                    self.bits.push((window >> (delta_z - 1 - i)) & 1 == 1);
                }
                self.c = n1 as i64 + 1;
            } else if self.c > 0 {
                self.c += n1 as i64;
            } else {
                for _i in 0..delta_z {
                    self.bits.push(true);
                }
                self.c = 0;
            }
        }
        self.a = a_ast >> (self.v_bits - delta_z);
        // mask before shifting so wide registers cannot overflow the u64
        self.b = (self.b & (((1u64 << uv) - 1) >> delta_z)) << delta_z;
    }
    /// round B up inside the last U+V-a-1 bits and flush everything
    fn finish(mut self,prefix_free: bool) -> BitVec {
        let uv = self.u_bits + self.v_bits;
        let a = prefix_free as usize;
        let x = uv - a - 1;
        if self.b & ((1u64 << x) - 1) != 0 {
            self.b += 1 << x;
        }
        self.handle_carry();
        self.bits.push(false);
        for _i in 1..self.c.max(1) {
            self.bits.push(true);
        }
        for i in 0..a + 1 {
            self.bits.push((self.b >> (uv - 1 - i)) & 1 == 1);
        }
        self.bits
    }
}

/// Shared decoder state: width A and the U+V-bit window u over the stream.
struct Decoder<'a> {
    u_bits: usize,
    v_bits: usize,
    a: u64,
    u: u64,
    curs: BitCursor<'a>
}

impl <'a> Decoder<'a> {
    fn new(u_bits: usize,v_bits: usize,byte_stream: &'a [u8]) -> Self {
        let mut curs = BitCursor::new(byte_stream);
        let mut u: u64 = 0;
        // the tail of a short codeword is implicit zeros
        for _i in 0..u_bits + v_bits {
            u = (u << 1) | curs.next_bit_or_zero() as u64;
        }
        Self {
            u_bits,
            v_bits,
            a: (1 << u_bits) - 1,
            u,
            curs
        }
    }
    /// first symbol k with `u < A * (c_V[k] + p_V[k])`
    fn identify(&self,p_v: &[u64],c_v: &[u64]) -> Option<usize> {
        for k in 0..p_v.len() {
            if self.u < self.a * (c_v[k] + p_v[k]) {
                return Some(k);
            }
        }
        None
    }
    fn consume(&mut self,k: usize,p_v: &[u64],c_v: &[u64]) {
        let uv = self.u_bits + self.v_bits;
        let a_ast = self.a * p_v[k];
        let delta_z = leading_zeros(a_ast,uv);
        let mut u = self.u - self.a * c_v[k];
        for _i in 0..delta_z {
            u = (u << 1) | self.curs.next_bit_or_zero() as u64;
        }
        self.u = u;
        self.a = a_ast >> (self.v_bits - delta_z);
    }
}

fn check_registers(u_bits: usize,v_bits: usize) -> Result<(),Error> {
    if u_bits == 0 || v_bits == 0 {
        return Err(Error::ConfigError("interval registers need at least one bit".to_string()));
    }
    if u_bits + v_bits > 62 {
        return Err(Error::ConfigError("interval registers exceed 62 bits".to_string()));
    }
    Ok(())
}

/// Arithmetic codec over a fixed, quantized probability table.
pub struct ArithmeticCodec<T> {
    symbols: Vec<T>,
    index: HashMap<T,usize>,
    u_bits: usize,
    v_bits: usize,
    prefix_free: bool,
    probs: Vec<f64>,
    p_v: Vec<u64>,
    c_v: Vec<u64>
}

impl <T: Copy + Eq + Hash> ArithmeticCodec<T> {
    pub fn new(probabilities: &[(T,f64)],prefix_free: bool,u_bits: usize,v_bits: usize) -> Result<Self,Error> {
        check_registers(u_bits,v_bits)?;
        if probabilities.is_empty() {
            return Err(Error::ConfigError("empty probability table".to_string()));
        }
        let mut symbols = Vec::new();
        let mut probs = Vec::new();
        let mut index = HashMap::new();
        for (symbol,p) in probabilities {
            if *p < 0.0 || *p > 1.0 {
                return Err(Error::ConfigError(format!("probability {} out of range",p)));
            }
            if index.insert(*symbol,symbols.len()).is_some() {
                return Err(Error::ConfigError("probability table contains duplicate symbols".to_string()));
            }
            symbols.push(*symbol);
            probs.push(*p);
        }
        let scale = (1u64 << v_bits) as f64;
        let p_v: Vec<u64> = probs.iter().map(|p| (p * scale).round() as u64).collect();
        if p_v.iter().sum::<u64>() > 1 << v_bits {
            return Err(Error::ConfigError("invalid quantization".to_string()));
        }
        let mut c_v = Vec::with_capacity(p_v.len());
        let mut acc = 0;
        for p in &p_v {
            c_v.push(acc);
            acc += p;
        }
        Ok(Self {
            symbols,
            index,
            u_bits,
            v_bits,
            prefix_free,
            probs,
            p_v,
            c_v
        })
    }
    /// quantized masses and cumulative masses, in table order
    pub fn quantized(&self) -> (&[u64],&[u64]) {
        (&self.p_v,&self.c_v)
    }
    pub fn encode_to_bits(&self,message: &[T]) -> Result<BitVec,Error> {
        let mut enc = Encoder::new(self.u_bits,self.v_bits);
        for symbol in message {
            let k = match self.index.get(symbol) {
                Some(k) => *k,
                None => return Err(Error::InvalidSymbol)
            };
            // a zero quantized mass makes the symbol unencodable
            if self.p_v[k] == 0 {
                return Err(Error::InvalidSymbol);
            }
            enc.step(self.p_v[k],self.c_v[k]);
        }
        let bits = enc.finish(self.prefix_free);
        log::debug!("arithmetic coder emitted {} bits for {} symbols",bits.len(),message.len());
        Ok(bits)
    }
    pub fn encode(&self,message: &[T]) -> Result<Vec<u8>,Error> {
        Ok(pack(&self.encode_to_bits(message)?))
    }
    /// emitted bit count, stored in the envelope so padding is unambiguous
    pub fn num_codeword_bits(&self,message: &[T]) -> Result<usize,Error> {
        Ok(self.encode_to_bits(message)?.len())
    }
    pub fn decoder<'a>(&'a self,byte_stream: &'a [u8],max_length: usize) -> ArithDecoder<'a,T> {
        ArithDecoder {
            codec: self,
            state: Decoder::new(self.u_bits,self.v_bits,byte_stream),
            remaining: max_length,
            failed: false
        }
    }
    pub fn decode(&self,byte_stream: &[u8],max_length: usize) -> Result<Vec<T>,Error> {
        self.decoder(byte_stream,max_length).collect()
    }
}

/// Lazy decoder for the fixed-table codec.
pub struct ArithDecoder<'a,T> {
    codec: &'a ArithmeticCodec<T>,
    state: Decoder<'a>,
    remaining: usize,
    failed: bool
}

impl <'a,T: Copy + Eq + Hash> Iterator for ArithDecoder<'a,T> {
    type Item = Result<T,Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        match self.state.identify(&self.codec.p_v,&self.codec.c_v) {
            Some(k) => {
                self.state.consume(k,&self.codec.p_v,&self.codec.c_v);
                self.remaining -= 1;
                Some(Ok(self.codec.symbols[k]))
            },
            None => {
                self.failed = true;
                Some(Err(Error::CorruptStream))
            }
        }
    }
}

/// Arithmetic codec whose pmf adapts to running symbol counts; the decoder
/// mirrors every update, so only the alphabet travels in the envelope.
pub struct AdaptiveArithmeticCodec<T> {
    symbols: Vec<T>,
    index: HashMap<T,usize>,
    u_bits: usize,
    v_bits: usize,
    prefix_free: bool
}

impl <T: Copy + Eq + Hash> AdaptiveArithmeticCodec<T> {
    pub fn new(alphabet: Vec<T>,prefix_free: bool,u_bits: usize,v_bits: usize) -> Result<Self,Error> {
        check_registers(u_bits,v_bits)?;
        if alphabet.is_empty() {
            return Err(Error::ConfigError("empty alphabet".to_string()));
        }
        if alphabet.len() as u64 > 1 << v_bits {
            return Err(Error::ConfigError("alphabet larger than the mass resolution".to_string()));
        }
        let mut index = HashMap::new();
        for (i,symbol) in alphabet.iter().enumerate() {
            if index.insert(*symbol,i).is_some() {
                return Err(Error::ConfigError("alphabet contains duplicate symbols".to_string()));
            }
        }
        Ok(Self {
            symbols: alphabet,
            index,
            u_bits,
            v_bits,
            prefix_free
        })
    }
    /// Quantize running counts to V-bit masses.  Floor division keeps the
    /// sum under 2^V, zero masses are bumped to one and the overage is
    /// stolen back from the largest mass.
    fn quantize_counts(&self,counts: &[u64]) -> (Vec<u64>,Vec<u64>) {
        let total: u64 = counts.iter().sum();
        let cap = 1u64 << self.v_bits;
        let mut p_v: Vec<u64> = counts.iter()
            .map(|n| (((*n as u128) << self.v_bits) / total as u128).max(1) as u64)
            .collect();
        let mut excess = p_v.iter().sum::<u64>() as i64 - cap as i64;
        while excess > 0 {
            let mut big = 0;
            for k in 1..p_v.len() {
                if p_v[k] > p_v[big] {
                    big = k;
                }
            }
            let take = (excess as u64).min(p_v[big] - 1);
            p_v[big] -= take;
            excess -= take as i64;
        }
        let mut c_v = Vec::with_capacity(p_v.len());
        let mut acc = 0;
        for p in &p_v {
            c_v.push(acc);
            acc += p;
        }
        (p_v,c_v)
    }
    pub fn encode_to_bits(&self,message: &[T]) -> Result<BitVec,Error> {
        let mut enc = Encoder::new(self.u_bits,self.v_bits);
        let mut counts = vec![1u64;self.symbols.len()];
        for symbol in message {
            let k = match self.index.get(symbol) {
                Some(k) => *k,
                None => return Err(Error::InvalidSymbol)
            };
            let (p_v,c_v) = self.quantize_counts(&counts);
            enc.step(p_v[k],c_v[k]);
            counts[k] += 1;
        }
        Ok(enc.finish(self.prefix_free))
    }
    pub fn encode(&self,message: &[T]) -> Result<Vec<u8>,Error> {
        Ok(pack(&self.encode_to_bits(message)?))
    }
    pub fn decode(&self,byte_stream: &[u8],max_length: usize) -> Result<Vec<T>,Error> {
        let mut state = Decoder::new(self.u_bits,self.v_bits,byte_stream);
        let mut counts = vec![1u64;self.symbols.len()];
        let mut ans = Vec::with_capacity(max_length);
        for _i in 0..max_length {
            let (p_v,c_v) = self.quantize_counts(&counts);
            match state.identify(&p_v,&c_v) {
                Some(k) => {
                    state.consume(k,&p_v,&c_v);
                    counts[k] += 1;
                    ans.push(self.symbols[k]);
                },
                None => return Err(Error::CorruptStream)
            }
        }
        Ok(ans)
    }
}

impl ArithmeticCodec<u8> {
    /// package the probability table, model tag, register widths, and K
    pub fn serialize(&self,message: &[u8]) -> Result<Vec<u8>,Error> {
        let k = self.num_codeword_bits(message)?;
        let mut codec_data = vec![0u8,self.prefix_free as u8,self.u_bits as u8,self.v_bits as u8];
        codec_data.extend((k as u32).to_be_bytes());
        codec_data.extend((self.symbols.len() as u16).to_be_bytes());
        for i in 0..self.symbols.len() {
            codec_data.push(self.symbols[i]);
            codec_data.extend(self.probs[i].to_be_bytes());
        }
        envelope::wrap(&codec_data,&self.encode(message)?,message.len())
    }
    pub fn decode_byte_stream(byte_stream: &[u8]) -> Result<Vec<u8>,Error> {
        let (codec_data,payload,count) = envelope::parse(byte_stream)?;
        if codec_data.len() < 10 || codec_data[0] != 0 {
            return Err(Error::CorruptStream);
        }
        let prefix_free = codec_data[1] != 0;
        let u_bits = codec_data[2] as usize;
        let v_bits = codec_data[3] as usize;
        let n = u16::from_be_bytes([codec_data[8],codec_data[9]]) as usize;
        if codec_data.len() != 10 + 9 * n {
            return Err(Error::CorruptStream);
        }
        let mut pairs = Vec::with_capacity(n);
        for i in 0..n {
            let at = 10 + 9 * i;
            let p = f64::from_be_bytes(codec_data[at+1..at+9].try_into().unwrap());
            pairs.push((codec_data[at],p));
        }
        let codec = Self::new(&pairs,prefix_free,u_bits,v_bits)?;
        codec.decode(payload,count)
    }
}

impl AdaptiveArithmeticCodec<u8> {
    /// only the alphabet and register widths travel with the payload
    pub fn serialize(&self,message: &[u8]) -> Result<Vec<u8>,Error> {
        let mut codec_data = vec![self.prefix_free as u8,self.u_bits as u8,self.v_bits as u8];
        codec_data.extend((self.symbols.len() as u16).to_be_bytes());
        codec_data.extend(&self.symbols);
        envelope::wrap(&codec_data,&self.encode(message)?,message.len())
    }
    pub fn decode_byte_stream(byte_stream: &[u8]) -> Result<Vec<u8>,Error> {
        let (codec_data,payload,count) = envelope::parse(byte_stream)?;
        if codec_data.len() < 5 {
            return Err(Error::CorruptStream);
        }
        let n = u16::from_be_bytes([codec_data[3],codec_data[4]]) as usize;
        if codec_data.len() != 5 + n {
            return Err(Error::CorruptStream);
        }
        let codec = Self::new(
            codec_data[5..].to_vec(),
            codec_data[0] != 0,
            codec_data[1] as usize,
            codec_data[2] as usize
        )?;
        codec.decode(payload,count)
    }
}

// *************** TESTS *****************

#[cfg(test)]
fn banana_codec() -> ArithmeticCodec<u8> {
    ArithmeticCodec::new(&[
        (b'A',1.0/2.0),
        (b'N',1.0/3.0),
        (b'B',1.0/6.0)
    ],false,4,4).expect("bad table")
}

#[test]
fn banana_quantization() {
    let codec = banana_codec();
    let (p_v,c_v) = codec.quantized();
    assert_eq!(p_v,&[8,5,3]);
    assert_eq!(c_v,&[0,8,13]);
    assert!(p_v.iter().sum::<u64>() <= 1 << 4);
}

#[test]
fn banana_codeword() {
    let codec = banana_codec();
    let bits = codec.encode_to_bits(b"BANANA").expect("encoding failed");
    let head: String = bits.iter().take(9).map(|b| if b { '1' } else { '0' }).collect();
    assert_eq!(head,"110100000");
}

#[test]
fn banana_round_trip() {
    let codec = banana_codec();
    let encoded = codec.encode(b"BANANA").expect("encoding failed");
    let decoded = codec.decode(&encoded,6).expect("decoding failed");
    assert_eq!(decoded,b"BANANA".to_vec());
}

#[test]
fn prefix_free_round_trip() {
    let codec = ArithmeticCodec::new(&[
        (b'A',1.0/2.0),
        (b'N',1.0/3.0),
        (b'B',1.0/6.0)
    ],true,4,4).expect("bad table");
    let encoded = codec.encode(b"BANANA").expect("encoding failed");
    let decoded = codec.decode(&encoded,6).expect("decoding failed");
    assert_eq!(decoded,b"BANANA".to_vec());
}

#[test]
fn wider_registers_round_trip() {
    let message = "a longer message, with punctuation; to push the coder through many renormalizations".as_bytes();
    let alphabet = crate::rice::distinct_symbols(message);
    // leave quantization slack so the rounded masses cannot sum past 2^V
    let total = (message.len() + alphabet.len()) as f64;
    let mut pairs = Vec::new();
    for symbol in alphabet {
        let count = message.iter().filter(|s| **s == symbol).count();
        pairs.push((symbol,count as f64 / total));
    }
    let codec = ArithmeticCodec::new(&pairs,false,12,16).expect("bad table");
    let encoded = codec.encode(message).expect("encoding failed");
    let decoded = codec.decode(&encoded,message.len()).expect("decoding failed");
    assert_eq!(decoded,message.to_vec());
}

#[test]
fn zero_mass_symbol_is_unencodable() {
    let codec = ArithmeticCodec::new(&[
        (b'a',0.999),
        (b'b',0.001)
    ],false,4,4).expect("bad table");
    assert!(codec.encode(b"b").is_err());
}

#[test]
fn zero_registers_are_rejected() {
    assert!(ArithmeticCodec::new(&[(b'a',1.0)],false,0,4).is_err());
    assert!(ArithmeticCodec::new(&[(b'a',1.0)],false,4,0).is_err());
}

#[test]
fn adaptive_round_trip() {
    let message = "adaptively counted symbols need no table in the envelope".as_bytes();
    let alphabet = crate::rice::distinct_symbols(message);
    let codec = AdaptiveArithmeticCodec::new(alphabet,false,16,16).expect("bad alphabet");
    let encoded = codec.encode(message).expect("encoding failed");
    let decoded = codec.decode(&encoded,message.len()).expect("decoding failed");
    assert_eq!(decoded,message.to_vec());
}

#[test]
fn static_envelope_round_trip() {
    let message = b"NABNABANANABANANA";
    let alphabet = crate::rice::distinct_symbols(message);
    let total = (message.len() + alphabet.len()) as f64;
    let mut pairs = Vec::new();
    for symbol in alphabet {
        let count = message.iter().filter(|s| **s == symbol).count();
        pairs.push((symbol,count as f64 / total));
    }
    let codec = ArithmeticCodec::new(&pairs,false,8,8).expect("bad table");
    let packaged = codec.serialize(message).expect("serialize failed");
    let restored = ArithmeticCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,message.to_vec());
}

#[test]
fn adaptive_envelope_round_trip() {
    let message = "the adaptive envelope carries only the alphabet".as_bytes();
    let alphabet = crate::rice::distinct_symbols(message);
    let codec = AdaptiveArithmeticCodec::new(alphabet,true,16,16).expect("bad alphabet");
    let packaged = codec.serialize(message).expect("serialize failed");
    let restored = AdaptiveArithmeticCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,message.to_vec());
}
