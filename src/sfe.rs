//! Shannon-Fano-Elias interval codec.
//!
//! The closed-form variant: the whole message maps to one interval
//! `[L, L+W)` and the codeword is the integer `z = ceil(L * 2^K)` with
//! `K = ceil(-log2 W)` bits (one more in prefix-free mode), serialized
//! big-endian.  Interval state is f64, which bounds the usable message
//! length; a message whose interval width underflows is rejected rather
//! than silently mis-coded.  The probability table's insertion order is
//! part of the codec state, both sides walk it identically.

use std::collections::HashMap;
use std::hash::Hash;
use crate::Error;
use crate::envelope;

/// Probability model tag.  Markov and functional models are parameter hooks
/// carried for the envelope format, only IID is implemented.
#[derive(Clone,Copy,PartialEq,Debug)]
pub enum Model {
    Iid,
    Markov,
    Func
}

impl Model {
    pub fn tag(&self) -> u8 {
        match self {
            Model::Iid => 0,
            Model::Markov => 1,
            Model::Func => 2
        }
    }
    pub fn from_tag(tag: u8) -> Result<Self,Error> {
        match tag {
            0 => Ok(Model::Iid),
            1 => Ok(Model::Markov),
            2 => Ok(Model::Func),
            _ => Err(Error::CorruptStream)
        }
    }
}

pub struct SfeCodec<T> {
    symbols: Vec<T>,
    probs: Vec<f64>,
    /// cumulative mass strictly below each symbol, in insertion order
    cum: Vec<f64>,
    index: HashMap<T,usize>,
    prefix_free: bool
}

impl <T: Copy + Eq + Hash> SfeCodec<T> {
    pub fn new(probabilities: &[(T,f64)],model: Model,prefix_free: bool) -> Result<Self,Error> {
        if model != Model::Iid {
            return Err(Error::ConfigError("only the iid model is implemented".to_string()));
        }
        if probabilities.is_empty() {
            return Err(Error::ConfigError("empty probability table".to_string()));
        }
        let mut symbols = Vec::new();
        let mut probs = Vec::new();
        let mut cum = Vec::new();
        let mut index = HashMap::new();
        let mut acc = 0.0;
        for (symbol,p) in probabilities {
            if *p <= 0.0 || *p > 1.0 {
                return Err(Error::ConfigError(format!("probability {} out of range",p)));
            }
            if index.insert(*symbol,symbols.len()).is_some() {
                return Err(Error::ConfigError("probability table contains duplicate symbols".to_string()));
            }
            symbols.push(*symbol);
            probs.push(*p);
            cum.push(acc);
            acc += p;
        }
        if acc > 1.0 + 1e-9 {
            return Err(Error::ConfigError("probability masses sum beyond one".to_string()));
        }
        Ok(Self {
            symbols,
            probs,
            cum,
            index,
            prefix_free
        })
    }
    pub fn is_prefix_free(&self) -> bool {
        self.prefix_free
    }
    /// final interval [L, L+W) of the whole message
    fn interval(&self,message: &[T]) -> Result<(f64,f64),Error> {
        let mut l = 0.0;
        let mut w: f64 = 1.0;
        for symbol in message {
            let k = match self.index.get(symbol) {
                Some(k) => *k,
                None => return Err(Error::InvalidSymbol)
            };
            l += w * self.cum[k];
            w *= self.probs[k];
        }
        if w < f64::MIN_POSITIVE {
            return Err(Error::ConfigError("message too long for closed-form interval coding".to_string()));
        }
        Ok((l,w))
    }
    /// codeword bit count K; the decoder needs it to trim the padding
    pub fn num_codeword_bits(&self,message: &[T]) -> Result<usize,Error> {
        let (_,w) = self.interval(message)?;
        let k = (-w.log2()).ceil().max(0.0) as usize;
        Ok(k + self.prefix_free as usize)
    }
    /// Encode to `ceil(K/8)` big-endian bytes holding `z = ceil(L * 2^K)`.
    pub fn encode(&self,message: &[T]) -> Result<Vec<u8>,Error> {
        let (l,_) = self.interval(message)?;
        let k = self.num_codeword_bits(message)?;
        let num_bytes = (k + 7) / 8;
        let total_bits = 8 * num_bytes;
        let pad = total_bits - k;
        // binary expansion of L to K bits, then a ripple increment for the
        // ceiling when any remainder is left over
        let mut bits = vec![0u8;total_bits];
        let mut t = l;
        for i in 0..k {
            t *= 2.0;
            let b = t.floor();
            bits[pad + i] = b as u8;
            t -= b;
        }
        if t > 0.0 {
            let mut i = total_bits;
            let mut carried = false;
            while i > 0 {
                i -= 1;
                if bits[i] == 0 {
                    bits[i] = 1;
                    carried = true;
                    break;
                }
                bits[i] = 0;
            }
            if !carried {
                return Err(Error::SizeOverflow);
            }
        }
        let mut ans = Vec::with_capacity(num_bytes);
        for j in 0..num_bytes {
            let mut val = 0;
            for b in 0..8 {
                val |= bits[8*j + b] << (7 - b);
            }
            ans.push(val);
        }
        Ok(ans)
    }
    pub fn decoder<'a>(&'a self,byte_stream: &[u8],max_length: usize,num_bits: Option<usize>) -> SfeDecoder<'a,T> {
        let m = num_bits.unwrap_or(8 * byte_stream.len());
        // v = z * 2^-M without materializing z
        let mut v = 0.0;
        for (j,byte) in byte_stream.iter().enumerate() {
            let exp = 8 * (byte_stream.len() - 1 - j) as i32 - m as i32;
            v += *byte as f64 * 2f64.powi(exp);
        }
        SfeDecoder {
            codec: self,
            v,
            w: 1.0,
            l: 0.0,
            remaining: max_length,
            failed: false
        }
    }
    pub fn decode(&self,byte_stream: &[u8],max_length: usize,num_bits: Option<usize>) -> Result<Vec<T>,Error> {
        self.decoder(byte_stream,max_length,num_bits).collect()
    }
}

/// Lazy threshold-scan decoder over the shared interval state.
pub struct SfeDecoder<'a,T> {
    codec: &'a SfeCodec<T>,
    v: f64,
    w: f64,
    l: f64,
    remaining: usize,
    failed: bool
}

impl <'a,T: Copy + Eq + Hash> Iterator for SfeDecoder<'a,T> {
    type Item = Result<T,Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        let mut k = 0;
        let mut u = self.l + self.w * self.codec.probs[0];
        while self.v >= u {
            k += 1;
            if k == self.codec.symbols.len() {
                self.failed = true;
                return Some(Err(Error::CorruptStream));
            }
            u += self.w * self.codec.probs[k];
        }
        self.w *= self.codec.probs[k];
        self.l = u - self.w;
        self.remaining -= 1;
        Some(Ok(self.codec.symbols[k]))
    }
}

impl SfeCodec<u8> {
    /// package the probability table, model tag, and bit count K
    pub fn serialize(&self,message: &[u8]) -> Result<Vec<u8>,Error> {
        let k = self.num_codeword_bits(message)?;
        let mut codec_data = vec![Model::Iid.tag(),self.prefix_free as u8];
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
        if codec_data.len() < 8 {
            return Err(Error::CorruptStream);
        }
        let model = Model::from_tag(codec_data[0])?;
        let prefix_free = codec_data[1] != 0;
        let k = u32::from_be_bytes(codec_data[2..6].try_into().unwrap()) as usize;
        let n = u16::from_be_bytes([codec_data[6],codec_data[7]]) as usize;
        if codec_data.len() != 8 + 9 * n {
            return Err(Error::CorruptStream);
        }
        let mut pairs = Vec::with_capacity(n);
        for i in 0..n {
            let at = 8 + 9 * i;
            let p = f64::from_be_bytes(codec_data[at+1..at+9].try_into().unwrap());
            pairs.push((codec_data[at],p));
        }
        let codec = Self::new(&pairs,model,prefix_free)?;
        codec.decode(payload,count,Some(k))
    }
}

// *************** TESTS *****************

#[cfg(test)]
fn banana_codec() -> SfeCodec<u8> {
    SfeCodec::new(&[
        (b'a',1.0/2.0),
        (b'n',1.0/3.0),
        (b'b',1.0/6.0)
    ],Model::Iid,false).expect("bad table")
}

#[test]
fn banana_codeword() {
    let codec = banana_codec();
    let encoded = codec.encode(b"banana").expect("encoding failed");
    // z = 0b111000100 in 9 bits
    assert_eq!(encoded,hex::decode("01c4").unwrap());
    assert_eq!(codec.num_codeword_bits(b"banana").expect("bad message"),9);
}

#[test]
fn banana_round_trip() {
    let codec = banana_codec();
    let encoded = codec.encode(b"banana").expect("encoding failed");
    let decoded = codec.decode(&encoded,6,Some(9)).expect("decoding failed");
    assert_eq!(decoded,b"banana".to_vec());
}

#[test]
fn prefix_free_round_trip() {
    let codec = SfeCodec::new(&[
        (b'E',5.0/8.0),
        (b'R',2.0/8.0),
        (b'F',1.0/8.0)
    ],Model::Iid,true).expect("bad table");
    let message = b"REFEREE";
    let k = codec.num_codeword_bits(message).expect("bad message");
    let encoded = codec.encode(message).expect("encoding failed");
    let decoded = codec.decode(&encoded,message.len(),Some(k)).expect("decoding failed");
    assert_eq!(decoded,message.to_vec());
}

#[test]
fn invalid_symbol_is_rejected() {
    let codec = banana_codec();
    assert!(codec.encode(b"bananas").is_err());
}

#[test]
fn interval_underflow_is_rejected() {
    let codec = banana_codec();
    let message = vec![b'b';10000];
    assert!(codec.encode(&message).is_err());
}

#[test]
fn non_iid_models_are_hooks_only() {
    assert!(SfeCodec::new(&[(b'a',1.0)],Model::Markov,false).is_err());
}

#[test]
fn envelope_round_trip() {
    let message = b"banana band ban";
    let mut pairs = Vec::new();
    for symbol in crate::rice::distinct_symbols(message) {
        let count = message.iter().filter(|s| **s == symbol).count();
        pairs.push((symbol,count as f64 / message.len() as f64));
    }
    let codec = SfeCodec::new(&pairs,Model::Iid,false).expect("bad table");
    let packaged = codec.serialize(message).expect("serialize failed");
    let restored = SfeCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,message.to_vec());
}
