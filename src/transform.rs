//! Transform image coding: blockwise 2-D DCT, uniform quantization, and a
//! residual entropy stage.
//!
//! The transform is the orthonormal DCT-II applied across rows then
//! columns of each block, so the inverse is just the transpose and the
//! quantization error is the only loss (plus the final 8-bit clip).
//! Quantized coefficients are clipped to [-128,127] and coded with Rice
//! R=3 over a zig-zag alphabet by default; an adaptive arithmetic stage
//! with a uniform starting pmf is the alternative.

use crate::Error;
use crate::pgm::Image;
use crate::predictive::ResidualCoder;
use crate::rice::zigzag_alphabet;
use crate::envelope;

pub const DEFAULT_BLOCK_SIZE: usize = 8;
pub const DEFAULT_QUANT_STEP: u32 = 20;

/// Orthonormal DCT-II basis for one block dimension.
struct Dct {
    n: usize,
    /// basis[u*n + k] = c(u) sqrt(2/n) cos(pi (2k+1) u / 2n)
    basis: Vec<f64>
}

impl Dct {
    fn new(n: usize) -> Self {
        let mut basis = Vec::with_capacity(n * n);
        for u in 0..n {
            let scale = match u {
                0 => (1.0 / n as f64).sqrt(),
                _ => (2.0 / n as f64).sqrt()
            };
            for k in 0..n {
                basis.push(scale * (std::f64::consts::PI * (2 * k + 1) as f64 * u as f64 / (2 * n) as f64).cos());
            }
        }
        Self {
            n,
            basis
        }
    }
    /// rows then columns
    fn forward(&self,block: &mut [f64]) {
        let n = self.n;
        let mut tmp = vec![0.0;n * n];
        for y in 0..n {
            for u in 0..n {
                let mut acc = 0.0;
                for x in 0..n {
                    acc += block[y * n + x] * self.basis[u * n + x];
                }
                tmp[y * n + u] = acc;
            }
        }
        for u in 0..n {
            for v in 0..n {
                let mut acc = 0.0;
                for y in 0..n {
                    acc += tmp[y * n + u] * self.basis[v * n + y];
                }
                block[v * n + u] = acc;
            }
        }
    }
    /// transpose of `forward`
    fn inverse(&self,block: &mut [f64]) {
        let n = self.n;
        let mut tmp = vec![0.0;n * n];
        for u in 0..n {
            for y in 0..n {
                let mut acc = 0.0;
                for v in 0..n {
                    acc += block[v * n + u] * self.basis[v * n + y];
                }
                tmp[y * n + u] = acc;
            }
        }
        for y in 0..n {
            for x in 0..n {
                let mut acc = 0.0;
                for u in 0..n {
                    acc += tmp[y * n + u] * self.basis[u * n + x];
                }
                block[y * n + x] = acc;
            }
        }
    }
}

/// DCT + quantize + residual-code, fixed block grid.
pub struct TransformImageCodec {
    width: usize,
    height: usize,
    quant_step: u32,
    block_size: usize,
    residual: ResidualCoder,
    dct: Dct
}

impl TransformImageCodec {
    pub fn new(width: usize,height: usize,quant_step: u32) -> Result<Self,Error> {
        Self::with_residual(width,height,quant_step,DEFAULT_BLOCK_SIZE,ResidualCoder::Rice { r: 3 })
    }
    pub fn with_residual(width: usize,height: usize,quant_step: u32,block_size: usize,residual: ResidualCoder) -> Result<Self,Error> {
        if quant_step == 0 {
            return Err(Error::ConfigError("quantization step must be positive".to_string()));
        }
        if block_size == 0 || width % block_size != 0 || height % block_size != 0 {
            return Err(Error::ConfigError("image dimensions must be block multiples".to_string()));
        }
        Ok(Self {
            width,
            height,
            quant_step,
            block_size,
            residual,
            dct: Dct::new(block_size)
        })
    }
    fn coefficient_alphabet() -> Vec<i32> {
        zigzag_alphabet(-128,127)
    }
    /// quantized coefficients, blocks in raster order, each block row-major
    pub fn quantize(&self,image: &Image) -> Result<Vec<i32>,Error> {
        if image.width != self.width || image.height != self.height {
            return Err(Error::ConfigError("image dimensions do not match the codec".to_string()));
        }
        let n = self.block_size;
        let q = self.quant_step as f64;
        let mut ans = Vec::with_capacity(self.width * self.height);
        let mut block = vec![0.0;n * n];
        for by in (0..self.height).step_by(n) {
            for bx in (0..self.width).step_by(n) {
                for y in 0..n {
                    for x in 0..n {
                        block[y * n + x] = image.get((by + y) as i64,(bx + x) as i64) as f64;
                    }
                }
                self.dct.forward(&mut block);
                for c in &block {
                    ans.push(((c / q).round() as i32).clamp(-128,127));
                }
            }
        }
        Ok(ans)
    }
    /// inverse of `quantize` up to the quantization loss
    pub fn dequantize(&self,coefficients: &[i32]) -> Result<Image,Error> {
        if coefficients.len() != self.width * self.height {
            return Err(Error::CorruptStream);
        }
        let n = self.block_size;
        let q = self.quant_step as f64;
        let mut ans = Image::new(self.width,self.height);
        let mut block = vec![0.0;n * n];
        let mut at = 0;
        for by in (0..self.height).step_by(n) {
            for bx in (0..self.width).step_by(n) {
                for i in 0..n * n {
                    block[i] = coefficients[at + i] as f64 * q;
                }
                at += n * n;
                self.dct.inverse(&mut block);
                for y in 0..n {
                    for x in 0..n {
                        ans.set(by + y,bx + x,block[y * n + x].round() as i32);
                    }
                }
            }
        }
        Ok(ans.clipped())
    }
    pub fn encode(&self,image: &Image) -> Result<Vec<u8>,Error> {
        self.residual.encode(&self.quantize(image)?,Self::coefficient_alphabet())
    }
    pub fn decode(&self,byte_stream: &[u8]) -> Result<Image,Error> {
        let coefficients = self.residual.decode(byte_stream,Self::coefficient_alphabet(),self.width * self.height)?;
        self.dequantize(&coefficients)
    }
    /// package dimensions, quantization step, block size, residual stage
    pub fn serialize(&self,image: &Image) -> Result<Vec<u8>,Error> {
        let mut codec_data = Vec::new();
        codec_data.extend((self.width as u32).to_be_bytes());
        codec_data.extend((self.height as u32).to_be_bytes());
        codec_data.extend(self.quant_step.to_be_bytes());
        codec_data.push(self.block_size as u8);
        match self.residual {
            ResidualCoder::Rice { r } => {
                codec_data.push(0);
                codec_data.push(r as u8);
            },
            ResidualCoder::Arithmetic { u_bits,v_bits } => {
                codec_data.push(1);
                codec_data.push(u_bits as u8);
                codec_data.push(v_bits as u8);
            }
        }
        envelope::wrap(&codec_data,&self.encode(image)?,self.width * self.height)
    }
    pub fn decode_byte_stream(byte_stream: &[u8]) -> Result<Image,Error> {
        let (codec_data,payload,count) = envelope::parse(byte_stream)?;
        if codec_data.len() < 15 {
            return Err(Error::CorruptStream);
        }
        let width = u32::from_be_bytes(codec_data[0..4].try_into().unwrap()) as usize;
        let height = u32::from_be_bytes(codec_data[4..8].try_into().unwrap()) as usize;
        let quant_step = u32::from_be_bytes(codec_data[8..12].try_into().unwrap());
        let block_size = codec_data[12] as usize;
        let residual = match codec_data[13] {
            0 => ResidualCoder::Rice { r: codec_data[14] as usize },
            1 if codec_data.len() >= 16 => ResidualCoder::Arithmetic {
                u_bits: codec_data[14] as usize,
                v_bits: codec_data[15] as usize
            },
            _ => return Err(Error::CorruptStream)
        };
        if count != width * height {
            return Err(Error::CorruptStream);
        }
        let codec = Self::with_residual(width,height,quant_step,block_size,residual)?;
        codec.decode(payload)
    }
}

// *************** TESTS *****************

#[cfg(test)]
fn smooth_image(width: usize,height: usize) -> Image {
    let mut image = Image::new(width,height);
    for y in 0..height {
        for x in 0..width {
            image.set(y,x,((2 * x + 3 * y) as i32).min(255));
        }
    }
    image
}

#[test]
fn constant_image_survives_exactly() {
    let image = Image::from_samples(8,8,vec![100;64]).expect("bad dims");
    let codec = TransformImageCodec::new(8,8,DEFAULT_QUANT_STEP).expect("bad config");
    let packaged = codec.serialize(&image).expect("serialize failed");
    let restored = TransformImageCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,image);
}

#[test]
fn loss_is_bounded_by_the_quantizer() {
    let image = smooth_image(16,16);
    let codec = TransformImageCodec::new(16,16,DEFAULT_QUANT_STEP).expect("bad config");
    let packaged = codec.serialize(&image).expect("serialize failed");
    let restored = TransformImageCodec::decode_byte_stream(&packaged).expect("decode failed");
    let worst = image.samples().iter().zip(restored.samples())
        .map(|(a,b)| (a - b).abs())
        .max()
        .unwrap();
    assert!(worst <= 4 * DEFAULT_QUANT_STEP as i32,"worst error {} too large",worst);
}

#[test]
fn arithmetic_stage_round_trips() {
    let image = smooth_image(8,8);
    let codec = TransformImageCodec::with_residual(
        8,8,DEFAULT_QUANT_STEP,DEFAULT_BLOCK_SIZE,
        ResidualCoder::Arithmetic { u_bits: 16,v_bits: 16 }
    ).expect("bad config");
    let rice = TransformImageCodec::new(8,8,DEFAULT_QUANT_STEP).expect("bad config");
    let via_arith = TransformImageCodec::decode_byte_stream(&codec.serialize(&image).expect("serialize failed"))
        .expect("decode failed");
    let via_rice = TransformImageCodec::decode_byte_stream(&rice.serialize(&image).expect("serialize failed"))
        .expect("decode failed");
    // both stages are lossless over the same quantized coefficients
    assert_eq!(via_arith,via_rice);
}

#[test]
fn partial_blocks_are_rejected() {
    assert!(TransformImageCodec::new(12,8,DEFAULT_QUANT_STEP).is_err());
    assert!(TransformImageCodec::new(8,9,DEFAULT_QUANT_STEP).is_err());
    assert!(TransformImageCodec::new(8,8,0).is_err());
}

#[test]
fn dct_inverts_exactly() {
    let dct = Dct::new(8);
    let mut block: Vec<f64> = (0..64).map(|i| (i * 3 % 256) as f64).collect();
    let original = block.clone();
    dct.forward(&mut block);
    dct.inverse(&mut block);
    for i in 0..64 {
        assert!((block[i] - original[i]).abs() < 1e-9);
    }
}
