//! Predictive image coding: predict each sample from its already-seen
//! neighborhood, entropy-code the residuals.
//!
//! A predictor only ever reads samples that precede the current index in
//! raster order, with anything outside the filled region reading as 0, so
//! the encoder (looking at the source) and the decoder (looking at the
//! partial reconstruction) always agree.  Predictions are clamped to the
//! 8-bit sample range, which keeps every residual inside the shipped
//! [-255,255] alphabet.

use crate::Error;
use crate::pgm::Image;
use crate::rice::RiceCodec;
use crate::arith::AdaptiveArithmeticCodec;
use crate::envelope;
use crate::tools::linalg;

/// Entropy coder applied to a residual stream.
#[derive(Clone,Copy,PartialEq,Debug)]
pub enum ResidualCoder {
    Rice { r: usize },
    Arithmetic { u_bits: usize, v_bits: usize }
}

impl ResidualCoder {
    pub(crate) fn encode(&self,residuals: &[i32],alphabet: Vec<i32>) -> Result<Vec<u8>,Error> {
        match self {
            ResidualCoder::Rice { r } => RiceCodec::new(*r,alphabet)?.encode(residuals),
            ResidualCoder::Arithmetic { u_bits,v_bits } =>
                AdaptiveArithmeticCodec::new(alphabet,false,*u_bits,*v_bits)?.encode(residuals)
        }
    }
    pub(crate) fn decode(&self,byte_stream: &[u8],alphabet: Vec<i32>,count: usize) -> Result<Vec<i32>,Error> {
        match self {
            ResidualCoder::Rice { r } => RiceCodec::new(*r,alphabet)?.decode(byte_stream,Some(count)),
            ResidualCoder::Arithmetic { u_bits,v_bits } =>
                AdaptiveArithmeticCodec::new(alphabet,false,*u_bits,*v_bits)?.decode(byte_stream,count)
        }
    }
    fn tag_bytes(&self) -> Vec<u8> {
        match self {
            ResidualCoder::Rice { r } => vec![0,*r as u8],
            ResidualCoder::Arithmetic { u_bits,v_bits } => vec![1,*u_bits as u8,*v_bits as u8]
        }
    }
    /// parse the tag, returning the coder and the bytes it consumed
    fn from_tag_bytes(buf: &[u8]) -> Result<(Self,usize),Error> {
        match buf.first().copied() {
            Some(0) if buf.len() >= 2 => Ok((ResidualCoder::Rice { r: buf[1] as usize },2)),
            Some(1) if buf.len() >= 3 => Ok((ResidualCoder::Arithmetic {
                u_bits: buf[1] as usize,
                v_bits: buf[2] as usize
            },3)),
            _ => Err(Error::CorruptStream)
        }
    }
}

/// Sample predictor: a function of the current index and the samples seen
/// so far in raster order.
#[derive(Clone,PartialEq,Debug)]
pub enum Predictor {
    /// floor mean of the left and above neighbors, 0 outside the image
    LeftAboveAverage,
    /// fitted affine combination of raster-previous observations
    Affine {
        a0: f64,
        /// (dy, dx, weight) with the observation at (y+dy, x+dx)
        taps: Vec<(i32,i32,f64)>
    }
}

impl Predictor {
    pub fn predict(&self,y: usize,x: usize,samples: &Image) -> i32 {
        let raw = match self {
            Predictor::LeftAboveAverage => {
                let left = samples.get(y as i64,x as i64 - 1);
                let above = samples.get(y as i64 - 1,x as i64);
                (left + above) / 2
            },
            Predictor::Affine { a0,taps } => {
                let mut acc = *a0;
                for (dy,dx,weight) in taps {
                    acc += weight * samples.get(y as i64 + *dy as i64,x as i64 + *dx as i64) as f64;
                }
                acc.round() as i32
            }
        };
        raw.clamp(0,255)
    }
}

/// True when the observation at (dy,dx) precedes the current sample in
/// raster order.
fn is_causal(dy: i32,dx: i32) -> bool {
    dy < 0 || (dy == 0 && dx < 0)
}

/// Fit the optimal affine predictor to a representative source.
///
/// Observation planes are cyclic shifts of the source; the coefficient
/// vector solves `C_B a = c` with `C_B` the planes' correlation matrix and
/// `c` the source-plane correlation vector, and the constant term is
/// `a0 = mean * (1 - sum a)`.
pub fn fit_affine_predictor(source: &Image,offsets: &[(i32,i32)]) -> Result<Predictor,Error> {
    if offsets.is_empty() {
        return Err(Error::ConfigError("no observation offsets".to_string()));
    }
    for (dy,dx) in offsets {
        if !is_causal(*dy,*dx) {
            return Err(Error::ConfigError(format!("observation ({},{}) does not precede the sample",dy,dx)));
        }
    }
    let h = source.height as i64;
    let w = source.width as i64;
    let src: Vec<f64> = source.samples().iter().map(|s| *s as f64).collect();
    let mut planes = Vec::with_capacity(offsets.len());
    for (dy,dx) in offsets {
        let mut plane = Vec::with_capacity(src.len());
        for y in 0..h {
            for x in 0..w {
                plane.push(source.get((y + *dy as i64).rem_euclid(h),(x + *dx as i64).rem_euclid(w)) as f64);
            }
        }
        planes.push(plane);
    }
    let mut c_b = Vec::with_capacity(offsets.len());
    for i in 0..planes.len() {
        let mut row = Vec::with_capacity(offsets.len());
        for j in 0..planes.len() {
            row.push(linalg::correlation(&planes[i],&planes[j]));
        }
        c_b.push(row);
    }
    let c: Vec<f64> = planes.iter().map(|plane| linalg::correlation(&src,plane)).collect();
    let a = linalg::solve(c_b,c)?;
    let a0 = linalg::mean(&src) * (1.0 - a.iter().sum::<f64>());
    log::debug!("fitted affine predictor a0={} a={:?}",a0,a);
    Ok(Predictor::Affine {
        a0,
        taps: offsets.iter().zip(a).map(|((dy,dx),weight)| (*dy,*dx,weight)).collect()
    })
}

/// Predict, residual-code, reconstruct.
pub struct PredictiveImageCodec {
    predictor: Predictor,
    width: usize,
    height: usize,
    residual: ResidualCoder
}

impl PredictiveImageCodec {
    /// default residual stage: Rice R=4 over [-255,255]
    pub fn new(predictor: Predictor,width: usize,height: usize) -> Self {
        Self::with_residual(predictor,width,height,ResidualCoder::Rice { r: 4 })
    }
    pub fn with_residual(predictor: Predictor,width: usize,height: usize,residual: ResidualCoder) -> Self {
        Self {
            predictor,
            width,
            height,
            residual
        }
    }
    fn residual_alphabet() -> Vec<i32> {
        (-255..=255).collect()
    }
    /// prediction errors in raster order
    pub fn residuals(&self,image: &Image) -> Result<Vec<i32>,Error> {
        if image.width != self.width || image.height != self.height {
            return Err(Error::ConfigError("image dimensions do not match the codec".to_string()));
        }
        let mut ans = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                ans.push(image.get(y as i64,x as i64) - self.predictor.predict(y,x,image));
            }
        }
        Ok(ans)
    }
    pub fn encode(&self,image: &Image) -> Result<Vec<u8>,Error> {
        self.residual.encode(&self.residuals(image)?,Self::residual_alphabet())
    }
    /// rebuild the image by walking raster order over decoded residuals
    pub fn reconstruct(&self,residuals: &[i32]) -> Result<Image,Error> {
        if residuals.len() != self.width * self.height {
            return Err(Error::CorruptStream);
        }
        let mut ans = Image::new(self.width,self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let predicted = self.predictor.predict(y,x,&ans);
                ans.set(y,x,predicted + residuals[y * self.width + x]);
            }
        }
        Ok(ans.clipped())
    }
    pub fn decode(&self,byte_stream: &[u8]) -> Result<Image,Error> {
        let residuals = self.residual.decode(byte_stream,Self::residual_alphabet(),self.width * self.height)?;
        self.reconstruct(&residuals)
    }
    /// package predictor identity, dimensions, and residual stage
    pub fn serialize(&self,image: &Image) -> Result<Vec<u8>,Error> {
        let mut codec_data = Vec::new();
        match &self.predictor {
            Predictor::LeftAboveAverage => codec_data.push(0u8),
            Predictor::Affine { a0,taps } => {
                codec_data.push(1u8);
                codec_data.extend(a0.to_be_bytes());
                codec_data.extend((taps.len() as u16).to_be_bytes());
                for (dy,dx,weight) in taps {
                    codec_data.extend((*dy as i16).to_be_bytes());
                    codec_data.extend((*dx as i16).to_be_bytes());
                    codec_data.extend(weight.to_be_bytes());
                }
            }
        }
        codec_data.extend((self.width as u32).to_be_bytes());
        codec_data.extend((self.height as u32).to_be_bytes());
        codec_data.extend(self.residual.tag_bytes());
        envelope::wrap(&codec_data,&self.encode(image)?,self.width * self.height)
    }
    pub fn decode_byte_stream(byte_stream: &[u8]) -> Result<Image,Error> {
        let (codec_data,payload,count) = envelope::parse(byte_stream)?;
        let mut at = 0;
        let predictor = match codec_data.first().copied() {
            Some(0) => {
                at += 1;
                Predictor::LeftAboveAverage
            },
            Some(1) => {
                if codec_data.len() < 11 {
                    return Err(Error::CorruptStream);
                }
                let a0 = f64::from_be_bytes(codec_data[1..9].try_into().unwrap());
                let n = u16::from_be_bytes([codec_data[9],codec_data[10]]) as usize;
                at = 11;
                if codec_data.len() < at + 12 * n {
                    return Err(Error::CorruptStream);
                }
                let mut taps = Vec::with_capacity(n);
                for _i in 0..n {
                    let dy = i16::from_be_bytes([codec_data[at],codec_data[at+1]]) as i32;
                    let dx = i16::from_be_bytes([codec_data[at+2],codec_data[at+3]]) as i32;
                    let weight = f64::from_be_bytes(codec_data[at+4..at+12].try_into().unwrap());
                    taps.push((dy,dx,weight));
                    at += 12;
                }
                Predictor::Affine { a0,taps }
            },
            _ => return Err(Error::CorruptStream)
        };
        if codec_data.len() < at + 8 {
            return Err(Error::CorruptStream);
        }
        let width = u32::from_be_bytes(codec_data[at..at+4].try_into().unwrap()) as usize;
        let height = u32::from_be_bytes(codec_data[at+4..at+8].try_into().unwrap()) as usize;
        let (residual,_) = ResidualCoder::from_tag_bytes(&codec_data[at+8..])?;
        if count != width * height {
            return Err(Error::CorruptStream);
        }
        let codec = Self::with_residual(predictor,width,height,residual);
        let residuals = residual.decode(payload,Self::residual_alphabet(),count)?;
        codec.reconstruct(&residuals)
    }
}

// *************** TESTS *****************

#[cfg(test)]
fn gradient_image(width: usize,height: usize) -> Image {
    let mut image = Image::new(width,height);
    for y in 0..height {
        for x in 0..width {
            image.set(y,x,((x * 13 + y * 7) % 256) as i32);
        }
    }
    image
}

#[test]
fn left_above_average_values() {
    let image = Image::from_samples(2,2,vec![100,100,100,100]).expect("bad dims");
    let p = Predictor::LeftAboveAverage;
    assert_eq!(p.predict(0,0,&image),0);
    assert_eq!(p.predict(0,1,&image),50);
    assert_eq!(p.predict(1,0,&image),50);
    assert_eq!(p.predict(1,1,&image),100);
}

#[test]
fn residuals_reconstruct_exactly() {
    let image = gradient_image(8,8);
    let codec = PredictiveImageCodec::new(Predictor::LeftAboveAverage,8,8);
    let residuals = codec.residuals(&image).expect("bad dims");
    let copy = codec.reconstruct(&residuals).expect("bad residuals");
    assert_eq!(copy,image);
}

#[test]
fn rice_envelope_round_trip() {
    let image = gradient_image(8,8);
    let codec = PredictiveImageCodec::new(Predictor::LeftAboveAverage,8,8);
    let packaged = codec.serialize(&image).expect("serialize failed");
    let restored = PredictiveImageCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,image);
}

#[test]
fn arithmetic_residuals_round_trip() {
    let image = gradient_image(8,4);
    let codec = PredictiveImageCodec::with_residual(
        Predictor::LeftAboveAverage,8,4,
        ResidualCoder::Arithmetic { u_bits: 24,v_bits: 24 }
    );
    let packaged = codec.serialize(&image).expect("serialize failed");
    let restored = PredictiveImageCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,image);
}

#[test]
fn fitted_predictor_round_trip() {
    let image = gradient_image(8,8);
    let predictor = fit_affine_predictor(&image,&[(0,-1),(-1,0)]).expect("fit failed");
    match &predictor {
        Predictor::Affine { taps,.. } => assert_eq!(taps.len(),2),
        _ => panic!("expected affine predictor")
    }
    let codec = PredictiveImageCodec::new(predictor,8,8);
    let packaged = codec.serialize(&image).expect("serialize failed");
    let restored = PredictiveImageCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,image);
}

#[test]
fn non_causal_observations_are_rejected() {
    let image = gradient_image(4,4);
    assert!(fit_affine_predictor(&image,&[(0,1)]).is_err());
    assert!(fit_affine_predictor(&image,&[(1,0)]).is_err());
    assert!(fit_affine_predictor(&image,&[(0,0)]).is_err());
}
