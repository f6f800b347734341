//! Binary PGM (P5) reading and writing, plus the integer sample buffer the
//! image codecs operate on.  Only 8-bit images are handled; anything else
//! is a format mismatch.  This is glue around the core codecs, the parser
//! makes no attempt to be a general NetPBM implementation.

use crate::Error;

/// Row-major integer sample array.  Out-of-range reads return 0, which is
/// also how predictors see not-yet-reconstructed samples.
#[derive(Clone,PartialEq,Debug)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    samples: Vec<i32>
}

impl Image {
    pub fn new(width: usize,height: usize) -> Self {
        Self {
            width,
            height,
            samples: vec![0;width * height]
        }
    }
    pub fn from_samples(width: usize,height: usize,samples: Vec<i32>) -> Result<Self,Error> {
        if samples.len() != width * height {
            return Err(Error::ConfigError("sample count does not match dimensions".to_string()));
        }
        Ok(Self {
            width,
            height,
            samples
        })
    }
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }
    /// signed-index read, 0 outside the image
    pub fn get(&self,y: i64,x: i64) -> i32 {
        if y < 0 || x < 0 || y >= self.height as i64 || x >= self.width as i64 {
            return 0;
        }
        self.samples[y as usize * self.width + x as usize]
    }
    pub fn set(&mut self,y: usize,x: usize,val: i32) {
        self.samples[y * self.width + x] = val;
    }
    /// clip every sample to the 8-bit output range
    pub fn clipped(mut self) -> Self {
        for s in self.samples.iter_mut() {
            *s = (*s).clamp(0,255);
        }
        self
    }
}

/// pull the next whitespace-delimited token, skipping `#` comments
fn next_token<'a>(bytes: &'a [u8],pos: &mut usize) -> Result<&'a [u8],Error> {
    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < bytes.len() && bytes[*pos] == b'#' {
            while *pos < bytes.len() && bytes[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }
    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    if start == *pos {
        return Err(Error::FileFormatMismatch);
    }
    Ok(&bytes[start..*pos])
}

fn parse_number(token: &[u8]) -> Result<usize,Error> {
    std::str::from_utf8(token)
        .map_err(|_| Error::FileFormatMismatch)?
        .parse()
        .map_err(|_| Error::FileFormatMismatch)
}

/// Read a binary PGM image with 8-bit samples.
pub fn read_pgm(bytes: &[u8]) -> Result<Image,Error> {
    let mut pos = 0;
    if next_token(bytes,&mut pos)? != b"P5" {
        return Err(Error::FileFormatMismatch);
    }
    let width = parse_number(next_token(bytes,&mut pos)?)?;
    let height = parse_number(next_token(bytes,&mut pos)?)?;
    let maxval = parse_number(next_token(bytes,&mut pos)?)?;
    if maxval == 0 || maxval > 255 {
        return Err(Error::FileFormatMismatch);
    }
    // exactly one whitespace byte separates the header from the raster
    pos += 1;
    if bytes.len() < pos + width * height {
        return Err(Error::FileFormatMismatch);
    }
    let samples = bytes[pos..pos + width * height].iter().map(|b| *b as i32).collect();
    Image::from_samples(width,height,samples)
}

/// Write a binary PGM image, clipping samples to 8 bits.
pub fn write_pgm(image: &Image) -> Vec<u8> {
    let mut ans = format!("P5\n{} {}\n255\n",image.width,image.height).into_bytes();
    ans.extend(image.samples.iter().map(|s| (*s).clamp(0,255) as u8));
    ans
}

// *************** TESTS *****************

#[test]
fn pgm_round_trip() {
    let mut image = Image::new(4,3);
    for y in 0..3 {
        for x in 0..4 {
            image.set(y,x,(16 * y + x) as i32);
        }
    }
    let bytes = write_pgm(&image);
    let copy = read_pgm(&bytes).expect("parse failed");
    assert_eq!(copy,image);
}

#[test]
fn comments_are_skipped() {
    let bytes = b"P5\n# made by hand\n2 2\n255\n\x01\x02\x03\x04";
    let image = read_pgm(bytes).expect("parse failed");
    assert_eq!(image.samples(),&[1,2,3,4]);
}

#[test]
fn non_pgm_is_rejected() {
    assert!(read_pgm(b"P6\n2 2\n255\n____").is_err());
    assert!(read_pgm(b"P5\n2 2\n65535\n____").is_err());
    assert!(read_pgm(b"P5\n9 9\n255\ntoo short").is_err());
}

#[test]
fn reads_outside_the_image_are_zero() {
    let image = Image::from_samples(2,2,vec![9,9,9,9]).expect("bad dims");
    assert_eq!(image.get(-1,0),0);
    assert_eq!(image.get(0,-1),0);
    assert_eq!(image.get(2,0),0);
    assert_eq!(image.get(1,1),9);
}
