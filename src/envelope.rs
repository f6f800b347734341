//! Length-prefixed container shared by every serialized codec.
//!
//! Layout is `[codec-data length][symbol count][codec data][payload]` where
//! the two leading fields are 15-byte big-endian integers (30 meta bytes in
//! all).  The codec data holds whatever the codec needs to rebuild itself;
//! nothing language-native ever crosses this boundary.

use crate::Error;

const FIELD_BYTES: usize = 15;
pub const META_BYTES: usize = 2 * FIELD_BYTES;

fn write_field(val: u128,out: &mut Vec<u8>) -> Result<(),Error> {
    if val >> (8 * FIELD_BYTES as u32) != 0 {
        return Err(Error::SizeOverflow);
    }
    out.extend(&val.to_be_bytes()[16 - FIELD_BYTES..]);
    Ok(())
}

fn read_field(buf: &[u8]) -> u128 {
    let mut bytes = [0u8;16];
    bytes[16 - FIELD_BYTES..].copy_from_slice(&buf[..FIELD_BYTES]);
    u128::from_be_bytes(bytes)
}

/// frame codec data and payload, recording the message's symbol count
pub fn wrap(codec_data: &[u8],payload: &[u8],symbol_count: usize) -> Result<Vec<u8>,Error> {
    let mut ans = Vec::with_capacity(META_BYTES + codec_data.len() + payload.len());
    write_field(codec_data.len() as u128,&mut ans)?;
    write_field(symbol_count as u128,&mut ans)?;
    ans.extend(codec_data);
    ans.extend(payload);
    Ok(ans)
}

/// split a framed blob into (codec data, payload, symbol count)
pub fn parse(buf: &[u8]) -> Result<(&[u8],&[u8],usize),Error> {
    if buf.len() < META_BYTES {
        return Err(Error::CorruptStream);
    }
    let codec_len = read_field(&buf[..FIELD_BYTES]);
    let count = read_field(&buf[FIELD_BYTES..META_BYTES]);
    let codec_len: usize = codec_len.try_into().map_err(|_| Error::SizeOverflow)?;
    let count: usize = count.try_into().map_err(|_| Error::SizeOverflow)?;
    if codec_len > buf.len() - META_BYTES {
        return Err(Error::CorruptStream);
    }
    Ok((&buf[META_BYTES..META_BYTES + codec_len],&buf[META_BYTES + codec_len..],count))
}

// *************** TESTS *****************

#[test]
fn framing_round_trip() {
    let codec_data = vec![1,2,3];
    let payload = vec![4,5,6,7];
    let blob = wrap(&codec_data,&payload,42).expect("wrap failed");
    assert_eq!(blob.len(),META_BYTES + 7);
    let (cd,pl,count) = parse(&blob).expect("parse failed");
    assert_eq!(cd,&codec_data[..]);
    assert_eq!(pl,&payload[..]);
    assert_eq!(count,42);
}

#[test]
fn truncated_blob_is_corrupt() {
    let blob = wrap(&[1,2,3],&[],0).expect("wrap failed");
    assert!(parse(&blob[..blob.len()-1]).is_err());
    assert!(parse(&blob[..10]).is_err());
}

#[test]
fn fields_are_big_endian() {
    let blob = wrap(&[],&[],258).expect("wrap failed");
    assert_eq!(blob[FIELD_BYTES + 13],1);
    assert_eq!(blob[FIELD_BYTES + 14],2);
}
