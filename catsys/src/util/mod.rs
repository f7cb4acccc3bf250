pub mod image;
pub mod mt;

use std::io::Read;

/// Decompress at most `len` bytes. The output is expected to be exactly
/// `len` bytes long.
pub fn zlib_decompress_exact(buf: &[u8], len: usize) -> anyhow::Result<Vec<u8>> {
    use crate::error::CatError;

    let (ret, err) = zlib_decompress_partial(buf, len)?;
    if let Some(err) = err {
        return Err(CatError::CorruptImage(format!(
            "Zlib stream ended after {} of {} bytes: {}",
            ret.len(),
            len,
            err
        ))
        .into());
    }
    if ret.len() != len {
        return Err(CatError::CorruptImage(format!(
            "Zlib stream decompressed to {} bytes, expected {}",
            ret.len(),
            len
        ))
        .into());
    }
    Ok(ret)
}

/// Decompress at most `len` bytes, keeping whatever was decoded before a
/// stream error.
pub fn zlib_decompress_partial(
    buf: &[u8],
    len: usize,
) -> anyhow::Result<(Vec<u8>, Option<std::io::Error>)> {
    use flate2::read::ZlibDecoder;

    let mut ret = alloc_buffer(len)?;
    let mut decoder = ZlibDecoder::new(buf).take(len as u64);
    match decoder.read_to_end(&mut ret) {
        Ok(_) => Ok((ret, None)),
        Err(err) => Ok((ret, Some(err))),
    }
}

/// Reserve an empty buffer with room for `len` bytes.
pub fn alloc_buffer(len: usize) -> anyhow::Result<Vec<u8>> {
    let mut ret = Vec::new();
    ret.try_reserve_exact(len)
        .map_err(|_| crate::error::CatError::AllocationFailed(len))?;
    Ok(ret)
}

/// Reserve a zero filled buffer of `len` bytes.
pub fn alloc_zeroed(len: usize) -> anyhow::Result<Vec<u8>> {
    let mut ret = alloc_buffer(len)?;
    ret.resize(len, 0);
    Ok(ret)
}

/// Read a NUL terminated Shift-JIS string from a fixed width field.
pub fn decode_sjis(buf: &[u8]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    encoding_rs::SHIFT_JIS.decode(&buf[..end]).0.to_string()
}

/// Encode `s` as Shift-JIS into a zero padded field of `N` bytes.
pub fn encode_sjis<const N: usize>(s: &str) -> anyhow::Result<[u8; N]> {
    let (bytes, _, unmappable) = encoding_rs::SHIFT_JIS.encode(s);
    if unmappable || bytes.len() >= N {
        return Err(crate::error::CatError::Custom(format!(
            "Name can not be stored in {} bytes: {}",
            N, s
        ))
        .into());
    }
    let mut ret = [0; N];
    ret[..bytes.len()].copy_from_slice(&bytes);
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    fn compress(buf: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(buf).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decompress_exact() {
        let data = (0..1000u32).map(|i| (i % 7) as u8).collect::<Vec<_>>();
        let compressed = compress(&data);
        assert_eq!(zlib_decompress_exact(&compressed, 1000).unwrap(), data);
        assert!(zlib_decompress_exact(&compressed, 1001).is_err());
    }

    #[test]
    fn test_decompress_partial_keeps_prefix() {
        let data = vec![0x5A; 4096];
        let compressed = compress(&data);
        let truncated = &compressed[..compressed.len() / 2];
        let (out, err) = zlib_decompress_partial(truncated, 4096).unwrap();
        assert!(err.is_some() || out.len() < 4096);
        assert!(out.iter().all(|b| *b == 0x5A));
    }

    #[test]
    fn test_sjis_field() {
        let field = encode_sjis::<64>("a.txt").unwrap();
        assert_eq!(&field[..6], b"a.txt\0");
        assert_eq!(decode_sjis(&field), "a.txt");
        let field = encode_sjis::<64>("背景.hg3").unwrap();
        assert_eq!(decode_sjis(&field), "背景.hg3");
        assert!(encode_sjis::<4>("long.txt").is_err());
    }
}
