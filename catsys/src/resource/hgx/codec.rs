//! Pixel data of `img####` tags and HG-2 records.
//!
//! A frame is stored as two zlib streams. The command stream is a bit
//! string of Elias gamma coded run lengths telling which runs of the
//! output are copied from the data stream and which are zero. The result
//! is a byte-planar, zig-zag coded delta image that `undelta_filter`
//! turns back into bottom-up BGR(A) rows.

use super::tag::{AlphaLengths, ImageLengths};
use crate::{error::CatError, util};
use once_cell::sync::Lazy;

/// Largest pixel buffer a frame may decode to.
pub const MAX_RGBA_LENGTH: u64 = 16384 * 16384 * 4;

/// Validated geometry of a frame's pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub width: usize,
    pub height: usize,
    pub depth_bytes: usize,
    /// Row length in bytes, padded to a multiple of four.
    pub stride: usize,
}

impl PixelLayout {
    /// Check depth and dimensions before anything is allocated for them.
    pub fn new(width: i32, height: i32, depth: i32) -> anyhow::Result<Self> {
        if depth != 24 && depth != 32 {
            return Err(CatError::UnsupportedDepth(depth).into());
        }
        if width <= 0 || height <= 0 {
            return Err(CatError::InvalidDimensions(width, height).into());
        }
        let depth_bytes = (depth as usize + 7) / 8;
        let stride = util::image::stride(width as usize, depth_bytes);
        let len = stride as u64 * height as u64;
        if len > MAX_RGBA_LENGTH {
            return Err(CatError::DimensionsTooLarge(width, height, len).into());
        }
        Ok(Self {
            width: width as usize,
            height: height as usize,
            depth_bytes,
            stride,
        })
    }

    pub fn len(&self) -> usize {
        self.stride * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn padding(&self) -> usize {
        self.stride - self.width * self.depth_bytes
    }
}

/// Decompress both streams of an image payload and rebuild its pixels.
/// The result is `layout.len()` bytes of bottom-up BGR(A) rows.
pub fn process_image(
    data: &[u8],
    cmd: &[u8],
    lengths: &ImageLengths,
    layout: &PixelLayout,
) -> anyhow::Result<Vec<u8>> {
    for (name, len) in [("data", lengths.data_raw_len), ("cmd", lengths.cmd_raw_len)] {
        if len as u64 > MAX_RGBA_LENGTH {
            return Err(CatError::CorruptImage(format!(
                "Decompressed {} length {} is too large",
                name, len
            ))
            .into());
        }
    }
    let data = util::zlib_decompress_exact(data, lengths.data_raw_len as usize)?;
    let cmd = util::zlib_decompress_exact(cmd, lengths.cmd_raw_len as usize)?;
    let rle = unrle_limited(&data, &cmd, layout.len())?;
    if rle.len() != layout.len() {
        return Err(CatError::CorruptImage(format!(
            "Run length output is {} bytes, expected {}",
            rle.len(),
            layout.len()
        ))
        .into());
    }
    undelta_filter(&rle, layout.width, layout.height, layout.depth_bytes)
}

struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
    bit: u32,
}

impl<'a> BitReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, bit: 0 }
    }

    /// Bits are taken least significant first.
    fn read_bit(&mut self) -> anyhow::Result<bool> {
        let byte = *self.buf.get(self.pos).ok_or_else(|| {
            CatError::CorruptImage(String::from("Command stream ran out of bits"))
        })?;
        let bit = (byte >> self.bit) & 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.pos += 1;
        }
        Ok(bit == 1)
    }

    fn read_gamma(&mut self) -> anyhow::Result<u32> {
        let mut digits = 0;
        while !self.read_bit()? {
            digits += 1;
            if digits >= 32 {
                return Err(CatError::CorruptImage(String::from(
                    "Run length does not fit in 32 bits",
                ))
                .into());
            }
        }
        let mut value = 1u32 << digits;
        while digits > 0 {
            digits -= 1;
            if self.read_bit()? {
                value |= 1 << digits;
            }
        }
        Ok(value)
    }
}

/// Expand the zero runs of `data` as directed by the `cmd` bit stream.
pub fn unrle(data: &[u8], cmd: &[u8]) -> anyhow::Result<Vec<u8>> {
    unrle_limited(data, cmd, MAX_RGBA_LENGTH as usize)
}

fn unrle_limited(data: &[u8], cmd: &[u8], limit: usize) -> anyhow::Result<Vec<u8>> {
    let mut bits = BitReader::new(cmd);
    let mut copy = bits.read_bit()?;
    let out_len = bits.read_gamma()? as usize;
    if out_len > limit {
        return Err(CatError::CorruptImage(format!(
            "Run length output of {} bytes exceeds {}",
            out_len, limit
        ))
        .into());
    }

    let mut ret = util::alloc_buffer(out_len)?;
    let mut data_pos = 0;
    while ret.len() < out_len {
        let n = bits.read_gamma()? as usize;
        if n > out_len - ret.len() {
            return Err(CatError::CorruptImage(format!(
                "Run of {} bytes overshoots output at {} of {}",
                n,
                ret.len(),
                out_len
            ))
            .into());
        }
        if copy {
            let run = data.get(data_pos..data_pos + n).ok_or_else(|| {
                CatError::CorruptImage(format!(
                    "Data stream ran out at {} reading {} bytes",
                    data_pos, n
                ))
            })?;
            ret.extend_from_slice(run);
            data_pos += n;
        } else {
            ret.resize(ret.len() + n, 0);
        }
        copy = !copy;
    }
    Ok(ret)
}

/// Spreads the bit pairs of a byte over the four bytes of a word, one
/// table per section.
static DELTA_TABLES: Lazy<[[u32; 256]; 4]> = Lazy::new(|| {
    let mut tables = [[0; 256]; 4];
    for i in 0..256u32 {
        let mut val = i & 0xC0;
        val <<= 6;
        val |= i & 0x30;
        val <<= 6;
        val |= i & 0x0C;
        val <<= 6;
        val |= i & 0x03;

        tables[0][i as usize] = val << 6;
        tables[1][i as usize] = val << 4;
        tables[2][i as usize] = val << 2;
        tables[3][i as usize] = val;
    }
    tables
});

fn unpack_zigzag(c: u8) -> u8 {
    if c & 1 != 0 {
        (c >> 1) ^ 0xFF
    } else {
        c >> 1
    }
}

/// Undo the byte plane interleave, zig-zag coding and prediction of an
/// unrle'd buffer of `stride * height` bytes.
pub fn undelta_filter(
    buf: &[u8],
    width: usize,
    height: usize,
    depth_bytes: usize,
) -> anyhow::Result<Vec<u8>> {
    let stride = util::image::stride(width, depth_bytes);
    if buf.len() != stride * height {
        return Err(CatError::CorruptImage(format!(
            "Delta buffer is {} bytes, expected {}",
            buf.len(),
            stride * height
        ))
        .into());
    }

    let tables = &*DELTA_TABLES;
    let section = buf.len() / 4;
    let (sect1, rest) = buf.split_at(section);
    let (sect2, rest) = rest.split_at(section);
    let (sect3, sect4) = rest.split_at(section);

    let mut ret = util::alloc_buffer(buf.len())?;
    for i in 0..section {
        let val = tables[0][sect1[i] as usize]
            | tables[1][sect2[i] as usize]
            | tables[2][sect3[i] as usize]
            | tables[3][sect4[i] as usize];
        ret.extend(val.to_le_bytes().iter().map(|c| unpack_zigzag(*c)));
    }

    // Left neighbour on the first row, upper neighbour on every other.
    for x in depth_bytes..stride {
        ret[x] = ret[x].wrapping_add(ret[x - depth_bytes]);
    }
    for y in 1..height {
        let (prev, line) = ret[(y - 1) * stride..(y + 1) * stride].split_at_mut(stride);
        for (cur, up) in line.iter_mut().zip(prev.iter()) {
            *cur = cur.wrapping_add(*up);
        }
    }
    Ok(ret)
}

/// Decompress an `img_al` stream into one byte per pixel.
///
/// With `tolerate_damage` a stream that ends early or fails part way keeps
/// what was decoded and the rest is left transparent.
pub fn decode_alpha(
    buf: &[u8],
    lengths: &AlphaLengths,
    layout: &PixelLayout,
    tolerate_damage: bool,
) -> anyhow::Result<Vec<u8>> {
    let pixels = layout.width * layout.height;
    let len = lengths.decompressed_len as usize;
    if len > pixels.max(1) * 4 {
        return Err(CatError::CorruptImage(format!(
            "Alpha length {} is too large for {}x{}",
            len, layout.width, layout.height
        ))
        .into());
    }
    let (mut alpha, err) = util::zlib_decompress_partial(buf, len)?;
    if alpha.len() < pixels || err.is_some() {
        if !tolerate_damage {
            return Err(CatError::CorruptImage(format!(
                "Alpha stream decoded {} of {} bytes{}",
                alpha.len(),
                pixels,
                err.map(|e| format!(": {}", e)).unwrap_or_default()
            ))
            .into());
        }
        log::warn!(
            "Damaged alpha stream, decoded {} of {} bytes{}",
            alpha.len(),
            pixels,
            err.map(|e| format!(": {}", e)).unwrap_or_default()
        );
    }
    alpha.resize(pixels.max(alpha.len()), 0);
    Ok(alpha)
}

/// Turn a stand-alone alpha mask into a grey BGR(A) buffer laid out like an
/// image payload.
pub fn alpha_to_pixels(alpha: &[u8], layout: &PixelLayout) -> anyhow::Result<Vec<u8>> {
    let mut ret = util::alloc_zeroed(layout.len())?;
    let rows = ret
        .chunks_exact_mut(layout.stride)
        .zip(alpha.chunks_exact(layout.width));
    for (line, src) in rows {
        for (pixel, a) in line.chunks_exact_mut(layout.depth_bytes).zip(src) {
            let value = 0xFF - *a;
            pixel[..3].copy_from_slice(&[value; 3]);
            if layout.depth_bytes == 4 {
                pixel[3] = 0xFF;
            }
        }
    }
    Ok(ret)
}

#[cfg(test)]
pub(crate) mod test_util {
    //! Encoders producing what the engine's tools write.

    use super::*;

    #[derive(Default)]
    struct BitWriter {
        buf: Vec<u8>,
        bit: u32,
    }

    impl BitWriter {
        fn write_bit(&mut self, bit: bool) {
            if self.bit == 0 {
                self.buf.push(0);
            }
            if bit {
                *self.buf.last_mut().unwrap() |= 1 << self.bit;
            }
            self.bit = (self.bit + 1) % 8;
        }

        fn write_gamma(&mut self, value: u32) {
            assert!(value > 0);
            let digits = 31 - value.leading_zeros();
            for _ in 0..digits {
                self.write_bit(false);
            }
            self.write_bit(true);
            for digit in (0..digits).rev() {
                self.write_bit(value & (1 << digit) != 0);
            }
        }
    }

    /// Split `buf` into the data and cmd streams of `unrle`.
    pub(crate) fn rle(buf: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut runs = Vec::new();
        let mut copy = buf.first().map_or(false, |b| *b != 0);
        let mut start = 0;
        for (i, b) in buf.iter().enumerate() {
            if (*b != 0) != copy {
                runs.push(i - start);
                start = i;
                copy = !copy;
            }
        }
        runs.push(buf.len() - start);

        let mut cmd = BitWriter::default();
        cmd.write_bit(buf.first().map_or(false, |b| *b != 0));
        cmd.write_gamma(buf.len() as u32);
        if !buf.is_empty() {
            for run in runs {
                cmd.write_gamma(run as u32);
            }
        }
        let data = buf.iter().copied().filter(|b| *b != 0).collect();
        (data, cmd.buf)
    }

    fn pack_zigzag(d: u8) -> u8 {
        if d & 0x80 != 0 {
            ((d ^ 0xFF) << 1) | 1
        } else {
            d << 1
        }
    }

    /// Inverse of `undelta_filter`.
    pub(crate) fn delta_filter(
        pixels: &[u8],
        width: usize,
        height: usize,
        depth_bytes: usize,
    ) -> Vec<u8> {
        let stride = util::image::stride(width, depth_bytes);
        assert_eq!(pixels.len(), stride * height);
        let mut deltas = pixels.to_vec();
        for y in (1..height).rev() {
            for x in 0..stride {
                deltas[y * stride + x] =
                    pixels[y * stride + x].wrapping_sub(pixels[(y - 1) * stride + x]);
            }
        }
        for x in (depth_bytes..stride).rev() {
            deltas[x] = pixels[x].wrapping_sub(pixels[x - depth_bytes]);
        }

        let section = deltas.len() / 4;
        let mut ret = vec![0; deltas.len()];
        for (i, word) in deltas.chunks_exact(4).enumerate() {
            let mut val = 0u32;
            for (n, d) in word.iter().enumerate() {
                val |= (pack_zigzag(*d) as u32) << (8 * n);
            }
            // The top bit pair of every byte lands in the first section.
            for s in 0..4 {
                let shift = 6 - 2 * s as u32;
                let mut b = 0u8;
                for n in 0..4 {
                    let pair = ((val >> (8 * n + shift)) & 3) as u8;
                    b |= pair << (2 * n);
                }
                ret[s * section + i] = b;
            }
        }
        ret
    }

    pub(crate) fn compress(buf: &[u8]) -> Vec<u8> {
        use flate2::{write::ZlibEncoder, Compression};
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(buf).unwrap();
        encoder.finish().unwrap()
    }

    /// Payload bytes and lengths of an `img####` tag holding `pixels`.
    pub(crate) fn encode_image(
        pixels: &[u8],
        width: usize,
        height: usize,
        depth_bytes: usize,
    ) -> (Vec<u8>, ImageLengths) {
        let (data, cmd) = rle(&delta_filter(pixels, width, height, depth_bytes));
        let data_z = compress(&data);
        let cmd_z = compress(&cmd);
        let lengths = ImageLengths {
            data_len: data_z.len() as u32,
            data_raw_len: data.len() as u32,
            cmd_len: cmd_z.len() as u32,
            cmd_raw_len: cmd.len() as u32,
        };
        ([data_z, cmd_z].concat(), lengths)
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    fn corrupt(err: anyhow::Error) -> bool {
        matches!(err.downcast_ref::<CatError>(), Some(CatError::CorruptImage(_)))
    }

    #[test]
    fn test_layout_validation() {
        let layout = PixelLayout::new(64, 64, 32).unwrap();
        assert_eq!(layout.stride, 256);
        assert_eq!(layout.len(), 256 * 64);
        let layout = PixelLayout::new(5, 2, 24).unwrap();
        assert_eq!((layout.stride, layout.padding()), (16, 1));

        let err = PixelLayout::new(64, 64, 16).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatError>(),
            Some(CatError::UnsupportedDepth(16))
        ));
        let err = PixelLayout::new(0, 10, 32).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatError>(),
            Some(CatError::InvalidDimensions(0, 10))
        ));
        let err = PixelLayout::new(16385, 16384, 32).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatError>(),
            Some(CatError::DimensionsTooLarge(16385, 16384, _))
        ));
        // Depth is judged before the dimensions.
        let err = PixelLayout::new(-1, -1, 8).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatError>(),
            Some(CatError::UnsupportedDepth(8))
        ));
    }

    #[test]
    fn test_gamma_bits() {
        // copy=1, N=5 (00101), one run of 5 (00101), least significant bit first.
        let cmd = [0b0010_1001, 0b0000_0101];
        let out = unrle(b"abcde", &cmd).unwrap();
        assert_eq!(out, b"abcde");
    }

    #[test]
    fn test_unrle_matches_encoder() {
        let mut input = vec![0u8; 300];
        input[1] = 7;
        input[2] = 9;
        for b in input[100..180].iter_mut() {
            *b = 0x42;
        }
        input[299] = 1;
        let (data, cmd) = rle(&input);
        let out = unrle(&data, &cmd).unwrap();
        assert_eq!(out.len(), input.len());
        assert_eq!(out, input);

        let all_zero = vec![0u8; 77];
        let (data, cmd) = rle(&all_zero);
        assert!(data.is_empty());
        assert_eq!(unrle(&data, &cmd).unwrap(), all_zero);
    }

    #[test]
    fn test_unrle_errors() {
        let input = [1u8, 2, 3, 0, 0, 4];
        let (data, cmd) = rle(&input);
        assert!(corrupt(unrle(&data[..2], &cmd).unwrap_err()));
        assert!(corrupt(unrle(&data, &cmd[..1]).unwrap_err()));
        assert!(corrupt(unrle(&data, &[]).unwrap_err()));

        // N=2 then a copy run of 3.
        let cmd = [0b0110_0101, 0b0000_0000];
        assert!(corrupt(unrle(b"xyz", &cmd).unwrap_err()));
    }

    #[test]
    fn test_undelta_inverts_delta() {
        for &(width, height, depth_bytes) in &[(1, 1, 1), (4, 4, 3), (37, 19, 4)] {
            let stride = util::image::stride(width, depth_bytes);
            let pixels = (0..stride * height)
                .map(|i| (i * 31 + i / 7) as u8)
                .collect::<Vec<_>>();
            let deltas = delta_filter(&pixels, width, height, depth_bytes);
            let out = undelta_filter(&deltas, width, height, depth_bytes).unwrap();
            assert_eq!(out, pixels, "{}x{}x{}", width, height, depth_bytes);
        }
    }

    #[test]
    fn test_undelta_length_check() {
        assert!(corrupt(undelta_filter(&[0; 12], 2, 2, 3).unwrap_err()));
    }

    #[test]
    fn test_process_image() {
        let layout = PixelLayout::new(5, 3, 24).unwrap();
        let pixels = (0..layout.len()).map(|i| (i % 5) as u8 * 40).collect::<Vec<_>>();
        let (payload, lengths) = encode_image(&pixels, 5, 3, 3);
        let (data, cmd) = payload.split_at(lengths.data_len as usize);
        assert_eq!(process_image(data, cmd, &lengths, &layout).unwrap(), pixels);

        let other = PixelLayout::new(5, 4, 24).unwrap();
        assert!(corrupt(process_image(data, cmd, &lengths, &other).unwrap_err()));
    }

    #[test]
    fn test_alpha_to_pixels() {
        let layout = PixelLayout::new(2, 2, 32).unwrap();
        let pixels = alpha_to_pixels(&[0, 255, 16, 128], &layout).unwrap();
        assert_eq!(
            pixels,
            vec![255, 255, 255, 255, 0, 0, 0, 255, 239, 239, 239, 255, 127, 127, 127, 255]
        );

        let layout = PixelLayout::new(1, 2, 24).unwrap();
        let pixels = alpha_to_pixels(&[1, 2], &layout).unwrap();
        assert_eq!(pixels, vec![254, 254, 254, 0, 253, 253, 253, 0]);
    }

    #[test]
    fn test_damaged_alpha() {
        let layout = PixelLayout::new(8, 8, 32).unwrap();
        let alpha = vec![0x33; 64];
        let compressed = compress(&alpha);
        let lengths = AlphaLengths {
            compressed_len: compressed.len() as u32,
            decompressed_len: 64,
        };
        assert_eq!(decode_alpha(&compressed, &lengths, &layout, false).unwrap(), alpha);

        let truncated = &compressed[..4];
        let out = decode_alpha(truncated, &lengths, &layout, true).unwrap();
        assert_eq!(out.len(), 64);
        assert!(out.iter().all(|a| *a == 0x33 || *a == 0));
        assert!(corrupt(decode_alpha(truncated, &lengths, &layout, false).unwrap_err()));
    }
}
