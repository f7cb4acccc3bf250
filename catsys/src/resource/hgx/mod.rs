//! HG-2 and HG-3 images.
//!
//! Both formats hold one or more frames. A frame describes where its image
//! sits on a larger canvas and carries one or more payloads: a proprietary
//! compressed bitmap, a JPEG, an alpha mask, or a JPEG plus an alpha mask.
//! Parsing only records where the payloads are; pixels are decoded per
//! frame on request.

mod codec;
mod compose;
mod hg2;
mod hg3;
mod meta;
mod tag;

pub use codec::{
    alpha_to_pixels, decode_alpha, process_image, undelta_filter, unrle, PixelLayout,
    MAX_RGBA_LENGTH,
};
pub use meta::{AttributeMetadata, FrameMetadata, HgxMetadata, METADATA_VERSION};
pub use tag::{AlphaLengths, ImageLengths};

use crate::error::CatError;
use anyhow::Context;
use image::RgbaImage;
use scroll::{Pread, LE};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tag::HgxHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HgxFormat {
    Hg2,
    Hg3,
}

impl HgxFormat {
    pub fn parse_magic(buf: &[u8]) -> Option<Self> {
        match buf {
            // HG-2
            [0x48, 0x47, 0x2D, 0x32, ..] => Some(Self::Hg2),
            // HG-3
            [0x48, 0x47, 0x2D, 0x33, ..] => Some(Self::Hg3),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hg2 => "hg2",
            Self::Hg3 => "hg3",
        }
    }
}

/// How frames are turned into images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HgxOptions {
    /// Draw every frame on a canvas of its total size.
    pub expand: bool,
    /// Flip frames vertically.
    pub flip: bool,
    /// Fail on a damaged alpha stream instead of keeping what decoded.
    pub strict_alpha: bool,
}

/// Location of a payload inside the image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHandle {
    pub offset: u64,
    pub length: u64,
}

impl PayloadHandle {
    pub fn new(offset: usize, length: u64) -> Self {
        Self {
            offset: offset as u64,
            length,
        }
    }

    pub fn fetch<'a>(&self, buf: &'a [u8]) -> anyhow::Result<&'a [u8]> {
        self.offset
            .checked_add(self.length)
            .filter(|end| *end <= buf.len() as u64)
            .map(|end| &buf[self.offset as usize..end as usize])
            .ok_or_else(|| {
                CatError::CorruptImage(format!(
                    "Payload at {:#X}+{:#X} exceeds file size {}",
                    self.offset,
                    self.length,
                    buf.len()
                ))
                .into()
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Image {
        lengths: ImageLengths,
        handle: PayloadHandle,
    },
    Alpha {
        lengths: AlphaLengths,
        handle: PayloadHandle,
    },
    Jpeg {
        handle: PayloadHandle,
    },
}

impl Payload {
    fn bits(&self) -> u8 {
        match self {
            Self::Image { .. } => 1,
            Self::Jpeg { .. } => 2,
            Self::Alpha { .. } => 4,
        }
    }
}

/// Kinds of payload present in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeType {
    None,
    Image,
    Jpeg,
    Alpha,
    JpegAlpha,
    Unsupported(u8),
}

impl CompositeType {
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::None,
            1 => Self::Image,
            2 => Self::Jpeg,
            4 => Self::Alpha,
            6 => Self::JpegAlpha,
            n => Self::Unsupported(n),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Image => 1,
            Self::Jpeg => 2,
            Self::Alpha => 4,
            Self::JpegAlpha => 6,
            Self::Unsupported(n) => *n,
        }
    }
}

/// An `ats####` rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HgxAttribute {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// ARGB
    pub color: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HgxFrame {
    pub id: i32,
    pub width: i32,
    pub height: i32,
    pub total_width: i32,
    pub total_height: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub depth: i32,
    pub is_transparent: bool,
    pub base_x: i32,
    pub base_y: i32,
    /// Position of the frame header in the file.
    pub frame_offset: u64,
    pub cptype: Option<i32>,
    pub imgmode: Option<i32>,
    pub attributes: BTreeMap<i32, HgxAttribute>,
    pub payloads: Vec<Payload>,
}

impl HgxFrame {
    /// Add a payload, replacing an earlier one of the same kind.
    pub fn add_payload(&mut self, payload: Payload) {
        if let Some(old) = self
            .payloads
            .iter_mut()
            .find(|p| p.bits() == payload.bits())
        {
            log::debug!("Frame {} replaces payload {:?}", self.id, old);
            *old = payload;
        } else {
            self.payloads.push(payload);
        }
    }

    pub fn image(&self) -> Option<(&ImageLengths, &PayloadHandle)> {
        self.payloads.iter().find_map(|p| match p {
            Payload::Image { lengths, handle } => Some((lengths, handle)),
            _ => None,
        })
    }

    pub fn alpha(&self) -> Option<(&AlphaLengths, &PayloadHandle)> {
        self.payloads.iter().find_map(|p| match p {
            Payload::Alpha { lengths, handle } => Some((lengths, handle)),
            _ => None,
        })
    }

    pub fn jpeg(&self) -> Option<&PayloadHandle> {
        self.payloads.iter().find_map(|p| match p {
            Payload::Jpeg { handle } => Some(handle),
            _ => None,
        })
    }

    pub fn composite_type(&self) -> CompositeType {
        CompositeType::from_bits(self.payloads.iter().fold(0, |acc, p| acc | p.bits()))
    }

    pub fn needs_expand(&self) -> bool {
        self.width != self.total_width || self.height != self.total_height
    }

    /// Decode the frame's payloads from the file they were parsed from.
    pub fn decode(&self, buf: &[u8], options: &HgxOptions) -> anyhow::Result<RgbaImage> {
        let layout = PixelLayout::new(self.width, self.height, self.depth)?;
        let image = match (self.image(), self.jpeg(), self.alpha()) {
            (Some((lengths, handle)), None, None) => {
                let payload = handle.fetch(buf)?;
                let (data, cmd) = payload.split_at(lengths.data_len as usize);
                let pixels = codec::process_image(data, cmd, lengths, &layout)
                    .with_context(|| format!("Could not decode frame {}", self.id))?;
                // Stored bottom-up.
                compose::from_bgr(&pixels, &layout, !options.flip)?
            }
            (None, Some(jpeg), None) => compose::from_jpeg(jpeg.fetch(buf)?, options.flip)?,
            (None, None, Some((lengths, handle))) => {
                let alpha = codec::decode_alpha(
                    handle.fetch(buf)?,
                    lengths,
                    &layout,
                    !options.strict_alpha,
                )?;
                let pixels = codec::alpha_to_pixels(&alpha, &layout)?;
                compose::from_bgr(&pixels, &layout, options.flip)?
            }
            (None, Some(jpeg), Some((lengths, handle))) => {
                let alpha = codec::decode_alpha(
                    handle.fetch(buf)?,
                    lengths,
                    &layout,
                    !options.strict_alpha,
                )?;
                let mut image = compose::from_jpeg(jpeg.fetch(buf)?, false)?;
                compose::merge_alpha(&mut image, &alpha, &layout)?;
                if options.flip {
                    image = image::imageops::flip_vertical(&image);
                }
                image
            }
            _ => {
                return Err(CatError::MalformedTag(format!(
                    "Frame {} has no decodable image tags ({:?})",
                    self.id,
                    self.composite_type()
                ))
                .into())
            }
        };
        if options.expand && self.needs_expand() {
            return compose::expand(
                &image,
                self.total_width,
                self.total_height,
                self.offset_x,
                self.offset_y,
            );
        }
        Ok(image)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HgxImage {
    pub file_name: String,
    pub format: HgxFormat,
    pub header_type: i32,
    pub frames: Vec<HgxFrame>,
}

impl HgxImage {
    /// Parse the frame structure of an HG-2 or HG-3 file.
    pub fn from_bytes(file_name: &str, buf: &[u8]) -> anyhow::Result<Self> {
        let format = HgxFormat::parse_magic(buf).ok_or_else(|| {
            CatError::UnsupportedFormat(buf.iter().take(4).copied().collect())
        })?;
        let header = buf
            .pread_with::<HgxHeader>(0, LE)
            .context("Truncated image header")?;
        log::debug!("{}: {:?}", file_name, header);

        let frames = match format {
            HgxFormat::Hg2 => hg2::read_frames(buf, header.header_type)?,
            HgxFormat::Hg3 => hg3::read_frames(buf)?,
        };
        log::debug!("{}: {} frames", file_name, frames.len());
        Ok(Self {
            file_name: file_name.to_string(),
            format,
            header_type: header.header_type,
            frames,
        })
    }

    /// Decode every frame. A failing frame does not stop the others.
    pub fn decode_frames(
        &self,
        buf: &[u8],
        options: &HgxOptions,
    ) -> Vec<anyhow::Result<RgbaImage>> {
        self.frames
            .iter()
            .map(|frame| frame.decode(buf, options))
            .collect()
    }

    pub fn base_name(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone())
    }

    /// `<base>.png` for a lone frame, `<base>+<id>.png` otherwise.
    pub fn frame_file_name(&self, index: usize, force_postfix: bool) -> Option<String> {
        let frame = self.frames.get(index)?;
        if self.frames.len() == 1 && !force_postfix {
            Some(format!("{}.png", self.base_name()))
        } else {
            Some(format!("{}+{:04}.png", self.base_name(), frame.id))
        }
    }

    pub fn json_file_name(&self) -> String {
        format!("{}+hgx.json", self.base_name())
    }

    pub fn metadata(&self, options: &HgxOptions) -> HgxMetadata {
        HgxMetadata::new(self, options)
    }

    /// Write every frame as PNG into `output_dir`, plus the JSON sidecar
    /// when `write_json` is set. Returns the written paths; frames that fail
    /// are logged and skipped.
    pub fn extract(
        &self,
        buf: &[u8],
        output_dir: &Path,
        options: &HgxOptions,
        write_json: bool,
    ) -> anyhow::Result<Vec<PathBuf>> {
        self.write_frames(self.decode_frames(buf, options), output_dir, options, write_json)
    }

    /// Write already decoded `frames`, in frame order, the same way as
    /// [`HgxImage::extract`].
    pub fn write_frames(
        &self,
        frames: Vec<anyhow::Result<RgbaImage>>,
        output_dir: &Path,
        options: &HgxOptions,
        write_json: bool,
    ) -> anyhow::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)?;
        let mut written = Vec::new();
        for (index, decoded) in frames.into_iter().enumerate() {
            let name = self
                .frame_file_name(index, false)
                .context("Frame index out of range")?;
            let path = output_dir.join(name);
            match decoded {
                Ok(image) => {
                    image
                        .save_with_format(&path, image::ImageFormat::Png)
                        .with_context(|| format!("Could not write {:?}", path))?;
                    written.push(path);
                }
                Err(err) => log::error!(
                    "{}: frame {}: {:#}",
                    self.file_name,
                    self.frames[index].id,
                    err
                ),
            }
        }
        if write_json {
            let path = output_dir.join(self.json_file_name());
            std::fs::write(&path, self.metadata(options).to_json()?)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Offset of the next chained record, which must lie inside the file.
pub(crate) fn next_offset(start: usize, offset_next: u32, len: usize) -> anyhow::Result<usize> {
    start
        .checked_add(offset_next as usize)
        .filter(|next| *next < len)
        .ok_or_else(|| {
            CatError::CorruptImage(format!(
                "Record at {:#X} points {:#X} bytes past the end of the file",
                start, offset_next
            ))
            .into()
        })
}

#[cfg(test)]
pub(crate) mod test_util {
    //! Builders for synthetic HG-2 and HG-3 files.

    pub(crate) use super::codec::test_util::{compress, encode_image};
    use super::tag::*;
    use scroll::{Pwrite, LE};

    pub(crate) fn tag(name: &str, payload: &[u8], last: bool) -> Vec<u8> {
        let mut signature = [0u8; 8];
        signature[..name.len()].copy_from_slice(name.as_bytes());
        let tag = Hg3Tag {
            signature,
            offset_next: if last {
                0
            } else {
                (HG3_TAG_SIZE + payload.len()) as u32
            },
            length: payload.len() as u32,
        };
        let mut ret = vec![0; HG3_TAG_SIZE];
        ret.pwrite_with(tag, 0, LE).unwrap();
        ret.extend_from_slice(payload);
        ret
    }

    pub(crate) fn stdinfo(width: i32, height: i32, depth: i32) -> Vec<u8> {
        stdinfo_at(width, height, depth, width, height, 0, 0)
    }

    pub(crate) fn stdinfo_at(
        width: i32,
        height: i32,
        depth: i32,
        total_width: i32,
        total_height: i32,
        offset_x: i32,
        offset_y: i32,
    ) -> Vec<u8> {
        let info = Hg3StdInfo {
            width,
            height,
            depth,
            offset_x,
            offset_y,
            total_width,
            total_height,
            is_transparent: 1,
            base_x: 7,
            base_y: 9,
        };
        let mut ret = vec![0; HG3_STDINFO_SIZE];
        ret.pwrite_with(info, 0, LE).unwrap();
        ret
    }

    pub(crate) fn img_payload(encoded: &[u8], lengths: ImageLengths, height: i32) -> Vec<u8> {
        let img = Hg3Img {
            unknown: 0,
            height,
            lengths,
        };
        let mut ret = vec![0; HG3_IMG_SIZE];
        ret.pwrite_with(img, 0, LE).unwrap();
        ret.extend_from_slice(encoded);
        ret
    }

    pub(crate) fn alpha_payload(alpha: &[u8]) -> Vec<u8> {
        let compressed = compress(alpha);
        let lengths = AlphaLengths {
            compressed_len: compressed.len() as u32,
            decompressed_len: alpha.len() as u32,
        };
        let mut ret = vec![0; HG3_IMG_AL_SIZE];
        ret.pwrite_with(lengths, 0, LE).unwrap();
        ret.extend_from_slice(&compressed);
        ret
    }

    pub(crate) fn int_payload(value: i32) -> Vec<u8> {
        value.to_le_bytes().to_vec()
    }

    /// An HG-3 frame holding `tags`, which must start with a stdinfo tag.
    pub(crate) fn frame(id: i32, tags: &[Vec<u8>], last: bool) -> Vec<u8> {
        let body = tags.concat();
        let header = Hg3FrameHeader {
            offset_next: if last {
                0
            } else {
                (HG3_FRAME_HEADER_SIZE + body.len()) as u32
            },
            id,
        };
        let mut ret = vec![0; HG3_FRAME_HEADER_SIZE];
        ret.pwrite_with(header, 0, LE).unwrap();
        ret.extend_from_slice(&body);
        ret
    }

    pub(crate) fn file(signature: &[u8; 4], header_type: i32, frames: &[Vec<u8>]) -> Vec<u8> {
        let header = HgxHeader {
            signature: *signature,
            header_size: HGX_HEADER_SIZE as i32,
            header_type,
        };
        let mut ret = vec![0; HGX_HEADER_SIZE];
        ret.pwrite_with(header, 0, LE).unwrap();
        ret.extend_from_slice(&frames.concat());
        ret
    }

    /// A single frame HG-3 holding one `img0000` bitmap.
    pub(crate) fn hg3_with_pixels(width: i32, height: i32, depth: i32, pixels: &[u8]) -> Vec<u8> {
        let depth_bytes = (depth as usize + 7) / 8;
        let (encoded, lengths) =
            encode_image(pixels, width as usize, height as usize, depth_bytes);
        file(
            b"HG-3",
            0x300,
            &[frame(
                0,
                &[
                    tag("stdinfo", &stdinfo(width, height, depth), false),
                    tag("img0000", &img_payload(&encoded, lengths, height), true),
                ],
                true,
            )],
        )
    }
}
