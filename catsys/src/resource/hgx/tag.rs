use scroll::{Pread, Pwrite};

pub(crate) const HGX_HEADER_SIZE: usize = 12;
pub(crate) const HG3_FRAME_HEADER_SIZE: usize = 8;
pub(crate) const HG3_TAG_SIZE: usize = 16;
pub(crate) const HG3_STDINFO_SIZE: usize = 40;
pub(crate) const HG3_IMG_SIZE: usize = 24;
pub(crate) const HG3_IMG_AL_SIZE: usize = 8;
pub(crate) const HG2_IMG_SIZE: usize = 68;
pub(crate) const HG2_IMG_BASE_SIZE: usize = 8;

/// HG-2 files with this header type carry a base point after every record.
pub(crate) const HG2_TYPE_WITH_BASE: i32 = 0x25;

#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub(crate) struct HgxHeader {
    pub(crate) signature: [u8; 4],
    pub(crate) header_size: i32,
    pub(crate) header_type: i32,
}

/// Compressed and decompressed lengths of the pixel data and command
/// streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pread, Pwrite)]
pub struct ImageLengths {
    pub data_len: u32,
    pub data_raw_len: u32,
    pub cmd_len: u32,
    pub cmd_raw_len: u32,
}

impl ImageLengths {
    pub fn compressed_len(&self) -> u64 {
        self.data_len as u64 + self.cmd_len as u64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pread, Pwrite)]
pub struct AlphaLengths {
    pub compressed_len: u32,
    pub decompressed_len: u32,
}

#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub(crate) struct Hg3FrameHeader {
    pub(crate) offset_next: u32,
    pub(crate) id: i32,
}

#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub(crate) struct Hg3Tag {
    pub(crate) signature: [u8; 8],
    pub(crate) offset_next: u32,
    pub(crate) length: u32,
}

impl Hg3Tag {
    pub(crate) fn name(&self) -> String {
        let end = self
            .signature
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.signature.len());
        String::from_utf8_lossy(&self.signature[..end]).into_owned()
    }
}

#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub(crate) struct Hg3StdInfo {
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) depth: i32,
    pub(crate) offset_x: i32,
    pub(crate) offset_y: i32,
    pub(crate) total_width: i32,
    pub(crate) total_height: i32,
    pub(crate) is_transparent: i32,
    pub(crate) base_x: i32,
    pub(crate) base_y: i32,
}

#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub(crate) struct Hg3Img {
    pub(crate) unknown: i32,
    pub(crate) height: i32,
    pub(crate) lengths: ImageLengths,
}

#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub(crate) struct Hg3Ats {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) color: u32,
}

#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub(crate) struct Hg2Img {
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) depth: i32,
    pub(crate) unknown1: i32,
    pub(crate) unknown2: i32,
    pub(crate) lengths: ImageLengths,
    pub(crate) extra_length: i32,
    pub(crate) id: i32,
    pub(crate) total_width: i32,
    pub(crate) total_height: i32,
    pub(crate) offset_x: i32,
    pub(crate) offset_y: i32,
    pub(crate) is_transparent: i32,
    pub(crate) offset_next: u32,
}

#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub(crate) struct Hg2ImgBase {
    pub(crate) base_x: i32,
    pub(crate) base_y: i32,
}

/// What an HG-3 tag holds, judged by its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
    StdInfo,
    /// `img####`
    Image(i32),
    /// `img_al`
    Alpha,
    /// `img_jpg`
    Jpeg,
    /// `ats####`
    Attribute(i32),
    CpType,
    ImgMode,
    Unknown,
}

impl TagKind {
    pub(crate) fn parse(name: &str) -> Self {
        if name.starts_with("stdinfo") {
            return Self::StdInfo;
        }
        match name {
            "img_al" => return Self::Alpha,
            "img_jpg" => return Self::Jpeg,
            "cptype" => return Self::CpType,
            "imgmode" => return Self::ImgMode,
            _ => {}
        }
        if let Some(id) = numbered(name, "img") {
            return Self::Image(id);
        }
        if let Some(id) = numbered(name, "ats") {
            return Self::Attribute(id);
        }
        Self::Unknown
    }
}

/// Id of a `<prefix>####` signature with at least four digits.
fn numbered(name: &str, prefix: &str) -> Option<i32> {
    let digits = name.strip_prefix(prefix)?;
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
