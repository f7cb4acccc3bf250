pub mod hgx;

use hgx::{HgxFormat, HgxImage, HgxOptions};
use image::RgbaImage;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceMagic {
    Hg2,
    Hg3,
    Unrecognized,
}

impl ResourceMagic {
    pub fn parse_magic(buf: &[u8]) -> Self {
        match HgxFormat::parse_magic(buf) {
            Some(HgxFormat::Hg2) => Self::Hg2,
            Some(HgxFormat::Hg3) => Self::Hg3,
            None => Self::Unrecognized,
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }

    /// Parse `buf` and decode every frame. Frames that fail to decode keep
    /// their error; the rest are returned.
    pub fn parse(
        &self,
        file_name: &str,
        buf: &[u8],
        options: &HgxOptions,
    ) -> anyhow::Result<ResourceType> {
        match self {
            Self::Hg2 | Self::Hg3 => {
                let image = HgxImage::from_bytes(file_name, buf)?;
                let frames = image.decode_frames(buf, options);
                Ok(ResourceType::Hgx { image, frames })
            }
            Self::Unrecognized => Ok(ResourceType::Other),
        }
    }
}

#[derive(Debug)]
pub enum ResourceType {
    Hgx {
        image: HgxImage,
        frames: Vec<anyhow::Result<RgbaImage>>,
    },
    Other,
}

impl ResourceType {
    /// Save the decoded resource into `output_dir`. Returns the written
    /// files, none for resources that are not converted.
    pub fn write(
        self,
        output_dir: &Path,
        options: &HgxOptions,
        write_json: bool,
    ) -> anyhow::Result<Vec<PathBuf>> {
        match self {
            Self::Hgx { image, frames } => {
                image.write_frames(frames, output_dir, options, write_json)
            }
            Self::Other => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::hgx::{test_util::hg3_with_pixels, PixelLayout};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_magic() {
        assert_eq!(ResourceMagic::parse_magic(b"HG-3\x0c\0\0\0"), ResourceMagic::Hg3);
        assert_eq!(ResourceMagic::parse_magic(b"HG-2"), ResourceMagic::Hg2);
        assert_eq!(ResourceMagic::parse_magic(b"HG-"), ResourceMagic::Unrecognized);
        assert_eq!(ResourceMagic::parse_magic(b"KIF\0"), ResourceMagic::Unrecognized);
        assert!(!ResourceMagic::Unrecognized.is_image());
    }

    #[test]
    fn test_parse() {
        let layout = PixelLayout::new(3, 3, 24).unwrap();
        let buf = hg3_with_pixels(3, 3, 24, &vec![0xFF; layout.len()]);
        let magic = ResourceMagic::parse_magic(&buf);
        match magic.parse("bg.hg3", &buf, &HgxOptions::default()).unwrap() {
            ResourceType::Hgx { image, frames } => {
                assert_eq!(image.frames.len(), 1);
                let frame = frames[0].as_ref().unwrap();
                assert_eq!(frame.dimensions(), (3, 3));
                assert!(frame.pixels().all(|p| p.0 == [0xFF; 4]));
            }
            ResourceType::Other => panic!("not recognized"),
        }
        assert!(matches!(
            ResourceMagic::Unrecognized
                .parse("a.txt", b"text", &HgxOptions::default())
                .unwrap(),
            ResourceType::Other
        ));
    }

    #[test]
    fn test_write() {
        let dir = TempDir::new().unwrap();
        let layout = PixelLayout::new(2, 2, 32).unwrap();
        let buf = hg3_with_pixels(2, 2, 32, &vec![0x40; layout.len()]);
        let options = HgxOptions::default();
        let written = ResourceMagic::Hg3
            .parse("ev02.hg3", &buf, &options)
            .unwrap()
            .write(dir.path(), &options, true)
            .unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("ev02.png"), dir.path().join("ev02+hgx.json")]
        );
        let png = image::open(&written[0]).unwrap().to_rgba8();
        assert_eq!(png.dimensions(), (2, 2));

        let written = ResourceType::Other
            .write(dir.path(), &options, true)
            .unwrap();
        assert!(written.is_empty());
    }
}
