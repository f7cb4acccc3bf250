use super::{
    next_offset,
    tag::{
        AlphaLengths, Hg3Ats, Hg3FrameHeader, Hg3Img, Hg3StdInfo, Hg3Tag, TagKind,
        HG3_FRAME_HEADER_SIZE, HG3_IMG_AL_SIZE, HG3_IMG_SIZE, HG3_STDINFO_SIZE, HG3_TAG_SIZE,
        HGX_HEADER_SIZE,
    },
    HgxAttribute, HgxFrame, Payload, PayloadHandle,
};
use crate::error::CatError;
use anyhow::Context;
use scroll::{Pread, LE};
use std::collections::BTreeMap;

pub(crate) fn read_frames(buf: &[u8]) -> anyhow::Result<Vec<HgxFrame>> {
    let mut frames = Vec::new();
    let mut frame_start = HGX_HEADER_SIZE;
    loop {
        let header = buf
            .pread_with::<Hg3FrameHeader>(frame_start, LE)
            .with_context(|| format!("Truncated frame header at {:#X}", frame_start))?;
        frames.push(read_frame(buf, frame_start, header.id)?);
        if header.offset_next == 0 {
            break;
        }
        frame_start = next_offset(frame_start, header.offset_next, buf.len())?;
    }
    Ok(frames)
}

fn read_frame(buf: &[u8], frame_start: usize, id: i32) -> anyhow::Result<HgxFrame> {
    let mut tag_start = frame_start + HG3_FRAME_HEADER_SIZE;
    let mut tag = read_tag(buf, tag_start)?;
    if TagKind::parse(&tag.name()) != TagKind::StdInfo {
        return Err(CatError::MalformedTag(format!(
            "Frame {} at {:#X} starts with {:?} instead of stdinfo",
            id,
            frame_start,
            tag.name()
        ))
        .into());
    }
    if (tag.length as usize) < HG3_STDINFO_SIZE {
        return Err(CatError::MalformedTag(format!(
            "stdinfo of frame {} is {} bytes, expected {}",
            id, tag.length, HG3_STDINFO_SIZE
        ))
        .into());
    }
    let info = buf
        .pread_with::<Hg3StdInfo>(tag_start + HG3_TAG_SIZE, LE)
        .with_context(|| format!("Truncated stdinfo of frame {}", id))?;
    log::debug!("Frame {}: {:?}", id, info);

    let mut frame = HgxFrame {
        id,
        width: info.width,
        height: info.height,
        total_width: info.total_width,
        total_height: info.total_height,
        offset_x: info.offset_x,
        offset_y: info.offset_y,
        depth: info.depth,
        is_transparent: info.is_transparent != 0,
        base_x: info.base_x,
        base_y: info.base_y,
        frame_offset: frame_start as u64,
        cptype: None,
        imgmode: None,
        attributes: BTreeMap::new(),
        payloads: Vec::new(),
    };

    while tag.offset_next != 0 {
        tag_start = next_offset(tag_start, tag.offset_next, buf.len())?;
        tag = read_tag(buf, tag_start)?;
        let data = tag_start + HG3_TAG_SIZE;
        let name = tag.name();
        match TagKind::parse(&name) {
            TagKind::Image(number) => {
                let img = buf.pread_with::<Hg3Img>(data, LE)?;
                log::debug!("Frame {} img{:04}: {:?}", id, number, img);
                frame.add_payload(Payload::Image {
                    lengths: img.lengths,
                    handle: PayloadHandle::new(data + HG3_IMG_SIZE, img.lengths.compressed_len()),
                });
            }
            TagKind::Alpha => {
                let lengths = buf.pread_with::<AlphaLengths>(data, LE)?;
                frame.add_payload(Payload::Alpha {
                    lengths,
                    handle: PayloadHandle::new(
                        data + HG3_IMG_AL_SIZE,
                        lengths.compressed_len as u64,
                    ),
                });
            }
            TagKind::Jpeg => frame.add_payload(Payload::Jpeg {
                handle: PayloadHandle::new(data, tag.length as u64),
            }),
            TagKind::Attribute(number) => {
                let ats = buf.pread_with::<Hg3Ats>(data, LE)?;
                frame.attributes.insert(
                    number,
                    HgxAttribute {
                        x: ats.x,
                        y: ats.y,
                        width: ats.width,
                        height: ats.height,
                        color: ats.color,
                    },
                );
            }
            TagKind::CpType => frame.cptype = Some(buf.pread_with::<i32>(data, LE)?),
            TagKind::ImgMode => frame.imgmode = Some(buf.pread_with::<i32>(data, LE)?),
            TagKind::StdInfo | TagKind::Unknown => {
                log::trace!("Frame {}: skipping tag {:?} at {:#X}", id, name, tag_start)
            }
        }
    }
    Ok(frame)
}

fn read_tag(buf: &[u8], offset: usize) -> anyhow::Result<Hg3Tag> {
    buf.pread_with::<Hg3Tag>(offset, LE)
        .with_context(|| format!("Truncated tag at {:#X}", offset))
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;

    #[test]
    fn test_last_duplicate_wins() {
        let ats = |x: i32| {
            [x, 0, 1, 1]
                .iter()
                .flat_map(|v| v.to_le_bytes().to_vec())
                .chain(0xFF00_00FFu32.to_le_bytes().to_vec())
                .collect::<Vec<_>>()
        };
        let buf = file(
            b"HG-3",
            0x300,
            &[frame(
                3,
                &[
                    tag("stdinfo", &stdinfo(2, 2, 32), false),
                    tag("ats0000", &ats(1), false),
                    tag("ats0000", &ats(2), false),
                    tag("img_jpg", b"first", false),
                    tag("img_jpg", b"second!", true),
                ],
                true,
            )],
        );
        let frames = read_frames(&buf).unwrap();
        let frame = &frames[0];
        assert_eq!(frame.attributes.len(), 1);
        assert_eq!(frame.attributes[&0].x, 2);
        assert_eq!(frame.payloads.len(), 1);
        assert_eq!(frame.jpeg().unwrap().fetch(&buf).unwrap(), b"second!");
    }

    #[test]
    fn test_tag_past_end() {
        // The stdinfo tag claims a successor that is not there.
        let buf = file(
            b"HG-3",
            0x300,
            &[frame(0, &[tag("stdinfo", &stdinfo(2, 2, 32), false)], true)],
        );
        let err = read_frames(&buf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatError>(),
            Some(CatError::CorruptImage(_))
        ));
    }

    #[test]
    fn test_short_stdinfo() {
        let info = stdinfo(2, 2, 32);
        let buf = file(
            b"HG-3",
            0x300,
            &[frame(0, &[tag("stdinfo", &info[..HG3_STDINFO_SIZE - 4], true)], true)],
        );
        let err = read_frames(&buf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatError>(),
            Some(CatError::MalformedTag(_))
        ));
    }

    #[test]
    fn test_frame_chain() {
        let frames = (0..3)
            .map(|i| frame(i, &[tag("stdinfo", &stdinfo(1, 1, 24), true)], i == 2))
            .collect::<Vec<_>>();
        let buf = file(b"HG-3", 0x300, &frames);
        let parsed = read_frames(&buf).unwrap();
        assert_eq!(parsed.iter().map(|f| f.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(parsed[1].frame_offset, 12 + 8 + 16 + 40);
        assert!(parsed.iter().all(|f| f.payloads.is_empty()));
    }
}
