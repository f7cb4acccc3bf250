use super::{
    next_offset,
    tag::{
        Hg2Img, Hg2ImgBase, HG2_IMG_BASE_SIZE, HG2_IMG_SIZE, HG2_TYPE_WITH_BASE,
        HGX_HEADER_SIZE,
    },
    HgxFrame, Payload, PayloadHandle,
};
use anyhow::Context;
use scroll::{Pread, LE};
use std::collections::BTreeMap;

/// Records are chained like HG-3 frames and hold a single bitmap each.
pub(crate) fn read_frames(buf: &[u8], header_type: i32) -> anyhow::Result<Vec<HgxFrame>> {
    let mut frames = Vec::new();
    let mut start = HGX_HEADER_SIZE;
    loop {
        let img = buf
            .pread_with::<Hg2Img>(start, LE)
            .with_context(|| format!("Truncated record at {:#X}", start))?;
        log::debug!("Record at {:#X}: {:?}", start, img);
        let mut data = start + HG2_IMG_SIZE;
        let (base_x, base_y) = if header_type == HG2_TYPE_WITH_BASE {
            let base = buf.pread_with::<Hg2ImgBase>(data, LE)?;
            data += HG2_IMG_BASE_SIZE;
            (base.base_x, base.base_y)
        } else {
            (0, 0)
        };

        frames.push(HgxFrame {
            id: img.id,
            width: img.width,
            height: img.height,
            total_width: img.total_width,
            total_height: img.total_height,
            offset_x: img.offset_x,
            offset_y: img.offset_y,
            depth: img.depth,
            is_transparent: img.is_transparent != 0,
            base_x,
            base_y,
            frame_offset: start as u64,
            cptype: None,
            imgmode: None,
            attributes: BTreeMap::new(),
            payloads: vec![Payload::Image {
                lengths: img.lengths,
                handle: PayloadHandle::new(data, img.lengths.compressed_len()),
            }],
        });

        if img.offset_next == 0 {
            break;
        }
        start = next_offset(start, img.offset_next, buf.len())?;
    }
    Ok(frames)
}
