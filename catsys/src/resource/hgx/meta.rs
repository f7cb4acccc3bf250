use super::{HgxImage, HgxOptions};
use serde::{Deserialize, Serialize};

pub const METADATA_VERSION: u32 = 5;

/// Contents of the `<base>+hgx.json` sidecar written next to extracted
/// frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HgxMetadata {
    pub version: u32,
    pub file_name: String,
    #[serde(rename = "type")]
    pub header_type: i32,
    pub expanded: bool,
    pub flipped: bool,
    pub hgx: String,
    pub frames: Vec<FrameMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub id: i32,
    pub width: i32,
    pub height: i32,
    pub total_width: i32,
    pub total_height: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub bit_depth: i32,
    pub transparent: bool,
    pub base_x: i32,
    pub base_y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cptype: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imgmode: Option<i32>,
    pub frame_offset: u64,
    pub attributes: Vec<AttributeMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMetadata {
    pub id: i32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// `#AARRGGBB`
    pub color: String,
}

impl HgxMetadata {
    pub fn new(image: &HgxImage, options: &HgxOptions) -> Self {
        let frames = image
            .frames
            .iter()
            .map(|frame| FrameMetadata {
                id: frame.id,
                width: frame.width,
                height: frame.height,
                total_width: frame.total_width,
                total_height: frame.total_height,
                offset_x: frame.offset_x,
                offset_y: frame.offset_y,
                bit_depth: frame.depth,
                transparent: frame.is_transparent,
                base_x: frame.base_x,
                base_y: frame.base_y,
                cptype: frame.cptype,
                imgmode: frame.imgmode,
                frame_offset: frame.frame_offset,
                attributes: frame
                    .attributes
                    .iter()
                    .map(|(id, ats)| AttributeMetadata {
                        id: *id,
                        x: ats.x,
                        y: ats.y,
                        width: ats.width,
                        height: ats.height,
                        color: format!("#{:08X}", ats.color),
                    })
                    .collect(),
            })
            .collect();
        Self {
            version: METADATA_VERSION,
            file_name: image.file_name.clone(),
            header_type: image.header_type,
            expanded: options.expand,
            flipped: options.flip,
            hgx: image.format.name().to_string(),
            frames,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
