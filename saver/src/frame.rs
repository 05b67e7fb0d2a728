use ir_saver_common::message::ImageMessage;

/// Storage type of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDepth {
    U8,
    I8,
    U16,
    I16,
    I32,
    F32,
    F64,
}

impl SampleDepth {
    /// Bytes per sample.
    pub fn size(self) -> usize {
        match self {
            SampleDepth::U8 | SampleDepth::I8 => 1,
            SampleDepth::U16 | SampleDepth::I16 => 2,
            SampleDepth::I32 | SampleDepth::F32 => 4,
            SampleDepth::F64 => 8,
        }
    }
}

/// How the channels of a multi-channel pixel are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Single intensity channel, optionally followed by a second one
    /// (e.g. chroma). Also used for Bayer mosaics and packed YUV.
    Gray,
    Rgb,
    Bgr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelFormat {
    channels: u8,
    depth: SampleDepth,
    order: ChannelOrder,
}

impl PixelFormat {
    const fn new(channels: u8, depth: SampleDepth, order: ChannelOrder) -> Self {
        Self {
            channels,
            depth,
            order,
        }
    }

    /// Resolve an image encoding name, e.g. `mono16`, `bgr8`, `32FC1`.
    fn from_encoding(name: &str) -> Option<Self> {
        use ChannelOrder::*;
        use SampleDepth::*;

        let format = match name {
            "mono8" => Self::new(1, U8, Gray),
            "mono16" => Self::new(1, U16, Gray),
            "rgb8" => Self::new(3, U8, Rgb),
            "bgr8" => Self::new(3, U8, Bgr),
            "rgba8" => Self::new(4, U8, Rgb),
            "bgra8" => Self::new(4, U8, Bgr),
            "rgb16" => Self::new(3, U16, Rgb),
            "bgr16" => Self::new(3, U16, Bgr),
            "rgba16" => Self::new(4, U16, Rgb),
            "bgra16" => Self::new(4, U16, Bgr),
            "yuv422" | "uyvy" | "yuyv" | "yuv422_yuy2" => Self::new(2, U8, Gray),
            _ => {
                if let Some(bits) = name.strip_prefix("bayer_") {
                    return match bits.get(4..) {
                        Some("8") => Some(Self::new(1, U8, Gray)),
                        Some("16") => Some(Self::new(1, U16, Gray)),
                        _ => None,
                    };
                }
                return Self::from_generic(name);
            }
        };
        Some(format)
    }

    /// Generic `<bits><U|S|F>C<n>` encodings. A missing channel count means 1.
    /// Three and four channel variants follow the OpenCV convention of BGR storage.
    fn from_generic(name: &str) -> Option<Self> {
        let (kind, channels) = name.split_once('C')?;
        let depth = match kind {
            "8U" => SampleDepth::U8,
            "8S" => SampleDepth::I8,
            "16U" => SampleDepth::U16,
            "16S" => SampleDepth::I16,
            "32S" => SampleDepth::I32,
            "32F" => SampleDepth::F32,
            "64F" => SampleDepth::F64,
            _ => return None,
        };
        let channels: u8 = if channels.is_empty() {
            1
        } else {
            channels.parse().ok()?
        };
        let order = match channels {
            1 | 2 => ChannelOrder::Gray,
            3 | 4 => ChannelOrder::Bgr,
            _ => return None,
        };
        Some(Self::new(channels, depth, order))
    }
}

/// A decoded pixel buffer.
///
/// `data` holds `height` tightly packed rows of `width * channels` samples,
/// each sample in host byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub depth: SampleDepth,
    pub order: ChannelOrder,
    /// Encoding name of the message this frame was decoded from.
    pub encoding: String,
    pub stamp_ms: i64,
    pub data: Vec<u8>,
}

impl Frame {
    /// Decode a raw image message without any colour-space conversion.
    ///
    /// Row padding is dropped and multi-byte samples are brought into host
    /// byte order; everything else about the sample layout is preserved.
    pub fn decode_passthrough(msg: &ImageMessage) -> Result<Self, DecodeError> {
        let format = PixelFormat::from_encoding(&msg.encoding)
            .ok_or_else(|| DecodeError::UnsupportedEncoding(msg.encoding.clone()))?;

        if msg.width == 0 || msg.height == 0 {
            return Err(DecodeError::Empty {
                width: msg.width,
                height: msg.height,
            });
        }

        let height = msg.height as usize;
        let sample_size = format.depth.size();
        let row_bytes = msg.width as usize * format.channels as usize * sample_size;
        let step = msg.step as usize;
        if step < row_bytes {
            return Err(DecodeError::StepTooSmall { step, row_bytes });
        }

        let expected = step
            .checked_mul(height)
            .ok_or(DecodeError::DataTooShort {
                got: msg.data.len(),
                expected: usize::MAX,
            })?;
        if msg.data.len() < expected {
            return Err(DecodeError::DataTooShort {
                got: msg.data.len(),
                expected,
            });
        }

        let mut data = Vec::with_capacity(row_bytes * height);
        for row in msg.data.chunks(step).take(height) {
            data.extend_from_slice(&row[..row_bytes]);
        }

        if sample_size > 1 && msg.is_bigendian != cfg!(target_endian = "big") {
            for sample in data.chunks_exact_mut(sample_size) {
                sample.reverse();
            }
        }

        Ok(Self {
            width: msg.width,
            height: msg.height,
            channels: format.channels,
            depth: format.depth,
            order: format.order,
            encoding: msg.encoding.clone(),
            stamp_ms: msg.stamp_ms,
            data,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported image encoding {0:?}")]
    UnsupportedEncoding(String),
    #[error("image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("row step {step} is smaller than a packed row of {row_bytes} bytes")]
    StepTooSmall { step: usize, row_bytes: usize },
    #[error("image data too short: got {got} bytes, expected {expected}")]
    DataTooShort { got: usize, expected: usize },
}
