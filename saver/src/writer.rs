use image::{DynamicImage, ImageBuffer, ImageFormat};
use std::path::Path;

use crate::frame::{ChannelOrder, Frame, SampleDepth};

/// Persists a single frame to a file.
///
/// Writers run on the blocking thread pool, never on the async executor.
pub trait ImageWriter: Send + Sync + 'static {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), SaveError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Lossless PNG output through the `image` crate.
///
/// 8- and 16-bit frames with one, three or four channels are supported. BGR
/// frames are reordered so the file holds true colour. Two-channel frames
/// (packed YUV, `8UC2`, `16UC2`) are refused: their second channel is not
/// alpha.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngWriter;

impl ImageWriter for PngWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), SaveError> {
        let image = to_dynamic_image(frame)?;
        image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "png"
    }
}

fn to_dynamic_image(frame: &Frame) -> Result<DynamicImage, SaveError> {
    let (w, h) = (frame.width, frame.height);
    let image = match frame.depth {
        SampleDepth::U8 => {
            let samples = rgb_order(frame, frame.data.clone());
            match frame.channels {
                1 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageLuma8),
                3 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageRgb8),
                4 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageRgba8),
                n => return Err(SaveError::UnsupportedChannels(n)),
            }
        }
        SampleDepth::U16 => {
            let samples: Vec<u16> = frame
                .data
                .chunks_exact(2)
                .map(|b| u16::from_ne_bytes([b[0], b[1]]))
                .collect();
            let samples = rgb_order(frame, samples);
            match frame.channels {
                1 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageLuma16),
                3 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageRgb16),
                4 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageRgba16),
                n => return Err(SaveError::UnsupportedChannels(n)),
            }
        }
        depth => return Err(SaveError::UnsupportedDepth(depth)),
    };
    image.ok_or(SaveError::BufferSize {
        len: frame.data.len(),
        width: w,
        height: h,
    })
}

fn rgb_order<T>(frame: &Frame, mut samples: Vec<T>) -> Vec<T> {
    if frame.order == ChannelOrder::Bgr && frame.channels >= 3 {
        for pixel in samples.chunks_exact_mut(frame.channels as usize) {
            pixel.swap(0, 2);
        }
    }
    samples
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("{0:?} samples cannot be stored as PNG")]
    UnsupportedDepth(SampleDepth),
    #[error("{0} channels cannot be stored as PNG")]
    UnsupportedChannels(u8),
    #[error("frame buffer of {len} bytes does not match {width}x{height}")]
    BufferSize { len: usize, width: u32, height: u32 },
    #[error("failed to encode or write image: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ir_saver_common::message::ImageMessage;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("ir-saver-writer-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn decode(msg: ImageMessage) -> Frame {
        Frame::decode_passthrough(&msg).unwrap()
    }

    #[test]
    fn writes_mono8() {
        let dir = scratch_dir("mono8");
        let path = dir.join("out.png");
        let data: Vec<u8> = (0..64u8).collect();
        let frame = decode(ImageMessage::new(0, 8, 8, "mono8", 8, data.clone()));
        PngWriter.write(&path, &frame).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!(img.color(), image::ColorType::L8);
        assert_eq!(img.into_luma8().into_raw(), data);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn writes_mono16_in_host_order() {
        let dir = scratch_dir("mono16");
        let path = dir.join("out.png");
        let values = [0u16, 1000, 40000, u16::MAX];
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        PngWriter.write(&path, &decode(ImageMessage::new(0, 2, 2, "16UC1", 4, data))).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!(img.color(), image::ColorType::L16);
        assert_eq!(img.into_luma16().into_raw(), values.to_vec());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bgr_is_written_as_rgb() {
        let dir = scratch_dir("bgr8");
        let path = dir.join("out.png");
        let frame = decode(ImageMessage::new(0, 1, 1, "bgr8", 3, vec![255, 0, 10]));
        PngWriter.write(&path, &frame).unwrap();

        let img = image::open(&path).unwrap().into_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [10, 0, 255]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rgb_is_written_unchanged() {
        let dir = scratch_dir("rgb8");
        let path = dir.join("out.png");
        let frame = decode(ImageMessage::new(0, 1, 1, "rgb8", 3, vec![255, 0, 10]));
        PngWriter.write(&path, &frame).unwrap();

        let img = image::open(&path).unwrap().into_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 10]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn float_frames_are_rejected() {
        let dir = scratch_dir("float");
        let path = dir.join("out.png");
        let frame = decode(ImageMessage::new(0, 1, 1, "32FC1", 4, 1.5f32.to_le_bytes().to_vec()));
        let result = PngWriter.write(&path, &frame);
        assert!(matches!(result, Err(SaveError::UnsupportedDepth(SampleDepth::F32))));
        assert!(!path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn two_channel_frames_are_rejected() {
        let dir = scratch_dir("two-channel");
        let path = dir.join("out.png");
        let frames = [
            decode(ImageMessage::new(0, 1, 2, "yuv422", 4, vec![16, 128, 235, 128])),
            decode(ImageMessage::new(0, 1, 1, "8UC2", 2, vec![1, 2])),
            decode(ImageMessage::new(0, 1, 1, "16UC2", 4, vec![0, 1, 0, 2])),
        ];
        for frame in &frames {
            let result = PngWriter.write(&path, frame);
            assert!(
                matches!(result, Err(SaveError::UnsupportedChannels(2))),
                "{}: {result:?}",
                frame.encoding
            );
        }
        assert!(!path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_directory_is_an_image_error() {
        let path = std::env::temp_dir()
            .join(format!("ir-saver-writer-missing-{}", std::process::id()))
            .join("out.png");
        let frame = decode(ImageMessage::new(0, 1, 1, "mono8", 1, vec![0]));
        assert!(matches!(PngWriter.write(&path, &frame), Err(SaveError::Image(_))));
    }
}
