//! 8-bit grayscale rasters and their PNG form.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("PNG encoding error: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("PNG decoding error: {0}")]
    Decode(#[from] png::DecodingError),
    #[error("Pixel buffer holds {actual} bytes, {width}x{height} needs {expected}")]
    Dimensions { width: u32, height: u32, expected: usize, actual: usize },
    #[error("Unsupported PNG layout: {color:?} at {depth:?}")]
    UnsupportedLayout { color: png::ColorType, depth: png::BitDepth },
}

/// Row-major, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    pub width:  u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(RasterError::Dimensions { width, height, expected, actual: pixels.len() });
        }
        Ok(Self { width, height, pixels })
    }

    /// Build an image from low-bit-depth samples by multiplying each by
    /// `scale`.  Products saturate at 255.
    pub fn from_samples(width: u32, height: u32, samples: &[u8], scale: u8) -> Result<Self, RasterError> {
        let pixels = samples.iter().map(|&s| s.saturating_mul(scale)).collect();
        Self::new(width, height, pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RasterError> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&self.pixels)?;
            writer.finish()?;
        }
        Ok(out)
    }

    /// Decode an 8-bit grayscale PNG, as produced by [`GrayImage::encode_png`].
    pub fn decode_png(bytes: &[u8]) -> Result<Self, RasterError> {
        let decoder    = png::Decoder::new(bytes);
        let mut reader = decoder.read_info()?;
        let mut buf    = vec![0u8; reader.output_buffer_size()];
        let info       = reader.next_frame(&mut buf)?;
        if info.color_type != png::ColorType::Grayscale || info.bit_depth != png::BitDepth::Eight {
            return Err(RasterError::UnsupportedLayout { color: info.color_type, depth: info.bit_depth });
        }
        buf.truncate(info.buffer_size());
        Self::new(info.width, info.height, buf)
    }
}
