//! Decoded images and the decode primitive that produces them.

use std::fmt;

use ahash::HashMap;

use crate::{GpuTexture, TextureHandle};

/// Memory layout of a decoded bitmap. Each depth has its own cache partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitDepth {
    /// One palette index per pixel.
    Eight,
    /// RGBA, four bytes per pixel.
    ThirtyTwo,
}

impl BitDepth {
    pub const ALL: [BitDepth; 2] = [BitDepth::Eight, BitDepth::ThirtyTwo];

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::ThirtyTwo => 4,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            BitDepth::Eight => 0,
            BitDepth::ThirtyTwo => 1,
        }
    }
}

/// Conversion requested by the caller. It, not the file's native depth,
/// decides which partition a bitmap lands in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorConversion {
    /// Map every pixel onto the bound palette.
    #[default]
    Palette,
    /// Expand to 32-bit RGBA and upload a texture.
    EightToThirtyTwo,
}

impl ColorConversion {
    pub fn bit_depth(self) -> BitDepth {
        match self {
            ColorConversion::Palette => BitDepth::Eight,
            ColorConversion::EightToThirtyTwo => BitDepth::ThirtyTwo,
        }
    }
}

/// The 256-color palette 8-bit decodes are mapped onto. Index 0 is the
/// transparent mask color.
#[derive(Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [[u8; 3]; 256],
}

impl Default for Palette {
    fn default() -> Self {
        Self::grayscale()
    }
}

impl fmt::Debug for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Palette({:?}..)", &self.colors[..4])
    }
}

impl Palette {
    pub fn grayscale() -> Self {
        let mut colors = [[0u8; 3]; 256];
        for (i, c) in colors.iter_mut().enumerate() {
            *c = [i as u8; 3];
        }
        Palette { colors }
    }

    /// Builds a palette from up to 256 colors; missing entries are black.
    pub fn from_colors(colors: &[[u8; 3]]) -> Self {
        let mut palette = [[0u8; 3]; 256];
        for (dst, src) in palette.iter_mut().zip(colors) {
            *dst = *src;
        }
        Palette { colors: palette }
    }

    /// Closest opaque entry (1..=255) by squared RGB distance.
    pub fn nearest_index(&self, rgb: [u8; 3]) -> u8 {
        let distance = |c: &[u8; 3]| -> u32 {
            c.iter()
                .zip(rgb)
                .map(|(&a, b)| (a as i32 - b as i32).pow(2) as u32)
                .sum()
        };
        self.colors
            .iter()
            .enumerate()
            .skip(1)
            .min_by_key(|(_, c)| distance(c))
            .map_or(1, |(i, _)| i as u8)
    }

    fn quantize(&self, rgba: &image::RgbaImage) -> Vec<u8> {
        let mut memo: HashMap<[u8; 3], u8> = HashMap::default();
        rgba.pixels()
            .map(|p| {
                if p[3] == 0 {
                    return 0;
                }
                let rgb = [p[0], p[1], p[2]];
                *memo.entry(rgb).or_insert_with(|| self.nearest_index(rgb))
            })
            .collect()
    }
}

/// A decoded image owned by the content cache, plus its texture binding for
/// 32-bit bitmaps. Pixels and texture are released together.
pub struct Bitmap {
    width: u32,
    height: u32,
    depth: BitDepth,
    pixels: Vec<u8>,
    texture: Option<GpuTexture>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, depth: BitDepth, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * depth.bytes_per_pixel()
        );
        Bitmap {
            width,
            height,
            depth,
            pixels,
            texture: None,
        }
    }

    pub(crate) fn bind_texture(&mut self, texture: GpuTexture) {
        self.texture = Some(texture);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture.as_ref().map(GpuTexture::handle)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .field("texture", &self.texture)
            .finish()
    }
}

/// Turns encoded image bytes into a [`Bitmap`] of the requested depth.
pub trait ImageDecoder: Send + Sync {
    fn decode(
        &self,
        bytes: &[u8],
        conversion: ColorConversion,
        palette: &Palette,
    ) -> Result<Bitmap, image::ImageError>;
}

/// Decodes anything the `image` crate understands (PNG and BMP for content).
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardImageDecoder;

impl ImageDecoder for StandardImageDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        conversion: ColorConversion,
        palette: &Palette,
    ) -> Result<Bitmap, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        let depth = conversion.bit_depth();
        let pixels = match depth {
            BitDepth::Eight => palette.quantize(&rgba),
            BitDepth::ThirtyTwo => rgba.into_raw(),
        };
        Ok(Bitmap::new(width, height, depth, pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::encoded;

    #[test]
    fn thirty_two_bit_keeps_rgba() {
        let bytes = encoded(image::ImageFormat::Png, 3, 2);
        let bitmap = StandardImageDecoder
            .decode(&bytes, ColorConversion::EightToThirtyTwo, &Palette::default())
            .unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (3, 2));
        assert_eq!(bitmap.depth(), BitDepth::ThirtyTwo);
        assert_eq!(bitmap.pixels().len(), 3 * 2 * 4);
        assert_eq!(&bitmap.pixels()[4..8], &[200, 200, 200, 255]);
        assert!(bitmap.texture().is_none());
    }

    #[test]
    fn eight_bit_maps_onto_palette() {
        let bytes = encoded(image::ImageFormat::Png, 2, 1);
        let palette = Palette::from_colors(&[[255, 0, 255], [10, 10, 10], [190, 190, 190]]);
        let bitmap = StandardImageDecoder
            .decode(&bytes, ColorConversion::Palette, &palette)
            .unwrap();
        assert_eq!(bitmap.depth(), BitDepth::Eight);
        assert_eq!(bitmap.pixels(), &[0, 2]);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result =
            StandardImageDecoder.decode(b"not an image", ColorConversion::Palette, &Palette::default());
        assert!(result.is_err());
    }

    #[test]
    fn nearest_index_skips_mask() {
        let palette = Palette::grayscale();
        assert_eq!(palette.nearest_index([0, 0, 0]), 1);
        assert_eq!(palette.nearest_index([128, 128, 128]), 128);
    }
}
