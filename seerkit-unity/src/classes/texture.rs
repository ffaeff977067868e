use std::path::Path;

use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use tracing::trace;

use crate::classes::{field, i32_field, str_field, u32_field, u64_field};
use crate::error::{Result, UnityError};
use crate::typetree::Value;

/// Unity texture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Alpha8 = 1,
    ARGB4444 = 2,
    RGB24 = 3,
    RGBA32 = 4,
    ARGB32 = 5,
    RGB565 = 7,
    R16 = 9,
    DXT1 = 10,
    DXT3 = 11,
    DXT5 = 12,
    RGBA4444 = 13,
    BGRA32 = 14,
    BC6H = 24,
    BC7 = 25,
    BC4 = 26,
    BC5 = 27,
    DXT1Crunched = 28,
    DXT5Crunched = 29,
    EtcRgb4 = 34,
    Etc2Rgb = 45,
    Etc2Rgba8 = 47,
    Astc4x4 = 48,
    R8 = 63,
}

impl TextureFormat {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Alpha8),
            2 => Some(Self::ARGB4444),
            3 => Some(Self::RGB24),
            4 => Some(Self::RGBA32),
            5 => Some(Self::ARGB32),
            7 => Some(Self::RGB565),
            9 => Some(Self::R16),
            10 => Some(Self::DXT1),
            11 => Some(Self::DXT3),
            12 => Some(Self::DXT5),
            13 => Some(Self::RGBA4444),
            14 => Some(Self::BGRA32),
            24 => Some(Self::BC6H),
            25 => Some(Self::BC7),
            26 => Some(Self::BC4),
            27 => Some(Self::BC5),
            28 => Some(Self::DXT1Crunched),
            29 => Some(Self::DXT5Crunched),
            34 => Some(Self::EtcRgb4),
            45 => Some(Self::Etc2Rgb),
            47 => Some(Self::Etc2Rgba8),
            48 => Some(Self::Astc4x4),
            63 => Some(Self::R8),
            _ => None,
        }
    }

    /// Bytes per pixel for uncompressed formats
    fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Alpha8 | Self::R8 => Some(1),
            Self::ARGB4444 | Self::RGBA4444 | Self::RGB565 | Self::R16 => Some(2),
            Self::RGB24 => Some(3),
            Self::RGBA32 | Self::ARGB32 | Self::BGRA32 => Some(4),
            _ => None,
        }
    }

    /// Bytes per 4x4 block for block-compressed formats
    fn bytes_per_block(&self) -> Option<usize> {
        match self {
            Self::DXT1 => Some(8),
            Self::DXT3 | Self::DXT5 | Self::BC7 => Some(16),
            _ => None,
        }
    }
}

/// Streamed pixel data location inside the bundle's resource node
#[derive(Debug, Clone)]
pub struct StreamingInfo {
    pub offset: u64,
    pub size: u32,
    pub path: String,
}

impl StreamingInfo {
    /// File name component used to match the resource node
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A decoded Texture2D object. Pixel data is either inline (`data`) or
/// streamed out of a resource node (`stream`).
#[derive(Debug, Clone)]
pub struct Texture2D {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: i32,
    pub data: Vec<u8>,
    pub stream: Option<StreamingInfo>,
}

impl Texture2D {
    /// Decode from a type-tree value
    pub fn from_value(value: &Value) -> Result<Self> {
        let name = str_field(value, "m_Name")?;
        let width = i32_field(value, "m_Width")?;
        let height = i32_field(value, "m_Height")?;
        if width < 0 || height < 0 {
            return Err(UnityError::InvalidFormat(format!(
                "texture {} has negative dimensions {}x{}",
                name, width, height
            )));
        }
        let format = i32_field(value, "m_TextureFormat")?;
        let data = field(value, "image data")?
            .as_bytes()
            .ok_or(UnityError::FieldType("image data"))?
            .to_vec();

        let stream = match value.get("m_StreamData") {
            Some(sd) => {
                let path = str_field(sd, "path")?;
                if path.is_empty() {
                    None
                } else {
                    Some(StreamingInfo {
                        offset: u64_field(sd, "offset")?,
                        size: u32_field(sd, "size")?,
                        path,
                    })
                }
            }
            None => None,
        };

        Ok(Texture2D {
            name,
            width: width as u32,
            height: height as u32,
            format,
            data,
            stream,
        })
    }

    pub fn format(&self) -> Option<TextureFormat> {
        TextureFormat::from_i32(self.format)
    }

    /// Convert raw pixel data (mip 0) into an RGBA image with a top-left
    /// origin. Unity stores textures bottom-up, so the rows are flipped
    /// here once.
    pub fn to_rgba_image(&self, pixels: &[u8]) -> Result<RgbaImage> {
        let format = self
            .format()
            .ok_or(UnityError::UnsupportedTextureFormat(self.format))?;
        let width = self.width as usize;
        let height = self.height as usize;

        let rgba = match format {
            TextureFormat::RGBA32 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                mip0.to_vec()
            }
            TextureFormat::ARGB32 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(mip0.len());
                for chunk in mip0.chunks_exact(4) {
                    rgba.push(chunk[1]); // R
                    rgba.push(chunk[2]); // G
                    rgba.push(chunk[3]); // B
                    rgba.push(chunk[0]); // A
                }
                rgba
            }
            TextureFormat::BGRA32 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(mip0.len());
                for chunk in mip0.chunks_exact(4) {
                    rgba.push(chunk[2]); // R
                    rgba.push(chunk[1]); // G
                    rgba.push(chunk[0]); // B
                    rgba.push(chunk[3]); // A
                }
                rgba
            }
            TextureFormat::RGB24 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(width * height * 4);
                for chunk in mip0.chunks_exact(3) {
                    rgba.extend_from_slice(chunk);
                    rgba.push(255);
                }
                rgba
            }
            TextureFormat::Alpha8 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(width * height * 4);
                for &alpha in mip0 {
                    rgba.extend_from_slice(&[255, 255, 255, alpha]);
                }
                rgba
            }
            TextureFormat::R8 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(width * height * 4);
                for &red in mip0 {
                    rgba.extend_from_slice(&[red, 0, 0, 255]);
                }
                rgba
            }
            TextureFormat::R16 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(width * height * 4);
                for chunk in mip0.chunks_exact(2) {
                    let red = u16::from_le_bytes([chunk[0], chunk[1]]);
                    rgba.extend_from_slice(&[(red >> 8) as u8, 0, 0, 255]);
                }
                rgba
            }
            TextureFormat::RGB565 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(width * height * 4);
                for chunk in mip0.chunks_exact(2) {
                    let v = u16::from_le_bytes([chunk[0], chunk[1]]);
                    let r = ((v >> 11) & 0x1F) as u8;
                    let g = ((v >> 5) & 0x3F) as u8;
                    let b = (v & 0x1F) as u8;
                    rgba.push((r << 3) | (r >> 2));
                    rgba.push((g << 2) | (g >> 4));
                    rgba.push((b << 3) | (b >> 2));
                    rgba.push(255);
                }
                rgba
            }
            TextureFormat::ARGB4444 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(width * height * 4);
                for chunk in mip0.chunks_exact(2) {
                    let v = u16::from_le_bytes([chunk[0], chunk[1]]);
                    let a = ((v >> 12) & 0xF) as u8;
                    let r = ((v >> 8) & 0xF) as u8;
                    let g = ((v >> 4) & 0xF) as u8;
                    let b = (v & 0xF) as u8;
                    rgba.extend_from_slice(&[r * 17, g * 17, b * 17, a * 17]);
                }
                rgba
            }
            TextureFormat::RGBA4444 => {
                let mip0 = self.linear_mip0(pixels, format)?;
                let mut rgba = Vec::with_capacity(width * height * 4);
                for chunk in mip0.chunks_exact(2) {
                    let v = u16::from_le_bytes([chunk[0], chunk[1]]);
                    let r = ((v >> 12) & 0xF) as u8;
                    let g = ((v >> 8) & 0xF) as u8;
                    let b = ((v >> 4) & 0xF) as u8;
                    let a = (v & 0xF) as u8;
                    rgba.extend_from_slice(&[r * 17, g * 17, b * 17, a * 17]);
                }
                rgba
            }
            TextureFormat::DXT1 => self.decode_blocks(pixels, format, bcdec_rs::bc1)?,
            TextureFormat::DXT3 => self.decode_blocks(pixels, format, bcdec_rs::bc2)?,
            TextureFormat::DXT5 => self.decode_blocks(pixels, format, bcdec_rs::bc3)?,
            TextureFormat::BC7 => self.decode_blocks(pixels, format, bcdec_rs::bc7)?,
            _ => return Err(UnityError::UnsupportedTextureFormat(self.format)),
        };

        let mut image = ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, rgba)
            .ok_or_else(|| {
                UnityError::InvalidFormat(format!(
                    "pixel buffer does not match {}x{}",
                    self.width, self.height
                ))
            })?;
        image::imageops::flip_vertical_in_place(&mut image);
        Ok(image)
    }

    /// Mip 0 of an uncompressed format, sized from its bytes-per-pixel
    fn linear_mip0<'a>(&self, pixels: &'a [u8], format: TextureFormat) -> Result<&'a [u8]> {
        let bpp = format
            .bytes_per_pixel()
            .ok_or(UnityError::UnsupportedTextureFormat(self.format))?;
        self.mip0(pixels, self.width as usize * self.height as usize * bpp)
    }

    /// Mip 0 is the leading slice of the pixel data; later mips follow it
    /// and are ignored.
    fn mip0<'a>(&self, pixels: &'a [u8], expected: usize) -> Result<&'a [u8]> {
        if pixels.len() < expected {
            return Err(UnityError::InvalidFormat(format!(
                "texture {} pixel data too small: {} < {}",
                self.name,
                pixels.len(),
                expected
            )));
        }
        if pixels.len() > expected {
            trace!(
                texture = %self.name,
                total = pixels.len(),
                mip0 = expected,
                "Ignoring trailing mip levels"
            );
        }
        Ok(&pixels[..expected])
    }

    /// Decode a block-compressed mip 0 into a tightly packed RGBA buffer,
    /// clamping partial blocks at the right and bottom edges.
    fn decode_blocks(
        &self,
        pixels: &[u8],
        format: TextureFormat,
        decoder: fn(&[u8], &mut [u8], usize),
    ) -> Result<Vec<u8>> {
        let block_size = format
            .bytes_per_block()
            .ok_or(UnityError::UnsupportedTextureFormat(self.format))?;
        let width = self.width as usize;
        let height = self.height as usize;
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let blocks_x = (width + 3) / 4;
        let blocks_y = (height + 3) / 4;
        let data = self.mip0(pixels, blocks_x * blocks_y * block_size)?;

        let mut rgba = vec![0u8; width * height * 4];
        let mut block_rgba = [0u8; 4 * 4 * 4];
        let row_pitch = width * 4;

        for block_y in 0..blocks_y {
            for block_x in 0..blocks_x {
                let offset = (block_y * blocks_x + block_x) * block_size;
                let block = &data[offset..offset + block_size];
                block_rgba.fill(0);
                decoder(block, &mut block_rgba, 4 * 4);

                for row in 0..4 {
                    let dest_y = block_y * 4 + row;
                    if dest_y >= height {
                        continue;
                    }

                    let dest_x = block_x * 4;
                    let pixels_in_row = std::cmp::min(4, width - dest_x);
                    let dest_start = dest_y * row_pitch + dest_x * 4;
                    let src_start = row * 4 * 4;
                    let src_end = src_start + pixels_in_row * 4;
                    rgba[dest_start..dest_start + pixels_in_row * 4]
                        .copy_from_slice(&block_rgba[src_start..src_end]);
                }
            }
        }

        Ok(rgba)
    }
}

/// Write an RGBA image as PNG
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
