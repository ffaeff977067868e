use image::RgbaImage;

use crate::classes::{f32_field, field, str_field, u32_field, PPtr};
use crate::error::{Result, UnityError};
use crate::typetree::Value;

/// Axis-aligned rectangle in texture space. Unity's origin is bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectf {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectf {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Rectf {
            x: f32_field(value, "x")?,
            y: f32_field(value, "y")?,
            width: f32_field(value, "width")?,
            height: f32_field(value, "height")?,
        })
    }
}

/// Rotation applied when the sprite was packed into an atlas page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingRotation {
    None,
    FlipHorizontal,
    FlipVertical,
    Rotate180,
    Rotate90,
}

/// Unpacked view of the m_RD.settingsRaw bitfield
#[derive(Debug, Clone, Copy)]
pub struct SpriteSettings {
    pub packed: bool,
    pub rotation: PackingRotation,
}

impl SpriteSettings {
    pub fn from_raw(raw: u32) -> Self {
        let rotation = match (raw >> 2) & 0xF {
            1 => PackingRotation::FlipHorizontal,
            2 => PackingRotation::FlipVertical,
            3 => PackingRotation::Rotate180,
            4 => PackingRotation::Rotate90,
            _ => PackingRotation::None,
        };
        SpriteSettings {
            packed: raw & 1 != 0,
            rotation,
        }
    }
}

/// Key into a SpriteAtlas render-data map: texture GUID plus a secondary ID
pub type RenderDataKey = ([u8; 16], i64);

/// A decoded Sprite object. The texture pointer, rect, and settings come
/// from m_RD; when the sprite lives in an atlas they are overridden by the
/// atlas entry looked up through `render_data_key`.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub name: String,
    pub rect: Rectf,
    pub texture: PPtr,
    pub texture_rect: Rectf,
    pub settings_raw: u32,
    pub downscale_multiplier: f32,
    pub atlas: Option<PPtr>,
    pub render_data_key: Option<RenderDataKey>,
    /// Index of the serialized file the sprite was read from, used by the
    /// environment to resolve its PPtrs.
    pub(crate) file_index: usize,
}

impl Sprite {
    /// Decode from a type-tree value
    pub fn from_value(value: &Value) -> Result<Self> {
        let name = str_field(value, "m_Name")?;
        let rect = Rectf::from_value(field(value, "m_Rect")?)?;

        let rd = field(value, "m_RD")?;
        let texture = PPtr::from_value(field(rd, "texture")?)?;
        let texture_rect = Rectf::from_value(field(rd, "textureRect")?)?;
        let settings_raw = u32_field(rd, "settingsRaw")?;
        let downscale_multiplier = rd
            .get("downscaleMultiplier")
            .and_then(Value::as_f32)
            .unwrap_or(1.0);

        // Older serialized versions have no atlas support; a present but
        // null pointer also means "not atlased".
        let atlas = match value.get("m_SpriteAtlas") {
            Some(v) => {
                let pptr = PPtr::from_value(v)?;
                (!pptr.is_null()).then_some(pptr)
            }
            None => None,
        };
        let render_data_key = value.get("m_RenderDataKey").map(decode_render_data_key).transpose()?;

        Ok(Sprite {
            name,
            rect,
            texture,
            texture_rect,
            settings_raw,
            downscale_multiplier,
            atlas,
            render_data_key,
            file_index: 0,
        })
    }

    pub fn settings(&self) -> SpriteSettings {
        SpriteSettings::from_raw(self.settings_raw)
    }
}

/// One entry of a SpriteAtlas render-data map
#[derive(Debug, Clone)]
pub struct AtlasEntry {
    pub texture: PPtr,
    pub texture_rect: Rectf,
    pub settings_raw: u32,
}

/// A decoded SpriteAtlas object, reduced to what sprite rendering needs
#[derive(Debug, Clone)]
pub struct SpriteAtlas {
    pub name: String,
    entries: Vec<(RenderDataKey, AtlasEntry)>,
}

impl SpriteAtlas {
    /// Decode from a type-tree value
    pub fn from_value(value: &Value) -> Result<Self> {
        let name = str_field(value, "m_Name")?;

        let map = field(value, "m_RenderDataMap")?
            .as_array()
            .ok_or(UnityError::FieldType("m_RenderDataMap"))?;

        let mut entries = Vec::with_capacity(map.len());
        for pair in map {
            let key = decode_render_data_key(field(pair, "first")?)?;
            let data = field(pair, "second")?;
            entries.push((
                key,
                AtlasEntry {
                    texture: PPtr::from_value(field(data, "texture")?)?,
                    texture_rect: Rectf::from_value(field(data, "textureRect")?)?,
                    settings_raw: u32_field(data, "settingsRaw")?,
                },
            ));
        }

        Ok(SpriteAtlas { name, entries })
    }

    /// Render data for a sprite's key
    pub fn render_data(&self, key: &RenderDataKey) -> Option<&AtlasEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }
}

/// m_RenderDataKey is pair<Hash128, long long>
fn decode_render_data_key(value: &Value) -> Result<RenderDataKey> {
    let guid = guid_from_value(field(value, "first")?)?;
    let second = field(value, "second")?
        .as_i64()
        .ok_or(UnityError::FieldType("m_RenderDataKey.second"))?;
    Ok((guid, second))
}

/// Hash128 decodes either as raw bytes or as a struct of 16 UInt8 fields
/// (bytes[0] through bytes[15]) depending on the tree.
fn guid_from_value(value: &Value) -> Result<[u8; 16]> {
    let mut guid = [0u8; 16];
    match value {
        Value::Bytes(bytes) if bytes.len() == 16 => {
            guid.copy_from_slice(bytes);
            Ok(guid)
        }
        Value::Object(fields) if fields.len() == 16 => {
            for (i, (_, v)) in fields.iter().enumerate() {
                guid[i] = v
                    .as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or(UnityError::FieldType("Hash128"))?;
            }
            Ok(guid)
        }
        _ => Err(UnityError::FieldType("Hash128")),
    }
}

/// Cut a sprite out of its (already top-left-origin) texture image and undo
/// the packing rotation.
pub fn render(texture: &RgbaImage, rect: &Rectf, settings_raw: u32) -> Result<RgbaImage> {
    let tex_w = texture.width();
    let tex_h = texture.height();

    let x = rect.x.round().max(0.0) as u32;
    let w = rect.width.round() as u32;
    let h = rect.height.round() as u32;
    // The rect's y counts from the bottom of the texture
    let rect_bottom = rect.y.round().max(0.0) as u32;

    // Compare in u64: a malformed rect can carry coordinates near u32::MAX
    if u64::from(x) + u64::from(w) > u64::from(tex_w)
        || u64::from(rect_bottom) + u64::from(h) > u64::from(tex_h)
    {
        return Err(UnityError::InvalidFormat(format!(
            "sprite rect {}x{}+{}+{} exceeds texture {}x{}",
            w, h, x, rect_bottom, tex_w, tex_h
        )));
    }
    let y = tex_h - rect_bottom - h;

    let mut out = image::imageops::crop_imm(texture, x, y, w, h).to_image();

    let settings = SpriteSettings::from_raw(settings_raw);
    if settings.packed {
        out = match settings.rotation {
            PackingRotation::None => out,
            PackingRotation::FlipHorizontal => image::imageops::flip_horizontal(&out),
            PackingRotation::FlipVertical => image::imageops::flip_vertical(&out),
            PackingRotation::Rotate180 => image::imageops::rotate180(&out),
            // Packed with a 90° clockwise turn, so turn back the other way
            PackingRotation::Rotate90 => image::imageops::rotate270(&out),
        };
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn rect(x: f32, y: f32, width: f32, height: f32) -> Rectf {
        Rectf {
            x,
            y,
            width,
            height,
        }
    }

    /// 2x2 image with a distinct color per pixel
    fn quad() -> RgbaImage {
        let mut image = RgbaImage::new(2, 2);
        image.put_pixel(0, 0, Rgba([1, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([2, 0, 0, 255]));
        image.put_pixel(0, 1, Rgba([3, 0, 0, 255]));
        image.put_pixel(1, 1, Rgba([4, 0, 0, 255]));
        image
    }

    #[test]
    fn test_full_rect_is_identity() {
        let out = render(&quad(), &rect(0.0, 0.0, 2.0, 2.0), 0).unwrap();
        assert_eq!(out, quad());
    }

    #[test]
    fn test_crop_uses_bottom_left_origin() {
        // y=0 is the bottom row of the texture
        let out = render(&quad(), &rect(0.0, 0.0, 2.0, 1.0), 0).unwrap();
        assert_eq!(out.dimensions(), (2, 1));
        assert_eq!(out.get_pixel(0, 0).0, [3, 0, 0, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [4, 0, 0, 255]);
    }

    #[test]
    fn test_rect_exceeding_texture_errors() {
        let result = render(&quad(), &rect(0.0, 0.0, 3.0, 2.0), 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_huge_rect_coordinates_error_without_overflow() {
        // x + width here exceeds u32::MAX; must be a typed error
        let result = render(&quad(), &rect(3.0e9, 0.0, 3.0e9, 2.0), 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_unpacked_rotation_bits_ignored() {
        // rotation bits set but packed flag clear
        let raw = 4 << 2;
        let out = render(&quad(), &rect(0.0, 0.0, 2.0, 2.0), raw).unwrap();
        assert_eq!(out, quad());
    }

    #[test]
    fn test_packed_rotate90_is_undone() {
        let raw = 1 | (4 << 2);
        let out = render(&quad(), &rect(0.0, 0.0, 2.0, 2.0), raw).unwrap();
        assert_eq!(out, image::imageops::rotate270(&quad()));
    }

    #[test]
    fn test_packed_flip_horizontal() {
        let raw = 1 | (1 << 2);
        let out = render(&quad(), &rect(0.0, 0.0, 2.0, 2.0), raw).unwrap();
        assert_eq!(out, image::imageops::flip_horizontal(&quad()));
    }

    #[test]
    fn test_settings_decode() {
        let settings = SpriteSettings::from_raw(1 | (3 << 2));
        assert!(settings.packed);
        assert_eq!(settings.rotation, PackingRotation::Rotate180);

        let settings = SpriteSettings::from_raw(0);
        assert!(!settings.packed);
        assert_eq!(settings.rotation, PackingRotation::None);
    }

    #[test]
    fn test_sprite_from_minimal_value() {
        let pptr = |file_id: i64, path_id: i64| {
            Value::Object(vec![
                ("m_FileID".to_string(), Value::Int(file_id)),
                ("m_PathID".to_string(), Value::Int(path_id)),
            ])
        };
        let rectv = Value::Object(vec![
            ("x".to_string(), Value::Float(0.0)),
            ("y".to_string(), Value::Float(0.0)),
            ("width".to_string(), Value::Float(8.0)),
            ("height".to_string(), Value::Float(8.0)),
        ]);
        let value = Value::Object(vec![
            ("m_Name".to_string(), Value::String("0001".to_string())),
            ("m_Rect".to_string(), rectv.clone()),
            (
                "m_RD".to_string(),
                Value::Object(vec![
                    ("texture".to_string(), pptr(0, 7)),
                    ("textureRect".to_string(), rectv),
                    ("settingsRaw".to_string(), Value::UInt(0)),
                    ("downscaleMultiplier".to_string(), Value::Float(1.0)),
                ]),
            ),
            ("m_SpriteAtlas".to_string(), pptr(0, 0)),
        ]);

        let sprite = Sprite::from_value(&value).unwrap();
        assert_eq!(sprite.name, "0001");
        assert_eq!(sprite.texture.path_id, 7);
        assert_eq!(sprite.texture_rect.width, 8.0);
        assert!(sprite.atlas.is_none());
        assert!(sprite.render_data_key.is_none());
    }

    #[test]
    fn test_guid_from_byte_struct() {
        let fields: Vec<(String, Value)> = (0..16)
            .map(|i| (format!("bytes[{}]", i), Value::UInt(i as u64)))
            .collect();
        let guid = guid_from_value(&Value::Object(fields)).unwrap();
        assert_eq!(guid[0], 0);
        assert_eq!(guid[15], 15);
    }
}
