pub mod sprite;
pub mod texture;

use crate::error::{Result, UnityError};
use crate::typetree::Value;

/// Class IDs this crate decodes specially
pub mod class_ids {
    pub const TEXTURE2D: i32 = 28;
    pub const SPRITE: i32 = 213;
    pub const SPRITE_ATLAS: i32 = 687078895;
}

/// Human-readable name for a Unity class ID
pub fn class_name(class_id: i32) -> String {
    match class_id {
        1 => "GameObject",
        4 => "Transform",
        21 => "Material",
        28 => "Texture2D",
        43 => "Mesh",
        48 => "Shader",
        49 => "TextAsset",
        83 => "AudioClip",
        114 => "MonoBehaviour",
        115 => "MonoScript",
        128 => "Font",
        142 => "AssetBundle",
        213 => "Sprite",
        687078895 => "SpriteAtlas",
        _ => return format!("Class{}", class_id),
    }
    .to_string()
}

/// Serialized object reference: index into the externals table plus the
/// target's path ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PPtr {
    pub file_id: i32,
    pub path_id: i64,
}

impl PPtr {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(PPtr {
            file_id: i32_field(value, "m_FileID")?,
            path_id: i64_field(value, "m_PathID")?,
        })
    }

    pub fn is_null(&self) -> bool {
        self.path_id == 0
    }
}

pub(crate) fn field<'a>(value: &'a Value, name: &'static str) -> Result<&'a Value> {
    value.get(name).ok_or(UnityError::MissingField(name))
}

pub(crate) fn str_field(value: &Value, name: &'static str) -> Result<String> {
    field(value, name)?
        .as_str()
        .map(str::to_owned)
        .ok_or(UnityError::FieldType(name))
}

pub(crate) fn i32_field(value: &Value, name: &'static str) -> Result<i32> {
    field(value, name)?
        .as_i32()
        .ok_or(UnityError::FieldType(name))
}

pub(crate) fn i64_field(value: &Value, name: &'static str) -> Result<i64> {
    field(value, name)?
        .as_i64()
        .ok_or(UnityError::FieldType(name))
}

pub(crate) fn u32_field(value: &Value, name: &'static str) -> Result<u32> {
    field(value, name)?
        .as_u32()
        .ok_or(UnityError::FieldType(name))
}

pub(crate) fn u64_field(value: &Value, name: &'static str) -> Result<u64> {
    field(value, name)?
        .as_u64()
        .ok_or(UnityError::FieldType(name))
}

pub(crate) fn f32_field(value: &Value, name: &'static str) -> Result<f32> {
    field(value, name)?
        .as_f32()
        .ok_or(UnityError::FieldType(name))
}
