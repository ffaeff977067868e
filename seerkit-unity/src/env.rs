use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, trace, warn};

use crate::bundle::Bundle;
use crate::classes::sprite::{self, Sprite, SpriteAtlas};
use crate::classes::texture::Texture2D;
use crate::classes::{class_ids, class_name, PPtr};
use crate::error::{Result, UnityError};
use crate::serialized::{looks_like_serialized_file, ObjectInfo, SerializedFile};
use crate::typetree::Value;

/// One serialized file loaded into the environment, named so cross-file
/// references can find it.
struct LoadedFile {
    name: String,
    file: SerializedFile,
    data: Vec<u8>,
}

/// A resource blob (.resS) holding streamed texture bytes
struct ResourceFile {
    name: String,
    data: Vec<u8>,
}

/// A loaded asset environment: every serialized file and resource blob
/// pulled out of one UnityFS bundle (or a single bare SerializedFile).
pub struct Env {
    files: Vec<LoadedFile>,
    resources: Vec<ResourceFile>,
}

impl Env {
    /// Load a bundle or serialized file from disk.
    ///
    /// The file is memory-mapped for parsing only; the map is dropped once
    /// the decompressed contents are owned by the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UnityError::FileNotFound(path.to_path_buf())
            } else {
                UnityError::Io(e)
            }
        })?;
        // Safety: the map is read-only and dropped before this function
        // returns; concurrent modification of the file is not supported.
        let mmap = unsafe { Mmap::map(&file)? };

        debug!(path = %path.display(), size = mmap.len(), "Loading asset file");
        Self::from_bytes(&mmap)
    }

    /// Load from an in-memory buffer, sniffing the container format
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.starts_with(b"UnityFS\0") {
            return Self::from_bundle(&Bundle::parse(data)?);
        }
        if looks_like_serialized_file(data) {
            let file = SerializedFile::parse(data)?;
            return Ok(Env {
                files: vec![LoadedFile {
                    name: String::new(),
                    file,
                    data: data.to_vec(),
                }],
                resources: Vec::new(),
            });
        }

        let sig_end = data.iter().take(16).position(|&b| b == 0).unwrap_or(0);
        Err(UnityError::UnsupportedSignature(
            String::from_utf8_lossy(&data[..sig_end]).into_owned(),
        ))
    }

    fn from_bundle(bundle: &Bundle) -> Result<Self> {
        let mut files = Vec::new();
        let mut resources = Vec::new();

        for node in &bundle.nodes {
            let data = bundle.node_data(node);
            let name = basename(&node.path).to_string();

            // The directory flag is not always set, so fall back to a
            // structural sniff before treating a node as a resource blob.
            if node.is_serialized_file() || looks_like_serialized_file(data) {
                match SerializedFile::parse(data) {
                    Ok(file) => {
                        files.push(LoadedFile {
                            name,
                            file,
                            data: data.to_vec(),
                        });
                        continue;
                    }
                    Err(err) => {
                        warn!(node = %node.path, %err, "Node failed serialized parse, keeping as resource");
                    }
                }
            }
            resources.push(ResourceFile {
                name,
                data: data.to_vec(),
            });
        }

        debug!(
            files = files.len(),
            resources = resources.len(),
            "Loaded bundle environment"
        );
        Ok(Env { files, resources })
    }

    /// All objects across the loaded files, in file order then object order
    pub fn objects(&self) -> impl Iterator<Item = ObjectRef<'_>> {
        self.files.iter().enumerate().flat_map(move |(file_index, loaded)| {
            loaded
                .file
                .objects
                .iter()
                .map(move |info| ObjectRef {
                    env: self,
                    file_index,
                    info,
                })
        })
    }

    /// Resolve a PPtr relative to the file it was read from
    pub fn resolve(&self, file_index: usize, pptr: PPtr) -> Option<ObjectRef<'_>> {
        if pptr.is_null() {
            return None;
        }

        let target_index = if pptr.file_id == 0 {
            file_index
        } else {
            // Positive file IDs index the externals table; externals are
            // matched against loaded files by path basename.
            let external = self.files[file_index]
                .file
                .externals
                .get(pptr.file_id as usize - 1)?;
            let name = basename(external.basename());
            self.files.iter().position(|f| f.name == name)?
        };

        let loaded = &self.files[target_index];
        let info = loaded.file.objects.iter().find(|o| o.path_id == pptr.path_id)?;
        Some(ObjectRef {
            env: self,
            file_index: target_index,
            info,
        })
    }

    /// Full pixel data for a texture, pulling streamed bytes out of the
    /// matching resource node when the texture is not stored inline.
    pub fn texture_pixels(&self, texture: &Texture2D) -> Result<Vec<u8>> {
        let Some(stream) = &texture.stream else {
            return Ok(texture.data.clone());
        };

        let name = stream.basename();
        let resource = self
            .resources
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| {
                UnityError::InvalidFormat(format!(
                    "texture {} streams from missing resource {}",
                    texture.name, name
                ))
            })?;

        let start = stream.offset as usize;
        let end = start + stream.size as usize;
        if end > resource.data.len() {
            return Err(UnityError::InvalidFormat(format!(
                "stream range {}..{} exceeds resource {} ({} bytes)",
                start,
                end,
                name,
                resource.data.len()
            )));
        }
        trace!(texture = %texture.name, resource = name, size = stream.size, "Resolved streamed pixels");
        Ok(resource.data[start..end].to_vec())
    }

    /// Render a sprite to an RGBA image, chasing its texture (and atlas)
    /// references through the environment.
    pub fn sprite_image(&self, sprite: &Sprite) -> Result<image::RgbaImage> {
        // An atlased sprite renders from the atlas page, not its own rect
        let (texture_ptr, rect, settings_raw) = match (sprite.atlas, &sprite.render_data_key) {
            (Some(atlas_ptr), Some(key)) => {
                let atlas_obj = self
                    .resolve(sprite.file_index, atlas_ptr)
                    .ok_or(UnityError::DanglingReference {
                        file_id: atlas_ptr.file_id,
                        path_id: atlas_ptr.path_id,
                    })?;
                let atlas = SpriteAtlas::from_value(&atlas_obj.read()?)?;
                let entry = atlas.render_data(key).ok_or_else(|| {
                    UnityError::InvalidFormat(format!(
                        "sprite {} missing from atlas {}",
                        sprite.name, atlas.name
                    ))
                })?;
                (entry.texture, entry.texture_rect, entry.settings_raw)
            }
            _ => (sprite.texture, sprite.texture_rect, sprite.settings_raw),
        };

        let texture_obj =
            self.resolve(sprite.file_index, texture_ptr)
                .ok_or(UnityError::DanglingReference {
                    file_id: texture_ptr.file_id,
                    path_id: texture_ptr.path_id,
                })?;
        let texture = texture_obj.read_texture()?;
        let pixels = self.texture_pixels(&texture)?;
        let full = texture.to_rgba_image(&pixels)?;

        sprite::render(&full, &rect, settings_raw)
    }
}

/// Handle to one object in the environment. Class information is available
/// without decoding; `read` decodes the payload through its type tree.
#[derive(Clone, Copy)]
pub struct ObjectRef<'a> {
    env: &'a Env,
    file_index: usize,
    info: &'a ObjectInfo,
}

impl<'a> ObjectRef<'a> {
    pub fn class_id(&self) -> i32 {
        self.info.class_id
    }

    pub fn class_name(&self) -> String {
        class_name(self.info.class_id)
    }

    pub fn path_id(&self) -> i64 {
        self.info.path_id
    }

    pub fn byte_size(&self) -> u32 {
        self.info.byte_size
    }

    /// Decode the object payload into a generic value
    pub fn read(&self) -> Result<Value> {
        let loaded = &self.env.files[self.file_index];
        let tree = loaded
            .file
            .object_type_tree(self.info)
            .ok_or(UnityError::NoTypeTree)?;
        let data = loaded.file.object_data(self.info, &loaded.data)?;
        tree.decode(data, loaded.file.big_endian)
    }

    /// Decode as a Sprite
    pub fn read_sprite(&self) -> Result<Sprite> {
        let mut sprite = Sprite::from_value(&self.read()?)?;
        sprite.file_index = self.file_index;
        Ok(sprite)
    }

    /// Decode as a Texture2D
    pub fn read_texture(&self) -> Result<Texture2D> {
        Texture2D::from_value(&self.read()?)
    }

    /// Decoded m_Name, if the object has one; decode failures read as None
    pub fn name(&self) -> Option<String> {
        self.read()
            .ok()?
            .get("m_Name")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    pub fn is_sprite(&self) -> bool {
        self.info.class_id == class_ids::SPRITE
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::BundleBuilder;

    /// 2x2 RGBA quad with one color per pixel, top-left origin
    fn quad_pixels() -> Vec<u8> {
        vec![
            10, 0, 0, 255, 20, 0, 0, 255, //
            30, 0, 0, 255, 40, 0, 0, 255,
        ]
    }

    #[test]
    fn test_load_bundle_and_iterate() {
        let data = BundleBuilder::new()
            .texture(7, "0001_tex", 2, 2, quad_pixels())
            .sprite(8, "0001", 7, 2, 2)
            .build();

        let env = Env::from_bytes(&data).unwrap();
        let classes: Vec<String> = env.objects().map(|o| o.class_name()).collect();
        assert_eq!(classes, vec!["Texture2D", "Sprite"]);
    }

    #[test]
    fn test_sprite_image_matches_texture() {
        let data = BundleBuilder::new()
            .texture(7, "0001_tex", 2, 2, quad_pixels())
            .sprite(8, "0001", 7, 2, 2)
            .build();

        let env = Env::from_bytes(&data).unwrap();
        let obj = env.objects().find(|o| o.is_sprite()).unwrap();
        let sprite = obj.read_sprite().unwrap();
        assert_eq!(sprite.name, "0001");

        let image = env.sprite_image(&sprite).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0).0, [10, 0, 0, 255]);
        assert_eq!(image.get_pixel(1, 1).0, [40, 0, 0, 255]);
    }

    #[test]
    fn test_class_gate_without_decode() {
        // A TextAsset named like a sprite must be distinguishable by class
        // name alone.
        let data = BundleBuilder::new()
            .named_object(5, 49, "000fake")
            .build();

        let env = Env::from_bytes(&data).unwrap();
        let obj = env.objects().next().unwrap();
        assert_eq!(obj.class_name(), "TextAsset");
        assert!(!obj.is_sprite());
        assert_eq!(obj.name().as_deref(), Some("000fake"));
    }

    #[test]
    fn test_dangling_texture_reference_errors() {
        let data = BundleBuilder::new()
            .sprite(8, "0001", 999, 2, 2)
            .build();

        let env = Env::from_bytes(&data).unwrap();
        let sprite = env.objects().next().unwrap().read_sprite().unwrap();
        let result = env.sprite_image(&sprite);
        assert!(matches!(
            result,
            Err(UnityError::DanglingReference { path_id: 999, .. })
        ));
    }

    #[test]
    fn test_missing_file_errors() {
        let result = Env::load("/nonexistent/game_ui_activitylistpreview");
        assert!(matches!(result, Err(UnityError::FileNotFound(_))));
    }

    #[test]
    fn test_garbage_input_errors() {
        let result = Env::from_bytes(b"not a unity file at all");
        assert!(matches!(result, Err(UnityError::UnsupportedSignature(_))));
    }
}
