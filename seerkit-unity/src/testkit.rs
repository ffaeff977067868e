//! Synthetic bundle construction for test suites.
//!
//! Builds real UnityFS framing around a version-17 SerializedFile with
//! minimal but genuine type trees, so the full load/decode/render path can
//! be exercised without shipping game data. Object payloads are
//! little-endian, matching what the game's files declare.

use std::path::Path;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::classes::class_ids;

const SERIALIZED_VERSION: u32 = 17;
const CAB_NAME: &str = "CAB-testkit";

/// Builder for an in-memory UnityFS bundle holding one serialized file
#[derive(Default)]
pub struct BundleBuilder {
    objects: Vec<TestObject>,
}

struct TestObject {
    path_id: i64,
    class_id: i32,
    tree: Vec<Node>,
    payload: Vec<u8>,
}

struct Node {
    level: u8,
    type_name: &'static str,
    name: String,
    meta_flags: u32,
}

fn node(level: u8, type_name: &'static str, name: &str) -> Node {
    Node {
        level,
        type_name,
        name: name.to_string(),
        meta_flags: 0,
    }
}

fn aligned(level: u8, type_name: &'static str, name: &str) -> Node {
    Node {
        level,
        type_name,
        name: name.to_string(),
        meta_flags: 0x4000,
    }
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an RGBA32 Texture2D. `rgba` is row-major with a top-left origin;
    /// rows are flipped here because Unity stores textures bottom-up.
    pub fn texture(mut self, path_id: i64, name: &str, width: u32, height: u32, rgba: Vec<u8>) -> Self {
        assert_eq!(rgba.len(), (width * height * 4) as usize, "pixel buffer size");

        let row = (width * 4) as usize;
        let mut bottom_up = Vec::with_capacity(rgba.len());
        for chunk in rgba.chunks(row).rev() {
            bottom_up.extend_from_slice(chunk);
        }

        let mut payload = Vec::new();
        write_aligned_string(&mut payload, name);
        payload.write_i32::<LittleEndian>(width as i32).unwrap();
        payload.write_i32::<LittleEndian>(height as i32).unwrap();
        payload.write_i32::<LittleEndian>(4).unwrap(); // RGBA32
        payload
            .write_i32::<LittleEndian>(bottom_up.len() as i32)
            .unwrap();
        payload.extend_from_slice(&bottom_up);
        pad_to(&mut payload, 4);
        payload.write_u64::<LittleEndian>(0).unwrap(); // m_StreamData.offset
        payload.write_u32::<LittleEndian>(0).unwrap(); // m_StreamData.size
        write_aligned_string(&mut payload, ""); // m_StreamData.path

        let tree = vec![
            node(0, "Texture2D", "Base"),
            node(1, "string", "m_Name"),
            node(1, "int", "m_Width"),
            node(1, "int", "m_Height"),
            node(1, "int", "m_TextureFormat"),
            aligned(1, "TypelessData", "image data"),
            node(2, "int", "size"),
            node(2, "UInt8", "data"),
            node(1, "StreamingInfo", "m_StreamData"),
            node(2, "UInt64", "offset"),
            node(2, "unsigned int", "size"),
            node(2, "string", "path"),
        ];

        self.objects.push(TestObject {
            path_id,
            class_id: class_ids::TEXTURE2D,
            tree,
            payload,
        });
        self
    }

    /// Add a Sprite covering the full `width` x `height` of the texture at
    /// `texture_path_id`, not atlased, no packing rotation.
    pub fn sprite(mut self, path_id: i64, name: &str, texture_path_id: i64, width: u32, height: u32) -> Self {
        let mut payload = Vec::new();
        write_aligned_string(&mut payload, name);
        write_rect(&mut payload, width as f32, height as f32); // m_Rect
        write_pptr(&mut payload, 0, texture_path_id); // m_RD.texture
        write_rect(&mut payload, width as f32, height as f32); // m_RD.textureRect
        payload.write_u32::<LittleEndian>(0).unwrap(); // settingsRaw
        payload.write_f32::<LittleEndian>(1.0).unwrap(); // downscaleMultiplier
        write_pptr(&mut payload, 0, 0); // m_SpriteAtlas (null)
        payload.extend_from_slice(&[0u8; 16]); // m_RenderDataKey.first
        payload.write_i64::<LittleEndian>(0).unwrap(); // m_RenderDataKey.second

        let mut tree = vec![
            node(0, "Sprite", "Base"),
            node(1, "string", "m_Name"),
            node(1, "Rectf", "m_Rect"),
        ];
        push_rect_fields(&mut tree, 2);
        tree.push(node(1, "SpriteRenderData", "m_RD"));
        tree.push(node(2, "PPtr<Texture2D>", "texture"));
        tree.push(node(3, "int", "m_FileID"));
        tree.push(node(3, "SInt64", "m_PathID"));
        tree.push(node(2, "Rectf", "textureRect"));
        push_rect_fields(&mut tree, 3);
        tree.push(node(2, "unsigned int", "settingsRaw"));
        tree.push(node(2, "float", "downscaleMultiplier"));
        tree.push(node(1, "PPtr<SpriteAtlas>", "m_SpriteAtlas"));
        tree.push(node(2, "int", "m_FileID"));
        tree.push(node(2, "SInt64", "m_PathID"));
        tree.push(node(1, "pair", "m_RenderDataKey"));
        tree.push(node(2, "Hash128", "first"));
        for i in 0..16 {
            tree.push(Node {
                level: 3,
                type_name: "UInt8",
                name: format!("bytes[{}]", i),
                meta_flags: 0,
            });
        }
        tree.push(node(2, "SInt64", "second"));

        self.objects.push(TestObject {
            path_id,
            class_id: class_ids::SPRITE,
            tree,
            payload,
        });
        self
    }

    /// Add an object of an arbitrary class carrying only an m_Name field
    pub fn named_object(mut self, path_id: i64, class_id: i32, name: &str) -> Self {
        let mut payload = Vec::new();
        write_aligned_string(&mut payload, name);

        self.objects.push(TestObject {
            path_id,
            class_id,
            tree: vec![node(0, "NamedObject", "Base"), node(1, "string", "m_Name")],
            payload,
        });
        self
    }

    /// Serialize into UnityFS bundle bytes
    pub fn build(&self) -> Vec<u8> {
        let serialized = self.build_serialized_file();
        wrap_in_bundle(&serialized)
    }

    /// Serialize and write the bundle to `path`
    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.build())
    }

    fn build_serialized_file(&self) -> Vec<u8> {
        // Object payload region, each payload 8-aligned
        let mut data = Vec::new();
        let mut byte_starts = Vec::with_capacity(self.objects.len());
        for object in &self.objects {
            pad_to(&mut data, 8);
            byte_starts.push(data.len() as u32);
            data.extend_from_slice(&object.payload);
        }

        // Metadata, little-endian (header endianness byte is 0)
        let mut meta = Vec::new();
        meta.extend_from_slice(b"2019.4.22f1\0");
        meta.write_u32::<LittleEndian>(19).unwrap(); // StandaloneWindows64
        meta.push(1); // type trees enabled

        meta.write_u32::<LittleEndian>(self.objects.len() as u32)
            .unwrap();
        for object in &self.objects {
            meta.write_i32::<LittleEndian>(object.class_id).unwrap();
            meta.push(0); // is_stripped
            meta.write_i16::<LittleEndian>(-1).unwrap(); // script_type_index
            meta.extend_from_slice(&[0u8; 16]); // old_type_hash
            write_type_tree(&mut meta, &object.tree);
        }

        // One type per object keeps the indices trivial
        meta.write_u32::<LittleEndian>(self.objects.len() as u32)
            .unwrap();
        let header_len = 20u32;
        let mut object_table = Vec::new();
        for (i, object) in self.objects.iter().enumerate() {
            let pos = header_len as usize + meta.len() + object_table.len();
            for _ in 0..(4 - pos % 4) % 4 {
                object_table.push(0);
            }
            object_table
                .write_i64::<LittleEndian>(object.path_id)
                .unwrap();
            object_table
                .write_u32::<LittleEndian>(byte_starts[i])
                .unwrap();
            object_table
                .write_u32::<LittleEndian>(object.payload.len() as u32)
                .unwrap();
            object_table.write_i32::<LittleEndian>(i as i32).unwrap();
        }
        meta.extend_from_slice(&object_table);

        meta.write_u32::<LittleEndian>(0).unwrap(); // script types
        meta.write_u32::<LittleEndian>(0).unwrap(); // externals

        let mut data_offset = header_len + meta.len() as u32;
        data_offset += (16 - data_offset % 16) % 16;
        let file_size = data_offset as usize + data.len();

        let mut out = Vec::with_capacity(file_size);
        out.write_u32::<BigEndian>(meta.len() as u32).unwrap();
        out.write_u32::<BigEndian>(file_size as u32).unwrap();
        out.write_u32::<BigEndian>(SERIALIZED_VERSION).unwrap();
        out.write_u32::<BigEndian>(data_offset).unwrap();
        out.push(0); // little-endian metadata and object data
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&meta);
        out.resize(data_offset as usize, 0);
        out.extend_from_slice(&data);
        out
    }
}

fn push_rect_fields(tree: &mut Vec<Node>, level: u8) {
    tree.push(node(level, "float", "x"));
    tree.push(node(level, "float", "y"));
    tree.push(node(level, "float", "width"));
    tree.push(node(level, "float", "height"));
}

/// Type tree blob: node records, then the local string buffer all node
/// strings point into.
fn write_type_tree(out: &mut Vec<u8>, nodes: &[Node]) {
    let mut strings = Vec::new();
    let mut offset_of = |buffer: &mut Vec<u8>, s: &str| -> u32 {
        let bytes = s.as_bytes();
        if let Some(pos) = buffer
            .windows(bytes.len() + 1)
            .position(|w| &w[..bytes.len()] == bytes && w[bytes.len()] == 0)
        {
            return pos as u32;
        }
        let pos = buffer.len() as u32;
        buffer.extend_from_slice(bytes);
        buffer.push(0);
        pos
    };

    let mut records = Vec::new();
    for n in nodes {
        let type_offset = offset_of(&mut strings, n.type_name);
        let name_offset = offset_of(&mut strings, &n.name);
        records.write_u16::<LittleEndian>(1).unwrap();
        records.push(n.level);
        records.push(u8::from(n.type_name == "Array"));
        records.write_u32::<LittleEndian>(type_offset).unwrap();
        records.write_u32::<LittleEndian>(name_offset).unwrap();
        records.write_i32::<LittleEndian>(-1).unwrap(); // byte_size
        records.write_i32::<LittleEndian>(0).unwrap(); // index
        records.write_u32::<LittleEndian>(n.meta_flags).unwrap();
    }

    out.write_u32::<LittleEndian>(nodes.len() as u32).unwrap();
    out.write_u32::<LittleEndian>(strings.len() as u32).unwrap();
    out.extend_from_slice(&records);
    out.extend_from_slice(&strings);
}

/// Uncompressed version-6 UnityFS container with a single serialized node
fn wrap_in_bundle(serialized: &[u8]) -> Vec<u8> {
    let mut blocks_info = Vec::new();
    blocks_info.extend_from_slice(&[0u8; 16]); // storage hash
    blocks_info.write_u32::<BigEndian>(1).unwrap();
    blocks_info
        .write_u32::<BigEndian>(serialized.len() as u32)
        .unwrap();
    blocks_info
        .write_u32::<BigEndian>(serialized.len() as u32)
        .unwrap();
    blocks_info.write_u16::<BigEndian>(0).unwrap();
    blocks_info.write_u32::<BigEndian>(1).unwrap();
    blocks_info.write_u64::<BigEndian>(0).unwrap();
    blocks_info
        .write_u64::<BigEndian>(serialized.len() as u64)
        .unwrap();
    blocks_info
        .write_u32::<BigEndian>(crate::bundle::NODE_FLAG_SERIALIZED)
        .unwrap();
    blocks_info.extend_from_slice(CAB_NAME.as_bytes());
    blocks_info.push(0);

    let mut out = Vec::new();
    out.extend_from_slice(b"UnityFS\0");
    out.write_u32::<BigEndian>(6).unwrap();
    out.extend_from_slice(b"5.x.x\0");
    out.extend_from_slice(b"2019.4.22f1\0");
    let size_pos = out.len();
    out.write_u64::<BigEndian>(0).unwrap();
    out.write_u32::<BigEndian>(blocks_info.len() as u32)
        .unwrap();
    out.write_u32::<BigEndian>(blocks_info.len() as u32)
        .unwrap();
    out.write_u32::<BigEndian>(0).unwrap(); // uncompressed, info after header
    out.extend_from_slice(&blocks_info);
    out.extend_from_slice(serialized);

    let total = out.len() as u64;
    out[size_pos..size_pos + 8].copy_from_slice(&total.to_be_bytes());
    out
}

fn pad_to(buffer: &mut Vec<u8>, alignment: usize) {
    while buffer.len() % alignment != 0 {
        buffer.push(0);
    }
}

fn write_aligned_string(out: &mut Vec<u8>, value: &str) {
    out.write_i32::<LittleEndian>(value.len() as i32).unwrap();
    out.extend_from_slice(value.as_bytes());
    pad_to(out, 4);
}

fn write_rect(out: &mut Vec<u8>, width: f32, height: f32) {
    out.write_f32::<LittleEndian>(0.0).unwrap();
    out.write_f32::<LittleEndian>(0.0).unwrap();
    out.write_f32::<LittleEndian>(width).unwrap();
    out.write_f32::<LittleEndian>(height).unwrap();
}

fn write_pptr(out: &mut Vec<u8>, file_id: i32, path_id: i64) {
    out.write_i32::<LittleEndian>(file_id).unwrap();
    out.write_i64::<LittleEndian>(path_id).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Bundle;
    use crate::serialized::SerializedFile;

    #[test]
    fn test_built_bundle_parses() {
        let data = BundleBuilder::new()
            .texture(1, "tex", 1, 1, vec![0, 0, 0, 255])
            .build();

        let bundle = Bundle::parse(&data).unwrap();
        assert_eq!(bundle.nodes.len(), 1);
        assert!(bundle.nodes[0].is_serialized_file());

        let file = SerializedFile::parse(bundle.node_data(&bundle.nodes[0])).unwrap();
        assert_eq!(file.version, SERIALIZED_VERSION);
        assert!(!file.big_endian);
        assert_eq!(file.objects.len(), 1);
        assert_eq!(file.objects[0].class_id, class_ids::TEXTURE2D);
    }

    #[test]
    fn test_write_to_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game_ui_activitylistpreview");
        BundleBuilder::new()
            .named_object(1, 49, "hello")
            .write_to(&path)
            .unwrap();

        let env = crate::env::Env::load(&path).unwrap();
        assert_eq!(env.objects().count(), 1);
    }

    #[test]
    fn test_object_payload_round_trips() {
        let data = BundleBuilder::new().named_object(3, 49, "000fake").build();

        let bundle = Bundle::parse(&data).unwrap();
        let node_data = bundle.node_data(&bundle.nodes[0]);
        let file = SerializedFile::parse(node_data).unwrap();
        let object = &file.objects[0];
        assert_eq!(object.path_id, 3);

        let tree = file.object_type_tree(object).unwrap();
        let payload = file.object_data(object, node_data).unwrap();
        let value = tree.decode(payload, file.big_endian).unwrap();
        assert_eq!(
            value.get("m_Name").and_then(crate::typetree::Value::as_str),
            Some("000fake")
        );
    }
}
