use crate::error::{Result, UnityError};
use crate::reader::EndianReader;

/// Meta flag requesting 4-byte alignment after the field
const ALIGN_AFTER: u32 = 0x4000;

/// Bit marking a string offset as pointing into the shared table below
const COMMON_STRING_BIT: u32 = 0x8000_0000;

/// The string table every Unity build embeds for type trees. Node string
/// offsets with the high bit set index into this table instead of the
/// file-local buffer; the layout is fixed across versions.
const COMMON_STRINGS: &[u8] = b"AABB\0AnimationClip\0AnimationCurve\0AnimationState\0Array\0Base\0BitField\0bitset\0bool\0char\0ColorRGBA\0Component\0data\0deque\0double\0dynamic_array\0FastPropertyName\0first\0float\0Font\0GameObject\0Generic Mono\0GradientNEW\0GUID\0GUIStyle\0int\0list\0long long\0map\0Matrix4x4f\0MdFour\0MonoBehaviour\0MonoScript\0m_ByteSize\0m_Curve\0m_EditorClassIdentifier\0m_EditorHideFlags\0m_Enabled\0m_ExtensionPtr\0m_GameObject\0m_Index\0m_IsArray\0m_IsStatic\0m_MetaFlag\0m_Name\0m_ObjectHideFlags\0m_PrefabInternal\0m_PrefabParentObject\0m_Script\0m_StaticEditorFlags\0m_Type\0m_Version\0Object\0pair\0PPtr<Component>\0PPtr<GameObject>\0PPtr<Material>\0PPtr<MonoBehaviour>\0PPtr<MonoScript>\0PPtr<Object>\0PPtr<Prefab>\0PPtr<Sprite>\0PPtr<TextAsset>\0PPtr<Texture>\0PPtr<Texture2D>\0PPtr<Transform>\0Prefab\0Quaternionf\0Rectf\0RectInt\0RectOffset\0second\0set\0short\0size\0SInt16\0SInt32\0SInt64\0SInt8\0staticvector\0string\0TextAsset\0TextMesh\0Texture\0Texture2D\0Transform\0TypelessData\0UInt16\0UInt32\0UInt64\0UInt8\0unsigned int\0unsigned long long\0unsigned short\0vector\0Vector2f\0Vector3f\0Vector4f\0m_ScriptingClassIdentifier\0Gradient\0Type*\0int2_storage\0int3_storage\0BoundsInt\0m_CorrespondingSourceObject\0m_PrefabInstance\0m_PrefabAsset\0FileSize\0Hash128\0";

/// One node of a type tree, pre-order with `level` giving the nesting depth
#[derive(Debug, Clone)]
pub struct TypeTreeNode {
    pub version: u16,
    pub level: u8,
    pub type_flags: u8,
    pub type_name: String,
    pub name: String,
    pub byte_size: i32,
    pub index: i32,
    pub meta_flags: u32,
}

impl TypeTreeNode {
    fn aligns_after(&self) -> bool {
        self.meta_flags & ALIGN_AFTER != 0
    }
}

/// Per-type schema driving generic object decoding
#[derive(Debug, Clone)]
pub struct TypeTree {
    pub nodes: Vec<TypeTreeNode>,
}

impl TypeTree {
    /// Parse the blob layout used by serialized file versions 12 and later:
    /// a node record table followed by the local string buffer.
    pub fn parse(reader: &mut EndianReader, format_version: u32) -> Result<Self> {
        let node_count = reader.read_u32()? as usize;
        let string_buffer_size = reader.read_u32()? as usize;

        let mut raw = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let version = reader.read_u16()?;
            let level = reader.read_u8()?;
            let type_flags = reader.read_u8()?;
            let type_offset = reader.read_u32()?;
            let name_offset = reader.read_u32()?;
            let byte_size = reader.read_i32()?;
            let index = reader.read_i32()?;
            let meta_flags = reader.read_u32()?;
            if format_version >= 19 {
                // reference type hash
                reader.skip(8)?;
            }
            raw.push((
                version,
                level,
                type_flags,
                type_offset,
                name_offset,
                byte_size,
                index,
                meta_flags,
            ));
        }

        let string_buffer = reader.read_bytes(string_buffer_size)?;

        let mut nodes = Vec::with_capacity(node_count);
        for (version, level, type_flags, type_offset, name_offset, byte_size, index, meta_flags) in
            raw
        {
            nodes.push(TypeTreeNode {
                version,
                level,
                type_flags,
                type_name: resolve_string(string_buffer, type_offset)?,
                name: resolve_string(string_buffer, name_offset)?,
                byte_size,
                index,
                meta_flags,
            });
        }

        Ok(TypeTree { nodes })
    }

    /// Decode one object payload into a [`Value`] following this tree.
    pub fn decode(&self, data: &[u8], big_endian: bool) -> Result<Value> {
        if self.nodes.is_empty() {
            return Err(UnityError::NoTypeTree);
        }
        let mut reader = EndianReader::new(data, big_endian);
        let (value, _) = decode_node(&self.nodes, 0, &mut reader)?;
        Ok(value)
    }
}

/// Resolve a node string offset against the local buffer or the shared table
fn resolve_string(local: &[u8], offset: u32) -> Result<String> {
    let (buffer, start) = if offset & COMMON_STRING_BIT != 0 {
        (COMMON_STRINGS, (offset & !COMMON_STRING_BIT) as usize)
    } else {
        (local, offset as usize)
    };
    if start > buffer.len() {
        return Err(UnityError::InvalidFormat(format!(
            "type tree string offset {:#x} out of range",
            offset
        )));
    }
    let end = buffer[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| start + p)
        .unwrap_or(buffer.len());
    Ok(String::from_utf8_lossy(&buffer[start..end]).into_owned())
}

/// A decoded object value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Struct fields in declaration order
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Field lookup on a struct value
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|v| v as f32)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Index just past the subtree rooted at `idx`
fn subtree_end(nodes: &[TypeTreeNode], idx: usize) -> usize {
    let level = nodes[idx].level;
    let mut end = idx + 1;
    while end < nodes.len() && nodes[end].level > level {
        end += 1;
    }
    end
}

/// Decode the subtree rooted at `idx`, returning the value and the index of
/// the next sibling.
fn decode_node(
    nodes: &[TypeTreeNode],
    idx: usize,
    reader: &mut EndianReader,
) -> Result<(Value, usize)> {
    let node = &nodes[idx];
    let end = subtree_end(nodes, idx);

    let value = match node.type_name.as_str() {
        "SInt8" => Value::Int(reader.read_i8()? as i64),
        "UInt8" | "char" => Value::UInt(reader.read_u8()? as u64),
        "SInt16" | "short" => Value::Int(reader.read_i16()? as i64),
        "UInt16" | "unsigned short" => Value::UInt(reader.read_u16()? as u64),
        "int" | "SInt32" => Value::Int(reader.read_i32()? as i64),
        "unsigned int" | "UInt32" | "Type*" => Value::UInt(reader.read_u32()? as u64),
        "SInt64" | "long long" => Value::Int(reader.read_i64()?),
        "UInt64" | "unsigned long long" | "FileSize" => Value::UInt(reader.read_u64()?),
        "float" => Value::Float(reader.read_f32()? as f64),
        "double" => Value::Float(reader.read_f64()?),
        "bool" => Value::Bool(reader.read_bool()?),
        "string" => Value::String(reader.read_aligned_string()?),
        "TypelessData" => {
            let size = reader.read_i32()?;
            if size < 0 {
                return Err(UnityError::InvalidFormat(format!(
                    "negative TypelessData size: {}",
                    size
                )));
            }
            Value::Bytes(reader.read_bytes(size as usize)?.to_vec())
        }
        _ => {
            // Containers with an Array child decode as arrays; everything
            // else with children is a plain struct.
            let first_child = idx + 1;
            if first_child < end && nodes[first_child].type_name == "Array" {
                decode_array(nodes, first_child, reader)?
            } else {
                let mut fields = Vec::new();
                let mut child = first_child;
                while child < end {
                    let (value, next) = decode_node(nodes, child, reader)?;
                    fields.push((nodes[child].name.clone(), value));
                    child = next;
                }
                Value::Object(fields)
            }
        }
    };

    if node.aligns_after() {
        reader.align(4)?;
    }

    Ok((value, end))
}

/// Decode an Array node: size child, then `size` repetitions of the element
/// child's subtree.
fn decode_array(
    nodes: &[TypeTreeNode],
    array_idx: usize,
    reader: &mut EndianReader,
) -> Result<Value> {
    let array_node = &nodes[array_idx];
    let end = subtree_end(nodes, array_idx);

    // First child holds the element count, second is the element schema
    let size_idx = array_idx + 1;
    if size_idx >= end {
        return Err(UnityError::InvalidFormat(
            "Array node is missing size/data children".to_string(),
        ));
    }
    let element_idx = subtree_end(nodes, size_idx);
    if element_idx >= end {
        return Err(UnityError::InvalidFormat(
            "Array node is missing size/data children".to_string(),
        ));
    }

    let count = reader.read_i32()?;
    if count < 0 {
        return Err(UnityError::InvalidFormat(format!(
            "negative array length: {}",
            count
        )));
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (value, _) = decode_node(nodes, element_idx, reader)?;
        items.push(value);
    }

    if array_node.aligns_after() {
        reader.align(4)?;
    }

    Ok(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    fn node(level: u8, type_name: &str, name: &str, meta_flags: u32) -> TypeTreeNode {
        TypeTreeNode {
            version: 1,
            level,
            type_flags: 0,
            type_name: type_name.to_string(),
            name: name.to_string(),
            byte_size: -1,
            index: 0,
            meta_flags,
        }
    }

    /// Tree shaped like the m_Name field every named object starts with
    fn string_field_tree() -> TypeTree {
        TypeTree {
            nodes: vec![
                node(0, "Thing", "Base", 0),
                node(1, "string", "m_Name", 0x4000),
                node(2, "Array", "Array", 0),
                node(3, "int", "size", 0),
                node(3, "char", "data", 0),
                node(1, "int", "m_Value", 0),
            ],
        }
    }

    #[test]
    fn test_decode_string_and_int() {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(5).unwrap();
        data.extend_from_slice(b"hello");
        data.extend_from_slice(&[0, 0, 0]); // padding to 4
        data.write_i32::<LittleEndian>(-7).unwrap();

        let value = string_field_tree().decode(&data, false).unwrap();
        assert_eq!(value.get("m_Name").and_then(Value::as_str), Some("hello"));
        assert_eq!(value.get("m_Value").and_then(Value::as_i64), Some(-7));
    }

    #[test]
    fn test_decode_vector_of_ints() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "Thing", "Base", 0),
                node(1, "vector", "m_Ids", 0),
                node(2, "Array", "Array", 0),
                node(3, "int", "size", 0),
                node(3, "int", "data", 0),
            ],
        };

        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(3).unwrap();
        for v in [10, 20, 30] {
            data.write_i32::<LittleEndian>(v).unwrap();
        }

        let value = tree.decode(&data, false).unwrap();
        let items = value.get("m_Ids").and_then(Value::as_array).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].as_i64(), Some(30));
    }

    #[test]
    fn test_decode_nested_struct() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "Sprite", "Base", 0),
                node(1, "PPtr<Texture2D>", "texture", 0),
                node(2, "int", "m_FileID", 0),
                node(2, "SInt64", "m_PathID", 0),
            ],
        };

        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(0).unwrap();
        data.write_i64::<LittleEndian>(1234).unwrap();

        let value = tree.decode(&data, false).unwrap();
        let texture = value.get("texture").unwrap();
        assert_eq!(texture.get("m_FileID").and_then(Value::as_i32), Some(0));
        assert_eq!(texture.get("m_PathID").and_then(Value::as_i64), Some(1234));
    }

    #[test]
    fn test_typeless_data() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "Texture2D", "Base", 0),
                node(1, "TypelessData", "image data", 0x4000),
                node(2, "int", "size", 0),
                node(2, "UInt8", "data", 0),
                node(1, "int", "m_After", 0),
            ],
        };

        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(3).unwrap();
        data.extend_from_slice(&[1, 2, 3]);
        data.push(0); // alignment
        data.write_i32::<LittleEndian>(9).unwrap();

        let value = tree.decode(&data, false).unwrap();
        assert_eq!(
            value.get("image data").and_then(Value::as_bytes),
            Some(&[1u8, 2, 3][..])
        );
        assert_eq!(value.get("m_After").and_then(Value::as_i64), Some(9));
    }

    #[test]
    fn test_alignment_after_bool() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "Thing", "Base", 0),
                node(1, "bool", "m_Flag", 0x4000),
                node(1, "int", "m_Value", 0),
            ],
        };

        let data = [1u8, 0, 0, 0, 42, 0, 0, 0];
        let value = tree.decode(&data, false).unwrap();
        assert_eq!(value.get("m_Flag").and_then(Value::as_bool), Some(true));
        assert_eq!(value.get("m_Value").and_then(Value::as_i64), Some(42));
    }

    #[test]
    fn test_truncated_data_errors() {
        let data = [5u8, 0, 0, 0, b'h'];
        let result = string_field_tree().decode(&data, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_big_endian_decode() {
        let tree = TypeTree {
            nodes: vec![node(0, "Thing", "Base", 0), node(1, "int", "m_Value", 0)],
        };
        let data = [0u8, 0, 0, 42];
        let value = tree.decode(&data, true).unwrap();
        assert_eq!(value.get("m_Value").and_then(Value::as_i64), Some(42));
    }

    #[test]
    fn test_common_string_offsets() {
        assert_eq!(resolve_string(&[], 0x8000_0000).unwrap(), "AABB");
        assert_eq!(resolve_string(&[], 0x8000_0000 | 427).unwrap(), "m_Name");
        assert_eq!(resolve_string(&[], 0x8000_0000 | 222).unwrap(), "int");
        assert_eq!(resolve_string(&[], 0x8000_0000 | 840).unwrap(), "string");
        assert_eq!(
            resolve_string(&[], 0x8000_0000 | 874).unwrap(),
            "Texture2D"
        );
    }

    #[test]
    fn test_local_string_offsets() {
        let buffer = b"m_Rect\0m_Pixels\0";
        assert_eq!(resolve_string(buffer, 0).unwrap(), "m_Rect");
        assert_eq!(resolve_string(buffer, 7).unwrap(), "m_Pixels");
        assert!(resolve_string(buffer, 999).is_err());
    }
}
