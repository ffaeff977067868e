use tracing::{debug, trace};

use crate::error::{Result, UnityError};
use crate::reader::EndianReader;
use crate::typetree::TypeTree;

/// Lowest and highest serialized file format versions this parser accepts.
/// The range covers Unity 2017 through 2022 era files, which is what the
/// game ships.
const MIN_VERSION: u32 = 17;
const MAX_VERSION: u32 = 22;

/// Entry of the serialized type table
#[derive(Debug, Clone)]
pub struct SerializedType {
    pub class_id: i32,
    pub is_stripped: bool,
    pub script_type_index: i16,
    pub script_id: Option<[u8; 16]>,
    pub old_type_hash: [u8; 16],
    pub type_tree: Option<TypeTree>,
}

/// Entry of the object table. `byte_start` is absolute within the file
/// (the header's data offset is already applied).
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub path_id: i64,
    pub byte_start: u64,
    pub byte_size: u32,
    pub type_index: usize,
    pub class_id: i32,
}

/// External file reference used by cross-file PPtrs
#[derive(Debug, Clone)]
pub struct External {
    pub guid: [u8; 16],
    pub kind: i32,
    pub path: String,
}

impl External {
    /// File name component used to match externals against loaded files
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A parsed SerializedFile: header fields, type table, object table, and
/// external references. Object payloads are sliced out of the original
/// file bytes on demand.
#[derive(Debug, Clone)]
pub struct SerializedFile {
    pub version: u32,
    pub big_endian: bool,
    pub unity_version: String,
    pub target_platform: u32,
    pub enable_type_tree: bool,
    pub types: Vec<SerializedType>,
    pub objects: Vec<ObjectInfo>,
    pub externals: Vec<External>,
    pub data_offset: u64,
}

impl SerializedFile {
    /// Parse a SerializedFile
    pub fn parse(data: &[u8]) -> Result<Self> {
        // The fixed header is big-endian; everything after it follows the
        // endianness flag it declares.
        let mut reader = EndianReader::new(data, true);

        let mut _metadata_size = reader.read_u32()? as u64;
        let mut file_size = reader.read_u32()? as u64;
        let version = reader.read_u32()?;
        let mut data_offset = reader.read_u32()? as u64;

        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(UnityError::UnsupportedVersion(version));
        }

        let big_endian = reader.read_bool()?;
        reader.skip(3)?; // reserved

        if version >= 22 {
            _metadata_size = reader.read_u32()? as u64;
            file_size = reader.read_i64()? as u64;
            data_offset = reader.read_i64()? as u64;
            reader.skip(8)?; // unknown
        }

        if file_size as usize != data.len() {
            trace!(
                declared = file_size,
                actual = data.len(),
                "Serialized file size field does not match buffer"
            );
        }

        reader.set_big_endian(big_endian);

        let unity_version = reader.read_cstring()?;
        let target_platform = reader.read_u32()?;
        let enable_type_tree = reader.read_bool()?;

        let type_count = reader.read_u32()?;
        let mut types = Vec::with_capacity(type_count as usize);
        for _ in 0..type_count {
            types.push(Self::read_type(&mut reader, version, enable_type_tree, false)?);
        }

        let object_count = reader.read_u32()?;
        let mut objects = Vec::with_capacity(object_count as usize);
        for _ in 0..object_count {
            reader.align(4)?;
            let path_id = reader.read_i64()?;
            let byte_start = if version >= 22 {
                reader.read_i64()? as u64
            } else {
                reader.read_u32()? as u64
            };
            let byte_size = reader.read_u32()?;
            let type_id = reader.read_i32()?;

            let type_index = usize::try_from(type_id).map_err(|_| {
                UnityError::InvalidFormat(format!("negative type index: {}", type_id))
            })?;
            let class_id = types
                .get(type_index)
                .map(|t| t.class_id)
                .ok_or_else(|| {
                    UnityError::InvalidFormat(format!(
                        "object type index {} out of range ({} types)",
                        type_index,
                        types.len()
                    ))
                })?;

            objects.push(ObjectInfo {
                path_id,
                byte_start: data_offset + byte_start,
                byte_size,
                type_index,
                class_id,
            });
        }

        // Script type table, only needed to keep the cursor in step
        let script_count = reader.read_u32()?;
        for _ in 0..script_count {
            let _file_index = reader.read_i32()?;
            reader.align(4)?;
            let _identifier = reader.read_i64()?;
        }

        let external_count = reader.read_u32()?;
        let mut externals = Vec::with_capacity(external_count as usize);
        for _ in 0..external_count {
            let _empty = reader.read_cstring()?;
            let guid = reader.read_guid()?;
            let kind = reader.read_i32()?;
            let path = reader.read_cstring()?;
            externals.push(External { guid, kind, path });
        }

        if version >= 20 {
            let ref_type_count = reader.read_u32()?;
            for _ in 0..ref_type_count {
                Self::read_type(&mut reader, version, enable_type_tree, true)?;
            }
        }

        debug!(
            version,
            unity_version = %unity_version,
            objects = objects.len(),
            types = types.len(),
            externals = externals.len(),
            "Parsed serialized file"
        );

        Ok(SerializedFile {
            version,
            big_endian,
            unity_version,
            target_platform,
            enable_type_tree,
            types,
            objects,
            externals,
            data_offset,
        })
    }

    fn read_type(
        reader: &mut EndianReader,
        version: u32,
        enable_type_tree: bool,
        is_ref_type: bool,
    ) -> Result<SerializedType> {
        let class_id = reader.read_i32()?;
        let is_stripped = reader.read_bool()?;
        let script_type_index = reader.read_i16()?;

        let needs_script_id = if is_ref_type {
            script_type_index >= 0
        } else {
            class_id == 114
        };
        let script_id = if needs_script_id {
            Some(reader.read_guid()?)
        } else {
            None
        };
        let old_type_hash = reader.read_guid()?;

        let type_tree = if enable_type_tree {
            let tree = TypeTree::parse(reader, version)?;
            if version >= 21 {
                if is_ref_type {
                    let _class_name = reader.read_cstring()?;
                    let _namespace = reader.read_cstring()?;
                    let _assembly = reader.read_cstring()?;
                } else {
                    let dependency_count = reader.read_i32()?;
                    reader.skip(dependency_count as i64 * 4)?;
                }
            }
            Some(tree)
        } else {
            None
        };

        Ok(SerializedType {
            class_id,
            is_stripped,
            script_type_index,
            script_id,
            old_type_hash,
            type_tree,
        })
    }

    /// Slice an object's payload out of the file bytes
    pub fn object_data<'a>(&self, object: &ObjectInfo, file_data: &'a [u8]) -> Result<&'a [u8]> {
        let start = object.byte_start as usize;
        let end = start + object.byte_size as usize;
        if end > file_data.len() {
            return Err(UnityError::InvalidFormat(format!(
                "object {} extends beyond file boundaries ({} > {})",
                object.path_id,
                end,
                file_data.len()
            )));
        }
        Ok(&file_data[start..end])
    }

    /// Type tree for an object, if the file carries one
    pub fn object_type_tree(&self, object: &ObjectInfo) -> Option<&TypeTree> {
        self.types
            .get(object.type_index)
            .and_then(|t| t.type_tree.as_ref())
    }
}

/// Quick structural sniff used to tell bare SerializedFiles from other data
pub fn looks_like_serialized_file(data: &[u8]) -> bool {
    if data.len() < 20 {
        return false;
    }
    let file_size = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let version = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
    let data_offset = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
    if !(5..=100).contains(&version) {
        return false;
    }
    if version >= 22 {
        // Sizes live in the extended header
        return data.len() >= 48;
    }
    file_size as usize == data.len() && (data_offset as usize) <= data.len()
}
