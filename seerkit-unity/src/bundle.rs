use tracing::{debug, trace};

use crate::compression::decompress_block;
use crate::error::{Result, UnityError};
use crate::reader::EndianReader;

const COMPRESSION_MASK: u32 = 0x3F;
const BLOCKS_INFO_AT_END: u32 = 0x80;
const BLOCK_INFO_NEED_PADDING: u32 = 0x200;

/// Node flag marking the entry as a SerializedFile rather than a resource blob
pub const NODE_FLAG_SERIALIZED: u32 = 0x4;

/// UnityFS bundle header
#[derive(Debug, Clone)]
pub struct BundleHeader {
    pub signature: String,
    pub version: u32,
    pub unity_version: String,
    pub unity_revision: String,
    pub size: u64,
    pub compressed_blocks_info_size: u32,
    pub uncompressed_blocks_info_size: u32,
    pub flags: u32,
}

/// Information about a compressed block in the bundle
#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: u16,
}

impl BlockInfo {
    pub fn compression_type(&self) -> u16 {
        self.flags & COMPRESSION_MASK as u16
    }
}

/// A named file inside the bundle, addressed into the decompressed storage
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
    pub path: String,
}

impl NodeInfo {
    pub fn is_serialized_file(&self) -> bool {
        self.flags & NODE_FLAG_SERIALIZED != 0
    }
}

/// A parsed UnityFS bundle: header, directory nodes, and the concatenated
/// decompressed block storage the nodes index into.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub header: BundleHeader,
    pub blocks: Vec<BlockInfo>,
    pub nodes: Vec<NodeInfo>,
    storage: Vec<u8>,
}

impl Bundle {
    /// Parse a UnityFS bundle
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = EndianReader::new(data, true);

        let signature = reader.read_cstring()?;
        if signature != "UnityFS" {
            return Err(UnityError::UnsupportedSignature(signature));
        }

        let version = reader.read_u32()?;
        let unity_version = reader.read_cstring()?;
        let unity_revision = reader.read_cstring()?;
        let size = reader.read_u64()?;
        let compressed_blocks_info_size = reader.read_u32()?;
        let uncompressed_blocks_info_size = reader.read_u32()?;
        let flags = reader.read_u32()?;

        debug!(
            version,
            unity_version = %unity_version,
            flags = format_args!("{:#x}", flags),
            "Parsed UnityFS header"
        );

        if version >= 7 {
            reader.align(16)?;
        }

        // BlocksInfo either follows the header or sits at the end of the file
        let blocks_info_raw = if flags & BLOCKS_INFO_AT_END != 0 {
            let start = data
                .len()
                .checked_sub(compressed_blocks_info_size as usize)
                .ok_or_else(|| {
                    UnityError::InvalidFormat("BlocksInfo size exceeds file size".to_string())
                })?;
            data[start..].to_vec()
        } else {
            reader.read_bytes(compressed_blocks_info_size as usize)?.to_vec()
        };

        let blocks_info_compression = (flags & COMPRESSION_MASK) as u16;
        let blocks_info = decompress_block(
            &blocks_info_raw,
            blocks_info_compression,
            uncompressed_blocks_info_size as usize,
        )?;

        let (blocks, nodes) = Self::parse_blocks_info(&blocks_info)?;

        if flags & BLOCK_INFO_NEED_PADDING != 0 {
            reader.align(16)?;
        }

        // Decompress every block into one contiguous storage buffer
        let total_size: usize = blocks.iter().map(|b| b.uncompressed_size as usize).sum();
        let mut storage = Vec::with_capacity(total_size);
        for block in &blocks {
            let compressed = reader.read_bytes(block.compressed_size as usize)?;
            let decompressed = decompress_block(
                compressed,
                block.compression_type(),
                block.uncompressed_size as usize,
            )?;
            storage.extend_from_slice(&decompressed);
        }

        trace!(
            blocks = blocks.len(),
            nodes = nodes.len(),
            storage_size = storage.len(),
            "Decompressed bundle storage"
        );

        for node in &nodes {
            let end = node.offset.checked_add(node.size).ok_or_else(|| {
                UnityError::InvalidFormat(format!("node {} offset overflow", node.path))
            })?;
            if end > storage.len() as u64 {
                return Err(UnityError::InvalidFormat(format!(
                    "node {} extends beyond storage ({} > {})",
                    node.path,
                    end,
                    storage.len()
                )));
            }
        }

        Ok(Bundle {
            header: BundleHeader {
                signature,
                version,
                unity_version,
                unity_revision,
                size,
                compressed_blocks_info_size,
                uncompressed_blocks_info_size,
                flags,
            },
            blocks,
            nodes,
            storage,
        })
    }

    /// Parse the decompressed BlocksInfo blob: storage hash, block table,
    /// node table.
    fn parse_blocks_info(data: &[u8]) -> Result<(Vec<BlockInfo>, Vec<NodeInfo>)> {
        let mut reader = EndianReader::new(data, true);

        // 16-byte hash of the uncompressed storage, unused here
        reader.skip(16)?;

        let block_count = reader.read_u32()?;
        let mut blocks = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            let uncompressed_size = reader.read_u32()?;
            let compressed_size = reader.read_u32()?;
            let flags = reader.read_u16()?;
            blocks.push(BlockInfo {
                uncompressed_size,
                compressed_size,
                flags,
            });
        }

        let node_count = reader.read_u32()?;
        let mut nodes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            let offset = reader.read_u64()?;
            let size = reader.read_u64()?;
            let flags = reader.read_u32()?;
            let path = reader.read_cstring()?;
            nodes.push(NodeInfo {
                offset,
                size,
                flags,
                path,
            });
        }

        Ok((blocks, nodes))
    }

    /// File content of a directory node
    pub fn node_data(&self, node: &NodeInfo) -> &[u8] {
        &self.storage[node.offset as usize..(node.offset + node.size) as usize]
    }

    /// Look up a node by its path
    pub fn node_by_path(&self, path: &str) -> Option<&NodeInfo> {
        self.nodes.iter().find(|n| n.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    /// Build a minimal version-6 bundle holding the given nodes uncompressed.
    fn build_bundle(nodes: &[(&str, u32, &[u8])]) -> Vec<u8> {
        let mut storage = Vec::new();
        let mut node_entries = Vec::new();
        for (path, flags, content) in nodes {
            node_entries.push((storage.len() as u64, content.len() as u64, *flags, *path));
            storage.extend_from_slice(content);
        }

        let mut blocks_info = Vec::new();
        blocks_info.extend_from_slice(&[0u8; 16]);
        blocks_info.write_u32::<BigEndian>(1).unwrap();
        blocks_info
            .write_u32::<BigEndian>(storage.len() as u32)
            .unwrap();
        blocks_info
            .write_u32::<BigEndian>(storage.len() as u32)
            .unwrap();
        blocks_info.write_u16::<BigEndian>(0).unwrap();
        blocks_info
            .write_u32::<BigEndian>(node_entries.len() as u32)
            .unwrap();
        for (offset, size, flags, path) in &node_entries {
            blocks_info.write_u64::<BigEndian>(*offset).unwrap();
            blocks_info.write_u64::<BigEndian>(*size).unwrap();
            blocks_info.write_u32::<BigEndian>(*flags).unwrap();
            blocks_info.extend_from_slice(path.as_bytes());
            blocks_info.push(0);
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"UnityFS\0");
        out.write_u32::<BigEndian>(6).unwrap();
        out.extend_from_slice(b"5.x.x\0");
        out.extend_from_slice(b"2019.4.0f1\0");
        let size_pos = out.len();
        out.write_u64::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(blocks_info.len() as u32)
            .unwrap();
        out.write_u32::<BigEndian>(blocks_info.len() as u32)
            .unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.extend_from_slice(&blocks_info);
        out.extend_from_slice(&storage);

        let total = out.len() as u64;
        out[size_pos..size_pos + 8].copy_from_slice(&total.to_be_bytes());
        out
    }

    #[test]
    fn test_parse_minimal_bundle() {
        let data = build_bundle(&[
            ("CAB-test", NODE_FLAG_SERIALIZED, b"serialized bytes"),
            ("CAB-test.resS", 0, b"resource bytes"),
        ]);

        let bundle = Bundle::parse(&data).unwrap();
        assert_eq!(bundle.header.signature, "UnityFS");
        assert_eq!(bundle.header.version, 6);
        assert_eq!(bundle.nodes.len(), 2);
        assert!(bundle.nodes[0].is_serialized_file());
        assert!(!bundle.nodes[1].is_serialized_file());
        assert_eq!(bundle.node_data(&bundle.nodes[0]), b"serialized bytes");
        assert_eq!(bundle.node_data(&bundle.nodes[1]), b"resource bytes");
    }

    #[test]
    fn test_node_lookup_by_path() {
        let data = build_bundle(&[("CAB-test", 0, b"x"), ("CAB-test.resS", 0, b"y")]);
        let bundle = Bundle::parse(&data).unwrap();
        assert!(bundle.node_by_path("CAB-test.resS").is_some());
        assert!(bundle.node_by_path("missing").is_none());
    }

    #[test]
    fn test_rejects_wrong_signature() {
        let data = b"UnityWeb\0rest of header";
        let result = Bundle::parse(data);
        assert!(matches!(
            result,
            Err(UnityError::UnsupportedSignature(_))
        ));
    }
}
