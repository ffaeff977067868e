use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while parsing Unity files
#[derive(Debug, Error)]
pub enum UnityError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported signature: {0}")]
    UnsupportedSignature(String),

    #[error("Unsupported serialized file version: {0}")]
    UnsupportedVersion(u32),

    #[error("Unsupported compression type: {0}")]
    UnsupportedCompression(u16),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Decompressed size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Unexpected end of data at offset {offset} (needed {needed} bytes)")]
    UnexpectedEof { offset: u64, needed: usize },

    #[error("Unsupported texture format: {0}")]
    UnsupportedTextureFormat(i32),

    #[error("Missing field in object data: {0}")]
    MissingField(&'static str),

    #[error("Field has unexpected shape: {0}")]
    FieldType(&'static str),

    #[error("Object has no type tree; cannot decode")]
    NoTypeTree,

    #[error("Unresolvable reference: file {file_id}, path {path_id}")]
    DanglingReference { file_id: i32, path_id: i64 },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UnityError>;
