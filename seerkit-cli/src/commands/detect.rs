use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use seerkit_unity::compression::compression_name;
use seerkit_unity::serialized::looks_like_serialized_file;
use seerkit_unity::Bundle;

use crate::ui::{success, warning};

/// Identify a file's container format
#[derive(Args)]
pub struct DetectCommand {
    /// File to analyze
    pub file: PathBuf,
}

impl DetectCommand {
    pub fn execute(&self) -> Result<()> {
        let data = std::fs::read(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;

        if data.starts_with(b"UnityFS\0") {
            match Bundle::parse(&data) {
                Ok(bundle) => {
                    success(&format!(
                        "UnityFS bundle (format {}, Unity {}, {} nodes)",
                        bundle.header.version,
                        bundle.header.unity_revision,
                        bundle.nodes.len()
                    ));
                    if let Some(block) = bundle.blocks.first() {
                        println!(
                            "  Block compression: {}",
                            compression_name(block.compression_type())
                        );
                    }
                }
                Err(err) => {
                    warning(&format!("UnityFS signature but the bundle is malformed: {}", err));
                }
            }
            return Ok(());
        }

        if looks_like_serialized_file(&data) {
            success("Unity SerializedFile (bare, no bundle container)");
            return Ok(());
        }

        warning("No supported format detected");
        let head = &data[..data.len().min(16)];
        println!("  File size: {} bytes", data.len());
        println!("  Header: {:02x?}", head);
        Ok(())
    }
}
