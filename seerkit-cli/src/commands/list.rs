use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::path::PathBuf;

use seerkit_unity::Env;

use crate::ui::format_file_size;

/// List the objects inside a bundle
#[derive(Args)]
pub struct ListCommand {
    /// Bundle or serialized file to inspect
    pub bundle: PathBuf,

    /// Only show objects of this class (e.g. Sprite, Texture2D)
    #[arg(long)]
    pub filter: Option<String>,
}

impl ListCommand {
    pub fn execute(&self) -> Result<()> {
        let env = Env::load(&self.bundle)
            .with_context(|| format!("Failed to load {}", self.bundle.display()))?;

        let mut shown = 0usize;
        let mut total = 0usize;
        for obj in env.objects() {
            total += 1;
            let class = obj.class_name();
            if let Some(filter) = &self.filter {
                if !class.eq_ignore_ascii_case(filter) {
                    continue;
                }
            }
            shown += 1;

            let name = obj.name().unwrap_or_default();
            println!(
                "{:>14} {:>20} {:>10}  {}",
                class.bright_cyan(),
                obj.path_id(),
                format_file_size(obj.byte_size() as u64),
                name
            );
        }

        println!();
        if self.filter.is_some() {
            println!("{} of {} objects", shown, total);
        } else {
            println!("{} objects", total);
        }
        Ok(())
    }
}
