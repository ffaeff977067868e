use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

use seerkit_unity::{save_png, Env};

/// The bundle the preview sprite lives in, relative to the root
const BUNDLE_RELATIVE: &[&str] = &["DefaultPackage", "game_ui_activitylistpreview"];
const EXPORT_DIR: &str = "img";
const EXPORT_NAME: &str = "preview.png";
const NAME_PREFIX: &str = "000";

/// Export the activity-list preview sprite from the local bundle
#[derive(Args)]
pub struct ExtractPreviewCommand {
    /// Directory containing DefaultPackage/; img/ is created next to it
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

impl ExtractPreviewCommand {
    pub fn execute(&self) -> Result<()> {
        let mut config_path = self.root.clone();
        for part in BUNDLE_RELATIVE {
            config_path.push(part);
        }
        let export_dir = self.root.join(EXPORT_DIR);

        std::fs::create_dir_all(&export_dir).with_context(|| {
            format!("Failed to create export directory {}", export_dir.display())
        })?;

        let env = Env::load(&config_path)
            .with_context(|| format!("Failed to load bundle {}", config_path.display()))?;

        for obj in env.objects() {
            if obj.class_name() != "Sprite" {
                continue;
            }
            let sprite = obj
                .read_sprite()
                .with_context(|| format!("Failed to decode sprite {}", obj.path_id()))?;
            if !sprite.name.starts_with(NAME_PREFIX) {
                continue;
            }

            let image = env
                .sprite_image(&sprite)
                .with_context(|| format!("Failed to render sprite {}", sprite.name))?;
            let path = export_dir.join(EXPORT_NAME);
            save_png(&image, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!(sprite = %sprite.name, path = %path.display(), "Exported preview");
            // No break: with several matches the fixed filename keeps the
            // last one in iteration order.
        }

        Ok(())
    }
}
