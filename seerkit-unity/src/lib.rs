//! Unity asset parsing for seerkit.
//!
//! Opens UnityFS bundles (and bare SerializedFiles), walks their objects
//! through type trees, and decodes Sprite/Texture2D/SpriteAtlas objects
//! into RGBA images.

pub mod bundle;
pub mod classes;
pub mod compression;
pub mod env;
pub mod error;
pub mod reader;
pub mod serialized;
pub mod typetree;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use bundle::Bundle;
pub use classes::sprite::{Sprite, SpriteAtlas};
pub use classes::texture::{save_png, Texture2D, TextureFormat};
pub use classes::{class_name, PPtr};
pub use env::{Env, ObjectRef};
pub use error::{Result, UnityError};
pub use serialized::SerializedFile;
pub use typetree::Value;
