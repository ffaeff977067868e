use tracing::debug;

use crate::bytes::BufferReader;
use crate::error::{Result, UpdateError};

/// One asset entry of a PackageManifest
#[derive(Debug, Clone)]
pub struct AssetInfo {
    pub asset_path: String,
    pub address: Option<String>,
    pub asset_guid: Option<String>,
    pub bundle_id: i32,
    pub depend_ids: Vec<i32>,
}

/// One bundle entry of a PackageManifest. `file_hash` is the MD5 hex digest
/// that both names the remote file and verifies its content.
#[derive(Debug, Clone)]
pub struct BundleInfo {
    pub bundle_name: String,
    pub unity_crc: u32,
    pub file_hash: String,
    pub file_crc: String,
    pub file_size: i64,
    pub is_raw_file: bool,
    pub load_method: u8,
    pub reference_ids: Vec<i32>,
}

/// Parsed YooAsset PackageManifest_*.bytes payload
#[derive(Debug, Clone)]
pub struct PackageManifest {
    pub file_version: String,
    pub enable_addressable: bool,
    pub location_to_lower: bool,
    pub include_asset_guid: bool,
    pub output_name_type: i32,
    pub package_name: String,
    pub package_version: String,
    pub assets: Vec<AssetInfo>,
    pub bundles: Vec<BundleInfo>,
}

impl PackageManifest {
    /// Parse a binary manifest. Trailing bytes after the bundle list are
    /// ignored; truncation mid-record is an error.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = BufferReader::new(data);

        r.read_u32()?; // file signature, unchecked
        let file_version = r.read_string()?;
        let enable_addressable = r.read_bool()?;
        let location_to_lower = r.read_bool()?;
        let include_asset_guid = r.read_bool()?;
        let output_name_type = r.read_i32()?;
        let package_name = r.read_string()?;
        let package_version = r.read_string()?;

        let asset_count = r.read_i32()?;
        if asset_count < 0 {
            return Err(UpdateError::Manifest(format!(
                "negative asset count {}",
                asset_count
            )));
        }
        let mut assets = Vec::with_capacity(asset_count as usize);
        for _ in 0..asset_count {
            let asset_path = r.read_string()?;
            let address = enable_addressable.then(|| r.read_string()).transpose()?;
            let asset_guid = include_asset_guid.then(|| r.read_string()).transpose()?;
            let bundle_id = r.read_i32()?;
            let depend_count = r.read_u16()?;
            let mut depend_ids = Vec::with_capacity(depend_count as usize);
            for _ in 0..depend_count {
                depend_ids.push(r.read_i32()?);
            }
            assets.push(AssetInfo {
                asset_path,
                address,
                asset_guid,
                bundle_id,
                depend_ids,
            });
        }

        let bundle_count = r.read_i32()?;
        if bundle_count < 0 {
            return Err(UpdateError::Manifest(format!(
                "negative bundle count {}",
                bundle_count
            )));
        }
        let mut bundles = Vec::with_capacity(bundle_count as usize);
        for _ in 0..bundle_count {
            let bundle_name = r.read_string()?;
            let unity_crc = r.read_u32()?;
            let file_hash = r.read_string()?;
            let file_crc = r.read_string()?;
            let file_size = r.read_i64()?;
            let is_raw_file = r.read_bool()?;
            let load_method = r.read_u8()?;
            let reference_count = r.read_u16()?;
            let mut reference_ids = Vec::with_capacity(reference_count as usize);
            for _ in 0..reference_count {
                reference_ids.push(r.read_i32()?);
            }
            bundles.push(BundleInfo {
                bundle_name,
                unity_crc,
                file_hash,
                file_crc,
                file_size,
                is_raw_file,
                load_method,
                reference_ids,
            });
        }

        debug!(
            package = %package_name,
            version = %package_version,
            assets = assets.len(),
            bundles = bundles.len(),
            "Parsed package manifest"
        );

        Ok(PackageManifest {
            file_version,
            enable_addressable,
            location_to_lower,
            include_asset_guid,
            output_name_type,
            package_name,
            package_version,
            assets,
            bundles,
        })
    }
}

/// Manifest with one asset and two bundles, addressable off. Shared by the
/// manager tests.
#[cfg(test)]
pub(crate) fn sample_manifest_bytes(version: &str) -> Vec<u8> {
    use byteorder::{LittleEndian, WriteBytesExt};

    fn put_string(out: &mut Vec<u8>, s: &str) {
        out.write_u16::<LittleEndian>(s.len() as u16).unwrap();
        out.extend_from_slice(s.as_bytes());
    }

    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(0x594F_4F21).unwrap();
    put_string(&mut out, "1.5.2"); // FileVersion
    out.push(0); // EnableAddressable
    out.push(0); // LocationToLower
    out.push(0); // IncludeAssetGUID
    out.write_i32::<LittleEndian>(1).unwrap(); // OutputNameType
    put_string(&mut out, "DefaultPackage");
    put_string(&mut out, version);

    out.write_i32::<LittleEndian>(1).unwrap();
    put_string(&mut out, "Assets/GameRes/UI/activityListPreview/0001.png");
    out.write_i32::<LittleEndian>(0).unwrap(); // BundleID
    out.write_u16::<LittleEndian>(1).unwrap();
    out.write_i32::<LittleEndian>(1).unwrap(); // depend id

    out.write_i32::<LittleEndian>(2).unwrap();
    for (name, hash) in [
        ("game_ui_activitylistpreview", "d41d8cd98f00b204e9800998ecf8427e"),
        ("game_ui_common", "0123456789abcdef0123456789abcdef"),
    ] {
        put_string(&mut out, name);
        out.write_u32::<LittleEndian>(0xAABBCCDD).unwrap();
        put_string(&mut out, hash);
        put_string(&mut out, "12345678");
        out.write_i64::<LittleEndian>(4096).unwrap();
        out.push(0); // IsRawFile
        out.push(1); // LoadMethod
        out.write_u16::<LittleEndian>(0).unwrap();
    }
    out
}
