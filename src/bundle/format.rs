//! Bundle archive format and runtime bundle handle
//!
//! A bundle file is an rkyv archive of [`BundleData`] compressed with LZ4
//! (size-prepended). Objects are addressed by their path inside the bundle
//! and a kind tag.

use std::path::Path;
use std::sync::Arc;

use rkyv::{Archive, Deserialize, Serialize};

use crate::bundle::key::AssetKind;
use crate::core::{Error, Result};

/// Current version of the bundle archive format
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// One serialized object inside a bundle
#[derive(Debug, Clone, Archive, Deserialize, Serialize)]
pub struct ObjectEntry {
    /// Path of the object relative to the bundle root, `/` separated
    pub name: String,
    /// Kind tag (see [`AssetKind`])
    pub kind: String,
    /// Encoded payload
    pub data: Vec<u8>,
}

impl ObjectEntry {
    pub fn new(name: impl Into<String>, kind: AssetKind, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind: kind.as_str().to_string(),
            data,
        }
    }

    /// Whether `requested` addresses this entry: full path, file name or file
    /// stem, compared ASCII case-insensitively
    pub fn matches(&self, requested: &str) -> bool {
        if self.name.eq_ignore_ascii_case(requested) {
            return true;
        }
        let file_name = self.name.rsplit('/').next().unwrap_or(&self.name);
        if file_name.eq_ignore_ascii_case(requested) {
            return true;
        }
        Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.eq_ignore_ascii_case(requested))
    }
}

/// Serializable bundle contents
#[derive(Debug, Clone, Archive, Deserialize, Serialize)]
pub struct BundleData {
    pub version: u32,
    pub name: String,
    pub objects: Vec<ObjectEntry>,
}

impl BundleData {
    pub fn new(name: impl Into<String>, objects: Vec<ObjectEntry>) -> Self {
        Self {
            version: BUNDLE_FORMAT_VERSION,
            name: name.into(),
            objects,
        }
    }
}

/// A loaded bundle
#[derive(Debug)]
pub struct Bundle {
    name: String,
    objects: Vec<ObjectEntry>,
}

/// Shared handle to a loaded bundle
pub type BundleHandle = Arc<Bundle>;

impl Bundle {
    pub fn new(name: impl Into<String>, objects: Vec<ObjectEntry>) -> Self {
        Self {
            name: name.into(),
            objects,
        }
    }

    pub fn from_data(data: BundleData) -> Self {
        Self::new(data.name, data.objects)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find an object by name and kind
    pub fn find(&self, name: &str, kind: AssetKind) -> Option<&ObjectEntry> {
        self.objects
            .iter()
            .find(|entry| entry.kind == kind.as_str() && entry.matches(name))
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectEntry> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Serialize bundle data to bytes (uncompressed)
pub fn serialize_bundle(data: &BundleData) -> Result<Vec<u8>> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(data)
        .map_err(|e| Error::Archive(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Deserialize bundle data from bytes (uncompressed)
pub fn deserialize_bundle(bytes: &[u8]) -> Result<BundleData> {
    // rkyv validates alignment, decompressed buffers carry no guarantee
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);

    let archived = rkyv::access::<ArchivedBundleData, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Archive(e.to_string()))?;

    let data = rkyv::deserialize::<BundleData, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Archive(e.to_string()))?;

    if data.version != BUNDLE_FORMAT_VERSION {
        return Err(Error::Archive(format!(
            "unsupported bundle format version {} (expected {})",
            data.version, BUNDLE_FORMAT_VERSION
        )));
    }

    Ok(data)
}

/// Serialize and compress bundle data using LZ4
pub fn compress_bundle(data: &BundleData) -> Result<Vec<u8>> {
    let serialized = serialize_bundle(data)?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

/// Decompress and deserialize bundle data
pub fn decompress_bundle(bytes: &[u8]) -> Result<BundleData> {
    let decompressed = lz4_flex::decompress_size_prepended(bytes)
        .map_err(|e| Error::Archive(format!("LZ4 decompression failed: {e}")))?;
    deserialize_bundle(&decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BundleData {
        BundleData::new(
            "ui.bundle",
            vec![
                ObjectEntry::new("icons/logo.png", AssetKind::BYTES, vec![1, 2, 3]),
                ObjectEntry::new("strings.txt", AssetKind::TEXT, b"hello".to_vec()),
            ],
        )
    }

    #[test]
    fn test_compress_decompress_bundle() {
        let compressed = compress_bundle(&sample()).expect("compression failed");
        let data = decompress_bundle(&compressed).expect("decompression failed");

        assert_eq!(data.name, "ui.bundle");
        assert_eq!(data.objects.len(), 2);
        assert_eq!(data.objects[0].data, vec![1, 2, 3]);
        assert_eq!(data.objects[1].kind, "text");
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let result = decompress_bundle(&[0xde, 0xad, 0xbe, 0xef, 0x00]);
        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[test]
    fn test_find_matches_name_forms() {
        let bundle = Bundle::from_data(sample());

        assert!(bundle.find("icons/logo.png", AssetKind::BYTES).is_some());
        assert!(bundle.find("LOGO.png", AssetKind::BYTES).is_some());
        assert!(bundle.find("logo", AssetKind::BYTES).is_some());
        assert!(bundle.find("logo", AssetKind::TEXT).is_none());
        assert!(bundle.find("missing", AssetKind::BYTES).is_none());
        assert_eq!(bundle.len(), 2);
    }
}
