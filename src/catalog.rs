//! Firmware catalog built once at startup from the firmware directory.
//!
//! Layout: `<root>/<firmware name>/<board version>/` holding exactly one
//! `.des` descriptor and one `.bin` image.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::checksum::{self, Digest};
use crate::descriptor::{Descriptor, WireDescriptor};
use crate::error::{Error, Result};
use crate::version::encode_version;

pub const DESCRIPTOR_EXTENSION: &str = "des";
pub const BINARY_EXTENSION: &str = "bin";

#[derive(Clone, Debug)]
pub struct FirmwareImage {
    pub name: String,
    pub board_version: String,
    pub version: String,
    pub version_int: u32,
    pub size: u32,
    pub content: Bytes,
    pub checksum: Digest,
}

impl FirmwareImage {
    /// Builds an image, deriving its encoded version, size and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be encoded or the content is
    /// larger than `u32::MAX` bytes.
    pub fn new(
        name: impl Into<String>,
        board_version: impl Into<String>,
        version: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Result<Self> {
        let version = version.into();
        let content = content.into();
        let size = u32::try_from(content.len()).map_err(|_| {
            Error::Integrity(format!("image of {} bytes exceeds 32 bits", content.len()))
        })?;

        Ok(Self {
            name: name.into(),
            board_version: board_version.into(),
            version_int: encode_version(&version)?,
            version,
            size,
            checksum: checksum::compute(&content),
            content,
        })
    }

    pub fn wire_descriptor(&self) -> WireDescriptor {
        WireDescriptor {
            version: self.version_int,
            size: self.size,
        }
    }
}

/// Immutable index of firmware images keyed by firmware name, then board version.
#[derive(Debug, Default)]
pub struct Catalog {
    firmwares: BTreeMap<String, BTreeMap<String, Arc<FirmwareImage>>>,
}

impl Catalog {
    /// Scans `root` and loads every firmware image into memory.
    ///
    /// Directory entries are visited in sorted order. Any missing, duplicate,
    /// corrupt or mismatched file aborts the whole build.
    ///
    /// # Errors
    ///
    /// - [`Error::Startup`] if the root is missing or a board directory lacks
    ///   (or has several) descriptor or binary files.
    /// - [`Error::CorruptDescriptor`] / [`Error::Format`] if a descriptor
    ///   cannot be decoded.
    /// - [`Error::Integrity`] if a binary is empty or its length differs from
    ///   the descriptor size.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::Startup(format!(
                "firmware folder not found: {}",
                root.display()
            )));
        }

        let mut images = Vec::new();
        for firmware_dir in sorted_subdirectories(root)? {
            let firmware_name = dir_name(&firmware_dir)?;
            for board_dir in sorted_subdirectories(&firmware_dir)? {
                let board_version = dir_name(&board_dir)?;
                let image = load_image(&firmware_name, &board_version, &board_dir)?;
                info!(
                    firmware = %image.name,
                    board = %image.board_version,
                    version = %image.version,
                    version_int = image.version_int,
                    size = image.size,
                    "Loaded firmware image"
                );
                images.push(image);
            }
        }

        let catalog: Self = images.into_iter().collect();
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("firmware_catalog_entries").set(catalog.len() as f64);
        Ok(catalog)
    }

    pub fn get(&self, firmware: &str, board_version: &str) -> Option<&Arc<FirmwareImage>> {
        self.firmwares.get(firmware)?.get(board_version)
    }

    /// Number of images across all firmwares and board versions.
    pub fn len(&self) -> usize {
        self.firmwares.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FirmwareImage>> {
        self.firmwares.values().flat_map(BTreeMap::values)
    }

    /// Size of the largest image, `None` when the catalog is empty.
    pub fn largest_image_size(&self) -> Option<u32> {
        self.iter().map(|image| image.size).max()
    }
}

impl FromIterator<FirmwareImage> for Catalog {
    fn from_iter<I: IntoIterator<Item = FirmwareImage>>(iter: I) -> Self {
        let mut firmwares: BTreeMap<String, BTreeMap<String, Arc<FirmwareImage>>> = BTreeMap::new();
        for image in iter {
            firmwares
                .entry(image.name.clone())
                .or_default()
                .insert(image.board_version.clone(), Arc::new(image));
        }
        Self { firmwares }
    }
}

fn load_image(firmware_name: &str, board_version: &str, dir: &Path) -> Result<FirmwareImage> {
    let (descriptor_path, binary_path) = find_image_files(dir)?;
    debug!(
        descriptor = %descriptor_path.display(),
        binary = %binary_path.display(),
        "Reading firmware files"
    );

    let raw_descriptor = fs::read(&descriptor_path).map_err(|e| Error::io(&descriptor_path, e))?;
    let descriptor = Descriptor::decode(&raw_descriptor).map_err(|e| match e {
        Error::CorruptDescriptor(reason) => {
            Error::CorruptDescriptor(format!("{}: {reason}", descriptor_path.display()))
        }
        other => other,
    })?;

    let content = fs::read(&binary_path).map_err(|e| Error::io(&binary_path, e))?;
    if content.is_empty() {
        return Err(Error::Integrity(format!(
            "firmware file empty: {}",
            binary_path.display()
        )));
    }
    if content.len() != descriptor.size as usize {
        return Err(Error::Integrity(format!(
            "firmware file {} is {} bytes but its descriptor declares {}",
            binary_path.display(),
            content.len(),
            descriptor.size
        )));
    }

    FirmwareImage::new(firmware_name, board_version, descriptor.version, content)
}

/// Picks the single descriptor and single binary file out of a board directory.
fn find_image_files(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let mut descriptor = None;
    let mut binary = None;

    for path in sorted_entries(dir)? {
        if !path.is_file() {
            continue;
        }
        let slot = match path.extension().and_then(OsStr::to_str) {
            Some(DESCRIPTOR_EXTENSION) => &mut descriptor,
            Some(BINARY_EXTENSION) => &mut binary,
            _ => continue,
        };
        if let Some(existing) = slot.replace(path.clone()) {
            return Err(Error::Startup(format!(
                "ambiguous firmware files in {}: {} and {}",
                dir.display(),
                existing.display(),
                path.display()
            )));
        }
    }

    let descriptor = descriptor.ok_or_else(|| {
        Error::Startup(format!("description file not found in {}", dir.display()))
    })?;
    let binary = binary
        .ok_or_else(|| Error::Startup(format!("firmware file not found in {}", dir.display())))?;

    Ok((descriptor, binary))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(dir, e))?;
    paths.sort();
    Ok(paths)
}

fn sorted_subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|path| path.is_dir())
        .collect())
}

fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(OsStr::to_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Startup(format!("invalid directory name: {}", path.display())))
}
