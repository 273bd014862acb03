//! Packaging of a built firmware binary into the catalog layout.
//!
//! Firmware builds expose their identity through a C header:
//!
//! ```c
//! #define FIRMWARE_NAME "sensor"
//! #define FIRMWARE_VERSION_STR "1.4.0"
//! #define BOARD_VERSION_STR "v2"
//! ```
//!
//! [`package`] reads those macros and writes `<root>/<name>/<board>/<name>.bin`
//! together with its `<name>.des` descriptor.

use anyhow::{anyhow, bail, ensure, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::catalog::{BINARY_EXTENSION, DESCRIPTOR_EXTENSION};
use crate::descriptor::Descriptor;
use crate::version::encode_version;

pub const FIRMWARE_NAME: &str = "FIRMWARE_NAME";
pub const FIRMWARE_VERSION: &str = "FIRMWARE_VERSION_STR";
pub const BOARD_VERSION: &str = "BOARD_VERSION_STR";

/// Result of packaging a firmware binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackagedFirmware {
    pub name: String,
    pub version: String,
    pub board_version: String,
    pub size: u32,
    pub binary_path: PathBuf,
    pub descriptor_path: PathBuf,
}

/// Extracts `#define NAME VALUE` macros from header source.
///
/// Values are trimmed and stripped of surrounding double quotes. Macros
/// defined without a value map to `None`. Later definitions win.
pub fn extract_defines(source: &str) -> BTreeMap<String, Option<String>> {
    source.lines().filter_map(parse_define).collect()
}

fn parse_define(line: &str) -> Option<(String, Option<String>)> {
    let rest = line.trim_start().strip_prefix("#define")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();

    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let value = rest[name_len..].trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    let value = (!value.is_empty()).then(|| value.to_string());

    Some((name.to_string(), value))
}

/// Reads and scans a macro header file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_defines(header: &Path) -> Result<BTreeMap<String, Option<String>>> {
    let source = fs::read_to_string(header)
        .with_context(|| format!("reading macro header {}", header.display()))?;
    Ok(extract_defines(&source))
}

fn required_define(
    defines: &BTreeMap<String, Option<String>>,
    name: &str,
    header: &Path,
) -> Result<String> {
    defines
        .get(name)
        .cloned()
        .flatten()
        .ok_or_else(|| anyhow!("{name} missing in {}", header.display()))
}

/// Copies `binary` into the catalog under `root` and writes its descriptor,
/// then reads the descriptor back to check it decodes to what was written.
///
/// # Errors
///
/// Returns an error if a required macro is missing, the version cannot be
/// encoded, the binary is missing or empty, or any file operation fails.
pub fn package(header: &Path, binary: &Path, root: &Path) -> Result<PackagedFirmware> {
    let defines = read_defines(header)?;
    let name = required_define(&defines, FIRMWARE_NAME, header)?;
    let version = required_define(&defines, FIRMWARE_VERSION, header)?;
    let board_version = required_define(&defines, BOARD_VERSION, header)?;
    debug!(%name, %version, %board_version, "Read firmware macros");

    encode_version(&version).with_context(|| format!("{FIRMWARE_VERSION} in {}", header.display()))?;

    let metadata = fs::metadata(binary)
        .with_context(|| format!("bin file not found: {}", binary.display()))?;
    ensure!(
        metadata.len() > 0,
        "firmware bin file empty: {}",
        binary.display()
    );
    let size = u32::try_from(metadata.len())
        .with_context(|| format!("firmware bin file too large: {}", binary.display()))?;

    let target_dir = root.join(&name).join(&board_version);
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("creating {}", target_dir.display()))?;

    let binary_path = target_dir.join(format!("{name}.{BINARY_EXTENSION}"));
    fs::copy(binary, &binary_path)
        .with_context(|| format!("copying {} to {}", binary.display(), binary_path.display()))?;

    let descriptor = Descriptor::new(size, version.clone());
    let descriptor_path = target_dir.join(format!("{name}.{DESCRIPTOR_EXTENSION}"));
    fs::write(&descriptor_path, descriptor.encode())
        .with_context(|| format!("writing {}", descriptor_path.display()))?;

    let written = fs::read(&descriptor_path)
        .with_context(|| format!("reading back {}", descriptor_path.display()))?;
    if Descriptor::decode(&written)? != descriptor {
        bail!(
            "descriptor {} does not decode to what was written",
            descriptor_path.display()
        );
    }

    info!(%name, %version, %board_version, size, "Packaged firmware");

    Ok(PackagedFirmware {
        name,
        version,
        board_version,
        size,
        binary_path,
        descriptor_path,
    })
}
