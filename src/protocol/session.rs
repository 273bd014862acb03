use tracing::{debug, warn};

use crate::catalog::{Catalog, FirmwareImage};
use crate::error::Result;
use crate::protocol::command::{Command, ReplyFormat};
use crate::protocol::frame::{self, Reply};

/// Default data block offset from which requests are answered with the checksum.
pub const DEFAULT_VERIFY_OFFSET: u32 = 0xFFFF_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Offsets at or above this value request the firmware checksum.
    pub verify_offset: u32,
    /// Whether to answer an unknown firmware selection with an `unsupported` notice.
    pub notify_unsupported: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            verify_offset: DEFAULT_VERIFY_OFFSET,
            notify_unsupported: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No firmware selected yet, or the last selection was rejected.
    Connected,
    /// A firmware and board version present in the catalog are pinned.
    Selected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Selection {
    firmware: String,
    board_version: String,
}

/// Protocol state of a single device connection.
///
/// Lives exactly as long as its connection; nothing carries over to a
/// reconnect, so a device must select a firmware again before requesting
/// data blocks.
#[derive(Debug)]
pub struct Session {
    options: SessionOptions,
    selection: Option<Selection>,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            selection: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.selection.is_some() {
            SessionState::Selected
        } else {
            SessionState::Connected
        }
    }

    /// Currently selected `(firmware, board version)`.
    pub fn selection(&self) -> Option<(&str, &str)> {
        self.selection
            .as_ref()
            .map(|s| (s.firmware.as_str(), s.board_version.as_str()))
    }

    /// Applies a command and returns the reply to send, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only if a text reply fails to serialize. The selection
    /// has already been pinned at that point, so the device may retry.
    pub fn handle(&mut self, catalog: &Catalog, command: Command) -> Result<Option<Reply>> {
        match command {
            Command::VersionInfo {
                firmware,
                board_version,
                format,
            } => self.select(catalog, firmware, board_version, format),
            Command::DataBlock { offset, length } => Ok(self.data_block(catalog, offset, length)),
        }
    }

    fn select(
        &mut self,
        catalog: &Catalog,
        firmware: String,
        board_version: String,
        format: ReplyFormat,
    ) -> Result<Option<Reply>> {
        let Some(image) = catalog.get(&firmware, &board_version) else {
            warn!(firmware = %firmware, board = %board_version, "Unsupported firmware selection");
            metrics::counter!("firmware_unsupported_selections_total").increment(1);
            self.selection = None;
            return if self.options.notify_unsupported {
                frame::unsupported().map(Some)
            } else {
                Ok(None)
            };
        };

        debug!(
            firmware = %firmware,
            board = %board_version,
            version = %image.version,
            ?format,
            "Firmware selected"
        );
        metrics::counter!(
            "firmware_selections_total",
            "firmware" => firmware.clone(),
            "board" => board_version.clone()
        )
        .increment(1);

        self.selection = Some(Selection {
            firmware,
            board_version,
        });

        match format {
            ReplyFormat::Json => frame::version_info_json(image).map(Some),
            ReplyFormat::Bin => Ok(Some(frame::version_info_bin(image))),
            ReplyFormat::Unrecognized => Ok(None),
        }
    }

    fn data_block(&self, catalog: &Catalog, offset: u32, length: u32) -> Option<Reply> {
        let Some(image) = self.selected_image(catalog) else {
            debug!(offset, length, "Data block requested without a selection, ignoring");
            return None;
        };

        if offset >= self.options.verify_offset {
            debug!(firmware = %image.name, "Checksum requested");
            metrics::counter!("firmware_verify_requests_total", "firmware" => image.name.clone())
                .increment(1);
            return Some(frame::checksum(&image.checksum));
        }

        let payload = chunk_payload(image, offset, length);
        debug!(offset, length, served = payload.len(), "Serving data block");
        metrics::counter!("firmware_chunks_served_total", "firmware" => image.name.clone())
            .increment(1);
        metrics::counter!("firmware_chunk_bytes_total", "firmware" => image.name.clone())
            .increment(payload.len() as u64);

        Some(frame::chunk(offset, payload))
    }

    fn selected_image<'c>(&self, catalog: &'c Catalog) -> Option<&'c FirmwareImage> {
        let selection = self.selection.as_ref()?;
        catalog
            .get(&selection.firmware, &selection.board_version)
            .map(|image| &**image)
    }
}

/// Up to `length` bytes from `offset`, truncated at the end of the image.
fn chunk_payload(image: &FirmwareImage, offset: u32, length: u32) -> &[u8] {
    let content = image.content.as_ref();
    let start = (offset as usize).min(content.len());
    let end = start.saturating_add(length as usize).min(content.len());
    &content[start..end]
}
