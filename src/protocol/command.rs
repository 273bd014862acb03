use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Length of a binary `data_block` command: offset then length, both `u32`.
pub const BINARY_COMMAND_LEN: usize = 8;

/// Format of the reply to a version info request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplyFormat {
    Json,
    #[default]
    Bin,
    /// Any other `retfmt`: the firmware is still selected but nothing is sent back.
    Unrecognized,
}

impl From<Option<String>> for ReplyFormat {
    fn from(retfmt: Option<String>) -> Self {
        match retfmt.as_deref() {
            None | Some("bin") => ReplyFormat::Bin,
            Some("json") => ReplyFormat::Json,
            Some(_) => ReplyFormat::Unrecognized,
        }
    }
}

/// A validated device command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Selects a firmware for a board version and asks for its version info.
    VersionInfo {
        firmware: String,
        board_version: String,
        format: ReplyFormat,
    },
    /// Requests `length` bytes of the selected firmware from `offset`, or its
    /// checksum when `offset` reaches the verify offset.
    DataBlock { offset: u32, length: u32 },
}

/// Text command as sent by devices, e.g.
/// `{"cmd":"ver_info","fmw":"sensor","bdv":"v2","retfmt":"json"}`.
#[derive(Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum TextCommand {
    VerInfo {
        fmw: String,
        bdv: String,
        #[serde(default)]
        retfmt: Option<String>,
    },
    DataBlock {
        #[serde(deserialize_with = "lenient_u32")]
        index: u32,
        #[serde(deserialize_with = "lenient_u32")]
        amount: u32,
    },
}

/// Devices may send `index`/`amount` either as JSON numbers or as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientU32 {
    Number(u32),
    Text(String),
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    match LenientU32::deserialize(deserializer)? {
        LenientU32::Number(value) => Ok(value),
        LenientU32::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("'{text}' is not a u32"))),
    }
}

impl From<TextCommand> for Command {
    fn from(command: TextCommand) -> Self {
        match command {
            TextCommand::VerInfo { fmw, bdv, retfmt } => Command::VersionInfo {
                firmware: fmw,
                board_version: bdv,
                format: retfmt.into(),
            },
            TextCommand::DataBlock { index, amount } => Command::DataBlock {
                offset: index,
                length: amount,
            },
        }
    }
}

impl Command {
    /// Decodes a JSON text command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCommand`] for invalid JSON, a missing or
    /// unknown `cmd`, or missing/mistyped fields.
    pub fn from_text(text: &str) -> Result<Self> {
        let command: TextCommand = serde_json::from_str(text)?;
        Ok(command.into())
    }

    /// Decodes a binary command, always a `data_block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameLength`] unless exactly 8 bytes are given.
    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        let frame: &[u8; BINARY_COMMAND_LEN] =
            bytes.try_into().map_err(|_| Error::FrameLength {
                expected: BINARY_COMMAND_LEN,
                actual: bytes.len(),
            })?;
        let (offset, length) = frame.split_at(4);

        Ok(Command::DataBlock {
            offset: u32::from_ne_bytes([offset[0], offset[1], offset[2], offset[3]]),
            length: u32::from_ne_bytes([length[0], length[1], length[2], length[3]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_version_info_with_default_format() {
        let command = Command::from_text(r#"{"cmd":"ver_info","fmw":"fmwA","bdv":"v1"}"#).unwrap();
        assert_eq!(
            command,
            Command::VersionInfo {
                firmware: "fmwA".into(),
                board_version: "v1".into(),
                format: ReplyFormat::Bin,
            }
        );
    }

    #[test]
    fn decodes_version_info_with_json_format() {
        let command =
            Command::from_text(r#"{"cmd":"ver_info","fmw":"fmwA","bdv":"v1","retfmt":"json"}"#)
                .unwrap();
        assert!(matches!(
            command,
            Command::VersionInfo {
                format: ReplyFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn unknown_reply_format_still_selects() {
        let command =
            Command::from_text(r#"{"cmd":"ver_info","fmw":"fmwA","bdv":"v1","retfmt":"xml"}"#)
                .unwrap();
        assert!(matches!(
            command,
            Command::VersionInfo {
                format: ReplyFormat::Unrecognized,
                ..
            }
        ));
    }

    #[test]
    fn accepts_numeric_strings_for_data_block_fields() {
        let command =
            Command::from_text(r#"{"cmd":"data_block","index":"512","amount":" 64 "}"#).unwrap();
        assert_eq!(
            command,
            Command::DataBlock {
                offset: 512,
                length: 64
            }
        );
    }

    #[test]
    fn decodes_text_data_block() {
        let command = Command::from_text(r#"{"cmd":"data_block","index":512,"amount":256}"#).unwrap();
        assert_eq!(
            command,
            Command::DataBlock {
                offset: 512,
                length: 256
            }
        );
    }

    #[test]
    fn ignores_unknown_fields() {
        let command =
            Command::from_text(r#"{"cmd":"data_block","index":0,"amount":1,"seq":9}"#).unwrap();
        assert_eq!(command, Command::DataBlock { offset: 0, length: 1 });
    }

    #[test]
    fn rejects_malformed_text_commands() {
        let malformed = [
            "not json",
            "{}",
            r#"{"fmw":"fmwA","bdv":"v1"}"#,
            r#"{"cmd":"reboot"}"#,
            r#"{"cmd":"ver_info","fmw":"fmwA"}"#,
            r#"{"cmd":"ver_info","fmw":"fmwA","bdv":"v1","retfmt":7}"#,
            r#"{"cmd":"data_block","index":0}"#,
            r#"{"cmd":"data_block","index":-1,"amount":4}"#,
            r#"{"cmd":"data_block","index":4294967296,"amount":4}"#,
            r#"{"cmd":"data_block","index":"-1","amount":4}"#,
            r#"{"cmd":"data_block","index":"abc","amount":4}"#,
            r#"{"cmd":"data_block","index":1.5,"amount":4}"#,
        ];
        for text in malformed {
            assert!(
                matches!(Command::from_text(text), Err(Error::MalformedCommand(_))),
                "expected {text} to be rejected"
            );
        }
    }

    #[test]
    fn decodes_binary_data_block() {
        let mut frame = 4096u32.to_ne_bytes().to_vec();
        frame.extend_from_slice(&128u32.to_ne_bytes());

        assert_eq!(
            Command::from_binary(&frame).unwrap(),
            Command::DataBlock {
                offset: 4096,
                length: 128
            }
        );
    }

    #[test]
    fn rejects_binary_commands_of_wrong_length() {
        for len in [0, 4, 7, 9, 16] {
            let frame = vec![0u8; len];
            assert!(matches!(
                Command::from_binary(&frame),
                Err(Error::FrameLength { actual, .. }) if actual == len
            ));
        }
    }
}
