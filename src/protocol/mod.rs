//! Device update protocol: inbound commands, reply framing and the
//! per-connection session state machine. Transport agnostic.

pub mod command;
pub mod frame;
pub mod session;

pub use command::{Command, ReplyFormat, BINARY_COMMAND_LEN};
pub use frame::Reply;
pub use session::{Session, SessionOptions, SessionState, DEFAULT_VERIFY_OFFSET};
