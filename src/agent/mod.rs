//! Agent session process and its stream-json protocol.

pub mod process;
pub mod protocol;

pub use process::{AgentCommand, AgentLauncher, AgentOptions, AgentOutput, AgentStream, ProcessExit, ProcessLauncher};
pub use protocol::{ContentBlock, MessageKind, ResultMessage, ResultSubtype, StreamMessage, Usage, parse_line};
