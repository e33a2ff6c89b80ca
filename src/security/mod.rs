pub mod command_executor;

pub use command_executor::{CommandError, CommandOutput, ExecOptions, SafeCommandExecutor};
