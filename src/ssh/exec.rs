//! Remote command execution.
//!
//! Provides non-interactive command execution with stdout/stderr capture.

use russh::client::Handle;
use russh::ChannelMsg;

use crate::client::{shell_quote, ClientError, ClientResult, CommandOutput};
use crate::ssh::client::ClientHandler;

/// Wrap a script so it runs under a plain `sh` regardless of the login shell.
pub fn wrap_command(command: &str) -> String {
    format!("sh -c {}", shell_quote(command))
}

/// Execute a command on the remote host (non-interactive).
pub async fn exec_command(
    session: &Handle<ClientHandler>,
    command: &str,
) -> ClientResult<CommandOutput> {
    let wrapped_command = wrap_command(command);

    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| ClientError::execution(format!("Failed to open channel: {}", e)))?;

    channel
        .exec(true, wrapped_command.as_bytes())
        .await
        .map_err(|e| ClientError::execution(format!("Failed to execute command: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                stdout.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                exit_code = Some(i64::from(exit_status));
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                break;
            }
            _ => {}
        }
    }

    // Exit status may arrive after EOF
    if exit_code.is_none() {
        while let Some(msg) = channel.wait().await {
            if let ChannelMsg::ExitStatus { exit_status } = msg {
                exit_code = Some(i64::from(exit_status));
                break;
            }
        }
    }

    Ok(CommandOutput::new(stdout, stderr, exit_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_command_quotes() {
        assert_eq!(wrap_command("echo hi"), "sh -c 'echo hi'");
        assert_eq!(
            wrap_command("echo 'quoted'"),
            "sh -c 'echo '\\''quoted'\\'''"
        );
    }
}
