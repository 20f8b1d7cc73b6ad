//! Operator console on stdin.

use std::str::FromStr;

use skirmish_transport::ConnectionId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::ServerHandle;

const HELP: &str = "commands: stop | reload | lobbies | create | kick <conn-id>";

/// A parsed console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Graceful shutdown.
    Stop,
    /// Re-read the config file.
    Reload,
    /// Print every lobby with its kind and player count.
    Lobbies,
    /// Open a new private lobby.
    Create,
    /// Disconnect one connection.
    Kick(ConnectionId),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command {0:?}; {help}", help = HELP)]
pub struct UnknownCommand(String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next(), words.next()) {
            (Some("stop"), None, _) => Self::Stop,
            (Some("reload"), None, _) => Self::Reload,
            (Some("lobbies"), None, _) => Self::Lobbies,
            (Some("create"), None, _) => Self::Create,
            (Some("help"), None, _) => Self::Help,
            (Some("kick"), Some(id), None) => {
                let raw = id.strip_prefix("conn-").unwrap_or(id);
                let id = raw
                    .parse::<u64>()
                    .map_err(|_| UnknownCommand(line.trim().to_string()))?;
                Self::Kick(ConnectionId::new(id))
            }
            _ => return Err(UnknownCommand(line.trim().to_string())),
        };
        Ok(command)
    }
}

/// Reads commands from `input` until `stop` or end of input.
pub async fn run_console<R>(handle: ServerHandle, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "console read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if !execute(&handle, command).await {
                    break;
                }
            }
            Err(e) => println!("{e}"),
        }
    }
    tracing::debug!("console closed");
}

/// Runs one command. Returns `false` once the console should stop.
async fn execute(handle: &ServerHandle, command: Command) -> bool {
    match command {
        Command::Stop => {
            handle.shutdown();
            return false;
        }
        Command::Reload => match handle.reload().await {
            Ok(()) => println!("config reloaded"),
            Err(e) => println!("reload failed: {e}"),
        },
        Command::Lobbies => {
            for lobby in handle.lobbies().await {
                println!("{}\t{}\t{} players", lobby.id, lobby.kind, lobby.players);
            }
        }
        Command::Create => {
            let id = handle.create_lobby().await;
            println!("created {id}");
        }
        Command::Kick(id) => {
            if handle.kick(id, "Kicked by operator").await {
                println!("kicked {id}");
            } else {
                println!("no connection {id}");
            }
        }
        Command::Help => println!("{HELP}"),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("stop".parse::<Command>(), Ok(Command::Stop));
        assert_eq!("  reload ".parse::<Command>(), Ok(Command::Reload));
        assert_eq!("lobbies".parse::<Command>(), Ok(Command::Lobbies));
        assert_eq!("create".parse::<Command>(), Ok(Command::Create));
    }

    #[test]
    fn test_parse_kick_accepts_both_id_forms() {
        assert_eq!("kick 7".parse::<Command>(), Ok(Command::Kick(ConnectionId::new(7))));
        assert_eq!("kick conn-7".parse::<Command>(), Ok(Command::Kick(ConnectionId::new(7))));
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!("explode".parse::<Command>().is_err());
        assert!("kick".parse::<Command>().is_err());
        assert!("kick abc".parse::<Command>().is_err());
        assert!("stop now".parse::<Command>().is_err());
    }

    #[test]
    fn test_unknown_command_message_lists_commands() {
        let err = " explode ".parse::<Command>().unwrap_err();
        assert_eq!(err, UnknownCommand("explode".into()));
        assert_eq!(err.to_string(), format!("unknown command \"explode\"; {HELP}"));

        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }
}
