pub mod command;
pub mod del;
pub mod executable;
pub mod exists;
pub mod get;
pub mod ping;
pub mod set;

use bytes::Bytes;
use std::slice;
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;

use command::Command as Command_;
use del::Del;
use exists::Exists;
use get::Get;
use ping::Ping;
use set::Set;

#[derive(Debug, PartialEq)]
pub enum Command {
    Del(Del),
    Exists(Exists),
    Get(Get),
    Set(Set),

    Command(Command_),
    Ping(Ping),
}

impl Command {
    /// Whether the command changes the store, and so has to reach the append-only file before it
    /// is applied.
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Del(_) | Command::Set(_))
    }
}

impl Executable for Command {
    fn exec(self, store: &Store) -> Frame {
        match self {
            Command::Command(cmd) => cmd.exec(store),
            Command::Del(cmd) => cmd.exec(store),
            Command::Exists(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::Ping(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
        }
    }
}

impl TryFrom<&Frame> for Command {
    type Error = CommandParserError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the server as arrays of bulk strings.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame.clone(),
                })
            }
        };

        let mut parser = CommandParser {
            parts: frames.iter(),
        };

        // Command names are matched case-insensitively, the same way on the wire and on replay.
        let command_name = parser.parse_command_name()?;

        let command = match &command_name[..] {
            "command" => Command_::try_from(&mut parser).map(Command::Command),
            "del" => Del::try_from(&mut parser).map(Command::Del),
            "exists" => Exists::try_from(&mut parser).map(Command::Exists),
            "get" => Get::try_from(&mut parser).map(Command::Get),
            "ping" => Ping::try_from(&mut parser).map(Command::Ping),
            "set" => Set::try_from(&mut parser).map(Command::Set),
            _ => {
                return Err(CommandParserError::UnknownCommand {
                    command: command_name,
                })
            }
        };

        command
            .and_then(|command| parser.finish().map(|_| command))
            .map_err(|err| match err {
                CommandParserError::EndOfStream | CommandParserError::TooManyArguments => {
                    CommandParserError::WrongNumberOfArguments {
                        command: command_name,
                    }
                }
                err => err,
            })
    }
}

/// Reads the arguments of a request without copying their payloads.
pub struct CommandParser<'a> {
    parts: slice::Iter<'a, Frame>,
}

impl CommandParser<'_> {
    fn parse_command_name(&mut self) -> Result<String, CommandParserError> {
        let command_name = self.next_bytes()?;

        Ok(String::from_utf8_lossy(&command_name).to_lowercase())
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self
            .parts
            .next()
            .ok_or(CommandParserError::EndOfStream)?;

        match frame {
            // Both `Simple` and `Bulk` representation may be strings. While errors are stored as
            // strings, they are considered separate types.
            Frame::Simple(s) => Ok(Bytes::from(s.clone())),
            Frame::Bulk(bytes) => Ok(bytes.clone()),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame.clone(),
            }),
        }
    }

    /// Consumes every remaining argument.
    fn rest(&mut self) -> Result<Vec<Bytes>, CommandParserError> {
        let mut parts = Vec::with_capacity(self.parts.len());
        while self.parts.len() > 0 {
            parts.push(self.next_bytes()?);
        }
        Ok(parts)
    }

    fn finish(&mut self) -> Result<(), CommandParserError> {
        if self.parts.len() > 0 {
            return Err(CommandParserError::TooManyArguments);
        }
        Ok(())
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("wrong number of arguments for '{command}' command")]
    WrongNumberOfArguments { command: String },
    #[error("protocol error; attempting to extract a value failed due to the frame being fully consumed")]
    EndOfStream,
    #[error("protocol error; the frame has more arguments than the command takes")]
    TooManyArguments,
}

impl From<CommandParserError> for Frame {
    fn from(err: CommandParserError) -> Frame {
        match err {
            // Unknown commands get the bare generic error.
            CommandParserError::UnknownCommand { .. } => Frame::Error("ERR".to_string()),
            err => Frame::Error(format!("ERR {}", err)),
        }
    }
}
