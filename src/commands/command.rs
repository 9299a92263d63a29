use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Command introspection (`COMMAND`, `COMMAND DOCS`, ...). Clients send it on connect; the server
/// doesn't document its commands and always replies with an empty array.
#[derive(Debug, PartialEq)]
pub struct Command {}

impl Executable for Command {
    fn exec(self, _store: &Store) -> Frame {
        Frame::Array(vec![])
    }
}

impl TryFrom<&mut CommandParser<'_>> for Command {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser<'_>) -> Result<Self, Self::Error> {
        // Subcommands and their arguments are accepted and ignored.
        parser.rest()?;
        Ok(Self {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command as Cmd;

    #[test]
    fn docs() {
        let cmd = Cmd::try_from(&Frame::request(["COMMAND", "DOCS"])).unwrap();

        assert_eq!(cmd.exec(&Store::new()).serialize(), b"*0\r\n");
    }
}
