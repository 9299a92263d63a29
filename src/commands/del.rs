use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Removes the specified keys. A key is ignored if it does not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/del/>
#[derive(Debug, PartialEq)]
pub struct Del {
    pub keys: Vec<Bytes>,
}

impl Executable for Del {
    fn exec(self, store: &Store) -> Frame {
        let mut store = store.write();
        let count = self
            .keys
            .iter()
            .filter(|key| store.remove(key).is_some())
            .count();

        Frame::Integer(count as i64)
    }
}

impl TryFrom<&mut CommandParser<'_>> for Del {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser<'_>) -> Result<Self, Self::Error> {
        let keys = parser.rest()?;
        if keys.is_empty() {
            return Err(CommandParserError::EndOfStream);
        }

        Ok(Self { keys })
    }
}
