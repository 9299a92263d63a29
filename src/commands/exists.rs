use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Returns the number of the given keys that exist. A key mentioned multiple times is counted
/// multiple times.
///
/// Ref: <https://redis.io/docs/latest/commands/exists/>
#[derive(Debug, PartialEq)]
pub struct Exists {
    pub keys: Vec<Bytes>,
}

impl Executable for Exists {
    fn exec(self, store: &Store) -> Frame {
        let store = store.read();
        let count = self.keys.iter().filter(|key| store.exists(key)).count();

        Frame::Integer(count as i64)
    }
}

impl TryFrom<&mut CommandParser<'_>> for Exists {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser<'_>) -> Result<Self, Self::Error> {
        let keys = parser.rest()?;
        if keys.is_empty() {
            return Err(CommandParserError::EndOfStream);
        }

        Ok(Self { keys })
    }
}
