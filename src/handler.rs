use tracing::debug;

use crate::aof::{self, Aof};
use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::frame::Frame;
use crate::store::Store;

/// Turns request frames into reply frames against a store and its append-only file.
///
/// Handlers are cheap to clone, every connection gets its own clone and all of them share the same
/// store and file.
#[derive(Clone)]
pub struct Handler {
    store: Store,
    aof: Aof,
}

impl Handler {
    pub fn new(store: Store, aof: Aof) -> Handler {
        Handler { store, aof }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs one request and returns the reply to send, if any.
    ///
    /// Commands that change the store are appended to the append-only file first and applied only
    /// once the append is durable, so an `Ok` reply always describes a write that survives a crash.
    /// An error means the file could not be written: nothing was applied and the request must not
    /// be acknowledged.
    pub async fn handle(&self, frame: Frame) -> Result<Option<Frame>, aof::Error> {
        // An empty request carries no command, it gets no reply.
        if matches!(&frame, Frame::Array(parts) if parts.is_empty()) {
            return Ok(None);
        }

        let cmd = match Command::try_from(&frame) {
            Ok(cmd) => cmd,
            Err(err) => {
                debug!("Rejecting request {}: {}", frame, err);
                return Ok(Some(err.into()));
            }
        };

        if !cmd.is_write() {
            return Ok(Some(cmd.exec(&self.store)));
        }

        let store = &self.store;
        let res = self.aof.append_then(&frame, || cmd.exec(store)).await?;

        Ok(Some(res))
    }
}
