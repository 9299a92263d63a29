use futures::TryStreamExt;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::aof::{self, Replay};
use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::frame;
use crate::store::Store;

/// Outcome of replaying an append-only file into a store.
#[derive(Debug, Default, PartialEq)]
pub struct RecoveryReport {
    /// Commands applied to the store.
    pub applied: u64,
    /// Well formed frames that don't describe a write, left out.
    pub skipped: u64,
    /// Bytes of a partial trailing frame removed from the file.
    pub truncated: u64,
}

/// Rebuilds `store` from the append-only file at `path`.
///
/// Only commands that change the store are applied, in file order. A missing file is an empty
/// log. A partial frame at the end of the file is the trace of a crash during an append: it was
/// never acknowledged, so replay stops there and the file is cut back to its last complete frame
/// so that new appends start on a frame boundary. Any other malformed byte is corruption and is
/// returned as an error.
pub async fn restore(
    store: &Store,
    path: impl AsRef<Path>,
    max_frame_size: usize,
) -> Result<RecoveryReport, aof::Error> {
    let path = path.as_ref();
    let mut report = RecoveryReport::default();

    let mut replay = match Replay::open(path, max_frame_size).await {
        Ok(replay) => replay,
        Err(aof::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            info!("No append-only file at {}, starting empty", path.display());
            return Ok(report);
        }
        Err(e) => return Err(e),
    };

    while let Some(frame) = replay.try_next().await? {
        match Command::try_from(&frame) {
            Ok(cmd) if cmd.is_write() => {
                cmd.exec(store);
                report.applied += 1;
            }
            Ok(cmd) => {
                debug!("Skipping read-only command {:?}", cmd);
                report.skipped += 1;
            }
            Err(err) => {
                warn!("Skipping logged request: {}", err);
                report.skipped += 1;
            }
        }
    }

    if replay.is_torn() {
        let valid_len = replay.valid_len();

        // A crash only ever tears the last record. A complete frame past the partial one means a
        // damaged length swallowed acknowledged records, which must not be cut away.
        if let Some(next) = aof::next_frame_after(path, valid_len).await? {
            error!(
                "Partial frame at byte {} of {} is followed by a complete frame at byte {}",
                valid_len,
                path.display(),
                next
            );
            return Err(aof::Error::Corrupted {
                offset: valid_len,
                source: frame::Error::Truncated,
            });
        }

        let file_len = tokio::fs::metadata(path).await?.len();

        warn!(
            "Truncating {} to {} bytes, dropping a partial frame of {} bytes",
            path.display(),
            valid_len,
            file_len - valid_len
        );
        aof::truncate(path, valid_len).await?;
        report.truncated = file_len - valid_len;
    }

    info!(
        "Replayed {} commands from {}",
        report.applied,
        path.display()
    );

    Ok(report)
}
