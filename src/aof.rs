//! Append-only file.
//!
//! Every mutating command is appended to the file as the request frame that carried it, in the
//! exact layout a client sends: there is no header, checksum or record marker. Replaying the file
//! from the start against an empty store rebuilds the state that was acknowledged to clients.

use std::io::{self, Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures::Stream;
use thiserror::Error as ThisError;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, warn};

use crate::codec::FrameCodec;
use crate::frame::{self, Frame};

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("append-only file error: {0}")]
    Io(#[from] io::Error),
    #[error("append-only file corrupted at byte {offset}: {source}")]
    Corrupted {
        offset: u64,
        #[source]
        source: frame::Error,
    },
    #[error("append-only file is unusable after a failed write")]
    Broken,
}

/// Handle to the append-only file. Clones share the same file and lock.
#[derive(Clone)]
pub struct Aof {
    path: Arc<PathBuf>,
    file: Arc<Mutex<Writer>>,
}

struct Writer {
    file: File,
    // Set once a write or sync failed. The tail of the file is unknown from then on and any
    // further record could land after a partial one.
    broken: bool,
}

impl Aof {
    /// Opens the file for appending, creating it when missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Aof, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!("Opened append-only file {}", path.display());

        Ok(Aof {
            path: Arc::new(path),
            file: Arc::new(Mutex::new(Writer {
                file,
                broken: false,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `frame` and returns once its bytes reached stable storage.
    ///
    /// Appends from different tasks are serialized, the order of records in the file is the order
    /// in which the calls acquired the lock.
    pub async fn append(&self, frame: &Frame) -> Result<(), Error> {
        self.append_then(frame, || ()).await
    }

    /// Appends `frame` like [`Aof::append`], then runs `apply` before letting the next append in.
    ///
    /// `apply` only runs once the record is durable. Running the effect of each record under the
    /// same lock keeps the file order equal to the order in which the effects happened.
    pub async fn append_then<T>(
        &self,
        frame: &Frame,
        apply: impl FnOnce() -> T,
    ) -> Result<T, Error> {
        let bytes = frame.serialize();
        let mut writer = self.file.lock().await;

        if writer.broken {
            return Err(Error::Broken);
        }

        if let Err(e) = writer.write_durably(&bytes).await {
            error!("Failed to append to {}: {}", self.path.display(), e);
            writer.broken = true;
            return Err(e.into());
        }

        Ok(apply())
    }
}

impl Writer {
    async fn write_durably(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }
}

/// Shrinks the file at `path` to `len` bytes, dropping everything after.
pub async fn truncate(path: impl AsRef<Path>, len: u64) -> Result<(), Error> {
    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(len).await?;
    file.sync_all().await?;
    Ok(())
}

/// Offset of the first complete frame that starts at a line boundary past `offset`, if any.
///
/// A partial frame is only the trace of an interrupted append when nothing decodable follows it.
pub async fn next_frame_after(
    path: impl AsRef<Path>,
    offset: u64,
) -> Result<Option<u64>, Error> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let mut tail = Vec::new();
    file.read_to_end(&mut tail).await?;

    let found = (1..tail.len())
        .filter(|&i| tail[i] == b'*' && tail[i - 1] == b'\n')
        .find(|&i| Frame::parse(&mut Cursor::new(&tail[i..])).is_ok());

    Ok(found.map(|i| offset + i as u64))
}

/// Lazy sequence of the frames stored in an append-only file.
///
/// The stream ends at the end of the file. A partial frame at the very end, left by a crash in
/// the middle of an append, also ends the stream without an error; [`Replay::is_torn`] tells the
/// two apart afterwards. Bytes that can never form a frame are yielded as
/// [`Error::Corrupted`] and end the stream.
pub struct Replay {
    frames: FramedRead<File, FrameCodec>,
    torn: bool,
    done: bool,
}

impl Replay {
    pub async fn open(path: impl AsRef<Path>, max_frame_size: usize) -> Result<Replay, Error> {
        let file = File::open(path).await?;

        Ok(Replay {
            frames: FramedRead::new(file, FrameCodec::new(max_frame_size)),
            torn: false,
            done: false,
        })
    }

    /// Whether the stream stopped on a partial trailing frame.
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    /// Length of the prefix of the file made of complete frames read so far.
    pub fn valid_len(&self) -> u64 {
        self.frames.decoder().consumed()
    }
}

impl Stream for Replay {
    type Item = Result<Frame, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let next = ready!(Pin::new(&mut this.frames).poll_next(cx));
        let item = match next {
            Some(Ok(frame)) => return Poll::Ready(Some(Ok(frame))),
            None => None,
            Some(Err(frame::Error::Truncated)) => {
                warn!(
                    "Append-only file ends with a partial frame after byte {}",
                    this.valid_len()
                );
                this.torn = true;
                None
            }
            Some(Err(frame::Error::Io(e))) => Some(Err(Error::Io(e))),
            Some(Err(source)) => Some(Err(Error::Corrupted {
                offset: this.valid_len(),
                source,
            })),
        };

        this.done = true;
        Poll::Ready(item)
    }
}
