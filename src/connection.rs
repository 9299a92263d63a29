use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::{self, Frame};

pub struct Connection {
    pub id: Uuid,
    // Data read from the socket is buffered by the codec until a whole frame is available, the
    // frame's bytes are then removed from the buffer.
    frames: Framed<TcpStream, FrameCodec>,
}

impl Connection {
    pub fn new(stream: TcpStream, codec: FrameCodec) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            frames: Framed::new(stream, codec),
        }
    }

    /// Reads the next request frame. `None` means the peer closed the connection between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, frame::Error> {
        self.frames.next().await.transpose()
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), frame::Error> {
        self.frames.send(frame).await
    }
}
