use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument};

use crate::aof::Aof;
use crate::codec::FrameCodec;
use crate::config::Config;
use crate::connection::Connection;
use crate::handler::Handler;
use crate::recovery;
use crate::store::Store;

/// Restores the store from the append-only file, then serves clients on the configured address.
pub async fn run(config: Config) -> crate::Result<()> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let store = Store::new();
    let report = recovery::restore(&store, &config.aof_path, config.max_frame_size).await?;
    info!("Recovered {} keys ({:?})", store.read().size(), report);

    let aof = Aof::open(&config.aof_path).await?;

    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
    info!("Server listening on {}", listener.local_addr()?);

    serve(listener, Handler::new(store, aof), config.max_frame_size).await
}

/// Accepts connections on `listener` forever, each one served on its own task.
pub async fn serve(
    listener: TcpListener,
    handler: Handler,
    max_frame_size: usize,
) -> crate::Result<()> {
    loop {
        let (socket, client_address) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let handler = handler.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            let codec = FrameCodec::new(max_frame_size);
            if let Err(e) = handle_connection(socket, client_address, handler, codec).await {
                error!("Connection from {} failed: {}", client_address, e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, client_address, handler, codec),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    handler: Handler,
    codec: FrameCodec,
) -> crate::Result<()> {
    let mut conn = Connection::new(stream, codec);

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address.to_string());

    while let Some(frame) = conn.read_frame().await? {
        debug!("Received frame from client: {}", frame);
        let Some(res) = handler.handle(frame).await? else {
            continue;
        };
        debug!("Sending response to client: {}", res);

        conn.write_frame(res).await?;
    }

    info!("Connection closed");
    Ok(())
}
