use crate::router::{self, AppContext};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use pulse_core::ipc::{self, PulseRequest, PulseResponse};
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub async fn run_unix_server(
    socket_path: &str,
    ctx: AppContext,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let ctx = ctx.clone();
                tokio::spawn(handle_connection(stream, ctx));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

/// One client connection: 4-byte little-endian length prefix + MessagePack
/// body per frame, one response frame per request frame.
async fn handle_connection(stream: UnixStream, ctx: AppContext) {
    let (read, write) = stream.into_split();
    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(bytes_mut) => bytes_mut,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let response = match ipc::decode::<PulseRequest>(&bytes_mut) {
            Ok(request) => router::handle_request(request, &ctx).await,
            Err(e) => PulseResponse::err(format!("Deserialization error: {}", e)),
        };

        match ipc::encode(&response) {
            Ok(resp_bytes) => {
                if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
                    tracing::error!("Failed to send response: {}", e);
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents;
    use pulse_core::doctors::DisabledDirectory;
    use pulse_core::enhancer::DisabledEnhancer;
    use pulse_core::{KnowledgeRegistry, MessageBus, PulseConfig};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

    struct Client {
        read: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
        write: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    }

    impl Client {
        async fn roundtrip(&mut self, body: Vec<u8>) -> PulseResponse {
            self.write.send(Bytes::from(body)).await.unwrap();
            let frame = self.read.next().await.unwrap().unwrap();
            ipc::decode(&frame).unwrap()
        }
    }

    #[tokio::test]
    async fn test_socket_serves_frames_and_survives_garbage() {
        let dir = std::env::temp_dir().join(format!("pulse-ipc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let socket = dir.join("pulse.sock");
        let socket_path = socket.to_string_lossy().to_string();

        let config = Arc::new(
            PulseConfig::from_toml_str(&format!(
                "[service]\nsocket_path = \"{}\"\nlog_level = \"info\"\n[agents]\ncoordinator = \"coordinator\"\ntriage = \"triage\"\ndefault_specialist = \"cardiology\"\n",
                socket_path
            ))
            .unwrap(),
        );
        let bus = MessageBus::new();
        let (tx, _) = broadcast::channel(1);
        let coordinator = agents::spawn_agents(
            &config,
            &bus,
            &KnowledgeRegistry::load(),
            Arc::new(DisabledEnhancer),
            Arc::new(DisabledDirectory),
            &tx,
        )
        .await
        .unwrap();
        let ctx = AppContext::new(config, bus, coordinator);
        let server = tokio::spawn({
            let socket_path = socket_path.clone();
            let shutdown = tx.subscribe();
            async move { run_unix_server(&socket_path, ctx, shutdown).await }
        });

        let mut connected = None;
        for _ in 0..50 {
            if let Ok(stream) = UnixStream::connect(&socket).await {
                connected = Some(stream);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let (read, write) = connected.expect("server did not start").into_split();
        let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
        let mut client = Client {
            read: FramedRead::new(read, le_codec()),
            write: FramedWrite::new(write, le_codec()),
        };

        let pong = client.roundtrip(ipc::encode(&PulseRequest::Ping).unwrap()).await;
        assert!(pong.is_ok());

        let garbage = client.roundtrip(vec![0xc1, 0xc1, 0xc1]).await;
        assert_eq!(garbage.status, "error");
        assert!(garbage.error.unwrap().starts_with("Deserialization error"));

        let route = PulseRequest::Route {
            symptoms: "numbness and weakness".to_string(),
            age: Some(70),
        };
        let routed = client.roundtrip(ipc::encode(&route).unwrap()).await;
        assert_eq!(routed.data.unwrap()["recommended_specialty"], "neurology");

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert!(!socket.exists());
    }
}
