use std::{io::ErrorKind as IoErrorKind, path::Path, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::net::{UnixListener, UnixStream};
use warden_core::{ErrorKind, ReqId, Request, RequestEnvelope, Response, ResponseEnvelope, WardenError};

use crate::wire::{decode, read_frame, write_message, IpcError};

#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, req: Request) -> Response;
}

pub async fn serve_unix(path: &Path, handler: Arc<dyn RequestHandler>) -> Result<(), IpcError> {
    let listener = UnixListener::bind(path)?;

    loop {
        let (stream, _) = listener.accept().await?;
        let handler = Arc::clone(&handler);

        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, handler).await {
                tracing::debug!(error = %err, "connection handler exited with error");
            }
        });
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    handler: Arc<dyn RequestHandler>,
) -> Result<(), IpcError> {
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(IpcError::Io(err))
                if matches!(
                    err.kind(),
                    IoErrorKind::UnexpectedEof | IoErrorKind::ConnectionReset | IoErrorKind::BrokenPipe
                ) =>
            {
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        match decode::<RequestEnvelope<Request>>(&frame) {
            Ok(req) => {
                let response = handler.handle(req.body).await;
                let envelope = ResponseEnvelope { req_id: req.req_id, body: response };
                write_message(&mut stream, &envelope).await?;
            }
            Err(err) => {
                if let Some(req_id) = extract_req_id(&frame) {
                    let envelope = ResponseEnvelope {
                        req_id,
                        body: Response::Error(
                            WardenError::new(ErrorKind::InvalidRequest, "failed to decode request envelope")
                                .with_detail(err.to_string()),
                        ),
                    };
                    let _ = write_message(&mut stream, &envelope).await;
                }

                return Ok(());
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReqIdOnly {
    req_id: ReqId,
}

fn extract_req_id(frame: &[u8]) -> Option<ReqId> {
    decode::<ReqIdOnly>(frame)
        .ok()
        .map(|decoded| decoded.req_id)
}
