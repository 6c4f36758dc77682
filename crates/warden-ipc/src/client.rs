use std::{path::Path, time::Duration};

use tokio::{net::UnixStream, time::timeout};
use warden_core::{ReqId, Request, RequestEnvelope, Response, ResponseEnvelope};

use crate::wire::{read_message, write_message, IpcError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stateful UNIX socket client for request/response dispatcher IPC.
pub struct WardenClient {
    /// Connected socket stream.
    stream: UnixStream,
    /// Next request id to assign.
    next_req_id: u64,
    /// Per-call timeout.
    timeout: Duration,
}

impl WardenClient {
    /// Connects a client to the daemon socket path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream,
            next_req_id: 1,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Overrides the default call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends one request and waits for the matching response.
    pub async fn call(&mut self, req: Request) -> Result<Response, IpcError> {
        let req_id = ReqId(self.next_req_id);
        self.next_req_id = self.next_req_id.saturating_add(1);

        let envelope = RequestEnvelope { req_id, body: req };

        let response = timeout(self.timeout, async {
            write_message(&mut self.stream, &envelope).await?;
            read_message::<_, ResponseEnvelope<Response>>(&mut self.stream).await
        })
        .await
        .map_err(|_| IpcError::Timeout)??;

        if response.req_id != req_id {
            return Err(IpcError::RequestIdMismatch {
                expected: req_id.0,
                actual: response.req_id.0,
            });
        }

        Ok(response.body)
    }
}
