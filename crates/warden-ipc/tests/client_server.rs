use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::time::{sleep, Duration};
use warden_core::{ErrorKind, Request, Response, SessionListEntry, WardenError};
use warden_ipc::{serve_unix, IpcError, RequestHandler, WardenClient};

struct TestHandler;

#[async_trait]
impl RequestHandler for TestHandler {
    async fn handle(&self, req: Request) -> Response {
        match req {
            Request::ListSessions {} => Response::ListSessions {
                sessions: vec![SessionListEntry {
                    session_id: warden_core::SessionId("s-1".to_string()),
                    created_at: "2026-01-01T00:00:00.000Z".to_string(),
                    action_count: 3,
                    active: true,
                }],
            },
            Request::WriteInput { .. } => {
                WardenError::new(ErrorKind::NotFound, "no such session").into()
            }
            _ => WardenError::new(ErrorKind::InvalidRequest, "unsupported in test").into(),
        }
    }
}

#[tokio::test]
async fn client_server_roundtrip() {
    let tmp = tempdir().expect("tempdir should be created");
    let socket_path = tmp.path().join("wardend.sock");

    let handler = Arc::new(TestHandler);
    let server_socket = socket_path.clone();
    let server = tokio::spawn(async move { serve_unix(&server_socket, handler).await });

    let mut client = None;
    for _ in 0..200 {
        match WardenClient::connect(&socket_path).await {
            Ok(connected) => {
                client = Some(connected);
                break;
            }
            Err(IpcError::Io(_)) => sleep(Duration::from_millis(10)).await,
            Err(err) => panic!("client should connect: {err}"),
        }
    }
    let mut client = client.expect("client should connect");

    let sessions = client.call(Request::ListSessions {}).await.expect("list-sessions should succeed");
    match sessions {
        Response::ListSessions { sessions } => {
            assert_eq!(sessions.len(), 1);
            assert_eq!(sessions[0].action_count, 3);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let missing = client
        .call(Request::WriteInput { session_id: warden_core::SessionId("missing".to_string()), data: "y\n".to_string() })
        .await
        .expect("write-input call should succeed at the transport layer");
    match missing {
        Response::Error(err) => assert_eq!(err.kind, ErrorKind::NotFound),
        other => panic!("unexpected response: {other:?}"),
    }

    server.abort();
}
