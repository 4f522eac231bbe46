//! SSE gateway: one long-lived `text/event-stream` response per verification
//! session, registered in the session registry so the background job can
//! reach it.

use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use actix_web::{web, HttpResponse, Responder};
use blade_verifier_core::{session_id, ProgressEvent};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::Stream;

use crate::{config::AppState, registry::SessionRegistry};

/// Query parameters of the log-stream URL. They must reconstruct the same
/// session id the verify route derived from the request body, so the id
/// derivation is shared in `blade_verifier_core::session_id`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogStreamQuery {
    pub(crate) player_name: String,
    /// Sent by the client alongside the join-key fields; informational only.
    #[serde(default)]
    pub(crate) score: Option<u32>,
    pub(crate) timestamp: u64,
}

fn json_frame<T: serde::Serialize>(value: &T) -> web::Bytes {
    match serde_json::to_string(value) {
        Ok(json) => web::Bytes::from(format!("data: {json}\n\n")),
        Err(err) => {
            tracing::error!("failed to encode sse frame: {err}");
            web::Bytes::from_static(b"data: {}\n\n")
        }
    }
}

pub(crate) fn event_frame(event: &ProgressEvent) -> web::Bytes {
    json_frame(event)
}

fn connected_frame() -> web::Bytes {
    json_frame(&serde_json::json!({
        "connected": true,
        "log": "Connected to verification log stream",
    }))
}

/// Unregisters the subscriber when the response stream is dropped, which is
/// how actix signals client disconnect. Token-scoped so a replaced stream
/// cannot tear down its successor.
struct RegistryGuard {
    registry: Arc<SessionRegistry>,
    session: String,
    token: u64,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        tracing::info!(session = %self.session, "log stream subscriber disconnected");
        self.registry.unregister(&self.session, self.token);
    }
}

/// Body stream for one subscriber: the hello frame first, then one frame per
/// published event. Ends when the sink is replaced by a newer subscriber
/// (the registry drops our sender) or when the client goes away.
struct LogStream {
    hello: Option<web::Bytes>,
    rx: UnboundedReceiver<ProgressEvent>,
    _guard: RegistryGuard,
}

impl Stream for LogStream {
    type Item = Result<web::Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(frame) = this.hello.take() {
            return Poll::Ready(Some(Ok(frame)));
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(event_frame(&event)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub(crate) async fn verification_log_stream(
    state: web::Data<AppState>,
    query: web::Query<LogStreamQuery>,
) -> impl Responder {
    let session = session_id(&query.player_name, query.timestamp);
    tracing::info!(
        session = %session,
        score = ?query.score,
        "log stream subscriber connected"
    );

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let token = state.registry.register(&session, tx);

    let stream = LogStream {
        hello: Some(connected_frame()),
        rx,
        _guard: RegistryGuard {
            registry: Arc::clone(&state.registry),
            session,
            token,
        },
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn event_frame_is_a_data_frame() {
        let frame = event_frame(&ProgressEvent::log("hello", 10));
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains(r#""log":"hello""#));
    }

    #[tokio::test]
    async fn stream_yields_hello_then_events_and_ends_when_replaced() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let token = registry.register("ann-1", tx);

        let mut stream = LogStream {
            hello: Some(connected_frame()),
            rx,
            _guard: RegistryGuard {
                registry: Arc::clone(&registry),
                session: "ann-1".to_string(),
                token,
            },
        };

        let hello = stream.next().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&hello).unwrap().contains("connected"));

        registry.publish("ann-1", ProgressEvent::log("step", 20));
        let frame = stream.next().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&frame).unwrap().contains("step"));

        // A newer subscriber takes over; our sender is dropped and the
        // stream terminates.
        let (tx2, _rx2) = tokio::sync::mpsc::unbounded_channel();
        registry.register("ann-1", tx2);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_stream_unregisters_the_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let token = registry.register("ann-1", tx);

        let stream = LogStream {
            hello: None,
            rx,
            _guard: RegistryGuard {
                registry: Arc::clone(&registry),
                session: "ann-1".to_string(),
                token,
            },
        };
        assert_eq!(registry.active_sessions(), 1);
        drop(stream);
        assert_eq!(registry.active_sessions(), 0);
    }
}
