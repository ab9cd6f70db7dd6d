//! HTTP+SSE transport.
//!
//! The server announces a message endpoint through an `endpoint` event on the
//! event stream. Requests are POSTed to that endpoint and responses come back
//! as `message` events, matched to their waiter by request id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{Incoming, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

type Pending = Arc<Mutex<Waiters>>;

/// Requests awaiting a response. Once `closed`, no new waiter is accepted.
#[derive(Default)]
struct Waiters {
    closed: bool,
    senders: HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>,
}

/// Connection to a tool server over HTTP with server-sent events.
///
/// Dropping the transport stops the background reader and closes the
/// event stream.
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: Url,
    pending: Pending,
    reader: JoinHandle<()>,
    request_timeout: Duration,
}

impl SseTransport {
    /// Open the event stream at `url` and wait for the message endpoint.
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self> {
        let base = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let http = reqwest::Client::new();

        let response = timeout(
            request_timeout,
            http.get(base.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| Error::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status { status, body });
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());
        let endpoint = timeout(request_timeout, wait_for_endpoint(&mut events, &base))
            .await
            .map_err(|_| Error::Handshake("no endpoint event received".into()))??;
        debug!(%endpoint, "received message endpoint");

        let pending = Pending::default();
        let reader = tokio::spawn(read_events(
            events,
            Arc::clone(&pending),
            http.clone(),
            endpoint.clone(),
            request_timeout,
        ));

        Ok(Self {
            http,
            endpoint,
            pending,
            reader,
            request_timeout,
        })
    }

    /// The endpoint requests are POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.pending.lock().await;
            if waiters.closed {
                return Err(Error::Disconnected);
            }
            waiters.senders.insert(id.clone(), tx);
        }

        match post(&self.http, &self.endpoint, &request, self.request_timeout).await {
            Ok(Some(inline)) => {
                self.pending.lock().await.senders.remove(&id);
                return Ok(inline);
            }
            Ok(None) => {}
            Err(e) => {
                self.pending.lock().await.senders.remove(&id);
                return Err(e);
            }
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                self.pending.lock().await.senders.remove(&id);
                Err(Error::Timeout)
            }
        }
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        post(&self.http, &self.endpoint, &notification, self.request_timeout).await?;
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// POST a JSON-RPC message, bounded by `limit` from send to last body byte.
///
/// Returns the response when the server answers inline instead of over the
/// event stream.
async fn post(
    http: &reqwest::Client,
    endpoint: &Url,
    body: &impl Serialize,
    limit: Duration,
) -> Result<Option<JsonRpcResponse>> {
    timeout(limit, post_unbounded(http, endpoint, body))
        .await
        .map_err(|_| Error::Timeout)?
}

async fn post_unbounded(
    http: &reqwest::Client,
    endpoint: &Url,
    body: &impl Serialize,
) -> Result<Option<JsonRpcResponse>> {
    let response = http.post(endpoint.clone()).json(body).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Status { status, body });
    }

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return Ok(None);
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    match Incoming::parse(&text) {
        Ok(Incoming::Response(response)) => Ok(Some(response)),
        _ => Ok(None),
    }
}

async fn wait_for_endpoint<S, E>(events: &mut S, base: &Url) -> Result<Url>
where
    S: Stream<Item = std::result::Result<Event, EventStreamError<E>>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(item) = events.next().await {
        let event = item.map_err(|e| Error::Handshake(e.to_string()))?;
        if event.event == "endpoint" {
            return resolve_endpoint(base, &event.data);
        }
        debug!(event = %event.event, "ignoring event before endpoint");
    }
    Err(Error::Handshake(
        "event stream closed before endpoint event".into(),
    ))
}

/// Resolve the announced endpoint against the stream URL.
///
/// The endpoint must share the stream's origin.
fn resolve_endpoint(base: &Url, data: &str) -> Result<Url> {
    let endpoint = base
        .join(data.trim())
        .map_err(|e| Error::Handshake(format!("invalid endpoint {data:?}: {e}")))?;
    if endpoint.origin() != base.origin() {
        return Err(Error::Handshake(format!(
            "endpoint {endpoint} does not match server origin"
        )));
    }
    Ok(endpoint)
}

async fn read_events<S, E>(
    mut events: S,
    pending: Pending,
    http: reqwest::Client,
    endpoint: Url,
    reply_timeout: Duration,
) where
    S: Stream<Item = std::result::Result<Event, EventStreamError<E>>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(item) = events.next().await {
        match item {
            Ok(event) if matches!(event.event.as_str(), "message" | "") => {
                if let Some(reply) = route(&event.data, &pending).await {
                    if let Err(e) = post(&http, &endpoint, &reply, reply_timeout).await {
                        warn!(error = %e, "failed to answer server request");
                    }
                }
            }
            Ok(event) => debug!(event = %event.event, "ignoring event"),
            Err(e) => {
                warn!(error = %e, "event stream failed");
                break;
            }
        }
    }

    debug!("event stream ended");
    // Dropping the senders wakes every waiter with `Disconnected`.
    let mut waiters = pending.lock().await;
    waiters.closed = true;
    waiters.senders.clear();
}

/// Dispatch one incoming message. Returns a reply when the server sent a
/// request of its own.
async fn route(data: &str, pending: &Pending) -> Option<Value> {
    match Incoming::parse(data) {
        Ok(Incoming::Response(response)) => {
            let waiter = pending.lock().await.senders.remove(&response.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => debug!(id = ?response.id, "response for unknown request"),
            }
            None
        }
        Ok(Incoming::Request { id, method }) if method == "ping" => {
            Some(json!({ "jsonrpc": "2.0", "id": id, "result": {} }))
        }
        Ok(Incoming::Request { id, method }) => {
            debug!(?id, %method, "rejecting server request");
            Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method not found: {method}") }
            }))
        }
        Ok(Incoming::Notification { method }) => {
            debug!(%method, "server notification");
            None
        }
        Err(e) => {
            warn!(error = %e, "malformed message from server");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:5001/mcp/sse").unwrap()
    }

    #[test]
    fn endpoint_resolves_relative_path() {
        let endpoint = resolve_endpoint(&base(), "/mcp/message?sessionId=abc\n").unwrap();
        assert_eq!(
            endpoint.as_str(),
            "http://localhost:5001/mcp/message?sessionId=abc"
        );
    }

    #[test]
    fn endpoint_accepts_absolute_same_origin() {
        let endpoint = resolve_endpoint(&base(), "http://localhost:5001/other").unwrap();
        assert_eq!(endpoint.path(), "/other");
    }

    #[test]
    fn endpoint_rejects_foreign_origin() {
        let err = resolve_endpoint(&base(), "http://evil.example/steal").unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
    }

    #[tokio::test]
    async fn route_wakes_matching_waiter() {
        let pending = Pending::default();
        let (tx, rx) = oneshot::channel();
        pending.lock().await.senders.insert(RequestId::Number(7), tx);

        let reply = route(r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#, &pending).await;
        assert!(reply.is_none());

        let response = rx.await.unwrap();
        assert_eq!(response.result, Some(json!({"ok": true})));
        assert!(pending.lock().await.senders.is_empty());
    }

    #[tokio::test]
    async fn route_ignores_unknown_response() {
        let pending = Pending::default();
        let (tx, _rx) = oneshot::channel();
        pending.lock().await.senders.insert(RequestId::Number(1), tx);

        route(r#"{"jsonrpc":"2.0","id":99,"result":null}"#, &pending).await;
        assert_eq!(pending.lock().await.senders.len(), 1);
    }

    #[tokio::test]
    async fn route_answers_ping_and_rejects_other_requests() {
        let pending = Pending::default();

        let pong = route(r#"{"jsonrpc":"2.0","id":"s1","method":"ping"}"#, &pending)
            .await
            .unwrap();
        assert_eq!(pong["id"], "s1");
        assert_eq!(pong["result"], json!({}));

        let rejected = route(
            r#"{"jsonrpc":"2.0","id":3,"method":"sampling/createMessage"}"#,
            &pending,
        )
        .await
        .unwrap();
        assert_eq!(rejected["error"]["code"], -32601);
    }

    /// How the local test server answers POSTs.
    #[derive(Clone, Copy)]
    enum Reply {
        /// 202, then the response as a `message` event.
        OverStream,
        /// 200 with the response as the JSON body.
        Inline,
        /// 202, then close the event stream.
        CloseStream,
        /// Read the request and never answer.
        Stall,
    }

    type SseSocket = Arc<Mutex<Option<tokio::net::TcpStream>>>;

    /// Serve the HTTP+SSE protocol on a local port, one connection per request.
    async fn serve(reply: Reply) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sse = SseSocket::default();

        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                tokio::spawn(handle(socket, reply, Arc::clone(&sse)));
            }
        });
        format!("http://{addr}/sse")
    }

    async fn handle(mut socket: tokio::net::TcpStream, reply: Reply, sse: SseSocket) {
        use tokio::io::AsyncWriteExt;

        let (head, body) = read_request(&mut socket).await;
        if head.starts_with("GET") {
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                      cache-control: no-cache\r\n\r\n\
                      event: endpoint\ndata: /message?sessionId=test\n\n",
                )
                .await
                .unwrap();
            socket.flush().await.unwrap();
            *sse.lock().await = Some(socket);
            return;
        }

        let request: Value = serde_json::from_slice(&body).unwrap();
        let response = json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": { "method": request["method"] }
        })
        .to_string();
        let accepted = "HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

        match reply {
            Reply::OverStream => {
                socket.write_all(accepted.as_bytes()).await.unwrap();
                if request.get("id").is_some() {
                    let mut guard = sse.lock().await;
                    let stream = guard.as_mut().unwrap();
                    let event = format!("event: message\ndata: {response}\n\n");
                    stream.write_all(event.as_bytes()).await.unwrap();
                    stream.flush().await.unwrap();
                }
            }
            Reply::Inline => {
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n",
                    response.len()
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(response.as_bytes()).await.unwrap();
            }
            Reply::CloseStream => {
                socket.write_all(accepted.as_bytes()).await.unwrap();
                if let Some(mut stream) = sse.lock().await.take() {
                    let _ = stream.shutdown().await;
                }
            }
            Reply::Stall => {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        }
        let _ = socket.shutdown().await;
    }

    /// Read one request head plus its `content-length` body.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> (String, Vec<u8>) {
        use tokio::io::AsyncReadExt;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request head");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buf[head_end..].to_vec();
        while body.len() < length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        (head, body)
    }

    #[tokio::test]
    async fn request_answered_over_event_stream() {
        let url = serve(Reply::OverStream).await;
        let transport = SseTransport::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(transport.endpoint().path(), "/message");
        assert_eq!(transport.endpoint().query(), Some("sessionId=test"));

        let response = transport
            .request(JsonRpcRequest::new(1, "tools/list"))
            .await
            .unwrap();
        assert_eq!(response.id, RequestId::Number(1));
        assert_eq!(response.result, Some(json!({"method": "tools/list"})));
        assert!(transport.pending.lock().await.senders.is_empty());

        transport
            .notify("notifications/initialized", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn request_answered_inline() {
        let url = serve(Reply::Inline).await;
        let transport = SseTransport::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();

        let response = transport
            .request(JsonRpcRequest::new("abc", "tools/call"))
            .await
            .unwrap();
        assert_eq!(response.id, RequestId::from("abc"));
        assert_eq!(response.result, Some(json!({"method": "tools/call"})));
        assert!(transport.pending.lock().await.senders.is_empty());
    }

    #[tokio::test]
    async fn stream_end_fails_waiters_with_disconnected() {
        let url = serve(Reply::CloseStream).await;
        let transport = SseTransport::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();

        let err = transport
            .request(JsonRpcRequest::new(1, "tools/list"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Disconnected), "got {err:?}");

        // Later requests fail fast rather than waiting out the timeout.
        let err = transport
            .request(JsonRpcRequest::new(2, "tools/list"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Disconnected), "got {err:?}");
    }

    #[tokio::test]
    async fn stalled_post_times_out() {
        let url = serve(Reply::Stall).await;
        let transport = SseTransport::connect(&url, Duration::from_millis(300))
            .await
            .unwrap();

        let err = transport
            .request(JsonRpcRequest::new(1, "tools/call"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout), "got {err:?}");
        assert!(transport.pending.lock().await.senders.is_empty());

        let err = transport
            .notify("notifications/initialized", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout), "got {err:?}");
    }
}
