//! JSON-RPC client plumbing.
//!
//! [`RpcClient`] owns the connection to one analysis-service process:
//! background reader and writer threads bridge the framed wire format to
//! `mpsc` channels, request ids are allocated strictly increasing, and
//! [`RpcClient::wait_for_response`] answers common server-to-client requests
//! while blocking so servers cannot deadlock the caller.
//!
//! The client is generic over its streams: production code connects to a
//! spawned process's stdio, tests connect to in-memory pipes.

use crate::error::SessionError;
use crate::transport::{read_message, write_message};
use serde_json::Value;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A message received from the server, or a transport failure.
#[derive(Debug)]
pub enum Inbound {
    /// A decoded JSON-RPC message.
    Message(Value),
    /// An I/O error raised by a background thread; the connection is dead.
    Io(String),
}

/// Correlated JSON-RPC client over a framed byte stream.
pub struct RpcClient {
    _child: Option<Child>,
    tx: mpsc::Sender<Value>,
    rx: mpsc::Receiver<Inbound>,
    next_id: u64,
}

impl RpcClient {
    /// Spawn `cmd` with piped stdio and connect to it.
    pub fn spawn(mut cmd: Command) -> Result<Self, SessionError> {
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Io(io::Error::other("no stdin pipe")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Io(io::Error::other("no stdout pipe")))?;
        let mut client = Self::from_streams(stdout, stdin);
        client._child = Some(child);
        Ok(client)
    }

    /// Connect over arbitrary streams (used by tests to drive a scripted
    /// server over in-memory pipes).
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx_out, rx_out) = mpsc::channel::<Value>();
        let (tx_in, rx_in) = mpsc::channel::<Inbound>();

        {
            let tx_in = tx_in.clone();
            thread::spawn(move || write_loop(writer, rx_out, tx_in));
        }
        thread::spawn(move || read_loop(reader, tx_in));

        Self {
            _child: None,
            tx: tx_out,
            rx: rx_in,
            next_id: 1,
        }
    }

    /// Send a notification (no id, no response).
    pub fn notify(&self, method: &str, params: Value) -> Result<(), SessionError> {
        self.send(rpc_notification(method, params))
    }

    /// Send a request and return its allocated id. Ids increase strictly.
    pub fn request(&mut self, method: &str, params: Value) -> Result<u64, SessionError> {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        debug!(id, method, "issuing request");
        self.send(rpc_request(id, method, params))?;
        Ok(id)
    }

    /// Send a successful response to a server-initiated request.
    pub fn respond(&self, id: u64, result: Value) -> Result<(), SessionError> {
        self.send(rpc_response(id, result))
    }

    fn send(&self, message: Value) -> Result<(), SessionError> {
        self.tx.send(message).map_err(|_| {
            SessionError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "writer thread stopped",
            ))
        })
    }

    /// The next inbound message, without blocking.
    pub fn try_recv(&self) -> Option<Inbound> {
        self.rx.try_recv().ok()
    }

    /// Block until the response with `request_id` arrives.
    ///
    /// Server-to-client requests received while waiting are answered with
    /// safe defaults; other inbound messages are handed to `sideline` for the
    /// session to process afterwards.
    pub fn wait_for_response(
        &mut self,
        request_id: u64,
        timeout: Duration,
        sideline: &mut Vec<Value>,
    ) -> Result<Value, SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(SessionError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no response for request id={request_id}"),
                )));
            }
            let inbound = self.rx.recv_timeout(deadline - now).map_err(|err| {
                SessionError::Io(io::Error::new(io::ErrorKind::TimedOut, err))
            })?;
            match inbound {
                Inbound::Io(err) => {
                    return Err(SessionError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        err,
                    )));
                }
                Inbound::Message(msg) => {
                    if msg.get("id").and_then(Value::as_u64) == Some(request_id)
                        && msg.get("method").is_none()
                    {
                        return Ok(msg);
                    }
                    if msg.get("method").is_some() && msg.get("id").is_some() {
                        self.answer_server_request(&msg)?;
                    } else {
                        sideline.push(msg);
                    }
                }
            }
        }
    }

    /// Answer a server-to-client request with a safe headless default. A
    /// message without an id is ignored.
    pub fn answer_server_request(&self, msg: &Value) -> Result<(), SessionError> {
        let Some(id) = msg.get("id").and_then(Value::as_u64) else {
            return Ok(());
        };
        let method = msg.get("method").and_then(Value::as_str).unwrap_or("");
        debug!(id, method, "answering server request");
        let result = match method {
            "workspace/configuration" => {
                let items = msg
                    .get("params")
                    .and_then(|p| p.get("items"))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Value::Array(vec![Value::Null; items])
            }
            "workspace/applyEdit" => serde_json::json!({
                "applied": false,
                "failureReason": "host applies workspace edits itself",
            }),
            // Progress creation, capability registration, and refresh pokes
            // need an acknowledgement but no content.
            _ => Value::Null,
        };
        self.respond(id, result)
    }
}

fn rpc_notification(method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

fn rpc_request(id: u64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

fn rpc_response(id: u64, result: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn write_loop<W: Write>(writer: W, rx: mpsc::Receiver<Value>, tx_in: mpsc::Sender<Inbound>) {
    let mut writer = BufWriter::new(writer);
    for message in rx {
        if let Err(err) = write_message(&mut writer, &message) {
            warn!(%err, "writer thread stopping");
            let _ = tx_in.send(Inbound::Io(err.to_string()));
            break;
        }
    }
}

fn read_loop<R: Read>(reader: R, tx: mpsc::Sender<Inbound>) {
    let mut reader = BufReader::new(reader);
    loop {
        match read_message(&mut reader) {
            Ok(Some(message)) => {
                if tx.send(Inbound::Message(message)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "reader thread stopping");
                let _ = tx.send(Inbound::Io(err.to_string()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::pipe;

    #[test]
    fn test_request_ids_increase_strictly() {
        let (_server_rx, client_tx) = pipe().unwrap();
        let (client_rx, _server_tx) = pipe().unwrap();
        let mut client = RpcClient::from_streams(client_rx, client_tx);
        let a = client.request("a", json!({})).unwrap();
        let b = client.request("b", json!({})).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_wait_answers_server_requests_and_sidelines_notifications() {
        let (server_rx, client_tx) = pipe().unwrap();
        let (client_rx, mut server_tx) = pipe().unwrap();
        let mut client = RpcClient::from_streams(client_rx, client_tx);

        let handle = thread::spawn(move || {
            let mut reader = BufReader::new(server_rx);
            // The client's request arrives first.
            let request = read_message(&mut reader).unwrap().unwrap();
            let id = request["id"].as_u64().unwrap();
            // Interleave a server request and a notification before replying.
            write_message(
                &mut server_tx,
                &json!({"jsonrpc": "2.0", "id": 99, "method": "workspace/configuration",
                        "params": {"items": [1, 2]}}),
            )
            .unwrap();
            write_message(
                &mut server_tx,
                &json!({"jsonrpc": "2.0", "method": "note", "params": {}}),
            )
            .unwrap();
            write_message(
                &mut server_tx,
                &json!({"jsonrpc": "2.0", "id": id, "result": {"answer": 42}}),
            )
            .unwrap();
            // The client's answer to the server request comes back.
            let answer = read_message(&mut reader).unwrap().unwrap();
            assert_eq!(answer["id"], 99);
            assert_eq!(answer["result"], json!([null, null]));
        });

        let id = client.request("test/ask", json!({})).unwrap();
        let mut sideline = Vec::new();
        let response = client
            .wait_for_response(id, Duration::from_secs(5), &mut sideline)
            .unwrap();
        assert_eq!(response["result"]["answer"], 42);
        assert_eq!(sideline.len(), 1);
        assert_eq!(sideline[0]["method"], "note");
        handle.join().unwrap();
    }
}
