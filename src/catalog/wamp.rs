//! WAMP v2 (JSON) client for the scan manager's job catalog.
//!
//! Only the client roles the batch needs are spoken: caller and subscriber.
//! One session per fetch: join, subscribe to the ready topic, register the
//! worker name, query each id, leave.

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Map, Value};
use std::ops::Range;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::JobCatalog;
use crate::config::CatalogSettings;
use crate::error::CatalogError;
use crate::models::Sequence;

pub const WAMP_SUBPROTOCOL: &str = "wamp.2.json";

const HELLO: u64 = 1;
const WELCOME: u64 = 2;
const ABORT: u64 = 3;
const GOODBYE: u64 = 6;
const ERROR: u64 = 8;
const SUBSCRIBE: u64 = 32;
const SUBSCRIBED: u64 = 33;
const EVENT: u64 = 36;
const CALL: u64 = 48;
const RESULT: u64 = 50;

const CLOSE_NORMAL: &str = "wamp.close.normal";

/// Router-to-client messages the session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum WampMessage {
    Welcome { session: u64 },
    Abort { reason: String },
    Goodbye { reason: String },
    Error { request: u64, error: String },
    Subscribed { request: u64, subscription: u64 },
    Event { subscription: u64 },
    Result { request: u64, args: Vec<Value>, kwargs: Map<String, Value> },
    Other(u64),
}

pub fn hello_message(realm: &str) -> Value {
    json!([HELLO, realm, {"roles": {"caller": {}, "subscriber": {}}}])
}

pub fn subscribe_message(request: u64, topic: &str) -> Value {
    json!([SUBSCRIBE, request, {}, topic])
}

pub fn call_message(request: u64, procedure: &str, kwargs: Value) -> Value {
    json!([CALL, request, {}, procedure, [], kwargs])
}

pub fn goodbye_message() -> Value {
    json!([GOODBYE, {}, CLOSE_NORMAL])
}

/// Decode one text frame.
pub fn parse_message(text: &str) -> Result<WampMessage, CatalogError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CatalogError::Protocol(format!("not JSON: {}", e)))?;
    let Value::Array(fields) = value else {
        return Err(CatalogError::Protocol(format!("not a message array: {}", text)));
    };
    let code = id_at(&fields, 0)?;

    let message = match code {
        WELCOME => WampMessage::Welcome {
            session: id_at(&fields, 1)?,
        },
        ABORT => WampMessage::Abort {
            reason: str_at(&fields, 2)?,
        },
        GOODBYE => WampMessage::Goodbye {
            reason: str_at(&fields, 2)?,
        },
        ERROR => WampMessage::Error {
            request: id_at(&fields, 2)?,
            error: str_at(&fields, 4)?,
        },
        SUBSCRIBED => WampMessage::Subscribed {
            request: id_at(&fields, 1)?,
            subscription: id_at(&fields, 2)?,
        },
        EVENT => WampMessage::Event {
            subscription: id_at(&fields, 1)?,
        },
        RESULT => {
            let args = match fields.get(3) {
                Some(Value::Array(args)) => args.clone(),
                None => Vec::new(),
                Some(other) => {
                    return Err(CatalogError::Protocol(format!("RESULT args not a list: {}", other)))
                }
            };
            let kwargs = match fields.get(4) {
                Some(Value::Object(kwargs)) => kwargs.clone(),
                _ => Map::new(),
            };
            WampMessage::Result {
                request: id_at(&fields, 1)?,
                args,
                kwargs,
            }
        }
        other => WampMessage::Other(other),
    };
    Ok(message)
}

fn id_at(fields: &[Value], index: usize) -> Result<u64, CatalogError> {
    fields
        .get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| CatalogError::Protocol(format!("expected an id at position {}", index)))
}

fn str_at(fields: &[Value], index: usize) -> Result<String, CatalogError> {
    fields
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CatalogError::Protocol(format!("expected a URI at position {}", index)))
}

/// Pull the Sequence out of a query RESULT's positional args.
///
/// The query procedure returns a list of matches as its single value.
pub fn sequence_from_result(id: i64, args: Vec<Value>) -> Result<Sequence, CatalogError> {
    let record = match args.into_iter().next() {
        Some(Value::Array(matches)) => matches.into_iter().next(),
        Some(record @ Value::Object(_)) => Some(record),
        _ => None,
    };
    let record = record.ok_or(CatalogError::MissingSequence(id))?;
    Ok(serde_json::from_value(record)?)
}

/// An established session over any WebSocket message stream.
struct WampSession<S> {
    stream: S,
    next_request: u64,
    ready_subscription: Option<u64>,
    ready_pending: bool,
}

impl<S> WampSession<S>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    fn new(stream: S) -> Self {
        WampSession {
            stream,
            next_request: 1,
            ready_subscription: None,
            ready_pending: false,
        }
    }

    fn request_id(&mut self) -> u64 {
        let id = self.next_request;
        self.next_request += 1;
        id
    }

    async fn send(&mut self, message: Value) -> Result<(), CatalogError> {
        self.stream.send(Message::Text(message.to_string())).await?;
        Ok(())
    }

    /// Next message for the caller. Ready events are absorbed and remembered.
    async fn recv(&mut self) -> Result<WampMessage, CatalogError> {
        loop {
            let frame = match self.stream.next().await {
                Some(frame) => frame?,
                None => return Err(CatalogError::Closed),
            };
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => return Err(CatalogError::Closed),
                Message::Binary(_) => {
                    return Err(CatalogError::Protocol(
                        "binary frame on a JSON session".to_string(),
                    ))
                }
                _ => continue,
            };

            match parse_message(&text)? {
                WampMessage::Event { subscription }
                    if Some(subscription) == self.ready_subscription =>
                {
                    log::info!("[Catalog] [WAMP] Ready broadcast received");
                    self.ready_pending = true;
                }
                message => return Ok(message),
            }
        }
    }

    async fn join(&mut self, realm: &str) -> Result<u64, CatalogError> {
        self.send(hello_message(realm)).await?;
        match self.recv().await? {
            WampMessage::Welcome { session } => Ok(session),
            WampMessage::Abort { reason } => Err(CatalogError::Aborted(reason)),
            other => Err(CatalogError::Protocol(format!(
                "expected WELCOME, got {:?}",
                other
            ))),
        }
    }

    async fn subscribe_ready(&mut self, topic: &str) -> Result<(), CatalogError> {
        let request = self.request_id();
        self.send(subscribe_message(request, topic)).await?;
        loop {
            match self.recv().await? {
                WampMessage::Subscribed {
                    request: r,
                    subscription,
                } if r == request => {
                    log::info!(
                        "[Catalog] [WAMP] Subscribed to {} with subscription ID {}",
                        topic,
                        subscription
                    );
                    self.ready_subscription = Some(subscription);
                    return Ok(());
                }
                WampMessage::Error { request: r, error } if r == request => {
                    return Err(CatalogError::CallFailed {
                        procedure: topic.to_string(),
                        error,
                    })
                }
                message => self.unexpected(message)?,
            }
        }
    }

    async fn call(&mut self, procedure: &str, kwargs: Value) -> Result<Vec<Value>, CatalogError> {
        let request = self.request_id();
        self.send(call_message(request, procedure, kwargs)).await?;
        loop {
            match self.recv().await? {
                WampMessage::Result {
                    request: r, args, ..
                } if r == request => return Ok(args),
                WampMessage::Error { request: r, error } if r == request => {
                    return Err(CatalogError::CallFailed {
                        procedure: procedure.to_string(),
                        error,
                    })
                }
                message => self.unexpected(message)?,
            }
        }
    }

    fn unexpected(&self, message: WampMessage) -> Result<(), CatalogError> {
        match message {
            WampMessage::Abort { reason } => Err(CatalogError::Aborted(reason)),
            WampMessage::Goodbye { reason } => Err(CatalogError::Aborted(reason)),
            other => {
                log::debug!("[Catalog] [WAMP] Ignoring {:?}", other);
                Ok(())
            }
        }
    }

    fn take_ready(&mut self) -> bool {
        std::mem::take(&mut self.ready_pending)
    }

    async fn leave(mut self) -> Result<(), CatalogError> {
        self.send(goodbye_message()).await?;
        loop {
            match self.recv().await {
                Ok(WampMessage::Goodbye { .. }) | Err(CatalogError::Closed) => break,
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        }
        // The router may already have dropped the socket.
        let _ = self.stream.close().await;
        Ok(())
    }
}

/// Production [`JobCatalog`] talking to the scan manager router.
pub struct WampCatalogClient {
    settings: CatalogSettings,
    worker_name: String,
}

impl WampCatalogClient {
    /// Worker name is this machine's hostname plus the configured suffix.
    pub fn new(settings: CatalogSettings) -> Self {
        let host = sysinfo::System::host_name().unwrap_or_else(|| "unknown-host".to_string());
        let worker_name = format!("{}{}", host, settings.worker_suffix);
        Self::with_worker_name(settings, worker_name)
    }

    pub fn with_worker_name(settings: CatalogSettings, worker_name: impl Into<String>) -> Self {
        WampCatalogClient {
            settings,
            worker_name: worker_name.into(),
        }
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    async fn register<S>(&self, session: &mut WampSession<S>) -> Result<(), CatalogError>
    where
        S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
    {
        log::info!("[Catalog] Registering name {}", self.worker_name);
        session
            .call(
                &self.settings.register_procedure,
                json!({ "name": self.worker_name }),
            )
            .await?;
        Ok(())
    }

    async fn exchange<S>(
        &self,
        session: &mut WampSession<S>,
        range: Range<i64>,
    ) -> Result<Vec<Sequence>, CatalogError>
    where
        S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
    {
        let session_id = session.join(&self.settings.realm).await?;
        log::info!(
            "[Catalog] [WAMP] Joined realm {} (session {})",
            self.settings.realm,
            session_id
        );

        session.subscribe_ready(&self.settings.ready_topic).await?;
        self.register(session).await?;

        let mut sequences = Vec::new();
        for id in range {
            let kwargs = json!({
                "datatype": self.settings.datatype,
                "matches": { "ID": id },
            });
            let args = session.call(&self.settings.query_procedure, kwargs).await?;
            let sequence = sequence_from_result(id, args)?;
            log::debug!("[Catalog] Fetched {}", sequence);
            sequences.push(sequence);

            if session.take_ready() {
                self.register(session).await?;
            }
        }
        Ok(sequences)
    }
}

#[async_trait]
impl JobCatalog for WampCatalogClient {
    async fn fetch_sequences(&mut self, range: Range<i64>) -> Result<Vec<Sequence>, CatalogError> {
        let mut request = self.settings.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(WAMP_SUBPROTOCOL));

        log::info!("[Catalog] Connecting to {}", self.settings.url);
        let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let mut session = WampSession::new(stream);

        let sequences = self.exchange(&mut session, range).await?;
        session.leave().await?;
        Ok(sequences)
    }
}
