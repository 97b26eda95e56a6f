//! Protocol session: one client connection from hello to close
//!
//! The session owns the framed transport and the project context for the
//! lifetime of the connection. Requests are handled strictly one at a time:
//! every response to a request is flushed before the next one is read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{Level, debug, error, info, warn};

use super::framing::{FramingError, MessageFraming};
use super::handlers::{self, PROGRESS_MAXIMUM, Response};
use super::messages::{ProtocolError, Request, RequestKind, ServerMessage};
use crate::io::Transport;
use crate::logging::ClientLog;
use crate::project::ProjectContext;
use crate::{log_protocol_message, log_timing};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    fn is_disconnect(&self) -> bool {
        matches!(self, SessionError::Framing(e) if e.is_disconnect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Greeting,
    Ready,
    Closed,
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The client closed its end of the connection
    Disconnected,
    /// A send or read hit a broken connection
    ClientGone,
    /// The handshake was answered with an error and the connection closed
    HandshakeFailed,
    /// A malformed or unexpected message closed the connection
    ProtocolError(SessionError),
}

pub struct Session<T: Transport> {
    framing: MessageFraming<T>,
    context: ProjectContext,
    state: SessionState,
    /// Last cookie seen per request type
    cookies: HashMap<String, String>,
    debug_output: bool,
    client_log: Option<Arc<ClientLog>>,
    forwarded: Option<UnboundedReceiver<String>>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, context: ProjectContext, debug_output: bool) -> Self {
        Self {
            framing: MessageFraming::new(transport),
            context,
            state: SessionState::Connecting,
            cookies: HashMap::new(),
            debug_output,
            client_log: None,
            forwarded: None,
        }
    }

    /// Forward log records to the client as uncorrelated messages
    pub fn with_client_log(mut self, log: Arc<ClientLog>) -> Self {
        self.client_log = Some(log);
        self
    }

    /// Serve the connection until it ends; resources are released on every path
    pub async fn run(mut self) -> SessionEnd {
        let end = match self.serve().await {
            Ok(end) => end,
            Err(e) if e.is_disconnect() => {
                info!("Client gone: {}", e);
                SessionEnd::ClientGone
            }
            Err(e) => {
                error!("Closing connection: {}", e);
                SessionEnd::ProtocolError(e)
            }
        };
        self.close().await;
        end
    }

    async fn serve(&mut self) -> Result<SessionEnd, SessionError> {
        self.state = SessionState::Greeting;
        self.send(ServerMessage::hello()).await?;
        self.forwarded = self.client_log.as_ref().map(|log| log.attach());

        loop {
            let Some(value) = self.framing.receive().await? else {
                info!("Client disconnected");
                return Ok(SessionEnd::Disconnected);
            };

            let request = Request::from_value(value)?;
            self.remember_cookie(&request);
            log_protocol_message!(Level::DEBUG, "inbound", request.type_name.as_str(), request.body);

            match (self.state, request.kind) {
                (SessionState::Greeting, RequestKind::Handshake) => {
                    if !self.handshake(&request).await? {
                        return Ok(SessionEnd::HandshakeFailed);
                    }
                    self.state = SessionState::Ready;
                }
                (SessionState::Greeting, _) => {
                    return Err(ProtocolError::HandshakeExpected(request.type_name).into());
                }
                (_, RequestKind::Handshake) => {
                    return Err(ProtocolError::DuplicateHandshake.into());
                }
                (_, kind) => self.dispatch(kind, &request).await?,
            }
        }
    }

    /// Returns whether the session may continue
    async fn handshake(&mut self, request: &Request) -> Result<bool, SessionError> {
        let payload = request.payload()?;
        let start = Instant::now();
        let result = handlers::handshake(&mut self.context, &payload).await;
        log_timing!(Level::DEBUG, "handshake", start.elapsed());

        match result {
            Ok(responses) => {
                self.respond(request, responses).await?;
                Ok(true)
            }
            Err(e) => {
                warn!("Handshake failed: {}", e);
                self.respond(request, handlers::failure(&e)).await?;
                Ok(false)
            }
        }
    }

    async fn dispatch(&mut self, kind: RequestKind, request: &Request) -> Result<(), SessionError> {
        let start = Instant::now();
        let result = match kind {
            RequestKind::GlobalSettings => Ok(handlers::global_settings(&self.context, self.debug_output)),
            RequestKind::Configure => {
                let payload = request.payload()?;
                handlers::configure(&mut self.context, &payload).await
            }
            RequestKind::Compute => handlers::compute(&mut self.context).await,
            RequestKind::CmakeInputs => handlers::cmake_inputs(&mut self.context).await,
            RequestKind::Cache => Ok(handlers::cache(&self.context)),
            RequestKind::CodeModel => handlers::code_model(&mut self.context).await,
            RequestKind::Handshake => return Err(ProtocolError::DuplicateHandshake.into()),
        };
        log_timing!(Level::DEBUG, request.type_name.as_str(), start.elapsed());

        let responses = result.unwrap_or_else(|e| {
            warn!("{} failed: {}", request.type_name, e);
            handlers::failure(&e)
        });
        self.respond(request, responses).await
    }

    fn remember_cookie(&mut self, request: &Request) {
        match &request.cookie {
            Some(cookie) => {
                self.cookies.insert(request.type_name.clone(), cookie.clone());
            }
            None => {
                self.cookies.remove(&request.type_name);
            }
        }
    }

    async fn respond(&mut self, request: &Request, responses: Vec<Response>) -> Result<(), SessionError> {
        let in_reply_to = request.type_name.clone();
        let cookie = self.cookies.get(&in_reply_to).cloned();

        for response in responses {
            let message = match response {
                Response::Progress(progress_message) => ServerMessage::Progress {
                    in_reply_to: in_reply_to.clone(),
                    cookie: cookie.clone(),
                    progress_current: PROGRESS_MAXIMUM,
                    progress_minimum: 0,
                    progress_maximum: PROGRESS_MAXIMUM,
                    progress_message,
                },
                Response::Message(message) => ServerMessage::Message {
                    in_reply_to: Some(in_reply_to.clone()),
                    cookie: cookie.clone(),
                    message,
                },
                Response::Reply(body) => ServerMessage::Reply {
                    in_reply_to: in_reply_to.clone(),
                    cookie: cookie.clone(),
                    body,
                },
            };
            self.send(message).await?;
        }
        Ok(())
    }

    async fn send(&mut self, message: ServerMessage) -> Result<(), SessionError> {
        self.flush_client_log().await?;
        log_protocol_message!(Level::DEBUG, "outbound", message.role(), message);
        self.framing.send(&message).await?;
        Ok(())
    }

    /// Send queued log lines ahead of the next outbound message
    async fn flush_client_log(&mut self) -> Result<(), SessionError> {
        let Some(forwarded) = self.forwarded.as_mut() else {
            return Ok(());
        };
        let mut lines = Vec::new();
        while let Ok(line) = forwarded.try_recv() {
            lines.push(line);
        }
        for message in lines {
            let message = ServerMessage::Message {
                in_reply_to: None,
                cookie: None,
                message,
            };
            self.framing.send(&message).await?;
        }
        Ok(())
    }

    /// Only a session that completed its handshake persists its entries;
    /// a failed handshake leaves the persisted cache as it was.
    async fn close(&mut self) {
        if let Some(log) = self.client_log.take() {
            log.detach();
        }
        self.forwarded = None;

        if let Err(e) = self.framing.close().await {
            debug!("Error closing connection: {}", e);
        }
        if self.state == SessionState::Ready {
            match self.context.persist() {
                Ok(Some(path)) => debug!("Persisted cache entries to {}", path.display()),
                Ok(None) => {}
                Err(e) => warn!("Could not persist cache entries: {}", e),
            }
        }
        self.state = SessionState::Closed;
    }
}
