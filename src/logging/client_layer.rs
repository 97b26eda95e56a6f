//! Tracing layer forwarding log records to the connected protocol client
//!
//! With `--debug-output` the session attaches itself to a [`ClientLog`] and
//! drains the queued lines into uncorrelated `message`s. While nothing is
//! attached, records are dropped.

use std::sync::{Arc, LazyLock, Mutex};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;

/// Process-wide forwarding target used by [`init_logging`](super::init_logging)
pub static CLIENT_LOG: LazyLock<Arc<ClientLog>> = LazyLock::new(|| Arc::new(ClientLog::new()));

/// Queue of formatted log lines for the client of the active session
#[derive(Debug, Default)]
pub struct ClientLog {
    sender: Mutex<Option<UnboundedSender<String>>>,
}

impl ClientLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start forwarding; replaces any previous attachment
    pub fn attach(&self) -> UnboundedReceiver<String> {
        let (sender, receiver) = unbounded_channel();
        if let Ok(mut slot) = self.sender.lock() {
            *slot = Some(sender);
        }
        receiver
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.sender.lock() {
            *slot = None;
        }
    }

    fn forward(&self, line: String) {
        let Ok(mut slot) = self.sender.lock() else {
            return;
        };
        if let Some(sender) = slot.as_ref()
            && sender.send(line).is_err()
        {
            *slot = None;
        }
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// Forwards `INFO` and more severe records as `<target>: <message>`
///
/// Protocol message records are skipped: the forwarded lines are themselves
/// protocol messages.
pub struct ClientLogLayer {
    log: Arc<ClientLog>,
}

impl ClientLogLayer {
    pub fn new(log: Arc<ClientLog>) -> Self {
        Self { log }
    }
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for ClientLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::INFO || metadata.fields().field("direction").is_some() {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        self.log
            .forward(format!("{}: {}", metadata.target(), visitor.message));
    }
}
