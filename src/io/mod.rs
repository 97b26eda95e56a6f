//! I/O layer - Generic abstractions for child processes and byte transports
//!
//! - **Process**: running the underlying build tool and compiler probes
//! - **Transport**: raw byte exchange with the IDE client
//!
//! Neither layer knows about the CMake server protocol or Meson.

pub mod process;
pub mod transport;

pub use process::{
    BuildToolClient, BuildToolError, Invocation, LineSink, ProcessRunner, SubprocessRunner,
};
pub use transport::{StreamTransport, Transport};

#[cfg(test)]
pub use process::{ProcessError, ProcessOutput};
#[cfg(test)]
pub use transport::MockTransport;
