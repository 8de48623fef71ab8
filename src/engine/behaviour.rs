//! The seam between this crate and the external protocol engine.
//!
//! The engine is handed an [`Arc<dyn ServerBehaviour>`] at start and owns it
//! for the duration of the run. It queries the policy side per connection and
//! per message, and invokes the callback side as transactions complete. No
//! other state is shared with the engine; everything crosses this boundary.

use crate::engine::types::{
    AuthMechanism, AuthOutcome, ConnectionState, Message, Session, SmtpExtension, SmtpRejection,
    TlsIdentity,
};
use crate::error_handling::types::EngineError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Policy questions the engine asks, plus the completion callbacks it invokes.
///
/// Answers are expected to be recomputed per query rather than cached, so a
/// restarted engine picks up edited configuration through a fresh policy
/// snapshot while a running engine keeps reading a stable one.
pub trait ServerBehaviour: Send + Sync + 'static {
    /// Hostname presented in the server greeting.
    fn domain_name(&self) -> String;

    fn ip_address(&self) -> IpAddr;

    fn port(&self) -> u16;

    fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address(), self.port())
    }

    /// Certificate to present for STARTTLS or implicit TLS. `None` means TLS
    /// is unavailable this run and the engine must reject TLS requests.
    fn tls_identity(&self) -> Option<TlsIdentity>;

    /// Extensions to advertise to the given connection.
    fn extensions(&self, connection: &ConnectionState) -> Vec<SmtpExtension>;

    /// Byte bound on a single message; `None` means unlimited.
    fn maximum_message_size(&self) -> Option<u64>;

    /// Per-connection idle timeout.
    fn receive_timeout(&self) -> Duration;

    /// Whether a mechanism may be offered to this connection.
    fn auth_mechanism_enabled(&self, mechanism: &AuthMechanism, connection: &ConnectionState)
        -> bool;

    fn validate_credentials(&self, username: &str, secret: &str) -> AuthOutcome;

    /// Invoked at MAIL FROM, before any message body is accepted. An `Err` is
    /// relayed to the client as a protocol error and the transaction never
    /// produces a message.
    fn on_message_start(
        &self,
        connection: &ConnectionState,
        reverse_path: &str,
    ) -> Result<(), SmtpRejection>;

    /// Invoked once per completed transaction, on the engine's thread.
    fn on_message_received(&self, message: Message);

    /// Invoked once per completed connection, on the engine's thread.
    fn on_session_completed(&self, session: Session);
}

/// Contract the controller drives an engine through.
///
/// Lifecycle: exactly one `bind` followed by one `run` per instance, both on
/// the controller's background execution context. `shutdown` may be called
/// from any thread at any point after `bind`.
pub trait MailEngine: Send + Sync + 'static {
    /// Binds the listening socket. A bind failure (port in use, invalid
    /// address) surfaces here so the controller can report it to the caller
    /// of start.
    fn bind(&self, behaviour: &dyn ServerBehaviour) -> Result<(), EngineError>;

    /// Serves connections until [`MailEngine::shutdown`] is called. Blocking.
    ///
    /// The engine must quiesce before returning: once `run` returns, no
    /// further `ServerBehaviour` callbacks may fire for this instance.
    fn run(&self, behaviour: Arc<dyn ServerBehaviour>) -> Result<(), EngineError>;

    /// Requests the engine to unbind and forcibly terminate any active
    /// connections. No graceful drain: in-flight sessions may be reported
    /// with a partial transcript or not at all.
    fn shutdown(&self);
}
