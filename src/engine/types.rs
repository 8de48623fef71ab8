use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// One completed SMTP transaction, as reported by the protocol engine.
///
/// The raw payload is shared and re-readable: [`Message::open_data`] hands out
/// an independent reader each time, so saving to a file, MIME parsing and
/// repeated viewing never consume the stream.
#[derive(Debug, Clone)]
pub struct Message {
    id: Uuid,
    session_id: Uuid,
    from: String,
    to: Vec<String>,
    received_at: DateTime<Utc>,
    data: Arc<[u8]>,
}

impl Message {
    pub fn new(session_id: Uuid, from: String, to: Vec<String>, data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            from,
            to,
            received_at: Utc::now(),
            data: data.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Opens a fresh reader over the raw payload.
    pub fn open_data(&self) -> Cursor<Arc<[u8]>> {
        Cursor::new(Arc::clone(&self.data))
    }
}

/// Record of one client connection's dialog, immutable once reported complete.
///
/// Holds the ids of the messages delivered during the connection, in delivery
/// order, and the textual transcript the engine kept of the dialog.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub client_addr: Option<SocketAddr>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub message_ids: Vec<Uuid>,
    pub log: String,
}

/// What the engine knows about a connection at the time of a policy query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionState {
    pub authenticated: bool,
    pub secure: bool,
}

/// ESMTP extensions the policy can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpExtension {
    EightBitMime,
    StartTls,
    Auth,
    Size,
}

impl SmtpExtension {
    /// Keyword advertised in the EHLO response.
    pub fn keyword(&self) -> &'static str {
        match self {
            SmtpExtension::EightBitMime => "8BITMIME",
            SmtpExtension::StartTls => "STARTTLS",
            SmtpExtension::Auth => "AUTH",
            SmtpExtension::Size => "SIZE",
        }
    }
}

/// An authentication mechanism offered by the engine.
#[derive(Debug, Clone)]
pub struct AuthMechanism {
    pub name: String,
    /// True for mechanisms that carry the secret in the clear (PLAIN, LOGIN).
    pub cleartext: bool,
}

/// Outcome of credential validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    Denied,
    TemporarilyUnavailable,
}

/// A protocol-level rejection the engine relays to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpRejection {
    pub code: u16,
    pub message: String,
}

impl SmtpRejection {
    pub const AUTHENTICATION_REQUIRED: u16 = 530;
    pub const BAD_SEQUENCE_OF_COMMANDS: u16 = 503;

    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for SmtpRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// A resolved TLS certificate the engine can present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIdentity {
    pub certificate: PathBuf,
    pub password: Option<String>,
}
