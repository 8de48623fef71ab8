use crate::configuration::settings::Settings;
use crate::engine::behaviour::ServerBehaviour;
use crate::engine::types::{
    AuthMechanism, AuthOutcome, ConnectionState, Message, Session, SmtpExtension, SmtpRejection,
    TlsIdentity,
};
use crate::events::hook::Event;
use log::{debug, warn};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Certificates dropped here are picked up as a last resort.
const USER_CERT_DIR: &str = "mailsink/certs";

/// Translates a [`Settings`] snapshot into the answers the protocol engine
/// asks for, and republishes the engine's completion callbacks as typed
/// events.
///
/// The policy is stateless apart from the two event hooks: every answer is
/// recomputed from the snapshot on each query. The snapshot itself is never
/// mutated; configuration edits reach the engine only through a restart,
/// which builds a fresh policy.
pub struct BehaviourPolicy {
    settings: Settings,
    message_received: Event<Message>,
    session_completed: Event<Session>,
}

impl BehaviourPolicy {
    pub fn new(
        settings: Settings,
        message_received: Event<Message>,
        session_completed: Event<Session>,
    ) -> Self {
        Self {
            settings,
            message_received,
            session_completed,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolves a usable TLS certificate, trying in order: the explicitly
    /// configured file, a `localhost.pem` colocated with the executable, and
    /// the first `.pem` under the user certificate directory. `None` when
    /// nothing usable is found; the server still starts, without TLS.
    fn resolve_certificate(&self) -> Option<TlsIdentity> {
        if let Some(path) = &self.settings.tls_certificate_path {
            if !path.as_os_str().is_empty() {
                if path.is_file() {
                    return Some(TlsIdentity {
                        certificate: path.clone(),
                        password: self.settings.tls_certificate_password.clone(),
                    });
                }
                warn!(
                    "configured TLS certificate {} not found, trying fallbacks",
                    path.display()
                );
            }
        }

        if let Some(local) = Self::colocated_certificate() {
            return Some(TlsIdentity {
                certificate: local,
                password: None,
            });
        }

        if let Some(stored) = Self::first_user_certificate() {
            return Some(TlsIdentity {
                certificate: stored,
                password: None,
            });
        }

        debug!("no TLS certificate resolved, TLS unavailable for this run");
        None
    }

    fn colocated_certificate() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        let candidate = exe.parent()?.join("localhost.pem");
        candidate.is_file().then_some(candidate)
    }

    fn first_user_certificate() -> Option<PathBuf> {
        let dir = dirs::config_dir()?.join(USER_CERT_DIR);
        Self::first_pem_in(&dir)
    }

    fn first_pem_in(dir: &Path) -> Option<PathBuf> {
        let entries = fs::read_dir(dir).ok()?;
        let mut pems: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("pem")
            })
            .collect();
        pems.sort();
        pems.into_iter().next()
    }
}

impl ServerBehaviour for BehaviourPolicy {
    fn domain_name(&self) -> String {
        self.settings.domain_name.clone()
    }

    fn ip_address(&self) -> IpAddr {
        self.settings.ip_address
    }

    fn port(&self) -> u16 {
        self.settings.port
    }

    fn tls_identity(&self) -> Option<TlsIdentity> {
        if !self.settings.enable_tls && !self.settings.enable_starttls {
            return None;
        }
        self.resolve_certificate()
    }

    fn extensions(&self, _connection: &ConnectionState) -> Vec<SmtpExtension> {
        let mut extensions = Vec::new();

        if self.settings.enable_eight_bit_mime {
            extensions.push(SmtpExtension::EightBitMime);
        }
        // STARTTLS is only usable with a certificate; without one the
        // extension reports unavailable instead of failing at negotiation.
        if self.settings.enable_starttls && self.tls_identity().is_some() {
            extensions.push(SmtpExtension::StartTls);
        }
        if self.settings.enable_auth {
            extensions.push(SmtpExtension::Auth);
        }
        if self.settings.enable_size {
            extensions.push(SmtpExtension::Size);
        }

        extensions
    }

    fn maximum_message_size(&self) -> Option<u64> {
        match self.settings.maximum_message_size {
            0 => None,
            bytes => Some(bytes),
        }
    }

    fn receive_timeout(&self) -> Duration {
        self.settings.receive_timeout()
    }

    fn auth_mechanism_enabled(
        &self,
        mechanism: &AuthMechanism,
        connection: &ConnectionState,
    ) -> bool {
        if mechanism.cleartext && !connection.secure {
            return self.settings.allow_cleartext_auth_over_insecure;
        }
        true
    }

    fn validate_credentials(&self, username: &str, _secret: &str) -> AuthOutcome {
        // Accept-all placeholder until a pluggable validator exists.
        debug!("accepting credentials for {} without validation", username);
        AuthOutcome::Granted
    }

    fn on_message_start(
        &self,
        connection: &ConnectionState,
        _reverse_path: &str,
    ) -> Result<(), SmtpRejection> {
        if self.settings.require_authentication && !connection.authenticated {
            return Err(SmtpRejection::new(
                SmtpRejection::AUTHENTICATION_REQUIRED,
                "Must authenticate before sending mail",
            ));
        }

        if self.settings.require_secure_connection && !connection.secure {
            return Err(SmtpRejection::new(
                SmtpRejection::BAD_SEQUENCE_OF_COMMANDS,
                "Mail must be sent over secure connection",
            ));
        }

        Ok(())
    }

    fn on_message_received(&self, message: Message) {
        self.message_received.emit(&message);
    }

    fn on_session_completed(&self, session: Session) {
        self.session_completed.emit(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn policy(settings: Settings) -> BehaviourPolicy {
        BehaviourPolicy::new(settings, Event::new(), Event::new())
    }

    fn insecure() -> ConnectionState {
        ConnectionState::default()
    }

    fn secured() -> ConnectionState {
        ConnectionState {
            authenticated: false,
            secure: true,
        }
    }

    fn write_pem(dir: &Path) -> PathBuf {
        let path = dir.join("localhost.pem");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "-----BEGIN CERTIFICATE-----").unwrap();
        writeln!(file, "-----END CERTIFICATE-----").unwrap();
        path
    }

    #[test]
    fn extensions_follow_the_configured_flags() {
        let settings = Settings {
            enable_eight_bit_mime: true,
            enable_starttls: false,
            enable_auth: false,
            enable_size: true,
            ..Settings::default()
        };

        let extensions = policy(settings).extensions(&insecure());

        assert_eq!(
            extensions,
            vec![SmtpExtension::EightBitMime, SmtpExtension::Size]
        );
    }

    #[test]
    fn starttls_reports_unavailable_without_a_certificate() {
        let settings = Settings {
            enable_starttls: true,
            tls_certificate_path: Some(PathBuf::from("/nonexistent/cert.pem")),
            ..Settings::default()
        };
        let policy = policy(settings);

        // The configured path does not exist and no fallback is expected to
        // resolve in the test environment either way; the point is that the
        // query degrades instead of failing.
        if policy.tls_identity().is_none() {
            assert!(!policy
                .extensions(&insecure())
                .contains(&SmtpExtension::StartTls));
        }
    }

    #[test]
    fn explicit_certificate_wins_and_carries_its_password() {
        let dir = tempfile::tempdir().unwrap();
        let cert = write_pem(dir.path());

        let settings = Settings {
            enable_starttls: true,
            tls_certificate_path: Some(cert.clone()),
            tls_certificate_password: Some("hunter2".to_string()),
            ..Settings::default()
        };
        let policy = policy(settings);

        let identity = policy.tls_identity().unwrap();
        assert_eq!(identity.certificate, cert);
        assert_eq!(identity.password.as_deref(), Some("hunter2"));
        assert!(policy
            .extensions(&insecure())
            .contains(&SmtpExtension::StartTls));
    }

    #[test]
    fn first_pem_in_directory_is_picked_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.pem"), "x").unwrap();
        fs::write(dir.path().join("a.pem"), "x").unwrap();
        fs::write(dir.path().join("ignored.txt"), "x").unwrap();

        let first = BehaviourPolicy::first_pem_in(dir.path()).unwrap();
        assert_eq!(first.file_name().unwrap(), "a.pem");
    }

    #[test]
    fn zero_maximum_message_size_means_unlimited() {
        assert_eq!(policy(Settings::default()).maximum_message_size(), None);

        let bounded = policy(Settings {
            maximum_message_size: 1024,
            ..Settings::default()
        });
        assert_eq!(bounded.maximum_message_size(), Some(1024));
    }

    #[test]
    fn cleartext_auth_is_gated_on_connection_security() {
        let strict = policy(Settings {
            allow_cleartext_auth_over_insecure: false,
            ..Settings::default()
        });
        let plain = AuthMechanism {
            name: "PLAIN".to_string(),
            cleartext: true,
        };
        let cram = AuthMechanism {
            name: "CRAM-MD5".to_string(),
            cleartext: false,
        };

        assert!(!strict.auth_mechanism_enabled(&plain, &insecure()));
        assert!(strict.auth_mechanism_enabled(&plain, &secured()));
        assert!(strict.auth_mechanism_enabled(&cram, &insecure()));

        let relaxed = policy(Settings {
            allow_cleartext_auth_over_insecure: true,
            ..Settings::default()
        });
        assert!(relaxed.auth_mechanism_enabled(&plain, &insecure()));
    }

    #[test]
    fn credentials_are_always_accepted() {
        let policy = policy(Settings::default());
        assert_eq!(
            policy.validate_credentials("anyone", "anything"),
            AuthOutcome::Granted
        );
    }

    #[test]
    fn message_start_rejects_unauthenticated_sessions_when_auth_is_required() {
        let policy = policy(Settings {
            require_authentication: true,
            ..Settings::default()
        });

        let rejection = policy
            .on_message_start(&insecure(), "sender@example.com")
            .unwrap_err();
        assert_eq!(rejection.code, SmtpRejection::AUTHENTICATION_REQUIRED);

        let authed = ConnectionState {
            authenticated: true,
            secure: false,
        };
        assert!(policy.on_message_start(&authed, "sender@example.com").is_ok());
    }

    #[test]
    fn message_start_rejects_insecure_sessions_when_tls_is_required() {
        let policy = policy(Settings {
            require_secure_connection: true,
            ..Settings::default()
        });

        let rejection = policy
            .on_message_start(&insecure(), "sender@example.com")
            .unwrap_err();
        assert_eq!(rejection.code, SmtpRejection::BAD_SEQUENCE_OF_COMMANDS);

        assert!(policy.on_message_start(&secured(), "sender@example.com").is_ok());
    }

    #[test]
    fn callbacks_are_republished_to_subscribers() {
        let message_received = Event::new();
        let session_completed = Event::new();
        let policy = BehaviourPolicy::new(
            Settings::default(),
            message_received.clone(),
            session_completed.clone(),
        );

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        message_received
            .subscribe(move |message: &Message| sink.lock().unwrap().push(message.from().to_string()));
        let sink = Arc::clone(&seen);
        session_completed
            .subscribe(move |session: &Session| sink.lock().unwrap().push(session.id.to_string()));

        let session_id = Uuid::new_v4();
        policy.on_message_received(Message::new(
            session_id,
            "a@example.com".to_string(),
            vec!["b@example.com".to_string()],
            b"Subject: x\r\n\r\n".to_vec(),
        ));
        policy.on_session_completed(Session {
            id: session_id,
            client_addr: None,
            started_at: chrono::Utc::now(),
            ended_at: chrono::Utc::now(),
            message_ids: vec![],
            log: String::new(),
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "a@example.com");
        assert_eq!(seen[1], session_id.to_string());
    }
}
