use crate::engine::types::Message;
use crate::error_handling::types::CaptureError;
use crate::inspect::part_tree::PartNode;
use mail_parser::MessageParser;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// A captured [`Message`] plus its viewed flag.
///
/// The flag starts false and flips to true exactly once, either through an
/// explicit [`CapturedMessage::mark_viewed`] or implicitly through any save
/// or inspect action. It never reverts.
pub struct CapturedMessage {
    message: Message,
    viewed: AtomicBool,
}

impl CapturedMessage {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            viewed: AtomicBool::new(false),
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn has_been_viewed(&self) -> bool {
        self.viewed.load(Ordering::Relaxed)
    }

    pub fn mark_viewed(&self) {
        self.viewed.store(true, Ordering::Relaxed);
    }

    /// Writes the raw payload to `path`, byte for byte. No re-encoding, so a
    /// saved file re-opened in a mail client reproduces the original
    /// transmission exactly. A failure here is recoverable and leaves the
    /// store untouched.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CaptureError> {
        self.mark_viewed();
        let mut reader = self.message.open_data();
        let mut file = File::create(path)?;
        io::copy(&mut reader, &mut file)?;
        Ok(())
    }

    /// Parses the payload into a MIME part tree. Parsed on demand; the raw
    /// stream is left untouched.
    pub fn inspect(&self) -> Result<PartNode, CaptureError> {
        self.mark_viewed();
        PartNode::parse(self.message.raw())
    }

    /// Subject taken from the parsed headers, when the payload parses at all.
    pub fn subject(&self) -> Option<String> {
        MessageParser::default()
            .parse(self.message.raw())
            .and_then(|parsed| parsed.subject().map(str::to_string))
    }

    /// Recipients joined for display, mirroring the envelope rather than the
    /// To: header.
    pub fn to_display(&self) -> String {
        self.message.to().join(", ")
    }
}
