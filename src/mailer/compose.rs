//! Message composer: builds one outbound message per recipient.

use std::path::Path;

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

use crate::error::ComposeError;

/// Sender mailbox: address plus optional display name.
#[derive(Debug, Clone)]
pub struct SenderIdentity {
    pub address: String,
    pub name: Option<String>,
}

/// The configured attachment, read once per run.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    Loaded {
        file_name: String,
        content: Vec<u8>,
        content_type: ContentType,
    },
    /// Configured but unreadable; messages go out without it.
    Unavailable { file_name: String, reason: String },
}

impl AttachmentSource {
    /// Read the file at `path`. Never fails: a missing or unreadable file
    /// becomes [`AttachmentSource::Unavailable`].
    pub async fn load(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::Unavailable {
                    file_name,
                    reason: "file not found".into(),
                };
            }
            Err(e) => {
                return Self::Unavailable {
                    file_name,
                    reason: e.to_string(),
                };
            }
        };

        match ContentType::parse(mime_for(path)) {
            Ok(content_type) => Self::Loaded {
                file_name,
                content,
                content_type,
            },
            Err(e) => Self::Unavailable {
                file_name,
                reason: e.to_string(),
            },
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            Self::Loaded { file_name, .. } | Self::Unavailable { file_name, .. } => file_name,
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// A composed message plus any attachment that had to be left off.
#[derive(Debug)]
pub struct Composed {
    pub message: Message,
    /// `(file name, reason)` when a configured attachment was omitted.
    pub skipped_attachment: Option<(String, String)>,
}

/// Build a `multipart/mixed` message: one plain-text part, plus the
/// attachment when it is available.
pub fn compose(
    sender: &SenderIdentity,
    recipient: &str,
    subject: &str,
    body: String,
    attachment: Option<&AttachmentSource>,
) -> Result<Composed, ComposeError> {
    let from = Mailbox::new(sender.name.clone(), parse_address(&sender.address)?);
    let to = Mailbox::new(None, parse_address(recipient)?);

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body));
    let mut skipped_attachment = None;

    match attachment {
        Some(AttachmentSource::Loaded {
            file_name,
            content,
            content_type,
        }) => {
            parts = parts.singlepart(
                Attachment::new(file_name.clone()).body(content.clone(), content_type.clone()),
            );
        }
        Some(AttachmentSource::Unavailable { file_name, reason }) => {
            skipped_attachment = Some((file_name.clone(), reason.clone()));
        }
        None => {}
    }

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(parts)?;

    Ok(Composed {
        message,
        skipped_attachment,
    })
}

fn parse_address(address: &str) -> Result<lettre::Address, ComposeError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| ComposeError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}
