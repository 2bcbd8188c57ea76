//! Email delivery through the Gmail API or SMTP.
//!
//! Both transports share one RFC 5322 builder (lettre). The Gmail API path
//! posts the formatted message base64url-encoded; the SMTP path relays it
//! over STARTTLS.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use newsdigest_shared::{NewsDigestError, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::credentials::CredentialStore;

/// Appended to a body that was cut to fit the size limit.
pub const TRUNCATION_NOTICE: &str =
    "\n\n[Content truncated for email delivery. The complete report is saved locally.]";

// ---------------------------------------------------------------------------
// Message model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    /// Optional HTML alternative of `text`.
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    /// Build the RFC 5322 message.
    pub fn to_mime(&self) -> Result<Message> {
        if self.to.is_empty() {
            return Err(NewsDigestError::validation("email has no recipients"));
        }

        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| NewsDigestError::validation(format!("invalid sender '{}': {e}", self.from)))?;
        let mut builder = Message::builder().from(from).subject(self.subject.clone());
        for to in &self.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| NewsDigestError::validation(format!("invalid recipient '{to}': {e}")))?;
            builder = builder.to(mailbox);
        }

        let mut body = match &self.html {
            Some(html) => MultiPart::mixed()
                .multipart(MultiPart::alternative_plain_html(self.text.clone(), html.clone())),
            None => MultiPart::mixed().singlepart(SinglePart::plain(self.text.clone())),
        };
        for attachment in &self.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                NewsDigestError::validation(format!(
                    "invalid content type '{}': {e}",
                    attachment.content_type
                ))
            })?;
            body = body.singlepart(
                MimeAttachment::new(attachment.filename.clone())
                    .body(attachment.bytes.clone(), content_type),
            );
        }

        builder
            .multipart(body)
            .map_err(|e| NewsDigestError::Delivery(format!("failed to build email: {e}")))
    }
}

/// Sends one message.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Short transport name used in logs and run summaries.
    fn name(&self) -> &'static str;
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Body size guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedBody {
    pub text: String,
    pub truncated: bool,
}

/// Cut `body` to at most `max_chars`, preferring a paragraph break and then a
/// sentence break inside the last fifth of the window, and append
/// [`TRUNCATION_NOTICE`].
pub fn truncate_body(body: &str, max_chars: usize) -> TruncatedBody {
    let Some((limit, _)) = body.char_indices().nth(max_chars) else {
        return TruncatedBody {
            text: body.to_string(),
            truncated: false,
        };
    };

    let window = &body[..limit];
    let floor = window
        .char_indices()
        .nth(max_chars * 4 / 5)
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    let cut = window
        .rfind("\n\n")
        .filter(|&pos| pos >= floor)
        .or_else(|| {
            window
                .rfind(". ")
                .filter(|&pos| pos >= floor)
                .map(|pos| pos + 1)
        })
        .unwrap_or(limit);

    TruncatedBody {
        text: format!("{}{TRUNCATION_NOTICE}", body[..cut].trim_end()),
        truncated: true,
    }
}

// ---------------------------------------------------------------------------
// Gmail API
// ---------------------------------------------------------------------------

/// Sends through `users/me/messages/send` with a cached OAuth token.
pub struct GmailApiSender {
    http: reqwest::Client,
    api_url: String,
    store: Arc<dyn CredentialStore>,
}

#[derive(Serialize)]
struct RawMessage {
    raw: String,
}

impl GmailApiSender {
    pub fn new(api_url: impl Into<String>, store: Arc<dyn CredentialStore>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("NewsDigest/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| NewsDigestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            store,
        })
    }
}

#[async_trait]
impl EmailSender for GmailApiSender {
    fn name(&self) -> &'static str {
        "gmail-api"
    }

    #[instrument(skip_all, fields(recipients = message.to.len()))]
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let token = self
            .store
            .load()?
            .ok_or_else(|| NewsDigestError::Delivery("no cached Gmail access token".into()))?;

        let raw = URL_SAFE.encode(message.to_mime()?.formatted());
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&token)
            .json(&RawMessage { raw })
            .send()
            .await
            .map_err(|e| NewsDigestError::Network(format!("{}: {e}", self.api_url)))?;

        let status = response.status();
        if status.as_u16() == 401 {
            // Expired or revoked: drop it so the next run re-reads the environment.
            self.store.clear()?;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsDigestError::Api {
                service: "gmail",
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        info!(to = message.to.len(), "email sent via Gmail API");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SMTP
// ---------------------------------------------------------------------------

/// STARTTLS relay with username/app-password login.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpSender {
    pub fn new(host: &str, user: &str, password: &str, timeout: Duration) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| NewsDigestError::config(format!("invalid SMTP host '{host}': {e}")))?
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .timeout(Some(timeout))
            .build();
        Ok(Self { transport })
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    fn name(&self) -> &'static str {
        "smtp"
    }

    #[instrument(skip_all, fields(recipients = message.to.len()))]
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mime = message.to_mime()?;
        self.transport
            .send(mime)
            .await
            .map_err(|e| NewsDigestError::Delivery(format!("SMTP send failed: {e}")))?;
        info!(to = message.to.len(), "email sent via SMTP");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fallback chain
// ---------------------------------------------------------------------------

/// Tries each sender in order; the first success wins.
pub struct FallbackSender {
    senders: Vec<Box<dyn EmailSender>>,
}

impl FallbackSender {
    pub fn new(senders: Vec<Box<dyn EmailSender>>) -> Self {
        Self { senders }
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[async_trait]
impl EmailSender for FallbackSender {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.senders.is_empty() {
            return Err(NewsDigestError::config("no email transport is configured"));
        }
        let mut failures = Vec::new();
        for sender in &self.senders {
            match sender.send(message).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(transport = sender.name(), error = %e, "email transport failed");
                    failures.push(format!("{}: {e}", sender.name()));
                }
            }
        }
        Err(NewsDigestError::Delivery(format!(
            "all email transports failed ({})",
            failures.join("; ")
        )))
    }
}
