//! Delivery adapters: text-to-speech, email, and cached credentials.
//!
//! The pipeline only sees the [`SpeechSynthesizer`] and [`EmailSender`]
//! traits; concrete adapters are picked and configured by the CLI.

mod credentials;
mod email;
mod speech;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use email::{
    Attachment, EmailMessage, EmailSender, FallbackSender, GmailApiSender, SmtpSender,
    TRUNCATION_NOTICE, TruncatedBody, truncate_body,
};
pub use speech::{ElevenLabsSynthesizer, SpeechSynthesizer};
