//! External collaborators - The renderer, artifact storage and notification sender.
//!
//! The billing core only talks to these through the traits defined here; the
//! concrete adapters (Telegram over HTTP, files on disk, plain-text invoices) are
//! wired together by the binary.

pub mod artifacts;
pub mod notifier;
pub mod renderer;
pub mod retry;
pub mod telegram;

pub use artifacts::{ArtifactKey, ArtifactStore, FsArtifactStore};
pub use notifier::{AlbumItem, Notification, Notifier, NotifierError, NotifierResponse};
pub use renderer::{InvoiceRenderer, InvoiceView, Language, TextInvoiceRenderer};
pub use retry::{RetryPolicy, send_with_retry};
pub use telegram::TelegramNotifier;
