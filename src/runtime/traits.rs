//! Trait abstractions for runtime I/O
//!
//! These traits let the runtime be tested with in-memory implementations.

use crate::conversation::LearnerProgress;
use crate::db::{Database, SessionRecord};
use crate::transport::ImageAttachment;
use async_trait::async_trait;
use base64::Engine as _;
use std::sync::Arc;
use thiserror::Error;

/// Storage for sessions and learner progress
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save_session(&self, record: &SessionRecord) -> Result<(), String>;

    async fn load_session(&self, id: &str) -> Result<SessionRecord, String>;

    async fn latest_session(&self) -> Result<Option<SessionRecord>, String>;

    async fn save_progress(&self, progress: &LearnerProgress) -> Result<(), String>;

    async fn load_progress(&self) -> Result<LearnerProgress, String>;
}

#[derive(Debug, Error, PartialEq)]
pub enum ImageError {
    #[error("Image is too large ({size_mb:.1} MB). Please use an image under 5 MB.")]
    TooLarge { size_mb: f64 },
    #[error("Could not read image: {0}")]
    Unreadable(String),
    #[error("Unsupported image type: {0}")]
    Unsupported(String),
}

/// Turns a picked image into an upload-ready attachment
pub trait ImageOptimizer: Send + Sync {
    fn optimize(&self, file_name: &str, bytes: &[u8]) -> Result<ImageAttachment, ImageError>;
}

/// Renders assistant markdown into display text
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> String;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn save_session(&self, record: &SessionRecord) -> Result<(), String> {
        (**self).save_session(record).await
    }

    async fn load_session(&self, id: &str) -> Result<SessionRecord, String> {
        (**self).load_session(id).await
    }

    async fn latest_session(&self) -> Result<Option<SessionRecord>, String> {
        (**self).latest_session().await
    }

    async fn save_progress(&self, progress: &LearnerProgress) -> Result<(), String> {
        (**self).save_progress(progress).await
    }

    async fn load_progress(&self) -> Result<LearnerProgress, String> {
        (**self).load_progress().await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use `Database` as `ConversationStore`
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for DatabaseStore {
    async fn save_session(&self, record: &SessionRecord) -> Result<(), String> {
        self.db.save_session(record).map_err(|e| e.to_string())
    }

    async fn load_session(&self, id: &str) -> Result<SessionRecord, String> {
        self.db.get_session(id).map_err(|e| e.to_string())
    }

    async fn latest_session(&self) -> Result<Option<SessionRecord>, String> {
        self.db.latest_session().map_err(|e| e.to_string())
    }

    async fn save_progress(&self, progress: &LearnerProgress) -> Result<(), String> {
        self.db.save_progress(progress).map_err(|e| e.to_string())
    }

    async fn load_progress(&self) -> Result<LearnerProgress, String> {
        self.db.load_progress().map_err(|e| e.to_string())
    }
}

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Base64-encodes images as they are, enforcing the upload size limit
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64ImageOptimizer;

impl ImageOptimizer for Base64ImageOptimizer {
    fn optimize(&self, file_name: &str, bytes: &[u8]) -> Result<ImageAttachment, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Unreadable("file is empty".to_string()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            #[allow(clippy::cast_precision_loss)]
            let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
            return Err(ImageError::TooLarge { size_mb });
        }

        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::IMAGE {
            return Err(ImageError::Unsupported(mime.essence_str().to_string()));
        }

        Ok(ImageAttachment {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime.essence_str().to_string(),
        })
    }
}

/// CommonMark to HTML
#[derive(Debug, Clone, Copy, Default)]
pub struct CmarkRenderer;

impl MarkdownRenderer for CmarkRenderer {
    fn render(&self, markdown: &str) -> String {
        let mut options = pulldown_cmark::Options::empty();
        options.insert(pulldown_cmark::Options::ENABLE_TABLES);
        options.insert(pulldown_cmark::Options::ENABLE_STRIKETHROUGH);
        options.insert(pulldown_cmark::Options::ENABLE_MATH);

        let parser = pulldown_cmark::Parser::new_ext(markdown, options);
        let mut html = String::with_capacity(markdown.len() * 3 / 2);
        pulldown_cmark::html::push_html(&mut html, parser);
        html
    }
}
