// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging-platform collaborator.
//!
//! The engine only ever talks to the platform through this trait. Every call
//! returns a typed [`PlatformError`] so the engine can classify the outcome
//! without knowing anything about the wire protocol.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::PlatformError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MediaInfo, OutboundContent, SourceId, SourceMessage, TargetId, UploadHandle};

/// A downloaded file body, delivered in pieces.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, PlatformError>> + Send>>;

#[async_trait]
pub trait PlatformClient: PluginAdapter {
    /// Server-side relay of a message from one feed to another.
    async fn forward(
        &self,
        source_chat: &str,
        target_chat: &str,
        id: SourceId,
    ) -> Result<TargetId, PlatformError>;

    /// Fetches a single message. A missing message is `PlatformError::NotFound`.
    async fn fetch(&self, chat: &str, id: SourceId) -> Result<SourceMessage, PlatformError>;

    /// Streams the attached file of a message.
    async fn download(
        &self,
        chat: &str,
        message: &SourceMessage,
    ) -> Result<ByteStream, PlatformError>;

    /// Re-emits fully buffered content in the target feed.
    async fn upload_and_send(
        &self,
        target_chat: &str,
        content: OutboundContent,
    ) -> Result<TargetId, PlatformError>;

    /// Opens a chunked upload. Nothing is visible in the target until [`finish_upload`](Self::finish_upload).
    async fn begin_upload(
        &self,
        target_chat: &str,
        media: &MediaInfo,
    ) -> Result<UploadHandle, PlatformError>;

    /// Uploads one window of a chunked transfer. Parts are numbered from 0.
    async fn upload_part(
        &self,
        handle: &UploadHandle,
        index: u32,
        bytes: Vec<u8>,
    ) -> Result<(), PlatformError>;

    /// Publishes a completed chunked upload.
    async fn finish_upload(
        &self,
        handle: &UploadHandle,
        parts: u32,
        caption: Option<String>,
    ) -> Result<TargetId, PlatformError>;

    /// Highest message id currently in the feed, if the feed is non-empty.
    async fn latest_message_id(&self, chat: &str) -> Result<Option<SourceId>, PlatformError>;
}
