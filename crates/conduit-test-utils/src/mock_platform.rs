// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging platform for deterministic testing.
//!
//! `MockPlatform` holds a set of source messages, answers every
//! [`PlatformClient`] call from it, and captures what was sent. Failures and
//! latency can be scripted per `(operation, source id)`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::{
    AdapterType, ByteStream, ConduitError, ContentKind, HealthStatus, MediaInfo, OutboundContent,
    PlatformClient, PlatformError, PluginAdapter, SourceId, SourceMessage, TargetId, UploadHandle,
};

/// Size of the pieces a mock download stream yields.
const DOWNLOAD_PIECE: usize = 256 * 1024;

/// First target id handed out; later sends count up from here.
const FIRST_TARGET_ID: TargetId = 1000;

/// Platform operations that can be scripted and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Fetch,
    Forward,
    Download,
    UploadAndSend,
    BeginUpload,
    UploadPart,
    FinishUpload,
    /// Keyed on id 0.
    LatestMessageId,
}

/// One message delivered to the target chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub source_id: SourceId,
    pub target_id: TargetId,
    /// The call that completed the delivery.
    pub via: Op,
}

#[derive(Default)]
struct Script {
    once: VecDeque<PlatformError>,
    always: Option<PlatformError>,
    latency: Option<Duration>,
}

struct State {
    messages: BTreeMap<SourceId, SourceMessage>,
    scripts: HashMap<(Op, SourceId), Script>,
    calls: HashMap<(Op, SourceId), u32>,
    sent: Vec<SentMessage>,
    uploads: HashMap<String, SourceId>,
    parts: Vec<usize>,
    latest: Option<SourceId>,
    next_target: TargetId,
    next_upload: u64,
}

pub struct MockPlatform {
    state: Mutex<State>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                messages: BTreeMap::new(),
                scripts: HashMap::new(),
                calls: HashMap::new(),
                sent: Vec::new(),
                uploads: HashMap::new(),
                parts: Vec::new(),
                latest: None,
                next_target: FIRST_TARGET_ID,
                next_upload: 1,
            }),
        }
    }

    /// A platform holding text messages for every id in `from..=to`.
    pub fn with_text_range(from: SourceId, to: SourceId) -> Self {
        let platform = Self::new();
        for id in from..=to {
            platform.add_text(id);
        }
        platform
    }

    pub fn text_message(id: SourceId) -> SourceMessage {
        SourceMessage {
            id,
            kind: ContentKind::Text,
            text: Some(format!("message {id}")),
            caption: None,
            media: None,
        }
    }

    pub fn media_message(id: SourceId, kind: ContentKind, size_bytes: u64) -> SourceMessage {
        SourceMessage {
            id,
            kind,
            text: None,
            caption: Some(format!("caption {id}")),
            media: Some(MediaInfo {
                file_unique_id: format!("file-{id}"),
                size_bytes,
                file_name: Some(format!("file-{id}.bin")),
                mime_type: Some("application/octet-stream".into()),
            }),
        }
    }

    pub fn add_message(&self, message: SourceMessage) {
        self.lock().messages.insert(message.id, message);
    }

    pub fn add_text(&self, id: SourceId) {
        self.add_message(Self::text_message(id));
    }

    pub fn add_media(&self, id: SourceId, kind: ContentKind, size_bytes: u64) {
        self.add_message(Self::media_message(id, kind, size_bytes));
    }

    /// Delete a source message; later calls for it return `NotFound`.
    pub fn remove(&self, id: SourceId) {
        self.lock().messages.remove(&id);
    }

    /// Fail the next call of `op` for `id` with `err`. Calls queue up.
    pub fn fail_once(&self, op: Op, id: SourceId, err: PlatformError) {
        self.lock()
            .scripts
            .entry((op, id))
            .or_default()
            .once
            .push_back(err);
    }

    /// Fail every call of `op` for `id` with `err` once queued failures are used up.
    pub fn fail_always(&self, op: Op, id: SourceId, err: PlatformError) {
        self.lock().scripts.entry((op, id)).or_default().always = Some(err);
    }

    pub fn clear_failures(&self, op: Op, id: SourceId) {
        if let Some(script) = self.lock().scripts.get_mut(&(op, id)) {
            script.once.clear();
            script.always = None;
        }
    }

    /// Delay every call of `op` for `id` by `latency`.
    pub fn set_latency(&self, op: Op, id: SourceId, latency: Duration) {
        self.lock().scripts.entry((op, id)).or_default().latency = Some(latency);
    }

    /// Override the id reported by `latest_message_id`.
    pub fn set_latest(&self, latest: SourceId) {
        self.lock().latest = Some(latest);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn sent_ids(&self) -> Vec<SourceId> {
        self.lock().sent.iter().map(|s| s.source_id).collect()
    }

    pub fn calls(&self, op: Op, id: SourceId) -> u32 {
        self.lock().calls.get(&(op, id)).copied().unwrap_or(0)
    }

    pub fn total_calls(&self, op: Op) -> u32 {
        self.lock()
            .calls
            .iter()
            .filter(|((o, _), _)| *o == op)
            .map(|(_, n)| n)
            .sum()
    }

    /// Sizes of every uploaded part, in call order.
    pub fn uploaded_parts(&self) -> Vec<usize> {
        self.lock().parts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call, apply scripted latency, then any scripted failure.
    async fn enter(&self, op: Op, id: SourceId) -> Result<(), PlatformError> {
        let (latency, failure) = {
            let mut state = self.lock();
            *state.calls.entry((op, id)).or_default() += 1;
            match state.scripts.get_mut(&(op, id)) {
                Some(script) => (
                    script.latency,
                    script.once.pop_front().or_else(|| script.always.clone()),
                ),
                None => (None, None),
            }
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn message(&self, id: SourceId) -> Result<SourceMessage, PlatformError> {
        self.lock()
            .messages
            .get(&id)
            .cloned()
            .ok_or(PlatformError::NotFound)
    }

    fn deliver(&self, source_id: SourceId, via: Op) -> TargetId {
        let mut state = self.lock();
        let target_id = state.next_target;
        state.next_target += 1;
        state.sent.push(SentMessage {
            source_id,
            target_id,
            via,
        });
        target_id
    }

    fn upload_source(&self, handle: &UploadHandle) -> Result<SourceId, PlatformError> {
        self.lock()
            .uploads
            .get(&handle.upload_id)
            .copied()
            .ok_or_else(|| PlatformError::Unknown(format!("unknown upload {}", handle.upload_id)))
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockPlatform {
    fn name(&self) -> &str {
        "mock-platform"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }

    async fn health_check(&self) -> Result<HealthStatus, ConduitError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConduitError> {
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn forward(
        &self,
        _source_chat: &str,
        _target_chat: &str,
        id: SourceId,
    ) -> Result<TargetId, PlatformError> {
        self.enter(Op::Forward, id).await?;
        self.message(id)?;
        Ok(self.deliver(id, Op::Forward))
    }

    async fn fetch(&self, _chat: &str, id: SourceId) -> Result<SourceMessage, PlatformError> {
        self.enter(Op::Fetch, id).await?;
        self.message(id)
    }

    async fn download(
        &self,
        _chat: &str,
        message: &SourceMessage,
    ) -> Result<ByteStream, PlatformError> {
        self.enter(Op::Download, message.id).await?;
        let stored = self.message(message.id)?;
        let size = stored.media_size().unwrap_or(0) as usize;
        let fill = (message.id % 251) as u8;
        let mut pieces = Vec::new();
        let mut left = size;
        while left > 0 {
            let n = left.min(DOWNLOAD_PIECE);
            pieces.push(Ok(vec![fill; n]));
            left -= n;
        }
        Ok(Box::pin(futures::stream::iter(pieces)))
    }

    async fn upload_and_send(
        &self,
        _target_chat: &str,
        content: OutboundContent,
    ) -> Result<TargetId, PlatformError> {
        self.enter(Op::UploadAndSend, content.source_id).await?;
        if let (Some(media), Some(bytes)) = (&content.media, &content.bytes) {
            if bytes.len() as u64 != media.size_bytes {
                return Err(PlatformError::Unknown(format!(
                    "expected {} bytes, got {}",
                    media.size_bytes,
                    bytes.len()
                )));
            }
        }
        Ok(self.deliver(content.source_id, Op::UploadAndSend))
    }

    async fn begin_upload(
        &self,
        _target_chat: &str,
        media: &MediaInfo,
    ) -> Result<UploadHandle, PlatformError> {
        let source_id = self
            .lock()
            .messages
            .values()
            .find(|m| {
                m.media
                    .as_ref()
                    .is_some_and(|info| info.file_unique_id == media.file_unique_id)
            })
            .map(|m| m.id)
            .ok_or(PlatformError::NotFound)?;
        self.enter(Op::BeginUpload, source_id).await?;

        let mut state = self.lock();
        let upload_id = format!("upload-{}", state.next_upload);
        state.next_upload += 1;
        state.uploads.insert(upload_id.clone(), source_id);
        Ok(UploadHandle {
            upload_id,
            target_chat: "mock".into(),
        })
    }

    async fn upload_part(
        &self,
        handle: &UploadHandle,
        _index: u32,
        bytes: Vec<u8>,
    ) -> Result<(), PlatformError> {
        let source_id = self.upload_source(handle)?;
        self.enter(Op::UploadPart, source_id).await?;
        self.lock().parts.push(bytes.len());
        Ok(())
    }

    async fn finish_upload(
        &self,
        handle: &UploadHandle,
        parts: u32,
        _caption: Option<String>,
    ) -> Result<TargetId, PlatformError> {
        let source_id = self.upload_source(handle)?;
        self.enter(Op::FinishUpload, source_id).await?;
        if parts == 0 {
            return Err(PlatformError::Unknown("finish without parts".into()));
        }
        self.lock().uploads.remove(&handle.upload_id);
        Ok(self.deliver(source_id, Op::FinishUpload))
    }

    async fn latest_message_id(&self, _chat: &str) -> Result<Option<SourceId>, PlatformError> {
        self.enter(Op::LatestMessageId, 0).await?;
        let state = self.lock();
        Ok(state
            .latest
            .or_else(|| state.messages.keys().next_back().copied()))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn scripted_failures_run_out() {
        let platform = MockPlatform::with_text_range(1, 2);
        platform.fail_once(Op::Forward, 1, PlatformError::TransientNetwork("x".into()));

        assert!(platform.forward("a", "b", 1).await.is_err());
        assert_eq!(platform.forward("a", "b", 1).await, Ok(FIRST_TARGET_ID));
        assert_eq!(platform.forward("a", "b", 2).await, Ok(FIRST_TARGET_ID + 1));
        assert_eq!(platform.calls(Op::Forward, 1), 2);
        assert_eq!(platform.sent_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let platform = MockPlatform::with_text_range(1, 3);
        platform.remove(2);
        assert_eq!(platform.fetch("a", 2).await, Err(PlatformError::NotFound));
        assert_eq!(platform.latest_message_id("a").await, Ok(Some(3)));
    }

    #[tokio::test]
    async fn download_yields_full_size() {
        let platform = MockPlatform::new();
        platform.add_media(4, ContentKind::Photo, 600 * 1024);
        let msg = MockPlatform::media_message(4, ContentKind::Photo, 600 * 1024);
        let mut stream = platform.download("a", &msg).await.expect("download");
        let mut total = 0;
        while let Some(piece) = stream.next().await {
            total += piece.expect("piece").len();
        }
        assert_eq!(total, 600 * 1024);
    }
}
