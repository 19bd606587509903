// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transfer strategies and the fallback chain that runs them in priority order.
//!
//! 1. [`DirectRelay`]: native forward, no payload touches this process.
//! 2. [`Reupload`]: fetch the content and send it as a new message.
//! 3. [`ChunkedTransfer`]: stream large media through fixed-size windows and
//!    finalize at the destination after the last window.

use async_trait::async_trait;
use conduit_config::model::{EngineConfig, RetryBudget};
use conduit_core::{
    ConduitError, ErrorKind, ForwardSession, OutboundContent, PlatformClient, PlatformError,
    SourceMessage, TargetId,
};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::rate::RateController;
use crate::recording;
use crate::retry::{AttemptTally, RetryPolicy, with_retry};

const MIB: u64 = 1024 * 1024;

/// What a strategy needs to talk to the platform on behalf of a session.
pub struct StrategyContext<'a> {
    pub platform: &'a dyn PlatformClient,
    pub session: &'a ForwardSession,
}

/// One way of getting a message to the target chat.
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, message: &SourceMessage) -> bool;

    async fn attempt(
        &self,
        ctx: &StrategyContext<'_>,
        message: &SourceMessage,
    ) -> Result<TargetId, PlatformError>;
}

pub struct DirectRelay;

#[async_trait]
impl TransferStrategy for DirectRelay {
    fn name(&self) -> &'static str {
        "direct_relay"
    }

    fn applies_to(&self, _message: &SourceMessage) -> bool {
        true
    }

    async fn attempt(
        &self,
        ctx: &StrategyContext<'_>,
        message: &SourceMessage,
    ) -> Result<TargetId, PlatformError> {
        ctx.platform
            .forward(&ctx.session.source_chat, &ctx.session.target_chat, message.id)
            .await
    }
}

/// Downloads the whole payload into memory, so it only handles media up to the chunk threshold.
pub struct Reupload {
    threshold: u64,
}

impl Reupload {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl TransferStrategy for Reupload {
    fn name(&self) -> &'static str {
        "reupload"
    }

    fn applies_to(&self, message: &SourceMessage) -> bool {
        message.media_size().is_none_or(|size| size <= self.threshold)
    }

    async fn attempt(
        &self,
        ctx: &StrategyContext<'_>,
        message: &SourceMessage,
    ) -> Result<TargetId, PlatformError> {
        let bytes = match &message.media {
            Some(_) => {
                let mut stream = ctx
                    .platform
                    .download(&ctx.session.source_chat, message)
                    .await?;
                let mut body = Vec::new();
                while let Some(piece) = stream.next().await {
                    body.extend_from_slice(&piece?);
                }
                Some(body)
            }
            None => None,
        };
        let content = OutboundContent {
            source_id: message.id,
            kind: message.kind,
            text: message.text.clone(),
            caption: message.caption.clone(),
            media: message.media.clone(),
            bytes,
        };
        ctx.platform
            .upload_and_send(&ctx.session.target_chat, content)
            .await
    }
}

/// Streams media above the threshold; at most one window is held in memory.
pub struct ChunkedTransfer {
    threshold: u64,
    chunk_size: usize,
}

impl ChunkedTransfer {
    pub fn new(threshold: u64, chunk_size: usize) -> Self {
        Self {
            threshold,
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl TransferStrategy for ChunkedTransfer {
    fn name(&self) -> &'static str {
        "chunked_transfer"
    }

    fn applies_to(&self, message: &SourceMessage) -> bool {
        message.media_size().is_some_and(|size| size > self.threshold)
    }

    async fn attempt(
        &self,
        ctx: &StrategyContext<'_>,
        message: &SourceMessage,
    ) -> Result<TargetId, PlatformError> {
        let media = message
            .media
            .as_ref()
            .ok_or_else(|| PlatformError::Unknown("chunked transfer without media".into()))?;
        let mut stream = ctx
            .platform
            .download(&ctx.session.source_chat, message)
            .await?;
        let handle = ctx
            .platform
            .begin_upload(&ctx.session.target_chat, media)
            .await?;

        let mut window: Vec<u8> = Vec::with_capacity(self.chunk_size);
        let mut parts = 0u32;
        while let Some(piece) = stream.next().await {
            let piece = piece?;
            let mut rest = piece.as_slice();
            while !rest.is_empty() {
                let take = (self.chunk_size - window.len()).min(rest.len());
                window.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
                if window.len() == self.chunk_size {
                    let full = std::mem::replace(&mut window, Vec::with_capacity(self.chunk_size));
                    ctx.platform.upload_part(&handle, parts, full).await?;
                    parts += 1;
                }
            }
        }
        if !window.is_empty() {
            ctx.platform.upload_part(&handle, parts, window).await?;
            parts += 1;
        }
        if parts == 0 {
            return Err(PlatformError::Unknown("download produced no bytes".into()));
        }
        debug!(source_id = message.id, parts, "all windows uploaded");
        ctx.platform
            .finish_upload(&handle, parts, message.caption.clone())
            .await
    }
}

/// Final result of running the chain for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Forwarded {
        target_id: TargetId,
        strategy: &'static str,
    },
    /// The message disappeared between fetch and transfer.
    Deleted,
    /// Every applicable strategy failed.
    Exhausted {
        kind: ErrorKind,
        message: String,
        strategy: &'static str,
    },
}

/// Ordered strategies plus the retry rules applied to each of them.
pub struct StrategyChain {
    strategies: Vec<Box<dyn TransferStrategy>>,
    policy: RetryPolicy,
    budget_mode: RetryBudget,
}

impl StrategyChain {
    pub fn new(engine: &EngineConfig, policy: RetryPolicy) -> Self {
        let threshold = engine.chunk_threshold_mb.saturating_mul(MIB);
        Self::with_strategies(
            vec![
                Box::new(DirectRelay),
                Box::new(Reupload::new(threshold)),
                Box::new(ChunkedTransfer::new(threshold, engine.chunk_size_bytes)),
            ],
            policy,
            engine.retry_budget,
        )
    }

    pub fn with_strategies(
        strategies: Vec<Box<dyn TransferStrategy>>,
        policy: RetryPolicy,
        budget_mode: RetryBudget,
    ) -> Self {
        Self {
            strategies,
            policy,
            budget_mode,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each applicable strategy until one succeeds.
    ///
    /// Only loss of authorization escapes as an error; every other platform
    /// failure is folded into the outcome.
    pub async fn run(
        &self,
        ctx: &StrategyContext<'_>,
        message: &SourceMessage,
        max_retries: u32,
        tally: &mut AttemptTally,
        rate: &mut RateController,
    ) -> Result<ChainOutcome, ConduitError> {
        let mut shared_budget = max_retries;
        let mut last: Option<(&'static str, PlatformError)> = None;

        for strategy in self.strategies.iter().filter(|s| s.applies_to(message)) {
            let mut own_budget = max_retries;
            let budget = match self.budget_mode {
                RetryBudget::PerStrategy => &mut own_budget,
                RetryBudget::Shared => &mut shared_budget,
            };
            let name = strategy.name();
            let result = with_retry(name, &self.policy, budget, tally, rate, || {
                strategy.attempt(ctx, message)
            })
            .await;

            match result {
                Ok(target_id) => {
                    debug!(source_id = message.id, strategy = name, target_id, "transferred");
                    return Ok(ChainOutcome::Forwarded {
                        target_id,
                        strategy: name,
                    });
                }
                Err(PlatformError::NotFound) => return Ok(ChainOutcome::Deleted),
                Err(PlatformError::Unauthorized(msg)) => {
                    return Err(ConduitError::Unauthorized(msg));
                }
                Err(err) => {
                    warn!(
                        source_id = message.id,
                        strategy = name,
                        error = %err,
                        "strategy failed, escalating"
                    );
                    recording::record_escalation(name);
                    last = Some((name, err));
                }
            }
        }

        Ok(match last {
            Some((strategy, err)) => ChainOutcome::Exhausted {
                kind: err.kind(),
                message: err.to_string(),
                strategy,
            },
            None => ChainOutcome::Exhausted {
                kind: ErrorKind::Unknown,
                message: "no applicable strategy".into(),
                strategy: "none",
            },
        })
    }
}
