// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Client-facing error taxonomy. Construction errors surface before any
/// network use; everything else aborts the in-flight operation and is never
/// retried here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing auth token")]
    MissingToken,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Dag(#[from] crate::dag::Error),
    #[error(transparent)]
    Car(#[from] crate::car::Error),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response status: {0}")]
    UnexpectedStatus(u16),
    #[error("invalid cid in response: {0}")]
    Cid(#[from] cid::Error),
    #[error("upload worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
