// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// CAR stream, export and split errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse CAR file: {0}")]
    Parsing(String),
    #[error("invalid CAR file: {0}")]
    InvalidFile(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cbor encoding error: {0}")]
    Encoding(String),
    #[error("chunk consumer dropped")]
    Aborted,
    #[error("CAR error: {0}")]
    Other(String),
}

impl From<crate::dag::Error> for Error {
    fn from(err: crate::dag::Error) -> Error {
        Error::Parsing(err.to_string())
    }
}
