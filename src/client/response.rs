// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::Bytes;
use cid::Cid;
use futures::{Stream, StreamExt, TryStreamExt};
use fvm_ipld_blockstore::Blockstore;
use tokio_util::io::StreamReader;

use super::Error;
use crate::car;

/// Raw byte response from one of the read-side endpoints (`/car/{cid}`, an
/// IPFS `dag/export`, or a direct gateway fetch), wrapped for
/// block-service-backed decoding.
pub struct CarResponse {
    response: reqwest::Response,
}

impl CarResponse {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self { response }
    }

    /// HTTP status the endpoint answered with.
    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// The response body as a byte stream.
    pub fn bytes_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> {
        self.response.bytes_stream()
    }

    /// The whole response body.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        Ok(self.response.bytes().await?)
    }

    /// Decode the body as a CAR archive into `store`, validating every
    /// block, and return the archive's roots.
    pub async fn load_into<BS: Blockstore>(self, store: &BS) -> Result<Vec<Cid>, Error> {
        if self.response.status().as_u16() != 200 {
            return Err(Error::UnexpectedStatus(self.response.status().as_u16()));
        }
        let reader = StreamReader::new(
            self.response
                .bytes_stream()
                .map_err(std::io::Error::other)
                .boxed(),
        );
        let header = car::load_car(store, reader).await?;
        Ok(header.roots)
    }
}
