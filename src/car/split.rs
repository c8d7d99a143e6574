// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::VecDeque;

use ahash::HashSet;
use bytes::{BufMut, Bytes, BytesMut};
use cid::Cid;
use futures::TryStreamExt;
use tokio::io::AsyncRead;

use super::{CarBlock, CarStream, CarV1Header, Error};
use crate::dag::{extract_links, DAG_CBOR};

/// Soft target for one chunk. Cuts only land on subtree boundaries, so a
/// single oversized subtree may push a chunk past this.
pub const DEFAULT_TARGET_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Split a CARv1 stream into chunks that are each an independently
/// decodable archive sharing the original root.
///
/// The input must carry its blocks in depth-first preorder with children in
/// link order and no duplicate emission, which is the order [`export_dag`]
/// writes.
/// The walk is mirrored here with an explicit stack; a chunk boundary is
/// inserted only immediately after a complete subtree closes and the
/// running chunk has reached `target_size`. Each chunk opens with the
/// header and a replay of the spine (the blocks on the path from the root
/// to the open subtree), so every reference inside a chunk resolves either
/// within it, in an earlier chunk, or in the chunk continuing the still
/// open subtree.
///
/// Chunks are delivered over `tx` in order; the receiver disconnecting
/// aborts the split with [`Error::Aborted`]. Memory stays bounded by one
/// chunk plus the spine.
///
/// [`export_dag`]: super::export_dag
pub async fn split_car<R>(
    reader: R,
    target_size: usize,
    tx: flume::Sender<Bytes>,
) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
{
    let mut stream = CarStream::new(reader).await?;
    if stream.header.roots.len() != 1 {
        return Err(Error::InvalidFile(
            "tree-walk splitting requires a single root".to_string(),
        ));
    }
    let root = stream.header.roots[0];
    let header_frame = CarV1Header::new(vec![root]).to_frame()?;

    let mut sink = ChunkSink::new(target_size, header_frame, tx);
    let mut seen: HashSet<Cid> = HashSet::default();
    // stack[0] is a virtual frame expecting the root; every frame above it
    // holds the not-yet-emitted children of spine[i - 1]
    let mut stack: Vec<VecDeque<Cid>> = vec![VecDeque::from([root])];
    let mut spine: Vec<CarBlock> = Vec::new();
    let mut subtree_closed = false;

    sink.begin(&spine)?;

    'walk: loop {
        // drop children already emitted, close exhausted frames
        loop {
            let Some(top) = stack.last_mut() else {
                break 'walk;
            };
            while top.front().is_some_and(|cid| seen.contains(cid)) {
                top.pop_front();
            }
            if top.is_empty() {
                stack.pop();
                if !stack.is_empty() {
                    spine.pop();
                }
                subtree_closed = true;
            } else {
                break;
            }
        }
        if subtree_closed {
            sink.cut_if_full(&spine).await?;
            subtree_closed = false;
        }

        let Some(expected) = stack.last_mut().and_then(VecDeque::pop_front) else {
            return Err(Error::Other("traversal stack corrupted".to_string()));
        };
        let block = stream.try_next().await?.ok_or_else(|| {
            Error::InvalidFile(format!("archive truncated: expected block {expected}"))
        })?;
        if block.cid != expected {
            return Err(Error::InvalidFile(format!(
                "block {} out of traversal order, expected {expected}",
                block.cid
            )));
        }
        seen.insert(block.cid);
        let links = if block.cid.codec() == DAG_CBOR {
            extract_links(&block.data)?
        } else {
            Vec::new()
        };
        sink.push(&block)?;
        if links.is_empty() {
            // a block without children is itself a complete subtree
            subtree_closed = true;
        } else {
            stack.push(links.into());
            spine.push(block);
        }
    }

    if stream.try_next().await?.is_some() {
        return Err(Error::InvalidFile(
            "blocks remain after the root's subtree closed".to_string(),
        ));
    }
    sink.finish().await
}

struct ChunkSink {
    target_size: usize,
    header_frame: Bytes,
    tx: flume::Sender<Bytes>,
    buf: BytesMut,
    fresh_blocks: usize,
}

impl ChunkSink {
    fn new(target_size: usize, header_frame: Bytes, tx: flume::Sender<Bytes>) -> Self {
        Self {
            target_size,
            header_frame,
            tx,
            buf: BytesMut::new(),
            fresh_blocks: 0,
        }
    }

    /// Open a chunk: header first, then a replay of the open spine so the
    /// chunk decodes on its own.
    fn begin(&mut self, spine: &[CarBlock]) -> Result<(), Error> {
        self.buf.extend_from_slice(&self.header_frame);
        for block in spine {
            block.write(&mut (&mut self.buf).writer())?;
        }
        self.fresh_blocks = 0;
        Ok(())
    }

    fn push(&mut self, block: &CarBlock) -> Result<(), Error> {
        block.write(&mut (&mut self.buf).writer())?;
        self.fresh_blocks += 1;
        Ok(())
    }

    /// Ship the running chunk if it has reached the target. Only called
    /// right after a complete subtree closed; `fresh_blocks` guarantees
    /// forward progress even when the spine replay alone is oversized.
    async fn cut_if_full(&mut self, spine: &[CarBlock]) -> Result<(), Error> {
        if self.fresh_blocks > 0 && self.buf.len() >= self.target_size {
            self.ship().await?;
            self.begin(spine)?;
        }
        Ok(())
    }

    async fn ship(&mut self) -> Result<(), Error> {
        let chunk = self.buf.split().freeze();
        tracing::debug!(
            bytes = chunk.len(),
            blocks = self.fresh_blocks,
            "chunk ready"
        );
        self.tx.send_async(chunk).await.map_err(|_| Error::Aborted)
    }

    async fn finish(mut self) -> Result<(), Error> {
        if self.fresh_blocks > 0 {
            self.ship().await?;
        }
        Ok(())
    }
}
