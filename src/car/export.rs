// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use ahash::HashSet;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use tokio::io::AsyncWrite;

use super::{CarBlock, CarV1Header, CarWriter, Error};
use crate::dag::{extract_links, DAG_CBOR};

/// Serialize the DAG rooted at `root` out of `store` as a CARv1 stream.
///
/// Blocks are emitted depth-first, children in link order, each distinct
/// cid at most once. The splitter relies on exactly this order. The writer
/// runs as the producer half of a pipe; if the consumer goes away the next
/// write fails and the traversal stops.
pub async fn export_dag<BS, W>(store: &BS, root: Cid, writer: W) -> Result<(), Error>
where
    BS: Blockstore,
    W: AsyncWrite + Unpin,
{
    let mut car = CarWriter::new(&CarV1Header::new(vec![root]), writer)?;
    let mut seen: HashSet<Cid> = HashSet::default();
    let mut stack = vec![root];
    while let Some(cid) = stack.pop() {
        if !seen.insert(cid) {
            continue;
        }
        let data = store
            .get(&cid)
            .map_err(|e| Error::Other(e.to_string()))?
            .ok_or_else(|| Error::InvalidFile(format!("block {cid} missing from store")))?;
        let block = CarBlock { cid, data };
        car.write_block(&block).await?;
        if cid.codec() == DAG_CBOR {
            // rev() so the first link ends up on top of the stack
            stack.extend(extract_links(&block.data)?.into_iter().rev());
        }
    }
    car.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::CarStream;
    use crate::dag::Adder;
    use crate::db::MemoryBlockstore;
    use futures::TryStreamExt;
    use std::io::Cursor;
    use std::sync::Arc;

    async fn export_to_vec(store: &MemoryBlockstore, root: Cid) -> Vec<u8> {
        let mut buf = Vec::new();
        export_dag(store, root, &mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn exports_every_reachable_block_once() {
        let store = Arc::new(MemoryBlockstore::new());
        let mut adder = Adder::new(store.clone(), 4);
        // both chunks of the file are "aaaa", so the file links the same
        // leaf twice and the exporter must emit it once
        let root = adder
            .add_reader("a", Cursor::new(b"aaaaaaaa".to_vec()))
            .await
            .unwrap();

        let buf = export_to_vec(&store, root).await;
        let stream = CarStream::new(Cursor::new(buf)).await.unwrap();
        assert_eq!(stream.header.roots, vec![root]);
        let blocks: Vec<_> = stream.try_collect().await.unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].cid, root);
        assert_eq!(extract_links(&blocks[0].data).unwrap().len(), 2);
        for block in &blocks {
            block.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn preorder_parent_before_children() {
        let store = Arc::new(MemoryBlockstore::new());
        let mut adder = Adder::new(store.clone(), 2);
        let root = adder
            .add_reader("f", Cursor::new(b"abcdef".to_vec()))
            .await
            .unwrap();

        let buf = export_to_vec(&store, root).await;
        let stream = CarStream::new(Cursor::new(buf)).await.unwrap();
        let blocks: Vec<_> = stream.try_collect().await.unwrap();
        assert_eq!(blocks[0].cid, root);
        let children = extract_links(&blocks[0].data).unwrap();
        assert_eq!(
            blocks[1..].iter().map(|b| b.cid).collect::<Vec<_>>(),
            children
        );
    }

    #[tokio::test]
    async fn missing_block_aborts_export() {
        use multihash_codetable::{Code, MultihashDigest};

        let store = MemoryBlockstore::new();
        let root = Cid::new_v1(crate::dag::IPLD_RAW, Code::Blake2b256.digest(b"nowhere"));
        let mut buf = Vec::new();
        let err = export_dag(&store, root, &mut buf).await;
        assert!(matches!(err, Err(Error::InvalidFile(_))));
    }
}
