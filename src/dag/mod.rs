// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Merkle DAG construction.
//!
//! Files are split into fixed-size raw leaf blocks linked under a
//! [`FileNode`]; directories become [`DirNode`]s mapping entry names to
//! child roots. Every node is `DAG_CBOR`-encoded and written to the block
//! store under a Blake2b-256 CIDv1 before the build returns, so the DAG is
//! durable by the time it is exported.

mod links;

pub use links::extract_links;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Multicodec for raw leaf blocks.
pub const IPLD_RAW: u64 = 0x55;
/// Multicodec for `DAG_CBOR`-encoded interior nodes.
pub const DAG_CBOR: u64 = 0x71;

/// Default size of a raw leaf chunk.
pub const DEFAULT_LEAF_CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("node encoding error: {0}")]
    Encoding(String),
    #[error("block store error: {0}")]
    Store(anyhow::Error),
    #[error("no entry named {0:?} under the staging root")]
    NotFound(String),
}

/// Interior node of a file: ordered leaf chunks plus the total byte size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub size: u64,
    pub chunks: Vec<Cid>,
}

/// Directory node. Entry names are unique and sorted, which keeps the
/// encoding (and therefore the CID) independent of enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirNode {
    pub entries: BTreeMap<String, Cid>,
}

/// A directory entry reported by a [`DirLister`].
#[derive(Debug, Clone)]
pub struct ListedEntry {
    pub name: String,
    pub dir: bool,
}

/// Directory-enumeration collaborator, for inputs that do not support
/// native listing. Paths handed back to [`DirLister::open`] are the listed
/// names joined with `/`, rooted at the directory name the build started
/// from.
#[async_trait]
pub trait DirLister: Send + Sync {
    async fn entries(&self, dir: &str) -> std::io::Result<Vec<ListedEntry>>;

    async fn open(&self, path: &str) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// Builds DAGs into a block store.
///
/// The adder keeps a mutable staging root, a name-to-CID map every built
/// top-level entry is registered in. [`Adder::resolve`] looks an entry up
/// again; for directory inputs this is how the directory's own node CID is
/// returned instead of a synthetic wrapper around it.
pub struct Adder<BS> {
    store: Arc<BS>,
    leaf_chunk_size: usize,
    staging: BTreeMap<String, Cid>,
}

impl<BS: Blockstore> Adder<BS> {
    pub fn new(store: Arc<BS>, leaf_chunk_size: usize) -> Self {
        Self {
            store,
            leaf_chunk_size,
            staging: BTreeMap::new(),
        }
    }

    /// Build a DAG from a file or directory on disk and register it in the
    /// staging root under its file name.
    pub async fn add_path(&mut self, path: &Path) -> Result<Cid, Error> {
        let meta = tokio::fs::metadata(path).await?;
        let name = file_name(path);
        let cid = if meta.is_dir() {
            self.add_dir(path).await?
        } else {
            let file = tokio::fs::File::open(path).await?;
            self.build_file(file).await?
        };
        self.staging.insert(name, cid);
        Ok(cid)
    }

    /// Build a single-file DAG from a byte stream and register it under
    /// `name`.
    pub async fn add_reader<R>(&mut self, name: &str, reader: R) -> Result<Cid, Error>
    where
        R: AsyncRead + Unpin,
    {
        let cid = self.build_file(reader).await?;
        self.staging.insert(name.to_string(), cid);
        Ok(cid)
    }

    /// Build a directory DAG from a [`DirLister`] instead of native
    /// enumeration and register it under the base name of `dirname`.
    pub async fn add_dir_listed(
        &mut self,
        lister: &dyn DirLister,
        dirname: &str,
    ) -> Result<Cid, Error> {
        let cid = self.build_listed_dir(lister, dirname).await?;
        self.staging.insert(base_name(dirname).to_string(), cid);
        Ok(cid)
    }

    /// Look up a previously built entry in the staging root.
    pub fn resolve(&self, name: &str) -> Result<Cid, Error> {
        self.staging
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn add_dir(&self, dir: &Path) -> Result<Cid, Error> {
        let mut entries = BTreeMap::new();
        let mut listing = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = listing.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let cid = if entry.file_type().await?.is_dir() {
                // async fns cannot self-recurse without boxing
                Box::pin(self.add_dir(&entry.path())).await?
            } else {
                let file = tokio::fs::File::open(entry.path()).await?;
                self.build_file(file).await?
            };
            entries.insert(name, cid);
        }
        self.put_node(&DirNode { entries })
    }

    async fn build_listed_dir(&self, lister: &dyn DirLister, dir: &str) -> Result<Cid, Error> {
        let mut entries = BTreeMap::new();
        for entry in lister.entries(dir).await? {
            let path = join_listed(dir, &entry.name);
            let cid = if entry.dir {
                Box::pin(self.build_listed_dir(lister, &path)).await?
            } else {
                let reader = lister.open(&path).await?;
                self.build_file(reader).await?
            };
            entries.insert(entry.name, cid);
        }
        self.put_node(&DirNode { entries })
    }

    async fn build_file<R>(&self, mut reader: R) -> Result<Cid, Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunks = Vec::new();
        let mut size = 0u64;
        loop {
            let chunk = read_chunk(&mut reader, self.leaf_chunk_size).await?;
            if chunk.is_empty() {
                break;
            }
            size += chunk.len() as u64;
            let short = chunk.len() < self.leaf_chunk_size;
            chunks.push(self.put_block(IPLD_RAW, &chunk)?);
            if short {
                break;
            }
        }
        self.put_node(&FileNode { size, chunks })
    }

    fn put_node<T: Serialize>(&self, node: &T) -> Result<Cid, Error> {
        let data = serde_ipld_dagcbor::to_vec(node).map_err(|e| Error::Encoding(e.to_string()))?;
        self.put_block(DAG_CBOR, &data)
    }

    fn put_block(&self, codec: u64, data: &[u8]) -> Result<Cid, Error> {
        let cid = Cid::new_v1(codec, Code::Blake2b256.digest(data));
        self.store.put_keyed(&cid, data).map_err(Error::Store)?;
        Ok(cid)
    }
}

/// Read up to `limit` bytes, short only at end of stream.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; limit];
    let mut filled = 0;
    while filled < limit {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

pub(crate) fn base_name(dirname: &str) -> &str {
    dirname.rsplit('/').next().unwrap_or(dirname)
}

fn join_listed(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
