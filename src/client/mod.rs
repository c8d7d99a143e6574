// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! HTTP API client and upload coordinator.
//!
//! [`Client::put`] wires the whole pipeline together: the DAG is built into
//! the block store, exported as a CAR stream through an in-memory pipe,
//! split into chunks on the caller's task, and uploaded by a dedicated
//! worker consuming a bounded channel. Chunks upload strictly in split
//! order and a failed chunk aborts the remainder; retry policy belongs to
//! the caller.

mod error;
mod response;
mod status;

pub use error::Error;
pub use response::CarResponse;
pub use status::{Deal, DealStatus, IpfsLink, IpfsStatus, Pin, PinStatus, Status, UploadEntry};

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use reqwest::header;
use serde::Deserialize;
use tokio::io::{AsyncRead, BufReader};
use tracing::debug;
use url::Url;

use crate::car;
use crate::dag::{self, Adder, DirLister};
use crate::db::MemoryBlockstore;

/// Default service endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.web3.storage";
/// Default IPFS gateway endpoint for the secondary read paths.
pub const DEFAULT_IPFS_ENDPOINT: &str = "http://dweb.link";
/// Public gateway suffix for direct per-CID file fetches.
pub const GATEWAY_FILE_SUFFIX: &str = "ipfs.dweb.link";

pub use crate::car::DEFAULT_TARGET_CHUNK_SIZE;
pub use crate::dag::DEFAULT_LEAF_CHUNK_SIZE;

/// Buffer size of the export-to-split byte pipe.
const EXPORT_PIPE_CAPACITY: usize = 64 * 1024;
/// Chunks queued between the splitter and the upload worker. Uploads are
/// network-bound, so the splitter is expected to wait here.
const CHUNK_QUEUE_DEPTH: usize = 1;

/// Client configuration. Defaults come from the named constants above; the
/// token has no default and construction fails without one.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Url,
    pub ipfs_endpoint: Url,
    pub token: String,
    pub target_chunk_size: usize,
    pub leaf_chunk_size: usize,
}

impl Config {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.parse().expect("default endpoint is valid"),
            ipfs_endpoint: DEFAULT_IPFS_ENDPOINT
                .parse()
                .expect("default ipfs endpoint is valid"),
            token: token.into(),
            target_chunk_size: DEFAULT_TARGET_CHUNK_SIZE,
            leaf_chunk_size: DEFAULT_LEAF_CHUNK_SIZE,
        }
    }
}

/// Options for [`Client::put_with`].
#[derive(Default, Clone)]
pub struct PutOptions {
    /// Directory name for inputs built through a [`DirLister`].
    pub name: Option<String>,
    /// Directory-enumeration collaborator for inputs without native
    /// listing.
    pub lister: Option<Arc<dyn DirLister>>,
}

/// HTTP API client to a web3.storage-compatible service.
pub struct Client<BS = MemoryBlockstore> {
    cfg: Arc<Config>,
    http: reqwest::Client,
    store: Arc<BS>,
}

impl<BS> Clone for Client<BS> {
    fn clone(&self) -> Self {
        Self {
            cfg: self.cfg.clone(),
            http: self.http.clone(),
            store: self.store.clone(),
        }
    }
}

impl Client<MemoryBlockstore> {
    /// Create a client over the default in-memory block store.
    pub fn new(cfg: Config) -> Result<Self, Error> {
        Self::with_store(cfg, MemoryBlockstore::new())
    }
}

impl<BS> Client<BS>
where
    BS: Blockstore + Send + Sync + 'static,
{
    /// Create a client over a caller-provided block store.
    pub fn with_store(cfg: Config, store: BS) -> Result<Self, Error> {
        if cfg.token.is_empty() {
            return Err(Error::MissingToken);
        }
        if cfg.target_chunk_size == 0 || cfg.leaf_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "chunk sizes must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            cfg: Arc::new(cfg),
            http: reqwest::Client::new(),
            store: Arc::new(store),
        })
    }

    /// The content store backing this client.
    pub fn store(&self) -> &Arc<BS> {
        &self.store
    }

    /// Upload a file or directory and return the root CID of its DAG.
    ///
    /// A directory input's root is the CID of the directory's own node,
    /// never a synthetic wrapper. It is resolved by name out of the
    /// builder's staging root after the build.
    pub async fn put(&self, path: impl AsRef<Path>) -> Result<Cid, Error> {
        self.put_with(path, PutOptions::default()).await
    }

    pub async fn put_with(&self, path: impl AsRef<Path>, opts: PutOptions) -> Result<Cid, Error> {
        let mut adder = Adder::new(self.store.clone(), self.cfg.leaf_chunk_size);
        let root = if let Some(lister) = &opts.lister {
            let Some(name) = opts.name.as_deref() else {
                return Err(Error::InvalidConfig(
                    "a directory name is required with a custom lister".to_string(),
                ));
            };
            adder.add_dir_listed(lister.as_ref(), name).await?;
            adder.resolve(dag::base_name(name))?
        } else {
            let path = path.as_ref();
            adder.add_path(path).await?;
            adder.resolve(&dag::file_name(path))?
        };
        self.upload_dag(root).await
    }

    /// Upload a single file from a byte stream under the given name.
    pub async fn put_reader<R>(&self, name: &str, reader: R) -> Result<Cid, Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut adder = Adder::new(self.store.clone(), self.cfg.leaf_chunk_size);
        adder.add_reader(name, reader).await?;
        let root = adder.resolve(name)?;
        self.upload_dag(root).await
    }

    /// Export the DAG rooted at `root` from the block store and upload it.
    /// The export runs as a separate producer task; the pipe collapsing in
    /// either direction stops both sides.
    async fn upload_dag(&self, root: Cid) -> Result<Cid, Error> {
        let (pipe_writer, pipe_reader) = tokio::io::duplex(EXPORT_PIPE_CAPACITY);
        let store = self.store.clone();
        let exporter =
            tokio::spawn(async move { car::export_dag(&*store, root, pipe_writer).await });

        let uploaded = self.put_car(BufReader::new(pipe_reader)).await;
        let exported = exporter.await?;
        match (uploaded, exported) {
            (Ok(cid), _) => Ok(cid),
            // the exporter failing for its own reasons truncates the pipe
            // and surfaces downstream as a parse error; report the cause
            (Err(_), Err(e)) if !is_broken_pipe(&e) => Err(e.into()),
            (Err(e), _) => Err(e),
        }
    }

    /// Split a CAR stream into chunks and upload them in order.
    ///
    /// The CID the service reports for the last chunk is the root of the
    /// upload. A non-200 response or transport error on any chunk aborts
    /// the remaining sequence; nothing is retried and nothing is rolled
    /// back server-side (already-uploaded blocks are orphaned at worst,
    /// the store being content-addressed).
    pub async fn put_car<R>(&self, reader: R) -> Result<Cid, Error>
    where
        R: AsyncRead + Unpin,
    {
        let (tx, rx) = flume::bounded::<Bytes>(CHUNK_QUEUE_DEPTH);

        let http = self.http.clone();
        let cfg = self.cfg.clone();
        let worker = tokio::spawn(async move {
            let mut root = None;
            while let Ok(chunk) = rx.recv_async().await {
                let bytes = chunk.len();
                let cid = send_chunk(&http, &cfg, chunk).await?;
                debug!(%cid, bytes, "uploaded chunk");
                root = Some(cid);
            }
            Ok::<_, Error>(root)
        });

        let split = car::split_car(reader, self.cfg.target_chunk_size, tx).await;
        // always join the worker; the first real error wins. An upload
        // failure drops the receiver, so the splitter's Aborted is a
        // symptom, not the cause.
        let uploaded = worker.await??;
        split?;
        uploaded.ok_or_else(|| {
            Error::Car(car::Error::InvalidFile(
                "archive produced no chunks".to_string(),
            ))
        })
    }

    /// Pin and deal status for a CID.
    pub async fn status(&self, cid: &Cid) -> Result<Status, Error> {
        let res = self
            .http
            .get(self.endpoint(&format!("status/{cid}")))
            .header(header::AUTHORIZATION, self.bearer())
            .send()
            .await?;
        if res.status().as_u16() != 200 {
            return Err(Error::UnexpectedStatus(res.status().as_u16()));
        }
        Ok(res.json().await?)
    }

    /// Node data and links for a CID, via the IPFS endpoint.
    pub async fn ipfs_status(&self, cid: &Cid) -> Result<IpfsStatus, Error> {
        let res = self
            .http
            .post(self.ipfs_endpoint("api/v0/dag/get"))
            .query(&[("arg", cid.to_string())])
            .send()
            .await?;
        if res.status().as_u16() != 200 {
            return Err(Error::UnexpectedStatus(res.status().as_u16()));
        }
        Ok(res.json().await?)
    }

    /// Everything uploaded by the token's account.
    pub async fn list(&self) -> Result<Vec<UploadEntry>, Error> {
        let res = self
            .http
            .get(self.endpoint("user/uploads"))
            .header(header::AUTHORIZATION, self.bearer())
            .send()
            .await?;
        if res.status().as_u16() != 200 {
            return Err(Error::UnexpectedStatus(res.status().as_u16()));
        }
        Ok(res.json().await?)
    }

    /// Patch the remote display name of an upload.
    pub async fn rename(&self, cid: &Cid, name: &str) -> Result<(), Error> {
        let res = self
            .http
            .post(self.endpoint(&format!("user/uploads/{cid}/rename")))
            .header(header::AUTHORIZATION, self.bearer())
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        if res.status().as_u16() != 200 {
            return Err(Error::UnexpectedStatus(res.status().as_u16()));
        }
        Ok(())
    }

    /// Fetch a CAR from the service.
    pub async fn get(&self, cid: &Cid) -> Result<CarResponse, Error> {
        let res = self
            .http
            .get(self.endpoint(&format!("car/{cid}")))
            .header(header::AUTHORIZATION, self.bearer())
            .send()
            .await?;
        Ok(CarResponse::new(res))
    }

    /// Fetch a CAR through the IPFS endpoint's `dag/export`.
    pub async fn get_via_ipfs(&self, cid: &Cid) -> Result<CarResponse, Error> {
        let res = self
            .http
            .post(self.ipfs_endpoint("api/v0/dag/export"))
            .query(&[("arg", cid.to_string())])
            .header(header::AUTHORIZATION, self.bearer())
            .send()
            .await?;
        Ok(CarResponse::new(res))
    }

    /// Fetch a file object directly from the public gateway. The CID must
    /// name a file.
    pub async fn get_gateway_file(&self, cid: &Cid) -> Result<CarResponse, Error> {
        let res = self
            .http
            .get(format!("https://{cid}.{GATEWAY_FILE_SUFFIX}/"))
            .send()
            .await?;
        Ok(CarResponse::new(res))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.cfg.token)
    }

    fn endpoint(&self, path: &str) -> String {
        join_endpoint(&self.cfg.endpoint, path)
    }

    fn ipfs_endpoint(&self, path: &str) -> String {
        join_endpoint(&self.cfg.ipfs_endpoint, path)
    }
}

async fn send_chunk(http: &reqwest::Client, cfg: &Config, chunk: Bytes) -> Result<Cid, Error> {
    #[derive(Deserialize)]
    struct PutCarResponse {
        cid: String,
    }

    let res = http
        .post(join_endpoint(&cfg.endpoint, "car"))
        .header(header::AUTHORIZATION, format!("Bearer {}", cfg.token))
        .header(header::CONTENT_TYPE, "application/car")
        .body(chunk)
        .send()
        .await?;
    if res.status().as_u16() != 200 {
        return Err(Error::UnexpectedStatus(res.status().as_u16()));
    }
    let out: PutCarResponse = res.json().await?;
    Ok(out.cid.parse()?)
}

fn join_endpoint(base: &Url, path: &str) -> String {
    format!("{}/{path}", base.as_str().trim_end_matches('/'))
}

fn is_broken_pipe(err: &car::Error) -> bool {
    matches!(err, car::Error::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_requires_a_token() {
        assert!(matches!(
            Client::new(Config::new("")),
            Err(Error::MissingToken)
        ));
        assert!(Client::new(Config::new("secret")).is_ok());
    }

    #[test]
    fn construction_rejects_zero_chunk_sizes() {
        let mut cfg = Config::new("secret");
        cfg.target_chunk_size = 0;
        assert!(matches!(
            Client::new(cfg),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn endpoint_joining_tolerates_trailing_slashes() {
        let base: Url = "https://api.example.com/".parse().unwrap();
        assert_eq!(join_endpoint(&base, "car"), "https://api.example.com/car");
        let bare: Url = "https://api.example.com".parse().unwrap();
        assert_eq!(
            join_endpoint(&bare, "status/bafy"),
            "https://api.example.com/status/bafy"
        );
    }

    #[test]
    fn default_config_uses_named_constants() {
        let cfg = Config::new("secret");
        assert_eq!(cfg.endpoint.as_str().trim_end_matches('/'), DEFAULT_ENDPOINT);
        assert_eq!(cfg.target_chunk_size, DEFAULT_TARGET_CHUNK_SIZE);
        assert_eq!(cfg.leaf_chunk_size, DEFAULT_LEAF_CHUNK_SIZE);
    }
}
