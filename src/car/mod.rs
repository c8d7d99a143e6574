// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! CARv1 (Content Addressable aRchive) streaming.
//!
//! An archive is a varint-framed header followed by varint-framed
//! `(cid, block)` records. [`CarStream`] decodes one lazily; [`CarWriter`]
//! produces one; [`export_dag`] serializes a DAG out of a block store and
//! [`split_car`] cuts an archive into independently decodable chunks along
//! subtree boundaries.

mod error;
mod export;
mod split;

pub use error::Error;
pub use export::export_dag;
pub use split::{split_car, DEFAULT_TARGET_CHUNK_SIZE};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use cid::Cid;
use futures::{ready, Stream, StreamExt};
use fvm_ipld_blockstore::Blockstore;
use integer_encoding::VarInt;
use multihash_codetable::{Code, MultihashDigest};
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Encoder, FramedRead};
use unsigned_varint::codec::UviBytes;

pub const CAR_VERSION: u64 = 1;

/// CAR file header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CarV1Header {
    pub roots: Vec<Cid>,
    pub version: u64,
}

impl CarV1Header {
    pub fn new(roots: Vec<Cid>) -> Self {
        Self {
            roots,
            version: CAR_VERSION,
        }
    }

    /// The header as a varint-framed byte string, ready to lead an archive.
    pub fn to_frame(&self) -> Result<Bytes, Error> {
        let bytes =
            serde_ipld_dagcbor::to_vec(self).map_err(|e| Error::Encoding(e.to_string()))?;
        let mut frame = BytesMut::new();
        UviBytes::default()
            .encode(Bytes::from(bytes), &mut frame)
            .map_err(|e| Error::Encoding(e.to_string()))?;
        Ok(frame.freeze())
    }
}

/// One `(cid, block)` record of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CarBlock {
    pub cid: Cid,
    pub data: Vec<u8>,
}

impl CarBlock {
    /// Write a varint frame containing the cid and the data.
    pub fn write(&self, writer: &mut impl io::Write) -> io::Result<()> {
        let frame_length = self.cid.encoded_len() + self.data.len();
        writer.write_all(&frame_length.encode_var_vec())?;
        self.cid
            .write_bytes(&mut *writer)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Size of the full varint frame this block writes.
    pub fn frame_length(&self) -> usize {
        let payload = self.cid.encoded_len() + self.data.len();
        payload.required_space() + payload
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> io::Result<CarBlock> {
        let bytes: Bytes = bytes.into();
        let mut cursor = bytes.reader();
        let cid = Cid::read_bytes(&mut cursor)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let bytes = cursor.into_inner();
        Ok(CarBlock {
            cid,
            data: bytes.to_vec(),
        })
    }

    /// Check that the cid actually commits to the data.
    pub fn validate(&self) -> Result<(), Error> {
        let code = Code::try_from(self.cid.hash().code())
            .map_err(|e| Error::Parsing(e.to_string()))?;
        let actual = Cid::new_v1(self.cid.codec(), code.digest(&self.data));
        if actual != self.cid {
            return Err(Error::InvalidFile(format!(
                "cid/block mismatch for block {}, actual: {actual}",
                self.cid
            )));
        }
        Ok(())
    }
}

pin_project! {
    /// Lazy stream of the blocks of a CARv1 archive. The header is parsed
    /// and validated up front.
    pub struct CarStream<R> {
        #[pin]
        reader: FramedRead<R, UviBytes>,
        pub header: CarV1Header,
    }
}

impl<R: AsyncRead + Unpin> CarStream<R> {
    pub async fn new(reader: R) -> Result<Self, Error> {
        let mut reader = FramedRead::new(reader, UviBytes::default());
        let frame = reader
            .next()
            .await
            .ok_or_else(|| Error::Parsing("failed to read uvarint frame for header".to_string()))?
            .map_err(Error::Io)?;
        let header: CarV1Header = serde_ipld_dagcbor::from_slice(&frame)
            .map_err(|e| Error::Parsing(e.to_string()))?;
        if header.roots.is_empty() {
            return Err(Error::Parsing("empty CAR file".to_string()));
        }
        if header.version != CAR_VERSION {
            return Err(Error::InvalidFile("CAR file version must be 1".to_string()));
        }
        Ok(CarStream { reader, header })
    }
}

impl<R: AsyncRead> Stream for CarStream<R> {
    type Item = io::Result<CarBlock>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let item = ready!(this.reader.poll_next(cx));
        Poll::Ready(item.map(|ret| ret.and_then(CarBlock::from_bytes)))
    }
}

/// Buffered CARv1 writer. The header frame is staged on construction and
/// flushed with the first block.
pub struct CarWriter<W> {
    inner: W,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> CarWriter<W> {
    pub fn new(header: &CarV1Header, writer: W) -> Result<Self, Error> {
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&header.to_frame()?);
        Ok(Self {
            inner: writer,
            buffer,
        })
    }

    pub async fn write_block(&mut self, block: &CarBlock) -> Result<(), Error> {
        block.write(&mut (&mut self.buffer).writer())?;
        self.inner.write_all(&self.buffer).await?;
        self.buffer.clear();
        Ok(())
    }

    /// Flush any staged bytes (the bare header, for an empty archive) and
    /// the inner writer.
    pub async fn finish(mut self) -> Result<(), Error> {
        if !self.buffer.is_empty() {
            self.inner.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        self.inner.flush().await?;
        Ok(())
    }
}

/// Stream every record of a CAR archive into a block store, validating each
/// block against its cid. The store is not restored to its original state
/// in case of errors.
pub async fn load_car<R>(store: &impl Blockstore, reader: R) -> Result<CarV1Header, Error>
where
    R: AsyncRead + Unpin,
{
    use futures::TryStreamExt;

    let mut stream = CarStream::new(reader).await?;
    while let Some(block) = stream.try_next().await? {
        block.validate()?;
        store
            .put_keyed(&block.cid, &block.data)
            .map_err(|e| Error::Other(e.to_string()))?;
    }
    Ok(stream.header)
}
