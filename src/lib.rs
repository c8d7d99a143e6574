// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Client library for web3.storage-compatible content-addressable storage
//! services.
//!
//! An upload is a pipeline of four streaming stages:
//! 1. [`dag::Adder`] chunks files and directories into a Merkle DAG and
//!    writes every block to a [`fvm_ipld_blockstore::Blockstore`].
//! 2. [`car::export_dag`] serializes the DAG as a CARv1 byte stream,
//!    depth-first from the root.
//! 3. [`car::split_car`] cuts the stream into bounded-size chunks along
//!    subtree boundaries, each chunk an independently decodable CAR.
//! 4. [`Client::put_car`] uploads the chunks in order and returns the CID
//!    the service reports for the last one.
//!
//! The stages run concurrently and hand off through bounded pipes and
//! channels, so neither the DAG nor the archive is ever buffered whole.
//!
//! ```no_run
//! # async fn example() -> Result<(), w3s::client::Error> {
//! use w3s::{Client, Config};
//!
//! let client = Client::new(Config::new("<api token>"))?;
//! let root = client.put("./photos").await?;
//! let status = client.status(&root).await?;
//! println!("{root} pinned {} times", status.pins.len());
//! # Ok(())
//! # }
//! ```

pub mod car;
pub mod client;
pub mod dag;
pub mod db;

pub use cid::Cid;
pub use client::{Client, Config, PutOptions};
pub use db::MemoryBlockstore;
