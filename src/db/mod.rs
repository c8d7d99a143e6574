// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Content store backends. The service-facing pipeline only depends on the
//! [`fvm_ipld_blockstore::Blockstore`] capability; [`MemoryBlockstore`] is
//! the default backing when the caller supplies none.

mod memory;

pub use memory::MemoryBlockstore;
