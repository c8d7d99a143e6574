// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use ipld_core::ipld::Ipld;

use super::Error;

/// Extract every [`Cid`] link from a `DAG_CBOR`-encoded blob, in encoding
/// order. This order defines the child order of a node for both the archive
/// exporter and the chunk splitter, so the two always agree on traversal.
pub fn extract_links(cbor_blob: &[u8]) -> Result<Vec<Cid>, Error> {
    let ipld: Ipld = serde_ipld_dagcbor::from_slice(cbor_blob)
        .map_err(|e| Error::Encoding(e.to_string()))?;
    let mut links = Vec::new();
    walk(&ipld, &mut links);
    Ok(links)
}

fn walk(node: &Ipld, out: &mut Vec<Cid>) {
    match node {
        Ipld::Map(map) => {
            for value in map.values() {
                walk(value, out);
            }
        }
        Ipld::List(list) => {
            for value in list {
                walk(value, out);
            }
        }
        Ipld::Link(cid) => out.push(*cid),
        _ => (),
    }
}
