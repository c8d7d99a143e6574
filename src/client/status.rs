// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Wire model for the service's status, listing and IPFS endpoints.
//!
//! These types are only ever produced by decoding service responses, and
//! the decoding fails closed: unrecognized enum strings, malformed
//! CIDs/peer IDs/addresses and unparsable timestamps are hard errors, never
//! silently defaulted. Fields the service declares optional decode
//! absent-or-empty to `None`.

use chrono::{DateTime, FixedOffset};
use cid::Cid;
use fvm_shared::address::Address;
use libp2p_identity::PeerId;
use serde::Deserialize;
use std::fmt;

/// IPFS pin and storage-deal status for a given CID.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(with = "stringify")]
    pub cid: Cid,
    #[serde(default)]
    pub dag_size: u64,
    #[serde(with = "timestamp")]
    pub created: DateTime<FixedOffset>,
    #[serde(default)]
    pub pins: Vec<Pin>,
    #[serde(default)]
    pub deals: Vec<Deal>,
}

/// A remote peer's commitment to retain the data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    #[serde(with = "stringify")]
    pub peer_id: PeerId,
    #[serde(default)]
    pub peer_name: String,
    #[serde(default)]
    pub region: String,
    pub status: PinStatus,
    #[serde(with = "timestamp")]
    pub updated: DateTime<FixedOffset>,
}

/// Pin lifecycle state. Exactly the three wire variants: the strict decode
/// rejects anything else, so no lenient catch-all state exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PinStatus {
    Pinned,
    Pinning,
    PinQueued,
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PinStatus::Pinned => "Pinned",
            PinStatus::Pinning => "Pinning",
            PinStatus::PinQueued => "PinQueued",
        })
    }
}

/// A storage contract with a storage provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    #[serde(default)]
    pub deal_id: u64,
    #[serde(with = "stringify")]
    pub storage_provider: Address,
    pub status: DealStatus,
    #[serde(default, with = "opt_stringify")]
    pub piece_cid: Option<Cid>,
    #[serde(default, with = "opt_stringify")]
    pub data_cid: Option<Cid>,
    #[serde(default)]
    pub data_model_selector: String,
    #[serde(default, with = "opt_timestamp")]
    pub activation: Option<DateTime<FixedOffset>>,
    #[serde(with = "timestamp")]
    pub created: DateTime<FixedOffset>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DealStatus {
    Queued,
    Published,
    Active,
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DealStatus::Queued => "Queued",
            DealStatus::Published => "Published",
            DealStatus::Active => "Active",
        })
    }
}

/// `dag/get` response from an IPFS endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IpfsStatus {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub links: Vec<IpfsLink>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IpfsLink {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Size", default)]
    pub size: i64,
    #[serde(rename = "Cid", with = "dag_json_cid")]
    pub cid: Cid,
}

/// One element of the `user/uploads` listing. Kept as the raw wire strings:
/// the listing is a lightweight inventory, not a validated status report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEntry {
    #[serde(default)]
    pub name: String,
    pub cid: String,
    #[serde(default)]
    pub dag_size: u64,
    #[serde(default)]
    pub created: String,
}

/// The service's timestamp format: ISO-8601 with seconds and either a
/// literal `Z` or a numeric `±hhmm` zone offset. Nothing else is accepted.
pub(crate) mod timestamp {
    use chrono::{DateTime, FixedOffset, NaiveDateTime};
    use serde::{Deserialize, Deserializer};

    const DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S";
    const DATE_TIME_OFFSET: &str = "%Y-%m-%dT%H:%M:%S%z";

    pub fn parse(s: &str) -> chrono::ParseResult<DateTime<FixedOffset>> {
        if let Some(naive) = s.strip_suffix('Z') {
            NaiveDateTime::parse_from_str(naive, DATE_TIME)
                .map(|date_time| date_time.and_utc().fixed_offset())
        } else {
            DateTime::parse_from_str(s, DATE_TIME_OFFSET)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Optional timestamp: absent or empty means unset.
pub(crate) mod opt_timestamp {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => super::timestamp::parse(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Decode a string-backed value through its `FromStr` impl, failing the
/// whole decode on malformed input.
pub(crate) mod stringify {
    use serde::{Deserialize, Deserializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Optional string-backed value: absent or empty means unset.
pub(crate) mod opt_stringify {
    use serde::{Deserialize, Deserializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

/// CIDs in DAG-JSON form, `{"/": "<cid>"}`.
pub(crate) mod dag_json_cid {
    use cid::Cid;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    struct DagJsonCid {
        #[serde(rename = "/")]
        slash: String,
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Cid, D::Error>
    where
        D: Deserializer<'de>,
    {
        let DagJsonCid { slash } = DagJsonCid::deserialize(deserializer)?;
        slash.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DAG_CBOR;
    use multihash_codetable::{Code, MultihashDigest};

    const PEER: &str = "QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N";

    fn some_cid() -> Cid {
        Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(b"status fixture"))
    }

    #[test]
    fn status_fixture_decodes() {
        let json = format!(
            r#"{{
                "cid": "{cid}",
                "dagSize": 123,
                "created": "2021-10-01T00:00:00Z",
                "pins": [{{
                    "peerId": "{PEER}",
                    "peerName": "p1",
                    "region": "r1",
                    "status": "Pinned",
                    "updated": "2021-10-01T00:00:00Z"
                }}],
                "deals": []
            }}"#,
            cid = some_cid()
        );
        let status: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(status.cid, some_cid());
        assert_eq!(status.dag_size, 123);
        assert_eq!(
            status.created,
            timestamp::parse("2021-10-01T00:00:00Z").unwrap()
        );
        assert_eq!(status.pins.len(), 1);
        assert_eq!(status.pins[0].status, PinStatus::Pinned);
        assert_eq!(status.pins[0].peer_id.to_string(), PEER);
        assert!(status.deals.is_empty());
    }

    #[test]
    fn unknown_pin_status_is_rejected() {
        let json = format!(
            r#"{{"peerId": "{PEER}", "status": "Bogus", "updated": "2021-10-01T00:00:00Z"}}"#
        );
        assert!(serde_json::from_str::<Pin>(&json).is_err());
    }

    #[test]
    fn malformed_peer_id_is_rejected() {
        let json =
            r#"{"peerId": "not-a-peer", "status": "Pinned", "updated": "2021-10-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<Pin>(json).is_err());
    }

    #[test]
    fn deal_decodes_with_optional_fields_absent() {
        let json = r#"{
            "dealId": 42,
            "storageProvider": "f01234",
            "status": "Active",
            "pieceCid": "",
            "created": "2021-10-01T00:00:00Z",
            "updated": "2021-10-02T12:30:00+0530"
        }"#;
        let deal: Deal = serde_json::from_str(json).unwrap();
        assert_eq!(deal.deal_id, 42);
        assert_eq!(deal.storage_provider.to_string(), "f01234");
        assert_eq!(deal.status, DealStatus::Active);
        assert_eq!(deal.piece_cid, None);
        assert_eq!(deal.data_cid, None);
        assert_eq!(deal.activation, None);
        assert_eq!(deal.updated.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn unknown_deal_status_is_rejected() {
        let json = r#"{
            "storageProvider": "f01234",
            "status": "Bogus",
            "created": "2021-10-01T00:00:00Z",
            "updated": "2021-10-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<Deal>(json).is_err());
    }

    #[test]
    fn malformed_provider_address_is_rejected() {
        let json = r#"{
            "storageProvider": "definitely-not-an-address",
            "status": "Queued",
            "created": "2021-10-01T00:00:00Z",
            "updated": "2021-10-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<Deal>(json).is_err());
    }

    #[test]
    fn timestamp_grammar_is_exact() {
        assert!(timestamp::parse("2021-10-01T00:00:00Z").is_ok());
        assert!(timestamp::parse("2021-10-01T05:30:00+0530").is_ok());
        assert!(timestamp::parse("2021-10-01T05:30:00-0800").is_ok());
        // missing zone, space separator, subseconds: all rejected
        assert!(timestamp::parse("2021-10-01T00:00:00").is_err());
        assert!(timestamp::parse("2021-10-01 00:00:00Z").is_err());
        assert!(timestamp::parse("2021-10-01T00:00:00.000Z").is_err());
    }

    #[test]
    fn pin_status_displays_wire_strings() {
        assert_eq!(PinStatus::Pinned.to_string(), "Pinned");
        assert_eq!(PinStatus::Pinning.to_string(), "Pinning");
        assert_eq!(PinStatus::PinQueued.to_string(), "PinQueued");
        assert_eq!(DealStatus::Queued.to_string(), "Queued");
    }

    #[test]
    fn ipfs_status_decodes_dag_json_links() {
        let json = format!(
            r#"{{"data": "CAE=", "links": [{{"Name": "child", "Size": 7, "Cid": {{"/": "{cid}"}}}}]}}"#,
            cid = some_cid()
        );
        let status: IpfsStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status.links.len(), 1);
        assert_eq!(status.links[0].name, "child");
        assert_eq!(status.links[0].size, 7);
        assert_eq!(status.links[0].cid, some_cid());
    }

    #[test]
    fn upload_entry_decodes() {
        let json = r#"[{"name": "photos", "cid": "bafy", "dagSize": 9, "created": "whenever"}]"#;
        let entries: Vec<UploadEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].name, "photos");
        assert_eq!(entries[0].cid, "bafy");
    }
}
