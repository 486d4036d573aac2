//! Serialized form of a domain aggregate.
//!
//! ```text
//! StoredAggregate (bincode)
//!  total_count: u64
//!  is_personal: bool
//!  earliest_ms / latest_ms: Option<i64>   epoch milliseconds
//!  senders: BTreeMap<address, StoredSender>
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::aggregate::{DomainAggregate, SenderAggregate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSender {
    pub count: u64,
    pub earliest_ms: Option<i64>,
    pub latest_ms: Option<i64>,
}

/// One overflow store value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAggregate {
    pub total_count: u64,
    pub is_personal: bool,
    pub earliest_ms: Option<i64>,
    pub latest_ms: Option<i64>,
    pub senders: BTreeMap<String, StoredSender>,
}

impl StoredAggregate {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    pub fn into_aggregate(self) -> DomainAggregate {
        DomainAggregate {
            total_count: self.total_count,
            is_personal: self.is_personal,
            earliest: from_millis(self.earliest_ms),
            latest: from_millis(self.latest_ms),
            senders: self
                .senders
                .into_iter()
                .map(|(address, s)| {
                    (
                        address,
                        SenderAggregate {
                            count: s.count,
                            earliest: from_millis(s.earliest_ms),
                            latest: from_millis(s.latest_ms),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl From<&DomainAggregate> for StoredAggregate {
    fn from(aggregate: &DomainAggregate) -> Self {
        Self {
            total_count: aggregate.total_count,
            is_personal: aggregate.is_personal,
            earliest_ms: aggregate.earliest.map(|d| d.timestamp_millis()),
            latest_ms: aggregate.latest.map(|d| d.timestamp_millis()),
            senders: aggregate
                .senders
                .iter()
                .map(|(address, s)| {
                    (
                        address.clone(),
                        StoredSender {
                            count: s.count,
                            earliest_ms: s.earliest.map(|d| d.timestamp_millis()),
                            latest_ms: s.latest.map(|d| d.timestamp_millis()),
                        },
                    )
                })
                .collect(),
        }
    }
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}
