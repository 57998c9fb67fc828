// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inbound records and outbound queue items.
//!
//! An envelope is the body of one feed notification: a JSON array whose elements are
//! records. Records are kept as the raw JSON text they arrived as, so the relay never
//! depends on their schema. Train movement records carry a `header` and a `body`
//! object, see <http://nrodwiki.rockshore.net/index.php/Train_Movement>.

use crate::errors::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::value::RawValue;
use uuid::Uuid;

const PRETTY_INDENT: &[u8] = b"    ";

/// One decoded unit from the feed, held as its original JSON encoding.
#[derive(Debug, Clone)]
pub struct Record {
    raw: Box<RawValue>,
}

impl Record {
    /// The record exactly as it appeared in the envelope.
    pub fn raw_json(&self) -> &str {
        self.raw.get()
    }

    /// Size in bytes of the record's original encoding.
    pub fn encoded_len(&self) -> usize {
        self.raw.get().len()
    }

    /// Re-encodes the record as indented JSON.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(self.raw.get())?;
        let mut out = Vec::with_capacity(self.raw.get().len() * 2);
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(PRETTY_INDENT));
        value.serialize(&mut serializer)?;
        String::from_utf8(out).map_err(<serde_json::Error as serde::ser::Error>::custom)
    }

    /// Builds the outbound queue item for this record under a fresh identifier.
    pub fn to_outbound_item(&self) -> Result<OutboundItem, serde_json::Error> {
        Ok(OutboundItem::new(self.to_pretty_json()?))
    }
}

/// Decodes an envelope body into its records, in order.
pub fn decode_envelope(body: &[u8]) -> Result<Vec<Record>, DecodeError> {
    let raws: Vec<Box<RawValue>> = serde_json::from_slice(body)?;
    Ok(raws.into_iter().map(|raw| Record { raw }).collect())
}

/// A message body paired with the identifier correlating it within one send call.
///
/// Serializes to the SQS batch entry shape `{"Id": ..., "MessageBody": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundItem {
    pub id: String,
    pub message_body: String,
}

impl OutboundItem {
    /// Creates an item with a random UUID v4 identifier.
    pub fn new(message_body: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_body,
        }
    }
}
