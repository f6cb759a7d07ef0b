//! Storage record construction
//!
//! A `Record` is the storage-ready shape of one measurement: a fixed
//! measurement name, a small set of indexed tags, a timestamp and a flat
//! field set covering every attribute of the raw result.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::MeasurementResult;

/// Measurement name under which all records are written.
pub const MEASUREMENT: &str = "speedtest";

/// A typed field value, rendered per line protocol rules.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

/// One storage-ready measurement record.
///
/// Tags and fields are disjoint namespaces; maps keep rendering order
/// deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub measurement: &'static str,
    pub tags: BTreeMap<&'static str, String>,
    pub time: DateTime<Utc>,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

/// Build the storage record for one measurement result.
///
/// Total: every well-formed result maps to a record. Client ip and isp are
/// duplicated into tags (for indexed queries) and fields (for full
/// retrieval); the `timestamp` field carries the record time verbatim. No
/// unit conversion, no rounding, no filtering.
pub fn build(result: &MeasurementResult) -> Record {
    let mut tags = BTreeMap::new();
    tags.insert("client_ip", result.client.ip.clone());
    tags.insert("client_isp", result.client.isp.clone());

    let mut fields = BTreeMap::new();
    fields.insert("download", FieldValue::Float(result.download));
    fields.insert("upload", FieldValue::Float(result.upload));
    fields.insert("ping", FieldValue::Float(result.ping));
    fields.insert("url_host", FieldValue::Text(result.server.host.clone()));
    fields.insert("server_lat", FieldValue::Float(result.server.lat));
    fields.insert("server_lon", FieldValue::Float(result.server.lon));
    fields.insert("name", FieldValue::Text(result.server.name.clone()));
    fields.insert(
        "server_country",
        FieldValue::Text(result.server.country.clone()),
    );
    fields.insert("server_cc", FieldValue::Text(result.server.cc.clone()));
    fields.insert("id", FieldValue::Integer(result.server.id as i64));
    fields.insert("server_d", FieldValue::Float(result.server.distance));
    fields.insert("server_latency", FieldValue::Float(result.server.latency));
    fields.insert("client_ip", FieldValue::Text(result.client.ip.clone()));
    fields.insert("client_lat", FieldValue::Float(result.client.lat));
    fields.insert("client_lon", FieldValue::Float(result.client.lon));
    fields.insert("client_isp", FieldValue::Text(result.client.isp.clone()));
    fields.insert(
        "client_isprating",
        FieldValue::Float(result.client.isprating),
    );
    fields.insert("client_rating", FieldValue::Float(result.client.rating));
    fields.insert(
        "client_ispdlavg",
        FieldValue::Float(result.client.ispdlavg),
    );
    fields.insert(
        "client_ispulavg",
        FieldValue::Float(result.client.ispulavg),
    );
    fields.insert(
        "client_loggedin",
        FieldValue::Integer(result.client.loggedin),
    );
    fields.insert(
        "client_country",
        FieldValue::Text(result.client.country.clone()),
    );
    fields.insert(
        "timestamp",
        FieldValue::Text(result.timestamp.to_rfc3339()),
    );
    fields.insert("bytes_sent", FieldValue::Integer(result.bytes_sent as i64));
    fields.insert(
        "bytes_received",
        FieldValue::Integer(result.bytes_received as i64),
    );
    fields.insert(
        "share",
        FieldValue::Text(result.share.clone().unwrap_or_default()),
    );

    Record {
        measurement: MEASUREMENT,
        tags,
        time: result.timestamp,
        fields,
    }
}
