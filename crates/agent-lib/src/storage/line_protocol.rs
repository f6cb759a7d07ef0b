//! InfluxDB line protocol rendering
//!
//! Records are rendered at second precision, matching the `precision=s`
//! write query parameter.

use crate::record::{FieldValue, Record};

/// Escape a measurement name (commas and spaces).
fn escape_measurement(raw: &str) -> String {
    raw.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape a tag key, tag value or field key (commas, equals, spaces).
fn escape_key(raw: &str) -> String {
    raw.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

/// Escape a string field value (backslashes and double quotes).
fn escape_text(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{v}"),
        FieldValue::Integer(v) => format!("{v}i"),
        FieldValue::Text(v) => format!("\"{}\"", escape_text(v)),
    }
}

/// Render one record as a protocol line.
pub fn encode(record: &Record) -> String {
    let mut line = escape_measurement(record.measurement);
    for (key, value) in &record.tags {
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }
    line.push(' ');
    let mut first = true;
    for (key, value) in &record.fields {
        if !first {
            line.push(',');
        }
        first = false;
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&render_value(value));
    }
    line.push(' ');
    line.push_str(&record.time.timestamp().to_string());
    line
}

/// Render a batch of records, one line each.
pub fn encode_batch(records: &[Record]) -> String {
    records.iter().map(encode).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::record::build;
    use crate::testutil::sample_result;

    fn minimal_record() -> Record {
        let mut tags = BTreeMap::new();
        tags.insert("client_ip", "198.51.100.23".to_string());
        let mut fields = BTreeMap::new();
        fields.insert("download", FieldValue::Float(1.5));
        fields.insert("id", FieldValue::Integer(7));
        fields.insert("name", FieldValue::Text("Berlin".to_string()));
        Record {
            measurement: "speedtest",
            tags,
            time: Utc.with_ymd_and_hms(2021, 3, 14, 9, 26, 53).unwrap(),
            fields,
        }
    }

    #[test]
    fn renders_tags_fields_and_second_timestamp() {
        assert_eq!(
            encode(&minimal_record()),
            "speedtest,client_ip=198.51.100.23 download=1.5,id=7i,name=\"Berlin\" 1615714013"
        );
    }

    #[test]
    fn escapes_tag_values_and_text_fields() {
        let mut record = minimal_record();
        record
            .tags
            .insert("client_isp", "Example Telecom, West".to_string());
        record.fields.insert(
            "name",
            FieldValue::Text("quote \" and backslash \\".to_string()),
        );

        let line = encode(&record);
        assert!(line.contains("client_isp=Example\\ Telecom\\,\\ West"));
        assert!(line.contains("name=\"quote \\\" and backslash \\\\\""));
    }

    #[test]
    fn batch_is_newline_separated() {
        let record = build(&sample_result());
        let batch = encode_batch(&[record.clone(), record]);
        assert_eq!(batch.lines().count(), 2);
    }

    #[test]
    fn full_record_renders_every_field() {
        let record = build(&sample_result());
        let line = encode(&record);

        // measurement,2 tags <space> 26 fields <space> ts
        assert!(line.starts_with("speedtest,client_ip="));
        assert_eq!(line.matches('=').count(), 2 + 26);
        assert!(line.ends_with(&record.time.timestamp().to_string()));
    }
}
