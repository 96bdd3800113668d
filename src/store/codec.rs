//! CSV row encoding for `EmailRecord`s.
//!
//! One row per record under a fixed header. Text cells are quoted by the
//! `csv` writer whenever they contain a delimiter, quote or line break, so
//! arbitrary email bodies survive a round trip. `extracted_fields` is packed
//! into a single cell as `key=value` pairs joined by `;`, with `\`, `;` and
//! `=` escaped by a backslash.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use csv::StringRecord;
use tracing::warn;
use uuid::Uuid;

use crate::store::record::{Category, EmailRecord, ExtractedFields, RecordStatus};

/// Column order of the store file.
pub const HEADER: [&str; 8] = [
    "id",
    "received_text",
    "category",
    "extracted_fields",
    "draft_reply",
    "status",
    "notes",
    "created_at",
];

const PAIR_SEPARATOR: char = ';';
const KEY_VALUE_SEPARATOR: char = '=';
const ESCAPE: char = '\\';

/// Encode a field map into a single cell.
pub fn encode_fields(fields: &ExtractedFields) -> String {
    let mut out = String::new();
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(PAIR_SEPARATOR);
        }
        escape_into(&mut out, key);
        out.push(KEY_VALUE_SEPARATOR);
        escape_into(&mut out, value);
    }
    out
}

fn escape_into(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        if matches!(ch, ESCAPE | PAIR_SEPARATOR | KEY_VALUE_SEPARATOR) {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
}

/// Decode a cell produced by `encode_fields`.
pub fn decode_fields(cell: &str) -> Result<ExtractedFields, String> {
    let mut fields = ExtractedFields::new();
    if cell.is_empty() {
        return Ok(fields);
    }

    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut chars = cell.chars();

    while let Some(ch) = chars.next() {
        match ch {
            ESCAPE => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "dangling escape at end of extracted_fields".to_string())?;
                if in_value {
                    value.push(escaped);
                } else {
                    key.push(escaped);
                }
            }
            KEY_VALUE_SEPARATOR if !in_value => in_value = true,
            KEY_VALUE_SEPARATOR => {
                return Err(format!("unescaped '=' in value of field {key:?}"));
            }
            PAIR_SEPARATOR => {
                finish_pair(&mut fields, &mut key, &mut value, in_value)?;
                in_value = false;
            }
            other => {
                if in_value {
                    value.push(other);
                } else {
                    key.push(other);
                }
            }
        }
    }
    finish_pair(&mut fields, &mut key, &mut value, in_value)?;

    Ok(fields)
}

fn finish_pair(
    fields: &mut ExtractedFields,
    key: &mut String,
    value: &mut String,
    in_value: bool,
) -> Result<(), String> {
    if !in_value {
        return Err(format!("field {key:?} has no '=' separator"));
    }
    let key = std::mem::take(key);
    let value = std::mem::take(value);
    if fields.contains_key(&key) {
        return Err(format!("duplicate field {key:?}"));
    }
    fields.insert(key, value);
    Ok(())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Cells for one record, in `HEADER` order.
pub fn record_to_row(record: &EmailRecord) -> [String; 8] {
    [
        record.id.to_string(),
        record.received_text.clone(),
        record.category.as_str().to_string(),
        encode_fields(&record.extracted_fields),
        record.draft_reply.clone(),
        record.status.as_str().to_string(),
        record.notes.clone(),
        format_timestamp(&record.created_at),
    ]
}

/// Parse one row back into a record.
pub fn row_to_record(row: &StringRecord) -> Result<EmailRecord, String> {
    if row.len() != HEADER.len() {
        return Err(format!(
            "expected {} columns, found {}",
            HEADER.len(),
            row.len()
        ));
    }
    let cell = |i: usize| row.get(i).unwrap_or_default();

    let id = Uuid::parse_str(cell(0)).map_err(|e| format!("bad id {:?}: {e}", cell(0)))?;
    let category = Category::ALL
        .into_iter()
        .find(|c| c.as_str() == cell(2))
        .ok_or_else(|| format!("non-canonical category {:?}", cell(2)))?;
    let extracted_fields = decode_fields(cell(3))?;
    let status = RecordStatus::ALL
        .into_iter()
        .find(|s| s.as_str() == cell(5))
        .ok_or_else(|| format!("non-canonical status {:?}", cell(5)))?;
    let created_at = DateTime::parse_from_rfc3339(cell(7))
        .map_err(|e| format!("bad created_at {:?}: {e}", cell(7)))?
        .with_timezone(&Utc);

    Ok(EmailRecord {
        id,
        received_text: cell(1).to_string(),
        category,
        extracted_fields,
        draft_reply: cell(4).to_string(),
        status,
        notes: cell(6).to_string(),
        created_at,
    })
}

/// Serialize records (with header) into CSV bytes.
pub fn encode_records(records: &[EmailRecord]) -> Result<Vec<u8>, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(HEADER)
        .map_err(|e| format!("failed to write header: {e}"))?;
    for record in records {
        writer
            .write_record(record_to_row(record))
            .map_err(|e| format!("failed to encode record {}: {e}", record.id))?;
    }
    writer
        .into_inner()
        .map_err(|e| format!("failed to flush CSV buffer: {e}"))
}

/// Parse CSV bytes into records.
///
/// Empty input yields no records. A header that does not match `HEADER` is
/// an error; individual bad rows (wrong column count, unparsable values,
/// repeated IDs) are skipped with a warning.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<EmailRecord>, String> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header = reader
        .headers()
        .map_err(|e| format!("unreadable header: {e}"))?
        .clone();
    if header.len() != HEADER.len() || header.iter().zip(HEADER).any(|(found, want)| found != want)
    {
        return Err(format!(
            "header {:?} does not match {:?}",
            header.iter().collect::<Vec<_>>(),
            HEADER
        ));
    }

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable row");
                continue;
            }
        };
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        match row_to_record(&row) {
            Ok(record) if !seen.insert(record.id) => {
                warn!(line, id = %record.id, "Skipping row with repeated id");
            }
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(line, reason = %reason, "Skipping malformed row");
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> ExtractedFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tricky_record() -> EmailRecord {
        let mut record = EmailRecord::new(
            "From: \"Smith, John\" <john@acme.test>\r\nSubject: RFQ; \"urgent\"\n\nPrice for 50, please.\n",
            Category::QuoteRequest,
            fields(&[
                ("item", "part X; rev=2"),
                ("quantity", "50"),
                ("path", r"C:\drawings\QD-77A"),
            ]),
            "Dear John,\n\n\"Thanks\", we'll quote shortly.",
        );
        record.notes = "  leading and trailing spaces  ".to_string();
        record
    }

    #[test]
    fn fields_encoding_escapes_separators() {
        let encoded = encode_fields(&fields(&[("a=b", "c;d"), ("k", r"back\slash")]));
        assert_eq!(encoded, r"a\=b=c\;d;k=back\\slash");
        assert_eq!(
            decode_fields(&encoded).unwrap(),
            fields(&[("a=b", "c;d"), ("k", r"back\slash")])
        );
    }

    #[test]
    fn empty_fields_are_an_empty_cell() {
        assert_eq!(encode_fields(&ExtractedFields::new()), "");
        assert!(decode_fields("").unwrap().is_empty());
    }

    #[test]
    fn empty_values_survive() {
        let map = fields(&[("note", ""), ("quantity", "3")]);
        assert_eq!(decode_fields(&encode_fields(&map)).unwrap(), map);
    }

    #[test]
    fn malformed_fields_are_rejected() {
        assert!(decode_fields("no_separator").is_err());
        assert!(decode_fields("a=1;a=2").is_err());
        assert!(decode_fields("a=1=2").is_err());
        assert!(decode_fields(r"a=1\").is_err());
    }

    #[test]
    fn records_round_trip_byte_identical() {
        let records = vec![tricky_record(), tricky_record()];
        let bytes = encode_records(&records).unwrap();
        let decoded = decode_records(&bytes).unwrap();
        assert_eq!(decoded, records);

        let again = encode_records(&decoded).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn header_row_is_written() {
        let bytes = encode_records(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text.trim_end(),
            "id,received_text,category,extracted_fields,draft_reply,status,notes,created_at"
        );
    }

    #[test]
    fn empty_input_yields_no_records() {
        assert!(decode_records(b"").unwrap().is_empty());
        assert!(decode_records(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn wrong_header_is_an_error() {
        let err = decode_records(b"Date,Name,Email\n1,2,3\n").unwrap_err();
        assert!(err.contains("does not match"));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let good = tricky_record();
        let mut bytes = encode_records(std::slice::from_ref(&good)).unwrap();
        bytes.extend_from_slice(b"not-a-uuid,text,other,,draft,new,,2026-01-01T00:00:00Z\n");
        bytes.extend_from_slice(b"too,few,columns\n");
        bytes.extend_from_slice(
            format!(
                "{},text,complaint,,draft,new,,2026-01-01T00:00:00Z\n",
                Uuid::new_v4()
            )
            .as_bytes(),
        );

        let decoded = decode_records(&bytes).unwrap();
        assert_eq!(decoded, vec![good]);
    }

    #[test]
    fn label_aliases_are_not_accepted_in_rows() {
        let good = tricky_record();
        let mut bytes = encode_records(std::slice::from_ref(&good)).unwrap();
        for (category, status) in [("rfq", "new"), ("Quote Request", "new"), ("other", "pending")] {
            bytes.extend_from_slice(
                format!(
                    "{},text,{category},,draft,{status},,2026-01-01T00:00:00Z\n",
                    Uuid::new_v4()
                )
                .as_bytes(),
            );
        }

        assert_eq!(decode_records(&bytes).unwrap(), vec![good]);
    }

    #[test]
    fn repeated_ids_keep_first_row() {
        let first = tricky_record();
        let mut second = first.clone();
        second.notes = "second copy".into();

        let bytes = encode_records(&[first.clone(), second]).unwrap();
        let decoded = decode_records(&bytes).unwrap();
        assert_eq!(decoded, vec![first]);
    }

    #[test]
    fn timestamps_keep_full_precision() {
        let record = tricky_record();
        let row = record_to_row(&record);
        let parsed = row_to_record(&StringRecord::from(row.to_vec())).unwrap();
        assert_eq!(parsed.created_at, record.created_at);
    }
}
