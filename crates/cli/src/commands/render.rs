//! Human-readable rendering of contract results for `--output text`.

use serde_json::Value;
use visanet_contract::ApplicationState;

pub(crate) fn render_text(result: &Value) -> String {
    match result {
        Value::Null => "ok\n".to_string(),
        Value::Array(items) if items.is_empty() => "no results\n".to_string(),
        Value::Array(items) => items.iter().map(render_item).collect(),
        Value::Object(_) if result.get("applicationNumber").is_some() => {
            let key = format!(
                "{}:{}",
                str_field(result, "submitter"),
                str_field(result, "applicationNumber")
            );
            format!("{}\n", application_line(&key, result))
        }
        other => format!("{}\n", other),
    }
}

fn render_item(item: &Value) -> String {
    if let (Some(Value::String(key)), Some(record)) = (item.get("key"), item.get("record")) {
        return format!("{}\n", application_line(key, record));
    }
    if let Some(tx_id) = item.get("txId").and_then(Value::as_str) {
        let short = tx_id.get(..12).unwrap_or(tx_id);
        let timestamp = str_field(item, "timestamp");
        return match item.get("value") {
            Some(value) if !item["isDelete"].as_bool().unwrap_or(false) => {
                format!("{}  {}  {}\n", timestamp, short, version_line(value))
            }
            _ => format!("{}  {}  deleted\n", timestamp, short),
        };
    }
    format!("{}\n", item)
}

fn application_line(key: &str, record: &Value) -> String {
    format!("{}  {}", key, version_line(record))
}

fn version_line(record: &Value) -> String {
    if !record.is_object() {
        return record.to_string();
    }
    format!(
        "{}  owner={}  ownerMSP={}",
        state_label(&record["currentState"]),
        str_field(record, "owner"),
        str_field(record, "ownerMSP")
    )
}

/// Stored records carry the numeric code, history entries the label already.
fn state_label(state: &Value) -> &str {
    match state {
        Value::String(label) => label.as_str(),
        Value::Number(n) => n
            .as_u64()
            .map_or("UNKNOWN", ApplicationState::label_for_code),
        _ => "UNKNOWN",
    }
}

fn str_field<'v>(value: &'v Value, field: &str) -> &'v str {
    value.get(field).and_then(Value::as_str).unwrap_or("-")
}
