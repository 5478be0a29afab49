use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// One pending task as delivered by the internal store. Every field is
/// optional on the wire; validation happens at pipeline entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub client_product_title: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub store_code: Option<String>,
    #[serde(default)]
    pub keer_product_id: Option<IdField>,
    /// JSON-serialized list of quote lines.
    #[serde(default)]
    pub quotation_result: Option<String>,
}

/// One country/quantity/price/profit tuple from the serialized
/// quotation result.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteLine {
    #[serde(default)]
    pub nation: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    #[allow(dead_code)]
    pub profit: Option<f64>,
}

pub fn parse_quote_lines(raw: &str) -> Result<Vec<QuoteLine>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Identifiers arrive as numbers from some endpoints and as strings
/// from others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdField {
    Number(i64),
    Text(String),
}

impl IdField {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            IdField::Number(value) => Some(*value),
            IdField::Text(value) => value.trim().parse().ok(),
        }
    }
}

/// Terminal feedback reported to the internal store for each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackCode {
    /// Quotation and message both succeeded.
    AckedSuccess,
    /// Quotation failed before or at submission.
    AckedFailure,
    /// Price committed, message pipeline failed.
    PricedOkMessageFailed,
    /// Defined by the internal store; no current path produces it.
    PricedFailedMessageOk,
}

impl FeedbackCode {
    pub fn code(self) -> i32 {
        match self {
            FeedbackCode::AckedSuccess => 1,
            FeedbackCode::AckedFailure => 2,
            FeedbackCode::PricedOkMessageFailed => 3,
            FeedbackCode::PricedFailedMessageOk => 4,
        }
    }
}

impl Serialize for FeedbackCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

/// Partial update against the status feedback sink. Any subset of the
/// optional fields may be present per call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotation_feedback_status: Option<FeedbackCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shi_image_note: Option<String>,
}

impl StatusUpdate {
    pub fn feedback(code: FeedbackCode) -> Self {
        Self {
            quotation_feedback_status: Some(code),
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.sp_status = Some(note.into());
        self
    }
}

/// Decode a task batch out of whichever envelope shape the internal
/// store happened to answer with. Historical shapes are expected in
/// normal operation, so anything unrecognized is zero tasks, never an
/// error. Priority order:
///   1. `data` is a 4+ element positional array whose 4th element is
///      the task list;
///   2. `data` wraps the task list as its first element;
///   3. `data` is the bare task list.
pub fn decode_task_batch(payload: &Value) -> Vec<TaskRecord> {
    if !payload
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return Vec::new();
    }
    let Some(data) = payload.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    if data.len() >= 4 {
        if let Some(tasks) = records_from(&data[3]) {
            return tasks;
        }
    }

    match data.first() {
        Some(first) if first.is_array() => records_from(first).unwrap_or_default(),
        Some(first) if first.is_object() => {
            records_from(&Value::Array(data.clone())).unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn records_from(value: &Value) -> Option<Vec<TaskRecord>> {
    let entries = value.as_array()?;
    if !entries.first()?.is_object() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_positional_envelope() {
        let payload = json!({
            "success": true,
            "data": [0, [{"keer_product_id": 9}], 1, [
                {"client_product_title": "Mug", "keer_product_id": 1},
                {"client_product_title": "Cap", "keer_product_id": "2"},
            ]],
        });
        let tasks = decode_task_batch(&payload);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].client_product_title.as_deref(), Some("Mug"));
        assert_eq!(
            tasks[1].keer_product_id.as_ref().and_then(IdField::as_i64),
            Some(2)
        );
    }

    #[test]
    fn decodes_wrapped_envelope() {
        let payload = json!({
            "success": true,
            "data": [[{"client_product_title": "Mug"}]],
        });
        assert_eq!(decode_task_batch(&payload).len(), 1);
    }

    #[test]
    fn decodes_bare_list_envelope() {
        let payload = json!({
            "success": true,
            "data": [{"client_product_title": "Mug"}, {"client_product_title": "Cap"}],
        });
        assert_eq!(decode_task_batch(&payload).len(), 2);
    }

    #[test]
    fn non_success_envelope_is_empty() {
        let payload = json!({"success": false, "data": [{"client_product_title": "Mug"}]});
        assert!(decode_task_batch(&payload).is_empty());
        assert!(decode_task_batch(&json!({"data": []})).is_empty());
        assert!(decode_task_batch(&json!({"success": true})).is_empty());
        assert!(decode_task_batch(&json!({"success": true, "data": "oops"})).is_empty());
    }

    #[test]
    fn empty_positional_slot_falls_through() {
        // Fourth slot empty: the wrapped-list shape is tried next.
        let payload = json!({
            "success": true,
            "data": [0, [{"keer_product_id": 9}], 1, []],
        });
        let tasks = decode_task_batch(&payload);
        assert_eq!(tasks.len(), 1);
        assert_eq!(
            tasks[0].keer_product_id.as_ref().and_then(IdField::as_i64),
            Some(9)
        );
    }

    #[test]
    fn feedback_codes_are_stable() {
        assert_eq!(FeedbackCode::AckedSuccess.code(), 1);
        assert_eq!(FeedbackCode::AckedFailure.code(), 2);
        assert_eq!(FeedbackCode::PricedOkMessageFailed.code(), 3);
        assert_eq!(FeedbackCode::PricedFailedMessageOk.code(), 4);
    }

    #[test]
    fn status_update_serializes_sparsely() {
        let update = StatusUpdate::feedback(FeedbackCode::AckedFailure).with_note("lookup failed");
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["quotation_feedback_status"], json!(2));
        assert_eq!(value["sp_status"], json!("lookup failed"));
        assert!(value.get("shi_image_note").is_none());
    }

    #[test]
    fn quote_lines_parse_from_serialized_json() {
        let raw = r#"[{"nation":"UK","quantity":50,"price":12.5,"profit":2.0},{"nation":"US","quantity":100,"price":0}]"#;
        let lines = parse_quote_lines(raw).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].nation.as_deref(), Some("UK"));
        assert_eq!(lines[1].price, Some(0.0));
        assert!(parse_quote_lines("not json").is_err());
    }
}
