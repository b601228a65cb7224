//! 响应格式转换（非流式）
//!
//! `OpenAI` Responses JSON 响应 → `chat.completion`
//!
//! 主要转换：
//! - output[] 中 message / `output_text` 项的文本拼接为 message.content
//! - status → `finish_reason`
//! - usage 原样透传

use bytes::Bytes;
use serde_json::{Value, json};

use super::unix_timestamp;

/// Responses JSON 响应 → `chat.completion` 响应
pub fn responses_response_to_chat(body: &Bytes) -> Result<Bytes, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| "Upstream response must be JSON.".to_string())?;
    let Some(object) = value.as_object() else {
        return Err("Upstream response must be a JSON object.".to_string());
    };

    let id = object.get("id").and_then(Value::as_str).unwrap_or("");
    let model = object.get("model").and_then(Value::as_str).unwrap_or("");

    let output: &[Value] = object
        .get("output")
        .and_then(Value::as_array)
        .map_or(&[], |items| items.as_slice());

    let mut texts = Vec::new();
    for item in output {
        if !matches!(
            item.get("type").and_then(Value::as_str),
            Some("output_text" | "message")
        ) {
            continue;
        }
        if let Some(text) = item.get("text").and_then(Value::as_str) {
            texts.push(text.to_string());
        }
        if let Some(content) = item.get("content").and_then(Value::as_array) {
            let joined = content
                .iter()
                .filter(|part| {
                    matches!(
                        part.get("type").and_then(Value::as_str),
                        Some("output_text" | "text")
                    )
                })
                .map(|part| part.get("text").and_then(Value::as_str).unwrap_or(""))
                .collect::<String>();
            texts.push(joined);
        }
    }
    let content = texts
        .iter()
        .filter(|text| !text.is_empty())
        .map(String::as_str)
        .collect::<String>();

    let finish_reason = finish_reason_from_status(object.get("status"));

    let mut out = json!({
        "id": id,
        "object": "chat.completion",
        "created": unix_timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "finish_reason": finish_reason,
            "message": { "role": "assistant", "content": content }
        }]
    });
    if let Some(usage) = object.get("usage").filter(|v| !v.is_null())
        && let Some(map) = out.as_object_mut()
    {
        map.insert("usage".to_string(), usage.clone());
    }

    serde_json::to_vec(&out)
        .map(Bytes::from)
        .map_err(|err| format!("Failed to serialize response: {err}"))
}

/// status → `finish_reason`
///
/// 正常终止（"stop" / "completed" / 缺省）映射为 "stop"，
/// 其余状态按字面值透传给调用方。
fn finish_reason_from_status(status: Option<&Value>) -> String {
    match status.and_then(Value::as_str) {
        None | Some("stop" | "completed" | "") => "stop".to_string(),
        Some(other) => other.to_string(),
    }
}
