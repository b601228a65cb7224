use bytes::Bytes;
use serde_json::{Value, from_slice, json, to_vec};

/// 用 provider 配置的 model 覆盖请求体中的 model 字段
pub fn override_model_in_body(body_bytes: &[u8], model: &str) -> Option<Bytes> {
    let mut json = from_slice::<Value>(body_bytes).ok()?;

    if let Some(original) = json.get("model").and_then(|m| m.as_str()) {
        tracing::info!("model 覆盖: {} -> {}", original, model);
    }

    json["model"] = json!(model);

    to_vec(&json).ok().map(Into::into)
}
