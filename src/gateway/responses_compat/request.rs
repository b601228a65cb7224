//! 请求格式转换
//!
//! Chat Completions 请求 → `OpenAI` Responses 请求
//!
//! 主要转换：
//! - system 字段 + system 消息 → instructions
//! - messages[] → input[]
//! - `tool_use` / `tool_calls` / `function_call` → `function_call`
//! - `tool_result` / tool 消息 → `function_call_output`
//! - `max_tokens` → `max_output_tokens`，`temperature` 直接丢弃
//! - 各种形态的 reasoning 提示归一为 { effort }
//!
//! 上游只接受流式调用，出站请求一律 `stream: true`。

use bytes::Bytes;
use http::{
    HeaderValue,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use rayon::prelude::*;
use serde_json::{Map, Value, json};

use super::{OutboundRequest, ProviderTarget, media, tools};

/// 所有别名字段都缺失时的兜底标识
const FALLBACK_CALL_ID: &str = "tool_call";

/// Chat Completions 请求 → Responses 请求
pub fn chat_request_to_responses(
    body: &Bytes,
    provider: &ProviderTarget<'_>,
    default_effort: Option<&str>,
) -> Result<OutboundRequest, String> {
    if provider.base_url.is_empty() {
        let name = if provider.name.is_empty() {
            "<unknown>"
        } else {
            provider.name
        };
        return Err(format!("Provider {name} missing base_url"));
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|_| "Request body must be JSON.".to_string())?;
    let Some(object) = value.as_object() else {
        return Err("Request body must be a JSON object.".to_string());
    };

    let model = object
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| "Request must include model.".to_string())?;

    // 上游只支持流式，调用方的原始 stream 标志仅用于诊断
    let requested_stream = object.get("stream").and_then(Value::as_bool);
    if requested_stream != Some(true) {
        tracing::warn!(
            "⚠️ Provider {} 仅支持流式，强制 stream=true (原始 stream={:?})",
            provider.name,
            requested_stream
        );
    }

    let original_max_tokens = object.get("max_tokens").and_then(Value::as_i64);

    // system 字段与 system 消息按出现顺序合并为 instructions
    let mut instructions_parts = Vec::new();
    if let Some(system) = object.get("system") {
        collect_system_value(system, &mut instructions_parts);
    }

    let messages: &[Value] = object
        .get("messages")
        .and_then(Value::as_array)
        .map_or(&[], |items| items.as_slice());

    let per_message: Vec<(Vec<Value>, Vec<String>)> = messages
        .par_iter()
        .map(chat_message_to_input_items)
        .collect();

    let mut input_items = Vec::new();
    for (items, system_texts) in per_message {
        instructions_parts.extend(system_texts);
        input_items.extend(items);
    }

    let mut out = Map::new();
    out.insert("model".to_string(), Value::String(model.to_string()));
    out.insert("input".to_string(), Value::Array(input_items));
    out.insert("stream".to_string(), Value::Bool(true));

    let instructions = instructions_parts.join("\n\n");
    if !instructions.trim().is_empty() {
        out.insert("instructions".to_string(), Value::String(instructions));
    }

    if let Some(tools_value) = object.get("tools").filter(|v| v.is_array()) {
        let flattened = tools::flatten_chat_tools(tools_value);
        if flattened.as_array().is_some_and(|items| !items.is_empty()) {
            out.insert("tools".to_string(), flattened);
        }
    }

    if let Some(metadata) = object.get("metadata").filter(|v| v.is_object()) {
        out.insert("metadata".to_string(), metadata.clone());
    }
    for key in [
        "response_format",
        "tool_choice",
        "parallel_tool_calls",
        "user",
        "modalities",
    ] {
        if let Some(passthrough) = object.get(key) {
            out.insert(key.to_string(), passthrough.clone());
        }
    }

    if let Some(explicit) = object.get("max_output_tokens") {
        out.insert("max_output_tokens".to_string(), explicit.clone());
    } else if let Some(max_tokens) = original_max_tokens {
        out.insert(
            "max_output_tokens".to_string(),
            Value::Number(max_tokens.into()),
        );
    }

    if let Some(reasoning) = resolve_reasoning(object, default_effort) {
        out.insert("reasoning".to_string(), reasoning);
    }

    let url = build_outbound_url(provider.base_url);
    tracing::debug!("🎯 出站目标: provider={}, url={}", provider.name, url);

    let mut headers = http::HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {}", provider.api_key))
        .map_err(|e| format!("Provider {} api_key 无法作为请求头: {e}", provider.name))?;
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let body = serde_json::to_vec(&Value::Object(out))
        .map(Bytes::from)
        .map_err(|err| format!("Failed to serialize request: {err}"))?;

    Ok(OutboundRequest { url, headers, body })
}

/// 出站 URL：基础地址的路径部分强制以 `/responses` 结尾，query 保留
fn build_outbound_url(base_url: &str) -> String {
    let (base, query) = base_url
        .split_once('?')
        .map_or((base_url, ""), |(base, query)| (base, query));
    let mut url = if base.ends_with("/responses") {
        base.to_string()
    } else {
        format!("{}/responses", base.strip_suffix('/').unwrap_or(base))
    };
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// reasoning 解析优先级：
/// 1. 请求显式的 effort 字符串（嵌套 `reasoning.effort` 或平铺 `"reasoning.effort"`）
/// 2. 配置的默认 effort
/// 3. 仅设置了 enabled 标志时回退 "medium"
///
/// 请求自带 reasoning 对象时，剔除入站专用的 enabled / `max_tokens`
/// 子字段后整体覆盖前面的推导结果。
fn resolve_reasoning(object: &Map<String, Value>, default_effort: Option<&str>) -> Option<Value> {
    let nested = object.get("reasoning").and_then(Value::as_object);
    let flat_enabled = object.get("reasoning.enabled").and_then(Value::as_bool) == Some(true);
    let flat_effort = object.get("reasoning.effort").and_then(Value::as_str);

    let enabled = flat_enabled
        || nested.is_some_and(|r| r.get("enabled").and_then(Value::as_bool) == Some(true));
    let effort = nested
        .and_then(|r| r.get("effort").and_then(Value::as_str))
        .filter(|e| !e.is_empty())
        .or(flat_effort);

    let final_effort = effort
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .or_else(|| default_effort.map(str::trim).filter(|e| !e.is_empty()));

    let mut resolved = if let Some(effort) = final_effort {
        Some(json!({ "effort": effort }))
    } else if enabled {
        Some(json!({ "effort": "medium" }))
    } else {
        None
    };

    if let Some(reasoning) = object.get("reasoning") {
        let mut scrubbed = reasoning.clone();
        if let Some(map) = scrubbed.as_object_mut() {
            map.remove("enabled");
            map.remove("max_tokens");
        }
        resolved = Some(scrubbed);
    }
    resolved
}

/// 顶层 system 字段：字符串或块数组，文本按出现顺序收集
fn collect_system_value(system: &Value, parts: &mut Vec<String>) {
    match system {
        Value::String(text) if !text.is_empty() => parts.push(text.clone()),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(text) if !text.is_empty() => parts.push(text.clone()),
                    Value::Object(block) => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            parts.push(text.to_string());
                        }
                        if let Some(content) = block.get("content").and_then(Value::as_array) {
                            for part in content {
                                if part.get("type").and_then(Value::as_str) == Some("text")
                                    && let Some(text) = part.get("text").and_then(Value::as_str)
                                {
                                    parts.push(text.to_string());
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

/// system 消息的 content：字符串整体收集，数组只取 text 部件
fn collect_system_content(content: Option<&Value>, parts: &mut Vec<String>) {
    match content {
        Some(Value::String(text)) => parts.push(text.clone()),
        Some(Value::Array(items)) => {
            for part in items {
                if part.get("type").and_then(Value::as_str) == Some("text")
                    && let Some(text) = part.get("text").and_then(Value::as_str)
                {
                    parts.push(text.to_string());
                }
            }
        }
        _ => {}
    }
}

/// 单条消息 → 零或多个 input item，外加收集到的 system 文本
fn chat_message_to_input_items(message: &Value) -> (Vec<Value>, Vec<String>) {
    let mut items = Vec::new();
    let mut system_texts = Vec::new();

    let Some(message) = message.as_object() else {
        return (items, system_texts);
    };
    let role = message.get("role").and_then(Value::as_str).unwrap_or("user");

    // system 消息只贡献 instructions，不进入 input
    if role == "system" {
        collect_system_content(message.get("content"), &mut system_texts);
        return (items, system_texts);
    }

    // 拆出 tool_use / tool_result 部件，其余部件改写为 Responses 的类型名
    let mut remaining = Vec::new();
    let mut content_was_array = false;
    match message.get("content") {
        Some(Value::Array(parts)) => {
            content_was_array = true;
            for part in parts {
                let Some(part) = part.as_object() else {
                    continue;
                };
                match part.get("type").and_then(Value::as_str) {
                    Some("tool_use") => items.push(tool_use_to_function_call(part)),
                    Some("tool_result") => items.push(tool_result_to_function_call_output(part)),
                    _ => remaining.push(relabel_content_part(part, role)),
                }
            }
        }
        Some(Value::String(text)) => {
            remaining.push(json!({ "type": text_part_type(role), "text": text }));
        }
        _ => {}
    }

    if role == "tool" {
        items.push(tool_message_to_function_call_output(message));
        return (items, system_texts);
    }

    if role == "assistant" {
        // 三条路径按优先级只触发其一：tool_calls 列表 > 旧式 function_call > 裸 tool_call_id
        if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array)
            && !tool_calls.is_empty()
        {
            for tool_call in tool_calls {
                items.push(tool_call_to_function_call(tool_call));
            }
            return (items, system_texts);
        }
        if let Some(function_call) = message.get("function_call").filter(|v| !v.is_null()) {
            items.push(legacy_function_call_to_item(function_call, message));
            return (items, system_texts);
        }
        if let Some(call_id) = non_empty(message, "tool_call_id") {
            let empty = Value::Object(Map::new());
            let content = message
                .get("content")
                .filter(|v| !v.is_null())
                .unwrap_or(&empty);
            items.push(json!({
                "type": "function_call",
                "name": non_empty(message, "name").unwrap_or(FALLBACK_CALL_ID),
                "arguments": stringify(content),
                "call_id": call_id
            }));
            return (items, system_texts);
        }
    }

    // 所有部件都已拆成独立 item 的消息不再保留
    if content_was_array && remaining.is_empty() {
        return (items, system_texts);
    }

    let mut cloned = message.clone();
    cloned.remove("cache_control");
    if content_was_array || matches!(message.get("content"), Some(Value::String(_))) {
        cloned.insert("content".to_string(), Value::Array(remaining));
    }
    items.push(Value::Object(cloned));
    (items, system_texts)
}

/// `tool_use` 部件 → `function_call` item
///
/// 名称与 `call_id` 按多个别名字段依序解析，参数统一序列化为字符串。
fn tool_use_to_function_call(part: &Map<String, Value>) -> Value {
    let name = non_empty(part, "name")
        .or_else(|| nested_non_empty(part, "function", "name"))
        .or_else(|| non_empty(part, "tool_name"))
        .or_else(|| non_empty(part, "id"))
        .unwrap_or(FALLBACK_CALL_ID);
    let call_id = non_empty(part, "id")
        .or_else(|| non_empty(part, "tool_call_id"))
        .or_else(|| non_empty(part, "call_id"))
        .or_else(|| non_empty(part, "name"))
        .or_else(|| nested_non_empty(part, "function", "name"))
        .unwrap_or(FALLBACK_CALL_ID);
    json!({
        "type": "function_call",
        "name": name,
        "arguments": tool_use_arguments(part),
        "call_id": call_id
    })
}

/// `tool_use` 的参数：input / arguments 为字符串时透传，否则序列化（缺省 "{}"）
fn tool_use_arguments(part: &Map<String, Value>) -> String {
    if let Some(text) = part.get("input").and_then(Value::as_str) {
        return text.to_string();
    }
    if let Some(text) = part.get("arguments").and_then(Value::as_str) {
        return text.to_string();
    }
    let empty = Value::Object(Map::new());
    let payload = part
        .get("input")
        .filter(|v| !v.is_null())
        .or_else(|| part.get("arguments").filter(|v| !v.is_null()))
        .unwrap_or(&empty);
    stringify(payload)
}

/// `tool_result` 部件 → `function_call_output` item
fn tool_result_to_function_call_output(part: &Map<String, Value>) -> Value {
    let call_id = non_empty(part, "tool_use_id")
        .or_else(|| non_empty(part, "id"))
        .or_else(|| non_empty(part, "call_id"))
        .or_else(|| non_empty(part, "name"))
        .unwrap_or(FALLBACK_CALL_ID);
    let payload = ["content", "output", "result", "text"]
        .into_iter()
        .find_map(|key| part.get(key).filter(|v| !v.is_null()))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()));
    json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": passthrough_or_stringify(payload)
    })
}

/// tool 角色消息整体 → `function_call_output` item
fn tool_message_to_function_call_output(message: &Map<String, Value>) -> Value {
    let call_id = non_empty(message, "tool_call_id")
        .or_else(|| non_empty(message, "id"))
        .or_else(|| non_empty(message, "name"))
        .unwrap_or(FALLBACK_CALL_ID);
    let payload = message
        .get("content")
        .filter(|v| !v.is_null())
        .or_else(|| message.get("output").filter(|v| !v.is_null()))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()));
    json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": passthrough_or_stringify(payload)
    })
}

/// 数组与字符串原样透传，其余序列化为字符串
fn passthrough_or_stringify(payload: Value) -> Value {
    match payload {
        Value::Array(_) | Value::String(_) => payload,
        other => Value::String(stringify(&other)),
    }
}

/// assistant 的 `tool_calls` 列表项 → `function_call` item
fn tool_call_to_function_call(tool_call: &Value) -> Value {
    let empty = Map::new();
    let call = tool_call.as_object().unwrap_or(&empty);
    let name = nested_non_empty(call, "function", "name")
        .or_else(|| non_empty(call, "name"))
        .or_else(|| non_empty(call, "id"))
        .unwrap_or(FALLBACK_CALL_ID);
    let call_id = non_empty(call, "id")
        .or_else(|| non_empty(call, "name"))
        .or_else(|| nested_non_empty(call, "function", "name"))
        .unwrap_or(FALLBACK_CALL_ID);
    json!({
        "type": "function_call",
        "name": name,
        "arguments": function_arguments(call.get("function")),
        "call_id": call_id
    })
}

/// 旧式 `function_call` 字段 → `function_call` item
fn legacy_function_call_to_item(function_call: &Value, message: &Map<String, Value>) -> Value {
    let fc = function_call.as_object();
    let name = fc
        .and_then(|f| non_empty(f, "name"))
        .or_else(|| non_empty(message, "name"))
        .unwrap_or(FALLBACK_CALL_ID);
    let call_id = non_empty(message, "id")
        .or_else(|| fc.and_then(|f| non_empty(f, "name")))
        .unwrap_or(FALLBACK_CALL_ID);
    json!({
        "type": "function_call",
        "name": name,
        "arguments": function_arguments(Some(function_call)),
        "call_id": call_id
    })
}

/// function.arguments 为字符串时透传，否则序列化（缺省 "{}"）
fn function_arguments(function: Option<&Value>) -> String {
    let arguments = function.and_then(|f| f.get("arguments"));
    if let Some(text) = arguments.and_then(Value::as_str) {
        return text.to_string();
    }
    let empty = Value::Object(Map::new());
    stringify(arguments.filter(|v| !v.is_null()).unwrap_or(&empty))
}

/// 普通内容部件：text 按角色改写类型名，`image_url` 交给 media 层，
/// 缓存提示下游没有对应物，一律剥掉
fn relabel_content_part(part: &Map<String, Value>, role: &str) -> Value {
    let mut cloned = part.clone();
    match cloned.get("type").and_then(Value::as_str) {
        Some("text") => {
            cloned.insert(
                "type".to_string(),
                Value::String(text_part_type(role).to_string()),
            );
        }
        Some("image_url") => media::relabel_image_part(&mut cloned),
        _ => {}
    }
    cloned.remove("cache_control");
    Value::Object(cloned)
}

fn text_part_type(role: &str) -> &'static str {
    match role {
        // OpenAI Responses schema expects assistant content in `input` to use output types.
        "assistant" => "output_text",
        _ => "input_text",
    }
}

/// 字符串直接透传，其余 JSON 序列化
fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn non_empty<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn nested_non_empty<'a>(map: &'a Map<String, Value>, outer: &str, inner: &str) -> Option<&'a str> {
    map.get(outer)
        .and_then(Value::as_object)
        .and_then(|nested| non_empty(nested, inner))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn provider() -> ProviderTarget<'static> {
        ProviderTarget {
            name: "openai",
            base_url: "https://api.openai.com/v1",
            api_key: "sk-test",
        }
    }

    fn convert(body: &Value) -> Value {
        let bytes = Bytes::from(serde_json::to_vec(body).unwrap());
        let outbound = chat_request_to_responses(&bytes, &provider(), None).unwrap();
        serde_json::from_slice(&outbound.body).unwrap()
    }

    fn convert_with_default(body: &Value, default_effort: Option<&str>) -> Value {
        let bytes = Bytes::from(serde_json::to_vec(body).unwrap());
        let outbound = chat_request_to_responses(&bytes, &provider(), default_effort).unwrap();
        serde_json::from_slice(&outbound.body).unwrap()
    }

    /// 出站请求强制流式并丢弃不支持的采样参数
    #[test]
    fn test_forces_stream_and_drops_sampling_params() {
        let out = convert(&json!({
            "model": "gpt-test",
            "stream": false,
            "temperature": 0.7,
            "max_tokens": 256,
            "messages": [{ "role": "user", "content": "hi" }]
        }));

        assert_eq!(out["stream"], json!(true));
        assert!(out.get("temperature").is_none());
        assert!(out.get("max_tokens").is_none());
        // max_tokens 回退为 max_output_tokens
        assert_eq!(out["max_output_tokens"], json!(256));
        assert_eq!(out["model"], "gpt-test");
    }

    /// 显式 max_output_tokens 优先于 max_tokens 回退
    #[test]
    fn test_explicit_max_output_tokens_wins() {
        let out = convert(&json!({
            "model": "m",
            "max_tokens": 256,
            "max_output_tokens": 1024,
            "messages": []
        }));
        assert_eq!(out["max_output_tokens"], json!(1024));
    }

    /// system 字段与 system 消息按出现顺序合并，system 不进入 input
    #[test]
    fn test_system_merged_in_encounter_order() {
        let out = convert(&json!({
            "model": "m",
            "system": "first",
            "messages": [
                { "role": "system", "content": "second" },
                { "role": "user", "content": "hi" },
                { "role": "system", "content": [{ "type": "text", "text": "third" }] }
            ]
        }));

        assert_eq!(out["instructions"], "first\n\nsecond\n\nthird");
        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["role"], "user");
    }

    /// system 字段的块数组形态：text 字段与 content 里的 text 部件都收集
    #[test]
    fn test_system_block_array() {
        let out = convert(&json!({
            "model": "m",
            "system": [
                { "type": "text", "text": "a" },
                { "content": [{ "type": "text", "text": "b" }, { "type": "image", "url": "x" }] }
            ],
            "messages": []
        }));
        assert_eq!(out["instructions"], "a\n\nb");
    }

    /// 纯文本消息逐条映射为一个 item，顺序保持，类型按角色改写
    #[test]
    fn test_plain_text_messages_one_item_each() {
        let out = convert(&json!({
            "model": "m",
            "messages": [
                { "role": "user", "content": "q1" },
                { "role": "assistant", "content": "a1" },
                { "role": "user", "content": [{ "type": "text", "text": "q2" }] }
            ]
        }));

        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 3);
        assert_eq!(input[0]["content"][0]["type"], "input_text");
        assert_eq!(input[0]["content"][0]["text"], "q1");
        assert_eq!(input[1]["content"][0]["type"], "output_text");
        assert_eq!(input[2]["content"][0]["type"], "input_text");
    }

    /// `tool_use` 部件映射为 `function_call` item
    #[test]
    fn test_tool_use_part() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{
                "role": "assistant",
                "content": [{ "type": "tool_use", "id": "abc", "name": "lookup", "input": { "q": "x" } }]
            }]
        }));

        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["type"], "function_call");
        assert_eq!(input[0]["call_id"], "abc");
        assert_eq!(input[0]["name"], "lookup");
        assert_eq!(input[0]["arguments"], "{\"q\":\"x\"}");
    }

    /// `tool_result` 部件映射为 `function_call_output` item
    #[test]
    fn test_tool_result_part() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [{ "type": "tool_result", "tool_use_id": "abc", "content": "42" }]
            }]
        }));

        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["type"], "function_call_output");
        assert_eq!(input[0]["call_id"], "abc");
        assert_eq!(input[0]["output"], "42");
    }

    /// `tool_result` 非字符串非数组的载荷序列化为字符串
    #[test]
    fn test_tool_result_object_payload_stringified() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [{ "type": "tool_result", "id": "r1", "output": { "ok": true } }]
            }]
        }));
        assert_eq!(out["input"][0]["output"], "{\"ok\":true}");
    }

    /// tool 角色消息整体转换
    #[test]
    fn test_tool_role_message() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{ "role": "tool", "tool_call_id": "c1", "content": "result text" }]
        }));

        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["type"], "function_call_output");
        assert_eq!(input[0]["call_id"], "c1");
        assert_eq!(input[0]["output"], "result text");
    }

    /// assistant 的 tool_calls 列表优先，文本内容不再保留
    #[test]
    fn test_assistant_tool_calls_list() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{
                "role": "assistant",
                "content": "calling...",
                "tool_calls": [
                    { "id": "c1", "type": "function", "function": { "name": "f1", "arguments": "{\"a\":1}" } },
                    { "id": "c2", "type": "function", "function": { "name": "f2", "arguments": { "b": 2 } } }
                ]
            }]
        }));

        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input[0]["type"], "function_call");
        assert_eq!(input[0]["name"], "f1");
        assert_eq!(input[0]["call_id"], "c1");
        assert_eq!(input[0]["arguments"], "{\"a\":1}");
        // 非字符串 arguments 序列化
        assert_eq!(input[1]["arguments"], "{\"b\":2}");
    }

    /// 旧式 function_call 字段在没有 tool_calls 时触发
    #[test]
    fn test_assistant_legacy_function_call() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{
                "role": "assistant",
                "id": "m1",
                "function_call": { "name": "f", "arguments": "{}" }
            }]
        }));

        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["name"], "f");
        assert_eq!(input[0]["call_id"], "m1");
        assert_eq!(input[0]["arguments"], "{}");
    }

    /// 裸 tool_call_id 的 assistant 消息兜底转换
    #[test]
    fn test_assistant_bare_tool_call_id() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{
                "role": "assistant",
                "name": "f",
                "tool_call_id": "c9",
                "content": "done"
            }]
        }));

        let input = out["input"].as_array().unwrap();
        assert_eq!(input[0]["type"], "function_call");
        assert_eq!(input[0]["call_id"], "c9");
        assert_eq!(input[0]["name"], "f");
        assert_eq!(input[0]["arguments"], "done");
    }

    /// 内容被全部拆走的消息从 input 中消失
    #[test]
    fn test_emptied_message_dropped() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [{ "type": "tool_result", "tool_use_id": "t", "content": "x" }]
            }]
        }));
        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["type"], "function_call_output");
    }

    /// 图片部件改写且 cache_control 被剥掉
    #[test]
    fn test_image_part_and_cache_control() {
        let out = convert(&json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "look", "cache_control": { "type": "ephemeral" } },
                    { "type": "image_url", "image_url": { "url": "https://img/x.png" }, "media_type": "image/png" }
                ]
            }]
        }));

        let content = out["input"][0]["content"].as_array().unwrap();
        assert!(content[0].get("cache_control").is_none());
        assert_eq!(content[1]["type"], "input_image");
        assert_eq!(content[1]["image_url"], "https://img/x.png");
        assert!(content[1].get("media_type").is_none());
    }

    /// reasoning：显式 effort 优先于配置默认值
    #[test]
    fn test_reasoning_explicit_effort() {
        let out = convert_with_default(
            &json!({ "model": "m", "messages": [], "reasoning.effort": " high " }),
            Some("low"),
        );
        assert_eq!(out["reasoning"], json!({ "effort": "high" }));
    }

    /// reasoning：请求未指定时使用配置默认值
    #[test]
    fn test_reasoning_default_effort() {
        let out = convert_with_default(&json!({ "model": "m", "messages": [] }), Some("low"));
        assert_eq!(out["reasoning"], json!({ "effort": "low" }));
    }

    /// reasoning：仅平铺 enabled 标志时回退 medium
    #[test]
    fn test_reasoning_flat_enabled_defaults_medium() {
        let out = convert(&json!({
            "model": "m",
            "messages": [],
            "reasoning.enabled": true
        }));
        assert_eq!(out["reasoning"], json!({ "effort": "medium" }));
    }

    /// reasoning：请求自带对象剔除 enabled / max_tokens 后整体覆盖
    #[test]
    fn test_reasoning_object_overrides_scrubbed() {
        let out = convert(&json!({
            "model": "m",
            "messages": [],
            "reasoning": { "effort": "high", "enabled": true, "max_tokens": 100, "summary": "auto" }
        }));
        assert_eq!(out["reasoning"], json!({ "effort": "high", "summary": "auto" }));
    }

    /// reasoning：未设置任何提示时不输出 reasoning 字段
    #[test]
    fn test_reasoning_absent() {
        let out = convert(&json!({ "model": "m", "messages": [] }));
        assert!(out.get("reasoning").is_none());
    }

    /// 透传字段保持原样
    #[test]
    fn test_passthrough_fields() {
        let out = convert(&json!({
            "model": "m",
            "messages": [],
            "metadata": { "k": "v" },
            "response_format": { "type": "json_object" },
            "tool_choice": "auto",
            "parallel_tool_calls": false,
            "user": "u1",
            "modalities": ["text"]
        }));

        assert_eq!(out["metadata"], json!({ "k": "v" }));
        assert_eq!(out["response_format"], json!({ "type": "json_object" }));
        assert_eq!(out["tool_choice"], "auto");
        assert_eq!(out["parallel_tool_calls"], json!(false));
        assert_eq!(out["user"], "u1");
        assert_eq!(out["modalities"], json!(["text"]));
    }

    /// 出站 URL 的路径强制以 /responses 结尾
    #[test]
    fn test_outbound_url_suffix() {
        assert_eq!(
            build_outbound_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1/responses"
        );
        assert_eq!(
            build_outbound_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/responses"
        );
        assert_eq!(
            build_outbound_url("https://api.openai.com/v1/responses"),
            "https://api.openai.com/v1/responses"
        );
        assert_eq!(
            build_outbound_url("https://host/v1?beta=true"),
            "https://host/v1/responses?beta=true"
        );
    }

    /// 出站请求头：Bearer 鉴权 + JSON 类型
    #[test]
    fn test_outbound_headers() {
        let bytes = Bytes::from(
            serde_json::to_vec(&json!({ "model": "m", "messages": [] })).unwrap(),
        );
        let outbound = chat_request_to_responses(&bytes, &provider(), None).unwrap();
        assert_eq!(
            outbound.headers.get("authorization").unwrap(),
            "Bearer sk-test"
        );
        assert_eq!(
            outbound.headers.get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(outbound.url, "https://api.openai.com/v1/responses");
    }

    /// 缺失 base_url 的 provider 直接报配置错误，不发起调用
    #[test]
    fn test_missing_base_url_is_config_error() {
        let target = ProviderTarget {
            name: "bad",
            base_url: "",
            api_key: "k",
        };
        let bytes = Bytes::from(
            serde_json::to_vec(&json!({ "model": "m", "messages": [] })).unwrap(),
        );
        let err = chat_request_to_responses(&bytes, &target, None).unwrap_err();
        assert!(err.contains("bad"), "错误信息应包含 provider 名: {err}");
    }
}
