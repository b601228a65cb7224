//! 流式响应转换
//!
//! `OpenAI` Responses SSE 事件流 → `chat.completion.chunk` 流
//!
//! 上游把一次函数调用拆成 `output_item.added` / `arguments.delta` /
//! `arguments.done` 等细粒度事件，这里按到达顺序把它们重新拼成
//! Chat Completions 的 `tool_calls` 增量；文本增量有多种事件形态，
//! 统一归并为 `delta.content`。无法解析的行记录后丢弃，绝不中断整个流。

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use super::unix_timestamp;

/// 单个函数调用的关联记录
struct ToolCallRecord {
    call_id: String,
    name: String,
    /// 累计的参数片段，`arguments.done` 到达时以最终值覆盖
    arguments: String,
}

/// 单个响应流的转换状态
///
/// 每个上游流独占一份，流结束即丢弃。记录按出现顺序进入 `calls`，
/// 下标即 chat 侧的 `tool_calls[].index`；`call_index` 同时以
/// item id 和 call id 指向同一条记录。
pub struct ChatStreamState {
    buffer: Vec<u8>,
    calls: Vec<ToolCallRecord>,
    call_index: HashMap<String, usize>,
    /// delta.role 只随首个产出的 chunk 下发一次
    role_sent: bool,
}

impl Default for ChatStreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStreamState {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            calls: Vec::new(),
            call_index: HashMap::new(),
            role_sent: false,
        }
    }

    /// 喂入一段上游字节，返回由完整行产出的 Chat SSE 字节
    ///
    /// 行尾未闭合的部分留在缓冲区，等待后续字节或 [`Self::finish`]。
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\n', '\r']), &mut out);
        }
        out
    }

    /// 输入流收尾：残留的最后一行（无换行符）按完整行冲刷
    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let line: Vec<u8> = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches('\r'), &mut out);
        }
        out
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<u8>) {
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        let evt: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                // 解析失败的行按既定策略丢弃，流继续
                tracing::debug!("忽略无法解析的 SSE 行: {}", e);
                return;
            }
        };
        if let Some(chunk) = self.handle_event(&evt)
            && let Ok(text) = serde_json::to_string(&chunk)
        {
            tracing::debug!("⏩ 产出 chunk: {}", text);
            out.extend_from_slice(b"data: ");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b"\n\n");
        }
    }

    /// 单个事件 → 至多一个 chunk；未识别的事件类型不产出
    fn handle_event(&mut self, evt: &Value) -> Option<Value> {
        match evt.get("type").and_then(Value::as_str) {
            Some("response.output_item.added") => self.handle_item_added(evt),
            Some("response.function_call_arguments.delta") => self.handle_arguments_delta(evt),
            Some("response.function_call_arguments.done") => {
                self.handle_arguments_done(evt);
                None
            }
            Some("response.completed") => Some(build_completed_chunk(evt)),
            _ => self.handle_text_delta(evt),
        }
    }

    /// 新 `function_call` item：分配下一个顺序 index，双键注册关联记录，
    /// 并产出引入该工具调用的增量
    fn handle_item_added(&mut self, evt: &Value) -> Option<Value> {
        let item = evt.get("item")?;
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            // 其余 item 类型没有对应的 chat 增量
            return None;
        }

        let key = non_empty(item, "id")
            .or_else(|| non_empty(item, "call_id"))
            .map_or_else(|| format!("tool_{}", self.calls.len()), ToString::to_string);
        let call_id = non_empty(item, "call_id")
            .or_else(|| non_empty(item, "id"))
            .map_or_else(|| key.clone(), ToString::to_string);
        let name = item.get("name").and_then(Value::as_str).unwrap_or("");

        let index = self.calls.len();
        self.call_index.insert(key.clone(), index);
        if call_id != key {
            self.call_index.insert(call_id.clone(), index);
        }
        self.calls.push(ToolCallRecord {
            call_id: call_id.clone(),
            name: name.to_string(),
            arguments: String::new(),
        });

        let mut delta = Map::new();
        self.attach_role_once(&mut delta);
        delta.insert(
            "tool_calls".to_string(),
            json!([{
                "index": index,
                "id": call_id,
                "type": "function",
                "function": { "name": name, "arguments": "" }
            }]),
        );
        Some(build_chunk(evt, Value::Object(delta), Value::Null))
    }

    /// 参数片段：先按 item id 查找，回退 call id，未注册时默认 index 0
    fn handle_arguments_delta(&mut self, evt: &Value) -> Option<Value> {
        let fragment = evt.get("delta").and_then(Value::as_str).unwrap_or("");
        let index = match self.lookup(evt) {
            Some(index) => {
                if let Some(record) = self.calls.get_mut(index) {
                    record.arguments.push_str(fragment);
                }
                index
            }
            // 未注册的片段照常下发，但不归入任何已有记录
            None => 0,
        };

        let mut delta = Map::new();
        self.attach_role_once(&mut delta);
        delta.insert(
            "tool_calls".to_string(),
            json!([{
                "index": index,
                "function": { "arguments": fragment }
            }]),
        );
        Some(build_chunk(evt, Value::Object(delta), Value::Null))
    }

    /// 仅记账：最终参数落到关联记录上，不产出 chunk
    fn handle_arguments_done(&mut self, evt: &Value) {
        let Some(index) = self.lookup(evt) else {
            return;
        };
        if let Some(record) = self.calls.get_mut(index) {
            if let Some(arguments) = evt.get("arguments").and_then(Value::as_str) {
                record.arguments = arguments.to_string();
            }
            tracing::debug!(
                "函数调用参数就绪: call_id={}, name={}, {} 字节",
                record.call_id,
                record.name,
                record.arguments.len()
            );
        }
    }

    fn lookup(&self, evt: &Value) -> Option<usize> {
        non_empty(evt, "item_id")
            .and_then(|key| self.call_index.get(key))
            .or_else(|| non_empty(evt, "call_id").and_then(|key| self.call_index.get(key)))
            .copied()
    }

    /// 文本增量的几种事件形态归并成一段 content
    fn handle_text_delta(&mut self, evt: &Value) -> Option<Value> {
        let mut text = String::new();
        match evt.get("type").and_then(Value::as_str) {
            Some("response.delta") => {
                let content = evt
                    .get("delta")
                    .and_then(|delta| delta.get("content"))
                    .and_then(Value::as_array)?;
                for part in content {
                    if matches!(
                        part.get("type").and_then(Value::as_str),
                        Some("output_text.delta" | "text.delta" | "output_text")
                    ) {
                        let payload = part
                            .get("text")
                            .filter(|v| !v.is_null())
                            .or_else(|| part.get("delta").filter(|v| !v.is_null()))
                            .unwrap_or(part);
                        append_delta(payload, &mut text);
                    }
                }
            }
            Some("response.output_text.delta" | "output_text.delta" | "text.delta") => {
                if let Some(fragment) = evt.get("delta").and_then(Value::as_str) {
                    text.push_str(fragment);
                } else if let Some(payload) = evt
                    .get("text")
                    .filter(|v| !v.is_null())
                    .or_else(|| evt.get("delta").filter(|v| !v.is_null()))
                {
                    append_delta(payload, &mut text);
                }
            }
            _ => return None,
        }
        if text.is_empty() {
            return None;
        }

        let mut delta = Map::new();
        self.attach_role_once(&mut delta);
        delta.insert("content".to_string(), Value::String(text));
        Some(build_chunk(evt, Value::Object(delta), Value::Null))
    }

    fn attach_role_once(&mut self, delta: &mut Map<String, Value>) {
        if !self.role_sent {
            delta.insert("role".to_string(), Value::String("assistant".to_string()));
            self.role_sent = true;
        }
    }
}

/// 文本增量可能藏在字符串、数组或对象的 text / delta / content 字段里，递归拼接
fn append_delta(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => out.push_str(text),
        Value::Array(items) => {
            for item in items {
                append_delta(item, out);
            }
        }
        Value::Object(object) => {
            if let Some(text) = object.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
            if let Some(delta) = object.get("delta").and_then(Value::as_str) {
                out.push_str(delta);
            }
            if let Some(content) = object.get("content").and_then(Value::as_array) {
                for inner in content {
                    append_delta(inner, out);
                }
            }
        }
        _ => {}
    }
}

fn non_empty<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// 终止 chunk：最终 output 含 `function_call` 时 finish 为 `tool_calls`，否则 stop。
/// 无论当前帧是否命中其它规则，completed 一律立即产出终止 chunk。
fn build_completed_chunk(evt: &Value) -> Value {
    let has_function_call = evt
        .get("response")
        .and_then(|response| response.get("output"))
        .and_then(Value::as_array)
        .is_some_and(|output| {
            output
                .iter()
                .any(|item| item.get("type").and_then(Value::as_str) == Some("function_call"))
        });
    let finish_reason = if has_function_call {
        "tool_calls"
    } else {
        "stop"
    };
    json!({
        "id": evt.get("id").and_then(Value::as_str).unwrap_or(""),
        "object": "chat.completion.chunk",
        "created": unix_timestamp(),
        "model": evt.get("model").and_then(Value::as_str).unwrap_or(""),
        "choices": [{ "index": 0, "delta": {}, "finish_reason": finish_reason }]
    })
}

/// 普通增量 chunk；id 与 model 从触发事件的多个位置依序解析
fn build_chunk(evt: &Value, delta: Value, finish_reason: Value) -> Value {
    let id = non_empty(evt, "id")
        .or_else(|| non_empty(evt, "item_id"))
        .or_else(|| evt.get("item").and_then(|item| non_empty(item, "id")))
        .or_else(|| evt.get("response").and_then(|response| non_empty(response, "id")))
        .unwrap_or("");
    let model = non_empty(evt, "model")
        .or_else(|| {
            evt.get("response")
                .and_then(|response| non_empty(response, "model"))
        })
        .unwrap_or("");
    let index = evt.get("output_index").and_then(Value::as_u64).unwrap_or(0);
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": unix_timestamp(),
        "model": model,
        "choices": [{ "index": index, "delta": delta, "finish_reason": finish_reason }]
    })
}
