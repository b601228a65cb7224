use std::{borrow::Cow, sync::atomic::Ordering};

use http::HeaderMap;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{info, warn};

use crate::gateway::RequestStats;

fn estimate_tokens(text: &str) -> u64 {
    // 整数运算避免浮点精度损失: (len * 2 + 6) / 7 ≈ len / 3.5
    // 使用 checked_mul 防止溢出
    let len = text.len();
    let result = len
        .checked_mul(2)
        .and_then(|x| x.checked_add(6))
        .map_or(usize::MAX, |x| x / 7);
    result as u64
}

// 从 content 字段提取实际文本（处理字符串或数组格式）
fn extract_text(content: &Value) -> Cow<'_, str> {
    match content {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Array(arr) => Cow::Owned(
            arr.iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join(""),
        ),
        _ => Cow::Owned(content.to_string()),
    }
}

// 返回: (total, system, user, assistant, tool)
pub fn analyze_request_body(body: &str) -> (u64, u64, u64, u64, u64) {
    let mut system_tokens = 0;
    let mut user_tokens = 0;
    let mut assistant_tokens = 0;
    let mut tool_tokens = 0;

    if let Ok(json) = serde_json::from_str::<Value>(body) {
        // system 字段、instructions 与 tools 都算进系统开销
        if let Some(system) = json.get("system") {
            system_tokens += estimate_tokens(&system.to_string());
        }
        if let Some(instructions) = json.get("instructions") {
            system_tokens += estimate_tokens(&instructions.to_string());
        }
        if let Some(tools) = json.get("tools") {
            system_tokens += estimate_tokens(&tools.to_string());
        }

        if let Some(messages) = json.get("messages").and_then(|m| m.as_array()) {
            let parsed: Vec<(Cow<'_, str>, u64)> = messages
                .par_iter()
                .filter_map(|msg| {
                    let role = Cow::Borrowed(msg.get("role")?.as_str()?);
                    let content = msg.get("content")?;
                    let tokens = estimate_tokens(extract_text(content).as_ref());
                    Some((role, tokens))
                })
                .collect();

            for (role, tokens) in parsed {
                match role.as_ref() {
                    "user" => user_tokens += tokens,
                    "assistant" => assistant_tokens += tokens,
                    "system" => system_tokens += tokens,
                    "tool" => tool_tokens += tokens,
                    _ => {}
                }
            }
        }
    } else {
        // JSON 解析失败，可能是二进制或非标准格式
        user_tokens = estimate_tokens(body);
    }

    let total = system_tokens + user_tokens + assistant_tokens + tool_tokens;
    (total, system_tokens, user_tokens, assistant_tokens, tool_tokens)
}

// 分段打印大字符串，避免日志截断和字符边界 panic
fn log_segmented(label: &str, body: &str) {
    const CHUNK_SIZE: usize = 8000;

    let len = body.len();
    info!("=== {} (共 {} 字节) ===", label, len);

    if len <= CHUNK_SIZE {
        info!("{}", body);
    } else {
        let total_chunks = len.div_ceil(CHUNK_SIZE);
        let mut start = 0;

        for i in 0..total_chunks {
            let mut end = (start + CHUNK_SIZE).min(len);

            // 结束位置必须落在字符边界上（UTF-8 safe）
            while end < len && !body.is_char_boundary(end) {
                end -= 1;
            }

            if let Some(chunk) = body.get(start..end) {
                info!("--- 第 {}/{} 段 ---\n{}", i + 1, total_chunks, chunk);
            } else {
                warn!("无法获取第 {}/{} 段内容", i + 1, total_chunks);
                break;
            }

            start = end;
        }
    }
    info!("=== {} 结束 ===", label);
}

pub fn log_full_body(body: &str) {
    log_segmented("请求体", body);
}

pub fn log_full_response(body: &str) {
    log_segmented("响应体", body);
}

pub fn calculate_tokens(stats: &RequestStats, body_str: &str) {
    let (total, system, user, assistant, tool) = analyze_request_body(body_str);

    stats.total_tokens.fetch_add(total, Ordering::Relaxed);
    stats.system_tokens.fetch_add(system, Ordering::Relaxed);
    stats.user_tokens.fetch_add(user, Ordering::Relaxed);
    stats.assistant_tokens.fetch_add(assistant, Ordering::Relaxed);
    stats.tool_tokens.fetch_add(tool, Ordering::Relaxed);
    let count = stats.request_count.fetch_add(1, Ordering::Relaxed) + 1;

    info!(
        "📊 本次 | 总: {} | 系统: {} | 用户: {} | 助手: {} | 工具: {}",
        total, system, user, assistant, tool
    );

    info!(
        "🔥 累计 {} 次 | 总: {} | 系统: {} | 用户: {} | 助手: {} | 工具: {}",
        count,
        stats.total_tokens.load(Ordering::Relaxed),
        stats.system_tokens.load(Ordering::Relaxed),
        stats.user_tokens.load(Ordering::Relaxed),
        stats.assistant_tokens.load(Ordering::Relaxed),
        stats.tool_tokens.load(Ordering::Relaxed),
    );
}

/// 打印请求行与全部请求头
pub fn log_request_info(method: &str, uri: &str, headers: &HeaderMap) {
    info!("=== 请求头 ===");
    info!("Method: {}", method);
    info!("URI: {}", uri);

    for (name, value) in headers {
        if let Ok(value_str) = value.to_str() {
            info!("{}: {}", name, value_str);
        }
    }
    info!("=== 请求头结束 ===");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// 各角色 token 分开累计，system 字段与 tools 计入系统开销
    #[test]
    fn test_analyze_request_body_by_role() {
        let body = serde_json::json!({
            "model": "m",
            "system": "be brief",
            "tools": [{ "type": "function", "function": { "name": "f" } }],
            "messages": [
                { "role": "user", "content": "hello there" },
                { "role": "assistant", "content": "hi" },
                { "role": "tool", "content": "result" }
            ]
        })
        .to_string();

        let (total, system, user, assistant, tool) = analyze_request_body(&body);
        assert!(system > 0);
        assert!(user > 0);
        assert!(assistant > 0);
        assert!(tool > 0);
        assert_eq!(total, system + user + assistant + tool);
    }

    /// 非 JSON 输入整体按用户 token 估算
    #[test]
    fn test_analyze_non_json_body() {
        let (total, _, user, _, _) = analyze_request_body("plain text payload");
        assert_eq!(total, user);
        assert!(user > 0);
    }
}
