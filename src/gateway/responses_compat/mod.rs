//! Chat Completions 与 `OpenAI` Responses API 格式双向转换
//!
//! 功能：
//! - Chat Completions 请求 → Responses 请求（含出站 URL 与请求头）
//! - Responses JSON 响应 → `chat.completion`
//! - Responses SSE 事件流 → `chat.completion.chunk` 流
//!
//! 两个方向互不共享可变状态；流式转换的关联状态仅属于单个响应流，
//! 流结束即丢弃。

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::HeaderMap;

mod media;
mod request;
mod response;
mod stream;
mod tools;

pub use stream::ChatStreamState;

/// 目标提供商描述，转换层只消费这三个字段
pub struct ProviderTarget<'a> {
    pub name: &'a str,
    pub base_url: &'a str,
    pub api_key: &'a str,
}

/// 请求转换产物：出站 URL、请求头与请求体
#[derive(Debug)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Chat Completions 请求 → Responses 请求
///
/// `default_effort` 为配置层的 reasoning effort 默认值，
/// 请求未显式指定时生效。
pub fn chat_request_to_responses(
    body: &Bytes,
    provider: &ProviderTarget<'_>,
    default_effort: Option<&str>,
) -> Result<OutboundRequest, String> {
    request::chat_request_to_responses(body, provider, default_effort)
}

/// Responses JSON 响应 → `chat.completion` 响应
pub fn responses_response_to_chat(body: &Bytes) -> Result<Bytes, String> {
    response::responses_response_to_chat(body)
}

/// 当前 Unix 时间戳（秒）
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
