//! 上游响应的分发辅助
//!
//! - gzip 编码的 JSON 响应体先解压再转换
//! - SSE 响应逐帧改写为 `chat.completion.chunk` 流

use std::{convert::Infallible, io::Read};

use bytes::Bytes;
use flate2::read::GzDecoder;
use futures_util::{StreamExt, future, stream};
use http_body_util::BodyStream;
use hyper::{
    body::Incoming,
    header::{HeaderName, HeaderValue},
};
use salvo::{http::ResBody, prelude::*};

use crate::gateway::responses_compat::ChatStreamState;

/// 尝试解压 gzip 编码的响应体
///
/// 检查 content-encoding 头部，如果是 gzip 则自动解压。
pub fn decompress_gzip_if_needed(body_bytes: &Bytes, content_encoding: Option<&str>) -> Bytes {
    let is_gzip = content_encoding.is_some_and(|enc| enc.to_lowercase().contains("gzip"));

    if !is_gzip {
        return body_bytes.clone();
    }

    let mut decoder = GzDecoder::new(&body_bytes[..]);
    let mut decompressed = Vec::new();
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) => {
            tracing::debug!(
                "📦 gzip 解压成功: {} bytes → {} bytes",
                body_bytes.len(),
                decompressed.len()
            );
            decompressed.into()
        }
        Err(e) => {
            tracing::warn!("gzip 解压失败: {}，使用原始响应体", e);
            body_bytes.clone()
        }
    }
}

/// SSE 响应：上游 Responses 事件流逐帧改写为 `chat.completion.chunk` 流
///
/// 转换后的流一律以 200 下发。转换状态独占于本次响应，
/// 输入流结束时冲刷残留缓冲并随之关闭输出，不追加 [DONE] 哨兵。
pub fn render_chat_sse(res: &mut Response, body: Incoming) {
    res.status_code(StatusCode::OK);
    let headers = res.headers_mut();
    headers.insert(
        HeaderName::from_static("content-type"),
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        HeaderName::from_static("connection"),
        HeaderValue::from_static("keep-alive"),
    );

    let stream = BodyStream::new(body)
        .filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok(),
                Err(e) => {
                    tracing::error!("SSE 流读取错误: {}", e);
                    None
                }
            }
        })
        .map(Some)
        // 输入流收尾时补一个 None，触发残留缓冲的冲刷
        .chain(stream::once(async { None }))
        .scan(ChatStreamState::new(), |state, data| {
            let out = match data {
                Some(data) => state.feed(&data),
                None => state.finish(),
            };
            future::ready(Some(out))
        })
        .filter_map(|out| async move {
            (!out.is_empty()).then(|| Ok::<Bytes, Infallible>(Bytes::from(out)))
        });
    res.body(ResBody::stream(stream));
}
