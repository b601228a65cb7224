mod request;
mod response;
mod utils;

use bytes::Bytes;
use http::HeaderMap;
use http_body_util::{BodyExt, Full};
use hyper::{
    Request as HyperRequest,
    header::{HeaderName, HeaderValue},
};
use salvo::prelude::*;

use crate::gateway::{
    handler::{
        request::override_model_in_body,
        response::{decompress_gzip_if_needed, render_chat_sse},
        utils::setup_handler_state,
    },
    responses_compat::{self, ProviderTarget},
    service::{calculate_tokens, log_full_body, log_full_response, log_request_info},
};

/// Chat Completions 入口 handler
///
/// 入站请求转换为 Responses 请求后发往选中的 provider，
/// 上游响应按 Content-Type 分流：JSON 整体改写、SSE 逐帧改写、
/// 其余类型原样透传。
#[handler]
pub async fn chat_proxy(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let (config, stats, client) = match setup_handler_state(depot) {
        Ok(v) => v,
        Err(e) => {
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            tracing::error!("Failed to get dependencies from depot: {e}");
            return;
        }
    };
    let cfg = config.get();

    log_request_info(
        req.method().as_str(),
        req.uri().to_string().as_str(),
        req.headers(),
    );

    // 收集请求体
    let body_bytes = match BodyExt::collect(req.body_mut()).await {
        Ok(body) => body.to_bytes(),
        Err(e) => {
            tracing::error!("Failed to collect request body: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    // 选择 provider 和 api_key
    let Some(selector) = config.get_provider_selector() else {
        tracing::error!("No provider configured");
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let Some((provider_idx, provider, api_key)) = selector.next() else {
        tracing::error!("No provider configured");
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };

    // 打印选中的 provider 和 api_key（脱敏显示）
    tracing::info!(
        "🔄 选中的 Provider[{}]: name={}, base_url={}, api_key: {}***",
        provider_idx,
        provider.name,
        provider.base_url,
        api_key.chars().take(8).collect::<String>()
    );

    // 使用 provider 配置的 model 覆盖请求体中的 model 字段
    let body_bytes = if provider.model.is_empty() || body_bytes.is_empty() {
        body_bytes
    } else {
        override_model_in_body(&body_bytes, &provider.model).unwrap_or(body_bytes)
    };

    if !body_bytes.is_empty()
        && let Ok(body_str) = std::str::from_utf8(&body_bytes)
    {
        if cfg.log_req_body {
            log_full_body(body_str);
        }
        calculate_tokens(stats.as_ref(), body_str);
    }

    // 请求转换：Chat Completions → Responses，并拿到出站 URL 与请求头
    let target = ProviderTarget {
        name: &provider.name,
        base_url: &provider.base_url,
        api_key,
    };
    let outbound = match responses_compat::chat_request_to_responses(
        &body_bytes,
        &target,
        cfg.reasoning_effort.as_deref(),
    ) {
        Ok(outbound) => outbound,
        Err(e) => {
            tracing::error!("❌ 请求转换失败: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };
    tracing::debug!(
        "🔄 请求体格式转换: Chat Completions → Responses ({} bytes → {} bytes)",
        body_bytes.len(),
        outbound.body.len()
    );
    tracing::info!("Proxying to: {}", outbound.url);

    // 构建代理请求，请求头只带转换层给出的 Authorization 与 Content-Type
    let mut proxy_req_builder = HyperRequest::builder()
        .method(hyper::Method::POST)
        .uri(&outbound.url);
    for (name, value) in &outbound.headers {
        proxy_req_builder = proxy_req_builder.header(name, value);
    }

    let proxy_req = match proxy_req_builder.body(Full::new(outbound.body.clone())) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Failed to build proxy request: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    // 使用共享的 HTTP 客户端发送请求
    match client.request(proxy_req).await {
        Ok(proxy_resp) => {
            let (parts, body) = proxy_resp.into_parts();
            let status = StatusCode::from_u16(parts.status.as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

            let content_type = parts
                .headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            // SSE：在 collect() 之前分流，避免把整个流缓冲进内存
            if content_type.contains("text/event-stream") || content_type.contains("stream") {
                tracing::info!("=== SSE 流式响应开始 ===");
                render_chat_sse(res, body);
                return;
            }

            // 非 SSE：收集完整响应体后处理
            let body_bytes = match BodyExt::collect(body).await {
                Ok(b) => b.to_bytes(),
                Err(e) => {
                    tracing::error!("Failed to collect response body: {}", e);
                    res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
                    return;
                }
            };

            let content_encoding = parts
                .headers
                .get("content-encoding")
                .and_then(|v| v.to_str().ok());
            let body_bytes = decompress_gzip_if_needed(&body_bytes, content_encoding);

            if content_type.contains("application/json") {
                match responses_compat::responses_response_to_chat(&body_bytes) {
                    Ok(converted) => {
                        tracing::debug!(
                            "🔄 响应体格式转换: Responses → Chat Completions ({} bytes → {} bytes)",
                            body_bytes.len(),
                            converted.len()
                        );
                        if cfg.log_res_body
                            && let Ok(body_str) = std::str::from_utf8(&converted)
                        {
                            log_full_response(body_str);
                        }
                        res.status_code(StatusCode::OK);
                        res.headers_mut().insert(
                            HeaderName::from_static("content-type"),
                            HeaderValue::from_static("application/json"),
                        );
                        res.body(converted.to_vec());
                    }
                    Err(e) => {
                        tracing::warn!("响应体格式转换失败: {}，使用原始响应体", e);
                        forward_untouched(res, status, parts.headers, &body_bytes);
                    }
                }
                return;
            }

            // 其余 Content-Type 原样透传
            forward_untouched(res, status, parts.headers, &body_bytes);
        }
        Err(e) => {
            tracing::error!("Proxy request failed: {}", e);
            res.status_code(StatusCode::BAD_GATEWAY);
            res.render("Bad Gateway");
        }
    }
}

/// 上游响应原样转发
fn forward_untouched(res: &mut Response, status: StatusCode, headers: HeaderMap, body: &Bytes) {
    res.status_code(status);
    for (name, value) in headers {
        if let Some(name) = name {
            let name_str = name.as_str();
            // content-length 交给 hyper 重算；响应体可能已解压，content-encoding 不再成立
            if name_str != "content-length" && name_str != "content-encoding" {
                res.headers_mut().insert(name, value);
            }
        }
    }
    res.body(body.to_vec());
}
