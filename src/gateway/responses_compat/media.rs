//! 媒体内容格式转换
//!
//! Chat Completions 图片部件 → Responses `input_image`：
//! - Chat: { type: "`image_url`", `image_url`: { url } } 或平铺 url 字段
//! - Responses: { type: "`input_image`", `image_url`: "..." }

use serde_json::{Map, Value};

/// `image_url` 部件原地改写为 `input_image`
///
/// url 依序取嵌套 `image_url.url`、平铺 `url`，都取不到时保留原值；
/// `media_type` 下游不支持，直接丢弃。
pub fn relabel_image_part(part: &mut Map<String, Value>) {
    part.insert(
        "type".to_string(),
        Value::String("input_image".to_string()),
    );
    let url = part
        .get("image_url")
        .and_then(|value| value.get("url"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            part.get("url")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .map(ToString::to_string);
    if let Some(url) = url {
        part.insert("image_url".to_string(), Value::String(url));
    }
    part.remove("media_type");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn part(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    /// 嵌套 url 展开为字符串，media_type 丢弃
    #[test]
    fn test_nested_url_flattened() {
        let mut image = part(json!({
            "type": "image_url",
            "image_url": { "url": "https://img/a.png" },
            "media_type": "image/png"
        }));
        relabel_image_part(&mut image);
        assert_eq!(image["type"], "input_image");
        assert_eq!(image["image_url"], "https://img/a.png");
        assert!(!image.contains_key("media_type"));
    }

    /// 平铺 url 字段兜底
    #[test]
    fn test_flat_url_fallback() {
        let mut image = part(json!({ "type": "image_url", "url": "https://img/b.png" }));
        relabel_image_part(&mut image);
        assert_eq!(image["image_url"], "https://img/b.png");
    }

    /// 没有可解析的 url 时保留原值
    #[test]
    fn test_unresolvable_url_kept() {
        let mut image = part(json!({ "type": "image_url", "image_url": { "detail": "low" } }));
        relabel_image_part(&mut image);
        assert_eq!(image["image_url"], json!({ "detail": "low" }));
    }
}
