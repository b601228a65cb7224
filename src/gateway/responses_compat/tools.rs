//! 工具定义格式转换
//!
//! Chat Completions 嵌套的 function 工具定义压平为 Responses 形态：
//! - Chat: { type: "function", function: { name, description, parameters, response } }
//! - Responses: { type: "function", name, description, parameters, response }

use serde_json::{Map, Value, json};

/// Chat tools → Responses tools
///
/// 原始工具里有名为 `web_search` 的 function 时，若结果里还没有
/// `web_search_preview` 工具则补充一个。
pub fn flatten_chat_tools(value: &Value) -> Value {
    let Some(tools) = value.as_array() else {
        return Value::Array(Vec::new());
    };

    let has_web_search = tools.iter().any(|tool| {
        tool.get("function")
            .and_then(|function| function.get("name"))
            .and_then(Value::as_str)
            == Some("web_search")
    });

    let mut mapped = tools.iter().map(flatten_tool).collect::<Vec<_>>();

    if has_web_search {
        let has_preview = mapped
            .iter()
            .any(|tool| tool.get("type").and_then(Value::as_str) == Some("web_search_preview"));
        if !has_preview {
            mapped.push(json!({ "type": "web_search_preview" }));
        }
    }

    Value::Array(mapped)
}

fn flatten_tool(tool: &Value) -> Value {
    let Some(object) = tool.as_object() else {
        return tool.clone();
    };
    if object.get("type").and_then(Value::as_str) != Some("function") {
        return tool.clone();
    }
    let Some(function) = object.get("function").and_then(Value::as_object) else {
        return tool.clone();
    };

    let mut out = Map::new();
    out.insert("type".to_string(), json!("function"));
    for key in ["name", "description", "parameters", "response"] {
        if let Some(field) = function.get(key) {
            out.insert(key.to_string(), field.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// 嵌套 function 定义被压平，缺失字段不输出
    #[test]
    fn test_flatten_function_tool() {
        let tools = json!([{
            "type": "function",
            "function": { "name": "lookup", "parameters": { "type": "object" } }
        }]);
        let out = flatten_chat_tools(&tools);
        let out = out.as_array().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["type"], "function");
        assert_eq!(out[0]["name"], "lookup");
        assert_eq!(out[0]["parameters"], json!({ "type": "object" }));
        assert!(out[0].get("description").is_none());
        assert!(out[0].get("function").is_none());
    }

    /// web_search 工具触发补充 web_search_preview
    #[test]
    fn test_web_search_appends_preview() {
        let tools = json!([{
            "type": "function",
            "function": { "name": "web_search", "description": "d" }
        }]);
        let out = flatten_chat_tools(&tools);
        let out = out.as_array().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], json!({ "type": "web_search_preview" }));
    }

    /// 已存在 web_search_preview 时不再重复补充
    #[test]
    fn test_existing_preview_not_duplicated() {
        let tools = json!([
            { "type": "function", "function": { "name": "web_search" } },
            { "type": "web_search_preview" }
        ]);
        let out = flatten_chat_tools(&tools);
        assert_eq!(out.as_array().unwrap().len(), 2);
    }

    /// 非 function 工具原样透传
    #[test]
    fn test_non_function_tool_passthrough() {
        let tools = json!([{ "type": "computer_use_preview", "display_width": 1024 }]);
        let out = flatten_chat_tools(&tools);
        assert_eq!(out[0], tools[0]);
    }
}
