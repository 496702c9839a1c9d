//! 从模型回复中提取 JSON 片段
//!
//! 兼容 ```json ... ``` 代码块、无语言标注的代码块，以及前后夹杂说明文字的裸 JSON。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

static FENCED_BLOCK_RE: OnceLock<Regex> = OnceLock::new();

/// 返回回复中的 JSON 片段；完全没有 `{` / `[` 时返回 None
///
/// 裸 JSON 按每个 `{` / `[` 的位置依次尝试解析，优先返回对象或对象数组，
/// 其次是任意完整的 JSON 值；都解析失败时从第一个括号截到最后一个匹配的闭括号。
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    let re = FENCED_BLOCK_RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap());
    if let Some(inner) = re
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| s.starts_with('{') || s.starts_with('['))
    {
        return Some(inner);
    }

    let first = trimmed.find(['{', '['])?;

    let mut fallback = None;
    for (start, _) in trimmed.match_indices(['{', '[']) {
        if let Some((slice, value)) = leading_value(&trimmed[start..]) {
            if is_structured(&value) {
                return Some(slice);
            }
            fallback = fallback.or(Some(slice));
        }
    }
    if fallback.is_some() {
        return fallback;
    }

    let close = if trimmed[first..].starts_with('{') { '}' } else { ']' };
    match trimmed.rfind(close) {
        Some(end) if end > first => Some(&trimmed[first..=end]),
        _ => Some(&trimmed[first..]),
    }
}

/// 解析 text 开头的一个完整 JSON 值，返回该值对应的切片
fn leading_value(text: &str) -> Option<(&str, Value)> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some((&text[..stream.byte_offset()], value)),
        _ => None,
    }
}

/// 对象，或全部元素都是对象的数组
fn is_structured(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().all(Value::is_object),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_block() {
        let reply = "Here is the plan:\n```json\n{\"steps\": []}\n```\nDone.";
        assert_eq!(extract_json(reply), Some("{\"steps\": []}"));
    }

    #[test]
    fn test_unlabelled_fence_with_array() {
        let reply = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json(reply), Some("[1, 2, 3]"));
    }

    #[test]
    fn test_bare_json_with_surrounding_text() {
        let reply = "Sure! [{\"a\": 1}, {\"a\": 2}] hope this helps";
        assert_eq!(extract_json(reply), Some("[{\"a\": 1}, {\"a\": 2}]"));

        let reply = "result: {\"score\": 7} end";
        assert_eq!(extract_json(reply), Some("{\"score\": 7}"));
    }

    #[test]
    fn test_no_json_at_all() {
        assert_eq!(extract_json("I cannot answer that."), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_brackets_in_prose_before_payload() {
        let reply = "Plan below (steps [1-3]):\n{\"steps\": [{\"step_name\": \"a\"}]}";
        assert_eq!(extract_json(reply), Some("{\"steps\": [{\"step_name\": \"a\"}]}"));

        // 可解析但不是结构化负载的片段让位于后面的对象
        let reply = "See note [1] and {x} first. {\"score\": 7, \"verdict\": \"ok\"} thanks";
        assert_eq!(extract_json(reply), Some("{\"score\": 7, \"verdict\": \"ok\"}"));
    }

    #[test]
    fn test_truncated_json_is_returned_as_is() {
        assert_eq!(extract_json("{\"steps\": [ "), Some("{\"steps\": ["));
    }
}
