//! 固定スキーマ用の最小テキストオブジェクト記法
//!
//! 汎用 JSON パーサではない。既知のキーだけをインデックス走査で探し、
//! 形が合わなければ `None` を返す。パニックしないこと、入力長に比例した
//! 走査で終わることだけを保証する。

/// `\` と `"` をエスケープする
pub(crate) fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// `escape` の逆変換。未知のエスケープはそのまま残す
pub(crate) fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('\\') | Some('"') => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

pub(crate) fn push_string_field(out: &mut String, name: &str, value: &str) {
    out.push('"');
    out.push_str(name);
    out.push_str("\":\"");
    out.push_str(&escape(value));
    out.push('"');
}

pub(crate) fn push_raw_field(out: &mut String, name: &str, value: &str) {
    out.push('"');
    out.push_str(name);
    out.push_str("\":");
    out.push_str(value);
}

/// 前後の空白を除いて `{...}` で囲まれていれば中身込みのスライスを返す
pub(crate) fn as_object(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('{') && trimmed.ends_with('}') {
        Some(trimmed)
    } else {
        None
    }
}

/// 最上位メンバーのキー `"key"` を探し、直後の `:` の次の位置を返す
///
/// `obj` は `{` で始まること。文字列値やネストした `{}` `[]` の中は
/// キーとして扱わない。
fn value_start(obj: &str, key: &str) -> Option<usize> {
    let bytes = obj.as_bytes();
    if bytes.first() != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut expect_key = true;
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let end = closing_quote(obj, i)?;
                if depth == 0 && expect_key {
                    if obj.get(i + 1..end) == Some(key) {
                        let pos = skip_ws(obj, end + 1);
                        if bytes.get(pos) != Some(&b':') {
                            return None;
                        }
                        return Some(skip_ws(obj, pos + 1));
                    }
                    expect_key = false;
                }
                i = end + 1;
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
            }
            b',' if depth == 0 => expect_key = true,
            _ => {}
        }
        i += 1;
    }
    None
}

fn skip_ws(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// `start` が開きクォートを指しているとき、対応する閉じクォートの位置を返す
fn closing_quote(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.get(start) != Some(&b'"') {
        return None;
    }
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// 文字列値を取り出す
pub(crate) fn extract_string(obj: &str, key: &str) -> Option<String> {
    let start = value_start(obj, key)?;
    let end = closing_quote(obj, start)?;
    Some(unescape(&obj[start + 1..end]))
}

/// 数値・真偽値などクォートなしの値を取り出す（`,` `}` 空白まで）
pub(crate) fn extract_raw<'a>(obj: &'a str, key: &str) -> Option<&'a str> {
    let start = value_start(obj, key)?;
    let rest = obj.get(start..)?;
    let end = rest
        .find(|c: char| c == ',' || c == '}' || c.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let raw = &rest[..end];
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// 真偽値を取り出す
pub(crate) fn extract_bool(obj: &str, key: &str) -> Option<bool> {
    match extract_raw(obj, key)? {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// ネストしたオブジェクト `{...}` をスライスで返す（文字列内の括弧は無視）
pub(crate) fn extract_object<'a>(obj: &'a str, key: &str) -> Option<&'a str> {
    let start = value_start(obj, key)?;
    let bytes = obj.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = closing_quote(obj, i)? + 1;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&obj[start..=i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// 文字列配列を取り出す。要素がクォート文字列でなければ `None`
pub(crate) fn extract_string_array(obj: &str, key: &str) -> Option<Vec<String>> {
    let start = value_start(obj, key)?;
    let bytes = obj.as_bytes();
    if bytes.get(start) != Some(&b'[') {
        return None;
    }

    let mut values = Vec::new();
    let mut pos = skip_ws(obj, start + 1);
    if bytes.get(pos) == Some(&b']') {
        return Some(values);
    }

    loop {
        let end = closing_quote(obj, pos)?;
        let value = unescape(&obj[pos + 1..end]);
        if !value.is_empty() {
            values.push(value);
        }
        pos = skip_ws(obj, end + 1);
        match bytes.get(pos) {
            Some(b',') => pos = skip_ws(obj, pos + 1),
            Some(b']') => return Some(values),
            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_unescape() {
        let raw = r#"a "quoted" \path\"#;
        assert_eq!(unescape(&escape(raw)), raw);
    }

    #[test]
    fn test_unescape_keeps_unknown_sequences() {
        assert_eq!(unescape(r"line\nbreak"), r"line\nbreak");
    }

    #[test]
    fn test_extract_string_with_escaped_quote() {
        let obj = r#"{"name":"say \"hi\"","other":"x"}"#;
        assert_eq!(extract_string(obj, "name").as_deref(), Some(r#"say "hi""#));
        assert_eq!(extract_string(obj, "other").as_deref(), Some("x"));
    }

    #[test]
    fn test_extract_string_rejects_non_string_value() {
        assert_eq!(extract_string(r#"{"port":25565}"#, "port"), None);
    }

    #[test]
    fn test_extract_raw_and_bool() {
        let obj = r#"{"port":25566,"flag":true,"bad":maybe}"#;
        assert_eq!(extract_raw(obj, "port"), Some("25566"));
        assert_eq!(extract_bool(obj, "flag"), Some(true));
        assert_eq!(extract_bool(obj, "bad"), None);
        assert_eq!(extract_bool(obj, "missing"), None);
    }

    #[test]
    fn test_extract_object_skips_braces_in_strings() {
        let obj = r#"{"secret":{"secret":"a}b","timestamp":1},"x":1}"#;
        assert_eq!(
            extract_object(obj, "secret"),
            Some(r#"{"secret":"a}b","timestamp":1}"#)
        );
    }

    #[test]
    fn test_extract_string_array() {
        let obj = r#"{"loaders":[ "fabric" , "quilt" ]}"#;
        assert_eq!(
            extract_string_array(obj, "loaders"),
            Some(vec!["fabric".to_string(), "quilt".to_string()])
        );
        assert_eq!(extract_string_array(r#"{"loaders":[]}"#, "loaders"), Some(vec![]));
        assert_eq!(extract_string_array(r#"{"loaders":[fabric]}"#, "loaders"), None);
        assert_eq!(extract_string_array(r#"{"loaders":["fabric""#, "loaders"), None);
    }

    #[test]
    fn test_key_names_inside_values_are_not_keys() {
        let obj = r#"{"a":"b\",\"key\":\"x","list":["key"],"nested":{"key":"no"},"key":"yes"}"#;
        assert_eq!(extract_string(obj, "key").as_deref(), Some("yes"));

        let obj = r#"{"name":"port","port":1}"#;
        assert_eq!(extract_raw(obj, "port"), Some("1"));
        assert_eq!(extract_string(r#"{"name":"port"}"#, "port"), None);
    }

    #[test]
    fn test_truncated_input_never_panics() {
        let full = r#"{"loaders":["fabric"],"amVersion":"4.0.0","mcVersion":"1.21.1"}"#;
        for end in 0..full.len() {
            let part = &full[..end];
            let _ = extract_string(part, "amVersion");
            let _ = extract_string_array(part, "loaders");
            let _ = extract_object(part, "loaders");
            let _ = extract_raw(part, "mcVersion");
        }
    }
}
