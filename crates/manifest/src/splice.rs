//! 원본 텍스트를 보존하는 렌더링
//!
//! 편집된 JSON 트리를 원본 텍스트 위에 다시 입힙니다. 값이 바뀐 멤버의 값 구간만
//! 새로 렌더링하고, 나머지 바이트(배열 배치, 문자열 이스케이프, 공백)는 그대로 복사합니다.
//! 원본과 편집본이 모두 객체이면 재귀적으로 내려가므로 `overrides` 안의 항목 하나만
//! 바뀌면 그 항목의 값 구간만 교체됩니다.
//!
//! 원본 객체와 트리가 어긋나면 (중복 키, 키 순서 변경) `None`을 반환하고,
//! 호출자는 해당 값 전체를 새로 렌더링합니다.

use std::ops::Range;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::manifest::Indent;

/// 객체 멤버 하나의 위치
#[derive(Debug)]
struct Member {
    key: String,
    key_start: usize,
    key_end: usize,
    value: Range<usize>,
}

/// 객체 하나의 위치
#[derive(Debug)]
struct ObjectSpan {
    open: usize,
    close: usize,
    members: Vec<Member>,
}

/// 이미 `serde_json`이 검증한 텍스트를 위한 최소 스캐너
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn at(text: &'a str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        (self.peek()? == byte).then(|| self.pos += 1)
    }

    fn string(&mut self) -> Option<Range<usize>> {
        let start = self.pos;
        self.expect(b'"')?;
        loop {
            match self.peek()? {
                b'\\' => self.pos += 2,
                b'"' => {
                    self.pos += 1;
                    return Some(start..self.pos);
                }
                _ => self.pos += 1,
            }
        }
    }

    fn value(&mut self) -> Option<Range<usize>> {
        let start = self.pos;
        match self.peek()? {
            b'"' => {
                self.string()?;
            }
            b'{' | b'[' => {
                let mut depth = 0usize;
                loop {
                    match self.peek()? {
                        b'"' => {
                            self.string()?;
                            continue;
                        }
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth = depth.checked_sub(1)?;
                            if depth == 0 {
                                self.pos += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    self.pos += 1;
                }
            }
            _ => {
                while let Some(b) = self.peek() {
                    if matches!(b, b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r') {
                        break;
                    }
                    self.pos += 1;
                }
            }
        }
        (self.pos > start).then_some(start..self.pos)
    }

    fn object(&mut self) -> Option<ObjectSpan> {
        let open = self.pos;
        self.expect(b'{')?;
        let mut members = Vec::new();
        self.skip_ws();
        if self.peek()? == b'}' {
            let close = self.pos;
            self.pos += 1;
            return Some(ObjectSpan { open, close, members });
        }
        loop {
            self.skip_ws();
            let key = self.string()?;
            let name: String = serde_json::from_str(&self.text[key.clone()]).ok()?;
            self.skip_ws();
            self.expect(b':')?;
            self.skip_ws();
            let value = self.value()?;
            members.push(Member {
                key: name,
                key_start: key.start,
                key_end: key.end,
                value,
            });
            self.skip_ws();
            match self.peek()? {
                b',' => self.pos += 1,
                b'}' => {
                    let close = self.pos;
                    self.pos += 1;
                    return Some(ObjectSpan { open, close, members });
                }
                _ => return None,
            }
        }
    }
}

/// 편집된 트리를 원본 텍스트에 입혀 렌더링합니다.
///
/// 최상위 객체를 원본과 대응시킬 수 없으면 `None`을 반환합니다.
pub(crate) fn render_preserving(
    text: &str,
    original: &Value,
    updated: &Value,
    indent: Indent,
) -> Option<String> {
    let (Value::Object(old), Value::Object(new)) = (original, updated) else {
        return None;
    };
    let mut scanner = Scanner::at(text, 0);
    scanner.skip_ws();
    let span = scanner.object()?;
    let body = splice_object(text, &span, old, new, indent)?;

    let mut out = String::with_capacity(text.len() + body.len());
    out.push_str(&text[..span.open]);
    out.push_str(&body);
    out.push_str(&text[span.close + 1..]);
    Some(out)
}

fn splice_object(
    text: &str,
    span: &ObjectSpan,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    indent: Indent,
) -> Option<String> {
    if span.members.is_empty() || new.is_empty() || span.members.len() != old.len() {
        return None;
    }
    if !span.members.iter().map(|m| m.key.as_str()).eq(old.keys().map(String::as_str)) {
        return None;
    }
    // 남은 기존 키는 원래 순서를 유지해야 함 (새 키는 뒤에 붙음)
    let kept = old.keys().filter(|k| new.contains_key(*k));
    let existing = new.keys().filter(|k| old.contains_key(*k));
    if !kept.eq(existing) {
        return None;
    }

    let first = &span.members[0];
    let first_lead = &text[span.open + 1..first.key_start];
    let colon = &text[first.key_end..first.value.start];
    let separator = match span.members.get(1) {
        Some(second) => text[first.value.end..second.key_start].to_owned(),
        None => format!(",{first_lead}"),
    };
    let single_line = !text[span.open..span.close].contains('\n');
    let member_indent = line_indent(text, first.key_start);
    let trailing = span
        .members
        .last()
        .map_or("", |last| &text[last.value.end..span.close]);

    let mut body = String::from("{");
    let mut empty = true;
    for (i, member) in span.members.iter().enumerate() {
        let Some(new_value) = new.get(&member.key) else {
            continue;
        };
        if empty {
            body.push_str(first_lead);
        } else {
            body.push_str(&text[span.members[i - 1].value.end..member.key_start]);
        }
        body.push_str(&text[member.key_start..member.value.start]);
        let old_value = &old[&member.key];
        if old_value == new_value {
            body.push_str(&text[member.value.clone()]);
        } else {
            let nested = match (old_value, new_value) {
                (Value::Object(o), Value::Object(n)) => Scanner::at(text, member.value.start)
                    .object()
                    .and_then(|inner| splice_object(text, &inner, o, n, indent)),
                _ => None,
            };
            match nested {
                Some(spliced) => body.push_str(&spliced),
                None => body.push_str(&render_value(
                    new_value,
                    indent,
                    &line_indent(text, member.key_start),
                    single_line,
                )?),
            }
        }
        empty = false;
    }

    for (key, value) in new.iter().filter(|(k, _)| !old.contains_key(*k)) {
        body.push_str(if empty { first_lead } else { separator.as_str() });
        body.push_str(&serde_json::to_string(key).ok()?);
        body.push_str(colon);
        body.push_str(&render_value(value, indent, &member_indent, single_line)?);
        empty = false;
    }

    body.push_str(trailing);
    body.push('}');
    Some(body)
}

/// `pos`가 속한 줄의 앞쪽 공백. 앞에 다른 내용이 있으면 빈 문자열입니다.
fn line_indent(text: &str, pos: usize) -> String {
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &text[line_start..pos];
    if prefix.bytes().all(|b| b == b' ' || b == b'\t') {
        prefix.to_owned()
    } else {
        String::new()
    }
}

/// 값을 렌더링하고 이어지는 줄에 멤버 들여쓰기를 붙입니다.
fn render_value(value: &Value, indent: Indent, prefix: &str, single_line: bool) -> Option<String> {
    if single_line {
        return serde_json::to_string(value).ok();
    }
    let unit = indent.as_bytes();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&unit);
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser).ok()?;
    let rendered = String::from_utf8(out).ok()?;
    // JSON 문자열 안의 개행은 이스케이프되므로 줄 단위 치환이 안전함
    Some(rendered.replace('\n', &format!("\n{prefix}")))
}
