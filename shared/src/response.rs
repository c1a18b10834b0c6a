//! Response interpretation.
//!
//! Turns the bytes returned by the remote service into a result value
//! according to a [`ResponseMode`]. Everything here is pure: no I/O, no
//! knowledge of the HTTP client that fetched the bytes.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};

/// How to decode the reply body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Bytes are the result, never parsed
    Raw,
    /// Bytes are a JSON document
    #[default]
    JsonWrapped,
    /// Bytes are a full HTTP message whose body is a JSON document
    HttpBodyParsed,
}

impl ResponseMode {
    pub fn from_flags(raw: bool, http_body_parse: bool) -> Self {
        match (raw, http_body_parse) {
            (_, true) => ResponseMode::HttpBodyParsed,
            (true, false) => ResponseMode::Raw,
            (false, false) => ResponseMode::JsonWrapped,
        }
    }
}

/// Normalized result of an exchange
#[derive(Debug, Clone, PartialEq)]
pub enum Interpreted {
    Raw(Vec<u8>),
    Json(Value),
}

/// Decode `bytes` under `mode`.
pub fn interpret(mode: ResponseMode, bytes: &[u8]) -> Result<Interpreted> {
    match mode {
        ResponseMode::Raw => Ok(Interpreted::Raw(bytes.to_vec())),
        ResponseMode::JsonWrapped => parse_json(bytes).map(Interpreted::Json),
        ResponseMode::HttpBodyParsed => parse_json(http_body(bytes)?).map(Interpreted::Json),
    }
}

pub fn parse_json(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| Error::MalformedResponse(e.to_string()))
}

/// Body of an encapsulated HTTP message (everything after the first blank line).
///
/// The blank line may be CRLF or bare LF; whichever ends the header block
/// first wins.
pub fn http_body(bytes: &[u8]) -> Result<&[u8]> {
    let crlf = find(bytes, b"\r\n\r\n").map(|pos| pos + 4);
    let lf = find(bytes, b"\n\n").map(|pos| pos + 2);
    let start = match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return Err(Error::MalformedHttpEncapsulation),
    };
    Ok(&bytes[start..])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Widest accepted pretty-print indent
pub const MAX_INDENT: i64 = 64;

/// Pretty-print indentation width, between 1 and [`MAX_INDENT`] spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indent(usize);

impl Indent {
    pub fn new(width: i64) -> Result<Self> {
        if !(1..=MAX_INDENT).contains(&width) {
            return Err(Error::InvalidIndent(width));
        }
        usize::try_from(width)
            .map(Indent)
            .map_err(|_| Error::InvalidIndent(width))
    }

    pub fn width(self) -> usize {
        self.0
    }
}

/// Render `value` with `indent` spaces per nesting level.
pub fn to_pretty(value: &Value, indent: Indent) -> Result<Vec<u8>> {
    let pad = vec![b' '; indent.width()];
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&pad));
    value
        .serialize(&mut ser)
        .map_err(|e| Error::MalformedResponse(e.to_string()))?;
    Ok(out)
}

/// Bytes to hand to the output sink.
///
/// Raw results are emitted verbatim unless an indent is configured and they
/// happen to be JSON, in which case they are pretty-printed too.
pub fn render(result: &Interpreted, indent: Option<Indent>) -> Result<Vec<u8>> {
    match (result, indent) {
        (Interpreted::Json(value), Some(indent)) => to_pretty(value, indent),
        (Interpreted::Json(value), None) => {
            serde_json::to_vec(value).map_err(|e| Error::MalformedResponse(e.to_string()))
        }
        (Interpreted::Raw(bytes), Some(indent)) => match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => to_pretty(&value, indent),
            Err(_) => Ok(bytes.clone()),
        },
        (Interpreted::Raw(bytes), None) => Ok(bytes.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ActionRequest, Message};
    use serde_json::json;

    #[test]
    fn test_json_wrapped_status_ok() {
        let result = interpret(ResponseMode::JsonWrapped, br#"{"status":"ok"}"#).unwrap();
        assert_eq!(result, Interpreted::Json(json!({ "status": "ok" })));
    }

    #[test]
    fn test_http_body_parsed() {
        let result =
            interpret(ResponseMode::HttpBodyParsed, b"HTTP/1.1 200 OK\r\n\r\n{\"x\":1}").unwrap();
        assert_eq!(result, Interpreted::Json(json!({ "x": 1 })));
    }

    #[test]
    fn test_http_body_with_headers_and_lf_endings() {
        let crlf = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 7\r\n\r\n{\"x\":1}";
        assert_eq!(http_body(crlf).unwrap(), br#"{"x":1}"#);

        let lf = b"HTTP/1.0 200 OK\nServer: pman\n\n[true]";
        let result = interpret(ResponseMode::HttpBodyParsed, lf).unwrap();
        assert_eq!(result, Interpreted::Json(json!([true])));
    }

    #[test]
    fn test_http_body_missing_boundary() {
        let err = interpret(ResponseMode::HttpBodyParsed, b"HTTP/1.1 200 OK\r\n{\"x\":1}")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedHttpEncapsulation));
    }

    #[test]
    fn test_http_body_not_json() {
        let err =
            interpret(ResponseMode::HttpBodyParsed, b"HTTP/1.1 200 OK\r\n\r\n<html>").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_raw_never_parses() {
        let body = b"{not json at all";
        let result = interpret(ResponseMode::Raw, body).unwrap();
        assert_eq!(result, Interpreted::Raw(body.to_vec()));
        assert_eq!(render(&result, None).unwrap(), body.to_vec());
    }

    #[test]
    fn test_json_wrapped_rejects_malformed() {
        assert!(matches!(
            interpret(ResponseMode::JsonWrapped, b"{\"a\":"),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            interpret(ResponseMode::JsonWrapped, b""),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_echo_round_trip() {
        let request = ActionRequest::new(
            "hello",
            json!({ "askAbout": "sysinfo", "echoBack": "Hi there!", "nested": { "n": [1, 2.5, null] } }),
        );
        let body = Message::from(request.clone()).to_body(None).unwrap();

        let echoed = interpret(ResponseMode::JsonWrapped, &body).unwrap();
        let Interpreted::Json(echoed) = echoed else {
            panic!("expected JSON result");
        };
        let decoded: ActionRequest = serde_json::from_value(echoed).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_pretty_indent_four() {
        let value = json!({ "a": 1 });
        let out = render(&Interpreted::Json(value), Some(Indent::new(4).unwrap())).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\n    \"a\": 1\n}");

        let nested = json!({ "a": { "b": [1] } });
        let out = to_pretty(&nested, Indent::new(4).unwrap()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\n    \"a\": {\n        \"b\": [\n            1\n        ]\n    }\n}"
        );
    }

    #[test]
    fn test_raw_json_pretty_printed_when_indented() {
        let raw = Interpreted::Raw(br#"{"a":1}"#.to_vec());
        let out = render(&raw, Some(Indent::new(2).unwrap())).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\n  \"a\": 1\n}");

        let text = Interpreted::Raw(b"plain".to_vec());
        assert_eq!(render(&text, Some(Indent::new(2).unwrap())).unwrap(), b"plain");
    }

    #[test]
    fn test_invalid_indent() {
        assert!(matches!(Indent::new(0), Err(Error::InvalidIndent(0))));
        assert!(matches!(Indent::new(-3), Err(Error::InvalidIndent(-3))));
        assert_eq!(Indent::new(1).unwrap().width(), 1);
    }

    #[test]
    fn test_indent_upper_bound() {
        assert_eq!(Indent::new(MAX_INDENT).unwrap().width(), 64);
        assert!(matches!(Indent::new(MAX_INDENT + 1), Err(Error::InvalidIndent(65))));
        assert!(matches!(Indent::new(i64::MAX), Err(Error::InvalidIndent(i64::MAX))));

        let out = to_pretty(&json!({ "a": 1 }), Indent::new(MAX_INDENT).unwrap()).unwrap();
        let expected = format!("{{\n{}\"a\": 1\n}}", " ".repeat(64));
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_http_body_earliest_boundary_wins() {
        // LF-only headers, body itself contains a CRLF blank line
        let mixed = b"HTTP/1.0 200 OK\nServer: pman\n\n\"a\r\n\r\nb\"";
        assert_eq!(http_body(mixed).unwrap(), b"\"a\r\n\r\nb\"");

        // CRLF headers, body contains bare LF blank line
        let crlf = b"HTTP/1.1 200 OK\r\n\r\n\"x\n\ny\"";
        assert_eq!(http_body(crlf).unwrap(), b"\"x\n\ny\"");
    }

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(ResponseMode::from_flags(false, false), ResponseMode::JsonWrapped);
        assert_eq!(ResponseMode::from_flags(true, false), ResponseMode::Raw);
        assert_eq!(ResponseMode::from_flags(false, true), ResponseMode::HttpBodyParsed);
    }
}
