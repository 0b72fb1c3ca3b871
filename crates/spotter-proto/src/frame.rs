//! STOMP frame codec.
//!
//! A frame on the wire is:
//!
//! ```text
//! COMMAND EOL
//! *( header-name ":" header-value EOL )
//! EOL
//! *OCTET NUL
//! ```
//!
//! `EOL` is `LF` or `CR LF`. A payload made only of `EOL`s is a heart-beat.
//!
//! This is a pure data holder plus encode/decode. Interpreting the body (JSON
//! chat payloads) is left to [`crate::payloads`].

use bytes::{BufMut, Bytes};

use crate::{
    Command,
    errors::{ProtocolError, Result},
};

/// Header names used by the chat core.
pub mod header {
    /// Protocol versions the client accepts (CONNECT).
    pub const ACCEPT_VERSION: &str = "accept-version";
    /// Virtual host (CONNECT).
    pub const HOST: &str = "host";
    /// Heart-beat negotiation (CONNECT/CONNECTED).
    pub const HEART_BEAT: &str = "heart-beat";
    /// Bearer token header understood by the backend's channel interceptor.
    pub const AUTHORIZATION: &str = "Authorization";
    /// Negotiated protocol version (CONNECTED).
    pub const VERSION: &str = "version";
    /// Target or source destination.
    pub const DESTINATION: &str = "destination";
    /// Subscription id (SUBSCRIBE/UNSUBSCRIBE).
    pub const ID: &str = "id";
    /// Subscription a MESSAGE belongs to.
    pub const SUBSCRIPTION: &str = "subscription";
    /// Server-assigned message id (MESSAGE).
    pub const MESSAGE_ID: &str = "message-id";
    /// MIME type of the body.
    pub const CONTENT_TYPE: &str = "content-type";
    /// Body length in octets.
    pub const CONTENT_LENGTH: &str = "content-length";
    /// Short error description (ERROR).
    pub const MESSAGE: &str = "message";
    /// Receipt request on a client frame.
    pub const RECEIPT: &str = "receipt";
    /// Receipt correlation (RECEIPT).
    pub const RECEIPT_ID: &str = "receipt-id";
}

/// Protocol versions offered in CONNECT.
pub const ACCEPTED_VERSIONS: &str = "1.1";

/// Heart-beat negotiation offered in CONNECT (no heart-beats either way).
pub const NO_HEART_BEAT: &str = "0,0";

/// Result of decoding one transport payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame.
    Frame(Frame),
    /// Heart-beat (payload consisted only of end-of-line characters).
    Heartbeat,
}

/// A single STOMP frame.
///
/// # Invariants
///
/// - Header order is preserved. When a header name repeats, [`Frame::header`]
///   returns the first value, as STOMP requires.
/// - `body` holds raw octets. Without a `content-length` header the body must
///   not contain NUL, otherwise the decoder stops at the first NUL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Raw body bytes.
    pub body: Bytes,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: Bytes::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of the named header. `None` if absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text.
    pub fn body_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| ProtocolError::MalformedFrame(format!("body is not UTF-8: {e}")))
    }

    /// CONNECT frame carrying a bearer token.
    #[must_use]
    pub fn connect(host: &str, token: &str) -> Self {
        Self::new(Command::Connect)
            .with_header(header::ACCEPT_VERSION, ACCEPTED_VERSIONS)
            .with_header(header::HOST, host)
            .with_header(header::HEART_BEAT, NO_HEART_BEAT)
            .with_header(header::AUTHORIZATION, bearer(token))
    }

    /// SUBSCRIBE frame. `authorization` is forwarded verbatim when present.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str, authorization: Option<&str>) -> Self {
        let frame = Self::new(Command::Subscribe)
            .with_header(header::ID, id)
            .with_header(header::DESTINATION, destination);
        match authorization {
            Some(auth) => frame.with_header(header::AUTHORIZATION, auth),
            None => frame,
        }
    }

    /// UNSUBSCRIBE frame.
    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header(header::ID, id)
    }

    /// SEND frame with a JSON body and explicit `content-length`.
    #[must_use]
    pub fn send_json(destination: &str, token: &str, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::new(Command::Send)
            .with_header(header::DESTINATION, destination)
            .with_header(header::AUTHORIZATION, bearer(token))
            .with_header(header::CONTENT_TYPE, "application/json")
            .with_header(header::CONTENT_LENGTH, body.len().to_string())
            .with_body(body)
    }

    /// DISCONNECT frame.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Encode the frame into `dst`.
    ///
    /// Header names and values are escaped unless the command is exempt
    /// (see [`Command::escapes_headers`]). No headers are added implicitly.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let escape = self.command.escapes_headers();

        dst.put_slice(self.command.as_str().as_bytes());
        dst.put_u8(b'\n');
        for (name, value) in &self.headers {
            put_header_text(dst, name, escape);
            dst.put_u8(b':');
            put_header_text(dst, value, escape);
            dst.put_u8(b'\n');
        }
        dst.put_u8(b'\n');
        dst.put_slice(&self.body);
        dst.put_u8(0);
    }

    /// Encode into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.body.len());
        self.encode(&mut buf);
        buf
    }

    /// Decode exactly one frame (or a heart-beat) from a transport payload.
    ///
    /// Anything other than end-of-line characters after the terminating NUL
    /// is rejected; use [`Frame::decode_all`] when a payload may carry
    /// several frames.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownCommand` for an unrecognised command line
    /// - `ProtocolError::InvalidEscape` for undefined header escapes
    /// - `ProtocolError::InvalidContentLength` when the length is not a
    ///   number or larger than the remaining bytes
    /// - `ProtocolError::MalformedFrame` for every other structural problem
    pub fn decode(bytes: &[u8]) -> Result<Decoded> {
        let Some((frame, consumed)) = decode_one(bytes)? else {
            return Ok(Decoded::Heartbeat);
        };

        let rest = bytes.get(consumed..).unwrap_or_default();
        if !rest.iter().all(|b| is_eol(*b)) {
            return Err(ProtocolError::MalformedFrame(format!(
                "{} trailing bytes after frame",
                rest.len()
            )));
        }

        Ok(Decoded::Frame(frame))
    }

    /// Decode every frame in a transport payload, skipping heart-beats.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<Self>> {
        let mut frames = Vec::new();
        let mut offset = 0;
        while let Some((frame, consumed)) = decode_one(bytes.get(offset..).unwrap_or_default())? {
            frames.push(frame);
            offset += consumed;
        }
        Ok(frames)
    }
}

/// `Bearer <token>` header value.
#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Decode one frame from the front of `bytes`.
///
/// Returns `None` when only heart-beats remain, otherwise the frame and the
/// number of bytes consumed (including the terminating NUL when present).
fn decode_one(bytes: &[u8]) -> Result<Option<(Frame, usize)>> {
    let start = bytes.iter().position(|b| !is_eol(*b)).unwrap_or(bytes.len());
    if start == bytes.len() {
        return Ok(None);
    }

    let mut cursor = start;
    let command_line = next_line(bytes, &mut cursor)
        .ok_or_else(|| ProtocolError::MalformedFrame("missing command line".to_string()))?;
    let command: Command = utf8(command_line)?.parse()?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = next_line(bytes, &mut cursor)
            .ok_or_else(|| ProtocolError::MalformedFrame("unterminated headers".to_string()))?;
        if line.is_empty() {
            break;
        }
        let line = utf8(line)?;
        let (name, value) = line.split_once(':').ok_or_else(|| {
            ProtocolError::MalformedFrame(format!("header line without colon: {line:?}"))
        })?;
        if escape {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let rest = bytes.get(cursor..).unwrap_or_default();
    let content_length = headers
        .iter()
        .find(|(n, _)| n == header::CONTENT_LENGTH)
        .map(|(_, v)| {
            v.trim().parse::<usize>().map_err(|_| ProtocolError::InvalidContentLength(v.clone()))
        })
        .transpose()?;

    let (body, consumed) = match content_length {
        Some(len) => {
            let body = rest.get(..len).ok_or_else(|| {
                ProtocolError::InvalidContentLength(format!("{len} exceeds {} body bytes", rest.len()))
            })?;
            match rest.get(len) {
                Some(0) => (body, len + 1),
                // Missing NUL at the end of the payload is tolerated
                None => (body, len),
                Some(_) => {
                    return Err(ProtocolError::MalformedFrame(
                        "body not terminated by NUL after content-length octets".to_string(),
                    ));
                },
            }
        },
        None => match rest.iter().position(|b| *b == 0) {
            Some(nul) => (rest.get(..nul).unwrap_or_default(), nul + 1),
            None => (rest, rest.len()),
        },
    };

    let frame = Frame { command, headers, body: Bytes::copy_from_slice(body) };
    Ok(Some((frame, cursor + consumed)))
}

/// Next line starting at `cursor`, without its EOL. Advances past the EOL.
fn next_line<'a>(bytes: &'a [u8], cursor: &mut usize) -> Option<&'a [u8]> {
    let rest = bytes.get(*cursor..)?;
    let newline = rest.iter().position(|b| *b == b'\n')?;
    *cursor += newline + 1;
    let line = rest.get(..newline)?;
    Some(line.strip_suffix(b"\r").unwrap_or(line))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| ProtocolError::MalformedFrame(format!("header text is not UTF-8: {e}")))
}

fn is_eol(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

fn put_header_text(dst: &mut impl BufMut, text: &str, escape: bool) {
    if !escape {
        dst.put_slice(text.as_bytes());
        return;
    }
    for c in text.chars() {
        match c {
            '\\' => dst.put_slice(b"\\\\"),
            '\n' => dst.put_slice(b"\\n"),
            '\r' => dst.put_slice(b"\\r"),
            ':' => dst.put_slice(b"\\c"),
            c => {
                let mut buf = [0u8; 4];
                dst.put_slice(c.encode_utf8(&mut buf).as_bytes());
            },
        }
    }
}

fn unescape(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => return Err(ProtocolError::InvalidEscape(other)),
            None => {
                return Err(ProtocolError::MalformedFrame("dangling backslash in header".to_string()));
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_frame(bytes: &[u8]) -> Frame {
        match Frame::decode(bytes) {
            Ok(Decoded::Frame(frame)) => frame,
            other => unreachable!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn encode_connect_is_not_escaped() {
        let frame = Frame::connect("chat.example", "abc:def");
        let wire = String::from_utf8(frame.to_bytes()).unwrap();

        assert_eq!(
            wire,
            "CONNECT\naccept-version:1.1\nhost:chat.example\nheart-beat:0,0\nAuthorization:Bearer abc:def\n\n\0"
        );
    }

    #[test]
    fn encode_escapes_header_values() {
        let frame = Frame::new(Command::Send).with_header("note", "a:b\nc\\d");
        let wire = String::from_utf8(frame.to_bytes()).unwrap();

        assert_eq!(wire, "SEND\nnote:a\\cb\\nc\\\\d\n\n\0");
    }

    #[test]
    fn decode_message_frame() {
        let wire = b"MESSAGE\ndestination:/topic/chat-room/42\nsubscription:room-42\nmessage-id:7\n\n{\"id\":\"m1\"}\0";
        let frame = decode_frame(wire);

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header(header::SUBSCRIPTION), Some("room-42"));
        assert_eq!(frame.body_str().unwrap(), "{\"id\":\"m1\"}");
    }

    #[test]
    fn decode_accepts_crlf_and_missing_nul() {
        let frame = decode_frame(b"CONNECTED\r\nversion:1.1\r\n\r\n");

        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header(header::VERSION), Some("1.1"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn first_repeated_header_wins() {
        let frame = decode_frame(b"MESSAGE\nfoo:first\nfoo:second\n\n\0");
        assert_eq!(frame.header("foo"), Some("first"));
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let frame = decode_frame(b"MESSAGE\ncontent-length:3\n\na\0b\0");
        assert_eq!(&frame.body[..], b"a\0b");
    }

    #[test]
    fn content_length_larger_than_body_is_rejected() {
        let result = Frame::decode(b"MESSAGE\ncontent-length:10\n\nabc\0");
        assert!(matches!(result, Err(ProtocolError::InvalidContentLength(_))));
    }

    #[test]
    fn heartbeat_is_not_a_frame() {
        assert_eq!(Frame::decode(b"\n"), Ok(Decoded::Heartbeat));
        assert_eq!(Frame::decode(b"\r\n\n"), Ok(Decoded::Heartbeat));
        assert_eq!(Frame::decode(b""), Ok(Decoded::Heartbeat));
    }

    #[test]
    fn undefined_escape_is_rejected() {
        let result = Frame::decode(b"MESSAGE\nfoo:a\\tb\n\n\0");
        assert_eq!(result, Err(ProtocolError::InvalidEscape('t')));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let result = Frame::decode(b"MESSAGE\nbroken\n\n\0");
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let result = Frame::decode(b"HELLO\n\n\0");
        assert!(matches!(result, Err(ProtocolError::UnknownCommand(_))));
    }

    #[test]
    fn trailing_garbage_is_rejected_by_single_decode() {
        let result = Frame::decode(b"RECEIPT\nreceipt-id:1\n\n\0junk");
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn decode_all_splits_batched_frames() {
        let wire = b"\nRECEIPT\nreceipt-id:1\n\n\0\nRECEIPT\nreceipt-id:2\n\n\0\n";
        let frames = Frame::decode_all(wire).unwrap();

        let ids: Vec<_> = frames.iter().filter_map(|f| f.header(header::RECEIPT_ID)).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn send_json_sets_content_length() {
        let frame = Frame::send_json("/app/chat-room/1", "tok", r#"{"a":1}"#);

        assert_eq!(frame.header(header::CONTENT_LENGTH), Some("7"));
        assert_eq!(frame.header(header::AUTHORIZATION), Some("Bearer tok"));
    }
}
