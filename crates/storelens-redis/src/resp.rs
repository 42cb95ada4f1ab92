//! RESP2 wire codec
//!
//! Commands are always sent as arrays of bulk strings. Bulk payloads travel as
//! raw bytes; text is only produced on request and fails on invalid UTF-8.
//!
//! [`decode`] parses one whole frame from a buffer and leaves an incomplete
//! frame untouched. [`ReplyDecoder`] is for streams: it consumes elements as
//! they arrive and resumes where it stopped.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use storelens_common::{Error, Result};

/// One command with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    name: String,
    args: Vec<Bytes>,
}

impl Cmd {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: vec![Bytes::copy_from_slice(name.as_bytes())],
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(Bytes::from(arg.to_string()));
        self
    }

    /// Appends an argument exactly as given, without any text conversion
    #[must_use]
    pub fn arg_bytes(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.args.extend(args.into_iter().map(|a| Bytes::from(a.to_string())));
        self
    }

    /// Command name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name and arguments as sent on the wire
    #[must_use]
    pub fn as_args(&self) -> &[Bytes] {
        &self.args
    }

    /// Appends the RESP array encoding of this command to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(format!("*{}\r\n", self.args.len()).as_bytes());
        for arg in &self.args {
            buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
            buf.put_slice(arg);
            buf.put_slice(b"\r\n");
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// A decoded server reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Reply>>),
}

fn utf8(bytes: Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::decode("value", e))
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn bulk(s: impl Into<String>) -> Self {
        Reply::Bulk(Some(Bytes::from(s.into())))
    }

    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// Array of bulk strings
    pub fn strings<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Reply::Array(Some(items.into_iter().map(|s| Reply::bulk(s)).collect()))
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }

    /// Turns an error reply into [`Error::Backend`]
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Error(msg) => Err(Error::Backend(msg)),
            other => Ok(other),
        }
    }

    /// Raw payload of a bulk reply; `None` for nil
    pub fn into_bytes(self) -> Result<Option<Bytes>> {
        match self.into_result()? {
            Reply::Bulk(bytes) => Ok(bytes),
            Reply::Status(s) => Ok(Some(Bytes::from(s))),
            other => Err(Error::Protocol(format!("expected bulk reply, got {:?}", other))),
        }
    }

    /// Text of a status or bulk reply; `None` for nil.
    ///
    /// A bulk payload that is not UTF-8 is a [`Error::DecodeFailure`].
    pub fn into_string(self) -> Result<Option<String>> {
        match self.into_result()? {
            Reply::Status(s) => Ok(Some(s)),
            Reply::Bulk(Some(bytes)) => utf8(bytes).map(Some),
            Reply::Bulk(None) => Ok(None),
            Reply::Integer(i) => Ok(Some(i.to_string())),
            other => Err(Error::Protocol(format!("expected string reply, got {:?}", other))),
        }
    }

    pub fn into_integer(self) -> Result<i64> {
        match self.into_result()? {
            Reply::Integer(i) => Ok(i),
            other => Err(Error::Protocol(format!("expected integer reply, got {:?}", other))),
        }
    }

    /// Elements of an array of bulk strings; nil reads as empty
    pub fn into_strings(self) -> Result<Vec<String>> {
        match self.into_result()? {
            Reply::Array(None) => Ok(Vec::new()),
            Reply::Array(Some(items)) => items
                .into_iter()
                .map(|item| {
                    item.into_string()?
                        .ok_or_else(|| Error::Protocol("nil element in array reply".to_string()))
                })
                .collect(),
            other => Err(Error::Protocol(format!("expected array reply, got {:?}", other))),
        }
    }

    /// Serializes this reply as the server would send it
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => buf.put_slice(format!("+{}\r\n", s).as_bytes()),
            Reply::Error(e) => buf.put_slice(format!("-{}\r\n", e).as_bytes()),
            Reply::Integer(i) => buf.put_slice(format!(":{}\r\n", i).as_bytes()),
            Reply::Bulk(None) => buf.put_slice(b"$-1\r\n"),
            Reply::Bulk(Some(bytes)) => {
                buf.put_slice(format!("${}\r\n", bytes.len()).as_bytes());
                buf.put_slice(bytes);
                buf.put_slice(b"\r\n");
            }
            Reply::Array(None) => buf.put_slice(b"*-1\r\n"),
            Reply::Array(Some(items)) => {
                buf.put_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes one reply from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a whole frame.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Reply>> {
    match parse_frame(buf, 0)? {
        Some((reply, consumed)) => {
            buf.advance(consumed);
            Ok(Some(reply))
        }
        None => Ok(None),
    }
}

/// Decodes one command (array of bulk strings) from the front of `buf`
pub fn decode_command(buf: &mut BytesMut) -> Result<Option<Vec<String>>> {
    match decode(buf)? {
        Some(frame @ Reply::Array(_)) => frame.into_strings().map(Some),
        Some(other) => Err(Error::Protocol(format!("expected command array, got {:?}", other))),
        None => Ok(None),
    }
}

/// Incremental reply decoder for a byte stream.
///
/// Each complete element is consumed from the buffer as soon as it arrives,
/// with the arrays it belongs to kept open, so every byte is parsed once no
/// matter how many reads a large reply takes.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    /// Open arrays: elements still expected, elements read so far
    open: Vec<(usize, Vec<Reply>)>,
}

impl ReplyDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes what it can from `buf`; `Ok(None)` means read more and call again
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Reply>> {
        'elements: loop {
            let Some((element, consumed)) = parse_element(buf, 0)? else {
                return Ok(None);
            };
            buf.advance(consumed);

            let mut reply = match element {
                Element::Value(reply) => reply,
                Element::ArrayHeader(0) => Reply::Array(Some(Vec::new())),
                Element::ArrayHeader(len) => {
                    self.open.push((len, Vec::with_capacity(len.min(1024))));
                    continue;
                }
            };

            while let Some((remaining, mut items)) = self.open.pop() {
                items.push(reply);
                if remaining > 1 {
                    self.open.push((remaining - 1, items));
                    continue 'elements;
                }
                reply = Reply::Array(Some(items));
            }
            return Ok(Some(reply));
        }
    }
}

/// A scalar reply, or the header of an array whose elements follow
enum Element {
    Value(Reply),
    ArrayHeader(usize),
}

fn read_line(src: &[u8], start: usize) -> Option<(&[u8], usize)> {
    if start > src.len() {
        return None;
    }
    src[start..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| (&src[start..start + i], start + i + 2))
}

fn parse_length(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("invalid length '{}'", String::from_utf8_lossy(line))))
}

fn parse_text(line: &[u8]) -> Result<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|e| Error::Protocol(format!("reply line is not UTF-8: {}", e)))
}

fn parse_element(src: &[u8], start: usize) -> Result<Option<(Element, usize)>> {
    if start >= src.len() {
        return Ok(None);
    }
    let Some((line, next)) = read_line(src, start + 1) else {
        return Ok(None);
    };

    let value = match src[start] {
        b'+' => Reply::Status(parse_text(line)?),
        b'-' => Reply::Error(parse_text(line)?),
        b':' => Reply::Integer(parse_length(line)?),
        b'$' => {
            let Ok(len) = usize::try_from(parse_length(line)?) else {
                return Ok(Some((Element::Value(Reply::Bulk(None)), next)));
            };
            let end = next + len;
            if src.len() < end + 2 {
                return Ok(None);
            }
            if &src[end..end + 2] != b"\r\n" {
                return Err(Error::Protocol("bulk string not terminated by CRLF".to_string()));
            }
            let payload = Bytes::copy_from_slice(&src[next..end]);
            return Ok(Some((Element::Value(Reply::Bulk(Some(payload))), end + 2)));
        }
        b'*' => {
            return Ok(Some(match usize::try_from(parse_length(line)?) {
                Ok(len) => (Element::ArrayHeader(len), next),
                Err(_) => (Element::Value(Reply::Array(None)), next),
            }));
        }
        other => return Err(Error::Protocol(format!("unexpected reply type byte 0x{:02x}", other))),
    };
    Ok(Some((Element::Value(value), next)))
}

fn parse_frame(src: &[u8], start: usize) -> Result<Option<(Reply, usize)>> {
    match parse_element(src, start)? {
        None => Ok(None),
        Some((Element::Value(reply), next)) => Ok(Some((reply, next))),
        Some((Element::ArrayHeader(len), next)) => {
            let mut items = Vec::with_capacity(len.min(1024));
            let mut pos = next;
            for _ in 0..len {
                match parse_frame(src, pos)? {
                    Some((item, after)) => {
                        items.push(item);
                        pos = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(Some(items)), pos)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command() {
        let mut buf = BytesMut::new();
        Cmd::new("HSET").arg("user:1").arg("name").arg("").encode(&mut buf);
        assert_eq!(&buf[..], b"*4\r\n$4\r\nHSET\r\n$6\r\nuser:1\r\n$4\r\nname\r\n$0\r\n\r\n");
    }

    #[test]
    fn test_decode_nested_array() {
        let mut buf = BytesMut::from(&b"*3\r\n$5\r\nalice\r\n:42\r\n*-1\r\n+OK\r\n"[..]);
        let reply = decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![Reply::bulk("alice"), Reply::Integer(42), Reply::Array(None)]))
        );
        // the trailing status stays buffered
        assert_eq!(decode(&mut buf).unwrap().unwrap(), Reply::ok());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_is_not_consumed() {
        let full = b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        for cut in 0..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            assert!(decode(&mut buf).unwrap().is_none(), "cut at {}", cut);
            assert_eq!(buf.len(), cut);
        }
        let mut buf = BytesMut::from(&full[..]);
        assert_eq!(decode(&mut buf).unwrap().unwrap(), Reply::strings(["foo", "bar"]));
    }

    #[test]
    fn test_nil_bulk_and_error() {
        let mut buf = BytesMut::from(&b"$-1\r\n-WRONGTYPE Operation against a key\r\n"[..]);
        assert!(decode(&mut buf).unwrap().unwrap().is_nil());

        let err = decode(&mut buf).unwrap().unwrap().into_result().unwrap_err();
        assert!(matches!(err, Error::Backend(ref m) if m.starts_with("WRONGTYPE")));
    }

    #[test]
    fn test_invalid_type_byte() {
        let mut buf = BytesMut::from(&b"?what\r\n"[..]);
        assert!(matches!(decode(&mut buf), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_reply_encoding_decodes_back() {
        let reply = Reply::Array(Some(vec![
            Reply::Status("PONG".into()),
            Reply::Integer(-3),
            Reply::nil(),
            Reply::strings(["a", "b"]),
        ]));
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        assert_eq!(decode(&mut buf).unwrap().unwrap(), reply);
    }

    #[test]
    fn test_stream_decoder_resumes_across_reads() {
        let mut wire = BytesMut::new();
        let reply = Reply::Array(Some(vec![
            Reply::strings(["alpha", "beta"]),
            Reply::Array(Some(Vec::new())),
            Reply::Integer(7),
            Reply::nil(),
        ]));
        reply.encode(&mut wire);
        Reply::ok().encode(&mut wire);

        let mut decoder = ReplyDecoder::new();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for byte in wire.iter() {
            buf.put_u8(*byte);
            while let Some(r) = decoder.decode(&mut buf).unwrap() {
                decoded.push(r);
            }
        }
        assert_eq!(decoded, vec![reply, Reply::ok()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_stream_decoder_consumes_finished_elements() {
        let keys: Vec<String> = (0..10_000).map(|i| format!("key:{}", i)).collect();
        let mut wire = BytesMut::new();
        Reply::strings(keys.clone()).encode(&mut wire);

        let mut decoder = ReplyDecoder::new();
        let mut buf = BytesMut::new();
        let mut reply = None;
        for chunk in wire.chunks(512) {
            buf.put_slice(chunk);
            reply = decoder.decode(&mut buf).unwrap();
            // only a partial element may stay buffered between reads
            assert!(buf.len() < 32, "{} bytes left unparsed", buf.len());
        }
        assert_eq!(reply.unwrap().into_strings().unwrap(), keys);
    }

    #[test]
    fn test_binary_bulk_kept_as_bytes() {
        let mut buf = BytesMut::from(&b"$2\r\n\xff\xfe\r\n$2\r\n\xff\xfe\r\n"[..]);
        let raw = decode(&mut buf).unwrap().unwrap().into_bytes().unwrap().unwrap();
        assert_eq!(&raw[..], &[0xff, 0xfe]);

        let err = decode(&mut buf).unwrap().unwrap().into_string().unwrap_err();
        assert!(matches!(err, Error::DecodeFailure { ref field, .. } if field == "value"));

        let mut out = BytesMut::new();
        Cmd::new("LREM").arg("l").arg(1).arg_bytes(raw).encode(&mut out);
        assert!(out.ends_with(b"$2\r\n\xff\xfe\r\n"));
    }

    #[test]
    fn test_decode_command() {
        let mut buf = BytesMut::new();
        Cmd::new("ZRANGE").args(["board", "0", "-1", "WITHSCORES"]).encode(&mut buf);
        let args = decode_command(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec!["ZRANGE", "board", "0", "-1", "WITHSCORES"]);
    }
}
