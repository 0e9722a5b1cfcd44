use std::fmt;
use bytes::Bytes;

/// A RESP value as exchanged with the store. Replies arrive in RESP2, plus
/// the RESP3 null and double some servers send.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    SimpleString(String),
    SimpleError(String),
    Integer(i64),
    BulkString(Bytes),
    Array(Vec<Type>),
    Null,
    Double(f64),
}

#[derive(Debug)]
pub enum Error {
    /// The buffer ends before the frame does.
    Incomplete,
    /// The bytes are not a RESP frame.
    Invalid(String),
}

impl Type {
    /// Build a command frame: an array of bulk strings.
    pub fn command<I, T>(parts: I) -> Type
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Type::Array(parts.into_iter().map(|p| Type::BulkString(p.into())).collect())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::SimpleString(s) | Type::SimpleError(s) => f.write_str(s),
            Type::Integer(i) => write!(f, "{}", i),
            Type::BulkString(b) => f.write_str(&String::from_utf8_lossy(b)),
            Type::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Type::Null => f.write_str("(nil)"),
            Type::Double(d) => write!(f, "{}", d),
        }
    }
}

impl PartialEq<&str> for Type {
    fn eq(&self, other: &&str) -> bool {
        match self {
            Type::SimpleString(s) => s.as_str() == *other,
            Type::BulkString(b) => b.as_ref() == other.as_bytes(),
            _ => false,
        }
    }
}

/// Decode the first frame in `buf`. Returns the frame and the number of bytes
/// it used, or `None` when `buf` does not yet hold a whole frame.
pub fn decode(buf: &[u8]) -> Result<Option<(Type, usize)>, Error> {
    let mut reader = Reader { buf, pos: 0 };
    match reader.frame() {
        Ok(frame) => Ok(Some((frame, reader.pos))),
        Err(Error::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Scores travel as text; Redis spells the infinities `inf` and `-inf`.
pub(crate) fn parse_double(s: &str) -> Result<f64, Error> {
    match s {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => s.parse::<f64>().map_err(|_| invalid(format!("invalid double `{}`", s))),
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::Invalid(msg.into())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn frame(&mut self) -> Result<Type, Error> {
        match self.byte()? {
            b'+' => Ok(Type::SimpleString(self.text()?)),
            b'-' => Ok(Type::SimpleError(self.text()?)),
            b':' => Ok(Type::Integer(self.number()?)),
            b',' => Ok(Type::Double(parse_double(&self.text()?)?)),
            b'_' => {
                self.line()?;
                Ok(Type::Null)
            }
            b'$' => match self.length()? {
                None => Ok(Type::Null),
                Some(len) => {
                    let data = self.take(len)?;
                    if self.take(2)? != b"\r\n" {
                        return Err(invalid("bulk string not terminated by CRLF"));
                    }
                    Ok(Type::BulkString(Bytes::copy_from_slice(data)))
                }
            },
            b'*' => match self.length()? {
                None => Ok(Type::Null),
                Some(len) => {
                    // the declared length is untrusted, cap the preallocation
                    let mut items = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        items.push(self.frame()?);
                    }
                    Ok(Type::Array(items))
                }
            },
            other => Err(invalid(format!("invalid frame type byte `{}`", other))),
        }
    }

    fn byte(&mut self) -> Result<u8, Error> {
        let b = *self.buf.get(self.pos).ok_or(Error::Incomplete)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let buf: &'a [u8] = self.buf;
        let end = self.pos.checked_add(n).ok_or_else(|| invalid("length overflow"))?;
        let data = buf.get(self.pos..end).ok_or(Error::Incomplete)?;
        self.pos = end;
        Ok(data)
    }

    /// Everything up to the next CRLF, which is consumed.
    fn line(&mut self) -> Result<&'a [u8], Error> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        let end = rest.windows(2).position(|w| w == b"\r\n").ok_or(Error::Incomplete)?;
        self.pos += end + 2;
        Ok(&rest[..end])
    }

    fn text(&mut self) -> Result<String, Error> {
        let line = self.line()?;
        String::from_utf8(line.to_vec()).map_err(|_| invalid("line is not valid UTF-8"))
    }

    fn number(&mut self) -> Result<i64, Error> {
        let line = self.line()?;
        atoi::atoi::<i64>(line).ok_or_else(|| invalid(format!("invalid number `{}`", String::from_utf8_lossy(line))))
    }

    /// A bulk or array length; `-1` is the RESP2 null.
    fn length(&mut self) -> Result<Option<usize>, Error> {
        match self.number()? {
            -1 => Ok(None),
            n => usize::try_from(n).map(Some).map_err(|_| invalid(format!("invalid length {}", n))),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Incomplete => f.write_str("stream ended early"),
            Error::Invalid(msg) => f.write_str(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whole(input: &[u8]) -> Type {
        let (frame, used) = decode(input).unwrap().unwrap();
        assert_eq!(used, input.len());
        frame
    }

    #[test]
    fn negative_integers() {
        assert_eq!(whole(b":-1\r\n"), Type::Integer(-1));
        assert_eq!(whole(b":-2\r\n"), Type::Integer(-2));
    }

    #[test]
    fn null_forms() {
        assert_eq!(whole(b"$-1\r\n"), Type::Null);
        assert_eq!(whole(b"*-1\r\n"), Type::Null);
        assert_eq!(whole(b"_\r\n"), Type::Null);
    }

    #[test]
    fn nested_scan_reply() {
        let input = b"*2\r\n$1\r\n0\r\n*2\r\n$9\r\ncliente:1\r\n$9\r\ncliente:2\r\n";
        assert_eq!(
            whole(input),
            Type::Array(vec![
                Type::BulkString("0".into()),
                Type::Array(vec![
                    Type::BulkString("cliente:1".into()),
                    Type::BulkString("cliente:2".into()),
                ]),
            ])
        );
    }

    #[test]
    fn bulk_string_may_hold_crlf() {
        assert_eq!(whole(b"$4\r\na\r\nb\r\n"), Type::BulkString("a\r\nb".into()));
    }

    #[test]
    fn leaves_following_frames_in_the_buffer() {
        let (frame, used) = decode(b"+OK\r\n:1\r\n").unwrap().unwrap();
        assert_eq!(frame, Type::SimpleString("OK".into()));
        assert_eq!(used, 5);
    }

    #[test]
    fn incomplete_frames() {
        assert!(decode(b"$5\r\nhel").unwrap().is_none());
        assert!(decode(b"*2\r\n:1\r\n").unwrap().is_none());
        assert!(decode(b"+PON").unwrap().is_none());
        assert!(decode(b"").unwrap().is_none());
    }

    #[test]
    fn invalid_frames() {
        assert!(matches!(decode(b"?oops\r\n"), Err(Error::Invalid(_))));
        assert!(matches!(decode(b"$-5\r\n"), Err(Error::Invalid(_))));
        assert!(matches!(decode(b"$1\r\nab\r\n"), Err(Error::Invalid(_))));
    }

    #[test]
    fn double_infinities() {
        assert_eq!(whole(b",inf\r\n"), Type::Double(f64::INFINITY));
        assert_eq!(parse_double("-inf").unwrap(), f64::NEG_INFINITY);
        assert_eq!(parse_double("1.5").unwrap(), 1.5);
        assert!(parse_double("abc").is_err());
    }

    #[test]
    fn compares_with_text() {
        assert!(Type::SimpleString("PONG".into()) == "PONG");
        assert!(Type::BulkString("OK".into()) == "OK");
        assert!(Type::Integer(1) != "1");
    }
}
