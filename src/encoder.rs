use crate::resp::Type;

const CRLF: &[u8] = b"\r\n";

pub struct Encoder;

impl Encoder {
    pub fn encode(frame: &Type) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        write(frame, &mut buf);
        buf
    }
}

fn write(frame: &Type, buf: &mut Vec<u8>) {
    match frame {
        Type::SimpleString(s) => line(buf, b'+', s.as_bytes()),
        Type::SimpleError(msg) => line(buf, b'-', msg.as_bytes()),
        Type::Integer(i) => line(buf, b':', i.to_string().as_bytes()),
        Type::Double(d) => line(buf, b',', format_double(*d).as_bytes()),
        Type::Null => line(buf, b'$', b"-1"),
        Type::BulkString(data) => {
            line(buf, b'$', data.len().to_string().as_bytes());
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
        }
        Type::Array(items) => {
            line(buf, b'*', items.len().to_string().as_bytes());
            for item in items {
                write(item, buf);
            }
        }
    }
}

fn line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

/// Text form of a score as Redis accepts it in `ZADD`.
pub fn format_double(value: f64) -> String {
    match value {
        v if v == f64::INFINITY => "inf".into(),
        v if v == f64::NEG_INFINITY => "-inf".into(),
        v => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp;

    #[test]
    fn encode_command() {
        let frame = Type::command(["RPUSH", "fila", "a", "b"]);
        assert_eq!(
            Encoder::encode(&frame),
            b"*4\r\n$5\r\nRPUSH\r\n$4\r\nfila\r\n$1\r\na\r\n$1\r\nb\r\n".to_vec()
        );
    }

    #[test]
    fn encode_replies() {
        assert_eq!(Encoder::encode(&Type::Integer(-1)), b":-1\r\n".to_vec());
        assert_eq!(Encoder::encode(&Type::Null), b"$-1\r\n".to_vec());
        assert_eq!(Encoder::encode(&Type::SimpleError("ERR x".into())), b"-ERR x\r\n".to_vec());
    }

    #[test]
    fn decodes_what_it_encodes() {
        let frame = Type::Array(vec![Type::BulkString("0".into()), Type::Array(vec![]), Type::Null]);
        let data = Encoder::encode(&frame);
        assert_eq!(resp::decode(&data).unwrap(), Some((frame, data.len())));
    }

    #[test]
    fn scores() {
        assert_eq!(format_double(1.0), "1");
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(f64::INFINITY), "inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    }
}
