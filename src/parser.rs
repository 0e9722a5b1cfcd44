use std::{str, vec};
use crate::error::Error;
use crate::resp::{self, Type};

/// Walks the elements of an array reply, converting each to the type the
/// caller expects.
#[derive(Debug)]
pub(crate) struct Parse {
    parts: vec::IntoIter<Type>,
}

fn unexpected(expected: &str, got: &Type) -> Error {
    Error::Protocol(format!("expected {}, got {:?}", expected, got))
}

impl Parse {
    pub(crate) fn new(reply: Type) -> crate::Result<Parse> {
        match reply {
            Type::Array(items) => Ok(Parse { parts: items.into_iter() }),
            // a nil multi-bulk is an empty collection
            Type::Null => Ok(Parse { parts: Vec::new().into_iter() }),
            other => Err(unexpected("array", &other)),
        }
    }

    fn next(&mut self) -> crate::Result<Type> {
        self.parts
            .next()
            .ok_or_else(|| Error::Protocol("reply ended before all elements were read".into()))
    }

    pub(crate) fn remaining(&self) -> usize {
        self.parts.len()
    }

    pub(crate) fn next_string(&mut self) -> crate::Result<String> {
        match self.next()? {
            Type::SimpleString(s) => Ok(s),
            Type::BulkString(data) => String::from_utf8(data.to_vec())
                .map_err(|_| Error::Protocol("value is not valid UTF-8".into())),
            other => Err(unexpected("string", &other)),
        }
    }

    /// An unsigned integer, sent either as an integer or as digits in a
    /// string (SCAN cursors are the latter).
    pub(crate) fn next_int(&mut self) -> crate::Result<u64> {
        let part = self.next()?;
        let n = match &part {
            Type::Integer(v) => u64::try_from(*v).ok(),
            Type::SimpleString(s) => atoi::atoi::<u64>(s.as_bytes()),
            Type::BulkString(data) => atoi::atoi::<u64>(data),
            _ => None,
        };
        n.ok_or_else(|| unexpected("unsigned integer", &part))
    }

    pub(crate) fn next_double(&mut self) -> crate::Result<f64> {
        match self.next()? {
            Type::Double(d) => Ok(d),
            Type::Integer(v) => Ok(v as f64),
            Type::SimpleString(s) => Ok(resp::parse_double(&s)?),
            Type::BulkString(data) => {
                let s = str::from_utf8(&data).map_err(|_| Error::Protocol("score is not valid UTF-8".into()))?;
                Ok(resp::parse_double(s)?)
            }
            other => Err(unexpected("score", &other)),
        }
    }

    pub(crate) fn next_array(&mut self) -> crate::Result<Parse> {
        Parse::new(self.next()?)
    }

    pub(crate) fn finish(&mut self) -> crate::Result<()> {
        match self.parts.len() {
            0 => Ok(()),
            n => Err(Error::Protocol(format!("{} unexpected trailing elements in reply", n))),
        }
    }
}
