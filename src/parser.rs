use std::{
    io::{self, Read},
    str,
};

use crate::errors::{ErrorKind, RedisError, RedisResult, ServerError};
use crate::types::Value;

use combine::{
    any,
    error::StreamError,
    opaque,
    parser::{
        byte::{crlf, take_until_bytes},
        combinator::{any_send_sync_partial_state, AnySendSyncPartialState},
        range::{recognize, take},
    },
    stream::{PointerOffset, RangeStream, StreamErrorFor},
    Parser as _,
    ParseError,
};

const MAX_RECURSE_DEPTH: usize = 100;

fn value<'a, I>(
    count: Option<usize>,
) -> impl combine::Parser<I, Output = Value, PartialState = AnySendSyncPartialState>
where
    I: RangeStream<Token = u8, Range = &'a [u8]>,
    I::Error: combine::ParseError<u8, &'a [u8], I::Position>,
{
    let count = count.unwrap_or(1);

    opaque!(any_send_sync_partial_state(
        any()
            .then_partial(move |&mut b| {
                if b == b'*' && count > MAX_RECURSE_DEPTH {
                    combine::unexpected_any("Maximum recursion depth exceeded").left()
                } else {
                    combine::value(b).right()
                }
            })
            .then_partial(move |&mut b| {
                let line = || {
                    recognize(take_until_bytes(&b"\r\n"[..]).with(take(2).map(|_| ()))).and_then(
                        |line: &[u8]| {
                            str::from_utf8(&line[..line.len() - 2])
                                .map_err(StreamErrorFor::<I>::other)
                        },
                    )
                };

                let simple_string = || {
                    line().map(|line| {
                        if line == "OK" {
                            Value::Okay
                        } else {
                            Value::SimpleString(line.into())
                        }
                    })
                };

                let int = || {
                    line().and_then(|line| {
                        line.trim().parse::<i64>().map_err(|_| {
                            StreamErrorFor::<I>::message_static_message(
                                "Expected integer, got garbage",
                            )
                        })
                    })
                };

                let length = || {
                    int().and_then(|len| {
                        if len < -1 {
                            Err(StreamErrorFor::<I>::message_static_message(
                                "Invalid negative length",
                            ))
                        } else {
                            Ok(len)
                        }
                    })
                };

                let bulk_string = || {
                    length().then_partial(move |size| {
                        if *size < 0 {
                            combine::produce(|| Value::Nil).left()
                        } else {
                            take(*size as usize)
                                .map(|bs: &[u8]| Value::BulkString(bs.to_vec()))
                                .skip(crlf())
                                .right()
                        }
                    })
                };

                let array = || {
                    length().then_partial(move |&mut len| {
                        if len < 0 {
                            combine::produce(|| Value::Nil).left()
                        } else {
                            let len = len as usize;
                            combine::count_min_max(len, len, value(Some(count + 1)))
                                .map(Value::Array)
                                .right()
                        }
                    })
                };

                let error = || line().map(ServerError::from_payload);

                combine::dispatch!(b;
                    b'+' => simple_string(),
                    b':' => int().map(Value::Int),
                    b'$' => bulk_string(),
                    b'*' => array(),
                    b'-' => error().map(Value::ServerError),
                    b => combine::unexpected_any(combine::error::Token(b))
                )
            })
    ))
}

/// The internal redis response parser.
pub struct Parser {
    decoder: combine::stream::decoder::Decoder<AnySendSyncPartialState, PointerOffset<[u8]>>,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

/// The parser can be used to parse redis responses into values.  Generally
/// you normally do not use this directly as it's already done for you by
/// the client but in some more complex situations it might be useful to be
/// able to parse the redis responses.
impl Parser {
    /// Creates a new parser that parses the data behind the reader.  More
    /// than one value can be behind the reader in which case the parser can
    /// be invoked multiple times.  In other words: the stream does not have
    /// to be terminated.
    pub fn new() -> Parser {
        Parser {
            decoder: combine::stream::decoder::Decoder::new(),
        }
    }

    /// Parses synchronously into a single value from the reader.  The
    /// reader may hand out bytes in arbitrarily small fragments; decoding
    /// suspends and resumes without consuming partial replies.
    pub fn parse_value<T: Read>(&mut self, mut reader: T) -> RedisResult<Value> {
        let mut decoder = &mut self.decoder;
        let result = combine::decode!(decoder, reader, value(None), |input, _| {
            combine::stream::easy::Stream::from(input)
        });
        match result {
            Err(err) => Err(match err {
                combine::stream::decoder::Error::Io { error, .. } => error.into(),
                combine::stream::decoder::Error::Parse(err) => {
                    if err.is_unexpected_end_of_input() {
                        RedisError::from(io::Error::from(io::ErrorKind::UnexpectedEof))
                    } else {
                        let err = err
                            .map_range(|range| format!("{range:?}"))
                            .map_position(|pos| pos.translate_position(decoder.buffer()))
                            .to_string();
                        RedisError::from((ErrorKind::Parse, "parse error", err))
                    }
                }
            }),
            Ok(result) => Ok(result),
        }
    }
}

/// Parses bytes into a redis value.
///
/// This is the most straightforward way to parse something into a low
/// level redis value instead of having to use a whole parser.
pub fn parse_redis_value(bytes: &[u8]) -> RedisResult<Value> {
    let mut parser = Parser::new();
    parser.parse_value(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServerErrorKind;

    struct DribbleReader<'a> {
        chunks: std::vec::IntoIter<&'a [u8]>,
        current: &'a [u8],
    }

    impl<'a> DribbleReader<'a> {
        fn new(chunks: Vec<&'a [u8]>) -> Self {
            DribbleReader {
                chunks: chunks.into_iter(),
                current: &[],
            }
        }
    }

    impl Read for DribbleReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.current.is_empty() {
                match self.chunks.next() {
                    Some(chunk) => self.current = chunk,
                    None => return Ok(0),
                }
            }
            let n = buf.len().min(self.current.len());
            buf[..n].copy_from_slice(&self.current[..n]);
            self.current = &self.current[n..];
            Ok(n)
        }
    }

    #[test]
    fn parse_simple_values() {
        assert_eq!(parse_redis_value(b"+OK\r\n").unwrap(), Value::Okay);
        assert_eq!(
            parse_redis_value(b"+PONG\r\n").unwrap(),
            Value::SimpleString("PONG".into())
        );
        assert_eq!(parse_redis_value(b":42\r\n").unwrap(), Value::Int(42));
        assert_eq!(
            parse_redis_value(b"$3\r\nfoo\r\n").unwrap(),
            Value::BulkString(b"foo".to_vec())
        );
        assert_eq!(parse_redis_value(b"$-1\r\n").unwrap(), Value::Nil);
        assert_eq!(parse_redis_value(b"*-1\r\n").unwrap(), Value::Nil);
        assert_eq!(parse_redis_value(b"*0\r\n").unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn parse_error_is_in_band() {
        let val = parse_redis_value(b"-WRONGTYPE Operation against a key\r\n").unwrap();
        match val {
            Value::ServerError(err) => {
                assert_eq!(err.kind(), Some(ServerErrorKind::WrongType));
                assert_eq!(err.details(), Some("Operation against a key"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn parse_across_fragments() {
        let mut parser = Parser::new();
        let reader = DribbleReader::new(vec![b"*2\r\n$3\r\nfoo", b"\r\n$3\r\nbar\r\n"]);
        let val = parser.parse_value(reader).unwrap();
        assert_eq!(
            val,
            Value::Array(vec![
                Value::BulkString(b"foo".to_vec()),
                Value::BulkString(b"bar".to_vec())
            ])
        );
    }

    #[test]
    fn parse_byte_at_a_time() {
        let payload = b"*2\r\n:1\r\n$5\r\nhello\r\n";
        let chunks: Vec<&[u8]> = payload.chunks(1).collect();
        let mut parser = Parser::new();
        let val = parser.parse_value(DribbleReader::new(chunks)).unwrap();
        assert_eq!(
            val,
            Value::Array(vec![Value::Int(1), Value::BulkString(b"hello".to_vec())])
        );
    }

    #[test]
    fn multiple_replies_from_one_stream() {
        let mut parser = Parser::new();
        let data: &[u8] = b"+OK\r\n:7\r\n";
        let mut cursor = io::Cursor::new(data);
        assert_eq!(parser.parse_value(&mut cursor).unwrap(), Value::Okay);
        assert_eq!(parser.parse_value(&mut cursor).unwrap(), Value::Int(7));
    }

    #[test]
    fn unknown_type_prefix_is_fatal() {
        let err = parse_redis_value(b"!3\r\nfoo\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn bogus_negative_length_is_fatal() {
        assert!(parse_redis_value(b"$-2\r\nfoo\r\n").is_err());
        assert!(parse_redis_value(b"*-7\r\n").is_err());
    }

    #[test]
    fn numeric_garbage_is_fatal() {
        assert!(parse_redis_value(b":x\r\n").is_err());
        assert!(parse_redis_value(b"$abc\r\n").is_err());
    }

    #[test]
    fn nested_arrays() {
        let val = parse_redis_value(b"*2\r\n*2\r\n:1\r\n:2\r\n$1\r\nx\r\n").unwrap();
        assert_eq!(
            val,
            Value::Array(vec![
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
                Value::BulkString(b"x".to_vec())
            ])
        );
    }

    #[test]
    fn max_recursion_depth() {
        let mut bytes = Vec::new();
        for _ in 0..200 {
            bytes.extend_from_slice(b"*1\r\n");
        }
        bytes.extend_from_slice(b":1\r\n");
        match parse_redis_value(&bytes) {
            Ok(_) => panic!("expected error"),
            Err(e) => assert_eq!(e.kind(), ErrorKind::Parse),
        }
    }
}
