use std::str::from_utf8;

use crate::errors::{ErrorKind, RedisError, RedisResult};
use crate::types::{from_redis_value, InfoDict, Value};

/// One contiguous range of slots served by a node, as reported by
/// `CLUSTER SLOTS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    /// First slot of the range, inclusive.
    pub start: u16,
    /// Last slot of the range, inclusive.
    pub end: u16,
    /// The master endpoint serving the range, as `host:port`.
    pub endpoint: String,
}

/// A reply after its post-processor ran.
///
/// Most commands answer with a raw [`Value`]; commands registered with a
/// dedicated parser answer with the matching domain shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The untouched protocol value.
    Value(Value),
    /// An integer reply, possibly parsed out of a string.
    Int(i64),
    /// A boolean derived from an integer reply.
    Bool(bool),
    /// A flat key/value reply folded into ordered pairs.
    Pairs(Vec<(String, Value)>),
    /// The slot table from `CLUSTER SLOTS`.
    Slots(Vec<SlotRange>),
    /// A parsed `INFO` payload.
    Info(InfoDict),
}

impl Reply {
    /// Returns the raw value if no post-processor was applied.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Reply::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Identifies the post-processor recorded on a command description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyParser {
    /// Hand the protocol value through untouched.
    #[default]
    Identity,
    /// Coerce the reply to an integer.
    Integer,
    /// Interpret an integer reply as a boolean.
    Boolean,
    /// Fold a flat `[k1, v1, k2, v2, ...]` reply into pairs.
    Pairs,
    /// Parse a `CLUSTER SLOTS` reply into slot ranges.
    ClusterSlots,
    /// Parse an `INFO` payload into sections.
    Info,
}

impl ReplyParser {
    /// Applies the post-processor to a raw value.  Parsers are pure: they
    /// never issue requests and reject replies of the wrong shape with a
    /// type error.
    pub fn apply(self, value: Value) -> RedisResult<Reply> {
        match self {
            ReplyParser::Identity => Ok(Reply::Value(value)),
            ReplyParser::Integer => Ok(Reply::Int(from_redis_value(&value)?)),
            ReplyParser::Boolean => Ok(Reply::Bool(from_redis_value(&value)?)),
            ReplyParser::Pairs => Ok(Reply::Pairs(parse_pairs(&value)?)),
            ReplyParser::ClusterSlots => Ok(Reply::Slots(parse_cluster_slots(&value)?)),
            ReplyParser::Info => Ok(Reply::Info(from_redis_value(&value)?)),
        }
    }
}

fn parse_pairs(value: &Value) -> RedisResult<Vec<(String, Value)>> {
    let items = match value.as_sequence() {
        Some(items) if items.len() % 2 == 0 => items,
        _ => fail!((
            ErrorKind::TypeError,
            "Response was not a flat key/value array"
        )),
    };
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        pairs.push((from_redis_value(k)?, v.clone()));
    }
    Ok(pairs)
}

/// Walks a `CLUSTER SLOTS` reply.  Entries are `[start, end, master,
/// replica...]` where each node is `[ip, port, ...]`; malformed entries
/// are skipped, the master decides the endpoint.
pub fn parse_cluster_slots(value: &Value) -> RedisResult<Vec<SlotRange>> {
    let items = match value.as_sequence() {
        Some(items) => items,
        None => fail!((ErrorKind::TypeError, "Response was not a slot table")),
    };

    let mut result = Vec::with_capacity(items.len());
    for item in items {
        let item = match item.as_sequence() {
            Some(fields) if fields.len() >= 3 => fields,
            _ => continue,
        };

        let start = match item[0] {
            Value::Int(start) => start as u16,
            _ => continue,
        };
        let end = match item[1] {
            Value::Int(end) => end as u16,
            _ => continue,
        };

        let node = match item[2].as_sequence() {
            Some(node) if node.len() >= 2 => node,
            _ => continue,
        };
        let ip = match node[0] {
            Value::BulkString(ref ip) => match from_utf8(ip) {
                Ok(ip) if !ip.is_empty() => ip,
                _ => continue,
            },
            _ => continue,
        };
        let port = match node[1] {
            Value::Int(port) => port as u16,
            _ => continue,
        };

        result.push(SlotRange {
            start,
            end,
            endpoint: format!("{ip}:{port}"),
        });
    }

    if result.is_empty() {
        return Err(RedisError::from((
            ErrorKind::TypeError,
            "Slot table reply contained no usable ranges",
        )));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn slots_reply() -> Value {
        Value::Array(vec![
            Value::Array(vec![
                Value::Int(0),
                Value::Int(8191),
                Value::Array(vec![bulk("10.0.0.1"), Value::Int(6379)]),
                Value::Array(vec![bulk("10.0.0.4"), Value::Int(6379)]),
            ]),
            Value::Array(vec![
                Value::Int(8192),
                Value::Int(16383),
                Value::Array(vec![bulk("10.0.0.2"), Value::Int(6380)]),
            ]),
        ])
    }

    #[test]
    fn cluster_slots_takes_masters() {
        let ranges = parse_cluster_slots(&slots_reply()).unwrap();
        assert_eq!(
            ranges,
            vec![
                SlotRange {
                    start: 0,
                    end: 8191,
                    endpoint: "10.0.0.1:6379".into()
                },
                SlotRange {
                    start: 8192,
                    end: 16383,
                    endpoint: "10.0.0.2:6380".into()
                },
            ]
        );
    }

    #[test]
    fn cluster_slots_skips_malformed_entries() {
        let reply = Value::Array(vec![
            Value::Array(vec![Value::Int(0), Value::Int(99)]),
            Value::Array(vec![
                Value::Int(100),
                Value::Int(16383),
                Value::Array(vec![bulk("10.0.0.9"), Value::Int(7000)]),
            ]),
        ]);
        let ranges = parse_cluster_slots(&reply).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].endpoint, "10.0.0.9:7000");
    }

    #[test]
    fn integer_parser_coerces_strings() {
        assert_eq!(
            ReplyParser::Integer.apply(bulk("42")).unwrap(),
            Reply::Int(42)
        );
        assert_eq!(
            ReplyParser::Integer.apply(Value::Int(7)).unwrap(),
            Reply::Int(7)
        );
        assert!(ReplyParser::Integer.apply(bulk("nope")).is_err());
    }

    #[test]
    fn boolean_parser_reads_integers() {
        assert_eq!(
            ReplyParser::Boolean.apply(Value::Int(1)).unwrap(),
            Reply::Bool(true)
        );
        assert_eq!(
            ReplyParser::Boolean.apply(Value::Int(0)).unwrap(),
            Reply::Bool(false)
        );
    }

    #[test]
    fn pairs_parser_keeps_order() {
        let reply = Value::Array(vec![bulk("b"), Value::Int(2), bulk("a"), Value::Int(1)]);
        assert_eq!(
            ReplyParser::Pairs.apply(reply).unwrap(),
            Reply::Pairs(vec![
                ("b".to_string(), Value::Int(2)),
                ("a".to_string(), Value::Int(1)),
            ])
        );
    }

    #[test]
    fn pairs_parser_rejects_odd_arity() {
        let reply = Value::Array(vec![bulk("a")]);
        assert!(ReplyParser::Pairs.apply(reply).is_err());
    }

    #[test]
    fn info_parser_sections() {
        let payload = "# Server\r\nredis_version:3.0.7\r\n";
        let reply = bulk(payload);
        match ReplyParser::Info.apply(reply).unwrap() {
            Reply::Info(info) => {
                assert_eq!(info.get::<String>("redis_version").unwrap(), "3.0.7")
            }
            other => panic!("expected info reply, got {other:?}"),
        }
    }
}
