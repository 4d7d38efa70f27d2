use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::from_utf8;

use crate::errors::{ErrorKind, RedisError, RedisResult, ServerError};

macro_rules! invalid_type_error {
    ($v:expr, $det:expr) => {{
        fail!(invalid_type_error_inner!($v, $det))
    }};
}

macro_rules! invalid_type_error_inner {
    ($v:expr, $det:expr) => {
        RedisError::from((
            ErrorKind::TypeError,
            "Response was of incompatible type",
            format!("{:?} (response was {:?})", $det, $v),
        ))
    };
}

/// Internal low-level redis value enum.
#[derive(PartialEq, Eq, Clone)]
pub enum Value {
    /// A nil response from the server.
    Nil,
    /// An integer response.  Note that there are a few situations
    /// in which redis actually returns a string for an integer which
    /// is why this library generally treats integers and strings
    /// the same for all numeric responses.
    Int(i64),
    /// An arbitrary binary payload.
    BulkString(Vec<u8>),
    /// A status response.
    SimpleString(String),
    /// A status response which represents the string "OK".
    Okay,
    /// A nested structure of further values.
    Array(Vec<Value>),
    /// An error reply, kept in-band so that redirections and pipeline
    /// positions can be inspected before the error is raised.
    ServerError(ServerError),
}

impl Value {
    /// Turns an in-band error reply into a proper `Err`, passing every
    /// other value through.  This is the boundary at which server errors
    /// stop being values.
    pub fn extract_error(self) -> RedisResult<Value> {
        match self {
            Value::ServerError(err) => Err(err.into()),
            other => Ok(other),
        }
    }

    /// Returns an `&[Value]` if `self` is compatible with a sequence type.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(&items[..]),
            Value::Nil => Some(&[]),
            _ => None,
        }
    }

    /// Returns a `Vec<Value>` if `self` is compatible with a sequence
    /// type, otherwise returns `Err(self)`.
    pub fn into_sequence(self) -> Result<Vec<Value>, Value> {
        match self {
            Value::Array(items) => Ok(items),
            Value::Nil => Ok(vec![]),
            _ => Err(self),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::Nil => write!(fmt, "nil"),
            Value::Int(val) => write!(fmt, "int({val:?})"),
            Value::BulkString(ref val) => match from_utf8(val) {
                Ok(x) => write!(fmt, "bulk-string('{x:?}')"),
                Err(_) => write!(fmt, "binary-data({val:?})"),
            },
            Value::SimpleString(ref s) => write!(fmt, "simple-string({s:?})"),
            Value::Okay => write!(fmt, "ok"),
            Value::Array(ref values) => {
                write!(fmt, "array(")?;
                let mut is_first = true;
                for val in values.iter() {
                    if !is_first {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{val:?}")?;
                    is_first = false;
                }
                write!(fmt, ")")
            }
            Value::ServerError(ref err) => write!(fmt, "server-error({err})"),
        }
    }
}

/// Abstraction trait for command argument sinks.
pub trait RedisWrite {
    /// Accepts a serialized argument.
    fn write_arg(&mut self, arg: &[u8]);

    /// Accepts an argument that can be formatted.
    fn write_arg_fmt(&mut self, arg: impl fmt::Display) {
        self.write_arg(arg.to_string().as_bytes())
    }
}

impl RedisWrite for Vec<Vec<u8>> {
    fn write_arg(&mut self, arg: &[u8]) {
        self.push(arg.to_owned());
    }

    fn write_arg_fmt(&mut self, arg: impl fmt::Display) {
        self.push(arg.to_string().into_bytes())
    }
}

/// Used to convert a value into one or multiple redis argument
/// strings.  Most values will produce exactly one item but in
/// some cases it might make sense to produce more than one: a
/// slice splices its elements into the command in order.
pub trait ToRedisArgs: Sized {
    /// This converts the value into a vector of bytes.  Each item
    /// is a single argument.
    fn to_redis_args(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.write_redis_args(&mut out);
        out
    }

    /// This writes the value into an argument sink.
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite;

    /// This only exists internally as a workaround for the lack of
    /// specialization: byte slices override it to stay one binary
    /// argument.
    #[doc(hidden)]
    fn write_args_from_slice<W>(items: &[Self], out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        for item in items {
            item.write_redis_args(out);
        }
    }
}

macro_rules! itoa_based_to_redis_impl {
    ($t:ty) => {
        impl ToRedisArgs for $t {
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + RedisWrite,
            {
                let mut buf = ::itoa::Buffer::new();
                let s = buf.format(*self);
                out.write_arg(s.as_bytes())
            }
        }
    };
}

itoa_based_to_redis_impl!(i8);
itoa_based_to_redis_impl!(i16);
itoa_based_to_redis_impl!(u16);
itoa_based_to_redis_impl!(i32);
itoa_based_to_redis_impl!(u32);
itoa_based_to_redis_impl!(i64);
itoa_based_to_redis_impl!(u64);
itoa_based_to_redis_impl!(isize);
itoa_based_to_redis_impl!(usize);

macro_rules! ryu_based_to_redis_impl {
    ($t:ty) => {
        impl ToRedisArgs for $t {
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + RedisWrite,
            {
                let mut buf = ::ryu::Buffer::new();
                let s = buf.format(*self);
                out.write_arg(s.as_bytes())
            }
        }
    };
}

ryu_based_to_redis_impl!(f32);
ryu_based_to_redis_impl!(f64);

impl ToRedisArgs for u8 {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        let mut buf = ::itoa::Buffer::new();
        let s = buf.format(*self);
        out.write_arg(s.as_bytes())
    }

    fn write_args_from_slice<W>(items: &[u8], out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(items);
    }
}

impl ToRedisArgs for bool {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(if *self { b"1" } else { b"0" })
    }
}

impl ToRedisArgs for String {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.as_bytes())
    }
}

impl ToRedisArgs for &str {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.as_bytes())
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Vec<T> {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(self, out)
    }
}

impl<T: ToRedisArgs> ToRedisArgs for &[T] {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(self, out)
    }
}

impl<T: ToRedisArgs, const N: usize> ToRedisArgs for [T; N] {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(self, out)
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Option<T> {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        if let Some(ref x) = *self {
            x.write_redis_args(out);
        }
    }
}

impl<T: ToRedisArgs> ToRedisArgs for &T {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        (*self).write_redis_args(out)
    }
}

impl ToRedisArgs for Value {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            Value::BulkString(data) => out.write_arg(data),
            Value::SimpleString(s) => out.write_arg(s.as_bytes()),
            Value::Okay => out.write_arg(b"OK"),
            Value::Int(i) => out.write_arg_fmt(i),
            Value::Nil => out.write_arg(b""),
            _ => {}
        }
    }
}

/// This trait is used to convert a redis value into a more appropriate
/// type.  While a redis `Value` can represent any response that comes
/// back from the redis server, usually you want to map this into
/// something that works better in rust.
pub trait FromRedisValue: Sized {
    /// Given a redis `Value` this attempts to convert it into the given
    /// destination type.  If that fails because the value is not
    /// appropriate an error with the kind `TypeError` is returned.
    fn from_redis_value(v: &Value) -> RedisResult<Self>;

    /// Similar to `from_redis_value` but constructs a vector of objects
    /// from another vector of values.
    fn from_redis_values(items: &[Value]) -> RedisResult<Vec<Self>> {
        items.iter().map(FromRedisValue::from_redis_value).collect()
    }
}

macro_rules! from_redis_value_for_num {
    ($t:ty) => {
        impl FromRedisValue for $t {
            fn from_redis_value(v: &Value) -> RedisResult<$t> {
                match *v {
                    Value::Int(val) => Ok(val as $t),
                    Value::SimpleString(ref s) => match s.parse::<$t>() {
                        Ok(rv) => Ok(rv),
                        Err(_) => invalid_type_error!(v, "Could not convert from string."),
                    },
                    Value::BulkString(ref bytes) => match from_utf8(bytes)?.parse::<$t>() {
                        Ok(rv) => Ok(rv),
                        Err(_) => invalid_type_error!(v, "Could not convert from string."),
                    },
                    _ => invalid_type_error!(v, "Response type not convertible to numeric."),
                }
            }
        }
    };
}

from_redis_value_for_num!(i8);
from_redis_value_for_num!(i16);
from_redis_value_for_num!(u16);
from_redis_value_for_num!(i32);
from_redis_value_for_num!(u32);
from_redis_value_for_num!(i64);
from_redis_value_for_num!(u64);
from_redis_value_for_num!(isize);
from_redis_value_for_num!(usize);
from_redis_value_for_num!(u8);
from_redis_value_for_num!(f32);
from_redis_value_for_num!(f64);

impl FromRedisValue for bool {
    fn from_redis_value(v: &Value) -> RedisResult<bool> {
        match *v {
            Value::Nil => Ok(false),
            Value::Int(val) => Ok(val != 0),
            Value::Okay => Ok(true),
            Value::SimpleString(ref s) => match s.as_str() {
                "1" => Ok(true),
                "0" => Ok(false),
                _ => invalid_type_error!(v, "Response status not valid boolean"),
            },
            Value::BulkString(ref bytes) => match bytes.as_slice() {
                b"1" => Ok(true),
                b"0" => Ok(false),
                _ => invalid_type_error!(v, "Response type not bool compatible."),
            },
            _ => invalid_type_error!(v, "Response type not bool compatible."),
        }
    }
}

impl FromRedisValue for String {
    fn from_redis_value(v: &Value) -> RedisResult<String> {
        match *v {
            Value::BulkString(ref bytes) => Ok(from_utf8(bytes)?.to_string()),
            Value::SimpleString(ref val) => Ok(val.to_string()),
            Value::Okay => Ok("OK".to_string()),
            Value::Int(val) => Ok(val.to_string()),
            _ => invalid_type_error!(v, "Response type not string compatible."),
        }
    }
}

impl FromRedisValue for Vec<u8> {
    fn from_redis_value(v: &Value) -> RedisResult<Vec<u8>> {
        match *v {
            Value::BulkString(ref bytes) => Ok(bytes.clone()),
            Value::SimpleString(ref s) => Ok(s.as_bytes().to_vec()),
            Value::Nil => Ok(vec![]),
            _ => invalid_type_error!(v, "Response type not byte-string compatible."),
        }
    }
}

impl FromRedisValue for Value {
    fn from_redis_value(v: &Value) -> RedisResult<Value> {
        Ok(v.clone())
    }
}

impl FromRedisValue for () {
    fn from_redis_value(_v: &Value) -> RedisResult<()> {
        Ok(())
    }
}

impl<T: FromRedisValue> FromRedisValue for Option<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Option<T>> {
        match *v {
            Value::Nil => Ok(None),
            _ => Ok(Some(FromRedisValue::from_redis_value(v)?)),
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Vec<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Vec<T>> {
        match v.as_sequence() {
            Some(items) => FromRedisValue::from_redis_values(items),
            None => invalid_type_error!(v, "Response type not vector compatible."),
        }
    }
}

impl<K, V> FromRedisValue for HashMap<K, V>
where
    K: FromRedisValue + Eq + Hash,
    V: FromRedisValue,
{
    fn from_redis_value(v: &Value) -> RedisResult<HashMap<K, V>> {
        let items = match v.as_sequence() {
            Some(items) => items,
            None => invalid_type_error!(v, "Response type not hashmap compatible"),
        };
        if items.len() % 2 != 0 {
            invalid_type_error!(v, "Response type has odd number of entries");
        }
        let mut map = HashMap::with_capacity(items.len() / 2);
        let mut iter = items.iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            map.insert(
                FromRedisValue::from_redis_value(k)?,
                FromRedisValue::from_redis_value(v)?,
            );
        }
        Ok(map)
    }
}

/// Shortcut function for converting a value into a rust type.
pub fn from_redis_value<T: FromRedisValue>(v: &Value) -> RedisResult<T> {
    FromRedisValue::from_redis_value(v)
}

/// Parsed form of an `INFO` reply.
///
/// The reply is a text blob of `key:value` lines grouped by `# Section`
/// headers.  Values can be fetched by key across all sections or per
/// section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoDict {
    sections: HashMap<String, HashMap<String, String>>,
}

impl InfoDict {
    /// Parses the payload of an `INFO` reply.  Each non-empty line is a
    /// `key:value` pair; lines starting with `#` open a new section.
    pub fn new(payload: &str) -> InfoDict {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();
        for line in payload.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('#') {
                current = name.trim().to_string();
                sections.entry(current.clone()).or_default();
                continue;
            }
            let mut p = line.splitn(2, ':');
            let (k, v) = match (p.next(), p.next()) {
                (Some(k), Some(v)) => (k.to_string(), v.to_string()),
                _ => continue,
            };
            sections.entry(current.clone()).or_default().insert(k, v);
        }
        InfoDict { sections }
    }

    /// Fetches a value by key, searching every section, and converts it
    /// into the given type.  Typical types are `String`, `bool` and
    /// integer types.
    pub fn get<T: FromRedisValue>(&self, key: &str) -> Option<T> {
        self.sections
            .values()
            .find_map(|section| section.get(key))
            .and_then(|val| from_redis_value(&Value::SimpleString(val.clone())).ok())
    }

    /// Returns the key/value pairs of one section.
    pub fn section(&self, name: &str) -> Option<&HashMap<String, String>> {
        self.sections.get(name)
    }

    /// Returns the parsed sections.
    pub fn sections(&self) -> &HashMap<String, HashMap<String, String>> {
        &self.sections
    }

    /// Checks if a key is present in any section.
    pub fn contains_key(&self, key: &str) -> bool {
        self.sections.values().any(|s| s.contains_key(key))
    }

    /// Returns the number of keys across all sections.
    pub fn len(&self) -> usize {
        self.sections.values().map(|s| s.len()).sum()
    }

    /// Checks if the dict is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromRedisValue for InfoDict {
    fn from_redis_value(v: &Value) -> RedisResult<InfoDict> {
        let s: String = from_redis_value(v)?;
        Ok(InfoDict::new(&s))
    }
}
