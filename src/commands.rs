//! The command registry: one table mapping `(version, command name)` to
//! the description the dispatcher needs.  Earlier layouts of this kind
//! of library stack per-version command bundles on top of each other;
//! keeping the whole matrix in one table makes the version gate explicit
//! and leaves dispatch a plain lookup.

use std::fmt;
use std::str::FromStr;

use crate::errors::{ErrorKind, RedisError, RedisResult};
use crate::response::ReplyParser;

/// The protocol surface a client exposes, by server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    /// Redis 2.6.
    V2_6,
    /// Redis 2.8.
    V2_8,
    /// Redis 3.0.
    V3_0,
    /// Redis 3.2.
    V3_2,
}

impl Version {
    /// The newest surface the library knows about.
    pub const LATEST: Version = Version::V3_2;

    /// The advertised version string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::V2_6 => "2.6",
            Version::V2_8 => "2.8",
            Version::V3_0 => "3.0",
            Version::V3_2 => "3.2",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = RedisError;

    fn from_str(s: &str) -> Result<Version, RedisError> {
        match s {
            "2.6" => Ok(Version::V2_6),
            "2.8" => Ok(Version::V2_8),
            "3.0" => Ok(Version::V3_0),
            "3.2" => Ok(Version::V3_2),
            _ => Err(RedisError::from((
                ErrorKind::InvalidClientConfig,
                "Unsupported server version",
                s.to_string(),
            ))),
        }
    }
}

/// What the registry knows about one command.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CommandSpec {
    /// The wire name; two-word names cover subcommands like
    /// `CLUSTER SLOTS`.
    pub(crate) name: &'static str,
    /// The version that introduced the command.
    pub(crate) since: Version,
    /// Argument position of the routing key, if the command has one.
    pub(crate) first_key: Option<usize>,
    /// The post-processor for the command's reply.
    pub(crate) parser: ReplyParser,
}

const fn spec(
    name: &'static str,
    since: Version,
    first_key: Option<usize>,
    parser: ReplyParser,
) -> CommandSpec {
    CommandSpec {
        name,
        since,
        first_key,
        parser,
    }
}

use ReplyParser::{Boolean, ClusterSlots, Identity, Info, Integer, Pairs};
use Version::{V2_6, V2_8, V3_0, V3_2};

#[rustfmt::skip]
static COMMANDS: &[CommandSpec] = &[
    spec("APPEND", V2_6, Some(1), Integer),
    spec("AUTH", V2_6, None, Identity),
    spec("BGSAVE", V2_6, None, Identity),
    spec("BITCOUNT", V2_6, Some(1), Integer),
    spec("CONFIG", V2_6, None, Identity),
    spec("DBSIZE", V2_6, None, Integer),
    spec("DECR", V2_6, Some(1), Integer),
    spec("DECRBY", V2_6, Some(1), Integer),
    spec("DEL", V2_6, Some(1), Integer),
    spec("ECHO", V2_6, None, Identity),
    spec("EXISTS", V2_6, Some(1), Boolean),
    spec("EXPIRE", V2_6, Some(1), Boolean),
    spec("EXPIREAT", V2_6, Some(1), Boolean),
    spec("FLUSHALL", V2_6, None, Identity),
    spec("FLUSHDB", V2_6, None, Identity),
    spec("GET", V2_6, Some(1), Identity),
    spec("GETRANGE", V2_6, Some(1), Identity),
    spec("GETSET", V2_6, Some(1), Identity),
    spec("HDEL", V2_6, Some(1), Integer),
    spec("HEXISTS", V2_6, Some(1), Boolean),
    spec("HGET", V2_6, Some(1), Identity),
    spec("HGETALL", V2_6, Some(1), Pairs),
    spec("HINCRBY", V2_6, Some(1), Integer),
    spec("HKEYS", V2_6, Some(1), Identity),
    spec("HLEN", V2_6, Some(1), Integer),
    spec("HMGET", V2_6, Some(1), Identity),
    spec("HMSET", V2_6, Some(1), Identity),
    spec("HSET", V2_6, Some(1), Boolean),
    spec("HSETNX", V2_6, Some(1), Boolean),
    spec("HVALS", V2_6, Some(1), Identity),
    spec("INCR", V2_6, Some(1), Integer),
    spec("INCRBY", V2_6, Some(1), Integer),
    spec("INFO", V2_6, None, Info),
    spec("KEYS", V2_6, None, Identity),
    spec("LINDEX", V2_6, Some(1), Identity),
    spec("LLEN", V2_6, Some(1), Integer),
    spec("LPOP", V2_6, Some(1), Identity),
    spec("LPUSH", V2_6, Some(1), Integer),
    spec("LRANGE", V2_6, Some(1), Identity),
    spec("LREM", V2_6, Some(1), Integer),
    spec("LSET", V2_6, Some(1), Identity),
    spec("LTRIM", V2_6, Some(1), Identity),
    spec("MGET", V2_6, Some(1), Identity),
    spec("MSET", V2_6, Some(1), Identity),
    spec("PERSIST", V2_6, Some(1), Boolean),
    spec("PING", V2_6, None, Identity),
    spec("RENAME", V2_6, Some(1), Identity),
    spec("RPOP", V2_6, Some(1), Identity),
    spec("RPUSH", V2_6, Some(1), Integer),
    spec("SADD", V2_6, Some(1), Integer),
    spec("SCARD", V2_6, Some(1), Integer),
    spec("SELECT", V2_6, None, Identity),
    spec("SET", V2_6, Some(1), Identity),
    spec("SETEX", V2_6, Some(1), Identity),
    spec("SETNX", V2_6, Some(1), Boolean),
    spec("SINTER", V2_6, Some(1), Identity),
    spec("SISMEMBER", V2_6, Some(1), Boolean),
    spec("SMEMBERS", V2_6, Some(1), Identity),
    spec("SPOP", V2_6, Some(1), Identity),
    spec("SREM", V2_6, Some(1), Integer),
    spec("STRLEN", V2_6, Some(1), Integer),
    spec("TTL", V2_6, Some(1), Integer),
    spec("TYPE", V2_6, Some(1), Identity),
    spec("ZADD", V2_6, Some(1), Integer),
    spec("ZCARD", V2_6, Some(1), Integer),
    spec("ZINCRBY", V2_6, Some(1), Identity),
    spec("ZRANGE", V2_6, Some(1), Identity),
    spec("ZREM", V2_6, Some(1), Integer),
    spec("ZSCORE", V2_6, Some(1), Identity),
    spec("HSCAN", V2_8, Some(1), Identity),
    spec("PFADD", V2_8, Some(1), Boolean),
    spec("PFCOUNT", V2_8, Some(1), Integer),
    spec("PFMERGE", V2_8, Some(1), Identity),
    spec("SCAN", V2_8, None, Identity),
    spec("SSCAN", V2_8, Some(1), Identity),
    spec("ZSCAN", V2_8, Some(1), Identity),
    spec("CLUSTER", V3_0, None, Identity),
    spec("CLUSTER INFO", V3_0, None, Info),
    spec("CLUSTER SLOTS", V3_0, None, ClusterSlots),
    spec("WAIT", V3_0, None, Integer),
    spec("BITFIELD", V3_2, Some(1), Identity),
    spec("GEOADD", V3_2, Some(1), Integer),
    spec("GEODIST", V3_2, Some(1), Identity),
    spec("GEOHASH", V3_2, Some(1), Identity),
    spec("GEOPOS", V3_2, Some(1), Identity),
    spec("HSTRLEN", V3_2, Some(1), Integer),
];

/// Looks a command up in the registry by its name and optional
/// subcommand.
///
/// Returns `Ok(Some(spec))` for a command available in the given
/// version, `Ok(None)` for a name the registry does not know at all
/// (such commands are dispatched raw), and a usage error for a command
/// the configured version does not expose yet.
pub(crate) fn lookup(
    name: &[u8],
    subcommand: Option<&[u8]>,
    version: Version,
) -> RedisResult<Option<&'static CommandSpec>> {
    let upper = name.to_ascii_uppercase();
    let mut found = None;
    if let Some(sub) = subcommand {
        let mut compound = upper.clone();
        compound.push(b' ');
        compound.extend_from_slice(&sub.to_ascii_uppercase());
        found = find(&compound);
    }
    let found = found.or_else(|| find(&upper));

    match found {
        Some(spec) if spec.since <= version => Ok(Some(spec)),
        Some(spec) => Err(RedisError::from((
            ErrorKind::Client,
            "Command is not available in this server version",
            format!("{} needs {}, client speaks {}", spec.name, spec.since, version),
        ))),
        None => Ok(None),
    }
}

fn find(name: &[u8]) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name.as_bytes() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let spec = lookup(b"get", None, Version::LATEST).unwrap().unwrap();
        assert_eq!(spec.name, "GET");
        assert_eq!(spec.first_key, Some(1));
    }

    #[test]
    fn subcommand_entries_win_over_bare_names() {
        let spec = lookup(b"cluster", Some(b"slots"), Version::LATEST)
            .unwrap()
            .unwrap();
        assert_eq!(spec.name, "CLUSTER SLOTS");
        assert_eq!(spec.parser, ReplyParser::ClusterSlots);

        let spec = lookup(b"cluster", Some(b"nodes"), Version::LATEST)
            .unwrap()
            .unwrap();
        assert_eq!(spec.name, "CLUSTER");
    }

    #[test]
    fn version_gates_commands() {
        assert!(lookup(b"SCAN", None, Version::V2_6).is_err());
        assert!(lookup(b"SCAN", None, Version::V2_8).unwrap().is_some());
        assert!(lookup(b"GEOADD", None, Version::V3_0).is_err());
        assert!(lookup(b"GEOADD", None, Version::V3_2).unwrap().is_some());
    }

    #[test]
    fn unknown_names_pass_through() {
        assert!(lookup(b"FROBNICATE", None, Version::LATEST)
            .unwrap()
            .is_none());
    }

    #[test]
    fn version_strings_round_trip() {
        for v in [Version::V2_6, Version::V2_8, Version::V3_0, Version::V3_2] {
            assert_eq!(v.as_str().parse::<Version>().unwrap(), v);
        }
        assert!("1.0".parse::<Version>().is_err());
    }
}
