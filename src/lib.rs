//! redlink is a blocking Redis client core.  It speaks RESP on the wire,
//! batches commands through pipelines, and routes requests across a
//! cluster, following `MOVED` and `ASK` redirections as the slot layout
//! changes under it.
//!
//! # Basic Operation
//!
//! The [`Client`] is the entry point.  It is configured through
//! [`Config`], connects lazily, and runs the `AUTH`/`SELECT` handshake
//! the first time a command goes out:
//!
//! ```rust,no_run
//! use redlink::{Client, Config};
//!
//! fn do_something() -> redlink::RedisResult<()> {
//!     let mut client = Client::new(Config::new().server("127.0.0.1:6379"));
//!     let reply = client.execute_raw(vec![b"GET".to_vec(), b"my_key".to_vec()])?;
//!     /* do something here */
//!     Ok(())
//! }
//! ```
//!
//! Commands can also be assembled through the builder api and the
//! command-line syntax:
//!
//! ```rust,no_run
//! # fn run() -> redlink::RedisResult<()> {
//! # let mut client = redlink::Client::new(redlink::Config::new());
//! let mut command = redlink::cmd("SET");
//! command.key("my_key").arg(42);
//! client.execute(&command)?;
//!
//! client.execute_raw_string(r#"set greeting "hello \"world\"""#)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Pipelining
//!
//! A [`Pipeline`] records commands and sends them as one batch.  Replies
//! come back in request order; an error reply occupies its slot in the
//! result list instead of aborting the batch:
//!
//! ```rust,no_run
//! # fn run() -> redlink::RedisResult<()> {
//! # let mut client = redlink::Client::new(redlink::Config::new());
//! let results = client.pipelined(|pipe| {
//!     pipe.cmd("SET").key("a").arg(1);
//!     pipe.cmd("INCR").key("a");
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! # Cluster
//!
//! With `Config::cluster(true)` the client keeps a slot table and one
//! connection per node.  Keys hash to slots with CRC16, honoring
//! `{...}` hashtags; `MOVED` replies update the table and retry, `ASK`
//! replies redirect a single request without touching it.
//!
//! # Endpoint formats
//!
//! * `host:port`
//! * `tcp://host:port` or `redis://host:port/db`
//! * `unix:///path/to/socket`

#![deny(non_camel_case_types)]
#![warn(missing_docs)]

mod macros;

mod errors;
mod types;

mod client;
mod cluster;
mod cluster_routing;
mod cmd;
mod commands;
mod connection;
mod parser;
mod pipeline;
mod raw;
mod response;

pub use crate::client::{Client, Config};
pub use crate::cluster::{ClusterConnection, ClusterParams};
pub use crate::cluster_routing::{slot_of, SLOT_COUNT};
pub use crate::cmd::{cmd, pack_command, Cmd};
pub use crate::commands::Version;
pub use crate::connection::{
    parse_endpoint, Connect, Connection, ConnectionAddr, ConnectionInfo, ConnectionLike,
    IntoConnectionInfo, Msg, RedisConnectionInfo,
};
pub use crate::errors::{ErrorKind, RedisError, RedisResult, ServerError, ServerErrorKind};
pub use crate::parser::{parse_redis_value, Parser};
pub use crate::pipeline::{pipe, Pipeline};
pub use crate::raw::tokenize;
pub use crate::response::{parse_cluster_slots, Reply, ReplyParser, SlotRange};
pub use crate::types::{
    from_redis_value, FromRedisValue, InfoDict, RedisWrite, ToRedisArgs, Value,
};
