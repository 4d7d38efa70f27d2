use std::ops::ControlFlow;
use std::time::Duration;

use crate::cluster::{ClusterConnection, ClusterParams};
use crate::cmd::Cmd;
use crate::commands::{lookup, Version};
use crate::connection::{parse_endpoint, Connection, ConnectionLike, Msg};
use crate::errors::{ErrorKind, RedisResult};
use crate::pipeline::Pipeline;
use crate::raw::tokenize;
use crate::response::{Reply, SlotRange};

/// Client configuration, merged over defaults.
///
/// ```rust
/// use redlink::Config;
///
/// let config = Config::new()
///     .server("10.0.0.1:6379")
///     .database(2)
///     .password("sekrit");
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    server: String,
    timeout: Duration,
    database: i64,
    password: Option<String>,
    version: Version,
    cluster_enabled: bool,
    cluster_clusters: Vec<SlotRange>,
    cluster_init_on_start: bool,
    cluster_init_on_error: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            server: "127.0.0.1:6379".to_string(),
            timeout: Duration::from_secs(1),
            database: 0,
            password: None,
            version: Version::LATEST,
            cluster_enabled: false,
            cluster_clusters: vec![],
            cluster_init_on_start: false,
            cluster_init_on_error: false,
        }
    }
}

impl Config {
    /// Creates the default configuration.
    pub fn new() -> Config {
        Config::default()
    }

    /// The endpoint of the default node.
    pub fn server(mut self, server: impl Into<String>) -> Config {
        self.server = server.into();
        self
    }

    /// The socket deadline applied to connects, reads and writes.
    pub fn timeout(mut self, timeout: Duration) -> Config {
        self.timeout = timeout;
        self
    }

    /// The database `SELECT`ed during the handshake when nonzero.
    pub fn database(mut self, database: i64) -> Config {
        self.database = database;
        self
    }

    /// The password sent with `AUTH` during the handshake.
    pub fn password(mut self, password: impl Into<String>) -> Config {
        self.password = Some(password.into());
        self
    }

    /// Selects the command surface exposed by the client.
    pub fn version(mut self, version: Version) -> Config {
        self.version = version;
        self
    }

    /// Activates cluster routing.
    pub fn cluster(mut self, enabled: bool) -> Config {
        self.cluster_enabled = enabled;
        self
    }

    /// Seeds the slot table without contacting any node.
    pub fn clusters(mut self, clusters: Vec<SlotRange>) -> Config {
        self.cluster_clusters = clusters;
        self
    }

    /// Issues `CLUSTER SLOTS` during the handshake to prime the slot
    /// table.
    pub fn init_on_start(mut self, value: bool) -> Config {
        self.cluster_init_on_start = value;
        self
    }

    /// Refreshes the whole slot table on `MOVED` instead of patching the
    /// redirected slot.
    pub fn init_on_error(mut self, value: bool) -> Config {
        self.cluster_init_on_error = value;
        self
    }
}

enum Backend {
    Single(Connection),
    Cluster(ClusterConnection<Connection>),
}

/// The client type: entry point for executing commands.
///
/// The client connects lazily; the first command triggers the connect
/// and the `AUTH`/`SELECT` handshake.  A client drives one logical
/// connection per configured endpoint and is not meant to be shared
/// across threads without external locking.
pub struct Client {
    config: Config,
    backend: Option<Backend>,
}

impl Client {
    /// Creates a client around the given configuration.  No connection
    /// is opened yet.
    pub fn new(config: Config) -> Client {
        Client {
            config,
            backend: None,
        }
    }

    /// The command surface version this client speaks.
    pub fn version(&self) -> Version {
        self.config.version
    }

    fn backend(&mut self) -> RedisResult<&mut Backend> {
        if self.backend.is_none() {
            let backend = if self.config.cluster_enabled {
                let params = ClusterParams::new(self.config.server.clone())
                    .password(self.config.password.clone())
                    .timeout(Some(self.config.timeout))
                    .init_on_error(self.config.cluster_init_on_error);
                let conn = ClusterConnection::new(params, &self.config.cluster_clusters);
                if self.config.cluster_init_on_start {
                    conn.refresh_slots()?;
                }
                Backend::Cluster(conn)
            } else {
                let mut info = parse_endpoint(&self.config.server)?;
                if info.redis.db == 0 {
                    info.redis.db = self.config.database;
                }
                if info.redis.password.is_none() {
                    info.redis.password = self.config.password.clone();
                }
                Backend::Single(Connection::new(info, Some(self.config.timeout))?)
            };
            self.backend = Some(backend);
        }
        Ok(self.backend.as_mut().unwrap())
    }

    /// Executes one assembled command and applies its reply parser.
    pub fn execute(&mut self, command: &Cmd) -> RedisResult<Reply> {
        let parser = command.parser();
        let value = match self.backend()? {
            Backend::Single(conn) => conn.req_command(command)?.extract_error()?,
            Backend::Cluster(cluster) => cluster.request(command)?,
        };
        parser.apply(value)
    }

    /// Executes a command given as raw byte-string arguments.  Known
    /// command names pick up their routing key and reply parser from the
    /// registry; unknown names are sent as-is with the first argument
    /// routing.
    pub fn execute_raw(&mut self, args: Vec<Vec<u8>>) -> RedisResult<Reply> {
        let command = self.command_from_args(args)?;
        self.execute(&command)
    }

    /// Parses a human-typed command line and executes it.
    pub fn execute_raw_string(&mut self, line: &str) -> RedisResult<Reply> {
        let tokens = tokenize(line);
        self.execute_raw(tokens.into_iter().map(String::into_bytes).collect())
    }

    fn command_from_args(&self, args: Vec<Vec<u8>>) -> RedisResult<Cmd> {
        if args.is_empty() {
            fail!((ErrorKind::Client, "Cannot execute an empty command"));
        }

        let spec = lookup(
            &args[0],
            args.get(1).map(|a| &a[..]),
            self.config.version,
        )?;

        let mut command =
            Cmd::with_capacity(args.len(), args.iter().map(|a| a.len()).sum());
        for arg in &args {
            command.arg(&arg[..]);
        }

        match spec {
            Some(spec) => {
                if let Some(pos) = spec.first_key {
                    let key = command.arg_idx(pos).map(|k| k.to_vec());
                    if let Some(key) = key {
                        command.add_routing_key(key);
                    }
                }
                command.set_parser(spec.parser);
            }
            None => {
                let key = command.arg_idx(1).map(|k| k.to_vec());
                if let Some(key) = key {
                    command.add_routing_key(key);
                }
            }
        }
        Ok(command)
    }

    /// Returns an empty pipeline for caller assembly; execute it with
    /// [`execute_pipeline`](Self::execute_pipeline).
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new()
    }

    /// Hands a fresh pipeline to the closure, then executes whatever it
    /// recorded.
    pub fn pipelined<F>(&mut self, record: F) -> RedisResult<Vec<RedisResult<Reply>>>
    where
        F: FnOnce(&mut Pipeline),
    {
        let mut pipe = Pipeline::new();
        record(&mut pipe);
        self.execute_pipeline(&pipe)
    }

    /// Executes a recorded pipeline as one batch.  The result list lines
    /// up with the recorded commands; error replies keep their position.
    pub fn execute_pipeline(&mut self, pipe: &Pipeline) -> RedisResult<Vec<RedisResult<Reply>>> {
        if pipe.is_empty() {
            return Ok(vec![]);
        }
        let responses = match self.backend()? {
            Backend::Single(conn) => {
                conn.req_packed_commands(&pipe.get_packed_pipeline(), pipe.len())?
            }
            Backend::Cluster(cluster) => cluster.execute_pipeline(pipe)?,
        };
        Ok(pipe.annotate_responses(responses))
    }

    /// Subscribes to channels and blocks, handing messages to the
    /// callback until it breaks.  The connection is unusable for other
    /// commands for the duration.
    pub fn subscribe<F>(&mut self, channels: &[&str], callback: F) -> RedisResult<()>
    where
        F: FnMut(Msg) -> ControlFlow<()>,
    {
        match self.backend()? {
            Backend::Single(conn) => conn.subscribe(channels, callback),
            Backend::Cluster(_) => fail!((
                ErrorKind::Client,
                "Pub/Sub is not supported in cluster mode"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ReplyParser;

    fn client() -> Client {
        Client::new(Config::new())
    }

    #[test]
    fn registry_attaches_key_and_parser() {
        let command = client()
            .command_from_args(vec![b"incr".to_vec(), b"counter".to_vec()])
            .unwrap();
        assert_eq!(command.first_key(), Some(&b"counter"[..]));
        assert_eq!(command.parser(), ReplyParser::Integer);
    }

    #[test]
    fn unknown_commands_route_by_first_argument() {
        let command = client()
            .command_from_args(vec![b"OBJECT".to_vec(), b"ENCODING".to_vec()])
            .unwrap();
        assert_eq!(command.first_key(), Some(&b"ENCODING"[..]));
        assert_eq!(command.parser(), ReplyParser::Identity);
    }

    #[test]
    fn keyless_commands_have_no_routing_key() {
        let command = client().command_from_args(vec![b"PING".to_vec()]).unwrap();
        assert_eq!(command.first_key(), None);
    }

    #[test]
    fn cluster_slots_gets_its_parser() {
        let command = client()
            .command_from_args(vec![b"CLUSTER".to_vec(), b"SLOTS".to_vec()])
            .unwrap();
        assert_eq!(command.parser(), ReplyParser::ClusterSlots);
    }

    #[test]
    fn empty_command_is_a_usage_error() {
        let err = client().command_from_args(vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Client);
    }

    #[test]
    fn old_versions_hide_new_commands() {
        let client = Client::new(Config::new().version(Version::V2_6));
        assert!(client
            .command_from_args(vec![b"SCAN".to_vec(), b"0".to_vec()])
            .is_err());
    }
}
