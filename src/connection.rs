use std::fmt;
use std::io::{self, Write};
use std::net::{self, SocketAddr, TcpStream, ToSocketAddrs};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use log::debug;

use crate::cmd::{cmd, Cmd};
use crate::errors::{ErrorKind, RedisError, RedisResult};
use crate::parser::Parser;
use crate::types::{from_redis_value, FromRedisValue, Value};

static DEFAULT_PORT: u16 = 6379;

#[inline(always)]
fn connect_tcp(addr: (&str, u16)) -> io::Result<TcpStream> {
    TcpStream::connect(addr)
}

#[inline(always)]
fn connect_tcp_timeout(addr: &SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    TcpStream::connect_timeout(addr, timeout)
}

/// Defines the connection address.
///
/// Not all connection addresses are supported on all platforms.  For
/// instance to connect to a unix socket you need to run this on an
/// operating system that supports them.
#[derive(Clone, Debug)]
pub enum ConnectionAddr {
    /// Format for this is `(host, port)`.
    Tcp(String, u16),
    /// Format for this is the path to the unix socket.
    Unix(PathBuf),
}

impl PartialEq for ConnectionAddr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConnectionAddr::Tcp(host1, port1), ConnectionAddr::Tcp(host2, port2)) => {
                host1 == host2 && port1 == port2
            }
            (ConnectionAddr::Unix(path1), ConnectionAddr::Unix(path2)) => path1 == path2,
            _ => false,
        }
    }
}

impl Eq for ConnectionAddr {}

impl fmt::Display for ConnectionAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // the cluster map keys connections by this representation
        match *self {
            ConnectionAddr::Tcp(ref host, port) => write!(f, "{host}:{port}"),
            ConnectionAddr::Unix(ref path) => write!(f, "{}", path.display()),
        }
    }
}

/// Holds the connection information for connecting to a server.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    /// The address the connection goes to.
    pub addr: ConnectionAddr,
    /// Connection-independent handshake information.
    pub redis: RedisConnectionInfo,
}

/// Handshake information replayed whenever the connection is (re)opened.
#[derive(Clone, Debug, Default)]
pub struct RedisConnectionInfo {
    /// The database number to use.  This is usually `0`.
    pub db: i64,
    /// Optionally a password that should be used for connection.
    pub password: Option<String>,
}

impl FromStr for ConnectionInfo {
    type Err = RedisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.into_connection_info()
    }
}

/// Converts an object into a connection info struct.  This allows the
/// constructor of the client to accept connection information in a
/// range of different formats.
pub trait IntoConnectionInfo {
    /// Converts the object into a connection info object.
    fn into_connection_info(self) -> RedisResult<ConnectionInfo>;
}

impl IntoConnectionInfo for ConnectionInfo {
    fn into_connection_info(self) -> RedisResult<ConnectionInfo> {
        Ok(self)
    }
}

/// Endpoint format: `host:port`, `tcp://host:port`, `redis://host:port/db`
/// or `unix:///path`.
impl IntoConnectionInfo for &str {
    fn into_connection_info(self) -> RedisResult<ConnectionInfo> {
        parse_endpoint(self)
    }
}

impl IntoConnectionInfo for String {
    fn into_connection_info(self) -> RedisResult<ConnectionInfo> {
        parse_endpoint(&self)
    }
}

impl<T> IntoConnectionInfo for (T, u16)
where
    T: Into<String>,
{
    fn into_connection_info(self) -> RedisResult<ConnectionInfo> {
        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.0.into(), self.1),
            redis: RedisConnectionInfo::default(),
        })
    }
}

/// Parses an endpoint string into connection information.
pub fn parse_endpoint(input: &str) -> RedisResult<ConnectionInfo> {
    if input.contains("://") {
        let url = match url::Url::parse(input) {
            Ok(url) => url,
            Err(_) => fail!((ErrorKind::InvalidClientConfig, "Endpoint did not parse")),
        };
        return url.into_connection_info();
    }

    let (host, port) = match input.rsplit_once(':') {
        Some((host, port)) => {
            let port = match port.parse::<u16>() {
                Ok(port) => port,
                Err(_) => fail!((ErrorKind::InvalidClientConfig, "Invalid endpoint port")),
            };
            (host, port)
        }
        None => (input, DEFAULT_PORT),
    };
    if host.is_empty() {
        fail!((ErrorKind::InvalidClientConfig, "Missing hostname"));
    }
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host.to_string(), port),
        redis: RedisConnectionInfo::default(),
    })
}

fn url_to_tcp_connection_info(url: url::Url) -> RedisResult<ConnectionInfo> {
    let host = match url.host() {
        // Matching the host arms manually because url's to_string adds
        // `[...]` around ipv6 hosts, which to_socket_addrs cannot parse
        // back.
        Some(url::Host::Domain(path)) => path.to_string(),
        Some(url::Host::Ipv4(v4)) => v4.to_string(),
        Some(url::Host::Ipv6(v6)) => v6.to_string(),
        None => fail!((ErrorKind::InvalidClientConfig, "Missing hostname")),
    };
    let port = url.port().unwrap_or(DEFAULT_PORT);
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        redis: RedisConnectionInfo {
            db: match url.path().trim_matches('/') {
                "" => 0,
                path => path.parse::<i64>().map_err(|_| -> RedisError {
                    (ErrorKind::InvalidClientConfig, "Invalid database number").into()
                })?,
            },
            password: match url.password() {
                Some(pw) => match percent_encoding::percent_decode(pw.as_bytes()).decode_utf8() {
                    Ok(decoded) => Some(decoded.into_owned()),
                    Err(_) => fail!((
                        ErrorKind::InvalidClientConfig,
                        "Password is not valid UTF-8 string"
                    )),
                },
                None => None,
            },
        },
    })
}

#[cfg(unix)]
fn url_to_unix_connection_info(url: url::Url) -> RedisResult<ConnectionInfo> {
    let mut info = RedisConnectionInfo::default();
    for (key, value) in url.query_pairs() {
        match &*key {
            "db" => {
                info.db = value.parse::<i64>().map_err(|_| -> RedisError {
                    (ErrorKind::InvalidClientConfig, "Invalid database number").into()
                })?
            }
            "pass" => info.password = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Unix(url.to_file_path().map_err(|_| -> RedisError {
            (ErrorKind::InvalidClientConfig, "Missing path").into()
        })?),
        redis: info,
    })
}

#[cfg(not(unix))]
fn url_to_unix_connection_info(_: url::Url) -> RedisResult<ConnectionInfo> {
    fail!((
        ErrorKind::InvalidClientConfig,
        "Unix sockets are not available on this platform."
    ));
}

impl IntoConnectionInfo for url::Url {
    fn into_connection_info(self) -> RedisResult<ConnectionInfo> {
        match self.scheme() {
            "tcp" | "redis" => url_to_tcp_connection_info(self),
            "unix" | "redis+unix" => url_to_unix_connection_info(self),
            _ => fail!((
                ErrorKind::InvalidClientConfig,
                "URL provided is not a redis URL"
            )),
        }
    }
}

struct TcpConnection {
    reader: TcpStream,
    open: bool,
}

#[cfg(unix)]
struct UnixConnection {
    sock: UnixStream,
    open: bool,
}

enum ActualConnection {
    Tcp(TcpConnection),
    #[cfg(unix)]
    Unix(UnixConnection),
}

impl ActualConnection {
    pub fn new(addr: &ConnectionAddr, timeout: Option<Duration>) -> RedisResult<ActualConnection> {
        Ok(match *addr {
            ConnectionAddr::Tcp(ref host, ref port) => {
                let addr = (host.as_str(), *port);
                let tcp = match timeout {
                    None => connect_tcp(addr)?,
                    Some(timeout) => {
                        let mut tcp = None;
                        let mut last_error = None;
                        for addr in addr.to_socket_addrs()? {
                            match connect_tcp_timeout(&addr, timeout) {
                                Ok(l) => {
                                    tcp = Some(l);
                                    break;
                                }
                                Err(e) => {
                                    last_error = Some(e);
                                }
                            };
                        }
                        match (tcp, last_error) {
                            (Some(tcp), _) => tcp,
                            (None, Some(e)) => {
                                fail!(e);
                            }
                            (None, None) => {
                                fail!((
                                    ErrorKind::InvalidClientConfig,
                                    "could not resolve to any addresses"
                                ));
                            }
                        }
                    }
                };
                ActualConnection::Tcp(TcpConnection {
                    reader: tcp,
                    open: true,
                })
            }
            #[cfg(unix)]
            ConnectionAddr::Unix(ref path) => ActualConnection::Unix(UnixConnection {
                sock: UnixStream::connect(path)?,
                open: true,
            }),
            #[cfg(not(unix))]
            ConnectionAddr::Unix(ref _path) => {
                fail!((
                    ErrorKind::InvalidClientConfig,
                    "Cannot connect to unix sockets on this platform"
                ));
            }
        })
    }

    pub fn send_bytes(&mut self, bytes: &[u8]) -> RedisResult<()> {
        match *self {
            ActualConnection::Tcp(ref mut connection) => {
                let res = connection.reader.write_all(bytes).map_err(RedisError::from);
                match res {
                    Err(e) => {
                        if e.is_unrecoverable_error() {
                            connection.open = false;
                        }
                        Err(e)
                    }
                    Ok(_) => Ok(()),
                }
            }
            #[cfg(unix)]
            ActualConnection::Unix(ref mut connection) => {
                let res = connection.sock.write_all(bytes).map_err(RedisError::from);
                match res {
                    Err(e) => {
                        if e.is_unrecoverable_error() {
                            connection.open = false;
                        }
                        Err(e)
                    }
                    Ok(_) => Ok(()),
                }
            }
        }
    }

    pub fn set_write_timeout(&self, dur: Option<Duration>) -> RedisResult<()> {
        match *self {
            ActualConnection::Tcp(TcpConnection { ref reader, .. }) => {
                reader.set_write_timeout(dur)?;
            }
            #[cfg(unix)]
            ActualConnection::Unix(UnixConnection { ref sock, .. }) => {
                sock.set_write_timeout(dur)?;
            }
        }
        Ok(())
    }

    pub fn set_read_timeout(&self, dur: Option<Duration>) -> RedisResult<()> {
        match *self {
            ActualConnection::Tcp(TcpConnection { ref reader, .. }) => {
                reader.set_read_timeout(dur)?;
            }
            #[cfg(unix)]
            ActualConnection::Unix(UnixConnection { ref sock, .. }) => {
                sock.set_read_timeout(dur)?;
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        match *self {
            ActualConnection::Tcp(ref mut connection) => {
                let _ = connection.reader.shutdown(net::Shutdown::Both);
                connection.open = false;
            }
            #[cfg(unix)]
            ActualConnection::Unix(ref mut connection) => {
                let _ = connection.sock.shutdown(net::Shutdown::Both);
                connection.open = false;
            }
        }
    }

    pub fn is_open(&self) -> bool {
        match *self {
            ActualConnection::Tcp(TcpConnection { open, .. }) => open,
            #[cfg(unix)]
            ActualConnection::Unix(UnixConnection { open, .. }) => open,
        }
    }
}

/// Represents a stateful connection to one server.
///
/// The connection starts out unconnected and opens its socket on first
/// use.  A connection broken by an I/O failure or timeout re-opens
/// transparently on the next request, replaying the `AUTH`/`SELECT`
/// handshake.
pub struct Connection {
    info: ConnectionInfo,
    timeout: Option<Duration>,
    con: Option<ActualConnection>,
    parser: Parser,
}

/// Implements the "stateless" part of the connection interface that is
/// used by the different objects in the library.  Primarily it applies to
/// [`Connection`], but cluster connections and test doubles implement the
/// interface as well.
pub trait ConnectionLike {
    /// Sends an already encoded (packed) command into the socket and
    /// reads the single response from it.
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value>;

    /// Sends multiple already encoded (packed) commands into the socket
    /// and reads `count` responses from it, in order.  This is used to
    /// implement pipelining.
    fn req_packed_commands(&mut self, cmd: &[u8], count: usize) -> RedisResult<Vec<Value>>;

    /// Sends a [`Cmd`] into the socket and reads a single response from it.
    fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        let pcmd = cmd.get_packed_command();
        self.req_packed_command(&pcmd)
    }

    /// Checks that the connection is usable (`PING` internally).
    fn check_connection(&mut self) -> bool {
        self.req_command(&cmd("PING"))
            .and_then(Value::extract_error)
            .is_ok()
    }

    /// Returns the connection status.  A connection stops being open when
    /// a read produced an invalid response or the socket broke; the next
    /// request re-opens it.
    fn is_open(&self) -> bool;
}

/// A trait for connection types that can be opened from connection
/// information.  The cluster map is generic over this so that tests can
/// substitute in-memory endpoints.
pub trait Connect: Sized {
    /// Opens a connection and runs the handshake.
    fn connect<T: IntoConnectionInfo>(info: T, timeout: Option<Duration>) -> RedisResult<Self>;
}

impl Connect for Connection {
    fn connect<T: IntoConnectionInfo>(
        info: T,
        timeout: Option<Duration>,
    ) -> RedisResult<Connection> {
        let mut con = Connection::new(info, timeout)?;
        con.ensure_open()?;
        Ok(con)
    }
}

impl Connection {
    /// Creates a connection in the unconnected state.  No I/O happens
    /// until the first request.
    pub fn new<T: IntoConnectionInfo>(
        params: T,
        timeout: Option<Duration>,
    ) -> RedisResult<Connection> {
        Ok(Connection {
            info: params.into_connection_info()?,
            timeout,
            con: None,
            parser: Parser::new(),
        })
    }

    /// The address this connection points at.
    pub fn addr(&self) -> &ConnectionAddr {
        &self.info.addr
    }

    fn ensure_open(&mut self) -> RedisResult<()> {
        if self.con.as_ref().is_some_and(ActualConnection::is_open) {
            return Ok(());
        }

        debug!("connecting to {}", self.info.addr);
        let con = ActualConnection::new(&self.info.addr, self.timeout)?;
        con.set_read_timeout(self.timeout)?;
        con.set_write_timeout(self.timeout)?;
        self.con = Some(con);
        // a fresh socket must not inherit half-parsed reply state
        self.parser = Parser::new();

        if let Err(err) = self.handshake() {
            self.con = None;
            return Err(err);
        }
        Ok(())
    }

    fn handshake(&mut self) -> RedisResult<()> {
        if let Some(password) = self.info.redis.password.clone() {
            let mut auth = cmd("AUTH");
            auth.arg(password);
            match self.raw_request(&auth.get_packed_command())?.extract_error() {
                Ok(Value::Okay) => {}
                _ => fail!((
                    ErrorKind::AuthenticationFailed,
                    "Password authentication failed"
                )),
            }
        }

        if self.info.redis.db != 0 {
            let mut select = cmd("SELECT");
            select.arg(self.info.redis.db);
            match self
                .raw_request(&select.get_packed_command())?
                .extract_error()?
            {
                Value::Okay => {}
                _ => fail!((
                    ErrorKind::Client,
                    "Redis server refused to switch database"
                )),
            }
        }

        Ok(())
    }

    fn raw_request(&mut self, bytes: &[u8]) -> RedisResult<Value> {
        self.send_bytes(bytes)?;
        self.read_response()
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> RedisResult<()> {
        match self.con {
            Some(ref mut con) => con.send_bytes(bytes),
            None => fail!((ErrorKind::Client, "Connection is not open")),
        }
    }

    /// Sends an already encoded (packed) command into the socket and
    /// does not read a response.  This is useful for commands like
    /// `SUBSCRIBE` which yield multiple items.
    pub fn send_packed_command(&mut self, cmd: &[u8]) -> RedisResult<()> {
        self.ensure_open()?;
        self.send_bytes(cmd)
    }

    /// Fetches a single response from the connection.  This is useful
    /// if used in combination with `send_packed_command`.
    pub fn recv_response(&mut self) -> RedisResult<Value> {
        self.read_response()
    }

    /// Shuts the socket down.  The connection is back in the
    /// unconnected state and reconnects on the next request.
    pub fn close(&mut self) {
        if let Some(con) = self.con.as_mut() {
            con.shutdown();
        }
        self.con = None;
        self.parser = Parser::new();
    }

    fn read_response(&mut self) -> RedisResult<Value> {
        let result = match self.con {
            Some(ActualConnection::Tcp(TcpConnection { ref mut reader, .. })) => {
                self.parser.parse_value(reader)
            }
            #[cfg(unix)]
            Some(ActualConnection::Unix(UnixConnection { ref mut sock, .. })) => {
                self.parser.parse_value(sock)
            }
            None => fail!((ErrorKind::Client, "Connection is not open")),
        };
        if let Err(e) = &result {
            // a timeout mid-reply leaves unconsumed bytes behind; the
            // socket cannot be reused and must be reopened
            if e.is_unrecoverable_error() {
                if let Some(con) = self.con.as_mut() {
                    con.shutdown();
                }
                self.parser = Parser::new();
            }
        }
        result
    }
}

impl ConnectionLike for Connection {
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value> {
        self.ensure_open()?;
        self.send_bytes(cmd)?;
        self.read_response()
    }

    fn req_packed_commands(&mut self, cmd: &[u8], count: usize) -> RedisResult<Vec<Value>> {
        self.ensure_open()?;
        self.send_bytes(cmd)?;
        let mut rv = Vec::with_capacity(count);
        for _ in 0..count {
            rv.push(self.read_response()?);
        }
        Ok(rv)
    }

    fn is_open(&self) -> bool {
        self.con.as_ref().is_some_and(ActualConnection::is_open)
    }
}

/// Represents a pubsub message.
#[derive(Debug)]
pub struct Msg {
    payload: Value,
    channel: Value,
    pattern: Option<Value>,
}

impl Msg {
    /// Turns a raw reply into a message if it is one; subscription
    /// bookkeeping replies return `None`.
    pub fn from_value(value: &Value) -> Option<Msg> {
        let items = value.as_sequence()?;
        let kind = match items.first()? {
            Value::BulkString(kind) => &kind[..],
            _ => return None,
        };
        match kind {
            b"message" => Some(Msg {
                channel: items.get(1)?.clone(),
                payload: items.get(2)?.clone(),
                pattern: None,
            }),
            b"pmessage" => Some(Msg {
                pattern: Some(items.get(1)?.clone()),
                channel: items.get(2)?.clone(),
                payload: items.get(3)?.clone(),
            }),
            _ => None,
        }
    }

    /// The channel the message was delivered on, lossily decoded.
    pub fn get_channel_name(&self) -> String {
        match &self.channel {
            Value::BulkString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::SimpleString(s) => s.clone(),
            _ => String::new(),
        }
    }

    /// The payload converted into the requested type.
    pub fn get_payload<T: FromRedisValue>(&self) -> RedisResult<T> {
        from_redis_value(&self.payload)
    }

    /// The pattern the subscription matched on, if any.
    pub fn get_pattern<T: FromRedisValue>(&self) -> RedisResult<T> {
        match &self.pattern {
            Some(pattern) => from_redis_value(pattern),
            None => from_redis_value(&Value::Nil),
        }
    }
}

impl Connection {
    /// Subscribes to the given channels and blocks, handing each message
    /// to the callback.  When the callback breaks, an `UNSUBSCRIBE` is
    /// sent and its acknowledgements are drained before returning; the
    /// connection is then usable for regular commands again.
    ///
    /// While the loop runs the connection belongs to it; no other command
    /// can be issued.
    pub fn subscribe<F>(&mut self, channels: &[&str], mut callback: F) -> RedisResult<()>
    where
        F: FnMut(Msg) -> ControlFlow<()>,
    {
        let mut sub = cmd("SUBSCRIBE");
        for channel in channels {
            sub.arg(*channel);
        }
        self.send_packed_command(&sub.get_packed_command())?;

        loop {
            let reply = self.recv_response()?.extract_error()?;
            if let Some(msg) = Msg::from_value(&reply) {
                if callback(msg).is_break() {
                    break;
                }
            }
        }

        self.send_packed_command(&cmd("UNSUBSCRIBE").get_packed_command())?;
        // unsubscribe acks carry the remaining subscription count; the
        // stream may still hold buffered messages before them
        loop {
            let reply = self.recv_response()?.extract_error()?;
            if let Some(items) = reply.as_sequence() {
                if let (Some(Value::BulkString(kind)), Some(Value::Int(remaining))) =
                    (items.first(), items.get(2))
                {
                    if kind == b"unsubscribe" && *remaining == 0 {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
