use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

/// Classification of an error reply by its leading word.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
#[non_exhaustive]
pub enum ServerErrorKind {
    /// A plain `ERR` reply.
    Generic,
    /// The slot permanently lives on another node.
    Moved,
    /// The key is being migrated; ask the target node once.
    Ask,
    /// The cluster cannot serve the request at all.
    ClusterDown,
    /// The server is still loading its dataset.
    Loading,
    /// Authentication is required or failed.
    NoAuth,
    /// Operation against a key holding the wrong kind of value.
    WrongType,
    /// The server is busy running a script.
    Busy,
    /// The server is out of memory.
    OutOfMemory,
    /// `EVALSHA` referenced an unknown script.
    NoScript,
    /// Write issued against a read-only replica.
    ReadOnly,
    /// The transaction was aborted.
    ExecAbort,
}

impl ServerErrorKind {
    pub(crate) fn from_code(code: &str) -> Option<ServerErrorKind> {
        match code {
            "ERR" => Some(ServerErrorKind::Generic),
            "MOVED" => Some(ServerErrorKind::Moved),
            "ASK" => Some(ServerErrorKind::Ask),
            "CLUSTERDOWN" => Some(ServerErrorKind::ClusterDown),
            "LOADING" => Some(ServerErrorKind::Loading),
            "NOAUTH" => Some(ServerErrorKind::NoAuth),
            "WRONGTYPE" => Some(ServerErrorKind::WrongType),
            "BUSY" => Some(ServerErrorKind::Busy),
            "OOM" => Some(ServerErrorKind::OutOfMemory),
            "NOSCRIPT" => Some(ServerErrorKind::NoScript),
            "READONLY" => Some(ServerErrorKind::ReadOnly),
            "EXECABORT" => Some(ServerErrorKind::ExecAbort),
            _ => None,
        }
    }

    pub(crate) fn code(&self) -> &'static str {
        match self {
            ServerErrorKind::Generic => "ERR",
            ServerErrorKind::Moved => "MOVED",
            ServerErrorKind::Ask => "ASK",
            ServerErrorKind::ClusterDown => "CLUSTERDOWN",
            ServerErrorKind::Loading => "LOADING",
            ServerErrorKind::NoAuth => "NOAUTH",
            ServerErrorKind::WrongType => "WRONGTYPE",
            ServerErrorKind::Busy => "BUSY",
            ServerErrorKind::OutOfMemory => "OOM",
            ServerErrorKind::NoScript => "NOSCRIPT",
            ServerErrorKind::ReadOnly => "READONLY",
            ServerErrorKind::ExecAbort => "EXECABORT",
        }
    }
}

/// An error reply from the server, kept as a value so that replies can
/// travel through pipelines and the cluster dispatcher before being
/// raised.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ServerError {
    /// An error code the library does not understand, carried verbatim.
    Extension {
        /// The leading word of the reply.
        code: String,
        /// Everything after the leading word.
        detail: Option<String>,
    },
    /// A classified error reply.
    Known {
        /// The classification of the error.
        kind: ServerErrorKind,
        /// Everything after the leading word.
        detail: Option<String>,
    },
}

impl ServerError {
    /// Classifies a raw error payload by its first whitespace-delimited
    /// word.
    pub fn from_payload(line: &str) -> ServerError {
        let mut pieces = line.splitn(2, ' ');
        let code = pieces.next().unwrap_or_default();
        let detail = pieces.next().map(|s| s.to_string());
        match ServerErrorKind::from_code(code) {
            Some(kind) => ServerError::Known { kind, detail },
            None => ServerError::Extension {
                code: code.to_string(),
                detail,
            },
        }
    }

    /// Returns the classification, if the code is one the library knows.
    pub fn kind(&self) -> Option<ServerErrorKind> {
        match self {
            ServerError::Extension { .. } => None,
            ServerError::Known { kind, .. } => Some(*kind),
        }
    }

    /// Returns the leading error word.
    pub fn code(&self) -> &str {
        match self {
            ServerError::Extension { code, .. } => code,
            ServerError::Known { kind, .. } => kind.code(),
        }
    }

    /// Returns the message following the error word.
    pub fn details(&self) -> Option<&str> {
        match self {
            ServerError::Extension { detail, .. } => detail.as_deref(),
            ServerError::Known { detail, .. } => detail.as_deref(),
        }
    }

    /// For `MOVED`/`ASK` replies, returns `(slot, endpoint)` parsed from
    /// the detail.
    pub fn redirect(&self) -> Option<(u16, &str)> {
        match self.kind() {
            Some(ServerErrorKind::Moved) | Some(ServerErrorKind::Ask) => {}
            _ => return None,
        }
        let mut iter = self.details()?.split_ascii_whitespace();
        let slot: u16 = iter.next()?.parse().ok()?;
        let endpoint = iter.next()?;
        Some((slot, endpoint))
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())?;
        if let Some(detail) = self.details() {
            f.write_str(" ")?;
            f.write_str(detail)?;
        }
        Ok(())
    }
}

impl error::Error for ServerError {}

/// An enum of all error kinds.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The parser failed to parse the server response.
    Parse,
    /// The authentication with the server failed.
    AuthenticationFailed,
    /// Operation failed because of a type mismatch.
    TypeError,
    /// An error that was caused because the parameters to the client
    /// were wrong.
    InvalidClientConfig,
    /// An I/O failure, including timeouts.
    Io,
    /// An error raised that was identified on the client before execution.
    Client,
    /// An error code from the server that is not native to the library.
    Extension,
    /// A classified error returned from the server.
    Server(ServerErrorKind),
}

/// Represents an error from the library.  For the most part you should
/// be using the `Error` trait to interact with this rather than the
/// actual struct.
pub struct RedisError {
    repr: ErrorRepr,
}

#[derive(Debug)]
enum ErrorRepr {
    General(ErrorKind, &'static str, Option<String>),
    Io(io::Error),
    Server(ServerError),
}

impl PartialEq for RedisError {
    fn eq(&self, other: &RedisError) -> bool {
        match (&self.repr, &other.repr) {
            (&ErrorRepr::General(kind_a, _, _), &ErrorRepr::General(kind_b, _, _)) => {
                kind_a == kind_b
            }
            (ErrorRepr::Server(a), ErrorRepr::Server(b)) => a == b,
            _ => false,
        }
    }
}

impl From<io::Error> for RedisError {
    fn from(err: io::Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::Io(err),
        }
    }
}

impl From<Utf8Error> for RedisError {
    fn from(_: Utf8Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::General(ErrorKind::TypeError, "Invalid UTF-8", None),
        }
    }
}

impl From<ServerError> for RedisError {
    fn from(err: ServerError) -> RedisError {
        RedisError {
            repr: ErrorRepr::Server(err),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RedisError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RedisError {
        RedisError {
            repr: ErrorRepr::General(kind, desc, None),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for RedisError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RedisError {
        RedisError {
            repr: ErrorRepr::General(kind, desc, Some(detail)),
        }
    }
}

impl error::Error for RedisError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Io(err) => Some(err),
            ErrorRepr::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Debug for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::General(kind, desc, detail) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(kind, f)?;
                if let Some(detail) = detail {
                    f.write_str(": ")?;
                    detail.fmt(f)?;
                }
                Ok(())
            }
            ErrorRepr::Io(err) => err.fmt(f),
            ErrorRepr::Server(err) => {
                f.write_str("An error was signalled by the server: ")?;
                err.fmt(f)
            }
        }
    }
}

impl RedisError {
    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::General(kind, _, _) => *kind,
            ErrorRepr::Io(_) => ErrorKind::Io,
            ErrorRepr::Server(err) => match err.kind() {
                Some(kind) => ErrorKind::Server(kind),
                None => ErrorKind::Extension,
            },
        }
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::General(_, _, detail) => detail.as_deref(),
            ErrorRepr::Server(err) => err.details(),
            ErrorRepr::Io(_) => None,
        }
    }

    /// Returns the raw server error code if this wraps an error reply.
    pub fn code(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::Server(err) => Some(err.code()),
            _ => None,
        }
    }

    pub(crate) fn as_io_error(&self) -> Option<&io::Error> {
        match &self.repr {
            ErrorRepr::Io(err) => Some(err),
            _ => None,
        }
    }

    /// Indicates that this failure is an I/O failure.
    pub fn is_io_error(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    /// Returns true if the error was caused by an I/O timeout.
    ///
    /// Note that this may not be accurate depending on platform.
    pub fn is_timeout(&self) -> bool {
        self.as_io_error().is_some_and(|err| {
            matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        })
    }

    /// Returns true if the error was caused by a dropped connection.
    pub fn is_connection_dropped(&self) -> bool {
        self.as_io_error().is_some_and(|err| {
            matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            )
        })
    }

    /// Returns true if the connection that produced this error must be
    /// replaced before the next request.
    pub fn is_unrecoverable_error(&self) -> bool {
        self.is_connection_dropped() || self.is_timeout() || self.kind() == ErrorKind::Parse
    }

    /// Returns true if this is a `MOVED` or `ASK` redirection.
    pub fn is_cluster_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Server(ServerErrorKind::Moved) | ErrorKind::Server(ServerErrorKind::Ask)
        )
    }

    /// Returns the `(slot, endpoint)` a redirection points at.
    pub fn redirect(&self) -> Option<(u16, &str)> {
        match &self.repr {
            ErrorRepr::Server(err) => err.redirect(),
            _ => None,
        }
    }
}

/// Library generic result type.
pub type RedisResult<T> = Result<T, RedisError>;
