#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use redlink::{
    Connect, ConnectionAddr, ConnectionLike, ErrorKind, IntoConnectionInfo, RedisError,
    RedisResult, Value,
};

/// Serves every request hitting one mock host.  Receives the packed
/// request and the port it arrived on, answers with the reply list for
/// the batch (a single element for plain commands).
pub type Handler = Arc<dyn Fn(&[u8], u16) -> RedisResult<Vec<Value>> + Send + Sync>;

fn handlers() -> &'static Mutex<HashMap<String, Handler>> {
    static HANDLERS: OnceLock<Mutex<HashMap<String, Handler>>> = OnceLock::new();
    HANDLERS.get_or_init(Default::default)
}

/// Installs a handler for a mock hostname.  Tests use distinct host
/// names so they can run in parallel.
pub fn install_handler<F>(host: &str, handler: F)
where
    F: Fn(&[u8], u16) -> RedisResult<Vec<Value>> + Send + Sync + 'static,
{
    handlers()
        .lock()
        .unwrap()
        .insert(host.to_string(), Arc::new(handler));
}

/// An in-memory connection; `Connect` resolves the handler installed
/// for the target host.
pub struct MockConnection {
    pub host: String,
    pub port: u16,
    pub handler: Handler,
}

impl Connect for MockConnection {
    fn connect<T: IntoConnectionInfo>(
        info: T,
        _timeout: Option<Duration>,
    ) -> RedisResult<MockConnection> {
        let info = info.into_connection_info()?;
        let (host, port) = match info.addr {
            ConnectionAddr::Tcp(host, port) => (host, port),
            _ => panic!("mock connections are TCP only"),
        };
        let handler = handlers().lock().unwrap().get(&host).cloned();
        match handler {
            Some(handler) => Ok(MockConnection {
                host,
                port,
                handler,
            }),
            None => Err(RedisError::from((
                ErrorKind::Io,
                "no mock handler installed",
                host,
            ))),
        }
    }
}

impl ConnectionLike for MockConnection {
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value> {
        let mut replies = (self.handler)(cmd, self.port)?;
        if replies.len() != 1 {
            panic!("mock handler returned {} replies for one command", replies.len());
        }
        Ok(replies.remove(0))
    }

    fn req_packed_commands(&mut self, cmd: &[u8], count: usize) -> RedisResult<Vec<Value>> {
        let replies = (self.handler)(cmd, self.port)?;
        assert_eq!(replies.len(), count, "mock reply count mismatch");
        Ok(replies)
    }

    fn check_connection(&mut self) -> bool {
        true
    }

    fn is_open(&self) -> bool {
        true
    }
}

/// Encodes a value back into its wire form, for round-trip tests.
pub fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Nil => out.extend_from_slice(b"$-1\r\n"),
        Value::Int(i) => {
            out.push(b':');
            out.extend_from_slice(i.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Value::BulkString(data) => {
            out.push(b'$');
            out.extend_from_slice(data.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        Value::SimpleString(s) => {
            out.push(b'+');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Value::Okay => out.extend_from_slice(b"+OK\r\n"),
        Value::Array(items) => {
            out.push(b'*');
            out.extend_from_slice(items.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            for item in items {
                encode_value(item, out);
            }
        }
        Value::ServerError(err) => {
            out.push(b'-');
            out.extend_from_slice(err.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}

/// A reply helper for handlers.
pub fn bulk(data: &str) -> Value {
    Value::BulkString(data.as_bytes().to_vec())
}
