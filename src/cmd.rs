use std::{fmt, io};

use crate::response::ReplyParser;
use crate::types::{RedisWrite, ToRedisArgs};

/// A single command description.
///
/// A command acts as a builder interface to creating encoded redis
/// requests.  This allows you to easily assemble a packed command by
/// chaining arguments together.  Arguments are stored packed in a single
/// buffer; routing keys and the reply post-processor ride along for the
/// dispatcher.
///
/// ```rust
/// redlink::cmd("SET").key("my_key").arg(42);
/// ```
#[derive(Clone)]
pub struct Cmd {
    data: Vec<u8>,
    // each entry marks the end offset of one argument inside `data`
    args: Vec<usize>,
    keys: Vec<Vec<u8>>,
    parser: ReplyParser,
}

fn countdigits(mut v: usize) -> usize {
    let mut result = 1;
    loop {
        if v < 10 {
            return result;
        }
        if v < 100 {
            return result + 1;
        }
        if v < 1000 {
            return result + 2;
        }
        if v < 10000 {
            return result + 3;
        }

        v /= 10000;
        result += 4;
    }
}

#[inline]
fn bulklen(len: usize) -> usize {
    1 + countdigits(len) + 2 + len + 2
}

fn args_len<'a, I>(args: I) -> usize
where
    I: IntoIterator<Item = &'a [u8]> + ExactSizeIterator,
{
    let mut totlen = 1 + countdigits(args.len()) + 2;
    for item in args {
        totlen += bulklen(item.len());
    }
    totlen
}

fn cmd_len(cmd: &Cmd) -> usize {
    args_len(cmd.args_iter())
}

fn write_command<'a, I>(out: &mut (impl ?Sized + io::Write), args: I) -> io::Result<()>
where
    I: IntoIterator<Item = &'a [u8]> + ExactSizeIterator,
{
    let mut buf = ::itoa::Buffer::new();

    out.write_all(b"*")?;
    out.write_all(buf.format(args.len()).as_bytes())?;
    out.write_all(b"\r\n")?;

    for item in args {
        out.write_all(b"$")?;
        out.write_all(buf.format(item.len()).as_bytes())?;
        out.write_all(b"\r\n")?;
        out.write_all(item)?;
        out.write_all(b"\r\n")?;
    }
    Ok(())
}

impl RedisWrite for Cmd {
    fn write_arg(&mut self, arg: &[u8]) {
        self.data.extend_from_slice(arg);
        self.args.push(self.data.len());
    }

    fn write_arg_fmt(&mut self, arg: impl fmt::Display) {
        use std::io::Write;
        write!(self.data, "{arg}").unwrap();
        self.args.push(self.data.len());
    }
}

impl Default for Cmd {
    fn default() -> Cmd {
        Cmd::new()
    }
}

impl Cmd {
    /// Creates a new empty command.
    pub fn new() -> Cmd {
        Cmd {
            data: vec![],
            args: vec![],
            keys: vec![],
            parser: ReplyParser::Identity,
        }
    }

    /// Creates a new empty command, with at least the requested capacity.
    pub fn with_capacity(arg_count: usize, size_of_data: usize) -> Cmd {
        Cmd {
            data: Vec::with_capacity(size_of_data),
            args: Vec::with_capacity(arg_count),
            keys: vec![],
            parser: ReplyParser::Identity,
        }
    }

    /// Appends an argument to the command.  The argument passed must
    /// be a type that implements `ToRedisArgs`.  Most primitive types as
    /// well as slices of primitive types implement it; a slice splices
    /// its elements into the command in order.
    #[inline]
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Cmd {
        arg.write_redis_args(self);
        self
    }

    /// Appends an argument that is also a routing key.  In cluster mode
    /// the first key recorded this way decides which node the command is
    /// sent to.
    #[inline]
    pub fn key<T: ToRedisArgs>(&mut self, key: T) -> &mut Cmd {
        for k in key.to_redis_args() {
            self.keys.push(k.clone());
            self.write_arg(&k);
        }
        self
    }

    pub(crate) fn add_routing_key(&mut self, key: Vec<u8>) {
        self.keys.push(key);
    }

    /// The routing keys recorded on this command.
    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }

    /// The first routing key, which governs slot placement.
    pub fn first_key(&self) -> Option<&[u8]> {
        self.keys.first().map(|k| &k[..])
    }

    /// Selects the post-processor applied to this command's reply.
    pub fn set_parser(&mut self, parser: ReplyParser) -> &mut Cmd {
        self.parser = parser;
        self
    }

    pub(crate) fn parser(&self) -> ReplyParser {
        self.parser
    }

    /// Returns the packed command as a byte vector.
    #[inline]
    pub fn get_packed_command(&self) -> Vec<u8> {
        let mut cmd = Vec::new();
        self.write_packed_command(&mut cmd);
        cmd
    }

    pub(crate) fn write_packed_command(&self, cmd: &mut Vec<u8>) {
        cmd.reserve(cmd_len(self));
        write_command(cmd, self.args_iter()).unwrap()
    }

    /// Returns an iterator over the arguments in this command (including
    /// the command name itself).
    pub fn args_iter(&self) -> impl Clone + ExactSizeIterator<Item = &[u8]> {
        let mut prev = 0;
        self.args.iter().map(move |&end| {
            let arg = &self.data[prev..end];
            prev = end;
            arg
        })
    }

    /// Returns the number of arguments in this command.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    // Get a reference to the argument at `idx`
    pub(crate) fn arg_idx(&self, idx: usize) -> Option<&[u8]> {
        if idx >= self.args.len() {
            return None;
        }
        let start = if idx == 0 { 0 } else { self.args[idx - 1] };
        let end = self.args[idx];
        Some(&self.data[start..end])
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for arg in self.args_iter() {
            match std::str::from_utf8(arg) {
                Ok(s) => list.entry(&s),
                Err(_) => list.entry(&arg),
            };
        }
        list.finish()
    }
}

/// Shortcut function to creating a command with a single argument.
///
/// The first argument of a redis command is always the name of the command
/// which needs to be a string.  This is the recommended way to start a
/// command.
///
/// ```rust
/// redlink::cmd("PING");
/// ```
pub fn cmd(name: &str) -> Cmd {
    let mut rv = Cmd::new();
    rv.arg(name);
    rv
}

/// Packs a bunch of byte strings into a single wire request.
///
/// ```rust
/// let cmd = redlink::pack_command(&[b"SET".to_vec(), b"my_key".to_vec(), b"42".to_vec()]);
/// assert_eq!(cmd, b"*3\r\n$3\r\nSET\r\n$6\r\nmy_key\r\n$2\r\n42\r\n".to_vec());
/// ```
pub fn pack_command(args: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.reserve(args_len(args.iter().map(|x| &x[..])));
    write_command(&mut out, args.iter().map(|x| &x[..])).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_multi_bulk() {
        let mut c = cmd("SET");
        c.key("foo").arg(42);
        assert_eq!(
            c.get_packed_command(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$2\r\n42\r\n".to_vec()
        );
    }

    #[test]
    fn binary_safe_args() {
        let mut c = cmd("SET");
        c.key("k").arg(b"a\r\nb\0c".to_vec());
        assert_eq!(
            c.get_packed_command(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$7\r\na\r\nb\0c\r\n".to_vec()
        );
    }

    #[test]
    fn records_routing_keys() {
        let mut c = cmd("GET");
        c.key("{user1000}.following");
        assert_eq!(c.first_key(), Some(&b"{user1000}.following"[..]));
        assert_eq!(c.arg_idx(0), Some(&b"GET"[..]));
        assert_eq!(c.arg_idx(1), Some(&b"{user1000}.following"[..]));
        assert_eq!(c.arg_idx(2), None);
    }

    #[test]
    fn arg_splicing_flattens_lists() {
        let mut c = cmd("DEL");
        c.arg(&["a", "b", "c"][..]);
        assert_eq!(c.arg_count(), 4);
        assert_eq!(c.arg_idx(3), Some(&b"c"[..]));
    }

    #[test]
    fn pack_command_round_trip() {
        let packed = pack_command(&[b"PING".to_vec()]);
        assert_eq!(packed, b"*1\r\n$4\r\nPING\r\n");
    }
}
