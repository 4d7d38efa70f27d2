use crate::cmd::{cmd, Cmd};
use crate::connection::ConnectionLike;
use crate::errors::RedisResult;
use crate::response::Reply;
use crate::types::{ToRedisArgs, Value};

/// Represents a command pipeline: a recorded sequence of commands sent
/// as one batch.
///
/// A pipeline allows you to send multiple commands in one go to the
/// server.  API wise it's very similar to just using a command but it
/// allows multiple commands to be chained.
///
/// ```rust
/// let mut pipe = redlink::pipe();
/// pipe.cmd("SET").key("key_1").arg(42)
///     .cmd("GET").key("key_1");
/// ```
///
/// Replies come back in request order; an error reply occupies its
/// position in the result list instead of aborting the batch.
#[derive(Clone, Default)]
pub struct Pipeline {
    commands: Vec<Cmd>,
}

impl Pipeline {
    /// Creates an empty pipeline.  For consistency with the `cmd` api a
    /// `pipe` function is provided as alias.
    pub fn new() -> Pipeline {
        Self::with_capacity(0)
    }

    /// Creates an empty pipeline with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Pipeline {
        Pipeline {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Appends an already assembled command to the pipeline.
    #[inline]
    pub fn add_command(&mut self, cmd: Cmd) -> &mut Pipeline {
        self.commands.push(cmd);
        self
    }

    /// Starts a new command.  Functions such as `arg` then become
    /// available to add more arguments to that command.
    #[inline]
    pub fn cmd(&mut self, name: &str) -> &mut Pipeline {
        self.add_command(cmd(name))
    }

    /// Adds an argument to the last started command.  This works similar
    /// to the `arg` method of the `Cmd` object.
    ///
    /// Note that this function panics if executed on an empty pipeline.
    #[inline]
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Pipeline {
        {
            let cmd = self.get_last_command();
            cmd.arg(arg);
        }
        self
    }

    /// Adds a routing key to the last started command, like the `key`
    /// method of the `Cmd` object.
    ///
    /// Note that this function panics if executed on an empty pipeline.
    #[inline]
    pub fn key<T: ToRedisArgs>(&mut self, key: T) -> &mut Pipeline {
        {
            let cmd = self.get_last_command();
            cmd.key(key);
        }
        self
    }

    /// Returns an iterator over all the commands currently in this
    /// pipeline.
    pub fn cmd_iter(&self) -> impl Iterator<Item = &Cmd> {
        self.commands.iter()
    }

    /// Returns the number of commands currently queued in the pipeline.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if the pipeline contains no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Clears the recorded commands so the pipeline can be reused.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    #[inline]
    fn get_last_command(&mut self) -> &mut Cmd {
        let idx = match self.commands.len() {
            0 => panic!("No command on stack"),
            x => x - 1,
        };
        &mut self.commands[idx]
    }

    /// The ordered first keys of the recorded commands, used for
    /// routing.
    pub fn keys(&self) -> Vec<&[u8]> {
        self.commands
            .iter()
            .filter_map(|cmd| cmd.first_key())
            .collect()
    }

    /// The key the whole batch is routed by.  Batches spanning several
    /// slots are the caller's responsibility.
    pub fn first_key(&self) -> Option<&[u8]> {
        self.commands.iter().find_map(|cmd| cmd.first_key())
    }

    /// Returns the concatenated wire form of all recorded commands.
    pub fn get_packed_pipeline(&self) -> Vec<u8> {
        let mut rv = vec![];
        for cmd in &self.commands {
            cmd.write_packed_command(&mut rv);
        }
        rv
    }

    /// Pairs raw replies with the recorded commands, running each
    /// command's reply parser.  Error replies take their position in the
    /// result list.
    pub fn annotate_responses(&self, responses: Vec<Value>) -> Vec<RedisResult<Reply>> {
        debug_assert_eq!(responses.len(), self.commands.len());
        self.commands
            .iter()
            .zip(responses)
            .map(|(cmd, value)| cmd.parser().apply(value.extract_error()?))
            .collect()
    }

    /// Executes the pipeline over a connection and fetches the per
    /// command results.  A transport failure aborts the whole batch; an
    /// error reply only claims its own slot.
    pub fn query(&self, con: &mut dyn ConnectionLike) -> RedisResult<Vec<RedisResult<Reply>>> {
        let responses = con.req_packed_commands(&self.get_packed_pipeline(), self.len())?;
        Ok(self.annotate_responses(responses))
    }
}

/// Shortcut for creating a new pipeline.
pub fn pipe() -> Pipeline {
    Pipeline::new()
}
