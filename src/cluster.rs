//! Cluster support: the slot map and the redirect-following dispatcher.
//!
//! A [`ClusterConnection`] owns one lazily created connection per known
//! endpoint and a slot table mapping each slot to the endpoint serving
//! it.  Requests are routed by the first key of the command; `MOVED`
//! replies update the table and retry, `ASK` replies redirect exactly
//! once over a temporary connection.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::{debug, trace, warn};
use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::cluster_routing::slot_of;
use crate::cmd::{cmd, Cmd};
use crate::connection::{parse_endpoint, Connect, Connection, ConnectionInfo, ConnectionLike};
use crate::errors::{RedisResult, ServerErrorKind};
use crate::pipeline::Pipeline;
use crate::response::{parse_cluster_slots, SlotRange};
use crate::types::Value;

/// Redirections followed for one command before the last error is
/// surfaced.  Keeps a migrating cluster from bouncing a request forever.
const DEFAULT_REDIRECT_LIMIT: usize = 5;

/// Connection parameters shared by every node connection of a cluster.
#[derive(Clone, Debug)]
pub struct ClusterParams {
    default_endpoint: String,
    password: Option<String>,
    timeout: Option<Duration>,
    init_on_error: bool,
}

impl ClusterParams {
    /// Creates parameters around the default endpoint, which also serves
    /// as the fallback for slots without coverage.
    pub fn new(default_endpoint: impl Into<String>) -> ClusterParams {
        ClusterParams {
            default_endpoint: default_endpoint.into(),
            password: None,
            timeout: None,
            init_on_error: false,
        }
    }

    /// Sets the password every node connection authenticates with.
    pub fn password(mut self, password: Option<String>) -> ClusterParams {
        self.password = password;
        self
    }

    /// Sets the socket timeout applied to every node connection.
    pub fn timeout(mut self, timeout: Option<Duration>) -> ClusterParams {
        self.timeout = timeout;
        self
    }

    /// When set, a `MOVED` reply refreshes the whole slot table instead
    /// of patching the single redirected slot.
    pub fn init_on_error(mut self, value: bool) -> ClusterParams {
        self.init_on_error = value;
        self
    }

    fn connection_info(&self, endpoint: &str) -> RedisResult<ConnectionInfo> {
        let mut info = parse_endpoint(endpoint)?;
        if info.redis.password.is_none() {
            info.redis.password = self.password.clone();
        }
        Ok(info)
    }
}

/// A connection to a cluster, routing commands to the node owning their
/// slot.
pub struct ClusterConnection<C = Connection> {
    params: ClusterParams,
    slots: RefCell<HashMap<u16, String>>,
    connections: RefCell<HashMap<String, C>>,
}

impl<C> ClusterConnection<C>
where
    C: ConnectionLike + Connect,
{
    /// Creates a cluster connection seeded with the given slot table.
    /// No node is contacted until the first request or an explicit
    /// [`refresh_slots`](Self::refresh_slots).
    pub fn new(params: ClusterParams, initial: &[SlotRange]) -> ClusterConnection<C> {
        let connection = ClusterConnection {
            params,
            slots: RefCell::new(HashMap::new()),
            connections: RefCell::new(HashMap::new()),
        };
        connection.set_clusters(initial);
        connection
    }

    /// Replaces the slot table.
    pub fn set_clusters(&self, ranges: &[SlotRange]) {
        let mut slots = self.slots.borrow_mut();
        slots.clear();
        for range in ranges {
            for slot in range.start..=range.end {
                slots.insert(slot, range.endpoint.clone());
            }
        }
    }

    /// Points a single slot at an endpoint, leaving the rest of the
    /// table untouched.
    pub fn add_cluster(&self, slot: u16, endpoint: &str) {
        self.slots
            .borrow_mut()
            .insert(slot, endpoint.to_string());
    }

    /// The endpoint currently serving a slot, if the table covers it.
    pub fn endpoint_for_slot(&self, slot: u16) -> Option<String> {
        self.slots.borrow().get(&slot).cloned()
    }

    fn addr_for_key(&self, key: Option<&[u8]>) -> String {
        key.map(slot_of)
            .and_then(|slot| self.endpoint_for_slot(slot))
            .unwrap_or_else(|| self.params.default_endpoint.clone())
    }

    fn connect(&self, endpoint: &str) -> RedisResult<C> {
        let info = self.params.connection_info(endpoint)?;
        C::connect(info, self.params.timeout)
    }

    fn get_connection_by_addr<'a>(
        &self,
        connections: &'a mut HashMap<String, C>,
        addr: &str,
    ) -> RedisResult<&'a mut C> {
        if connections.contains_key(addr) {
            Ok(connections.get_mut(addr).unwrap())
        } else {
            let conn = self.connect(addr)?;
            Ok(connections.entry(addr.to_string()).or_insert(conn))
        }
    }

    /// Queries `CLUSTER SLOTS` and replaces the slot table with the
    /// answer.  Connections to endpoints that disappeared from the table
    /// or stopped answering are dropped.
    pub fn refresh_slots(&self) -> RedisResult<()> {
        let ranges = self.fetch_slot_ranges()?;
        trace!("slot table: {ranges:?}");
        self.set_clusters(&ranges);

        let slots = self.slots.borrow();
        let live: HashSet<&String> = slots.values().collect();
        let mut connections = self.connections.borrow_mut();
        connections.retain(|addr, conn| {
            (*addr == self.params.default_endpoint || live.contains(addr))
                && conn.check_connection()
        });
        Ok(())
    }

    fn fetch_slot_ranges(&self) -> RedisResult<Vec<SlotRange>> {
        let mut slots_cmd = cmd("CLUSTER");
        slots_cmd.arg("SLOTS");
        let packed = slots_cmd.get_packed_command();

        let mut connections = self.connections.borrow_mut();
        let mut addrs: Vec<String> = connections.keys().cloned().collect();
        addrs.shuffle(&mut thread_rng());

        for addr in addrs {
            if let Some(conn) = connections.get_mut(&addr) {
                match conn
                    .req_packed_command(&packed)
                    .and_then(Value::extract_error)
                    .and_then(|v| parse_cluster_slots(&v))
                {
                    Ok(ranges) => return Ok(ranges),
                    Err(err) => warn!("failed to fetch slot table from {addr}: {err}"),
                }
            }
        }

        let default = self.params.default_endpoint.clone();
        let conn = self.get_connection_by_addr(&mut connections, &default)?;
        conn.req_packed_command(&packed)
            .and_then(Value::extract_error)
            .and_then(|v| parse_cluster_slots(&v))
    }

    /// Routes one command to the node owning its first key, following
    /// redirections.  Non-redirect error replies are raised; the caller
    /// receives a plain value.
    pub fn request(&self, command: &Cmd) -> RedisResult<Value> {
        let packed = command.get_packed_command();
        let mut redirected: Option<String> = None;
        let mut redirects = 0;

        loop {
            let addr = match redirected.take() {
                Some(addr) => addr,
                None => self.addr_for_key(command.first_key()),
            };

            let value = {
                let mut connections = self.connections.borrow_mut();
                let conn = self.get_connection_by_addr(&mut connections, &addr)?;
                conn.req_packed_command(&packed)?
            };

            let err = match value {
                Value::ServerError(err)
                    if matches!(
                        err.kind(),
                        Some(ServerErrorKind::Moved) | Some(ServerErrorKind::Ask)
                    ) =>
                {
                    err
                }
                other => return other.extract_error(),
            };

            redirects += 1;
            if redirects > DEFAULT_REDIRECT_LIMIT {
                return Err(err.into());
            }

            let (slot, endpoint) = match err.redirect() {
                Some((slot, endpoint)) => (slot, endpoint.to_string()),
                None => return Err(err.into()),
            };

            match err.kind() {
                Some(ServerErrorKind::Moved) => {
                    debug!("MOVED: slot {slot} now at {endpoint}");
                    if self.params.init_on_error {
                        self.refresh_slots()?;
                    } else {
                        self.add_cluster(slot, &endpoint);
                    }
                    redirected = Some(endpoint);
                }
                Some(ServerErrorKind::Ask) => {
                    debug!("ASK: slot {slot} migrating to {endpoint}");
                    // one-shot redirection over a connection scoped to
                    // this call; the slot table stays as it is
                    let mut tmp = self.connect(&endpoint)?;
                    tmp.req_packed_command(b"*1\r\n$6\r\nASKING\r\n")?;
                    return tmp.req_packed_command(&packed)?.extract_error();
                }
                _ => unreachable!("redirect filter only passes MOVED and ASK"),
            }
        }
    }

    /// Sends a recorded pipeline to the node owning the batch's first
    /// key and returns the raw replies in request order.
    pub fn execute_pipeline(&self, pipe: &Pipeline) -> RedisResult<Vec<Value>> {
        let addr = self.addr_for_key(pipe.first_key());
        let packed = pipe.get_packed_pipeline();
        let mut connections = self.connections.borrow_mut();
        let conn = self.get_connection_by_addr(&mut connections, &addr)?;
        conn.req_packed_commands(&packed, pipe.len())
    }

    /// True when every cached node connection is still open.
    pub fn is_open(&self) -> bool {
        let connections = self.connections.borrow();
        connections.values().all(|conn| conn.is_open())
    }
}
