use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use redlink::{
    cmd, pipe, ClusterConnection, ClusterParams, Connect, ErrorKind, Reply, ReplyParser,
    ServerError, ServerErrorKind, SlotRange, Value,
};

mod support;
use support::{bulk, install_handler, MockConnection};

fn full_table(endpoint: &str) -> Vec<SlotRange> {
    vec![SlotRange {
        start: 0,
        end: 16383,
        endpoint: endpoint.to_string(),
    }]
}

fn slots_reply(entries: &[(u16, u16, &str, u16)]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|(start, end, host, port)| {
                Value::Array(vec![
                    Value::Int(*start as i64),
                    Value::Int(*end as i64),
                    Value::Array(vec![bulk(host), Value::Int(*port as i64)]),
                ])
            })
            .collect(),
    )
}

fn get_foo() -> Vec<u8> {
    let mut command = cmd("GET");
    command.key("foo");
    command.get_packed_command()
}

// "foo" hashes to slot 12182, "bar" to slot 5061.

#[test]
fn moved_updates_only_the_redirected_slot() {
    let a_hits = Arc::new(AtomicUsize::new(0));
    let b_hits = Arc::new(AtomicUsize::new(0));

    {
        let a_hits = a_hits.clone();
        install_handler("moved-a", move |request, _port| {
            a_hits.fetch_add(1, Ordering::SeqCst);
            if request == get_foo() {
                Ok(vec![Value::ServerError(ServerError::from_payload(
                    "MOVED 12182 moved-b:6380",
                ))])
            } else {
                Ok(vec![bulk("from-a")])
            }
        });
    }
    {
        let b_hits = b_hits.clone();
        install_handler("moved-b", move |_request, _port| {
            b_hits.fetch_add(1, Ordering::SeqCst);
            Ok(vec![bulk("bar")])
        });
    }

    let cluster: ClusterConnection<MockConnection> =
        ClusterConnection::new(ClusterParams::new("moved-a:6379"), &full_table("moved-a:6379"));

    let mut command = cmd("GET");
    command.key("foo");
    let value = cluster.request(&command).unwrap();
    assert_eq!(value, Value::BulkString(b"bar".to_vec()));

    // only the redirected slot changed hands
    assert_eq!(
        cluster.endpoint_for_slot(12182).as_deref(),
        Some("moved-b:6380")
    );
    assert_eq!(
        cluster.endpoint_for_slot(0).as_deref(),
        Some("moved-a:6379")
    );

    // an unrelated slot still talks to the old node
    let mut other = cmd("GET");
    other.key("bar");
    let value = cluster.request(&other).unwrap();
    assert_eq!(value, Value::BulkString(b"from-a".to_vec()));

    assert_eq!(a_hits.load(Ordering::SeqCst), 2);
    assert_eq!(b_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn ask_redirects_once_without_touching_the_slot_table() {
    let sequence = Arc::new(Mutex::new(Vec::<String>::new()));

    install_handler("ask-a", |request, _port| {
        if request == get_foo() {
            Ok(vec![Value::ServerError(ServerError::from_payload(
                "ASK 12182 ask-b:6381",
            ))])
        } else {
            Ok(vec![Value::Okay])
        }
    });
    {
        let sequence = sequence.clone();
        install_handler("ask-b", move |request, _port| {
            if request == b"*1\r\n$6\r\nASKING\r\n" {
                sequence.lock().unwrap().push("ASKING".to_string());
                Ok(vec![Value::Okay])
            } else {
                sequence.lock().unwrap().push("GET".to_string());
                Ok(vec![bulk("asked")])
            }
        });
    }

    let cluster: ClusterConnection<MockConnection> =
        ClusterConnection::new(ClusterParams::new("ask-a:6379"), &full_table("ask-a:6379"));

    let mut command = cmd("GET");
    command.key("foo");
    let value = cluster.request(&command).unwrap();
    assert_eq!(value, Value::BulkString(b"asked".to_vec()));

    // ASKING preceded the replayed command on the temporary connection
    assert_eq!(*sequence.lock().unwrap(), vec!["ASKING", "GET"]);

    // the migration in progress leaves the table alone
    assert_eq!(
        cluster.endpoint_for_slot(12182).as_deref(),
        Some("ask-a:6379")
    );

    // the next request for the key starts at the original node again
    let value = cluster.request(&command).unwrap();
    assert_eq!(value, Value::BulkString(b"asked".to_vec()));
    assert_eq!(
        *sequence.lock().unwrap(),
        vec!["ASKING", "GET", "ASKING", "GET"]
    );
}

#[test]
fn moved_with_refresh_replaces_the_whole_table() {
    install_handler("refresh-a", |request, _port| {
        if request == get_foo() {
            Ok(vec![Value::ServerError(ServerError::from_payload(
                "MOVED 12182 refresh-b:6380",
            ))])
        } else {
            // CLUSTER SLOTS during the refresh
            Ok(vec![slots_reply(&[(0, 16383, "refresh-b", 6380)])])
        }
    });
    install_handler("refresh-b", |_request, _port| Ok(vec![bulk("bar")]));

    let params = ClusterParams::new("refresh-a:6379").init_on_error(true);
    let cluster: ClusterConnection<MockConnection> =
        ClusterConnection::new(params, &full_table("refresh-a:6379"));

    let mut command = cmd("GET");
    command.key("foo");
    let value = cluster.request(&command).unwrap();
    assert_eq!(value, Value::BulkString(b"bar".to_vec()));

    // the refresh rewrote every slot, not just the redirected one
    assert_eq!(
        cluster.endpoint_for_slot(0).as_deref(),
        Some("refresh-b:6380")
    );
    assert_eq!(
        cluster.endpoint_for_slot(16383).as_deref(),
        Some("refresh-b:6380")
    );
}

#[test]
fn redirect_loops_are_bounded() {
    install_handler("loop-a", |_request, _port| {
        Ok(vec![Value::ServerError(ServerError::from_payload(
            "MOVED 12182 loop-b:6379",
        ))])
    });
    install_handler("loop-b", |_request, _port| {
        Ok(vec![Value::ServerError(ServerError::from_payload(
            "MOVED 12182 loop-a:6379",
        ))])
    });

    let cluster: ClusterConnection<MockConnection> =
        ClusterConnection::new(ClusterParams::new("loop-a:6379"), &full_table("loop-a:6379"));

    let mut command = cmd("GET");
    command.key("foo");
    let err = cluster.request(&command).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server(ServerErrorKind::Moved));
}

#[test]
fn non_redirect_errors_are_raised() {
    install_handler("err-a", |_request, _port| {
        Ok(vec![Value::ServerError(ServerError::from_payload(
            "CLUSTERDOWN The cluster is down",
        ))])
    });

    let cluster: ClusterConnection<MockConnection> =
        ClusterConnection::new(ClusterParams::new("err-a:6379"), &full_table("err-a:6379"));

    let err = cluster.request(&cmd("PING")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server(ServerErrorKind::ClusterDown));
}

#[test]
fn unmapped_slots_fall_back_to_the_default_endpoint() {
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = hits.clone();
        install_handler("fallback-a", move |_request, _port| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Value::Okay])
        });
    }

    let cluster: ClusterConnection<MockConnection> =
        ClusterConnection::new(ClusterParams::new("fallback-a:6379"), &[]);

    let mut command = cmd("GET");
    command.key("foo");
    assert_eq!(cluster.request(&command).unwrap(), Value::Okay);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn pipelines_route_by_first_key_and_align_results() {
    let b_hits = Arc::new(AtomicUsize::new(0));
    install_handler("pipe-a", |_request, _port| {
        panic!("pipeline was routed to the wrong node")
    });
    {
        let b_hits = b_hits.clone();
        install_handler("pipe-b", move |_request, _port| {
            b_hits.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                Value::Okay,
                Value::Int(2),
                Value::ServerError(ServerError::from_payload(
                    "WRONGTYPE Operation against a key holding the wrong kind of value",
                )),
            ])
        });
    }

    // "foo" lives in the upper half of the keyspace, served by pipe-b
    let table = vec![
        SlotRange {
            start: 0,
            end: 8191,
            endpoint: "pipe-a:6379".to_string(),
        },
        SlotRange {
            start: 8192,
            end: 16383,
            endpoint: "pipe-b:6380".to_string(),
        },
    ];
    let cluster: ClusterConnection<MockConnection> =
        ClusterConnection::new(ClusterParams::new("pipe-a:6379"), &table);

    let mut batch = pipe();
    batch.cmd("SET").key("foo").arg(1);
    {
        let mut incr = cmd("INCR");
        incr.key("foo").set_parser(ReplyParser::Integer);
        batch.add_command(incr);
    }
    batch.cmd("LPUSH").key("foo").arg("x");

    let responses = cluster.execute_pipeline(&batch).unwrap();
    let results = batch.annotate_responses(responses);

    assert_eq!(results.len(), batch.len());
    assert_eq!(results[0], Ok(Reply::Value(Value::Okay)));
    assert_eq!(results[1], Ok(Reply::Int(2)));
    match &results[2] {
        Err(err) => assert_eq!(err.kind(), ErrorKind::Server(ServerErrorKind::WrongType)),
        other => panic!("expected the type error in place, got {other:?}"),
    }
    assert_eq!(b_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn mock_connections_serve_single_commands() {
    install_handler("plain-a", |request, _port| {
        assert_eq!(request, &cmd("PING").get_packed_command()[..]);
        Ok(vec![Value::SimpleString("PONG".to_string())])
    });

    let mut conn = MockConnection::connect("plain-a:6379", None).unwrap();
    use redlink::ConnectionLike;
    let value = conn.req_command(&cmd("PING")).unwrap();
    assert_eq!(value, Value::SimpleString("PONG".to_string()));
}
