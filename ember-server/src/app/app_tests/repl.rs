use super::*;

#[rstest]
fn info_reports_master_role_with_exact_replication_body() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"INFO", b"replication"]),
    )
    .expect("INFO should execute");
    assert_that!(outcome.responses.len(), eq(1_usize));

    let body = decode_resp_bulk_payload(&outcome.responses[0]);
    let expected = format!(
        "# Replication\r\nrole:master\r\nmaster_replid:{}\r\nmaster_repl_offset:0\r\n",
        app.replication.master_replid
    );
    assert_that!(body, eq(&expected));
}

#[rstest]
fn info_on_a_replica_reports_slave_role_and_keeps_offset_at_zero() {
    let mut app = ServerApp::new(replica_config(6399));
    let mut connection = ServerConnection::new();

    // Processed stream bytes are tracked separately and never surface here.
    app.replication.note_stream_bytes(45);

    let outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"INFO", b"REPLICATION"]),
    )
    .expect("INFO should execute");
    assert_that!(outcome.responses.len(), eq(1_usize));

    let body = decode_resp_bulk_payload(&outcome.responses[0]);
    let expected = format!(
        "# Replication\r\nrole:slave\r\nmaster_replid:{}\r\nmaster_repl_offset:0\r\n",
        app.replication.master_replid
    );
    assert_that!(body, eq(&expected));
}

#[rstest]
#[case::bare(&[b"INFO".as_slice()])]
#[case::other_section(&[b"INFO".as_slice(), b"server".as_slice()])]
fn info_without_the_replication_section_is_acknowledged(#[case] command: &[&[u8]]) {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let outcome =
        ingress_connection_bytes(&mut app, &mut connection, &encode_command_frame(command))
            .expect("INFO should execute");
    assert_that!(&outcome.responses, eq(&vec![b"+OK\r\n".to_vec()]));
}

#[rstest]
fn replconf_listening_port_marks_the_connection_as_a_replica() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let registration = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"REPLCONF", b"listening-port", b"6380"]),
    )
    .expect("REPLCONF listening-port should execute");
    assert_that!(&registration.responses, eq(&vec![b"+OK\r\n".to_vec()]));
    assert_that!(registration.register_replica, eq(true));

    let capabilities = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"REPLCONF", b"capa", b"psync2"]),
    )
    .expect("REPLCONF capa should execute");
    assert_that!(&capabilities.responses, eq(&vec![b"+OK\r\n".to_vec()]));
    assert_that!(capabilities.register_replica, eq(false));
}

#[rstest]
fn replconf_listening_port_on_a_replica_does_not_register_a_fan_out_target() {
    let mut app = ServerApp::new(replica_config(6399));
    let mut connection = ServerConnection::new();

    let outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"REPLCONF", b"listening-port", b"6381"]),
    )
    .expect("REPLCONF listening-port should execute");
    assert_that!(&outcome.responses, eq(&vec![b"+OK\r\n".to_vec()]));
    assert_that!(outcome.register_replica, eq(false));
}

#[rstest]
fn psync_initial_sync_returns_header_then_snapshot() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"PSYNC", b"?", b"-1"]),
    )
    .expect("PSYNC should execute");
    assert_that!(outcome.responses.len(), eq(2_usize));

    let expected_header =
        format!("+FULLRESYNC {} 0\r\n", app.replication.master_replid).into_bytes();
    assert_that!(&outcome.responses[0], eq(&expected_header));

    // 5-byte length prefix plus the 88-byte payload, with no trailing CRLF.
    assert_that!(outcome.responses[1].starts_with(b"$88\r\n"), eq(true));
    assert_that!(outcome.responses[1].len(), eq(93_usize));
    assert_that!(outcome.responses[1].ends_with(b"\r\n"), eq(false));
}

#[rstest]
fn psync_with_a_concrete_position_degrades_to_ok() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let replid = app.replication.master_replid.clone();
    let outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"PSYNC", replid.as_bytes(), b"0"]),
    )
    .expect("PSYNC with a known position should execute");
    assert_that!(&outcome.responses, eq(&vec![b"+OK\r\n".to_vec()]));
}

#[rstest]
fn only_successful_writes_queue_for_fan_out() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let write_frame = encode_command_frame(&[b"SET", b"foo", b"bar"]);
    let write_outcome = ingress_connection_bytes(&mut app, &mut connection, &write_frame)
        .expect("SET should execute");
    assert_that!(&write_outcome.propagate_frames, eq(&vec![write_frame.clone()]));
    assert_that!(app.replication.replication_offset, eq(31_u64));

    let read_outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"GET", b"foo"]),
    )
    .expect("GET should execute");
    assert_that!(read_outcome.propagate_frames.is_empty(), eq(true));

    let ping_outcome =
        ingress_connection_bytes(&mut app, &mut connection, &encode_command_frame(&[b"PING"]))
            .expect("PING should execute");
    assert_that!(ping_outcome.propagate_frames.is_empty(), eq(true));

    let failed_write = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"SET", b"k", b"v", b"PX", b"soon"]),
    )
    .expect("malformed SET should produce an error reply, not a stream failure");
    assert_that!(
        &failed_write.responses,
        eq(&vec![
            b"-ERR value is not an integer or out of range\r\n".to_vec()
        ])
    );
    assert_that!(failed_write.propagate_frames.is_empty(), eq(true));
    assert_that!(app.replication.replication_offset, eq(31_u64));
}

#[rstest]
fn direct_writes_on_a_replica_apply_locally_without_advancing_the_offset() {
    let mut app = ServerApp::new(replica_config(6399));
    let mut connection = ServerConnection::new();

    let outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"SET", b"foo", b"bar"]),
    )
    .expect("SET should execute");
    assert_that!(&outcome.responses, eq(&vec![b"+OK\r\n".to_vec()]));
    assert_that!(outcome.propagate_frames.is_empty(), eq(true));
    assert_that!(app.replication.replication_offset, eq(0_u64));
    assert_that!(app.keyspace.fetch(b"foo"), some(eq(&b"bar"[..])));
}

#[rstest]
fn replicated_stream_applies_writes_and_acknowledges_processed_bytes() {
    let mut app = ServerApp::new(replica_config(6399));

    let set_frame = CommandFrame::new(
        "SET",
        vec![b"foo".to_vec(), b"bar".to_vec()],
    );
    let set_reply = app.execute_replicated_command(&set_frame, 31);
    assert_that!(set_reply, none());
    assert_that!(app.keyspace.fetch(b"foo"), some(eq(&b"bar"[..])));

    let getack_frame = CommandFrame::new(
        "REPLCONF",
        vec![b"GETACK".to_vec(), b"*".to_vec()],
    );
    let ack_reply = app.execute_replicated_command(&getack_frame, 37);
    let Some(ack_bytes) = ack_reply else {
        panic!("GETACK must produce an acknowledgement frame");
    };
    assert_that!(
        &ack_bytes,
        eq(&b"*3\r\n$8\r\nREPLCONF\r\n$3\r\nACK\r\n$2\r\n68\r\n".to_vec())
    );
    assert_that!(app.replication.processed_stream_bytes, eq(68_u64));
}

#[rstest]
fn replicated_ping_advances_the_acknowledged_position_silently() {
    let mut app = ServerApp::new(replica_config(6399));

    let ping_frame = CommandFrame::new("PING", Vec::new());
    let ping_reply = app.execute_replicated_command(&ping_frame, 14);
    assert_that!(ping_reply, none());

    let getack_frame = CommandFrame::new(
        "REPLCONF",
        vec![b"GETACK".to_vec(), b"*".to_vec()],
    );
    let Some(ack_bytes) = app.execute_replicated_command(&getack_frame, 37) else {
        panic!("GETACK must produce an acknowledgement frame");
    };
    assert_that!(
        &ack_bytes,
        eq(&b"*3\r\n$8\r\nREPLCONF\r\n$3\r\nACK\r\n$2\r\n51\r\n".to_vec())
    );
}
