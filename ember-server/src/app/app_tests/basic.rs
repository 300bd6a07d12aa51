use super::*;

#[rstest]
fn resp_connection_executes_set_then_get() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let set_outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
    )
    .expect("SET command should execute");
    let expected_set = vec![b"+OK\r\n".to_vec()];
    assert_that!(&set_outcome.responses, eq(&expected_set));

    let get_outcome =
        ingress_connection_bytes(&mut app, &mut connection, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .expect("GET command should execute");
    let expected_get = vec![b"$3\r\nbar\r\n".to_vec()];
    assert_that!(&get_outcome.responses, eq(&expected_get));
}

#[rstest]
fn get_before_any_set_returns_null_bulk() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"GET", b"missing"]),
    )
    .expect("GET command should execute");
    assert_that!(&outcome.responses, eq(&vec![b"$-1\r\n".to_vec()]));
}

#[rstest]
fn lowercase_command_names_are_recognized() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let set_outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"set", b"foo", b"bar"]),
    )
    .expect("lowercase SET should execute");
    assert_that!(&set_outcome.responses, eq(&vec![b"+OK\r\n".to_vec()]));

    let get_outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"get", b"foo"]),
    )
    .expect("lowercase GET should execute");
    assert_that!(&get_outcome.responses, eq(&vec![b"$3\r\nbar\r\n".to_vec()]));
}

#[rstest]
fn partial_frame_is_held_until_completed() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let first_half = ingress_connection_bytes(
        &mut app,
        &mut connection,
        b"*3\r\n$3\r\nSET\r\n$3\r\nfoo",
    )
    .expect("incomplete frame should be buffered");
    assert_that!(first_half.responses.is_empty(), eq(true));

    let second_half =
        ingress_connection_bytes(&mut app, &mut connection, b"\r\n$3\r\nbar\r\n")
            .expect("completed frame should execute");
    assert_that!(&second_half.responses, eq(&vec![b"+OK\r\n".to_vec()]));
}

#[rstest]
fn pipelined_commands_reply_in_arrival_order() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let mut pipeline = encode_command_frame(&[b"SET", b"foo", b"bar"]);
    pipeline.extend_from_slice(&encode_command_frame(&[b"GET", b"foo"]));
    pipeline.extend_from_slice(&encode_command_frame(&[b"PING"]));

    let outcome = ingress_connection_bytes(&mut app, &mut connection, &pipeline)
        .expect("pipelined commands should execute");
    let expected = vec![
        b"+OK\r\n".to_vec(),
        b"$3\r\nbar\r\n".to_vec(),
        b"+PONG\r\n".to_vec(),
    ];
    assert_that!(&outcome.responses, eq(&expected));
}

#[rstest]
fn unrecognized_command_replies_ok_for_compatibility() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let outcome = ingress_connection_bytes(
        &mut app,
        &mut connection,
        &encode_command_frame(&[b"CLIENT", b"SETNAME", b"tester"]),
    )
    .expect("unrecognized command should still be answered");
    assert_that!(&outcome.responses, eq(&vec![b"+OK\r\n".to_vec()]));
    assert_that!(outcome.propagate_frames.is_empty(), eq(true));
}

#[rstest]
fn inline_input_is_rejected_as_a_protocol_error() {
    let mut app = ServerApp::new(RuntimeConfig::default());
    let mut connection = ServerConnection::new();

    let Err(error) = ingress_connection_bytes(&mut app, &mut connection, b"PING\r\n") else {
        panic!("bytes outside an array frame must be rejected");
    };
    assert_that!(matches!(error, EmberError::Protocol(_)), eq(true));
}
