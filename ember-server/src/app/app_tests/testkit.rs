use ember_common::config::{RuntimeConfig, UpstreamAddr};

pub(super) fn decode_resp_bulk_payload(frame: &[u8]) -> String {
    assert_eq!(frame.first(), Some(&b'$'));

    let Some(header_end) = frame.windows(2).position(|window| window == b"\r\n") else {
        panic!("bulk reply must contain a header terminator");
    };
    let header = std::str::from_utf8(&frame[1..header_end]).expect("header must be UTF-8");
    let payload_len = header
        .parse::<usize>()
        .expect("header must encode the payload length");

    let payload_start = header_end + 2;
    let payload = &frame[payload_start..payload_start + payload_len];
    String::from_utf8(payload.to_vec()).expect("payload must be UTF-8")
}

pub(super) fn replica_config(primary_port: u16) -> RuntimeConfig {
    RuntimeConfig {
        port: 6380,
        replica_of: Some(UpstreamAddr {
            host: "127.0.0.1".to_owned(),
            port: primary_port,
        }),
    }
}
