use super::common::{assert_error, station, Fixture, DATA_PORT, REPLY_PORT};

#[tokio::test]
async fn save_then_load_round_trips_payload_and_attributes() {
    let mut fx = Fixture::new().await;
    let st = station(10);
    fx.login(st).await;

    // SAVE: negotiate the bulk port.
    let port = fx.begin_save(st, "TEST", 5, 0x1900, 0x8023).await;
    assert_ne!(port, 0);
    assert_ne!(port, 0x99);

    // Stream the payload; the completion reports owner permissions and
    // a packed date.
    let replies = fx.send_port(st, port, b"HELLO").await;
    let done = replies.last().expect("save completion");
    assert_eq!(done.port, REPLY_PORT);
    assert_eq!(&done.data[..2], &[0, 0]);
    assert_eq!(done.data[2], 0x03, "owner read+write after save");

    assert_eq!(std::fs::read(fx.disc_path("TEST")).unwrap(), b"HELLO");

    // LOAD: prologue with the same attributes, the body on the data
    // port, then the epilogue.
    let mut packet = vec![REPLY_PORT, 0x02, DATA_PORT, 0, 0];
    packet.extend_from_slice(b"TEST");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;

    let prologue = &replies[0];
    assert_eq!(prologue.port, REPLY_PORT);
    assert_eq!(&prologue.data[..2], &[0, 0]);
    assert_eq!(u32::from_le_bytes(prologue.data[2..6].try_into().unwrap()), 0x1900);
    assert_eq!(u32::from_le_bytes(prologue.data[6..10].try_into().unwrap()), 0x8023);
    let length =
        u32::from_le_bytes([prologue.data[10], prologue.data[11], prologue.data[12], 0]);
    assert_eq!(length, 5);

    let body = &replies[1];
    assert_eq!(body.port, DATA_PORT);
    assert_eq!(body.data, b"HELLO");

    let epilogue = replies.last().unwrap();
    assert_eq!(epilogue.port, REPLY_PORT);
    assert_eq!(epilogue.data, vec![0, 0]);
}

#[tokio::test]
async fn zero_length_save_completes_immediately() {
    let mut fx = Fixture::new().await;
    let st = station(10);
    fx.login(st).await;

    let mut packet = vec![REPLY_PORT, 0x01, DATA_PORT, 0, 0];
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.extend_from_slice(&[0, 0, 0]);
    packet.extend_from_slice(b"EMPTY");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;

    assert_eq!(replies.len(), 2, "begin and completion in one exchange");
    assert_eq!(replies[1].data[2], 0x03);
    assert_eq!(std::fs::read(fx.disc_path("EMPTY")).unwrap(), b"");
    assert_eq!(fx.server.bulk().active(), 0);
}

#[tokio::test]
async fn load_of_missing_file_reports_not_found() {
    let mut fx = Fixture::new().await;
    let st = station(10);
    fx.login(st).await;

    let mut packet = vec![REPLY_PORT, 0x02, DATA_PORT, 0, 0];
    packet.extend_from_slice(b"GHOST");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    assert_error(&replies, 0xd6);
}

#[tokio::test]
async fn chunked_save_acknowledges_each_chunk() {
    let mut fx = Fixture::new().await;
    let st = station(10);
    fx.login(st).await;

    let port = fx.begin_save(st, "TWOPART", 10, 0, 0).await;

    let replies = fx.send_port(st, port, b"FIRST").await;
    let ack = replies.first().expect("chunk ack");
    assert_eq!(ack.port, DATA_PORT, "ack arrives on the ack port");
    assert_eq!(ack.data, vec![0]);

    let replies = fx.send_port(st, port, b"LATER").await;
    let done = replies.last().expect("completion");
    assert_eq!(done.port, REPLY_PORT);
    assert_eq!(&done.data[..2], &[0, 0]);
    assert_eq!(std::fs::read(fx.disc_path("TWOPART")).unwrap(), b"FIRSTLATER");
    assert_eq!(fx.server.bulk().active(), 0);
}

#[tokio::test]
async fn save_refuses_a_locked_file() {
    let mut fx = Fixture::new().await;
    let st = station(10);
    fx.login(st).await;
    fx.save(st, "KEEP", b"precious").await;

    let replies = fx.request(st, super::common::oscli(0, "ACCESS KEEP LWR/R")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);

    let mut packet = vec![REPLY_PORT, 0x01, DATA_PORT, 0, 0];
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.extend_from_slice(&[5, 0, 0]);
    packet.extend_from_slice(b"KEEP");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    assert_error(&replies, 0xc3);
    assert_eq!(std::fs::read(fx.disc_path("KEEP")).unwrap(), b"precious");
}
