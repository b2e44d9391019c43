use econet_fs::Station;

use super::common::{assert_error, station, Fixture, REPLY_PORT};

async fn get_byte(fx: &mut Fixture, st: Station, handle: u8) -> Vec<u8> {
    let replies = fx.request(st, vec![REPLY_PORT, 0x08, handle]).await;
    replies.first().expect("getbyte reply").data.clone()
}

async fn put_byte(fx: &mut Fixture, st: Station, handle: u8, ctrl: u8, byte: u8) -> Vec<u8> {
    fx.server
        .handle_packet(st, econet_fs::FILESERVER_PORT, ctrl, &[REPLY_PORT, 0x09, handle, byte])
        .await;
    fx.drain().first().expect("putbyte reply").data.clone()
}

#[tokio::test]
async fn get_byte_walks_to_eof_and_then_errors() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    fx.save(st, "THREE", b"ABC").await;
    let handle = fx.open(st, "THREE", true, true).await;

    assert_eq!(get_byte(&mut fx, st, handle).await, vec![0, 0, b'A', 0x00]);
    assert_eq!(get_byte(&mut fx, st, handle).await, vec![0, 0, b'B', 0x00]);
    assert_eq!(get_byte(&mut fx, st, handle).await, vec![0, 0, b'C', 0x80]);
    assert_eq!(get_byte(&mut fx, st, handle).await, vec![0, 0, 0xfe, 0xc0]);

    // The past-EOF latch turns the fifth attempt into a hard error.
    let fifth = get_byte(&mut fx, st, handle).await;
    assert_eq!(fifth[1], 0xdf);
}

#[tokio::test]
async fn get_byte_on_a_dead_handle_is_a_channel_error() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    let replies = fx.request(st, vec![REPLY_PORT, 0x08, 30]).await;
    assert_error(&replies, 0xde);
}

#[tokio::test]
async fn retransmitted_put_byte_never_advances_the_cursor() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    let handle = fx.open(st, "SEQ", false, false).await;

    // Fresh handles treat the first write as new whatever its control
    // bit says.
    assert_eq!(put_byte(&mut fx, st, handle, 0x80, b'X').await, vec![0, 0]);
    // Same low control bit: a retransmission, acknowledged but dropped.
    assert_eq!(put_byte(&mut fx, st, handle, 0x80, b'Y').await, vec![0, 0]);
    // Flipped bit: a genuine new write.
    assert_eq!(put_byte(&mut fx, st, handle, 0x81, b'Z').await, vec![0, 0]);

    fx.request(st, vec![REPLY_PORT, 0x07, 0, 0, 0, handle]).await;
    assert_eq!(std::fs::read(fx.disc_path("SEQ")).unwrap(), b"XZ");
}

#[tokio::test]
async fn put_byte_to_a_readonly_handle_is_refused() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    fx.save(st, "RO", b"x").await;
    let handle = fx.open(st, "RO", true, true).await;
    let reply = put_byte(&mut fx, st, handle, 0x80, b'!').await;
    assert_eq!(reply[1], 0xc1);
}

#[tokio::test]
async fn eof_query_tracks_the_cursor() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    fx.save(st, "TWO", b"AB").await;
    let handle = fx.open(st, "TWO", true, true).await;

    let replies = fx.request(st, vec![REPLY_PORT, 0x11, handle]).await;
    assert_eq!(replies[0].data, vec![0, 0, 0]);

    get_byte(&mut fx, st, handle).await;
    get_byte(&mut fx, st, handle).await;
    let replies = fx.request(st, vec![REPLY_PORT, 0x11, handle]).await;
    assert_eq!(replies[0].data, vec![0, 0, 1]);
}

#[tokio::test]
async fn random_access_info_reports_cursor_and_extent() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    fx.save(st, "RAI", b"0123456789").await;
    let handle = fx.open(st, "RAI", true, false).await;

    // Function 0: cursor. Function 1: extent.
    let replies = fx.request(st, vec![REPLY_PORT, 0x0c, 0, 0, 0, handle, 0]).await;
    assert_eq!(replies[0].data, vec![0, 0, 0, 0, 0]);
    let replies = fx.request(st, vec![REPLY_PORT, 0x0c, 0, 0, 0, handle, 1]).await;
    assert_eq!(replies[0].data, vec![0, 0, 10, 0, 0]);

    // Seek to 4, read there.
    let replies =
        fx.request(st, vec![REPLY_PORT, 0x0d, 0, 0, 0, handle, 0, 4, 0, 0]).await;
    assert_eq!(replies[0].data, vec![0, 0]);
    assert_eq!(get_byte(&mut fx, st, handle).await, vec![0, 0, b'4', 0x00]);
}

#[tokio::test]
async fn get_bytes_streams_from_an_explicit_offset() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    fx.save(st, "BULK", b"0123456789").await;
    let handle = fx.open(st, "BULK", true, true).await;

    let mut packet = vec![REPLY_PORT, 0x0a, super::common::DATA_PORT, 0, 0, handle, 0];
    packet.extend_from_slice(&[4, 0, 0]);
    packet.extend_from_slice(&[2, 0, 0]);
    let replies = fx.request(st, packet).await;

    assert_eq!(replies[0].data, vec![0, 0], "request acknowledged first");
    assert_eq!(replies[1].port, super::common::DATA_PORT);
    assert_eq!(replies[1].data, b"2345");
    let done = replies.last().unwrap();
    assert_eq!(done.data, vec![0, 0, 0x00, 4, 0, 0], "not at eof, four real bytes");
}

#[tokio::test]
async fn get_bytes_past_the_end_pads_and_reports_the_true_count() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    fx.save(st, "BULK", b"0123456789").await;
    let handle = fx.open(st, "BULK", true, true).await;

    // From the cursor (which starts at 0), ask for more than the file
    // holds.
    let mut packet = vec![REPLY_PORT, 0x0a, super::common::DATA_PORT, 0, 0, handle, 1];
    packet.extend_from_slice(&[14, 0, 0]);
    packet.extend_from_slice(&[0, 0, 0]);
    let replies = fx.request(st, packet).await;

    let body = &replies[1];
    assert_eq!(body.data.len(), 14, "padded to the requested count");
    assert_eq!(&body.data[..10], b"0123456789");
    assert_eq!(&body.data[10..], &[0, 0, 0, 0]);
    let done = replies.last().unwrap();
    assert_eq!(done.data, vec![0, 0, 0x80, 10, 0, 0], "eof with ten real bytes");
}

#[tokio::test]
async fn put_bytes_streams_into_an_open_handle() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    fx.save(st, "PATCHME", b"0123456789").await;
    let handle = fx.open(st, "PATCHME", true, false).await;

    let mut packet = vec![REPLY_PORT, 0x0b, super::common::DATA_PORT, 0, 0, handle, 0];
    packet.extend_from_slice(&[6, 0, 0]);
    packet.extend_from_slice(&[0, 0, 0]);
    let replies = fx.request(st, packet).await;
    let begin = replies.first().unwrap();
    assert_eq!(&begin.data[..2], &[0, 0]);
    let port = begin.data[2];

    let replies = fx.send_port(st, port, b"ABCDEF").await;
    let done = replies.last().unwrap();
    assert_eq!(done.data, vec![0, 0, port, 6, 0, 0], "completion reports the count");

    // The handle survived the transfer and its cursor advanced.
    let eof = fx.request(st, vec![REPLY_PORT, 0x11, handle]).await;
    assert_eq!(eof[0].data, vec![0, 0, 0]);

    fx.request(st, vec![REPLY_PORT, 0x07, 0, 0, 0, handle]).await;
    assert_eq!(std::fs::read(fx.disc_path("PATCHME")).unwrap(), b"ABCDEF6789");
}

#[tokio::test]
async fn set_extent_truncates_and_zero_extends() {
    let mut fx = Fixture::new().await;
    let st = station(20);
    fx.login(st).await;
    fx.save(st, "EXTENT", b"0123456789").await;
    let handle = fx.open(st, "EXTENT", true, false).await;

    // Shrink to 4 bytes.
    fx.request(st, vec![REPLY_PORT, 0x0d, 0, 0, 0, handle, 1, 4, 0, 0]).await;
    let replies = fx.request(st, vec![REPLY_PORT, 0x0c, 0, 0, 0, handle, 1]).await;
    assert_eq!(replies[0].data, vec![0, 0, 4, 0, 0]);

    // Grow to 6: the tail is zero-filled.
    fx.request(st, vec![REPLY_PORT, 0x0d, 0, 0, 0, handle, 1, 6, 0, 0]).await;
    fx.request(st, vec![REPLY_PORT, 0x07, 0, 0, 0, handle]).await;
    assert_eq!(std::fs::read(fx.disc_path("EXTENT")).unwrap(), b"0123\0\0");
}
