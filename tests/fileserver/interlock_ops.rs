use super::common::{assert_error, station, Fixture};

#[tokio::test]
async fn writer_in_one_session_blocks_reader_in_another() {
    let mut fx = Fixture::new().await;
    let writer = station(40);
    let reader = station(41);
    fx.login(writer).await;
    fx.login(reader).await;

    fx.save(writer, "FOO", b"foo").await;
    let handle = fx.open(writer, "FOO", true, false).await;
    assert!(handle >= 1);

    let replies = fx.open_raw(reader, "FOO", true, true).await;
    assert_error(&replies, 0xc2);
}

#[tokio::test]
async fn readers_in_different_sessions_share_the_file() {
    let mut fx = Fixture::new().await;
    let first = station(40);
    let second = station(41);
    fx.login(first).await;
    fx.login(second).await;

    fx.save(first, "SHARED", b"data").await;
    fx.open(first, "SHARED", true, true).await;
    fx.open(second, "SHARED", true, true).await;

    assert_eq!(fx.server.interlock().live_files(), 1, "one entry, two readers");

    // A writer is still refused while the readers hold on.
    let replies = fx.open_raw(first, "SHARED", true, false).await;
    assert_error(&replies, 0xc2);
}

#[tokio::test]
async fn closing_the_writer_releases_the_file() {
    let mut fx = Fixture::new().await;
    let st = station(40);
    fx.login(st).await;
    fx.save(st, "CYCLE", b"x").await;

    let handle = fx.open(st, "CYCLE", true, false).await;
    fx.request(st, vec![super::common::REPLY_PORT, 0x07, 0, 0, 0, handle]).await;
    assert_eq!(fx.server.interlock().live_files(), 0);

    // Now a reader gets in fine.
    fx.open(st, "CYCLE", true, true).await;
}

#[tokio::test]
async fn delete_of_an_open_file_is_refused() {
    let mut fx = Fixture::new().await;
    let st = station(40);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "BUSY", b"x").await;
    fx.open(st, "BUSY", true, false).await;

    let replies = fx.request(st, super::common::oscli(current, "DELETE BUSY")).await;
    assert_error(&replies, 0xc2);
    assert!(fx.disc_path("BUSY").exists());
}

#[tokio::test]
async fn close_handle_zero_closes_everything() {
    let mut fx = Fixture::new().await;
    let st = station(40);
    fx.login(st).await;
    fx.save(st, "ONE", b"1").await;
    fx.save(st, "TWO", b"2").await;
    fx.open(st, "ONE", true, true).await;
    fx.open(st, "TWO", true, true).await;
    assert_eq!(fx.server.interlock().live_files(), 2);

    let replies = fx.request(st, vec![super::common::REPLY_PORT, 0x07, 0, 0, 0, 0]).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    assert_eq!(fx.server.interlock().live_files(), 0);

    // The anchor directories survive a close-all.
    let session_alive = fx.server.sessions().get(&st).is_some();
    assert!(session_alive);
}
