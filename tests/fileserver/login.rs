use super::common::{assert_error, oscli, station, Fixture, REPLY_PORT};

#[tokio::test]
async fn login_hands_out_three_distinct_handles() {
    let mut fx = Fixture::new().await;
    let replies = fx.request(station(42), oscli(0, "I AM SYST")).await;

    let reply = replies.first().expect("login reply");
    assert_eq!(reply.port, REPLY_PORT);
    assert_eq!(reply.data.len(), 6);
    assert_eq!(&reply.data[..2], &[0x05, 0x00]);

    let (root, current, library) = (reply.data[2], reply.data[3], reply.data[4]);
    assert!(root >= 1 && current >= 1 && library >= 1);
    assert_ne!(root, current);
    assert_ne!(current, library);
    assert_ne!(root, library);
    assert_eq!(reply.data[5], 0, "SYST boots with option off");
}

#[tokio::test]
async fn requests_without_a_session_are_challenged() {
    let mut fx = Fixture::new().await;
    let replies = fx.request(station(42), vec![REPLY_PORT, 0x19]).await;
    assert_error(&replies, 0xbf);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let mut fx = Fixture::new().await;
    let replies = fx.request(station(42), oscli(0, "I AM SYST WRONG")).await;
    assert_error(&replies, 0xbc);
}

#[tokio::test]
async fn unknown_user_is_rejected() {
    let mut fx = Fixture::new().await;
    let replies = fx.request(station(42), oscli(0, "I AM NOBODY")).await;
    assert_error(&replies, 0xbc);
}

#[tokio::test]
async fn bye_releases_every_handle() {
    let mut fx = Fixture::new().await;
    let st = station(42);
    fx.login(st).await;
    fx.save(st, "KEEPOPEN", b"x").await;
    fx.open(st, "KEEPOPEN", true, true).await;
    assert!(fx.server.interlock().live_files() > 0);
    assert!(fx.server.interlock().live_dirs() > 0);

    let replies = fx.request(st, oscli(0, "BYE")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    assert_eq!(fx.server.interlock().live_files(), 0);
    assert_eq!(fx.server.interlock().live_dirs(), 0);

    // The session is gone: the next request is challenged.
    let replies = fx.request(st, vec![REPLY_PORT, 0x19]).await;
    assert_error(&replies, 0xbf);
}

#[tokio::test]
async fn relogin_displaces_the_previous_session() {
    let mut fx = Fixture::new().await;
    let st = station(42);
    fx.login(st).await;
    fx.save(st, "HELD", b"x").await;
    fx.open(st, "HELD", true, false).await;
    assert_eq!(fx.server.interlock().live_files(), 1);

    // Logging in again must implicitly close the old session's files.
    fx.login(st).await;
    assert_eq!(fx.server.interlock().live_files(), 0);
}

#[tokio::test]
async fn read_version_replies_with_a_banner() {
    let mut fx = Fixture::new().await;
    let st = station(42);
    fx.login(st).await;
    let replies = fx.request(st, vec![REPLY_PORT, 0x19]).await;
    let reply = replies.first().unwrap();
    assert_eq!(&reply.data[..2], &[0, 0]);
    assert_eq!(*reply.data.last().unwrap(), 0x0d);
}

#[tokio::test]
async fn user_environment_reports_disc_and_tails() {
    let mut fx = Fixture::new().await;
    let st = station(42);
    fx.login(st).await;
    let replies = fx.request(st, vec![REPLY_PORT, 0x15]).await;
    let reply = replies.first().unwrap();
    assert_eq!(reply.data[2], 16);
    assert_eq!(&reply.data[3..19], b"SYSTEM          ");
    assert_eq!(&reply.data[19..29], b"$         ");
    assert_eq!(&reply.data[29..39], b"$         ");
}
