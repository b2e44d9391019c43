use super::common::{assert_error, oscli, station, Fixture, REPLY_PORT};

#[tokio::test]
async fn cdir_then_catalogue_header() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;

    let replies = fx.request(st, oscli(current, "CDIR THINGS")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    assert!(fx.disc_path("THINGS").is_dir());

    let mut packet = vec![REPLY_PORT, 0x04, 0, current, 0];
    packet.extend_from_slice(b"THINGS");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(&reply[..2], &[0, 0]);
    assert_eq!(&reply[2..12], b"THINGS    ");
    assert_eq!(reply[12], b'O', "creator owns the directory");
    assert_eq!(*reply.last().unwrap(), 0x80);
}

#[tokio::test]
async fn delete_refuses_a_non_empty_directory() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;

    fx.request(st, oscli(current, "CDIR D")).await;
    fx.save(st, "D.F", b"inside").await;

    let replies = fx.request(st, oscli(current, "DELETE D")).await;
    assert_error(&replies, 0xff);
    assert!(fx.disc_path("D").is_dir());

    let replies = fx.request(st, oscli(current, "DELETE D.F")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    let replies = fx.request(st, oscli(current, "DELETE D")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    assert!(!fx.disc_path("D").exists());
}

#[tokio::test]
async fn delete_of_a_missing_object_reports_not_found() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;
    let replies = fx.request(st, oscli(current, "DELETE GHOST")).await;
    assert_error(&replies, 0xd6);
}

#[tokio::test]
async fn examine_short_format_lists_wildcard_matches_in_order() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "APPLE", b"a").await;
    fx.save(st, "APRICOT", b"b").await;
    fx.save(st, "BANANA", b"c").await;

    let mut packet = vec![REPLY_PORT, 0x03, 0, current, 0, 2, 0, 10, 0];
    packet.extend_from_slice(b"A*");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    let reply = &replies.first().unwrap().data;

    assert_eq!(&reply[..4], &[0, 0, 2, 0], "two entries, 16-bit count");
    let mut expected = vec![0x0au8];
    expected.extend_from_slice(b"APPLE     ");
    expected.push(0x0a);
    expected.extend_from_slice(b"APRICOT   ");
    assert_eq!(&reply[4..4 + expected.len()], &expected[..]);
    assert_eq!(*reply.last().unwrap(), 0x80);
}

#[tokio::test]
async fn examine_of_a_directory_lists_its_contents() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;
    fx.request(st, oscli(current, "CDIR POCKET")).await;
    fx.save(st, "POCKET.COIN", b"x").await;

    let mut packet = vec![REPLY_PORT, 0x03, 0, current, 0, 2, 0, 10, 0];
    packet.extend_from_slice(b"POCKET");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(&reply[..4], &[0, 0, 1, 0]);
    assert_eq!(&reply[5..15], b"COIN      ");
}

#[tokio::test]
async fn rename_refuses_to_replace_an_existing_file() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "A", b"aaa").await;
    fx.save(st, "B", b"bbb").await;

    let replies = fx.request(st, oscli(current, "RENAME A B")).await;
    assert_error(&replies, 0xff);
    // The source is untouched.
    assert_eq!(std::fs::read(fx.disc_path("A")).unwrap(), b"aaa");
    assert_eq!(std::fs::read(fx.disc_path("B")).unwrap(), b"bbb");
}

#[tokio::test]
async fn rename_moves_into_an_existing_directory() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "WANDERER", b"data").await;
    fx.request(st, oscli(current, "CDIR NEST")).await;

    let replies = fx.request(st, oscli(current, "RENAME WANDERER NEST")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    assert!(!fx.disc_path("WANDERER").exists());
    assert_eq!(std::fs::read(fx.disc_path("NEST/WANDERER")).unwrap(), b"data");
}

#[tokio::test]
async fn rename_to_a_new_name_carries_attributes() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;

    let port = fx.begin_save(st, "OLDNAME", 4, 0xffff1900, 0xffff8023).await;
    fx.send_port(st, port, b"body").await;

    let replies = fx.request(st, oscli(current, "RENAME OLDNAME NEWNAME")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);

    // The load address travelled with the file.
    let mut packet = vec![REPLY_PORT, 0x12, 0, current, 0, 2];
    packet.extend_from_slice(b"NEWNAME");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(reply[2], 1, "a file");
    assert_eq!(u32::from_le_bytes(reply[3..7].try_into().unwrap()), 0xffff1900);
}

#[tokio::test]
async fn dir_command_moves_the_current_anchor() {
    let mut fx = Fixture::new().await;
    let st = station(30);
    let (_, current, _) = fx.login(st).await;
    fx.request(st, oscli(current, "CDIR DEEP")).await;
    fx.save(st, "DEEP.SECRET", b"shh").await;

    let replies = fx.request(st, oscli(current, "DIR DEEP")).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(reply[0], 0x07, "changed-directory reply code");
    let new_current = reply[2];
    assert_ne!(new_current, current);

    // A relative open now resolves inside DEEP.
    let handle = fx.open(st, "SECRET", true, true).await;
    assert!(handle >= 1);
}

#[tokio::test]
async fn sdisc_reanchors_on_the_named_disc() {
    let mut fx = Fixture::with_discs(&["0SYSTEM", "1DATA"]).await;
    std::fs::write(fx.tempdir.path().join("1DATA/NOTE"), b"n").unwrap();

    let st = station(30);
    let (_, current, _) = fx.login(st).await;

    let replies = fx.request(st, oscli(current, "SDISC DATA")).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(reply[0], 0x06, "sdisc reply code");
    let (new_root, new_current) = (reply[2], reply[3]);
    assert!(new_root >= 1 && new_current >= 1);

    // Relative resolution now happens on the DATA disc.
    let handle = fx.open(st, "NOTE", true, true).await;
    assert!(handle >= 1);
}
