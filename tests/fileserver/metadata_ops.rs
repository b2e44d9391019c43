use super::common::{assert_error, oscli, station, Fixture, REPLY_PORT};

#[tokio::test]
async fn access_changes_the_permission_byte() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "GUARDED", b"x").await;

    let replies = fx.request(st, oscli(current, "ACCESS GUARDED WR/R")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);

    // Command 4 reads the wire-encoded access byte back.
    let mut packet = vec![REPLY_PORT, 0x12, 0, current, 0, 4];
    packet.extend_from_slice(b"GUARDED");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(reply[2], 1, "a file");
    // Owner W+R shift to bits 2-3, other R to bit 0.
    assert_eq!(reply[3], 0x0c | 0x01);
    assert_eq!(reply[4], 0x00, "requester owns the file");
}

#[tokio::test]
async fn access_with_bad_letters_is_rejected() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "F", b"x").await;
    let replies = fx.request(st, oscli(current, "ACCESS F QZ")).await;
    assert_error(&replies, 0xcf);
}

#[tokio::test]
async fn info_prints_a_metadata_line() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    let (_, current, _) = fx.login(st).await;

    let port = fx.begin_save(st, "REPORT", 3, 0x0000ffff, 0x00003333).await;
    fx.send_port(st, port, b"abc").await;

    let replies = fx.request(st, oscli(current, "INFO REPORT")).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(reply[0], 0x04);
    let line = String::from_utf8_lossy(&reply[2..]);
    assert!(line.starts_with("REPORT     0000FFFF 00003333   000003"), "line: {line}");
    assert!(line.contains("WR/"), "permissions in {line}");
}

#[tokio::test]
async fn owner_reports_the_owning_user() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "MINE", b"x").await;

    let replies = fx.request(st, oscli(current, "OWNER MINE")).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(reply[1], 0xff);
    let text = String::from_utf8_lossy(&reply[2..]);
    assert!(text.starts_with("Owner: SYST"), "text: {text}");
}

#[tokio::test]
async fn newuser_priv_and_login_cycle() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    let (_, current, _) = fx.login(st).await;

    let replies = fx.request(st, oscli(current, "NEWUSER WOMBLE Orinoco")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    assert!(fx.disc_path("WOMBLE").is_dir(), "home directory created");

    // The new account can log in with a blank password.
    let other = station(51);
    let replies = fx.request(other, oscli(0, "I AM WOMBLE")).await;
    assert_eq!(replies.first().unwrap().data[0], 0x05);

    // Lock the account; the next login is refused.
    let replies = fx.request(st, oscli(current, "PRIV WOMBLE L")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    let replies = fx.request(station(52), oscli(0, "I AM WOMBLE")).await;
    assert_error(&replies, 0xbc);
}

#[tokio::test]
async fn admin_verbs_require_system_privilege() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    let (_, current, _) = fx.login(st).await;
    fx.request(st, oscli(current, "NEWUSER PLEB")).await;

    let pleb = station(51);
    fx.request(pleb, oscli(0, "I AM PLEB")).await;
    let replies = fx.request(pleb, oscli(0, "NEWUSER SNEAKY")).await;
    // Unknown-command echo, not an error: the verb is invisible to
    // ordinary users.
    assert_eq!(&replies.first().unwrap().data[..2], &[0x08, 0x00]);
}

#[tokio::test]
async fn chown_to_another_user_is_system_only() {
    let mut fx = Fixture::new().await;
    let syst = station(50);
    let (_, current, _) = fx.login(syst).await;
    fx.request(syst, oscli(current, "NEWUSER WOMBLE")).await;

    let womble = station(51);
    fx.request(womble, oscli(0, "I AM WOMBLE")).await;
    // WOMBLE's current directory is its home, $.WOMBLE.
    fx.save(womble, "OWN", b"x").await;

    // WOMBLE may not give the file away...
    let replies = fx.request(womble, oscli(0, "CHOWN OWN SYST")).await;
    assert_error(&replies, 0xbd);

    // ...but SYST may claim it.
    let replies = fx.request(syst, oscli(current, "CHOWN WOMBLE.OWN SYST")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
}

#[tokio::test]
async fn read_users_lists_active_sessions() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    fx.login(st).await;
    let replies = fx.request(st, vec![REPLY_PORT, 0x0f, 0, 0, 0, 0, 10]).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(reply[2], 1, "one user logged on");
    assert_eq!(reply[3], 50, "station number first");
    assert_eq!(reply[4], 0, "then network");
    assert_eq!(&reply[5..15], b"SYST      ");
    assert_eq!(reply[15], 1, "SYST is a system user");
}

#[tokio::test]
async fn read_user_info_locates_a_logged_on_user() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    fx.login(st).await;

    let mut packet = vec![REPLY_PORT, 0x18, 0, 0, 0];
    packet.extend_from_slice(b"SYST");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    assert_eq!(replies.first().unwrap().data, vec![0, 0, 1, 50, 0]);

    let mut packet = vec![REPLY_PORT, 0x18, 0, 0, 0];
    packet.extend_from_slice(b"NOBODY");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    assert_error(&replies, 0xbc);
}

#[tokio::test]
async fn copy_duplicates_wildcard_sources_into_a_directory() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "NOTE1", b"first").await;
    fx.save(st, "NOTE2", b"second").await;
    fx.request(st, oscli(current, "CDIR BACKUP")).await;

    let replies = fx.request(st, oscli(current, "COPY NOTE# BACKUP")).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);
    assert_eq!(std::fs::read(fx.disc_path("BACKUP/NOTE1")).unwrap(), b"first");
    assert_eq!(std::fs::read(fx.disc_path("BACKUP/NOTE2")).unwrap(), b"second");
    assert_eq!(fx.server.interlock().live_files(), 0, "copy released its interlocks");
}

#[tokio::test]
async fn set_object_info_updates_load_and_exec() {
    let mut fx = Fixture::new().await;
    let st = station(50);
    let (_, current, _) = fx.login(st).await;
    fx.save(st, "PATCH", b"x").await;

    // Command 2: set the load address.
    let mut packet = vec![REPLY_PORT, 0x13, 0, current, 0, 2];
    packet.extend_from_slice(&0xffffaaaau32.to_le_bytes());
    packet.extend_from_slice(b"PATCH");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    assert_eq!(&replies.first().unwrap().data[..2], &[0, 0]);

    let mut packet = vec![REPLY_PORT, 0x12, 0, current, 0, 2];
    packet.extend_from_slice(b"PATCH");
    packet.push(0x0d);
    let replies = fx.request(st, packet).await;
    let reply = &replies.first().unwrap().data;
    assert_eq!(u32::from_le_bytes(reply[3..7].try_into().unwrap()), 0xffffaaaa);
}
