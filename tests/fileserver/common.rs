use std::path::PathBuf;

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use econet_fs::server::reply_channel;
use econet_fs::{Outbound, Server, ServerConfig, Station, FILESERVER_PORT};

/// Reply port used by every test request.
pub const REPLY_PORT: u8 = 0x90;

/// Data/ack port handed to bulk operations.
pub const DATA_PORT: u8 = 0x91;

pub struct Fixture {
    pub tempdir: TempDir,
    pub server: Server,
    outbound: UnboundedReceiver<Outbound>,
}

#[allow(dead_code)]
impl Fixture {
    /// A server rooted in a fresh tempdir with a single disc `SYSTEM`.
    pub async fn new() -> Self {
        Self::with_discs(&["0SYSTEM"]).await
    }

    /// A server with an explicit set of disc directories.
    pub async fn with_discs(discs: &[&str]) -> Self {
        let tempdir = TempDir::new().expect("create temp dir");
        for disc in discs {
            std::fs::create_dir(tempdir.path().join(disc)).expect("create disc dir");
        }
        let (replies, outbound) = reply_channel();
        let server = Server::new(ServerConfig::new(tempdir.path()), replies)
            .await
            .expect("initialise server");
        Self { tempdir, server, outbound }
    }

    /// Host path of an entry on the SYSTEM disc.
    pub fn disc_path(&self, name: &str) -> PathBuf {
        self.tempdir.path().join("0SYSTEM").join(name)
    }

    /// Every reply the server has produced so far.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut replies = Vec::new();
        while let Ok(out) = self.outbound.try_recv() {
            replies.push(out);
        }
        replies
    }

    /// Sends a fileserver request and collects the replies.
    pub async fn request(&mut self, from: Station, data: Vec<u8>) -> Vec<Outbound> {
        self.server.handle_packet(from, FILESERVER_PORT, 0x80, &data).await;
        self.drain()
    }

    /// Sends a datagram on an arbitrary port (bulk traffic).
    pub async fn send_port(&mut self, from: Station, port: u8, data: &[u8]) -> Vec<Outbound> {
        self.server.handle_packet(from, port, 0x80, data).await;
        self.drain()
    }

    /// Logs `station` in as SYST and returns its (root, current,
    /// library) handles.
    pub async fn login(&mut self, station: Station) -> (u8, u8, u8) {
        let replies = self.request(station, oscli(0, "I AM SYST")).await;
        let reply = replies.first().expect("login reply");
        assert_eq!(reply.data[0], 0x05, "unexpected login reply: {:02x?}", reply.data);
        assert_eq!(reply.data[1], 0x00);
        (reply.data[2], reply.data[3], reply.data[4])
    }

    /// Saves `contents` as `name` through the bulk machinery.
    pub async fn save(&mut self, station: Station, name: &str, contents: &[u8]) {
        let port = self.begin_save(station, name, contents.len() as u32, 0, 0).await;
        if contents.is_empty() {
            return;
        }
        let replies = self.send_port(station, port, contents).await;
        let done = replies.last().expect("save completion");
        assert_eq!(done.port, REPLY_PORT);
        assert_eq!(&done.data[..2], &[0, 0], "save did not complete: {:02x?}", done.data);
    }

    /// Issues a SAVE and returns the negotiated bulk port.
    pub async fn begin_save(
        &mut self,
        station: Station,
        name: &str,
        length: u32,
        load: u32,
        exec: u32,
    ) -> u8 {
        let mut packet = vec![REPLY_PORT, 0x01, DATA_PORT, 0, 0];
        packet.extend_from_slice(&load.to_le_bytes());
        packet.extend_from_slice(&exec.to_le_bytes());
        packet.extend_from_slice(&length.to_le_bytes()[..3]);
        packet.extend_from_slice(name.as_bytes());
        packet.push(0x0d);
        let replies = self.request(station, packet).await;
        let begin = replies.first().expect("save begin reply");
        assert_eq!(&begin.data[..2], &[0, 0], "save refused: {:02x?}", begin.data);
        begin.data[2]
    }

    /// Opens `name` and returns the user handle.
    pub async fn open(
        &mut self,
        station: Station,
        name: &str,
        must_exist: bool,
        readonly: bool,
    ) -> u8 {
        let replies = self.open_raw(station, name, must_exist, readonly).await;
        let reply = replies.first().expect("open reply");
        assert_eq!(&reply.data[..2], &[0, 0], "open refused: {:02x?}", reply.data);
        reply.data[2]
    }

    /// Opens `name` and returns the raw replies (for error checks).
    pub async fn open_raw(
        &mut self,
        station: Station,
        name: &str,
        must_exist: bool,
        readonly: bool,
    ) -> Vec<Outbound> {
        let mut packet = vec![REPLY_PORT, 0x06, 0, 0, 0];
        packet.push(u8::from(must_exist));
        packet.push(u8::from(readonly));
        packet.extend_from_slice(name.as_bytes());
        packet.push(0x0d);
        self.request(station, packet).await
    }
}

/// Builds an OSCLI request; `current` lands in the packet's current-dir
/// slot for the verbs that honour it.
pub fn oscli(current: u8, command: &str) -> Vec<u8> {
    let mut packet = vec![REPLY_PORT, 0x00, 0, current, 0];
    packet.extend_from_slice(command.as_bytes());
    packet.push(0x0d);
    packet
}

/// A station for tests.
pub fn station(stn: u8) -> Station {
    Station::new(0, stn)
}

/// Asserts that a reply is the error `code`.
pub fn assert_error(replies: &[Outbound], code: u8) {
    let reply = replies.first().expect("expected a reply");
    assert_eq!(reply.data[0], 0, "not an error frame: {:02x?}", reply.data);
    assert_eq!(
        reply.data[1], code,
        "expected error {:02x}, got: {:02x?} ({})",
        code,
        reply.data,
        String::from_utf8_lossy(&reply.data[2..])
    );
}
