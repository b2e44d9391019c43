//! Per-server state and the task assembly around it.
//!
//! One [`Server`] owns everything for one fileserver instance: discs,
//! users, sessions, the interlock and the bulk table. It runs inside a
//! single task, so handlers execute to completion in arrival order and
//! need no further locking. Inbound datagrams arrive over a channel from
//! whatever drives the transport; replies leave over another channel and
//! a transmit task pushes them out.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, Local, Timelike};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::attr::{AttrStore, SidecarStore};
use crate::bulk::{BulkPorts, IDLE_TIMEOUT};
use crate::config::ServerConfig;
use crate::discs::DiscSet;
use crate::error::FsError;
use crate::interlock::Interlock;
use crate::name::DateMode;
use crate::ops;
use crate::resolve::{self, Resolution, ResolveError};
use crate::session::{Handle, SessionTable, SessionView};
use crate::transport::{Inbound, Outbound, Station, Transport};
use crate::users::UserStore;

/// The well-known port fileserver requests arrive on.
pub const FILESERVER_PORT: u8 = 0x99;

/// Default control byte for replies that do not echo the request's.
pub const CTRL: u8 = 0x80;

/// Handle for pushing outbound datagrams from the server core.
#[derive(Clone)]
pub struct ReplySender {
    sender: UnboundedSender<Outbound>,
}

impl ReplySender {
    pub fn send(&self, out: Outbound) {
        if self.sender.send(out).is_err() {
            warn!("reply channel closed, dropping outbound datagram");
        }
    }
}

/// Creates the outbound channel pair.
pub fn reply_channel() -> (ReplySender, UnboundedReceiver<Outbound>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ReplySender { sender }, receiver)
}

/// One fileserver instance.
pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) discs: DiscSet,
    pub(crate) users: UserStore,
    pub(crate) sessions: SessionTable,
    pub(crate) interlock: Interlock,
    pub(crate) bulk: BulkPorts,
    pub(crate) attrs: Box<dyn AttrStore>,
    pub(crate) replies: ReplySender,
}

impl Server {
    /// Initialises a server over the configured root: loads the user
    /// table and discovers the disc set.
    pub async fn new(config: ServerConfig, replies: ReplySender) -> io::Result<Self> {
        let users = UserStore::load(&config.root).await?;
        let discs = DiscSet::discover(&config.root).await?;
        if !discs.any() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no discs under the server root"));
        }
        info!(root = %config.root.display(), users = users.len(), "fileserver initialised");
        Ok(Self {
            config,
            discs,
            users,
            sessions: SessionTable::new(),
            interlock: Interlock::new(),
            bulk: BulkPorts::new(),
            attrs: Box::new(SidecarStore),
            replies,
        })
    }

    /// Replaces the default sidecar attribute backend.
    pub fn with_attr_store(mut self, attrs: Box<dyn AttrStore>) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn date_mode(&self) -> DateMode {
        self.config.date_mode()
    }

    /// Read-only view of the interlock tables.
    pub fn interlock(&self) -> &Interlock {
        &self.interlock
    }

    /// Read-only view of the active sessions.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Read-only view of the bulk-port table.
    pub fn bulk(&self) -> &BulkPorts {
        &self.bulk
    }

    /// Today packed into the two-byte wire date.
    pub(crate) fn date_now(&self) -> (u8, u8) {
        let now = Local::now();
        crate::name::pack_date(
            self.date_mode(),
            now.day() as u8,
            now.month() as u8,
            now.year().max(0) as u16,
        )
    }

    /// The local wall clock as `(day, monthyear, hour, minute, second)`.
    pub(crate) fn time_now(&self) -> (u8, u8, u8, u8, u8) {
        let now = Local::now();
        let (day, monthyear) = self.date_now();
        (day, monthyear, now.hour() as u8, now.minute() as u8, now.second() as u8)
    }

    /// Routes one inbound datagram: fileserver requests to the dispatcher,
    /// anything else to the bulk table.
    pub async fn handle_packet(&mut self, from: Station, port: u8, ctrl: u8, data: &[u8]) {
        if port == FILESERVER_PORT {
            self.dispatch(from, ctrl, data).await;
        } else {
            ops::transfer::bulk_receive(self, from, port, ctrl, data).await;
        }
    }

    /// Periodic housekeeping: reclaims idle bulk transfers.
    pub async fn tick(&mut self) {
        let now = Instant::now();
        for port in self.bulk.idle_ports(now, IDLE_TIMEOUT) {
            let Some(context) = self.bulk.release(port) else { continue };
            info!(port, station = %context.station, "garbage collecting stale bulk port");
            self.interlock.close(context.interlock, context.mode);
            if let Some(user_handle) = context.user_handle {
                if let Some(session) = self.sessions.get_mut(&context.station) {
                    session.release(user_handle);
                }
            }
        }
    }

    pub(crate) fn send(&self, to: Station, port: u8, ctrl: u8, data: Vec<u8>) {
        self.replies.send(Outbound { to, port, ctrl, data });
    }

    /// Standard reply on the client's reply port.
    pub(crate) fn reply(&self, to: Station, reply_port: u8, data: Vec<u8>) {
        self.send(to, reply_port, CTRL, data);
    }

    /// Reply echoing the request's control byte.
    pub(crate) fn reply_ctrl(&self, to: Station, reply_port: u8, ctrl: u8, data: Vec<u8>) {
        self.send(to, reply_port, ctrl, data);
    }

    /// The `{0x00, 0x00}` success reply.
    pub(crate) fn ok(&self, to: Station, reply_port: u8) {
        self.reply(to, reply_port, vec![0, 0]);
    }

    /// Error reply `{0x00, code, message, 0x0D}` with an explicit control
    /// byte.
    pub(crate) fn error_ctrl(&self, to: Station, reply_port: u8, ctrl: u8, err: &FsError) {
        debug!(station = %to, code = err.code(), message = err.message(), "error reply");
        let mut data = vec![0u8, err.code()];
        data.extend_from_slice(err.message().as_bytes());
        data.push(crate::wire::CR);
        self.send(to, reply_port, ctrl, data);
    }

    pub(crate) fn error(&self, to: Station, reply_port: u8, err: &FsError) {
        self.error_ctrl(to, reply_port, CTRL, err);
    }

    /// Resolves a path for `view` against this server's discs.
    pub(crate) async fn resolve(
        &self,
        view: &SessionView,
        path: &str,
        wildcard: bool,
    ) -> Result<Resolution, ResolveError> {
        resolve::resolve(
            &self.config.root,
            &self.discs,
            self.attrs.as_ref(),
            self.date_mode(),
            view,
            path,
            wildcard,
        )
        .await
    }

    /// Tears down a session: every open handle is released through the
    /// interlock rules and the session row removed.
    pub(crate) fn logoff(&mut self, station: &Station) {
        let Some(mut session) = self.sessions.remove(station) else { return };
        for slot in session.open_slots() {
            match session.release(slot) {
                Some(Handle::File(file)) => self.interlock.close(file.interlock, file.mode),
                Some(Handle::Dir(dir)) => self.interlock.close_dir(dir.interlock),
                None => {}
            }
        }
        info!(station = %station, "logged off");
    }
}

/// Receives decoded inbound datagrams and runs them through the server,
/// interleaved with the housekeeping tick.
pub struct FsTask {
    server: Server,
    inbound: UnboundedReceiver<Inbound>,
}

impl FsTask {
    /// Spawns the server task.
    pub fn spawn(server: Server, inbound: UnboundedReceiver<Inbound>) -> JoinHandle<()> {
        tokio::spawn(Self { server, inbound }.run())
    }

    async fn run(mut self) {
        let mut gc = tokio::time::interval(IDLE_TIMEOUT / 2);
        loop {
            tokio::select! {
                packet = self.inbound.recv() => {
                    let Some(packet) = packet else { break };
                    self.server
                        .handle_packet(packet.from, packet.port, packet.ctrl, &packet.data)
                        .await;
                }
                _ = gc.tick() => self.server.tick().await,
            }
        }
    }
}

/// Drains the reply channel into the transport.
pub struct TxTask {
    transport: Arc<dyn Transport>,
    outbound: UnboundedReceiver<Outbound>,
}

impl TxTask {
    /// Spawns the transmit task.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        outbound: UnboundedReceiver<Outbound>,
    ) -> JoinHandle<()> {
        tokio::spawn(Self { transport, outbound }.run())
    }

    async fn run(mut self) {
        while let Some(out) = self.outbound.recv().await {
            if let Err(err) = self.transport.send(out.to, out.port, out.ctrl, &out.data).await {
                warn!(station = %out.to, %err, "failed to send reply");
            }
        }
    }
}

/// Builds a server over `config` and wires it to `transport`. Returns the
/// sender the transport's receive loop should feed with inbound
/// datagrams.
pub async fn start(
    config: ServerConfig,
    transport: Arc<dyn Transport>,
) -> io::Result<(UnboundedSender<Inbound>, JoinHandle<()>, JoinHandle<()>)> {
    let (replies, outbound) = reply_channel();
    let server = Server::new(config, replies).await?;

    let (inbound_send, inbound_recv) = mpsc::unbounded_channel();
    let fs = FsTask::spawn(server, inbound_recv);
    let tx = TxTask::spawn(transport, outbound);
    Ok((inbound_send, fs, tx))
}
