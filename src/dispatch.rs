//! Request dispatch: fsop routing and OSCLI verb parsing.
//!
//! Every request carries `{reply_port, fsop, root, current, library}`
//! before its arguments. Unauthenticated stations may only issue OSCLI
//! (to log in); everything else draws "Who are you ?". Handler errors
//! funnel through here into a single error reply.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use tracing::{debug, warn};

use crate::error::{FsError, Result};
use crate::ops;
use crate::server::Server;
use crate::transport::Station;
use crate::users::Privilege;
use crate::wire;

/// The fileserver operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum FsOp {
    Oscli = 0x00,
    Save = 0x01,
    Load = 0x02,
    Examine = 0x03,
    CatHeader = 0x04,
    LoadAsCommand = 0x05,
    Open = 0x06,
    Close = 0x07,
    GetByte = 0x08,
    PutByte = 0x09,
    GetBytes = 0x0a,
    PutBytes = 0x0b,
    GetRandomAccessInfo = 0x0c,
    SetRandomAccessInfo = 0x0d,
    ReadDiscs = 0x0e,
    ReadLoggedOnUsers = 0x0f,
    ReadTime = 0x10,
    Eof = 0x11,
    GetObjectInfo = 0x12,
    SetObjectInfo = 0x13,
    Delete = 0x14,
    ReadUserEnv = 0x15,
    SetBootOption = 0x16,
    Bye = 0x17,
    ReadUserInfo = 0x18,
    ReadVersion = 0x19,
    ReadFree = 0x1a,
    CreateDirectory = 0x1b,
    ReadUserFree = 0x1e,
    SetUserFree = 0x1f,
}

/// Case-insensitive prefix match of an OSCLI verb; yields the argument
/// tail on a hit.
fn verb<'a>(command: &'a str, name: &str) -> Option<&'a str> {
    let head = command.get(..name.len())?;
    if head.eq_ignore_ascii_case(name) {
        Some(&command[name.len()..])
    } else {
        None
    }
}

impl Server {
    /// Decodes and routes one fileserver request.
    pub(crate) async fn dispatch(&mut self, from: Station, ctrl: u8, data: &[u8]) {
        if data.len() < 2 {
            warn!(station = %from, "request too short to carry an operation");
            return;
        }
        let reply_port = data[0];
        let Some(op) = FsOp::from_u8(data[1]) else {
            warn!(station = %from, fsop = data[1], "unknown operation");
            self.error(from, reply_port, &FsError::Fs("FS Error"));
            return;
        };
        debug!(station = %from, ?op, "request");

        if self.sessions.get(&from).is_none() && op != FsOp::Oscli {
            self.error(from, reply_port, &FsError::WhoAreYou);
            return;
        }

        let result = self.route(from, reply_port, ctrl, op, data).await;
        if let Err(err) = result {
            // GETBYTE and PUTBYTE errors echo the request's control byte
            // so the client can pair them up.
            if matches!(op, FsOp::GetByte | FsOp::PutByte) {
                self.error_ctrl(from, reply_port, ctrl, &err);
            } else {
                self.error(from, reply_port, &err);
            }
        }
    }

    async fn route(
        &mut self,
        from: Station,
        reply_port: u8,
        ctrl: u8,
        op: FsOp,
        data: &[u8],
    ) -> Result<()> {
        match op {
            FsOp::Oscli => self.oscli(from, reply_port, data).await,
            FsOp::Save => ops::save::save(self, from, reply_port, ctrl, data).await,
            FsOp::Load => ops::load::load(self, from, reply_port, ctrl, data, false).await,
            FsOp::LoadAsCommand => {
                ops::load::load(self, from, reply_port, ctrl, data, true).await
            }
            FsOp::Examine => ops::examine::examine(self, from, reply_port, data).await,
            FsOp::CatHeader => ops::examine::cat_header(self, from, reply_port, data).await,
            FsOp::Open => ops::open::open(self, from, reply_port, data).await,
            FsOp::Close => ops::open::close(self, from, reply_port, data).await,
            FsOp::GetByte => ops::random::get_byte(self, from, reply_port, ctrl, data).await,
            FsOp::PutByte => ops::random::put_byte(self, from, reply_port, ctrl, data).await,
            FsOp::GetBytes => ops::transfer::get_bytes(self, from, reply_port, ctrl, data).await,
            FsOp::PutBytes => ops::transfer::put_bytes(self, from, reply_port, ctrl, data).await,
            FsOp::GetRandomAccessInfo => {
                ops::random::get_random_access_info(self, from, reply_port, data).await
            }
            FsOp::SetRandomAccessInfo => {
                ops::random::set_random_access_info(self, from, reply_port, data).await
            }
            FsOp::ReadDiscs => ops::queries::read_discs(self, from, reply_port, data).await,
            FsOp::ReadLoggedOnUsers => {
                ops::queries::read_logged_on_users(self, from, reply_port, data).await
            }
            FsOp::ReadTime => ops::queries::read_time(self, from, reply_port).await,
            FsOp::Eof => ops::open::eof(self, from, reply_port, data).await,
            FsOp::GetObjectInfo => {
                ops::object::get_object_info(self, from, reply_port, data).await
            }
            FsOp::SetObjectInfo => {
                ops::object::set_object_info(self, from, reply_port, data).await
            }
            FsOp::Delete => {
                let current = self.sessions.get(&from).map(|s| s.current).unwrap_or(0);
                let path = wire::cr_string(data, 5);
                ops::dirs::delete(self, from, reply_port, current, &path).await
            }
            FsOp::ReadUserEnv => ops::queries::read_user_env(self, from, reply_port).await,
            FsOp::SetBootOption => {
                ops::login::set_boot_option(self, from, reply_port, data).await
            }
            FsOp::Bye => ops::login::bye(self, from, reply_port).await,
            FsOp::ReadUserInfo => ops::queries::read_user_info(self, from, reply_port, data).await,
            FsOp::ReadVersion => ops::queries::read_version(self, from, reply_port).await,
            FsOp::ReadFree => ops::queries::read_free(self, from, reply_port, data).await,
            FsOp::CreateDirectory => {
                let relative_to = wire::u8_at(data, 5).ok_or(FsError::BadPath)?;
                let path = wire::cr_string(data, 6);
                ops::dirs::cdir(self, from, reply_port, relative_to, &path).await
            }
            FsOp::ReadUserFree | FsOp::SetUserFree => {
                // Quotas are not enforced; acknowledge system users so
                // their tooling does not stall.
                let session = self.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
                if session.privilege.contains(Privilege::SYSTEM) {
                    self.ok(from, reply_port);
                }
                Ok(())
            }
        }
    }

    /// Decodes the textual command of an OSCLI request and routes it.
    async fn oscli(&mut self, from: Station, reply_port: u8, data: &[u8]) -> Result<()> {
        let command = wire::cr_string(data, 5);
        let packet_dir = wire::u8_at(data, 3).unwrap_or(0);
        debug!(station = %from, command = %command, "oscli");

        if let Some(args) = verb(&command, "I AM ") {
            return ops::login::login(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "LOGIN ") {
            return ops::login::login(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "IAM ") {
            return ops::login::login(self, from, reply_port, args).await;
        }

        if self.sessions.get(&from).is_none() {
            return Err(FsError::WhoAreYou);
        }

        if verb(&command, "BYE").is_some() {
            return ops::login::bye(self, from, reply_port).await;
        }
        if let Some(args) = verb(&command, "SETLIB ") {
            return ops::admin::set_lib(self, from, reply_port, packet_dir, args).await;
        }
        if let Some(args) = verb(&command, "PASS ") {
            return ops::login::change_password(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "CHOWN ") {
            return ops::access::chown(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "OWNER ") {
            return ops::access::owner(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "ACCESS ") {
            return ops::access::access(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "INFO ") {
            return ops::object::info(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "I.") {
            return ops::object::info(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "CDIR ") {
            let current = self.sessions.get(&from).map(|s| s.current).unwrap_or(0);
            return ops::dirs::cdir(self, from, reply_port, current, args).await;
        }
        if let Some(args) = verb(&command, "DELETE ") {
            let current = self.sessions.get(&from).map(|s| s.current).unwrap_or(0);
            return ops::dirs::delete(self, from, reply_port, current, args).await;
        }
        if let Some(args) = verb(&command, "RENAME ") {
            return ops::dirs::rename(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "REN. ") {
            return ops::dirs::rename(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "SDISC ") {
            return ops::dirs::sdisc(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "COPY ") {
            return ops::copy::copy(self, from, reply_port, args).await;
        }
        if let Some(args) = verb(&command, "LIB ") {
            return ops::dirs::change_lib(self, from, reply_port, packet_dir, args).await;
        }
        if let Some(args) = verb(&command, "DIR ") {
            return ops::dirs::change_dir(self, from, reply_port, packet_dir, args).await;
        }

        let is_system = self
            .sessions
            .get(&from)
            .map(|s| s.privilege.contains(Privilege::SYSTEM))
            .unwrap_or(false);
        if is_system {
            if let Some(args) = verb(&command, "SETHOME ") {
                return ops::admin::set_home(self, from, reply_port, packet_dir, args).await;
            }
            if let Some(args) = verb(&command, "LINK ") {
                return ops::admin::link(self, from, reply_port, args).await;
            }
            if let Some(args) = verb(&command, "FLOG ") {
                return ops::admin::force_logoff(self, from, reply_port, args).await;
            }
            if let Some(args) = verb(&command, "NEWUSER ") {
                return ops::admin::new_user(self, from, reply_port, args).await;
            }
            if let Some(args) = verb(&command, "PRIV ") {
                return ops::admin::set_privilege(self, from, reply_port, args).await;
            }
        }

        // Unknown command: echo it back so the client can try it locally.
        let mut reply = vec![0x08u8, 0x00];
        reply.extend_from_slice(command.as_bytes());
        self.reply(from, reply_port, reply);
        Ok(())
    }
}
