//! Persisted user records and the `Passwords` file.
//!
//! The password database is a flat file of fixed 256-byte records; the
//! record index doubles as the user id. A record is live when its
//! privilege byte is non-zero. The whole table is held in memory and
//! individual records are rewritten in place on mutation.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use num_derive::FromPrimitive;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::info;

/// Size of one record on disc.
pub const RECORD_LEN: usize = 256;

/// Maximum number of users per server.
pub const MAX_USERS: usize = 256;

const USERNAME_LEN: usize = 10;
const PASSWORD_LEN: usize = 6;
const FULLNAME_LEN: usize = 30;
const DIR_LEN: usize = 96;

bitflags! {
    /// The privilege byte. An empty value marks a free record slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Privilege: u8 {
        /// Full system rights.
        const SYSTEM = 0x80;
        /// Login refused.
        const LOCKED = 0x40;
        /// May not change their own password.
        const NO_PASSWORD_CHANGE = 0x20;
        /// Ordinary user.
        const USER = 0x01;
    }
}

/// Boot action handed to the client at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum BootOption {
    Off = 0,
    Load = 1,
    Run = 2,
    Exec = 3,
}

/// Timestamp of the user's last login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginStamp {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
}

/// One 256-byte record of the password database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
    pub fullname: String,
    pub privilege: Privilege,
    pub boot_option: u8,
    pub home: String,
    pub library: String,
    pub home_disc: u8,
    pub last_login: LoginStamp,
}

fn pad(s: &str, width: usize) -> Vec<u8> {
    let mut out: Vec<u8> = s.bytes().take(width).collect();
    out.resize(width, b' ');
    out
}

fn unpad(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches([' ', '\0']).to_string()
}

impl UserRecord {
    /// A free slot.
    pub fn empty() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            fullname: String::new(),
            privilege: Privilege::empty(),
            boot_option: 0,
            home: String::new(),
            library: String::new(),
            home_disc: 0,
            last_login: LoginStamp::default(),
        }
    }

    /// The bootstrap system account written into a fresh database.
    pub fn system_user() -> Self {
        Self {
            username: "SYST".into(),
            password: String::new(),
            fullname: "System User".into(),
            privilege: Privilege::SYSTEM,
            boot_option: 0,
            home: "$".into(),
            library: "$".into(),
            home_disc: 0,
            last_login: LoginStamp::default(),
        }
    }

    /// True when the slot holds a live account.
    pub fn is_valid(&self) -> bool {
        !self.privilege.is_empty()
    }

    /// Case-insensitive match against a candidate username.
    pub fn matches_name(&self, name: &str) -> bool {
        self.username.eq_ignore_ascii_case(name.trim_end())
    }

    /// Case-insensitive match against a candidate password; stored and
    /// supplied passwords are space-padded to six characters first.
    pub fn password_matches(&self, password: &str) -> bool {
        let stored = pad(&self.password, PASSWORD_LEN);
        let given = pad(password, PASSWORD_LEN);
        stored.eq_ignore_ascii_case(&given)
    }

    /// Serialises the record into its on-disc layout.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        let mut at = 0;
        for (field, width) in [
            (&self.username, USERNAME_LEN),
            (&self.password, PASSWORD_LEN),
            (&self.fullname, FULLNAME_LEN),
        ] {
            out[at..at + width].copy_from_slice(&pad(field, width));
            at += width;
        }
        out[at] = self.privilege.bits();
        out[at + 1] = self.boot_option;
        at += 2;
        for (field, width) in [(&self.home, DIR_LEN), (&self.library, DIR_LEN)] {
            out[at..at + width].copy_from_slice(&pad(field, width));
            at += width;
        }
        out[at] = self.home_disc;
        let stamp = self.last_login;
        out[at + 1..at + 7]
            .copy_from_slice(&[stamp.year, stamp.month, stamp.day, stamp.hour, stamp.min, stamp.sec]);
        out
    }

    /// Reconstructs a record from its on-disc layout.
    pub fn decode(bytes: &[u8]) -> Self {
        let mut at = 0;
        let mut take = |width: usize| {
            let field = unpad(&bytes[at..at + width]);
            at += width;
            field
        };
        let username = take(USERNAME_LEN);
        let password = take(PASSWORD_LEN);
        let fullname = take(FULLNAME_LEN);
        let privilege = Privilege::from_bits_truncate(bytes[at]);
        let boot_option = bytes[at + 1];
        at += 2;
        let mut take = |width: usize| {
            let field = unpad(&bytes[at..at + width]);
            at += width;
            field
        };
        let home = take(DIR_LEN);
        let library = take(DIR_LEN);
        let home_disc = bytes[at];
        let last_login = LoginStamp {
            year: bytes[at + 1],
            month: bytes[at + 2],
            day: bytes[at + 3],
            hour: bytes[at + 4],
            min: bytes[at + 5],
            sec: bytes[at + 6],
        };
        Self {
            username,
            password,
            fullname,
            privilege,
            boot_option,
            home,
            library,
            home_disc,
            last_login,
        }
    }
}

/// The in-memory user table plus its backing file.
pub struct UserStore {
    path: PathBuf,
    records: Vec<UserRecord>,
}

impl UserStore {
    /// Loads the `Passwords` file under `root`, creating one with a single
    /// SYST account when none exists.
    pub async fn load(root: &Path) -> io::Result<Self> {
        let path = root.join("Passwords");
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                if bytes.len() % RECORD_LEN != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "password file is not a multiple of the record size",
                    ));
                }
                if bytes.len() > RECORD_LEN * MAX_USERS {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "password file too long"));
                }
                let records = bytes.chunks(RECORD_LEN).map(UserRecord::decode).collect();
                Ok(Self { path, records })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no password file, initialising with SYST");
                let store = Self { path, records: vec![UserRecord::system_user()] };
                tokio::fs::write(&store.path, store.records[0].encode()).await?;
                Ok(store)
            }
            Err(err) => Err(err),
        }
    }

    /// Number of record slots currently in the file.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u16) -> Option<&UserRecord> {
        self.records.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut UserRecord> {
        self.records.get_mut(id as usize)
    }

    /// Linear, case-insensitive username lookup skipping free slots.
    pub fn find(&self, username: &str) -> Option<u16> {
        self.records
            .iter()
            .position(|r| r.is_valid() && r.matches_name(username))
            .map(|id| id as u16)
    }

    /// First free slot, growing the table if there is room.
    pub fn allocate(&mut self) -> Option<u16> {
        if let Some(id) = self.records.iter().position(|r| !r.is_valid()) {
            return Some(id as u16);
        }
        if self.records.len() < MAX_USERS {
            self.records.push(UserRecord::empty());
            return Some((self.records.len() - 1) as u16);
        }
        None
    }

    /// Rewrites one record in place in the backing file.
    pub async fn persist(&self, id: u16) -> io::Result<()> {
        let record = self
            .records
            .get(id as usize)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such user record"))?;
        let mut file = OpenOptions::new().write(true).open(&self.path).await?;
        file.seek(SeekFrom::Start(id as u64 * RECORD_LEN as u64)).await?;
        file.write_all(&record.encode()).await?;
        file.flush().await?;
        Ok(())
    }
}
