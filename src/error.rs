//! Fileserver error taxonomy and the mapping onto 8-bit wire codes.
//!
//! Every handler error surfaces to the client as a single reply of the form
//! `{0x00, code, message, 0x0D}`. The codes and texts are part of the
//! protocol surface and must not drift: Acorn clients match on both.

use crate::resolve::ResolveError;

/// Result of handler operations with error type [`FsError`].
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors surfaced to clients as numeric wire errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// Request from a station with no active session (0xBF).
    WhoAreYou,
    /// Username not present in the user table (0xBC).
    UserNotKnown,
    /// Login with an incorrect password (0xBC).
    WrongPassword,
    /// Login to an account with the locked privilege bit (0xBC).
    AccountLocked,
    /// Referenced user does not exist (0xBC).
    NoSuchUser,
    /// Referenced user exists but is not logged on (0xBC).
    NotLoggedOn,
    /// User record found but privilege change target missing (0xBC).
    UserNotFound,
    /// The session table is full (0xB8).
    TooManyUsers,
    /// Password change with a wrong current password (0xB9).
    BadPassword,
    /// Operation reserved to a higher privilege (0xBA).
    InsufficientPrivilege,
    /// The requester lacks access to the object (0xBD).
    InsufficientAccess,
    /// Boot option outside the accepted range (0xBD).
    BadOption,
    /// A directory was expected (0xAF).
    TypesDontMatch,
    /// A directory could not be mapped, with the failing role (0xA8).
    BadDirectory(&'static str),
    /// No handle slot is free, or the referenced handle is dead (0xDE).
    Channel,
    /// The interlocked file table, or the handle table, is full (0xC0).
    TooManyOpenFiles,
    /// No free directory channel (0xC0).
    TooManyOpenDirs,
    /// Interlock refusal: someone else holds the file (0xC2).
    AlreadyOpen,
    /// Write to a handle opened read-only (0xC1).
    NotOpenForUpdate,
    /// The object carries the locked attribute (0xC3).
    Locked,
    /// Locked variant used by delete and rename (0xC3).
    EntryLocked,
    /// Directory exists but cannot be read (0xC7).
    DirUnreadable,
    /// Path failed to parse (0xCC).
    BadPath,
    /// Malformed leaf name in a path argument (0xCC).
    BadFilename,
    /// Missing or malformed leaf name in a command (0xFC).
    BadFileName,
    /// Command arguments could not be split into paths (0xFD).
    BadString,
    /// Malformed permission letters (0xCF).
    BadAttribute,
    /// Object not found (0xD6).
    NotFound,
    /// Object not found, alternate code used by move/copy/link (0xDC).
    NotFoundDc,
    /// File not found where a file was required (0xD6).
    NotAFile,
    /// Second read attempt past the end of a file (0xDF).
    Eof,
    /// Unknown or malformed command (0xFE).
    BadCommand,
    /// A file that resolved fine refused to open (0xFE).
    CannotOpen,
    /// Missing object reported through the command-error code (0xFE).
    CommandNotFound,
    /// Catch-all fileserver error with a fixed message (0xFF).
    Fs(&'static str),
    /// Catch-all fileserver error with a computed message (0xFF).
    Report(String),
}

impl FsError {
    /// The 8-bit error code sent on the wire.
    pub fn code(&self) -> u8 {
        match self {
            FsError::WhoAreYou => 0xbf,
            FsError::UserNotKnown
            | FsError::WrongPassword
            | FsError::AccountLocked
            | FsError::NoSuchUser
            | FsError::NotLoggedOn
            | FsError::UserNotFound => 0xbc,
            FsError::TooManyUsers => 0xb8,
            FsError::BadPassword => 0xb9,
            FsError::InsufficientPrivilege => 0xba,
            FsError::InsufficientAccess | FsError::BadOption => 0xbd,
            FsError::TypesDontMatch => 0xaf,
            FsError::BadDirectory(_) => 0xa8,
            FsError::Channel => 0xde,
            FsError::TooManyOpenFiles | FsError::TooManyOpenDirs => 0xc0,
            FsError::AlreadyOpen => 0xc2,
            FsError::NotOpenForUpdate => 0xc1,
            FsError::Locked | FsError::EntryLocked => 0xc3,
            FsError::DirUnreadable => 0xc7,
            FsError::BadPath | FsError::BadFilename => 0xcc,
            FsError::BadFileName => 0xfc,
            FsError::BadString => 0xfd,
            FsError::BadAttribute => 0xcf,
            FsError::NotFound | FsError::NotAFile => 0xd6,
            FsError::NotFoundDc => 0xdc,
            FsError::Eof => 0xdf,
            FsError::BadCommand | FsError::CannotOpen | FsError::CommandNotFound => 0xfe,
            FsError::Fs(_) | FsError::Report(_) => 0xff,
        }
    }

    /// The textual message that accompanies the code.
    pub fn message(&self) -> &str {
        match self {
            FsError::WhoAreYou => "Who are you ?",
            FsError::UserNotKnown => "User not known",
            FsError::WrongPassword => "Wrong password",
            FsError::AccountLocked => "Account locked",
            FsError::NoSuchUser => "No such user",
            FsError::NotLoggedOn => "No such user or not logged on",
            FsError::UserNotFound => "User not found",
            FsError::TooManyUsers => "Too many users",
            FsError::BadPassword => "Bad password",
            FsError::InsufficientPrivilege => "Insufficient privilege",
            FsError::InsufficientAccess => "Insufficient access",
            FsError::BadOption => "Bad option",
            FsError::TypesDontMatch => "Types don't match",
            FsError::BadDirectory(role) => role,
            FsError::Channel => "Channel ?",
            FsError::TooManyOpenFiles => "Too many open files",
            FsError::TooManyOpenDirs => "Too many open directories",
            FsError::AlreadyOpen => "Already open",
            FsError::NotOpenForUpdate => "Not open for update",
            FsError::Locked => "Locked",
            FsError::EntryLocked => "Entry locked",
            FsError::DirUnreadable => "Dir unreadable",
            FsError::BadPath => "Bad path",
            FsError::BadFilename => "Bad filename",
            FsError::BadFileName => "Bad file name",
            FsError::BadString => "Bad string",
            FsError::BadAttribute => "Bad attribute",
            FsError::NotFound => "Not found",
            FsError::NotFoundDc => "Not found",
            FsError::NotAFile => "Not a file",
            FsError::Eof => "EOF",
            FsError::BadCommand => "Bad command",
            FsError::CannotOpen => "Cannot open file",
            FsError::CommandNotFound => "Not found",
            FsError::Fs(msg) => msg,
            FsError::Report(msg) => msg,
        }
    }
}

impl From<ResolveError> for FsError {
    /// Default mapping for call sites that do not care which way a
    /// resolution failed. Handlers that must distinguish (save reports
    /// 0xCC, move reports 0xDC) match on [`ResolveError`] themselves.
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::BadFormat | ResolveError::TooLong => FsError::BadPath,
            ResolveError::NoDisc => FsError::Fs("No such disc"),
            ResolveError::NoDir => FsError::NotFound,
            ResolveError::BadType => FsError::TypesDontMatch,
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(_: std::io::Error) -> Self {
        FsError::Fs("FS Error")
    }
}
