//! Codecs between the fileserver's dotted namespace and the host.
//!
//! Covers the four translation concerns every other module leans on: the
//! '/' versus ':' escape between namespaces, wildcard patterns, the
//! permission byte in both its internal and wire encodings, and the
//! two-byte packed modification date.

use bitflags::bitflags;
use regex::Regex;

/// Longest name a directory entry may carry.
pub const MAX_NAME_LEN: usize = 10;

/// Longest path, in components, the resolver will walk.
pub const MAX_PATH_COMPONENTS: usize = 30;

/// Character class accepted in names, doubling as the match set for the
/// '#' single-character wildcard.
const NAME_CLASS: &str = r"[A-Za-z0-9\]\[\\*#+_;:?/£!@%^{}~,=<>|-]";

bitflags! {
    /// Internal permission byte stored in the attribute sidecar.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perm: u8 {
        /// Hidden from directory listings unless owned.
        const HIDDEN = 0x80;
        /// Write by others.
        const OTHER_WRITE = 0x20;
        /// Read by others.
        const OTHER_READ = 0x10;
        /// Locked against modification and deletion.
        const LOCKED = 0x04;
        /// Write by owner.
        const OWNER_WRITE = 0x02;
        /// Read by owner.
        const OWNER_READ = 0x01;
    }
}

impl Perm {
    /// Default permissions for an object with no sidecar entry.
    pub fn default_object() -> Perm {
        Perm::OWNER_READ | Perm::OWNER_WRITE | Perm::OTHER_READ
    }

    /// Default permissions for a freshly created or root object.
    pub fn owner_only() -> Perm {
        Perm::OWNER_READ | Perm::OWNER_WRITE
    }
}

/// Converts an on-disc name into its dotted-namespace form (':' becomes '/').
pub fn host_to_acorn(name: &str) -> String {
    name.replace(':', "/")
}

/// Converts a dotted-namespace name into its on-disc form ('/' becomes ':').
pub fn acorn_to_host(name: &str) -> String {
    name.replace('/', ":")
}

/// True when `s` is a well-formed name: 1 to 10 characters of the name class.
pub fn is_valid_name(s: &str) -> bool {
    if s.is_empty() || s.chars().count() > MAX_NAME_LEN {
        return false;
    }
    let class = Regex::new(&format!("^{}+$", NAME_CLASS)).expect("name class compiles");
    class.is_match(s)
}

/// True when the name carries either wildcard character.
pub fn has_wildcard(s: &str) -> bool {
    s.contains('#') || s.contains('*')
}

/// Expands a wildcard name into an anchored, case-insensitive pattern:
/// '#' matches one name-class character, '*' any run of them.
pub fn wildcard_to_pattern(glob: &str) -> String {
    let mut body = String::new();
    for ch in glob.chars() {
        match ch {
            '#' => body.push_str(NAME_CLASS),
            '*' => {
                body.push_str(NAME_CLASS);
                body.push('*');
            }
            other => body.push_str(&regex::escape(&other.to_string())),
        }
    }
    format!("(?i)^{}$", body)
}

/// Compiles a wildcard name for matching against directory entries.
pub fn compile_wildcard(glob: &str) -> Option<Regex> {
    Regex::new(&wildcard_to_pattern(glob)).ok()
}

/// Maps the internal permission byte to the wire encoding. Directories set
/// bit 5; locked moves to bit 4; owner bits shift up to 2-3 and other bits
/// down to 0-1; hidden passes through as bit 7.
pub fn perm_to_wire(perm: Perm, is_dir: bool) -> u8 {
    let bits = perm.bits();
    let mut wire = bits & Perm::HIDDEN.bits();
    if is_dir {
        wire |= 0x20;
    }
    if perm.contains(Perm::LOCKED) {
        wire |= 0x10;
    }
    wire |= (bits & (Perm::OWNER_READ | Perm::OWNER_WRITE).bits()) << 2;
    wire |= (bits & (Perm::OTHER_READ | Perm::OTHER_WRITE).bits()) >> 4;
    wire
}

/// Inverse of [`perm_to_wire`]. The directory bit is presentation only and
/// is dropped.
pub fn wire_to_perm(wire: u8) -> Perm {
    let mut bits = wire & Perm::HIDDEN.bits();
    if wire & 0x10 != 0 {
        bits |= Perm::LOCKED.bits();
    }
    bits |= (wire & 0x0c) >> 2;
    bits |= (wire & 0x03) << 4;
    Perm::from_bits_truncate(bits)
}

/// Server-wide choice of packed-date encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMode {
    /// Four bits of year-since-1981 in the month byte: 1981 to 1996.
    Standard,
    /// Seven bits of year spread over the spare day and month bits:
    /// 1981 to 2108.
    Extended,
}

/// First year representable in either encoding.
pub const DATE_EPOCH_YEAR: u16 = 1981;

/// Packs a calendar date into the `(day, month-year)` byte pair.
pub fn pack_date(mode: DateMode, day: u8, month: u8, year: u16) -> (u8, u8) {
    let offset = year.saturating_sub(DATE_EPOCH_YEAR) as u8;
    let mut day_byte = day & 0x1f;
    let mut monthyear = month & 0x0f;
    match mode {
        DateMode::Standard => {
            monthyear |= (offset & 0x0f) << 4;
        }
        DateMode::Extended => {
            day_byte |= (offset & 0x07) << 5;
            monthyear |= ((offset & 0x78) << 1) & 0xf0;
        }
    }
    (day_byte, monthyear)
}

/// Recovers `(day, month, year)` from the packed byte pair.
pub fn unpack_date(mode: DateMode, day_byte: u8, monthyear: u8) -> (u8, u8, u16) {
    let day = day_byte & 0x1f;
    let month = monthyear & 0x0f;
    let offset = match mode {
        DateMode::Standard => (monthyear & 0xf0) >> 4,
        DateMode::Extended => ((monthyear & 0xf0) >> 1) | ((day_byte & 0xe0) >> 5),
    };
    (day, month, DATE_EPOCH_YEAR + offset as u16)
}

/// Two-digit display year used by catalogue listings.
pub fn display_year(mode: DateMode, day_byte: u8, monthyear: u8) -> u8 {
    let (_, _, year) = unpack_date(mode, day_byte, monthyear);
    (year % 100) as u8
}
