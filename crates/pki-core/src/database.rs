//! CA database: serial counter, certificate index and CRL counter.
//!
//! The files use the formats `openssl ca` reads, so the OpenSSL toolkit can
//! regenerate CRLs straight from this state. Callers must hold the global
//! lock for any read-modify-write sequence; nothing here caches state
//! between calls.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::layout::{CommonName, StorageLayout};
use crate::{PkiError, Result};

/// First serial and CRL number handed out by a fresh CA.
pub const INITIAL_COUNTER: u64 = 0x1000;

/// Certificate serial number, normalized to uppercase hex without leading zeros.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Serial(String);

impl Serial {
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        Self(format!("{value:X}"))
    }

    /// Build from big-endian bytes as found in DER certificates and CRLs.
    #[must_use]
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self::normalize(&hex::encode_upper(bytes))
    }

    /// Parse a hex string such as `1000` or `0x0a1b`.
    pub fn from_hex(raw: &str) -> Result<Self> {
        let digits = raw
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PkiError::Index(format!("invalid serial {raw:?}")));
        }
        Ok(Self::normalize(&digits.to_ascii_uppercase()))
    }

    fn normalize(hex: &str) -> Self {
        let trimmed = hex.trim_start_matches('0');
        if trimmed.is_empty() {
            Self("0".into())
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Numeric value, if it fits in 64 bits.
    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        u64::from_str_radix(&self.0, 16).ok()
    }

    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status column of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Valid,
    Revoked,
    Expired,
}

impl EntryStatus {
    const fn flag(self) -> char {
        match self {
            Self::Valid => 'V',
            Self::Revoked => 'R',
            Self::Expired => 'E',
        }
    }
}

/// One line of `index.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub status: EntryStatus,
    pub expires: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub serial: Serial,
    /// Subject in `/C=../CN=..` form.
    pub subject: String,
}

impl IndexEntry {
    /// Value of the `CN=` attribute in the subject.
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.subject
            .split('/')
            .find_map(|part| part.strip_prefix("CN="))
    }

    fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 6 {
            return Err(PkiError::Index(format!(
                "expected 6 tab-separated fields, got {}",
                fields.len()
            )));
        }

        let status = match fields[0] {
            "V" => EntryStatus::Valid,
            "R" => EntryStatus::Revoked,
            "E" => EntryStatus::Expired,
            other => return Err(PkiError::Index(format!("unknown status {other:?}"))),
        };
        // Revocation field may carry ",reason".
        let revoked_at = match fields[2].split(',').next().unwrap_or_default() {
            "" => None,
            date => Some(parse_asn1_time(date)?),
        };

        Ok(Self {
            status,
            expires: parse_asn1_time(fields[1])?,
            revoked_at,
            serial: Serial::from_hex(fields[3])?,
            subject: fields[5].to_string(),
        })
    }
}

impl fmt::Display for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let revoked = self.revoked_at.map(format_asn1_time).unwrap_or_default();
        write!(
            f,
            "{}\t{}\t{}\t{}\tunknown\t{}",
            self.status.flag(),
            format_asn1_time(self.expires),
            revoked,
            self.serial,
            self.subject
        )
    }
}

/// Format as `YYMMDDHHMMSSZ`, or `YYYYMMDDHHMMSSZ` from 2050 on.
fn format_asn1_time(t: DateTime<Utc>) -> String {
    if t.year() < 2050 {
        t.format("%y%m%d%H%M%SZ").to_string()
    } else {
        t.format("%Y%m%d%H%M%SZ").to_string()
    }
}

fn parse_asn1_time(raw: &str) -> Result<DateTime<Utc>> {
    if !raw.is_ascii() {
        return Err(PkiError::Index(format!("invalid time {raw:?}")));
    }
    let full = match raw.len() {
        13 => {
            let century = if &raw[..2] < "50" { "20" } else { "19" };
            format!("{century}{raw}")
        }
        15 => raw.to_string(),
        _ => return Err(PkiError::Index(format!("invalid time {raw:?}"))),
    };
    NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M%SZ")
        .map(|naive| naive.and_utc())
        .map_err(|e| PkiError::Index(format!("invalid time {raw:?}: {e}")))
}

/// A revoked serial as handed to CRL generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEntry {
    pub serial: Serial,
    pub revoked_at: DateTime<Utc>,
}

/// Access to the CA database files.
#[derive(Debug, Clone)]
pub struct CaDatabase {
    index: PathBuf,
    serial: PathBuf,
    crl_number: PathBuf,
}

impl CaDatabase {
    #[must_use]
    pub fn new(layout: &StorageLayout) -> Self {
        Self {
            index: layout.index(),
            serial: layout.serial(),
            crl_number: layout.crl_number(),
        }
    }

    /// Seed an empty index and both counters.
    pub async fn create(&self) -> Result<()> {
        write_atomic(&self.index, b"").await?;
        self.write_counter(&self.serial, INITIAL_COUNTER).await?;
        self.write_counter(&self.crl_number, INITIAL_COUNTER).await
    }

    pub async fn entries(&self) -> Result<Vec<IndexEntry>> {
        let content = tokio::fs::read_to_string(&self.index)
            .await
            .map_err(|e| PkiError::io(&self.index, e))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(IndexEntry::parse)
            .collect()
    }

    async fn store(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut content = String::new();
        for entry in entries {
            content.push_str(&entry.to_string());
            content.push('\n');
        }
        write_atomic(&self.index, content.as_bytes()).await
    }

    pub async fn append(&self, entry: IndexEntry) -> Result<()> {
        let mut entries = self.entries().await?;
        entries.push(entry);
        self.store(&entries).await
    }

    /// Mark the newest valid entry for `cn` as revoked.
    pub async fn revoke(&self, cn: &CommonName, at: DateTime<Utc>) -> Result<IndexEntry> {
        let mut entries = self.entries().await?;
        let entry = entries
            .iter_mut()
            .rev()
            .find(|e| e.status == EntryStatus::Valid && e.common_name() == Some(cn.as_str()))
            .ok_or_else(|| PkiError::NotFound {
                common_name: cn.to_string(),
            })?;

        entry.status = EntryStatus::Revoked;
        entry.revoked_at = Some(at);
        let revoked = entry.clone();
        self.store(&entries).await?;
        Ok(revoked)
    }

    pub async fn revoked(&self) -> Result<Vec<RevokedEntry>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter(|e| e.status == EntryStatus::Revoked)
            .filter_map(|e| {
                e.revoked_at.map(|revoked_at| RevokedEntry {
                    serial: e.serial,
                    revoked_at,
                })
            })
            .collect())
    }

    pub async fn revoked_serials(&self) -> Result<BTreeSet<Serial>> {
        Ok(self.revoked().await?.into_iter().map(|e| e.serial).collect())
    }

    pub async fn next_serial(&self) -> Result<u64> {
        self.read_counter(&self.serial).await
    }

    pub async fn set_next_serial(&self, value: u64) -> Result<()> {
        self.write_counter(&self.serial, value).await
    }

    pub async fn crl_number(&self) -> Result<u64> {
        self.read_counter(&self.crl_number).await
    }

    pub async fn set_crl_number(&self, value: u64) -> Result<()> {
        self.write_counter(&self.crl_number, value).await
    }

    async fn read_counter(&self, path: &Path) -> Result<u64> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PkiError::io(path, e))?;
        u64::from_str_radix(raw.trim(), 16)
            .map_err(|e| PkiError::Index(format!("{}: {e}", path.display())))
    }

    async fn write_counter(&self, path: &Path, value: u64) -> Result<()> {
        write_atomic(path, format!("{value:X}\n").as_bytes()).await
    }
}

/// Write via a sibling temp file and rename, so readers never see a torn file.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, contents)
        .await
        .map_err(|e| PkiError::io(&partial, e))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| PkiError::io(path, e))
}
