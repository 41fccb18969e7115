//! File metadata carried by STAT and DENT responses.

use crate::error::{AdbError, Result};
use crate::sync::protocol::{DENT_HEAD_SIZE, STAT_BODY_SIZE};
use bytes::Buf;
use chrono::{DateTime, Local, TimeZone, Utc};

/// Mask selecting the file-type bits of a POSIX mode.
pub const TYPE_MASK: u32 = 0o170000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Socket,
    Symlink,
    Regular,
    BlockDevice,
    Directory,
    CharDevice,
    Fifo,
}

impl FileType {
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & TYPE_MASK {
            0o140000 => Some(Self::Socket),
            0o120000 => Some(Self::Symlink),
            0o100000 => Some(Self::Regular),
            0o060000 => Some(Self::BlockDevice),
            0o040000 => Some(Self::Directory),
            0o020000 => Some(Self::CharDevice),
            0o010000 => Some(Self::Fifo),
            _ => None,
        }
    }

    pub fn type_bits(self) -> u32 {
        match self {
            Self::Socket => 0o140000,
            Self::Symlink => 0o120000,
            Self::Regular => 0o100000,
            Self::BlockDevice => 0o060000,
            Self::Directory => 0o040000,
            Self::CharDevice => 0o020000,
            Self::Fifo => 0o010000,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FilePermissions: u32 {
        const SET_UID = 0o4000;
        const SET_GID = 0o2000;
        const STICKY = 0o1000;
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC = 0o001;
    }
}

/// Metadata for one remote path, as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatistics {
    /// The path that was queried, or the entry name for listings
    pub path: String,
    /// Raw POSIX mode (type bits + permission bits)
    pub mode: u32,
    pub size: u32,
    /// Modification time in the local timezone
    pub time: DateTime<Local>,
}

impl FileStatistics {
    /// adbd answers STAT for a missing path with an all-zero body rather than
    /// FAIL.
    pub fn exists(&self) -> bool {
        self.mode != 0
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    pub fn permissions(&self) -> FilePermissions {
        FilePermissions::from_bits_truncate(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(FileType::Directory)
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == Some(FileType::Regular)
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == Some(FileType::Symlink)
    }

    pub fn unix_time(&self) -> i64 {
        self.time.timestamp()
    }
}

fn local_time(mtime: u32) -> DateTime<Local> {
    // Every u32 is a representable instant, so the fallback is unreachable
    Utc.timestamp_opt(i64::from(mtime), 0)
        .single()
        .unwrap_or_default()
        .with_timezone(&Local)
}

fn decode_record(path: String, payload: &mut &[u8]) -> Result<FileStatistics> {
    let mode = payload.get_u32_le();
    let size = payload.get_u32_le();
    let mtime = payload.get_u32_le();

    if mode != 0 && FileType::from_mode(mode).is_none() {
        return Err(AdbError::Format(format!(
            "Unknown file type bits {:o} in mode {:o}",
            mode & TYPE_MASK,
            mode
        )));
    }

    Ok(FileStatistics {
        path,
        mode,
        size,
        time: local_time(mtime),
    })
}

/// Decode a STAT body (mode, size, mtime). `path` is the queried path.
pub fn decode_stat(path: &str, payload: &[u8]) -> Result<FileStatistics> {
    if payload.len() != STAT_BODY_SIZE {
        return Err(AdbError::Format(format!(
            "STAT payload must be {} bytes, got {}",
            STAT_BODY_SIZE,
            payload.len()
        )));
    }
    let mut buf = payload;
    decode_record(path.to_string(), &mut buf)
}

/// Decode a DENT body (mode, size, mtime, namelen, name).
pub fn decode_dent(payload: &[u8]) -> Result<FileStatistics> {
    if payload.len() < DENT_HEAD_SIZE {
        return Err(AdbError::Format(format!(
            "DENT payload too short: {} bytes",
            payload.len()
        )));
    }
    let name_len = u32::from_le_bytes([payload[12], payload[13], payload[14], payload[15]]) as usize;
    let name_bytes = &payload[DENT_HEAD_SIZE..];
    if name_bytes.len() != name_len {
        return Err(AdbError::Format(format!(
            "DENT name length {} does not match {} trailing bytes",
            name_len,
            name_bytes.len()
        )));
    }
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    let mut head = &payload[..STAT_BODY_SIZE];
    decode_record(name, &mut head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dent(head: [u8; 12], name: &str) -> Vec<u8> {
        let mut payload = head.to_vec();
        payload.extend_from_slice(&(name.len() as u32).to_le_bytes());
        payload.extend_from_slice(name.as_bytes());
        payload
    }

    #[test]
    fn test_decode_stat_regular_file() {
        let stat = decode_stat(
            "/fstab.donatello",
            &[160, 129, 0, 0, 85, 2, 0, 0, 0, 0, 0, 0],
        )
        .unwrap();

        assert_eq!(stat.path, "/fstab.donatello");
        assert_eq!(stat.file_type(), Some(FileType::Regular));
        assert_eq!(stat.mode & TYPE_MASK, FileType::Regular.type_bits());
        assert_eq!(stat.size, 597);
        assert_eq!(stat.time, Utc.timestamp_opt(0, 0).unwrap().with_timezone(&Local));
        assert!(stat.exists());
        assert!(stat.is_file());
        assert_eq!(stat.permissions().bits(), 0o640);
    }

    #[test]
    fn test_decode_stat_wrong_length() {
        let err = decode_stat("/x", &[0u8; 11]).unwrap_err();
        assert!(matches!(err, AdbError::Format(_)));
        assert!(decode_stat("/x", &[0u8; 13]).is_err());
    }

    #[test]
    fn test_decode_stat_missing_path() {
        let stat = decode_stat("/nope", &[0u8; 12]).unwrap();
        assert!(!stat.exists());
        assert_eq!(stat.file_type(), None);
    }

    #[test]
    fn test_decode_stat_unknown_type_bits() {
        let mode: u32 = 0o030644;
        let mut payload = mode.to_le_bytes().to_vec();
        payload.extend_from_slice(&[0u8; 8]);
        assert!(decode_stat("/x", &payload).is_err());
    }

    #[test]
    fn test_decode_dent_listing_fixtures() {
        let time = Utc
            .with_ymd_and_hms(2015, 11, 3, 9, 47, 4)
            .unwrap()
            .with_timezone(&Local);

        let entry = decode_dent(&dent([233, 65, 0, 0, 0, 0, 0, 0, 152, 130, 56, 86], ".")).unwrap();
        assert_eq!(entry.path, ".");
        assert_eq!(entry.mode, 16873);
        assert!(entry.is_dir());
        assert_eq!(entry.time, time);

        let entry = decode_dent(&dent(
            [255, 161, 0, 0, 24, 0, 0, 0, 152, 130, 56, 86],
            "sdcard0",
        ))
        .unwrap();
        assert_eq!(entry.path, "sdcard0");
        assert_eq!(entry.mode, 41471);
        assert!(entry.is_symlink());
        assert_eq!(entry.size, 24);
        assert_eq!(entry.unix_time(), 1446544024);
    }

    #[test]
    fn test_decode_dent_name_mismatch() {
        let mut payload = dent([237, 65, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], "..");
        payload.push(b'x');
        assert!(matches!(decode_dent(&payload), Err(AdbError::Format(_))));
        assert!(decode_dent(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_file_type_roundtrip() {
        for ty in [
            FileType::Socket,
            FileType::Symlink,
            FileType::Regular,
            FileType::BlockDevice,
            FileType::Directory,
            FileType::CharDevice,
            FileType::Fifo,
        ] {
            assert_eq!(FileType::from_mode(ty.type_bits() | 0o755), Some(ty));
        }
    }
}
