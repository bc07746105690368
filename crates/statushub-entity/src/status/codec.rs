//! Compact binary cache encoding for [`StatusRecord`].
//!
//! Status records are read on every presence query, so they skip JSON.
//! Layout (big endian):
//!
//! ```text
//! version:u8 status:u8 flags:u8 last_activity_at:i64
//! user_id_len:u16 user_id
//! [active_channel_len:u16 active_channel]   flags & HAS_CHANNEL
//! [previous_status:u8]                      flags & HAS_PREVIOUS
//! [dnd_end_time:i64]                        flags & HAS_DND_END
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use statushub_core::error::{AppError, ErrorKind};
use statushub_core::result::AppResult;
use statushub_core::traits::cache::CacheCodec;

use super::{StatusRecord, UserStatus};

const VERSION: u8 = 1;

const MANUAL: u8 = 0b0001;
const HAS_CHANNEL: u8 = 0b0010;
const HAS_PREVIOUS: u8 = 0b0100;
const HAS_DND_END: u8 = 0b1000;

impl CacheCodec for StatusRecord {
    fn encode_fast(&self) -> Option<Bytes> {
        let user_len = u16::try_from(self.user_id.len()).ok()?;
        let channel_len = match &self.active_channel {
            Some(channel) => Some(u16::try_from(channel.len()).ok()?),
            None => None,
        };

        let mut flags = 0;
        if self.manual {
            flags |= MANUAL;
        }
        if channel_len.is_some() {
            flags |= HAS_CHANNEL;
        }
        if self.previous_status.is_some() {
            flags |= HAS_PREVIOUS;
        }
        if self.dnd_end_time.is_some() {
            flags |= HAS_DND_END;
        }

        let mut buf = BytesMut::with_capacity(32 + self.user_id.len());
        buf.put_u8(VERSION);
        buf.put_u8(self.status.code());
        buf.put_u8(flags);
        buf.put_i64(self.last_activity_at);
        buf.put_u16(user_len);
        buf.put_slice(self.user_id.as_bytes());
        if let (Some(len), Some(channel)) = (channel_len, &self.active_channel) {
            buf.put_u16(len);
            buf.put_slice(channel.as_bytes());
        }
        if let Some(previous) = self.previous_status {
            buf.put_u8(previous.code());
        }
        if let Some(end) = self.dnd_end_time {
            buf.put_i64(end);
        }
        Some(buf.freeze())
    }

    fn decode_fast(buf: &[u8]) -> Option<AppResult<Self>> {
        Some(decode(buf))
    }
}

fn decode(mut buf: &[u8]) -> AppResult<StatusRecord> {
    need(&buf, 11)?;
    let version = buf.get_u8();
    if version != VERSION {
        return Err(AppError::serialization(format!(
            "Unsupported status encoding version {version}"
        )));
    }
    let status = read_status(buf.get_u8())?;
    let flags = buf.get_u8();
    let last_activity_at = buf.get_i64();
    let user_id = read_string(&mut buf)?;

    let active_channel = if flags & HAS_CHANNEL != 0 {
        Some(read_string(&mut buf)?)
    } else {
        None
    };
    let previous_status = if flags & HAS_PREVIOUS != 0 {
        need(&buf, 1)?;
        Some(read_status(buf.get_u8())?)
    } else {
        None
    };
    let dnd_end_time = if flags & HAS_DND_END != 0 {
        need(&buf, 8)?;
        Some(buf.get_i64())
    } else {
        None
    };

    if buf.has_remaining() {
        return Err(AppError::serialization("Trailing bytes in status encoding"));
    }

    Ok(StatusRecord {
        user_id,
        status,
        manual: flags & MANUAL != 0,
        last_activity_at,
        active_channel,
        previous_status,
        dnd_end_time,
    })
}

fn need(buf: &impl Buf, len: usize) -> AppResult<()> {
    if buf.remaining() < len {
        return Err(AppError::serialization("Truncated status encoding"));
    }
    Ok(())
}

fn read_status(code: u8) -> AppResult<UserStatus> {
    UserStatus::from_code(code)
        .ok_or_else(|| AppError::serialization(format!("Unknown status code {code}")))
}

fn read_string(buf: &mut &[u8]) -> AppResult<String> {
    need(&*buf, 2)?;
    let len = usize::from(buf.get_u16());
    need(&*buf, len)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|e| {
        AppError::with_source(ErrorKind::Serialization, "Invalid UTF-8 in status encoding", e)
    })
}
