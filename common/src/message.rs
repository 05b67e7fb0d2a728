use chrono::{DateTime, Utc};

/// A raw (uncompressed) image as published on the sensor topic.
///
/// Binary wire format (Kafka payload, integers big-endian):
///
///   [0]        version = 0x01
///   [1]        is_bigendian (0 or 1)
///   [2..10]    stamp_ms     (i64, Unix millis)
///   [10..14]   height       (u32)
///   [14..18]   width        (u32)
///   [18..22]   step         (u32, bytes per row)
///   [22]       encoding_len (u8)
///   [23..23+n] encoding     (ASCII, e.g. "mono16", "bgr8", "32FC1")
///   [..+4]     data_len     (u32)
///   [..]       data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMessage {
    pub stamp_ms: i64,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    pub step: u32,
    pub data: Vec<u8>,
}

const VERSION: u8 = 0x01;
const FIXED_HEADER_SIZE: usize = 23; // version + endian + ts + height + width + step + enc_len
const DATA_LEN_SIZE: usize = 4;

impl ImageMessage {
    pub fn new(
        stamp_ms: i64,
        height: u32,
        width: u32,
        encoding: impl Into<String>,
        step: u32,
        data: Vec<u8>,
    ) -> Self {
        Self {
            stamp_ms,
            height,
            width,
            encoding: encoding.into(),
            is_bigendian: false,
            step,
            data,
        }
    }

    /// Acquisition time carried by the message, if representable.
    pub fn stamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.stamp_ms)
    }

    /// Serialize to the binary wire format.
    ///
    /// Encoding names longer than 255 bytes are truncated; no real encoding
    /// comes close. Pixel data must fit the u32 length field, so payloads of
    /// 4 GiB or more are refused.
    pub fn serialize(&self) -> Result<Vec<u8>, MessageError> {
        let data_len = data_len_field(self.data.len())?;
        let encoding = &self.encoding.as_bytes()[..self.encoding.len().min(u8::MAX as usize)];
        let mut buf = Vec::with_capacity(
            FIXED_HEADER_SIZE + encoding.len() + DATA_LEN_SIZE + self.data.len(),
        );
        buf.push(VERSION);
        buf.push(self.is_bigendian as u8);
        buf.extend_from_slice(&self.stamp_ms.to_be_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.width.to_be_bytes());
        buf.extend_from_slice(&self.step.to_be_bytes());
        buf.push(encoding.len() as u8);
        buf.extend_from_slice(encoding);
        buf.extend_from_slice(&data_len.to_be_bytes());
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    /// Deserialize from a binary Kafka payload.
    pub fn deserialize(data: &[u8]) -> Result<Self, MessageError> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(MessageError::TooShort {
                got: data.len(),
                expected: FIXED_HEADER_SIZE,
            });
        }
        if data[0] != VERSION {
            return Err(MessageError::UnknownVersion(data[0]));
        }

        let is_bigendian = data[1] != 0;
        let stamp_ms = i64::from_be_bytes(read_array(&data[2..10]));
        let height = u32::from_be_bytes(read_array(&data[10..14]));
        let width = u32::from_be_bytes(read_array(&data[14..18]));
        let step = u32::from_be_bytes(read_array(&data[18..22]));
        let enc_len = data[22] as usize;

        let enc_end = FIXED_HEADER_SIZE + enc_len;
        let data_start = enc_end + DATA_LEN_SIZE;
        if data.len() < data_start {
            return Err(MessageError::TooShort {
                got: data.len(),
                expected: data_start,
            });
        }
        let encoding = std::str::from_utf8(&data[FIXED_HEADER_SIZE..enc_end])
            .map_err(|_| MessageError::InvalidEncodingName)?
            .to_string();

        let data_len = u32::from_be_bytes(read_array(&data[enc_end..data_start])) as usize;
        if data.len() < data_start + data_len {
            return Err(MessageError::TooShort {
                got: data.len(),
                expected: data_start + data_len,
            });
        }

        Ok(Self {
            stamp_ms,
            height,
            width,
            encoding,
            is_bigendian,
            step,
            data: data[data_start..data_start + data_len].to_vec(),
        })
    }
}

fn data_len_field(len: usize) -> Result<u32, MessageError> {
    u32::try_from(len).map_err(|_| MessageError::PayloadTooLarge(len))
}

// Callers always pass a slice of exactly N bytes.
fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("image message too short: got {got} bytes, expected at least {expected}")]
    TooShort { got: usize, expected: usize },
    #[error("unknown image message version {0:#04x}")]
    UnknownVersion(u8),
    #[error("image encoding name is not valid UTF-8")]
    InvalidEncodingName,
    #[error("image data of {0} bytes does not fit the 32-bit length field")]
    PayloadTooLarge(usize),
}
