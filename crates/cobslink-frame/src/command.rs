//! Command identifiers understood by the controller firmware.
//!
//! Commands occupy the low five bits of the second header byte, so values
//! 0-31 are representable. The values below are fixed by the device.

/// Analog channel reading (channel byte + 16-bit big-endian value).
pub const ANALOG: u8 = 3;

/// Keypad event (packed column/row/state byte).
pub const KEYPAD: u8 = 4;

/// Echo / round-trip request and reply.
pub const ECHO: u8 = 20;

/// Statistics counter snapshot (index byte + 32-bit big-endian value).
pub const STATISTICS: u8 = 23;

/// Task runtime status (index byte + three 32-bit big-endian fields).
pub const TASK_STATUS: u8 = 24;

/// Highest representable command value.
pub const MAX_COMMAND: u8 = 0x1F;

/// Returns a human-readable name for a command value.
pub fn command_name(command: u8) -> &'static str {
    match command {
        ANALOG => "ANALOG",
        KEYPAD => "KEYPAD",
        ECHO => "ECHO",
        STATISTICS => "STATISTICS",
        TASK_STATUS => "TASK_STATUS",
        0..=MAX_COMMAND => "UNKNOWN",
        _ => "INVALID",
    }
}

/// Returns true if the command is one the firmware is known to use.
pub fn is_known(command: u8) -> bool {
    matches!(command, ANALOG | KEYPAD | ECHO | STATISTICS | TASK_STATUS)
}

/// A keypad event decoded from the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub column: u8,
    pub row: u8,
    pub pressed: bool,
}

impl KeyEvent {
    /// Decode `payload[0]`: column in bits 7..4, row in bits 4..1, state in bit 0.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let byte = *payload.first()?;
        Some(Self {
            column: (byte >> 4) & 0x0F,
            row: (byte >> 1) & 0x0F,
            pressed: byte & 0x01 == 1,
        })
    }
}

/// An analog reading decoded from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogReading {
    pub channel: u8,
    pub value: u16,
}

impl AnalogReading {
    /// Decode `[channel, value_hi, value_lo, ..]`.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [channel, hi, lo, ..] => Some(Self {
                channel: *channel,
                value: u16::from_be_bytes([*hi, *lo]),
            }),
            _ => None,
        }
    }
}

/// One firmware statistics counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsEntry {
    pub index: u8,
    pub value: u32,
}

impl StatisticsEntry {
    /// Decode `[index, value (4 bytes BE), ..]`.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [index, rest @ ..] => Some(Self {
                index: *index,
                value: be_u32(rest, 0)?,
            }),
            _ => None,
        }
    }
}

/// Runtime figures for one firmware task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStatus {
    pub index: u8,
    /// Accumulated run time in microseconds.
    pub absolute_time_us: u32,
    pub percent_time: u32,
    /// Stack high watermark as reported by the firmware.
    pub high_watermark: u32,
}

impl TaskStatus {
    /// Decode `[index, abs time, percent, watermark, ..]`, each field 4 bytes BE.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [index, rest @ ..] => Some(Self {
                index: *index,
                absolute_time_us: be_u32(rest, 0)?,
                percent_time: be_u32(rest, 4)?,
                high_watermark: be_u32(rest, 8)?,
            }),
            _ => None,
        }
    }
}

fn be_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let field = bytes.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([field[0], field[1], field[2], field[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_for_known_commands() {
        assert_eq!(command_name(ECHO), "ECHO");
        assert_eq!(command_name(KEYPAD), "KEYPAD");
        assert_eq!(command_name(ANALOG), "ANALOG");
        assert_eq!(command_name(STATISTICS), "STATISTICS");
        assert_eq!(command_name(TASK_STATUS), "TASK_STATUS");
        assert_eq!(command_name(7), "UNKNOWN");
        assert_eq!(command_name(32), "INVALID");
    }

    #[test]
    fn known_set() {
        assert!(is_known(20));
        assert!(!is_known(0));
        assert!(!is_known(31));
    }

    #[test]
    fn keypad_byte_unpacks() {
        let event = KeyEvent::from_payload(&[0b0010_1011]).unwrap();
        assert_eq!(
            event,
            KeyEvent {
                column: 2,
                row: 5,
                pressed: true
            }
        );
        assert!(KeyEvent::from_payload(&[]).is_none());
    }

    #[test]
    fn analog_value_is_big_endian() {
        let reading = AnalogReading::from_payload(&[2, 0x01, 0x2C]).unwrap();
        assert_eq!(reading.channel, 2);
        assert_eq!(reading.value, 300);
        assert!(AnalogReading::from_payload(&[2, 0x01]).is_none());
    }

    #[test]
    fn statistics_entry_unpacks() {
        let entry = StatisticsEntry::from_payload(&[7, 0x00, 0x01, 0x00, 0x02]).unwrap();
        assert_eq!(
            entry,
            StatisticsEntry {
                index: 7,
                value: 65_538
            }
        );
        assert!(StatisticsEntry::from_payload(&[7, 0, 0, 1]).is_none());
        assert!(StatisticsEntry::from_payload(&[]).is_none());
    }

    #[test]
    fn task_status_unpacks_three_fields() {
        let payload = [
            2, 0x00, 0x00, 0x03, 0xE8, 0x00, 0x00, 0x00, 0x2A, 0x00, 0x00, 0x01, 0x00,
        ];
        let status = TaskStatus::from_payload(&payload).unwrap();
        assert_eq!(status.index, 2);
        assert_eq!(status.absolute_time_us, 1000);
        assert_eq!(status.percent_time, 42);
        assert_eq!(status.high_watermark, 256);
        assert!(TaskStatus::from_payload(&payload[..12]).is_none());
    }
}
