//! Mifare Classic 1K access: authentication, block reads/writes, sector
//! and full-card dumps.
//!
//! The reader keeps its session authenticated for a block after a
//! successful exchange, but that is never relied on here: every block
//! access re-authenticates, including the verification read after a write.

use crate::error::{AccessError, Result};
use crate::ident::CardKind;
use crate::transport::{CardTransport, TransportError};
use log::{debug, error, info, warn};
use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

/// Bytes per block
pub const BLOCK_SIZE: usize = 16;
/// Blocks on a 1K card
pub const BLOCK_COUNT: u8 = 64;
/// Sectors on a 1K card
pub const SECTOR_COUNT: u8 = 16;
/// Blocks per sector
pub const BLOCKS_PER_SECTOR: u8 = 4;

/// Buzzer control APDUs (ACR122U pseudo-APDU, P2 selects on/off)
const BUZZER_OFF: [u8; 5] = [0xFF, 0x00, 0x52, 0x00, 0x00];
const BUZZER_ON: [u8; 5] = [0xFF, 0x00, 0x52, 0xFF, 0x00];

/// Antenna field control (PN532 RFConfiguration wrapped in a pseudo-APDU)
const ANTENNA_OFF: [u8; 9] = [0xFF, 0x00, 0x00, 0x00, 0x04, 0xD4, 0x32, 0x01, 0x00];
const ANTENNA_ON: [u8; 9] = [0xFF, 0x00, 0x00, 0x00, 0x04, 0xD4, 0x32, 0x01, 0x01];

/// Contents of one successfully read block
pub type BlockData = [u8; BLOCK_SIZE];

/// A 6-byte sector key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Key([u8; 6]);

impl Key {
    /// Factory default transport key (FF FF FF FF FF FF)
    pub const DEFAULT: Key = Key([0xFF; 6]);

    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Key(bytes)
    }

    /// Parse a key from a 12-character hex string (case-insensitive).
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| AccessError::InvalidKey(format!("{s:?}: {e}")))?;
        if bytes.len() != 6 {
            return Err(AccessError::InvalidKey(format!(
                "{s:?}: expected 6 bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; 6];
        key.copy_from_slice(&bytes);
        Ok(Key(key))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl FromStr for Key {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        Key::from_hex(s)
    }
}

/// Sector key type. Each type maps to a fixed wire opcode and a fixed
/// on-reader key slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyType {
    /// Key A (opcode 0x60, slot 0)
    A,
    /// Key B (opcode 0x61, slot 1)
    B,
}

impl KeyType {
    /// Wire opcode sent with the authenticate command.
    pub fn opcode(self) -> u8 {
        match self {
            KeyType::A => 0x60,
            KeyType::B => 0x61,
        }
    }

    /// On-reader key slot the key of this type is loaded into.
    pub fn slot(self) -> u8 {
        match self {
            KeyType::A => 0x00,
            KeyType::B => 0x01,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::A => write!(f, "A"),
            KeyType::B => write!(f, "B"),
        }
    }
}

impl FromStr for KeyType {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" | "a" => Ok(KeyType::A),
            "B" | "b" => Ok(KeyType::B),
            other => Err(AccessError::InvalidFormat(format!(
                "unknown key type {other:?} (expected A or B)"
            ))),
        }
    }
}

/// One sector's worth of block reads. Failed blocks stay `None`; the
/// sector always carries exactly four entries.
#[derive(Debug, Clone)]
pub struct SectorDump {
    /// Sector index in [0, 15]
    pub sector: u8,
    /// The four blocks of the sector, in address order
    pub blocks: [Option<BlockData>; BLOCKS_PER_SECTOR as usize],
}

impl SectorDump {
    /// Absolute address of the block at `offset` within this sector.
    ///
    /// Widened internally so a caller-built dump with an out-of-range
    /// sector cannot overflow.
    pub fn block_address(&self, offset: usize) -> u8 {
        (u16::from(self.sector) * u16::from(BLOCKS_PER_SECTOR) + offset as u16) as u8
    }
}

/// Handle for one Mifare Classic 1K card behind an exclusively-owned
/// transport.
///
/// The default key and key type are injected at construction and used by
/// any call that omits explicit credentials; the fallback is logged as a
/// warning rather than applied silently.
pub struct MifareClassic<T> {
    transport: T,
    default_key: Key,
    default_key_type: KeyType,
}

impl<T: CardTransport> MifareClassic<T> {
    /// Wrap a transport with the factory default key and key type A.
    pub fn new(transport: T) -> Self {
        Self::with_defaults(transport, Key::DEFAULT, KeyType::A)
    }

    /// Wrap a transport with explicit default credentials.
    pub fn with_defaults(transport: T, default_key: Key, default_key_type: KeyType) -> Self {
        MifareClassic {
            transport,
            default_key,
            default_key_type,
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read the card UID.
    pub fn uid(&self) -> Result<Vec<u8>> {
        Ok(self.transport.uid()?)
    }

    /// Identify the card type from its ATR.
    pub fn identify(&self) -> Result<CardKind> {
        let atr = self.transport.atr()?;
        Ok(CardKind::from_atr(&atr))
    }

    /// Authenticate to `block` with the given key and key type, falling
    /// back to the injected defaults when either is omitted.
    ///
    /// One protocol attempt, no retry. A rejected key load or authenticate
    /// command yields `Ok(false)` with a diagnostic; only an out-of-range
    /// block is an error.
    pub fn authenticate(
        &self,
        block: u8,
        key: Option<Key>,
        key_type: Option<KeyType>,
    ) -> Result<bool> {
        if block >= BLOCK_COUNT {
            return Err(AccessError::InvalidBlock { block });
        }
        let key_type = key_type.unwrap_or_else(|| {
            warn!("no key type given, using default key type {}", self.default_key_type);
            self.default_key_type
        });
        let key = key.unwrap_or_else(|| {
            warn!("no key given, using default key {}", self.default_key);
            self.default_key
        });

        let slot = key_type.slot();
        if let Err(e) = self.transport.load_key(slot, key.as_bytes()) {
            error!("failed to load key {key} into slot {slot}: {e}");
            return Ok(false);
        }
        debug!("loaded key {key} into slot {slot}");

        if let Err(e) = self.transport.authenticate(block, key_type.opcode(), slot) {
            error!("authentication failed for block {block} as type {key_type}: {e}");
            return Ok(false);
        }
        info!("authenticated block {block} with key {key} as type {key_type}");
        Ok(true)
    }

    /// Read one 16-byte block, authenticating first.
    pub fn read_block(
        &self,
        block: u8,
        key: Option<Key>,
        key_type: Option<KeyType>,
    ) -> Result<BlockData> {
        if !self.authenticate(block, key, key_type)? {
            return Err(AccessError::AuthenticationFailed {
                block,
                key_type: key_type.unwrap_or(self.default_key_type),
            });
        }

        let data = self.transport.read_binary(block, BLOCK_SIZE as u8)?;
        if data.len() != BLOCK_SIZE {
            return Err(AccessError::Transport(TransportError::ShortResponse(
                data.len(),
            )));
        }
        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&data);
        debug!("block {}: {}", block, hex::encode_upper(out));
        Ok(out)
    }

    /// Write one block from a 32-character hex payload, then verify.
    ///
    /// The payload is validated before any command is sent. After the
    /// update command the block is read back (re-authenticating) and
    /// compared byte for byte; the reader's write acknowledgement alone is
    /// not trusted.
    pub fn write_block(
        &self,
        block: u8,
        data: &str,
        key: Option<Key>,
        key_type: Option<KeyType>,
    ) -> Result<()> {
        if data.len() != 2 * BLOCK_SIZE {
            return Err(AccessError::InvalidPayload(format!(
                "expected {} hex characters, got {}",
                2 * BLOCK_SIZE,
                data.len()
            )));
        }
        let decoded = hex::decode(data)
            .map_err(|e| AccessError::InvalidPayload(format!("not a hex string: {e}")))?;
        let mut payload = [0u8; BLOCK_SIZE];
        payload.copy_from_slice(&decoded);

        if !self.authenticate(block, key, key_type)? {
            return Err(AccessError::AuthenticationFailed {
                block,
                key_type: key_type.unwrap_or(self.default_key_type),
            });
        }
        self.transport.update_binary(block, &payload)?;
        debug!("update issued for block {block}");

        let written = self.read_block(block, key, key_type)?;
        if written == payload {
            info!("write verified for block {block}");
            Ok(())
        } else {
            let expected = hex::encode_upper(payload);
            let received = hex::encode_upper(written);
            error!("write verification failed for block {block}");
            error!("expected: {expected}");
            error!("received: {received}");
            Err(AccessError::VerificationMismatch {
                block,
                expected,
                received,
            })
        }
    }

    /// Read all four blocks of a sector with the default credentials.
    ///
    /// Each block is attempted regardless of its siblings' outcomes; a
    /// failed block is recorded as `None` with a diagnostic.
    pub fn read_sector(&self, sector: u8) -> Result<SectorDump> {
        if sector >= SECTOR_COUNT {
            return Err(AccessError::InvalidSector { sector });
        }
        let mut blocks = [None; BLOCKS_PER_SECTOR as usize];
        for offset in 0..BLOCKS_PER_SECTOR {
            let block = sector * BLOCKS_PER_SECTOR + offset;
            match self.read_block(block, None, None) {
                Ok(data) => blocks[offset as usize] = Some(data),
                Err(e) => error!("failed to read block {block}: {e}"),
            }
        }
        Ok(SectorDump { sector, blocks })
    }

    /// Dump all 16 sectors. Always issues 64 block attempts, whatever the
    /// intermediate failures.
    pub fn read_card(&self) -> Result<Vec<SectorDump>> {
        let mut sectors = Vec::with_capacity(SECTOR_COUNT as usize);
        for sector in 0..SECTOR_COUNT {
            sectors.push(self.read_sector(sector)?);
        }
        Ok(sectors)
    }

    /// Pass an arbitrary APDU through to the reader.
    pub fn raw_command(&self, apdu: &[u8]) -> Result<Vec<u8>> {
        Ok(self.transport.raw_command(apdu)?)
    }

    /// Mute the reader buzzer.
    pub fn mute(&self) -> Result<()> {
        self.raw_command(&BUZZER_OFF)?;
        info!("reader buzzer muted");
        Ok(())
    }

    /// Enable the reader buzzer.
    pub fn beep(&self) -> Result<()> {
        self.raw_command(&BUZZER_ON)?;
        info!("reader buzzer enabled");
        Ok(())
    }

    /// Power-cycle the antenna field: off, a 5 second pause, on again.
    pub fn power_cycle_antenna(&self) -> Result<()> {
        self.raw_command(&ANTENNA_OFF)?;
        thread::sleep(Duration::from_secs(5));
        self.raw_command(&ANTENNA_ON)?;
        info!("antenna power cycled");
        Ok(())
    }
}
