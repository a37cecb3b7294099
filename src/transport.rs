//! Reader transport: the PC/SC boundary and the trait that abstracts it.
//!
//! Every card command is an APDU transmitted to the reader; a response is
//! valid when it carries at least the two trailing status bytes and those
//! bytes are `90 00`. Anything else is a transport failure.

use log::{info, warn};
use pcsc::{Card, Context, Protocols, Scope, ShareMode, MAX_ATR_SIZE, MAX_BUFFER_SIZE};
use thiserror::Error;

/// Errors raised by the reader transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// PC/SC layer failure (no reader, no card, communication lost)
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// The reader answered with a non-success status word
    #[error("command rejected with status {sw1:02X} {sw2:02X}")]
    Status {
        /// First status byte
        sw1: u8,
        /// Second status byte
        sw2: u8,
    },

    /// The response did not even contain the two status bytes
    #[error("response too short ({0} bytes)")]
    ShortResponse(usize),
}

/// Commands the card access layer needs from a reader.
///
/// `PcscTransport` is the production implementation; tests substitute a
/// scripted mock. The card session behind this trait holds global mutable
/// state (loaded key slots, current authentication), so an implementation
/// must be owned exclusively by a single `MifareClassic`.
pub trait CardTransport {
    /// Load a 6-byte key into one of the reader's two key slots.
    fn load_key(&self, slot: u8, key: &[u8; 6]) -> Result<(), TransportError>;

    /// Run the challenge/response authentication for `block` using the key
    /// previously loaded into `slot`, with the key-type opcode on the wire.
    fn authenticate(&self, block: u8, opcode: u8, slot: u8) -> Result<(), TransportError>;

    /// Read `len` bytes of binary block data.
    fn read_binary(&self, block: u8, len: u8) -> Result<Vec<u8>, TransportError>;

    /// Write 16 bytes of binary block data.
    fn update_binary(&self, block: u8, data: &[u8; 16]) -> Result<(), TransportError>;

    /// Pass an arbitrary APDU through unmodified and return the payload.
    fn raw_command(&self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Read the card UID.
    fn uid(&self) -> Result<Vec<u8>, TransportError>;

    /// Read the card ATR.
    fn atr(&self) -> Result<Vec<u8>, TransportError>;
}

/// PC/SC transport for ACR122U-class readers.
pub struct PcscTransport {
    card: Card,
}

impl PcscTransport {
    /// Establish a PC/SC context, pick a reader and connect to the card.
    ///
    /// Prefers a reader whose name contains "ACR122"; falls back to the
    /// first reader found, with a warning.
    pub fn connect() -> Result<Self, TransportError> {
        let ctx = Context::establish(Scope::User)?;

        let mut readers_buffer = [0; 2048];
        let readers: Vec<_> = ctx.list_readers(&mut readers_buffer)?.collect();
        if readers.is_empty() {
            return Err(TransportError::Pcsc(pcsc::Error::NoReadersAvailable));
        }

        let reader = readers
            .iter()
            .find(|r| r.to_string_lossy().contains("ACR122"))
            .copied()
            .unwrap_or_else(|| {
                warn!(
                    "no ACR122 reader found, using {}",
                    readers[0].to_string_lossy()
                );
                readers[0]
            });
        info!("using reader {}", reader.to_string_lossy());

        let card = ctx.connect(reader, ShareMode::Shared, Protocols::ANY)?;
        info!("connected to card");

        Ok(PcscTransport { card })
    }

    /// Transmit a command and return the payload with the status word
    /// stripped, or the failure the status word encodes.
    fn transmit(&self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut recv_buffer = [0; MAX_BUFFER_SIZE];
        let response = self.card.transmit(command, &mut recv_buffer)?;

        if response.len() < 2 {
            return Err(TransportError::ShortResponse(response.len()));
        }
        let (data, status) = response.split_at(response.len() - 2);
        if status == [0x90, 0x00] {
            Ok(data.to_vec())
        } else {
            Err(TransportError::Status {
                sw1: status[0],
                sw2: status[1],
            })
        }
    }
}

impl CardTransport for PcscTransport {
    fn load_key(&self, slot: u8, key: &[u8; 6]) -> Result<(), TransportError> {
        let mut command = vec![0xFF, 0x82, 0x00, slot, 0x06];
        command.extend_from_slice(key);
        self.transmit(&command).map(|_| ())
    }

    fn authenticate(&self, block: u8, opcode: u8, slot: u8) -> Result<(), TransportError> {
        let command = [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, opcode, slot];
        self.transmit(&command).map(|_| ())
    }

    fn read_binary(&self, block: u8, len: u8) -> Result<Vec<u8>, TransportError> {
        let command = [0xFF, 0xB0, 0x00, block, len];
        self.transmit(&command)
    }

    fn update_binary(&self, block: u8, data: &[u8; 16]) -> Result<(), TransportError> {
        let mut command = vec![0xFF, 0xD6, 0x00, block, 0x10];
        command.extend_from_slice(data);
        self.transmit(&command).map(|_| ())
    }

    fn raw_command(&self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.transmit(apdu)
    }

    fn uid(&self) -> Result<Vec<u8>, TransportError> {
        self.transmit(&[0xFF, 0xCA, 0x00, 0x00, 0x00])
    }

    fn atr(&self) -> Result<Vec<u8>, TransportError> {
        let mut names_buffer = [0; 2048];
        let mut atr_buffer = [0; MAX_ATR_SIZE];
        let status = self.card.status2(&mut names_buffer, &mut atr_buffer)?;
        Ok(status.atr().to_vec())
    }
}
