/*!
# crid

Read, write and recover keys on Mifare Classic 1K cards through PC/SC
readers such as the ACR122U.

## Quick start

```rust,no_run
use crid::{Key, KeyType, MifareClassic, PcscTransport};

let transport = PcscTransport::connect()?;
let card = MifareClassic::new(transport);

// Authenticate and read a block
let key = Key::from_hex("ffffffffffff")?;
let data = card.read_block(4, Some(key), Some(KeyType::A))?;
println!("{}", crid::format_bytes(&data, crid::DataFormat::Hex));

// Write a block with mandatory post-write verification
card.write_block(4, "48656C6C6F2C20576F726C6421000000", Some(key), Some(KeyType::A))?;
# Ok::<(), crid::AccessError>(())
```

## Modules

- `transport`: PC/SC boundary and the `CardTransport` trait
- `card`: authentication, block/sector/full-card access
- `format`: block data rendering and tabular output
- `brute`: candidate key search with progress and cancellation
- `recovery`: external recovery tools (mfoc, libnfc_crypto1_crack)
- `ident`: card type identification from the ATR
- `error`: error types and Result alias
*/

#![warn(missing_docs)]

/// Brute-force key search
pub mod brute;
/// Card access: authentication, blocks, sectors
pub mod card;
/// Error types and Result alias
pub mod error;
/// Data rendering and tables
pub mod format;
/// Card type identification from the ATR
pub mod ident;
/// External key-recovery strategies
pub mod recovery;
/// Reader transport boundary
pub mod transport;

pub use brute::{load_key_file, search, CancelToken, SearchOutcome, COMMON_KEYS};
pub use card::{BlockData, Key, KeyType, MifareClassic, SectorDump};
pub use error::{AccessError, Result};
pub use format::{card_table, format_bytes, sector_table, DataFormat};
pub use ident::CardKind;
pub use recovery::{HardnestedAttack, NestedAttack, RecoveryStrategy};
pub use transport::{CardTransport, PcscTransport, TransportError};
