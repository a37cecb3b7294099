//! Integration tests against a scripted reader transport.

use crid::transport::{CardTransport, TransportError};
use crid::{
    search, AccessError, CancelToken, CardKind, Key, KeyType, MifareClassic, SearchOutcome,
};
use std::cell::RefCell;
use std::collections::HashMap;

const CLASSIC_1K_ATR: [u8; 20] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x6A,
];

fn rejected() -> TransportError {
    TransportError::Status { sw1: 0x63, sw2: 0x00 }
}

/// In-memory card emulation: two key slots, per-block accepted keys, and
/// scripted failure modes.
#[derive(Default)]
struct MockTransport {
    /// Key that authenticates each block (either key type)
    accepted: HashMap<u8, [u8; 6]>,
    blocks: RefCell<HashMap<u8, [u8; 16]>>,
    loaded: RefCell<[Option<[u8; 6]>; 2]>,
    fail_key_load: bool,
    unreadable: Vec<u8>,
    /// Acknowledge update commands without storing the data
    ignore_writes: bool,
    auth_attempts: RefCell<u32>,
}

impl MockTransport {
    fn accepting(blocks: &[(u8, Key)]) -> Self {
        let mut mock = MockTransport::default();
        for (block, key) in blocks {
            mock.accepted.insert(*block, *key.as_bytes());
        }
        mock
    }

    fn auth_attempts(&self) -> u32 {
        *self.auth_attempts.borrow()
    }
}

impl CardTransport for MockTransport {
    fn load_key(&self, slot: u8, key: &[u8; 6]) -> Result<(), TransportError> {
        if self.fail_key_load {
            return Err(rejected());
        }
        self.loaded.borrow_mut()[slot as usize] = Some(*key);
        Ok(())
    }

    fn authenticate(&self, block: u8, _opcode: u8, slot: u8) -> Result<(), TransportError> {
        *self.auth_attempts.borrow_mut() += 1;
        let loaded = self.loaded.borrow()[slot as usize];
        match (self.accepted.get(&block), loaded) {
            (Some(expected), Some(loaded)) if *expected == loaded => Ok(()),
            _ => Err(rejected()),
        }
    }

    fn read_binary(&self, block: u8, len: u8) -> Result<Vec<u8>, TransportError> {
        if self.unreadable.contains(&block) {
            return Err(rejected());
        }
        let blocks = self.blocks.borrow();
        let data = blocks.get(&block).copied().unwrap_or([0u8; 16]);
        Ok(data[..len as usize].to_vec())
    }

    fn update_binary(&self, block: u8, data: &[u8; 16]) -> Result<(), TransportError> {
        if !self.ignore_writes {
            self.blocks.borrow_mut().insert(block, *data);
        }
        Ok(())
    }

    fn raw_command(&self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(apdu.to_vec())
    }

    fn uid(&self) -> Result<Vec<u8>, TransportError> {
        Ok(vec![0x04, 0xA1, 0xB2, 0xC3])
    }

    fn atr(&self) -> Result<Vec<u8>, TransportError> {
        Ok(CLASSIC_1K_ATR.to_vec())
    }
}

#[test]
fn authenticate_returns_bool_never_panics() {
    let card = MifareClassic::new(MockTransport::accepting(&[(4, Key::DEFAULT)]));

    assert!(card
        .authenticate(4, Some(Key::DEFAULT), Some(KeyType::A))
        .unwrap());
    assert!(card
        .authenticate(4, Some(Key::DEFAULT), Some(KeyType::B))
        .unwrap());
    // Wrong key is a plain false, not a fault
    let wrong = Key::new([0x01; 6]);
    assert!(!card.authenticate(4, Some(wrong), Some(KeyType::A)).unwrap());
    // Block with no accepted key
    assert!(!card
        .authenticate(9, Some(Key::DEFAULT), Some(KeyType::A))
        .unwrap());
}

#[test]
fn authenticate_rejects_out_of_range_block() {
    let card = MifareClassic::new(MockTransport::default());
    assert!(matches!(
        card.authenticate(64, Some(Key::DEFAULT), Some(KeyType::A)),
        Err(AccessError::InvalidBlock { block: 64 })
    ));
}

#[test]
fn authenticate_falls_back_to_injected_defaults() {
    let key = Key::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
    let card = MifareClassic::with_defaults(
        MockTransport::accepting(&[(8, key)]),
        key,
        KeyType::B,
    );
    assert!(card.authenticate(8, None, None).unwrap());
}

#[test]
fn key_load_failure_is_a_boolean_false() {
    let mock = MockTransport {
        fail_key_load: true,
        ..MockTransport::accepting(&[(4, Key::DEFAULT)])
    };
    let card = MifareClassic::new(mock);
    assert!(!card
        .authenticate(4, Some(Key::DEFAULT), Some(KeyType::A))
        .unwrap());
}

#[test]
fn read_block_returns_exactly_sixteen_bytes() {
    let mock = MockTransport::accepting(&[(4, Key::DEFAULT)]);
    mock.blocks.borrow_mut().insert(4, [0x5A; 16]);
    let card = MifareClassic::new(mock);

    let data = card
        .read_block(4, Some(Key::DEFAULT), Some(KeyType::A))
        .unwrap();
    assert_eq!(data, [0x5A; 16]);
}

#[test]
fn read_block_surfaces_auth_failure_as_empty_result() {
    let card = MifareClassic::new(MockTransport::default());
    assert!(matches!(
        card.read_block(4, Some(Key::DEFAULT), Some(KeyType::A)),
        Err(AccessError::AuthenticationFailed { block: 4, .. })
    ));
}

#[test]
fn read_block_surfaces_transport_failure() {
    let mock = MockTransport {
        unreadable: vec![4],
        ..MockTransport::accepting(&[(4, Key::DEFAULT)])
    };
    let card = MifareClassic::new(mock);
    assert!(matches!(
        card.read_block(4, Some(Key::DEFAULT), Some(KeyType::A)),
        Err(AccessError::Transport(_))
    ));
}

#[test]
fn write_rejects_short_payload_before_any_io() {
    let card = MifareClassic::new(MockTransport::accepting(&[(4, Key::DEFAULT)]));

    // "Hello, World!" is 26 hex characters, not 32
    let result = card.write_block(
        4,
        "48656C6C6F2C20576F726C6421",
        Some(Key::DEFAULT),
        Some(KeyType::A),
    );
    assert!(matches!(result, Err(AccessError::InvalidPayload(_))));
    assert_eq!(card.transport().auth_attempts(), 0);
}

#[test]
fn write_rejects_non_hex_payload_before_any_io() {
    let card = MifareClassic::new(MockTransport::accepting(&[(4, Key::DEFAULT)]));
    let result = card.write_block(
        4,
        "zz656C6C6F2C20576F726C6421000000",
        Some(Key::DEFAULT),
        Some(KeyType::A),
    );
    assert!(matches!(result, Err(AccessError::InvalidPayload(_))));
    assert_eq!(card.transport().auth_attempts(), 0);
}

#[test]
fn write_then_verify_round_trips() {
    let card = MifareClassic::new(MockTransport::accepting(&[(4, Key::DEFAULT)]));

    // Padded "Hello, World!" as exactly 32 hex characters
    card.write_block(
        4,
        "48656C6C6F2C20576F726C6421000000",
        Some(Key::DEFAULT),
        Some(KeyType::A),
    )
    .unwrap();

    let data = card
        .read_block(4, Some(Key::DEFAULT), Some(KeyType::A))
        .unwrap();
    assert_eq!(&data[..13], b"Hello, World!");
    assert_eq!(&data[13..], &[0x00, 0x00, 0x00]);
    // Two authentications for the write (write + verification read), one
    // for our read above
    assert_eq!(card.transport().auth_attempts(), 3);
}

#[test]
fn write_mismatch_is_reported_not_swallowed() {
    let mock = MockTransport {
        ignore_writes: true,
        ..MockTransport::accepting(&[(4, Key::DEFAULT)])
    };
    mock.blocks.borrow_mut().insert(4, [0xEE; 16]);
    let card = MifareClassic::new(mock);

    let result = card.write_block(
        4,
        "48656C6C6F2C20576F726C6421000000",
        Some(Key::DEFAULT),
        Some(KeyType::A),
    );
    match result {
        Err(AccessError::VerificationMismatch {
            block,
            expected,
            received,
        }) => {
            assert_eq!(block, 4);
            assert_eq!(expected, "48656C6C6F2C20576F726C6421000000");
            assert_eq!(received, "EE".repeat(16));
        }
        other => panic!("expected VerificationMismatch, got {other:?}"),
    }
}

#[test]
fn read_sector_always_yields_four_entries() {
    // Only three of sector 1's blocks authenticate
    let mock = MockTransport::accepting(&[
        (4, Key::DEFAULT),
        (5, Key::DEFAULT),
        (7, Key::DEFAULT),
    ]);
    mock.blocks.borrow_mut().insert(5, [0x11; 16]);
    let card = MifareClassic::new(mock);

    let dump = card.read_sector(1).unwrap();
    assert_eq!(dump.sector, 1);
    assert_eq!(dump.blocks.len(), 4);
    assert!(dump.blocks[0].is_some());
    assert_eq!(dump.blocks[1], Some([0x11; 16]));
    assert!(dump.blocks[2].is_none());
    // A failed sibling does not abort the rest of the sector
    assert!(dump.blocks[3].is_some());
}

#[test]
fn read_sector_validates_index() {
    let card = MifareClassic::new(MockTransport::default());
    assert!(matches!(
        card.read_sector(16),
        Err(AccessError::InvalidSector { sector: 16 })
    ));
}

#[test]
fn read_card_always_attempts_all_sixty_four_blocks() {
    // No block authenticates at all
    let card = MifareClassic::new(MockTransport::default());
    let dumps = card.read_card().unwrap();

    assert_eq!(dumps.len(), 16);
    for (sector, dump) in dumps.iter().enumerate() {
        assert_eq!(dump.sector as usize, sector);
        assert!(dump.blocks.iter().all(|b| b.is_none()));
    }
    assert_eq!(card.transport().auth_attempts(), 64);
}

#[test]
fn identify_classifies_classic_1k() {
    let card = MifareClassic::new(MockTransport::default());
    assert_eq!(card.identify().unwrap(), CardKind::Classic1k);
}

#[test]
fn raw_command_passes_through() {
    let card = MifareClassic::new(MockTransport::default());
    let apdu = [0x00, 0xA4, 0x04, 0x00];
    assert_eq!(card.raw_command(&apdu).unwrap(), apdu.to_vec());
}

#[test]
fn search_rejects_out_of_range_block() {
    let card = MifareClassic::new(MockTransport::default());
    let cancel = CancelToken::new();
    assert!(matches!(
        search(&card, &[Key::DEFAULT], 64, KeyType::A, &cancel),
        Err(AccessError::InvalidBlock { block: 64 })
    ));
}

// The search suppresses and restores the global log level, so all search
// semantics share one test to keep that global state single-threaded.
#[test]
fn search_semantics() {
    let k1 = Key::new([0x01; 6]);
    let k2 = Key::new([0x02; 6]);
    let k3 = Key::new([0x03; 6]);

    log::set_max_level(log::LevelFilter::Info);

    // Empty list: exhausted immediately, no authentication attempted
    let card = MifareClassic::new(MockTransport::default());
    let cancel = CancelToken::new();
    assert_eq!(
        search(&card, &[], 9, KeyType::A, &cancel).unwrap(),
        SearchOutcome::Exhausted
    );
    assert_eq!(card.transport().auth_attempts(), 0);

    // First match wins: k2 unlocks, k3 is never attempted
    let card = MifareClassic::new(MockTransport::accepting(&[(9, k2)]));
    assert_eq!(
        search(&card, &[k1, k2, k3], 9, KeyType::A, &cancel).unwrap(),
        SearchOutcome::Found(k2)
    );
    assert_eq!(card.transport().auth_attempts(), 2);

    // No candidate succeeds: the whole list is tried
    let card = MifareClassic::new(MockTransport::default());
    assert_eq!(
        search(&card, &[k1, k2, k3], 9, KeyType::A, &cancel).unwrap(),
        SearchOutcome::Exhausted
    );
    assert_eq!(card.transport().auth_attempts(), 3);

    // Cancellation stops the search promptly with no key found
    let card = MifareClassic::new(MockTransport::accepting(&[(9, k3)]));
    let cancelled = CancelToken::new();
    cancelled.cancel();
    assert_eq!(
        search(&card, &[k1, k2, k3], 9, KeyType::A, &cancelled).unwrap(),
        SearchOutcome::Interrupted
    );
    assert_eq!(card.transport().auth_attempts(), 0);

    // An interrupt handler that only holds the shared flag (the CLI's
    // SIGINT wiring) stops the search the same way
    let card = MifareClassic::new(MockTransport::accepting(&[(9, k3)]));
    let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let token = CancelToken::from(std::sync::Arc::clone(&flag));
    flag.store(true, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(
        search(&card, &[k1, k2, k3], 9, KeyType::A, &token).unwrap(),
        SearchOutcome::Interrupted
    );

    // Every exit path above must have restored the log level exactly
    assert_eq!(log::max_level(), log::LevelFilter::Info);
}
