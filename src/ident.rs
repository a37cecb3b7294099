//! Card type identification from the ATR.
//!
//! Contactless storage cards answer with a PC/SC-defined ATR whose payload
//! carries the standard RID `A0 00 00 03 06` and a two-byte card name.

use std::fmt;

/// Storage-card ATR prefix: 3B 8F 80 01 80 4F 0C followed by the RID and
/// the storage standard byte.
const STORAGE_PREFIX: [u8; 12] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06,
];

/// DESFire cards answer with a short ISO 14443-4 ATR instead.
const DESFIRE_PREFIX: [u8; 6] = [0x3B, 0x81, 0x80, 0x01, 0x80, 0x80];

/// Recognized Mifare card families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    /// Mifare Classic 1K
    Classic1k,
    /// Mifare Classic 4K
    Classic4k,
    /// Mifare Mini
    Mini,
    /// Mifare Ultralight
    Ultralight,
    /// Mifare DESFire
    Desfire,
    /// Anything that did not match a known pattern
    Unknown,
}

impl CardKind {
    /// Classify a card from its raw ATR bytes.
    pub fn from_atr(atr: &[u8]) -> CardKind {
        if atr.starts_with(&DESFIRE_PREFIX) {
            return CardKind::Desfire;
        }
        if atr.len() >= 15 && atr[..12] == STORAGE_PREFIX {
            // atr[12] is the storage standard; atr[13..15] names the card
            return match (atr[13], atr[14]) {
                (0x00, 0x01) => CardKind::Classic1k,
                (0x00, 0x02) => CardKind::Classic4k,
                (0x00, 0x03) => CardKind::Ultralight,
                (0x00, 0x26) => CardKind::Mini,
                _ => CardKind::Unknown,
            };
        }
        CardKind::Unknown
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CardKind::Classic1k => "Mifare Classic 1K",
            CardKind::Classic4k => "Mifare Classic 4K",
            CardKind::Mini => "Mifare Mini",
            CardKind::Ultralight => "Mifare Ultralight",
            CardKind::Desfire => "Mifare DESFire",
            CardKind::Unknown => "Unknown card type",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_atr(name: [u8; 2]) -> Vec<u8> {
        let mut atr = STORAGE_PREFIX.to_vec();
        atr.push(0x03); // storage standard
        atr.extend_from_slice(&name);
        atr.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x6A]);
        atr
    }

    #[test]
    fn classic_1k_atr() {
        assert_eq!(
            CardKind::from_atr(&storage_atr([0x00, 0x01])),
            CardKind::Classic1k
        );
    }

    #[test]
    fn classic_4k_and_ultralight_atr() {
        assert_eq!(
            CardKind::from_atr(&storage_atr([0x00, 0x02])),
            CardKind::Classic4k
        );
        assert_eq!(
            CardKind::from_atr(&storage_atr([0x00, 0x03])),
            CardKind::Ultralight
        );
    }

    #[test]
    fn desfire_atr() {
        assert_eq!(
            CardKind::from_atr(&[0x3B, 0x81, 0x80, 0x01, 0x80, 0x80]),
            CardKind::Desfire
        );
    }

    #[test]
    fn short_or_alien_atr_is_unknown() {
        assert_eq!(CardKind::from_atr(&[0x3B]), CardKind::Unknown);
        assert_eq!(CardKind::from_atr(&[]), CardKind::Unknown);
    }
}
