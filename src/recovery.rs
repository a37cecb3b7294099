//! External key-recovery strategies.
//!
//! Cryptanalytic attacks are not reimplemented here; they are delegated to
//! pre-built utilities driven as child processes. The core card access
//! layer never depends on this module.

use crate::card::{Key, KeyType};
use crate::error::{AccessError, Result};
use chrono::Local;
use log::info;
use std::env;
use std::path::PathBuf;
use std::process::Command;

/// A key-recovery mechanism external to the in-core brute forcer.
pub trait RecoveryStrategy {
    /// Human-readable strategy name for diagnostics.
    fn name(&self) -> &str;

    /// Run the recovery to completion.
    fn run(&self) -> Result<()>;
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

fn require_tool(binary: &str) -> Result<PathBuf> {
    if cfg!(windows) {
        return Err(AccessError::Unsupported(format!(
            "{binary} is not available on Windows"
        )));
    }
    find_in_path(binary).ok_or_else(|| AccessError::ToolNotFound(binary.to_string()))
}

/// Nested attack via `mfoc`, dumping recovered keys and card contents to a
/// timestamped file named after the card UID.
pub struct NestedAttack {
    /// UID of the card on the reader
    pub uid: Vec<u8>,
}

impl RecoveryStrategy for NestedAttack {
    fn name(&self) -> &str {
        "nested attack (mfoc)"
    }

    fn run(&self) -> Result<()> {
        let tool = require_tool("mfoc")?;
        let dump_file = format!(
            "{}_{}.mfd",
            Local::now().format("%Y%m%d%H%M%S"),
            hex::encode_upper(&self.uid)
        );
        info!("running mfoc, dump file {dump_file}");
        let status = Command::new(tool).args(["-O", &dump_file]).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(AccessError::ToolFailed {
                tool: "mfoc".to_string(),
                code: status.code(),
            })
        }
    }
}

/// Hardnested attack via `libnfc_crypto1_crack`, recovering an unknown key
/// for a target block from one known sector key.
pub struct HardnestedAttack {
    /// A key already known to authenticate
    pub known_key: Key,
    /// Block the known key authenticates
    pub known_block: u8,
    /// Type of the known key
    pub known_key_type: KeyType,
    /// Block whose key is to be recovered
    pub target_block: u8,
    /// Type of the key to recover
    pub target_key_type: KeyType,
}

impl RecoveryStrategy for HardnestedAttack {
    fn name(&self) -> &str {
        "hardnested attack (libnfc_crypto1_crack)"
    }

    fn run(&self) -> Result<()> {
        let tool = require_tool("libnfc_crypto1_crack")?;
        let args = [
            self.known_key.to_string(),
            self.known_block.to_string(),
            self.known_key_type.to_string(),
            self.target_block.to_string(),
            self.target_key_type.to_string(),
        ];
        info!("running libnfc_crypto1_crack {}", args.join(" "));
        let status = Command::new(tool).args(&args).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(AccessError::ToolFailed {
                tool: "libnfc_crypto1_crack".to_string(),
                code: status.code(),
            })
        }
    }
}
