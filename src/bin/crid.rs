//! crid command line: interact with Mifare Classic 1K cards.

use clap::{CommandFactory, Parser};
use crid::{
    card_table, format_bytes, load_key_file, search, sector_table, AccessError, CancelToken,
    DataFormat, HardnestedAttack, Key, KeyType, MifareClassic, NestedAttack, PcscTransport,
    RecoveryStrategy, SearchOutcome, COMMON_KEYS,
};
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "crid",
    version,
    about = "Interact with Mifare Classic 1K cards over PC/SC readers"
)]
struct Args {
    /// Read the UID of the card
    #[arg(long)]
    read_uid: bool,

    /// Identify the card type from its ATR
    #[arg(long)]
    identify: bool,

    /// Read a block from the card
    #[arg(long, value_name = "BLOCK")]
    read_block: Option<u8>,

    /// Write a block to the card (requires --data)
    #[arg(long, value_name = "BLOCK", requires = "data")]
    write_block: Option<u8>,

    /// Data to write, exactly 32 hex characters
    #[arg(long, value_name = "HEX")]
    data: Option<String>,

    /// Read a sector from the card
    #[arg(long, value_name = "SECTOR")]
    read_sector: Option<u8>,

    /// Read all 16 sectors from the card
    #[arg(long)]
    read_full: bool,

    /// Key type (A or B)
    #[arg(long, default_value = "A")]
    key_type: String,

    /// Key value, 6 bytes as a hex string
    #[arg(long, default_value = "ffffffffffff")]
    key_value: String,

    /// Key list file for brute forcing, one hex key per line
    #[arg(long, value_name = "FILE")]
    key_list: Option<PathBuf>,

    /// Brute force keys against the given block, using --key-list or the
    /// built-in common keys
    #[arg(long, value_name = "BLOCK")]
    brute_force_keys: Option<u8>,

    /// Run the nested attack (requires the mfoc binary)
    #[arg(long)]
    nested_attack: bool,

    /// Run the hardnested attack against the given target block (requires
    /// --known-block plus --key-value/--key-type for the known key)
    #[arg(long, value_name = "BLOCK", requires = "known_block")]
    hardnested_attack: Option<u8>,

    /// Block the known key authenticates, for the hardnested attack
    #[arg(long, value_name = "BLOCK")]
    known_block: Option<u8>,

    /// Target key type for the hardnested attack (A or B)
    #[arg(long, default_value = "A")]
    target_key_type: String,

    /// Send a raw APDU to the reader, as a hex string
    #[arg(long, value_name = "HEX")]
    apdu: Option<String>,

    /// Mute the reader buzzer
    #[arg(long)]
    mute: bool,

    /// Enable the reader buzzer
    #[arg(long)]
    beep: bool,

    /// Power cycle the antenna field
    #[arg(long)]
    power_cycle: bool,

    /// Block data output format (hex, string or raw)
    #[arg(long, default_value = "hex")]
    data_format: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    let level = args
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> crid::Result<()> {
    let key = Key::from_hex(&args.key_value)?;
    let key_type: KeyType = args.key_type.parse()?;
    let data_format: DataFormat = args.data_format.parse()?;

    let transport = PcscTransport::connect()?;
    let card = MifareClassic::with_defaults(transport, key, key_type);

    if args.read_uid {
        println!("UID: {}", hex::encode_upper(card.uid()?));
    } else if args.identify {
        println!("Card type: {}", card.identify()?);
        println!("UID: {}", hex::encode_upper(card.uid()?));
    } else if let Some(block) = args.read_block {
        let data = card.read_block(block, Some(key), Some(key_type))?;
        println!("Block {}: {}", block, format_bytes(&data, data_format));
    } else if let Some(block) = args.write_block {
        // clap guarantees --data is present here
        let data = args.data.as_deref().unwrap_or_default();
        card.write_block(block, data, Some(key), Some(key_type))?;
        println!("Write verified for block {block}");
    } else if let Some(sector) = args.read_sector {
        let dump = card.read_sector(sector)?;
        println!("Displaying sector {sector}");
        print!("{}", sector_table(&dump, data_format));
    } else if args.read_full {
        let dumps = card.read_card()?;
        print!("{}", card_table(&dumps, data_format));
    } else if let Some(block) = args.brute_force_keys {
        let candidates = match &args.key_list {
            Some(path) => load_key_file(path)?,
            None => {
                info!("no key list given, using the built-in common keys");
                COMMON_KEYS.to_vec()
            }
        };
        // Ctrl+C stops the search between candidates instead of killing
        // the process, so the log level is restored and the interrupted
        // outcome is reported.
        let interrupt = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupt))?;
        let cancel = CancelToken::from(interrupt);
        match search(&card, &candidates, block, key_type, &cancel)? {
            SearchOutcome::Found(found) => {
                println!("[+] Valid key found (type {key_type}): {found} for block {block}");
            }
            SearchOutcome::Exhausted => {
                info!("no valid key found (type {key_type}) for block {block}");
            }
            SearchOutcome::Interrupted => {
                info!("search interrupted before exhausting the key list");
            }
        }
    } else if args.nested_attack {
        let attack = NestedAttack { uid: card.uid()? };
        info!("starting {}", attack.name());
        attack.run()?;
    } else if let Some(target_block) = args.hardnested_attack {
        let attack = HardnestedAttack {
            known_key: key,
            known_block: args.known_block.unwrap_or_default(),
            known_key_type: key_type,
            target_block,
            target_key_type: args.target_key_type.parse()?,
        };
        info!("starting {}", attack.name());
        attack.run()?;
    } else if let Some(apdu_hex) = &args.apdu {
        let apdu = hex::decode(apdu_hex)
            .map_err(|e| AccessError::InvalidPayload(format!("bad APDU hex: {e}")))?;
        let response = card.raw_command(&apdu)?;
        println!("APDU response: {}", hex::encode_upper(response));
    } else if args.mute {
        card.mute()?;
        println!("Muted sound on the reader.");
    } else if args.beep {
        card.beep()?;
        println!("Enabled sound on the reader.");
    } else if args.power_cycle {
        card.power_cycle_antenna()?;
        println!("Antenna power cycled.");
    } else {
        Args::command().print_help().ok();
        println!();
    }

    Ok(())
}
