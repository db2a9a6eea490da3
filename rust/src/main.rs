//! Command line companion: generate keys, seal and open secrets, and inspect
//! resolved test data or locators without writing a test.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use sealed_conf::config::{encrypted_payload, seal, ConfigError, ConfigResolver};
use sealed_conf::crypto::{CipherError, Key, SecretCipher};
use sealed_conf::document::FileSource;
use sealed_conf::locators::{LocatorError, Platform, ScopedLocatorStore};
use sealed_conf::settings::{ENV_KEY, ENV_LOG};

#[derive(Debug, Error)]
enum AppError {
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("locator error: {0}")]
    Locator(#[from] LocatorError),
    #[error("output error: {0}")]
    Render(#[from] serde_yaml::Error),
}

#[derive(Debug, Parser)]
#[command(name = "sealed-conf", version, about = "Encrypted test data and locator utility")]
struct Cli {
    /// Log filter, e.g. `info` or `sealed_conf=debug`.
    #[arg(long, global = true, env = ENV_LOG, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a fresh encryption key.
    GenerateKey,
    /// Encrypt a value; a key is generated when none is given.
    Encrypt {
        #[arg(long)]
        text: String,
        #[arg(long, env = ENV_KEY, hide_env_values = true)]
        key: Option<String>,
    },
    /// Decrypt a bare token or an `ENC[...]` scalar.
    Decrypt {
        #[arg(long)]
        text: String,
        #[arg(long, env = ENV_KEY, hide_env_values = true)]
        key: String,
    },
    /// Print resolved test data as YAML.
    Show {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, env = ENV_KEY, hide_env_values = true)]
        key: String,
        #[arg(long)]
        section: Option<String>,
    },
    /// Resolve a locator, or every locator of a screen.
    Locate {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        platform: Platform,
        #[arg(long)]
        screen: String,
        #[arg(long)]
        element: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level.to_ascii_lowercase()).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<(), AppError> {
    match command {
        Command::GenerateKey => {
            println!("{}", SecretCipher::generate_key().encode());
        }
        Command::Encrypt { text, key } => {
            let key = match key {
                Some(encoded) => Key::from_encoded(&encoded)?,
                None => {
                    let key = SecretCipher::generate_key();
                    println!("Generated key: {}", key.encode());
                    key
                }
            };
            let cipher = SecretCipher::new(key);
            println!("Encrypted text: {}", cipher.encrypt(&text)?);
            println!("Sealed scalar: {}", seal(&cipher, &text)?);
        }
        Command::Decrypt { text, key } => {
            let cipher = SecretCipher::from_encoded_key(&key)?;
            let token = encrypted_payload(&text).unwrap_or(&text);
            println!("{}", cipher.decrypt(token)?);
        }
        Command::Show { data, key, section } => {
            let cipher = SecretCipher::from_encoded_key(&key)?;
            let resolver = ConfigResolver::open(&cipher, &data)?;
            let tree = match section.as_deref() {
                Some(name) => resolver.get_section(name),
                None => resolver.get_all(),
            };
            print!("{}", serde_yaml::to_string(tree)?);
        }
        Command::Locate {
            dir,
            platform,
            screen,
            element,
        } => {
            let mut store = ScopedLocatorStore::new(platform, FileSource::new(dir));
            match element {
                Some(element) => {
                    let entry = store.get_entry(&screen, &element)?;
                    println!("{}\t{}", entry.strategy.wire_name(), entry.target);
                }
                None => {
                    for (element, entry) in store.get_screen(&screen)? {
                        println!("{element}\t{}\t{}", entry.strategy.wire_name(), entry.target);
                    }
                }
            }
        }
    }
    Ok(())
}
