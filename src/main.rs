mod cli;
mod display;
mod otpauth;
mod qrcode;
mod store;
mod totp;

use core::convert::TryFrom;
use std::io::{self, Write};

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn, LevelFilter};

use crate::cli::{Command, Config};
use crate::otpauth::Credential;
use crate::store::CredentialStore;

fn main() -> Result<()> {
    let args = cli::app().get_matches();
    let config = Config::try_from(&args)?;
    init_logger(config.verbosity)?;

    let command = Command::try_from(&args)?;
    info!("using {}", config.store.display());
    let store = CredentialStore::new(&config.store);

    match command {
        Command::Watch => watch(&config, &store),
        Command::Show { timestamp } => {
            let credentials = store.load()?;
            let timestamp = match timestamp {
                Some(t) => t,
                None => totp::now()?,
            };
            let stdout = io::stdout();
            let mut out = stdout.lock();
            display::render_codes(&mut out, &credentials, timestamp, &config.params)?;
            out.flush()?;
            Ok(())
        }
        Command::List => {
            for (n, credential) in store.load()?.iter().enumerate() {
                println!("{:>3}. {}", n + 1, credential.label());
            }
            Ok(())
        }
        Command::Add { urls } => {
            let added = if urls.is_empty() {
                prompt()?
            } else {
                decode_all(&urls)
            };
            append(&store, added)
        }
        Command::ImportQr { image } => {
            let text = qrcode::extract_totp_uri(&image)
                .with_context(|| format!("could not read a QR code from {}", image.display()))?;
            let credential = Credential::decode(&text)
                .with_context(|| format!("QR code in {} is not a TOTP URL", image.display()))?;
            println!("Added: {}", credential.label());
            append(&store, vec![credential])
        }
    }
}

fn init_logger(verbosity: u64) -> Result<()> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    simple_logger::SimpleLogger::new().with_level(level).init()?;
    Ok(())
}

/// Load the store, asking for credentials when it is missing or empty,
/// then keep showing codes.
fn watch(config: &Config, store: &CredentialStore) -> Result<()> {
    let mut credentials = load_for_update(store)?;

    if credentials.is_empty() {
        println!("No MFA secrets found in {}.", store.path().display());
        credentials = prompt()?;
        if credentials.is_empty() {
            bail!("No valid MFA URLs provided.");
        }
        match store.save(&credentials) {
            Ok(()) => println!(
                "Saved {} MFA entries to {}",
                credentials.len(),
                store.path().display()
            ),
            Err(e) => warn!("Failed to save secrets: {}", e),
        }
    }

    let banner = format!(
        "2FA TOTP Console Application\n\
         -----------------------------\n\
         Loaded {} MFA entries from {}\n",
        credentials.len(),
        store.path().display()
    );
    display::watch(&credentials, &config.params, &banner)
}

fn prompt() -> Result<Vec<Credential>> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let credentials = display::prompt_for_credentials(stdin.lock(), &mut stdout.lock())?;
    Ok(credentials)
}

/// Decode every URL given on the command line, reporting the invalid ones.
fn decode_all(urls: &[String]) -> Vec<Credential> {
    urls.iter()
        .filter_map(|url| match Credential::decode(url.trim()) {
            Ok(credential) => {
                println!("Added: {}", credential.label());
                Some(credential)
            }
            Err(e) => {
                eprintln!("Error: {}: {}", url, e);
                None
            }
        })
        .collect()
}

/// Load the stored set before rewriting it. A missing file is an empty
/// set; any other read error stops the caller so the file is never
/// overwritten with less than it holds.
fn load_for_update(store: &CredentialStore) -> Result<Vec<Credential>> {
    match store.load() {
        Ok(credentials) => Ok(credentials),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e).context("refusing to overwrite an unreadable store"),
    }
}

/// Add credentials to the stored set and rewrite the whole file.
fn append(store: &CredentialStore, added: Vec<Credential>) -> Result<()> {
    if added.is_empty() {
        return Err(anyhow!("no credentials added"));
    }

    let mut credentials = load_for_update(store)?;
    credentials.extend(added);

    store.save(&credentials)?;
    println!(
        "Saved {} MFA entries to {}",
        credentials.len(),
        store.path().display()
    );
    Ok(())
}
