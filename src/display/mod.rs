use anyhow::Result;
use chrono::{Local, TimeZone};
use log::debug;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use crate::otpauth::Credential;
use crate::totp::{self, TotpParams};

// ANSI escape codes for bold text and resetting all formatting
const CONSOLE_BOLD: &str = "\x1b[1m";
const CONSOLE_RESET: &str = "\x1b[0m";

pub const URL_FORMAT: &str =
    "otpauth://totp/Service:user@example.com?secret=ABCDEFGHIJKLMNOP&issuer=Service";

/// Clear the terminal and move the cursor home.
pub fn clear_screen<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "\x1b[2J\x1b[H")?;
    out.flush()
}

/// Write the current code of every credential. Credentials whose code
/// cannot be generated are listed as unavailable instead.
pub fn render_codes<W: Write>(
    out: &mut W,
    credentials: &[Credential],
    timestamp: u64,
    params: &TotpParams,
) -> io::Result<()> {
    let valid_until = params.valid_until(timestamp);
    match Local.timestamp_opt(valid_until as i64, 0).single() {
        Some(t) => writeln!(out, "\nTOTP Codes (valid until {}):", t.format("%H:%M:%S"))?,
        None => writeln!(
            out,
            "\nTOTP Codes (valid for {}s):",
            params.remaining_seconds(timestamp)
        )?,
    }
    writeln!(out, "-----------------------------")?;

    for credential in credentials {
        match totp::generate(credential.secret(), timestamp, params.period(), params.digits()) {
            Ok(code) => writeln!(
                out,
                " * {:<20}: {}{}{}",
                credential.label(),
                CONSOLE_BOLD,
                code,
                CONSOLE_RESET
            )?,
            Err(e) => {
                debug!("{}: {}", credential.label(), e);
                writeln!(out, " * {:<20}: unavailable ({})", credential.label(), e)?
            }
        }
    }
    Ok(())
}

/// Ask the operator for `otpauth://` URLs until an empty line or end of
/// input. Invalid URLs are reported and the operator can try again.
pub fn prompt_for_credentials<R: BufRead, W: Write>(
    mut input: R,
    out: &mut W,
) -> io::Result<Vec<Credential>> {
    let mut credentials = Vec::new();

    writeln!(out, "Please enter your MFA URL(s).")?;
    writeln!(out, "Format: {}", URL_FORMAT)?;
    writeln!(out, "Enter an empty line when finished.")?;

    let mut line = String::new();
    loop {
        write!(out, "Enter MFA URL: ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            break;
        }

        match Credential::decode(text) {
            Ok(credential) => {
                writeln!(out, "Added: {}", credential.label())?;
                credentials.push(credential);
            }
            Err(e) => writeln!(out, "Error: {}", e)?,
        }
    }

    Ok(credentials)
}

/// Show the codes, then refresh them at every step boundary. Never
/// returns unless writing to the terminal fails.
pub fn watch(credentials: &[Credential], params: &TotpParams, banner: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut banner = Some(banner);

    loop {
        let now = totp::now()?;
        {
            let mut out = stdout.lock();
            clear_screen(&mut out)?;
            if let Some(banner) = banner.take() {
                writeln!(out, "{}", banner)?;
            }
            render_codes(&mut out, credentials, now, params)?;
            out.flush()?;
        }

        let wait = params.remaining_seconds(now);
        debug!("next refresh in {}s", wait);
        thread::sleep(Duration::from_secs(wait));
    }
}
