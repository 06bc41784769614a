use data_encoding::BASE32;
use ring::hmac;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};
use thiserror::Error;

/// Errors reported while generating a code. None of them are fatal to
/// the caller: a credential whose code cannot be produced is simply shown
/// as unavailable.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("secret is not valid base32: {0}")]
    InvalidSecretEncoding(String),
    #[error("period must be at least one second")]
    InvalidPeriod,
    #[error("unsupported number of digits {0}, expected 1 to 9")]
    InvalidDigits(u32),
}

/// Time step and code length used for every credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TotpParams {
    period: u64,
    digits: u32,
}

impl Default for TotpParams {
    fn default() -> TotpParams {
        TotpParams {
            period: 30,
            digits: 6,
        }
    }
}

impl TotpParams {
    pub fn new(period: u64, digits: u32) -> Result<Self, Error> {
        validate(period, digits)?;
        Ok(TotpParams { period, digits })
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Number of complete time steps elapsed since the Unix epoch.
    pub fn counter(&self, timestamp: u64) -> u64 {
        timestamp / self.period
    }

    /// Seconds left until the next step boundary, always in `1..=period`.
    pub fn remaining_seconds(&self, timestamp: u64) -> u64 {
        self.period - timestamp % self.period
    }

    /// Unix time at which codes generated at `timestamp` expire.
    pub fn valid_until(&self, timestamp: u64) -> u64 {
        timestamp + self.remaining_seconds(timestamp)
    }

    pub fn generate(&self, secret: &str, timestamp: u64) -> Result<String, Error> {
        let key = decode_secret(secret)?;
        Ok(hotp(&key, self.counter(timestamp), self.digits))
    }
}

/// Generate the TOTP code for a base32 `secret` at `timestamp` (seconds
/// since the Unix epoch).
///
/// The function is pure: the same inputs always give the same code, so
/// callers that want the current code pass in [`now`].
pub fn generate(secret: &str, timestamp: u64, period: u64, digits: u32) -> Result<String, Error> {
    TotpParams::new(period, digits)?.generate(secret, timestamp)
}

/// Decode a base32 secret into the raw HMAC key. Lowercase input and
/// missing `=` padding are accepted.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, Error> {
    let mut s = secret.to_ascii_uppercase();
    pad_string_to_base32(&mut s);

    let key = BASE32
        .decode(s.as_bytes())
        .map_err(|e| Error::InvalidSecretEncoding(e.to_string()))?;
    if key.is_empty() {
        return Err(Error::InvalidSecretEncoding(String::from("empty secret")));
    }
    Ok(key)
}

/// Current Unix time in seconds.
pub fn now() -> Result<u64, SystemTimeError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

fn validate(period: u64, digits: u32) -> Result<(), Error> {
    if period == 0 {
        return Err(Error::InvalidPeriod);
    }
    // 10^10 no longer fits the 31 bit truncated value.
    if digits == 0 || digits > 9 {
        return Err(Error::InvalidDigits(digits));
    }
    Ok(())
}

/// The RFC 4226 HOTP core. `digits` must already be validated.
fn hotp(key: &[u8], counter: u64, digits: u32) -> String {
    // At the moment, only SHA1 is supported.
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let digest = tag.as_ref();

    // The offset is the low-order 4 bits of the last byte of the
    // 160 bit signature.
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;

    let mut window = [0u8; 4];
    window.copy_from_slice(&digest[offset..offset + 4]);
    let h = u32::from_be_bytes(window) & 0x7fff_ffff;

    // Format the otp with left padding if the modulo is less than
    // the required digits.
    format!(
        "{:0w$}",
        h % 10u32.pow(digits),
        w = digits as usize
    )
}

/// Pad the secret to have the length divisible by 8 for it to be
/// decoded as base32.
fn pad_string_to_base32(s: &mut String) {
    let mut pad_len = 0;
    if s.len() % 8 != 0 {
        pad_len = 8 - s.len() % 8;
    }

    for _ in 0..pad_len {
        s.push('=');
    }
}
