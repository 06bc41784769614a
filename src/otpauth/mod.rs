use log::warn;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::totp::TotpParams;

/// Characters escaped in the label so that it stays a single path segment
/// of the URI.
const LABEL: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const SECRET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>');

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("invalid URL format: {0}")]
    MalformedUri(String),
    #[error("URL must be an otpauth://totp URL")]
    UnsupportedScheme,
    #[error("missing 'secret' parameter in URL")]
    MissingSecret,
    #[error("missing label in URL")]
    EmptyLabel,
}

/// A single enrolled TOTP credential.
///
/// The secret is kept in its base32 text form so that saving the
/// credential writes back exactly what was read; it is only decoded when a
/// code is generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    label: String,
    secret: String,
}

impl Credential {
    /// Parse a credential from its `otpauth://totp/<label>?secret=<secret>`
    /// form.
    ///
    /// Sample url
    /// otpauth://totp/otplib-website:otplib-demo-user?
    /// secret=H4ZWJCQZEREL2IE2&period=30&digits=6
    /// &algorithm=SHA1&issuer=otplib-website
    pub fn decode(text: &str) -> Result<Credential, ParseError> {
        let u = Url::parse(text).map_err(|e| ParseError::MalformedUri(e.to_string()))?;

        // The parser lowercases the scheme, the match has to be exact.
        if u.scheme() != "otpauth" || !text.starts_with("otpauth:") {
            return Err(ParseError::UnsupportedScheme);
        }
        if u.host_str() != Some("totp") || u.port().is_some() {
            return Err(ParseError::UnsupportedScheme);
        }

        let path = u.path();
        let raw_label = path.strip_prefix('/').unwrap_or(path);
        let label = percent_decode_str(raw_label)
            .decode_utf8()
            .map_err(|e| ParseError::MalformedUri(format!("label is not UTF-8: {}", e)))?
            .into_owned();
        if label.trim().is_empty() {
            return Err(ParseError::EmptyLabel);
        }

        let mut secret: Option<String> = None;
        for (key, value) in u.query_pairs() {
            if key == "secret" {
                if secret.is_none() {
                    secret = Some(value.into_owned());
                }
            } else if let Some(note) = unused_parameter(&key, &value) {
                warn!("{}: {}", label, note);
            }
        }

        match secret {
            Some(secret) if !secret.is_empty() => Ok(Credential { label, secret }),
            _ => Err(ParseError::MissingSecret),
        }
    }

    /// Canonical text form. Query parameters other than `secret` are not
    /// written back.
    pub fn encode(&self) -> String {
        format!(
            "otpauth://totp/{}?secret={}",
            utf8_percent_encode(&self.label, LABEL),
            utf8_percent_encode(&self.secret, SECRET)
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

/// Describe a URL parameter that asks for something other than the standard
/// SHA1, 6 digit, 30 second profile. Such values are not applied: every
/// credential uses the `--digits` and `--period` options.
fn unused_parameter(key: &str, value: &str) -> Option<String> {
    let standard = TotpParams::default();
    let differs = match key {
        "algorithm" => !value.eq_ignore_ascii_case("SHA1"),
        "digits" => value != standard.digits().to_string(),
        "period" => value != standard.period().to_string(),
        // issuer is display metadata, the label already carries it.
        _ => false,
    };
    if !differs {
        return None;
    }

    let applies = match key {
        "algorithm" => "SHA1 is always used",
        "digits" => "the --digits option applies",
        _ => "the --period option applies",
    };
    Some(format!("{}={} in the URL is not used, {}", key, value, applies))
}

impl FromStr for Credential {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Credential::decode(s)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
