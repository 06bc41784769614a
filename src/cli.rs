use core::convert::TryFrom;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Error, Result};
use clap::{crate_authors, crate_version, App, Arg, SubCommand};

use crate::store;
use crate::totp::TotpParams;

const ABOUT: &str = "
Console TOTP authenticator. Keeps otpauth://totp URLs in a plain text file
and shows the current code of every one of them, refreshed at each step.
";

pub fn app() -> clap::App<'static, 'static> {
    App::new("otp")
        .author(crate_authors!())
        .version(crate_version!())
        .about(ABOUT)
        .arg(
            Arg::with_name("file")
                .short("f")
                .long("file")
                .value_name("PATH")
                .help("credential file, defaults to ~/.gmfa.conf")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("period")
                .short("p")
                .long("period")
                .value_name("SECONDS")
                .takes_value(true)
                .help("time step of the codes [default: 30]")
                .global(true),
        )
        .arg(
            Arg::with_name("digits")
                .short("d")
                .long("digits")
                .value_name("N")
                .takes_value(true)
                .possible_values(&["6", "7", "8"])
                .help("number of digits of the codes [default: 6]")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("log more, repeat for debug output")
                .global(true),
        )
        // cf. https://github.com/google/google-authenticator/wiki/Key-Uri-Format
        .subcommand(
            SubCommand::with_name("watch")
                .about("show all codes and refresh them at each step (default)"),
        )
        .subcommand(
            SubCommand::with_name("show")
                .about("print all codes once")
                .arg(
                    Arg::with_name("timestamp")
                        .short("t")
                        .long("timestamp")
                        .value_name("TIMESTAMP")
                        .help("seconds since the UNIX epoch to generate the codes for")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("list").about("print the stored labels"))
        .subcommand(
            SubCommand::with_name("add")
                .about("add credentials, prompting when no URL is given")
                .arg(
                    Arg::with_name("url")
                        .value_name("URL")
                        .help("e.g. otpauth://totp/Example:alice@example.com?secret=JBSWY3DPEHPK3PXP")
                        .multiple(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("import-qr")
                .about("add the credential encoded in a QR code image")
                .arg(
                    Arg::with_name("image")
                        .value_name("IMAGE")
                        .help("PNG or JPEG file containing the enrolment QR code")
                        .required(true),
                ),
        )
}

/// Settings shared by every command.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub store: PathBuf,
    pub params: TotpParams,
    pub verbosity: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Watch,
    Show { timestamp: Option<u64> },
    List,
    Add { urls: Vec<String> },
    ImportQr { image: PathBuf },
}

impl TryFrom<&'_ clap::ArgMatches<'static>> for Config {
    type Error = Error;
    fn try_from(args: &clap::ArgMatches<'static>) -> Result<Self> {
        let store = match global(args, "file").and_then(|m| m.value_of_os("file")) {
            Some(path) => PathBuf::from(path),
            None => store::default_path()
                .ok_or_else(|| anyhow!("could not determine home directory"))?,
        };

        let period: u64 = global(args, "period")
            .and_then(|m| m.value_of("period"))
            .unwrap_or("30")
            .parse()
            .context("invalid period")?;
        let digits: u32 = global(args, "digits")
            .and_then(|m| m.value_of("digits"))
            .unwrap_or("6")
            .parse()
            .context("invalid number of digits")?;

        let verbosity = match args.subcommand() {
            (_, Some(command)) => args
                .occurrences_of("verbose")
                .max(command.occurrences_of("verbose")),
            _ => args.occurrences_of("verbose"),
        };

        Ok(Config {
            store,
            params: TotpParams::new(period, digits)?,
            verbosity,
        })
    }
}

/// Global arguments may be given before or after the subcommand; the
/// subcommand's matches win when the argument was given there.
fn global<'a>(
    args: &'a clap::ArgMatches<'static>,
    name: &str,
) -> Option<&'a clap::ArgMatches<'static>> {
    match args.subcommand() {
        (_, Some(command)) if command.occurrences_of(name) > 0 => Some(command),
        _ if args.is_present(name) => Some(args),
        _ => None,
    }
}

impl TryFrom<&'_ clap::ArgMatches<'static>> for Command {
    type Error = Error;
    fn try_from(args: &clap::ArgMatches<'static>) -> Result<Self> {
        match args.subcommand() {
            ("watch", _) | ("", None) => Ok(Command::Watch),
            ("show", Some(command)) => {
                let timestamp = match command.value_of("timestamp") {
                    Some(s) => Some(s.parse().context("invalid timestamp")?),
                    None => None,
                };
                Ok(Command::Show { timestamp })
            }
            ("list", _) => Ok(Command::List),
            ("add", Some(command)) => Ok(Command::Add {
                urls: command
                    .values_of("url")
                    .map(|values| values.map(String::from).collect())
                    .unwrap_or_default(),
            }),
            ("import-qr", Some(command)) => {
                let image = command
                    .value_of_os("image")
                    .ok_or_else(|| anyhow!("missing image path"))?;
                Ok(Command::ImportQr {
                    image: PathBuf::from(image),
                })
            }
            (name, _) => Err(anyhow!("Unexpected subcommand {}", name)),
        }
    }
}
