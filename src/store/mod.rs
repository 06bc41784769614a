use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::otpauth::Credential;

/// File name of the credential store inside the home directory.
pub const DEFAULT_FILE_NAME: &str = ".gmfa.conf";

const HEADER: &str = "# GMFA Secrets File\n\
# Format: otpauth://totp/Service:user@example.com?secret=ABCDEFGHIJKLMNOP&issuer=Service\n\n";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the store file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
        }
    }
}

/// `~/.gmfa.conf`, or `None` when no home directory can be determined.
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_FILE_NAME))
}

/// A plain text file holding one `otpauth://` URL per line.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CredentialStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every credential in the file, in file order.
    pub fn load(&self) -> Result<Vec<Credential>, StoreError> {
        let file = File::open(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let credentials =
            read_credentials(BufReader::new(file)).map_err(|e| StoreError::io(&self.path, e))?;
        info!("loaded {} credentials from {}", credentials.len(), self.path.display());
        Ok(credentials)
    }

    /// Replace the file contents with `credentials`.
    pub fn save(&self, credentials: &[Credential]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir(dir).map_err(|e| StoreError::io(dir, e))?;
        }

        let file = open_for_overwrite(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let mut writer = BufWriter::new(file);
        write_credentials(&mut writer, credentials)
            .and_then(|_| writer.flush())
            .map_err(|e| StoreError::io(&self.path, e))?;

        info!("saved {} credentials to {}", credentials.len(), self.path.display());
        Ok(())
    }
}

/// Parse credentials line by line. Blank lines and `#` comments are
/// skipped, as are lines that do not decode; the latter are logged.
pub fn read_credentials<R: BufRead>(reader: R) -> io::Result<Vec<Credential>> {
    let mut credentials = Vec::new();

    for (n, raw) in reader.split(b'\n').enumerate() {
        let line = match String::from_utf8(raw?) {
            Ok(line) => line,
            Err(e) => {
                warn!("skipping line {}, not UTF-8: {}", n + 1, e.utf8_error());
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match Credential::decode(line) {
            Ok(credential) => {
                debug!("line {}: {}", n + 1, credential.label());
                credentials.push(credential);
            }
            Err(e) => warn!("skipping invalid MFA URL on line {}: {}", n + 1, e),
        }
    }

    Ok(credentials)
}

pub fn write_credentials<W: Write>(mut writer: W, credentials: &[Credential]) -> io::Result<()> {
    writer.write_all(HEADER.as_bytes())?;
    for credential in credentials {
        writeln!(writer, "{}", credential.encode())?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

fn open_for_overwrite(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FILE: &str = "# GMFA Secrets File
# Format: otpauth://totp/Service:user@example.com?secret=ABCDEFGHIJKLMNOP&issuer=Service

otpauth://totp/GitHub:octocat?secret=JBSWY3DPEHPK3PXP&issuer=GitHub
   otpauth://totp/AWS?secret=GEZDGNBVGY3TQOJQ

   # indented comment
http://totp/bad?secret=AAAA
otpauth://totp/nosecret
otpauth://totp/GitHub:octocat?secret=MZXW6===
";

    fn credential(text: &str) -> Credential {
        Credential::decode(text).unwrap()
    }

    #[test]
    fn read_skips_comments_blanks_and_invalid_lines() {
        let credentials = read_credentials(Cursor::new(FILE)).unwrap();
        let labels: Vec<&str> = credentials.iter().map(|c| c.label()).collect();
        // Duplicate labels are kept, in file order.
        assert_eq!(labels, vec!["GitHub:octocat", "AWS", "GitHub:octocat"]);
        assert_eq!(credentials[1].secret(), "GEZDGNBVGY3TQOJQ");
        assert_eq!(credentials[2].secret(), "MZXW6===");
    }

    #[test]
    fn read_skips_lines_that_are_not_utf8() {
        let input: &[u8] = b"# caf\xe9 Latin-1 comment\n\
otpauth://totp/AWS?secret=GEZDGNBVGY3TQOJQ\n\
otpauth://totp/caf\xe9?secret=AAAA\n\
otpauth://totp/GitHub?secret=JBSWY3DPEHPK3PXP";
        let credentials = read_credentials(Cursor::new(input)).unwrap();
        let labels: Vec<&str> = credentials.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["AWS", "GitHub"]);
    }

    #[test]
    fn read_handles_crlf_line_endings() {
        let input = "otpauth://totp/AWS?secret=GEZDGNBVGY3TQOJQ\r\n# note\r\n";
        let credentials = read_credentials(Cursor::new(input)).unwrap();
        assert_eq!(credentials.len(), 1);
        assert_eq!(credentials[0].secret(), "GEZDGNBVGY3TQOJQ");
    }

    #[test]
    fn read_empty_input() {
        assert!(read_credentials(Cursor::new("")).unwrap().is_empty());
        assert!(read_credentials(Cursor::new("# only\n\n")).unwrap().is_empty());
    }

    #[test]
    fn write_uses_canonical_lines() {
        let credentials = vec![
            credential("otpauth://totp/GitHub:octocat?secret=JBSWY3DPEHPK3PXP&issuer=GitHub"),
            credential("otpauth://totp/AWS?secret=GEZDGNBVGY3TQOJQ"),
        ];
        let mut out = Vec::new();
        write_credentials(&mut out, &credentials).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("# GMFA Secrets File\n"));
        let data: Vec<&str> = text
            .lines()
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        assert_eq!(
            data,
            vec![
                "otpauth://totp/GitHub:octocat?secret=JBSWY3DPEHPK3PXP",
                "otpauth://totp/AWS?secret=GEZDGNBVGY3TQOJQ",
            ]
        );
        assert_eq!(read_credentials(Cursor::new(text)).unwrap(), credentials);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join(DEFAULT_FILE_NAME));
        let credentials = read_credentials(Cursor::new(FILE)).unwrap();

        store.save(&credentials).unwrap();
        assert_eq!(store.load().unwrap(), credentials);
    }

    #[test]
    fn save_overwrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_FILE_NAME);
        fs::write(&path, FILE).unwrap();

        let store = CredentialStore::new(&path);
        let only = vec![credential("otpauth://totp/AWS?secret=GEZDGNBVGY3TQOJQ")];
        store.save(&only).unwrap();

        assert_eq!(store.load().unwrap(), only);
        assert!(!fs::read_to_string(&path).unwrap().contains("octocat"));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(DEFAULT_FILE_NAME));
        store.save(&[]).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("absent.conf"));
        let err = store.load().unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("absent.conf"));
    }
}
