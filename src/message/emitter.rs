//! Message-file writer and reader.
//!
//! Ported from `original_source/common/create_message.c`: create
//! exclusively, write `[destination]` then the recipient, then an
//! optional `[options]` section, fsync, close. A partial write is treated
//! as failure and the half-written file is unlinked (§4.3's writer
//! contract); the original bails out on the first `write()` mismatch
//! without unlinking, but leaving a half-written message file for a
//! reader to later trip over is exactly the "malformed" case §4.3's
//! reader contract exists to handle, so this port unlinks on any write
//! failure rather than leaving it behind.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{AfdError, Result};

const DESTINATION_IDENTIFIER: &str = "[destination]";
const OPTION_IDENTIFIER: &str = "[options]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub recipient: String,
    pub options: Option<String>,
}

fn message_path(messages_dir: &Path, job_id: u64) -> PathBuf {
    messages_dir.join(format!("{job_id:x}"))
}

/// Write a message file for `job_id`. Any failure unlinks the
/// partially-written file and returns the triggering error.
pub fn create_message(messages_dir: &Path, job_id: u64, recipient: &str, options: Option<&str>) -> Result<()> {
    let path = message_path(messages_dir, job_id);

    let write_result = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;

        write!(file, "{DESTINATION_IDENTIFIER}\n{recipient}\n\n")?;

        if let Some(options) = options {
            write!(file, "{OPTION_IDENTIFIER}\n{options}\n")?;
        }

        file.sync_all()
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&path);
        return Err(AfdError::transient(format!("create_message {path:?}"), e));
    }

    Ok(())
}

/// Parse a message file. Unknown bracketed sections are ignored. A file
/// missing the mandatory `[destination]` section is `Structural`
/// corruption (§7), not a transient error — the caller should move it to
/// the error sub-area and emit `MalformedMessage`.
pub fn read_message(path: &Path) -> Result<Message> {
    let mut text = String::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_string(&mut text))
        .map_err(|e| AfdError::transient(format!("read {path:?}"), e))?;

    let mut recipient = None;
    let mut options_lines: Vec<&str> = Vec::new();
    let mut section = None;

    for line in text.lines() {
        if line.starts_with('[') && line.ends_with(']') {
            section = Some(line);
            continue;
        }
        match section {
            Some(DESTINATION_IDENTIFIER) if recipient.is_none() && !line.is_empty() => {
                recipient = Some(line.to_string());
            }
            Some(OPTION_IDENTIFIER) => options_lines.push(line),
            _ => {}
        }
    }

    let recipient = recipient.ok_or_else(|| {
        AfdError::Structural(format!("{path:?}: missing [destination] section"))
    })?;

    let options = if options_lines.is_empty() {
        None
    } else {
        Some(options_lines.join("\n"))
    };

    Ok(Message { recipient, options })
}
