//! Transcript replay against an in-memory authority.
//!
//! One step per line:
//!
//! ```text
//! # comment
//! attach left
//! left {"type":"APPLY_EDIT","requestId":"r1","baseVersion":0,"changes":[...]}
//! external [{"rangeOffset":0,"rangeLength":0,"text":"> "}]
//! resync left
//! detach left
//! ```
//!
//! Every message the authority sends is printed as `<- <surface> <json>`.

use std::collections::BTreeMap;
use std::io::Write;

use miette::{IntoDiagnostic, Result, miette};
use quire_authority::{HostDocument, MemoryDocument, SurfaceId, SyncCoordinator};
use quire_common::QuireConfig;
use quire_protocol::{HostMessage, decode_changes, encode};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, PartialEq, Eq)]
pub enum Step<'a> {
    Attach(&'a str),
    Detach(&'a str),
    Resync(&'a str),
    External(&'a str),
    Message { surface: &'a str, raw: &'a str },
}

/// `None` for blank and comment lines.
pub fn parse_step(line: &str) -> Result<Option<Step<'_>>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| miette!("`{line}` has no argument"))?;
    let rest = rest.trim();
    let step = match head {
        "attach" => Step::Attach(rest),
        "detach" => Step::Detach(rest),
        "resync" => Step::Resync(rest),
        "external" => Step::External(rest),
        surface if rest.starts_with('{') => Step::Message { surface, raw: rest },
        other => return Err(miette!("unknown step `{other}`")),
    };
    Ok(Some(step))
}

pub struct Replay {
    sync: SyncCoordinator<MemoryDocument>,
    channels: BTreeMap<SurfaceId, UnboundedReceiver<HostMessage>>,
}

impl Replay {
    pub fn new(uri: &str, text: &str, config: &QuireConfig) -> Self {
        Self {
            sync: SyncCoordinator::new(MemoryDocument::new(uri, text), config),
            channels: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.sync.version()
    }

    pub fn text(&self) -> String {
        self.sync.document().text()
    }

    /// Run one line and write whatever the authority sent in response.
    pub fn step(&mut self, line_no: usize, line: &str, out: &mut impl Write) -> Result<()> {
        let Some(step) = parse_step(line).map_err(|e| miette!("line {line_no}: {e}"))? else {
            return Ok(());
        };
        match step {
            Step::Attach(name) => {
                let surface = SurfaceId::new(name);
                let rx = self.sync.attach(surface.clone());
                self.channels.insert(surface, rx);
            }
            Step::Detach(name) => {
                let surface = SurfaceId::new(name);
                self.sync.detach(&surface);
                self.flush(out)?;
                self.channels.remove(&surface);
            }
            Step::Resync(name) => self.sync.request_resync(&SurfaceId::new(name))?,
            Step::External(raw) => {
                let changes = decode_changes(raw)?;
                self.sync.document_mut().external_edit(changes)?;
            }
            Step::Message { surface, raw } => {
                // a malformed message is answered on the wire, keep going
                if let Err(err) = self.sync.handle_raw(&SurfaceId::new(surface), raw) {
                    tracing::warn!(target: "quire::protocol", line = line_no, %err, "step failed");
                }
            }
        }
        self.sync.process_document_changes();
        self.flush(out)
    }

    fn flush(&mut self, out: &mut impl Write) -> Result<()> {
        for (surface, rx) in self.channels.iter_mut() {
            while let Ok(message) = rx.try_recv() {
                writeln!(out, "<- {surface} {}", encode(&message)?).into_diagnostic()?;
            }
        }
        Ok(())
    }
}

/// Replay a whole transcript, then print the final document.
pub fn run(
    uri: &str,
    initial: &str,
    transcript: &str,
    config: &QuireConfig,
    out: &mut impl Write,
) -> Result<()> {
    let mut replay = Replay::new(uri, initial, config);
    for (i, line) in transcript.lines().enumerate() {
        replay.step(i + 1, line, out)?;
    }
    writeln!(out, "== version {}", replay.version()).into_diagnostic()?;
    write!(out, "{}", replay.text()).into_diagnostic()?;
    Ok(())
}
