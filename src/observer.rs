//! Parse-progress observer.
//!
//! Opening an archive reports its progress through a [`ParseObserver`].
//! Nothing in the open path depends on an observer being present or on
//! what it does.  [`LogObserver`] forwards events to the `log` facade and is
//! the default.

use log::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseEvent {
    SignatureRead { major: u8, minor: u8 },
    LocatorVerified { blob_offset: u64, blob_size: u64 },
    BlobRead { len: usize },
    HeaderParsed { encoded: bool },
    HeaderDecoded { pass: usize, len: usize },
    Resolved { folders: usize, entries: usize },
}

pub trait ParseObserver {
    fn on_event(&self, event: &ParseEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ParseObserver for LogObserver {
    fn on_event(&self, event: &ParseEvent) {
        match *event {
            ParseEvent::SignatureRead { major, minor } => debug!("signature ok, version {major}.{minor}"),
            ParseEvent::LocatorVerified { blob_offset, blob_size } => {
                debug!("locator ok: header at +{blob_offset}, {blob_size} bytes")
            }
            ParseEvent::BlobRead { len } => trace!("header blob read ({len} bytes)"),
            ParseEvent::HeaderParsed { encoded: true } => debug!("header is encoded"),
            ParseEvent::HeaderParsed { encoded: false } => trace!("header is structured"),
            ParseEvent::HeaderDecoded { pass, len } => debug!("decode pass {pass}: {len} bytes"),
            ParseEvent::Resolved { folders, entries } => {
                debug!("header resolved: {folders} folder(s), {entries} entr(ies)")
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ParseObserver for NullObserver {
    fn on_event(&self, _: &ParseEvent) {}
}
