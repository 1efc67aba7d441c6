//! Error types returned by the public socket API and the internal
//! registration/attachment paths.

use std::net::Ipv4Addr;

/// Errors a [`crate::rdt::Socket`] method can return.
///
/// These are the only errors the public API surfaces; anything that goes
/// wrong on the wire (a malformed or misdirected segment) is logged and
/// dropped by the demultiplexer instead, since there is no caller waiting
/// on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    #[error("the local address is already bound")]
    AddressInUse,
    #[error("the socket is already connected")]
    AlreadyConnected,
    #[error("the socket is already listening")]
    AlreadyListening,
    #[error("the socket has not been bound to a local address")]
    NotBound,
    #[error("the socket is not listening")]
    NotListening,
    #[error("the socket is not connected")]
    NotConnected,
    #[error("payload exceeds the segment's maximum length of {} bytes", u16::MAX)]
    PayloadTooLarge,
}

/// Errors from attaching a [`crate::host::Host`] to a [`crate::substrate::Substrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    #[error("a host is already attached at {0}")]
    AddressInUse(Ipv4Addr),
}

/// Errors from registering a protocol with a [`crate::host::Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("protocol id {0} is already registered to a different protocol instance")]
    Conflict(u8),
}

/// Internal demultiplexing failures. Never surfaced through [`SocketError`];
/// the demultiplexer logs these and moves on, matching the wire protocol's
/// silent-drop behavior for anything that doesn't parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub(crate) enum DemuxError {
    #[error("segment failed to parse or failed its checksum")]
    MalformedSegment,
}
