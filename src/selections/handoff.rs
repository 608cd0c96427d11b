// src/selections/handoff.rs

//! Length-prefixed selections message written to the host on stdout.
//!
//! Framing: eight lowercase, zero-padded hex digits giving the byte length
//! of the body, one `\n`, then exactly that many bytes of UTF-8 XML.

use std::io::{Read, Write};

use crate::errors::{LaunchError, Result};
use crate::selections::model::Selections;
use crate::selections::xml;

const HEADER_LEN: usize = 9;

/// Frame an already-serialized body.
pub fn frame(body: &str) -> Result<Vec<u8>> {
    let len = u32::try_from(body.len()).map_err(|_| {
        LaunchError::Handoff(format!("body of {} bytes is too large to frame", body.len()))
    })?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(format!("{len:08x}\n").as_bytes());
    out.extend_from_slice(body.as_bytes());
    Ok(out)
}

/// Canonical handoff message for `sels`.
pub fn encode(sels: &Selections) -> Result<Vec<u8>> {
    frame(&xml::to_xml(sels)?)
}

/// Write the handoff message for `sels` to `out` and flush it.
pub fn write_to(out: &mut dyn Write, sels: &Selections) -> Result<()> {
    out.write_all(&encode(sels)?)?;
    out.flush()?;
    Ok(())
}

/// Read exactly one framed body from `input`.
pub fn read_body(input: &mut dyn Read) -> Result<String> {
    let mut header = [0u8; HEADER_LEN];
    input
        .read_exact(&mut header)
        .map_err(|e| LaunchError::Handoff(format!("reading length header: {e}")))?;

    if header[8] != b'\n' {
        return Err(LaunchError::Handoff(
            "length header is not terminated by a newline".to_string(),
        ));
    }
    let digits = std::str::from_utf8(&header[..8])
        .ok()
        .filter(|d| d.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| LaunchError::Handoff("length header is not 8 hex digits".to_string()))?;
    let len = usize::from_str_radix(digits, 16)
        .map_err(|e| LaunchError::Handoff(format!("bad length header: {e}")))?;

    // Grows with what actually arrives, not with what the header claims.
    let mut body = Vec::new();
    input
        .take(len as u64)
        .read_to_end(&mut body)
        .map_err(|e| LaunchError::Handoff(format!("reading selections: {e}")))?;
    if body.len() != len {
        return Err(LaunchError::Handoff(format!(
            "expected {len} bytes of selections, got {}",
            body.len()
        )));
    }

    String::from_utf8(body)
        .map_err(|e| LaunchError::Handoff(format!("selections are not UTF-8: {e}")))
}

/// Read and parse one handoff message.
pub fn read(input: &mut dyn Read) -> Result<Selections> {
    xml::from_xml(&read_body(input)?)
}
