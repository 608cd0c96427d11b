// src/trust/prompt.rs

use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::errors::Result;
use crate::trust::signature::Signature;
use crate::types::TrustPolicy;

/// What the user is asked to decide.
#[derive(Debug, Clone, Copy)]
pub struct TrustRequest<'a> {
    pub interface: &'a str,
    pub domain: &'a str,
    /// Only valid signatures are ever presented.
    pub keys: &'a [&'a Signature],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustResponse {
    Trust,
    Reject,
}

/// Trait for the yes/no decision, so the gate can be driven by a
/// terminal, a GUI, or a fixed policy.
pub trait TrustPrompt {
    fn confirm(&mut self, request: &TrustRequest<'_>) -> Result<TrustResponse>;
}

/// Asks on a terminal. End of input counts as a rejection.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }

    fn describe(&mut self, request: &TrustRequest<'_>) -> Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "Interface: {}", request.interface)?;
        writeln!(
            self.output,
            "The interface is correctly signed with the following keys:"
        )?;
        for key in request.keys {
            writeln!(self.output, "- {key}")?;
        }
        if request.keys.len() == 1 {
            writeln!(
                self.output,
                "Do you want to trust this key to sign feeds from '{}'?",
                request.domain
            )?;
        } else {
            writeln!(
                self.output,
                "Do you want to trust all of these keys to sign feeds from '{}'?",
                request.domain
            )?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> TrustPrompt for ConsolePrompt<R, W> {
    fn confirm(&mut self, request: &TrustRequest<'_>) -> Result<TrustResponse> {
        self.describe(request)?;

        loop {
            write!(self.output, "Trust [Y/N] ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                info!(interface = request.interface, "no answer; not trusting");
                writeln!(self.output)?;
                return Ok(TrustResponse::Reject);
            }

            match line.trim() {
                "Y" | "y" => return Ok(TrustResponse::Trust),
                "N" | "n" => return Ok(TrustResponse::Reject),
                other => debug!(answer = other, "unrecognised answer; asking again"),
            }
        }
    }
}

/// Answers from configuration without asking anyone.
#[derive(Debug, Clone, Copy)]
pub struct PolicyPrompt {
    response: TrustResponse,
}

impl PolicyPrompt {
    pub fn new(response: TrustResponse) -> Self {
        Self { response }
    }

    /// `None` for [`TrustPolicy::Ask`], which needs a real prompt.
    pub fn for_policy(policy: TrustPolicy) -> Option<Self> {
        match policy {
            TrustPolicy::Ask => None,
            TrustPolicy::Trust => Some(Self::new(TrustResponse::Trust)),
            TrustPolicy::Deny => Some(Self::new(TrustResponse::Reject)),
        }
    }
}

impl TrustPrompt for PolicyPrompt {
    fn confirm(&mut self, request: &TrustRequest<'_>) -> Result<TrustResponse> {
        info!(
            interface = request.interface,
            domain = request.domain,
            response = ?self.response,
            "answering trust prompt from configuration"
        );
        Ok(self.response)
    }
}
