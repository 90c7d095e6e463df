//! Streaming reader for the source VCD capture.
//!
//! The reader tokenizes the input line by line and yields [`VcdEvent`]s; it
//! keeps no per-signal state of its own. Header commands it does not care
//! about (`$date`, `$version`, ...) are skipped, as are the `$dumpvars` /
//! `$dumpoff` markers in the change section; the changes they wrap are
//! delivered normally, so an initialisation dump becomes the time-0 step.

use std::collections::VecDeque;
use std::io::BufRead;

use crate::error::Error;
use crate::vcd::{Timescale, VcdEvent};

/// Iterator over the events of a VCD capture.
pub struct VcdReader<R> {
    input: R,
    line: u64,
    tokens: VecDeque<String>,
    scopes: Vec<String>,
    in_definitions: bool,
}

impl<R: BufRead> VcdReader<R> {
    /// Wraps a buffered reader positioned at the start of a VCD file.
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: 0,
            tokens: VecDeque::new(),
            scopes: Vec::new(),
            in_definitions: true,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    /// Next whitespace-separated token, refilling from the input as needed.
    fn next_token(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(token) = self.tokens.pop_front() {
                return Ok(Some(token));
            }
            let mut buf = String::new();
            if self.input.read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            self.tokens
                .extend(buf.split_whitespace().map(str::to_string));
        }
    }

    fn require_token(&mut self, context: &str) -> Result<String, Error> {
        self.next_token()?
            .ok_or_else(|| self.error(format!("unexpected end of file in {context}")))
    }

    /// Consumes tokens up to and including `$end`.
    fn skip_to_end(&mut self, context: &str) -> Result<(), Error> {
        loop {
            if self.require_token(context)? == "$end" {
                return Ok(());
            }
        }
    }

    /// Collects the tokens of a command body up to `$end`.
    fn body(&mut self, context: &str) -> Result<Vec<String>, Error> {
        let mut tokens = Vec::new();
        loop {
            let token = self.require_token(context)?;
            if token == "$end" {
                return Ok(tokens);
            }
            tokens.push(token);
        }
    }

    fn definition_command(&mut self, command: &str) -> Result<Option<VcdEvent>, Error> {
        match command {
            "$date" | "$version" | "$comment" => {
                self.skip_to_end(command)?;
                Ok(None)
            }
            "$timescale" => {
                let body = self.body(command)?.join(" ");
                let timescale: Timescale = body
                    .parse()
                    .map_err(|e| self.error(format!("bad $timescale: {e}")))?;
                Ok(Some(VcdEvent::Timescale(timescale)))
            }
            "$scope" => {
                let body = self.body(command)?;
                let name = body
                    .get(1)
                    .ok_or_else(|| self.error("$scope needs a type and a name"))?;
                self.scopes.push(name.clone());
                Ok(None)
            }
            "$upscope" => {
                self.skip_to_end(command)?;
                if self.scopes.pop().is_none() {
                    return Err(self.error("$upscope without a matching $scope"));
                }
                Ok(None)
            }
            "$var" => {
                let body = self.body(command)?;
                // $var <type> <width> <id> <name> [bit indices] $end
                if body.len() < 4 {
                    return Err(self.error("$var needs a type, width, id and name"));
                }
                let width: u32 = body[1]
                    .parse()
                    .map_err(|_| self.error(format!("bad $var width `{}`", body[1])))?;
                Ok(Some(VcdEvent::Var {
                    scope: self.scopes.join("."),
                    name: body[3].clone(),
                    width,
                    id: body[2].clone(),
                }))
            }
            "$enddefinitions" => {
                self.skip_to_end(command)?;
                self.in_definitions = false;
                Ok(Some(VcdEvent::EndDefinitions))
            }
            other => {
                tracing::debug!("skipping unhandled VCD command {other}");
                self.skip_to_end(other)?;
                Ok(None)
            }
        }
    }

    fn change_token(&mut self, token: String) -> Result<Option<VcdEvent>, Error> {
        let mut chars = token.chars();
        match chars.next() {
            Some('#') => {
                let time: u64 = chars
                    .as_str()
                    .parse()
                    .map_err(|_| self.error(format!("bad timestamp `{token}`")))?;
                Ok(Some(VcdEvent::Timestamp(time)))
            }
            // Vector and real changes carry the id as the following token.
            Some('b') | Some('B') | Some('r') | Some('R') => {
                let value = chars.as_str().to_string();
                if value.is_empty() {
                    return Err(self.error(format!("vector change `{token}` carries no value")));
                }
                let id = self.require_token("vector change")?;
                Ok(Some(VcdEvent::Change { id, value }))
            }
            Some(v @ ('0' | '1' | 'x' | 'X' | 'z' | 'Z')) => {
                let id = chars.as_str();
                if id.is_empty() {
                    return Err(self.error(format!("scalar change `{token}` carries no id")));
                }
                Ok(Some(VcdEvent::Change {
                    id: id.to_string(),
                    value: v.to_ascii_lowercase().to_string(),
                }))
            }
            Some('$') => match token.as_str() {
                // Dump control wraps ordinary changes; the markers carry no
                // information we need.
                "$dumpvars" | "$dumpall" | "$dumpon" | "$dumpoff" | "$end" => Ok(None),
                "$comment" => {
                    self.skip_to_end("$comment")?;
                    Ok(None)
                }
                other => Err(self.error(format!("unexpected command `{other}` in change section"))),
            },
            _ => Err(self.error(format!("unrecognised change line `{token}`"))),
        }
    }
}

impl<R: BufRead> Iterator for VcdReader<R> {
    type Item = Result<VcdEvent, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let token = match self.next_token() {
                Ok(Some(token)) => token,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            let event = if self.in_definitions {
                if token.starts_with('$') {
                    self.definition_command(&token)
                } else {
                    Err(self.error(format!("expected a command, found `{token}`")))
                }
            } else {
                self.change_token(token)
            };
            match event {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
