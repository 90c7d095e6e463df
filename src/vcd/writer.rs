//! Writer for the annotated output VCD.
//!
//! The decode pipeline produces changes that are monotonic per variable but
//! interleave across variables (operation summaries are stamped at the time
//! the operation *started*, while state changes are stamped as they happen).
//! The writer therefore queues everything and merges into globally
//! non-decreasing `#T` sections when the run finishes; on a failed run
//! nothing past the header is ever emitted.

use std::io::Write;

use crate::error::Error;
use crate::vcd::Timescale;

/// Kind of an output variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// A string-valued annotation variable.
    String,
    /// A 1-bit wire.
    Wire,
}

/// Opaque handle to a registered output variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarId(usize);

struct VarDef {
    scope: String,
    name: String,
    kind: VarKind,
    code: String,
    init: String,
}

struct Change {
    time: u64,
    var: VarId,
    value: String,
}

/// Buffering VCD writer with the narrow register/change contract the
/// decoders need.
pub struct VcdWriter {
    out: Box<dyn Write>,
    timescale: Timescale,
    vars: Vec<VarDef>,
    changes: Vec<Change>,
    finished: bool,
}

impl VcdWriter {
    /// Creates a writer emitting to `out` with the given timescale.
    pub fn new(out: Box<dyn Write>, timescale: Timescale) -> Self {
        Self {
            out,
            timescale,
            vars: Vec::new(),
            changes: Vec::new(),
            finished: false,
        }
    }

    /// Registers a variable under `scope` and returns its handle. The
    /// initial value goes into the `$dumpvars` section.
    pub fn register_var(&mut self, scope: &str, name: &str, kind: VarKind, init: &str) -> VarId {
        let code = id_code(self.vars.len());
        self.vars.push(VarDef {
            scope: scope.to_string(),
            name: name.to_string(),
            kind,
            code,
            init: init.to_string(),
        });
        VarId(self.vars.len() - 1)
    }

    /// Queues a value change. Timestamps must be non-decreasing per
    /// variable; ordering across variables is the writer's problem.
    pub fn change(&mut self, var: VarId, time: u64, value: impl Into<String>) {
        self.changes.push(Change {
            time,
            var,
            value: value.into(),
        });
    }

    /// Sorts the queued changes and writes the whole file.
    pub fn finish(&mut self) -> Result<(), Error> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        writeln!(self.out, "$version jtag-trace $end")?;
        writeln!(self.out, "$timescale {} $end", self.timescale)?;

        // One scope block per distinct scope, in registration order.
        let mut scopes: Vec<&str> = Vec::new();
        for var in &self.vars {
            if !scopes.contains(&var.scope.as_str()) {
                scopes.push(&var.scope);
            }
        }
        for scope in scopes {
            writeln!(self.out, "$scope module {scope} $end")?;
            for var in self.vars.iter().filter(|v| v.scope == scope) {
                let kind = match var.kind {
                    VarKind::String => "string",
                    VarKind::Wire => "wire",
                };
                writeln!(self.out, "$var {kind} 1 {} {} $end", var.code, var.name)?;
            }
            writeln!(self.out, "$upscope $end")?;
        }
        writeln!(self.out, "$enddefinitions $end")?;

        writeln!(self.out, "$dumpvars")?;
        for var in &self.vars {
            let line = format_value(var.kind, &var.init, &var.code);
            writeln!(self.out, "{line}")?;
        }
        writeln!(self.out, "$end")?;

        self.changes.sort_by_key(|c| c.time);
        let mut current: Option<u64> = None;
        for change in &self.changes {
            if current != Some(change.time) {
                writeln!(self.out, "#{}", change.time)?;
                current = Some(change.time);
            }
            let var = &self.vars[change.var.0];
            let line = format_value(var.kind, &change.value, &var.code);
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;
        tracing::debug!(
            "wrote {} changes on {} variables",
            self.changes.len(),
            self.vars.len()
        );
        Ok(())
    }
}

fn format_value(kind: VarKind, value: &str, code: &str) -> String {
    match kind {
        // String values are single tokens in VCD; internal whitespace
        // would split them.
        VarKind::String => format!("s{} {}", sanitize(value), code),
        VarKind::Wire => format!("{value}{code}"),
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Identifier codes use the printable ASCII range like any VCD dumper.
fn id_code(mut n: usize) -> String {
    let mut code = String::new();
    loop {
        code.push((b'!' + (n % 94) as u8) as char);
        n /= 94;
        if n == 0 {
            return code;
        }
        n -= 1;
    }
}
