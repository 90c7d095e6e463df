use crate::vcd::Timescale;

/// The overarching error type which contains all possible errors as variants.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred while reading the capture or writing the trace.
    #[error("an I/O error occurred")]
    Io(#[from] std::io::Error),
    /// The capture file is not well-formed VCD.
    #[error("malformed VCD input at line {line}: {message}")]
    Parse {
        /// Line of the capture at which parsing gave up.
        line: u64,
        /// What was wrong with it.
        message: String,
    },
    /// A signal requested on the command line does not exist in the capture.
    #[error("signal `{scope}.{name}` was not declared by the capture")]
    SignalNotFound {
        /// Scope the signal was looked up in.
        scope: String,
        /// Local name of the signal.
        name: String,
    },
    /// The capture ended its definitions without declaring a timescale.
    #[error("the capture does not declare a timescale")]
    MissingTimescale,
    /// The capture's timescale differs from the requested one.
    #[error("timescale mismatch: the capture declares `{capture}`, `{requested}` was requested")]
    TimescaleMismatch {
        /// Timescale declared by the capture.
        capture: Timescale,
        /// Timescale given on the command line.
        requested: Timescale,
    },
    /// The decoded scan stream violates the target's debug protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

/// Fatal violations of the OnCE/Nexus debug protocol.
///
/// Any of these means the capture cannot be what it claims to be, so the run
/// is aborted instead of producing a misleading trace.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    /// The two oldest bits shifted out during an IR scan were not `10`.
    #[error("OnCE status prefix is not `10` at t={now}")]
    BadStatusPrefix {
        /// Timestamp of the offending update_ir.
        now: u64,
    },
    /// A write was attempted to a read-only OnCE register.
    #[error("write access to read-only OnCE register 0x{rs:02x} at t={now}")]
    WriteToReadOnly {
        /// Register select field of the offending command.
        rs: u8,
        /// Timestamp of the offending update_ir.
        now: u64,
    },
    /// A JTAG id scan was not exactly 32 bits long.
    #[error("JTAG id scan is {len} bits long, expected exactly 32")]
    JtagIdLength {
        /// Observed scan length.
        len: usize,
    },
    /// A CPUSCR scan length was not a usable multiple of 32.
    #[error("CPUSCR scan is {len} bits long, expected a non-empty multiple of 32 up to 192")]
    CpuscrLength {
        /// Observed scan length.
        len: usize,
    },
    /// An `mtcrf` opcode with the reserved spr bit set was scanned in.
    #[error("mtcrf with non-zero bit 10 of the spr field: 0x{ir:08x}")]
    MtcrfSprField {
        /// The offending instruction word.
        ir: u32,
    },
}
