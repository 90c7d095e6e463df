//! Reading and writing of Value Change Dump waveform files.

pub mod reader;
pub mod writer;

pub use reader::VcdReader;
pub use writer::{VarId, VarKind, VcdWriter};

/// Time unit of a VCD timescale declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// Seconds.
    S,
    /// Milliseconds.
    Ms,
    /// Microseconds.
    Us,
    /// Nanoseconds.
    Ns,
    /// Picoseconds.
    Ps,
    /// Femtoseconds.
    Fs,
}

impl TimeUnit {
    fn as_str(self) -> &'static str {
        match self {
            TimeUnit::S => "s",
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
            TimeUnit::Ps => "ps",
            TimeUnit::Fs => "fs",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "s" => TimeUnit::S,
            "ms" => TimeUnit::Ms,
            "us" => TimeUnit::Us,
            "ns" => TimeUnit::Ns,
            "ps" => TimeUnit::Ps,
            "fs" => TimeUnit::Fs,
            _ => return None,
        })
    }
}

/// A VCD timescale: a factor of 1, 10 or 100 and a time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timescale {
    /// Multiplier, restricted to 1, 10 or 100 by the VCD standard.
    pub factor: u32,
    /// Unit the factor applies to.
    pub unit: TimeUnit,
}

/// The given string is not a valid VCD timescale.
#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid timescale, expected e.g. `1 ns`, `10 us`, `100 ps`")]
pub struct TimescaleParseError(String);

impl std::str::FromStr for Timescale {
    type Err = TimescaleParseError;

    /// Accepts `"1 ns"` as well as the compact `"1ns"` found in the wild.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.split_whitespace().collect();
        let digits = compact.len() - compact.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let (factor, unit) = compact.split_at(digits);
        let factor: u32 = factor
            .parse()
            .map_err(|_| TimescaleParseError(s.to_string()))?;
        if !matches!(factor, 1 | 10 | 100) {
            return Err(TimescaleParseError(s.to_string()));
        }
        let unit = TimeUnit::parse(unit).ok_or_else(|| TimescaleParseError(s.to_string()))?;
        Ok(Timescale { factor, unit })
    }
}

impl std::fmt::Display for Timescale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.factor, self.unit.as_str())
    }
}

/// One event delivered by the [`VcdReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcdEvent {
    /// The capture's `$timescale` declaration.
    Timescale(Timescale),
    /// A `$var` declaration.
    Var {
        /// Dotted scope path the variable lives in.
        scope: String,
        /// Local name of the variable.
        name: String,
        /// Declared width in bits.
        width: u32,
        /// Short id code used by the change section.
        id: String,
    },
    /// `$enddefinitions` was reached; ids can be resolved now.
    EndDefinitions,
    /// A `#T` line starting a new simulation step.
    Timestamp(u64),
    /// A value change within the current step.
    Change {
        /// Short id code of the changed signal.
        id: String,
        /// New value, e.g. `"1"`, `"0"`, `"x"` or a vector like `"1010"`.
        value: String,
    },
}
