//! Decode JTAG captures in VCD format into annotated VCD traces.
//!
//! The pipeline samples the four JTAG signals (TCK, TMS, TDI, TDO) from a
//! VCD waveform, advances an IEEE 1149.1 TAP controller on every rising TCK
//! edge and hands every completed IR/DR scan to a core decoder. The output
//! is a second VCD that follows the TAP state, summarises each scan and,
//! with the e200z0 decoder selected, annotates the OnCE/Nexus debug traffic
//! of a Power-architecture target, down to disassembling the instructions
//! injected through the CPUSCR chain.
//!
//! The stages are deliberately small and separable: [`vcd::VcdReader`]
//! tokenizes the capture, [`engine::Engine`] tracks signal values and fires
//! sensitivity-registered watchers, [`jtag::JtagWatcher`] filters rising
//! clock edges into [`jtag::tap::TapTracker`] steps, and the
//! [`decode::CoreDecoder`] implementations give scans their meaning.

#![warn(missing_docs)]

pub mod bits;
pub mod decode;
pub mod engine;
mod error;
pub mod jtag;
pub mod vcd;

pub use crate::decode::CoreKind;
pub use crate::engine::Engine;
pub use crate::error::{Error, ProtocolViolation};
pub use crate::jtag::tap::TapState;
pub use crate::jtag::{JtagConfig, JtagWatcher};
pub use crate::vcd::{Timescale, VcdReader, VcdWriter};
