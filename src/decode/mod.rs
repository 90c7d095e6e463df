//! Core decoders giving semantics to completed IR/DR scans.
//!
//! The tracker delivers every finished scan to exactly one decoder. Which
//! interpretation a DR scan gets is decided by the preceding IR scan, so
//! decoders are stateful; the trait object is owned by the watcher for the
//! whole run.

pub mod e200z0;

use crate::bits::ScanBits;
use crate::error::Error;
use crate::vcd::VcdWriter;

/// A decoder for the scans of one target core.
pub trait CoreDecoder {
    /// A completed IR scan: `ir_in` are the TDI samples, `ir_out` the TDO
    /// samples, both oldest-first and of equal length.
    fn instruction(
        &mut self,
        now: u64,
        ir_in: &ScanBits,
        ir_out: &ScanBits,
        writer: &mut VcdWriter,
    ) -> Result<(), Error>;

    /// An IR column traversal that shifted nothing
    /// (capture → exit1 → update).
    fn instruction_null(&mut self, now: u64, writer: &mut VcdWriter) -> Result<(), Error>;

    /// A completed DR scan, interpreted according to the last instruction.
    fn data(
        &mut self,
        now: u64,
        dr_in: &ScanBits,
        dr_out: &ScanBits,
        writer: &mut VcdWriter,
    ) -> Result<(), Error>;

    /// A DR column traversal that shifted nothing.
    fn data_null(&mut self, now: u64, writer: &mut VcdWriter) -> Result<(), Error>;
}

/// Selects which core decoder interprets the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CoreKind {
    /// Hex-dump every scan to the log.
    #[default]
    Simple,
    /// Decode nothing; useful for benchmarking the pipeline.
    Silent,
    /// Decode the OnCE/Nexus debug protocol of an e200z0 core.
    E200z0,
}

impl std::fmt::Display for CoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CoreKind::Simple => "simple",
            CoreKind::Silent => "silent",
            CoreKind::E200z0 => "e200z0",
        })
    }
}

impl CoreKind {
    /// Builds the decoder, registering its output variables with the
    /// writer.
    pub fn build(self, writer: &mut VcdWriter) -> Box<dyn CoreDecoder> {
        match self {
            CoreKind::Simple => Box::new(SimpleDecoder),
            CoreKind::Silent => Box::new(SilentDecoder),
            CoreKind::E200z0 => Box::new(e200z0::E200z0Decoder::new(writer)),
        }
    }
}

/// Logs a raw hex dump of every scan.
pub struct SimpleDecoder;

impl CoreDecoder for SimpleDecoder {
    fn instruction(
        &mut self,
        now: u64,
        ir_in: &ScanBits,
        ir_out: &ScanBits,
        _writer: &mut VcdWriter,
    ) -> Result<(), Error> {
        tracing::info!(
            "t={now} ir in=0x{} out=0x{}",
            ir_in.to_hex_oldest_msb(),
            ir_out.to_hex_oldest_msb()
        );
        Ok(())
    }

    fn instruction_null(&mut self, now: u64, _writer: &mut VcdWriter) -> Result<(), Error> {
        tracing::info!("t={now} ir empty scan");
        Ok(())
    }

    fn data(
        &mut self,
        now: u64,
        dr_in: &ScanBits,
        dr_out: &ScanBits,
        _writer: &mut VcdWriter,
    ) -> Result<(), Error> {
        tracing::info!(
            "t={now} dr in=0x{} out=0x{}",
            dr_in.to_hex_oldest_msb(),
            dr_out.to_hex_oldest_msb()
        );
        Ok(())
    }

    fn data_null(&mut self, now: u64, _writer: &mut VcdWriter) -> Result<(), Error> {
        tracing::info!("t={now} dr empty scan");
        Ok(())
    }
}

/// Ignores every scan.
pub struct SilentDecoder;

impl CoreDecoder for SilentDecoder {
    fn instruction(
        &mut self,
        _now: u64,
        _ir_in: &ScanBits,
        _ir_out: &ScanBits,
        _writer: &mut VcdWriter,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn instruction_null(&mut self, _now: u64, _writer: &mut VcdWriter) -> Result<(), Error> {
        Ok(())
    }

    fn data(
        &mut self,
        _now: u64,
        _dr_in: &ScanBits,
        _dr_out: &ScanBits,
        _writer: &mut VcdWriter,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn data_null(&mut self, _now: u64, _writer: &mut VcdWriter) -> Result<(), Error> {
        Ok(())
    }
}
