//! IEEE 1149.1 TAP controller model.
//!
//! [`TapTracker::update`] runs once per rising TCK edge: it executes the
//! handler of the current state (clearing the shift accumulators on the
//! capture states, appending TDI/TDO on the shift states, delivering the
//! finished scan on the update states), then moves along the standard
//! 16-state transition graph. Five rising edges with TMS high reach
//! `test_logic_reset` from anywhere, which is what makes the tracker
//! self-synchronizing on garbled captures.

use crate::bits::ScanBits;
use crate::decode::CoreDecoder;
use crate::error::Error;
use crate::vcd::{VarId, VcdWriter};

/// The 16 states of the TAP controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum TapState {
    /// Reset state, reachable from anywhere with five TMS=1 clocks.
    TestLogicReset,
    /// Idle state between operations.
    RunTestIdle,
    /// Entry to the data-register column.
    SelectDrScan,
    /// Loads the selected data register; clears the DR accumulators.
    CaptureDr,
    /// Shifts the data register one bit per clock.
    ShiftDr,
    /// First exit state of the DR column.
    Exit1Dr,
    /// Hold state of the DR column.
    PauseDr,
    /// Second exit state of the DR column.
    Exit2Dr,
    /// Latches the shifted data register; delivers the DR scan.
    UpdateDr,
    /// Entry to the instruction-register column.
    SelectIrScan,
    /// Loads the instruction register; clears the IR accumulators.
    CaptureIr,
    /// Shifts the instruction register one bit per clock.
    ShiftIr,
    /// First exit state of the IR column.
    Exit1Ir,
    /// Hold state of the IR column.
    PauseIr,
    /// Second exit state of the IR column.
    Exit2Ir,
    /// Latches the shifted instruction register; delivers the IR scan.
    UpdateIr,
}

impl TapState {
    /// The state reached from `self` with the given TMS level at a rising
    /// TCK edge.
    pub fn step(self, tms: bool) -> TapState {
        use TapState::{
            CaptureDr, CaptureIr, Exit1Dr, Exit1Ir, Exit2Dr, Exit2Ir, PauseDr, PauseIr,
            RunTestIdle, SelectDrScan, SelectIrScan, ShiftDr, ShiftIr, TestLogicReset, UpdateDr,
            UpdateIr,
        };
        match (self, tms) {
            (TestLogicReset, true) => TestLogicReset,
            (TestLogicReset, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,
            (RunTestIdle, false) => RunTestIdle,
            (SelectDrScan, true) => SelectIrScan,
            (SelectDrScan, false) => CaptureDr,
            (CaptureDr, true) => Exit1Dr,
            (CaptureDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (Exit1Dr, true) => UpdateDr,
            (Exit1Dr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (PauseDr, false) => PauseDr,
            (Exit2Dr, true) => UpdateDr,
            (Exit2Dr, false) => ShiftDr,
            (UpdateDr, true) => SelectDrScan,
            (UpdateDr, false) => RunTestIdle,
            (SelectIrScan, true) => TestLogicReset,
            (SelectIrScan, false) => CaptureIr,
            (CaptureIr, true) => Exit1Ir,
            (CaptureIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (Exit1Ir, true) => UpdateIr,
            (Exit1Ir, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (PauseIr, false) => PauseIr,
            (Exit2Ir, true) => UpdateIr,
            (Exit2Ir, false) => ShiftIr,
            (UpdateIr, true) => SelectDrScan,
            (UpdateIr, false) => RunTestIdle,
        }
    }

    /// The state's name as written to the `tap_state` variable.
    pub fn name(self) -> &'static str {
        match self {
            TapState::TestLogicReset => "test_logic_reset",
            TapState::RunTestIdle => "run_test_idle",
            TapState::SelectDrScan => "select_dr_scan",
            TapState::CaptureDr => "capture_dr",
            TapState::ShiftDr => "shift_dr",
            TapState::Exit1Dr => "exit1_dr",
            TapState::PauseDr => "pause_dr",
            TapState::Exit2Dr => "exit2_dr",
            TapState::UpdateDr => "update_dr",
            TapState::SelectIrScan => "select_ir_scan",
            TapState::CaptureIr => "capture_ir",
            TapState::ShiftIr => "shift_ir",
            TapState::Exit1Ir => "exit1_ir",
            TapState::PauseIr => "pause_ir",
            TapState::Exit2Ir => "exit2_ir",
            TapState::UpdateIr => "update_ir",
        }
    }
}

impl std::fmt::Display for TapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handles to the generic output variables written by the tracker.
#[derive(Debug, Clone, Copy)]
pub struct TraceVars {
    /// String variable following every TAP state change.
    pub tap_state: VarId,
    /// String variable carrying per-operation summaries.
    pub jtag: VarId,
}

/// The sampled JTAG inputs of one rising TCK edge.
#[derive(Debug, Clone, Copy)]
pub struct TapInput {
    /// Simulated time of the edge.
    pub now: u64,
    /// TMS level at the edge.
    pub tms: bool,
    /// TDI level at the edge.
    pub tdi: bool,
    /// TDO level at the edge.
    pub tdo: bool,
}

/// Walks the TAP controller and accumulates the IR/DR scan bits.
#[derive(Debug)]
pub struct TapTracker {
    state: TapState,
    /// Time at which the running IR/DR operation left the idle or update
    /// state; operation summaries are stamped with it.
    op_start: u64,
    ir_in: ScanBits,
    ir_out: ScanBits,
    dr_in: ScanBits,
    dr_out: ScanBits,
}

impl TapTracker {
    /// Creates a tracker starting in `initstate`.
    pub fn new(initstate: TapState) -> Self {
        Self {
            state: initstate,
            op_start: 0,
            ir_in: ScanBits::new(),
            ir_out: ScanBits::new(),
            dr_in: ScanBits::new(),
            dr_out: ScanBits::new(),
        }
    }

    /// Current controller state.
    pub fn state(&self) -> TapState {
        self.state
    }

    /// Advances the controller by one rising TCK edge.
    pub fn update(
        &mut self,
        input: TapInput,
        writer: &mut VcdWriter,
        vars: &TraceVars,
        decoder: &mut dyn CoreDecoder,
    ) -> Result<(), Error> {
        let TapInput { now, tms, tdi, tdo } = input;
        let previous = self.state;
        match previous {
            TapState::TestLogicReset => {
                if !tms {
                    writer.change(vars.jtag, now, "idle");
                }
            }
            TapState::RunTestIdle => {
                if tms {
                    self.op_start = now;
                }
            }
            TapState::CaptureDr => {
                self.dr_in.clear();
                self.dr_out.clear();
            }
            TapState::ShiftDr => {
                self.dr_in.push(tdi);
                self.dr_out.push(tdo);
            }
            TapState::UpdateDr => {
                self.deliver_dr(now, writer, vars, decoder)?;
                if tms {
                    self.op_start = now;
                } else {
                    writer.change(vars.jtag, now, "idle");
                }
            }
            TapState::SelectIrScan => {
                if tms {
                    writer.change(vars.jtag, now, "reset");
                }
            }
            TapState::CaptureIr => {
                self.ir_in.clear();
                self.ir_out.clear();
            }
            TapState::ShiftIr => {
                self.ir_in.push(tdi);
                self.ir_out.push(tdo);
            }
            TapState::UpdateIr => {
                self.deliver_ir(now, writer, vars, decoder)?;
                if tms {
                    self.op_start = now;
                } else {
                    writer.change(vars.jtag, now, "idle");
                }
            }
            TapState::SelectDrScan
            | TapState::Exit1Dr
            | TapState::PauseDr
            | TapState::Exit2Dr
            | TapState::Exit1Ir
            | TapState::PauseIr
            | TapState::Exit2Ir => {}
        }

        let next = previous.step(tms);
        if next != previous {
            tracing::trace!("t={now} tap {previous} -> {next}");
            writer.change(vars.tap_state, now, next.name());
            self.state = next;
        }
        Ok(())
    }

    fn deliver_dr(
        &mut self,
        now: u64,
        writer: &mut VcdWriter,
        vars: &TraceVars,
        decoder: &mut dyn CoreDecoder,
    ) -> Result<(), Error> {
        debug_assert_eq!(self.dr_in.len(), self.dr_out.len());
        if self.dr_in.is_empty() {
            writer.change(vars.jtag, self.op_start, "in=NULL-out=NULL");
            decoder.data_null(now, writer)
        } else {
            let summary = format!(
                "in=0x{}-out=0x{}",
                self.dr_in.to_hex_oldest_msb(),
                self.dr_out.to_hex_oldest_msb()
            );
            writer.change(vars.jtag, self.op_start, summary);
            decoder.data(now, &self.dr_in, &self.dr_out, writer)
        }
    }

    fn deliver_ir(
        &mut self,
        now: u64,
        writer: &mut VcdWriter,
        vars: &TraceVars,
        decoder: &mut dyn CoreDecoder,
    ) -> Result<(), Error> {
        debug_assert_eq!(self.ir_in.len(), self.ir_out.len());
        if self.ir_in.is_empty() {
            writer.change(vars.jtag, self.op_start, "ir=NULL");
            decoder.instruction_null(now, writer)
        } else {
            let summary = format!("ir=0x{}", self.ir_in.to_hex_oldest_msb());
            writer.change(vars.jtag, self.op_start, summary);
            decoder.instruction(now, &self.ir_in, &self.ir_out, writer)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;
    use crate::bits::ScanBits;
    use crate::vcd::{Timescale, TimeUnit, VarKind};

    #[test_case(TapState::TestLogicReset, false, TapState::RunTestIdle; "tlr exits on low")]
    #[test_case(TapState::TestLogicReset, true, TapState::TestLogicReset; "tlr holds on high")]
    #[test_case(TapState::RunTestIdle, true, TapState::SelectDrScan; "idle to select dr")]
    #[test_case(TapState::RunTestIdle, false, TapState::RunTestIdle; "idle holds")]
    #[test_case(TapState::SelectDrScan, true, TapState::SelectIrScan; "select dr to select ir")]
    #[test_case(TapState::SelectDrScan, false, TapState::CaptureDr; "select dr to capture")]
    #[test_case(TapState::CaptureDr, false, TapState::ShiftDr; "capture dr to shift")]
    #[test_case(TapState::CaptureDr, true, TapState::Exit1Dr; "capture dr skips shift")]
    #[test_case(TapState::ShiftDr, false, TapState::ShiftDr; "shift dr holds")]
    #[test_case(TapState::ShiftDr, true, TapState::Exit1Dr; "shift dr exits")]
    #[test_case(TapState::Exit1Dr, true, TapState::UpdateDr; "exit1 dr to update")]
    #[test_case(TapState::Exit1Dr, false, TapState::PauseDr; "exit1 dr to pause")]
    #[test_case(TapState::PauseDr, false, TapState::PauseDr; "pause dr holds")]
    #[test_case(TapState::PauseDr, true, TapState::Exit2Dr; "pause dr exits")]
    #[test_case(TapState::Exit2Dr, false, TapState::ShiftDr; "exit2 dr resumes shift")]
    #[test_case(TapState::Exit2Dr, true, TapState::UpdateDr; "exit2 dr to update")]
    #[test_case(TapState::UpdateDr, true, TapState::SelectDrScan; "update dr chains")]
    #[test_case(TapState::UpdateDr, false, TapState::RunTestIdle; "update dr to idle")]
    #[test_case(TapState::SelectIrScan, true, TapState::TestLogicReset; "select ir to reset")]
    #[test_case(TapState::SelectIrScan, false, TapState::CaptureIr; "select ir to capture")]
    #[test_case(TapState::CaptureIr, false, TapState::ShiftIr; "capture ir to shift")]
    #[test_case(TapState::CaptureIr, true, TapState::Exit1Ir; "capture ir skips shift")]
    #[test_case(TapState::ShiftIr, false, TapState::ShiftIr; "shift ir holds")]
    #[test_case(TapState::ShiftIr, true, TapState::Exit1Ir; "shift ir exits")]
    #[test_case(TapState::Exit1Ir, true, TapState::UpdateIr; "exit1 ir to update")]
    #[test_case(TapState::Exit1Ir, false, TapState::PauseIr; "exit1 ir to pause")]
    #[test_case(TapState::PauseIr, false, TapState::PauseIr; "pause ir holds")]
    #[test_case(TapState::PauseIr, true, TapState::Exit2Ir; "pause ir exits")]
    #[test_case(TapState::Exit2Ir, false, TapState::ShiftIr; "exit2 ir resumes shift")]
    #[test_case(TapState::Exit2Ir, true, TapState::UpdateIr; "exit2 ir to update")]
    #[test_case(TapState::UpdateIr, true, TapState::SelectDrScan; "update ir chains")]
    #[test_case(TapState::UpdateIr, false, TapState::RunTestIdle; "update ir to idle")]
    fn transition_table(from: TapState, tms: bool, to: TapState) {
        assert_eq!(from.step(tms), to);
    }

    #[test]
    fn five_high_clocks_reach_reset_from_anywhere() {
        let all = [
            TapState::TestLogicReset,
            TapState::RunTestIdle,
            TapState::SelectDrScan,
            TapState::CaptureDr,
            TapState::ShiftDr,
            TapState::Exit1Dr,
            TapState::PauseDr,
            TapState::Exit2Dr,
            TapState::UpdateDr,
            TapState::SelectIrScan,
            TapState::CaptureIr,
            TapState::ShiftIr,
            TapState::Exit1Ir,
            TapState::PauseIr,
            TapState::Exit2Ir,
            TapState::UpdateIr,
        ];
        for start in all {
            let mut state = start;
            for _ in 0..5 {
                state = state.step(true);
            }
            assert_eq!(state, TapState::TestLogicReset, "from {start:?}");
        }
    }

    /// Records scan deliveries for the tracker tests.
    #[derive(Default)]
    struct RecordingDecoder {
        instructions: Vec<(u64, ScanBits, ScanBits)>,
        instruction_nulls: Vec<u64>,
        data: Vec<(u64, ScanBits, ScanBits)>,
        data_nulls: Vec<u64>,
    }

    impl CoreDecoder for RecordingDecoder {
        fn instruction(
            &mut self,
            now: u64,
            ir_in: &ScanBits,
            ir_out: &ScanBits,
            _writer: &mut VcdWriter,
        ) -> Result<(), Error> {
            self.instructions.push((now, ir_in.clone(), ir_out.clone()));
            Ok(())
        }

        fn instruction_null(&mut self, now: u64, _writer: &mut VcdWriter) -> Result<(), Error> {
            self.instruction_nulls.push(now);
            Ok(())
        }

        fn data(
            &mut self,
            now: u64,
            dr_in: &ScanBits,
            dr_out: &ScanBits,
            _writer: &mut VcdWriter,
        ) -> Result<(), Error> {
            self.data.push((now, dr_in.clone(), dr_out.clone()));
            Ok(())
        }

        fn data_null(&mut self, now: u64, _writer: &mut VcdWriter) -> Result<(), Error> {
            self.data_nulls.push(now);
            Ok(())
        }
    }

    struct Harness {
        tracker: TapTracker,
        writer: VcdWriter,
        vars: TraceVars,
        decoder: RecordingDecoder,
        now: u64,
    }

    impl Harness {
        fn new(initstate: TapState) -> Self {
            let mut writer = VcdWriter::new(
                Box::new(std::io::sink()),
                Timescale {
                    factor: 1,
                    unit: TimeUnit::Ns,
                },
            );
            let tap_state =
                writer.register_var("parsed", "tap_state", VarKind::String, initstate.name());
            let jtag = writer.register_var("parsed", "jtag", VarKind::String, "idle");
            Self {
                tracker: TapTracker::new(initstate),
                writer,
                vars: TraceVars { tap_state, jtag },
                decoder: RecordingDecoder::default(),
                now: 0,
            }
        }

        /// Clocks one rising edge per pattern char: '0'/'1' drive TMS with
        /// TDI/TDO low, 'i' shifts TDI=1, 'o' shifts TDO=1 (TMS low).
        fn clock(&mut self, pattern: &str) {
            for c in pattern.chars() {
                self.now += 10;
                let (tms, tdi, tdo) = match c {
                    '0' => (false, false, false),
                    '1' => (true, false, false),
                    'i' => (false, true, false),
                    'o' => (false, false, true),
                    other => panic!("bad pattern char {other}"),
                };
                self.tracker
                    .update(
                        TapInput {
                            now: self.now,
                            tms,
                            tdi,
                            tdo,
                        },
                        &mut self.writer,
                        &self.vars,
                        &mut self.decoder,
                    )
                    .unwrap();
            }
        }
    }

    #[test]
    fn empty_dr_scan_delivers_data_null() {
        let mut h = Harness::new(TapState::TestLogicReset);
        // Reset, idle, then walk select-dr / capture-dr / exit1-dr /
        // update-dr without shifting, and return to idle.
        h.clock("11111010110");
        assert_eq!(h.tracker.state(), TapState::RunTestIdle);
        assert_eq!(h.decoder.data_nulls.len(), 1);
        assert!(h.decoder.data.is_empty());
        assert!(h.decoder.instructions.is_empty());
    }

    #[test]
    fn shifted_ir_scan_is_delivered_oldest_first() {
        let mut h = Harness::new(TapState::RunTestIdle);
        // idle -> select-dr -> select-ir -> capture-ir, then four edges in
        // shift-ir sampling TDI 1,0,1,0 (the last edge also exits), then
        // exit1 -> update -> idle.
        h.clock("1100i0i110");
        assert_eq!(h.decoder.instructions.len(), 1);
        let (_, ir_in, ir_out) = &h.decoder.instructions[0];
        // Four edges were spent in shift_ir: samples 1,0,1,0 oldest-first.
        assert_eq!(ir_in.len(), 4);
        assert_eq!(ir_in.bit(0), true);
        assert_eq!(ir_in.bit(1), false);
        assert_eq!(ir_in.bit(2), true);
        assert_eq!(ir_in.bit(3), false);
        assert_eq!(ir_out.len(), 4);
    }

    #[test]
    fn pause_and_exit2_resume_shifting() {
        let mut h = Harness::new(TapState::RunTestIdle);
        // DR scan with a pause in the middle: three shift edges, pause via
        // exit1, resume through exit2, two more shift edges, then update.
        h.clock("100ii10010i110");
        assert_eq!(h.decoder.data.len(), 1);
        let (_, dr_in, _) = &h.decoder.data[0];
        // Shift-dr edges sampled 1,1,0 then 1,0 after the pause.
        assert_eq!(dr_in.len(), 5);
        assert_eq!(h.tracker.state(), TapState::RunTestIdle);
    }

    #[test]
    fn deliveries_carry_equal_lengths() {
        let mut h = Harness::new(TapState::RunTestIdle);
        h.clock("100ioio110");
        let (_, dr_in, dr_out) = &h.decoder.data[0];
        assert_eq!(dr_in.len(), dr_out.len());
    }
}
