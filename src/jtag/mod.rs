//! The watcher that turns rising TCK edges into TAP tracker steps.

pub mod tap;

use crate::decode::{CoreDecoder, CoreKind};
use crate::engine::{Definitions, SignalId, Step, Watcher};
use crate::error::Error;
use crate::vcd::{Timescale, VarKind, VcdWriter};
use self::tap::{TapInput, TapState, TapTracker, TraceVars};

/// Everything the watcher needs to know about the capture and the trace.
#[derive(Debug, Clone)]
pub struct JtagConfig {
    /// Scope containing the JTAG signals in the capture.
    pub inscope: String,
    /// Scope receiving the decoded variables in the trace.
    pub outscope: String,
    /// Name of the TCK signal.
    pub tck: String,
    /// Name of the TMS signal.
    pub tms: String,
    /// Name of the TDI signal.
    pub tdi: String,
    /// Name of the TDO signal.
    pub tdo: String,
    /// TAP controller state to start from.
    pub initstate: TapState,
    /// Timescale the capture must declare.
    pub timescale: Timescale,
}

#[derive(Debug, Clone)]
struct ResolvedIds {
    tck: SignalId,
    tms: SignalId,
    tdi: SignalId,
    tdo: SignalId,
}

/// Watches TCK and advances the TAP tracker on every rising edge.
///
/// The watcher owns the writer, the output variables, the decoder and the
/// (single-flight) tracker; during an update they are lent to the tracker
/// for the duration of the edge.
pub struct JtagWatcher {
    config: JtagConfig,
    ids: Option<ResolvedIds>,
    sensitive: Vec<SignalId>,
    writer: VcdWriter,
    vars: TraceVars,
    decoder: Box<dyn CoreDecoder>,
    tracker: Option<TapTracker>,
    warned_nonbinary: bool,
}

impl JtagWatcher {
    /// Creates the watcher, registering the generic output variables and
    /// the selected core's variables with the writer.
    pub fn new(config: JtagConfig, mut writer: VcdWriter, core: CoreKind) -> Self {
        let vars = TraceVars {
            tap_state: writer.register_var(
                &config.outscope,
                "tap_state",
                VarKind::String,
                config.initstate.name(),
            ),
            jtag: writer.register_var(&config.outscope, "jtag", VarKind::String, "idle"),
        };
        let decoder = core.build(&mut writer);
        Self {
            config,
            ids: None,
            sensitive: Vec::new(),
            writer,
            vars,
            decoder,
            tracker: None,
            warned_nonbinary: false,
        }
    }

    /// One tracker at most; the TAP is single-flighted.
    fn start_tracker(&self) -> bool {
        self.tracker.is_none()
    }

    /// Offers the firing edge to the live tracker, then admits a fresh one
    /// if none was live. A tracker created here first sees the next edge.
    fn manage_trackers(&mut self, input: TapInput) -> Result<(), Error> {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.update(input, &mut self.writer, &self.vars, self.decoder.as_mut())?;
        }
        if self.start_tracker() {
            tracing::debug!(
                "t={} starting TAP tracker in {}",
                input.now,
                self.config.initstate
            );
            self.tracker = Some(TapTracker::new(self.config.initstate));
        }
        Ok(())
    }

    /// Coerces a sampled value to a bit: '1' is high, everything else
    /// (including 'x' and 'z') is low.
    fn sample_bit(&mut self, step: &Step<'_>, id: &SignalId, name: &str) -> bool {
        match step.value(id) {
            Some("1") => true,
            Some("0") => false,
            Some(other) => {
                if !self.warned_nonbinary {
                    self.warned_nonbinary = true;
                    tracing::warn!(
                        "t={} signal {name} carries `{other}`, treating non-'1' values as 0",
                        step.now
                    );
                }
                false
            }
            None => false,
        }
    }
}

impl Watcher for JtagWatcher {
    fn update_ids(&mut self, defs: &Definitions) -> Result<(), Error> {
        let resolve = |name: &str| -> Result<SignalId, Error> {
            defs.id(&self.config.inscope, name)
                .cloned()
                .ok_or_else(|| Error::SignalNotFound {
                    scope: self.config.inscope.clone(),
                    name: name.to_string(),
                })
        };
        let ids = ResolvedIds {
            tck: resolve(&self.config.tck)?,
            tms: resolve(&self.config.tms)?,
            tdi: resolve(&self.config.tdi)?,
            tdo: resolve(&self.config.tdo)?,
        };
        self.sensitive = vec![ids.tck.clone()];
        self.ids = Some(ids);

        match defs.timescale() {
            Some(capture) if capture == self.config.timescale => Ok(()),
            Some(capture) => Err(Error::TimescaleMismatch {
                capture,
                requested: self.config.timescale,
            }),
            None => Err(Error::MissingTimescale),
        }
    }

    fn sensitive_ids(&self) -> &[SignalId] {
        &self.sensitive
    }

    fn update(&mut self, step: &Step<'_>) -> Result<(), Error> {
        let Some(ids) = self.ids.clone() else {
            return Ok(());
        };
        // Only rising TCK edges drive the TAP; falling edges and steps
        // where TCK did not change are ignored.
        match step.activity.get(&ids.tck) {
            Some(value) if value == "1" => {}
            _ => return Ok(()),
        }
        let input = TapInput {
            now: step.now,
            tms: self.sample_bit(step, &ids.tms, "tms"),
            tdi: self.sample_bit(step, &ids.tdi, "tdi"),
            tdo: self.sample_bit(step, &ids.tdo, "tdo"),
        };
        self.manage_trackers(input)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.writer.finish()
    }
}
