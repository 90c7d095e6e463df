//! Sensitivity-driven event engine on top of the VCD reader.
//!
//! The engine keeps the current value of every signal, rebuilds the set of
//! signals that changed in each simulation step, and fires the registered
//! watchers whose sensitivity list intersects that activity. All changes of
//! a step are committed to the value map before any watcher runs.

use std::collections::HashMap;

use crate::error::Error;
use crate::vcd::{Timescale, VcdEvent};

/// Short id code assigned to a signal by the source VCD.
pub type SignalId = String;

/// Everything learned from the capture's definitions section.
#[derive(Debug, Default)]
pub struct Definitions {
    timescale: Option<Timescale>,
    ids: HashMap<String, SignalId>,
}

impl Definitions {
    /// Timescale declared by the capture, if any.
    pub fn timescale(&self) -> Option<Timescale> {
        self.timescale
    }

    /// Resolves `scope.name` to the signal's id code.
    pub fn id(&self, scope: &str, name: &str) -> Option<&SignalId> {
        let key = if scope.is_empty() {
            name.to_string()
        } else {
            format!("{scope}.{name}")
        };
        self.ids.get(&key)
    }

    fn insert(&mut self, scope: &str, name: &str, id: SignalId) {
        let key = if scope.is_empty() {
            name.to_string()
        } else {
            format!("{scope}.{name}")
        };
        if let Some(previous) = self.ids.insert(key, id) {
            tracing::debug!("signal {scope}.{name} redeclared (was id `{previous}`)");
        }
    }
}

/// One committed simulation step, handed to the watchers.
pub struct Step<'a> {
    /// Simulated time of this step.
    pub now: u64,
    /// Current value of every signal seen so far.
    pub values: &'a HashMap<SignalId, String>,
    /// New values of exactly the signals that changed at `now`.
    pub activity: &'a HashMap<SignalId, String>,
}

impl Step<'_> {
    /// Current value of a signal, if it ever changed.
    pub fn value(&self, id: &SignalId) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }
}

/// A registered observer of the signal stream.
pub trait Watcher {
    /// Called once when the definitions section ends, so ids can be cached
    /// and the capture's metadata verified.
    fn update_ids(&mut self, defs: &Definitions) -> Result<(), Error>;

    /// Ids that trigger [`Watcher::update`] when they change. Empty until
    /// [`Watcher::update_ids`] resolved them.
    fn sensitive_ids(&self) -> &[SignalId];

    /// Called for every step whose activity intersects the sensitivity
    /// list.
    fn update(&mut self, step: &Step<'_>) -> Result<(), Error>;

    /// Called once after the last step, to flush whatever the watcher owns.
    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// The event engine. Owns the signal state and the watcher registry and
/// drives both from a stream of [`VcdEvent`]s.
#[derive(Default)]
pub struct Engine {
    defs: Definitions,
    values: HashMap<SignalId, String>,
    activity: HashMap<SignalId, String>,
    now: u64,
    watchers: Vec<Box<dyn Watcher>>,
}

impl Engine {
    /// Creates an engine with no watchers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a watcher. Watchers are fired in registration order.
    pub fn register_watcher(&mut self, watcher: Box<dyn Watcher>) {
        self.watchers.push(watcher);
    }

    /// Consumes the event stream, firing watchers at each step boundary,
    /// and lets the watchers flush when the stream ends.
    pub fn run(
        &mut self,
        events: impl IntoIterator<Item = Result<VcdEvent, Error>>,
    ) -> Result<(), Error> {
        for event in events {
            match event? {
                VcdEvent::Timescale(ts) => self.defs.timescale = Some(ts),
                VcdEvent::Var {
                    scope, name, id, ..
                } => self.defs.insert(&scope, &name, id),
                VcdEvent::EndDefinitions => {
                    let Engine {
                        defs, watchers, ..
                    } = self;
                    for watcher in watchers.iter_mut() {
                        watcher.update_ids(defs)?;
                    }
                }
                VcdEvent::Timestamp(time) => {
                    self.commit_step()?;
                    self.now = time;
                }
                VcdEvent::Change { id, value } => {
                    self.values.insert(id.clone(), value.clone());
                    self.activity.insert(id, value);
                }
            }
        }
        self.commit_step()?;
        for watcher in &mut self.watchers {
            watcher.finish()?;
        }
        Ok(())
    }

    /// Fires every watcher sensitive to something that changed at `now`,
    /// then forgets the step's activity.
    fn commit_step(&mut self) -> Result<(), Error> {
        if self.activity.is_empty() {
            return Ok(());
        }
        let Engine {
            values,
            activity,
            watchers,
            now,
            ..
        } = self;
        {
            let step = Step {
                now: *now,
                values: &*values,
                activity: &*activity,
            };
            for watcher in watchers.iter_mut() {
                let fires = watcher
                    .sensitive_ids()
                    .iter()
                    .any(|id| step.activity.contains_key(id));
                if fires {
                    watcher.update(&step)?;
                }
            }
        }
        activity.clear();
        Ok(())
    }
}
