//! Chain manager: a fixed-capacity, indexed array of stage slots dispatched
//! in ascending order.

use crate::audio::{validate, AudioBlock};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::stage::{self, Stage, StageKind, StageParams};

enum SlotState {
    Empty,
    Occupied {
        kind: StageKind,
        enabled: bool,
        stage: Box<dyn Stage>,
        reported_latency_ns: i64,
    },
}

/// Owns the ordered sequence of stage slots for one pipeline instance.
///
/// Slot order *is* chain order: there is no reordering primitive. Callers
/// express ordering by choosing slot indices.
pub struct ChainManager {
    config: PipelineConfig,
    slots: Vec<SlotState>,
    latency_ns: i64,
}

impl ChainManager {
    pub fn new(config: PipelineConfig) -> Self {
        let mut slots = Vec::with_capacity(config.max_slots);
        slots.resize_with(config.max_slots, || SlotState::Empty);
        Self {
            config,
            slots,
            latency_ns: 0,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Walk enabled, Occupied slots in ascending index order, calling each
    /// stage's `process` in place. Stops and returns the first stage error;
    /// the block may be partially modified in that case (documented hazard).
    pub fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        validate(block, self.config.channels, self.config.sample_rate)?;
        for slot in self.slots.iter_mut() {
            if let SlotState::Occupied { enabled, stage, .. } = slot {
                if *enabled {
                    stage.process(block)?;
                }
            }
        }
        Ok(())
    }

    /// Create-or-update the stage at `id`. If the slot is Occupied with a
    /// different kind, the old stage is destroyed first (kind change is
    /// destroy-then-create). All-or-nothing: if the kind-specific `update`
    /// fails after a fresh create, the new stage is dropped and the slot
    /// left Empty.
    pub fn update_slot(&mut self, id: usize, params: &StageParams, enabled: bool) -> Result<(), PipelineError> {
        if id >= self.slots.len() {
            return Err(PipelineError::FilterNotFound);
        }
        let want_kind = params.kind();

        let needs_create = match &self.slots[id] {
            SlotState::Empty => true,
            SlotState::Occupied { kind, .. } => *kind != want_kind,
        };

        // Run as an immediately-invoked closure so `?` can early-return while
        // still letting `recompute_latency` run on every exit path below.
        let result = (|| {
            if needs_create {
                if matches!(self.slots[id], SlotState::Occupied { .. }) {
                    log::debug!("chain: slot {id} changing kind, destroying old stage");
                }
                // Destroy the old stage (if any) before attempting the
                // fallible create, so a failed create leaves the slot Empty
                // rather than leaving a stale, different-kind stage running.
                self.slots[id] = SlotState::Empty;
                let mut stage = stage::create(self.config.channels as usize, self.config.sample_rate, params)?;
                if let Err(e) = stage.update(params) {
                    log::debug!("chain: slot {id} update failed after create, leaving slot Empty: {e}");
                    return Err(e);
                }
                let reported_latency_ns = stage.latency_ns();
                log::debug!("chain: slot {id} created kind={want_kind:?}");
                self.slots[id] = SlotState::Occupied {
                    kind: want_kind,
                    enabled,
                    stage,
                    reported_latency_ns,
                };
            } else if let SlotState::Occupied {
                stage,
                enabled: slot_enabled,
                reported_latency_ns,
                ..
            } = &mut self.slots[id]
            {
                stage.update(params)?;
                *slot_enabled = enabled;
                *reported_latency_ns = stage.latency_ns();
            }
            Ok(())
        })();

        self.recompute_latency();
        result
    }

    /// Destroy the stage at `id` and clear the slot.
    pub fn remove_slot(&mut self, id: usize) -> Result<(), PipelineError> {
        if id >= self.slots.len() {
            return Err(PipelineError::InvalidParams);
        }
        match &self.slots[id] {
            SlotState::Empty => return Err(PipelineError::FilterNotFound),
            SlotState::Occupied { .. } => {
                log::debug!("chain: slot {id} removed");
                self.slots[id] = SlotState::Empty;
            }
        }
        self.recompute_latency();
        Ok(())
    }

    /// Reset every Occupied slot's DSP state to t=0 without touching params.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            if let SlotState::Occupied { stage, .. } = slot {
                stage.reset();
            }
        }
    }

    /// Sum of `reported_latency_ns` across Occupied, enabled slots.
    pub fn latency_ns(&self) -> i64 {
        self.latency_ns
    }

    /// Whether a slot currently holds a stage, and of what kind.
    pub fn slot_kind(&self, id: usize) -> Option<StageKind> {
        match self.slots.get(id)? {
            SlotState::Empty => None,
            SlotState::Occupied { kind, .. } => Some(*kind),
        }
    }

    fn recompute_latency(&mut self) {
        self.latency_ns = self
            .slots
            .iter()
            .filter_map(|slot| match slot {
                SlotState::Occupied {
                    enabled: true,
                    reported_latency_ns,
                    ..
                } => Some(*reported_latency_ns),
                _ => None,
            })
            .sum();
    }
}
