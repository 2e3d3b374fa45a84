//! Fatal simulation errors.
//!
//! Gameplay inconsistencies (a flag that vanished, a building that burned
//! down) are not errors: the serf falls back into `Lost` or `EscapeBuilding`.
//! The variants here indicate a modelling bug and abort the current update
//! of the serf that hit them.

use crate::arena::SerfId;
use crate::serf::State;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("serf {serf}: payload does not match state {state:?} in {op}")]
    InvalidState {
        serf: SerfId,
        state: State,
        op: &'static str,
    },
    #[error("serf {serf} in state {state:?}: {kind} {index} does not exist ({op})")]
    MissingEntity {
        serf: SerfId,
        state: State,
        kind: &'static str,
        index: u32,
        op: &'static str,
    },
    #[error("serf {serf} in state {state:?}: unreachable code in {op}: {detail}")]
    Unreachable {
        serf: SerfId,
        state: State,
        op: &'static str,
        detail: String,
    },
    #[error("no serf with index {0}")]
    NoSuchSerf(SerfId),
}
