use std::sync::{Condvar, Mutex, MutexGuard};

use crate::{Error, Result, Scalar};

/// A blocking all-participant minimum reduction, executed once per round.
///
/// Every participant calls [`MinReduce::reduce`] with the same round number; each call blocks
/// until all participants have contributed to that round and then returns the minimum. Nobody
/// can enter round `r + 1` before round `r` is complete.
#[derive(Debug)]
pub struct MinReduce {
    participants: usize,
    state: Mutex<State>,
    done: Condvar,
}

#[derive(Debug)]
struct State {
    round: usize,
    arrived: usize,
    acc: Scalar,
    last: Scalar,
    aborted: Option<usize>,
}

impl MinReduce {
    /// Creates a reduction over `participants` callers, starting at round 0.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for zero participants, since no round could complete.
    pub fn new(participants: usize) -> Result<Self> {
        if participants == 0 {
            return Err(Error::InvalidConfig(
                "a reduction needs at least one participant".into(),
            ));
        }

        Ok(Self {
            participants,
            state: Mutex::new(State {
                round: 0,
                arrived: 0,
                acc: Scalar::INFINITY,
                last: Scalar::INFINITY,
                aborted: None,
            }),
            done: Condvar::new(),
        })
    }

    /// Returns the number of participants.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Contributes `value` to `round` on behalf of participant `rank` and waits for the minimum.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolDesync`] if `round` is not the round in progress, and
    /// [`Error::Disconnected`] if a participant aborted the reduction.
    pub fn reduce(&self, rank: usize, round: usize, value: Scalar) -> Result<Scalar> {
        let mut state = self.lock(rank)?;
        if let Some(peer) = state.aborted {
            return Err(Error::Disconnected(peer));
        }
        if state.round != round {
            return Err(Error::ProtocolDesync {
                expected: format!("reduction round {}", state.round),
                actual: format!("reduction round {} from rank {}", round, rank),
            });
        }

        if value < state.acc {
            state.acc = value;
        }
        state.arrived += 1;

        if state.arrived == self.participants {
            state.last = state.acc;
            state.acc = Scalar::INFINITY;
            state.arrived = 0;
            state.round += 1;
            self.done.notify_all();
            return Ok(state.last);
        }

        while state.round == round && state.aborted.is_none() {
            state = self.done.wait(state).map_err(|_| Error::Disconnected(rank))?;
        }

        match state.aborted {
            // The round may have completed before the abort.
            Some(_) if state.round != round => Ok(state.last),
            Some(peer) => Err(Error::Disconnected(peer)),
            None => Ok(state.last),
        }
    }

    /// Marks the reduction as aborted by `rank` and wakes every waiter with an error.
    pub fn abort(&self, rank: usize) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.aborted.is_none() {
            state.aborted = Some(rank);
        }
        self.done.notify_all();
    }

    fn lock(&self, rank: usize) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::Disconnected(rank))
    }
}
