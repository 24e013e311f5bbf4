//! Adaptive phase timeouts and the timers enforcing them.
use crate::{config::Timeouts, metrics};
use std::time::Duration;
use tokio::{sync::oneshot, task::JoinHandle};

/// Timeout of one kind of phase. Doubles on every empty outcome, up to `max`.
#[derive(Debug, Clone)]
pub(crate) struct PhaseTimeout {
    phase: metrics::PhaseLabel,
    base: Duration,
    max: Duration,
    current: Duration,
}

impl PhaseTimeout {
    pub(crate) fn new(phase: metrics::PhaseLabel, base: Duration, max: Duration) -> Self {
        let max = max.min(Timeouts::CAP);
        let this = Self {
            phase,
            base,
            max,
            current: base.min(max),
        };
        this.report();
        this
    }

    fn report(&self) {
        metrics::METRICS.phase_timeout[&self.phase.into()].set(self.current);
    }

    /// Timeout for the next run of the phase.
    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    /// Doubles the timeout, saturating at `max`. Returns the new value.
    pub(crate) fn increase(&mut self) -> Duration {
        let was = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        if self.current == self.max && was < self.max {
            tracing::error!(
                phase = ?self.phase,
                "phase timeout reached its maximum of {:?}",
                self.max
            );
        }
        self.report();
        self.current
    }
}

/// Phase timeouts of a round. Both reductions share one timeout.
#[derive(Debug, Clone)]
pub(crate) struct RoundTimeouts {
    generation: PhaseTimeout,
    reduction: PhaseTimeout,
    agreement: PhaseTimeout,
}

impl RoundTimeouts {
    pub(crate) fn new(cfg: &Timeouts) -> Self {
        use metrics::PhaseLabel as P;
        Self {
            generation: PhaseTimeout::new(P::Generation, cfg.generation, cfg.max),
            reduction: PhaseTimeout::new(P::FirstReduction, cfg.reduction, cfg.max),
            agreement: PhaseTimeout::new(P::Agreement, cfg.agreement, cfg.max),
        }
    }

    /// Timeout state of `phase`.
    pub(crate) fn get(&mut self, phase: metrics::PhaseLabel) -> &mut PhaseTimeout {
        use metrics::PhaseLabel as P;
        match phase {
            P::Generation => &mut self.generation,
            P::FirstReduction | P::SecondReduction => &mut self.reduction,
            P::Agreement => &mut self.agreement,
        }
    }
}

/// One-shot timer running on its own task.
///
/// A phase which gets canceled while its timer is pending hands the timer
/// over to [`Timer::detach`], which consumes the expiration in the background.
#[derive(Debug)]
pub(crate) struct Timer {
    expired: Option<oneshot::Receiver<()>>,
}

impl Timer {
    /// Starts a timer expiring after `d`.
    pub(crate) fn start(d: Duration) -> Self {
        let (send, recv) = oneshot::channel();
        tokio::spawn(async move {
            tokio::time::sleep(d).await;
            // The receiver is gone if the phase completed first.
            let _ = send.send(());
        });
        Self {
            expired: Some(recv),
        }
    }

    /// Completes once the timer expires. Cancel-safe.
    /// Returns immediately if the expiration was already observed.
    pub(crate) async fn expired(&mut self) {
        if let Some(recv) = &mut self.expired {
            let _ = recv.await;
            self.expired = None;
        }
    }

    /// Drains the timer on a background task. The returned handle
    /// completes once the timer expired.
    pub(crate) fn detach(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Some(recv) = self.expired {
                let _ = recv.await;
            }
        })
    }
}
