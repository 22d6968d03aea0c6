use std::time::{Duration, Instant};
use derive_getters::Getters;
use can_core::{error::SessionError, DEFAULT_INTERVAL_MS};
use canpanel_socketcan::Transmit;

/// What the loop currently repeats.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct LoopState {
    #[getter(copy)]
    can_id: u32,
    payload: Vec<u8>,
    #[getter(copy)]
    interval_ms: u32,
}

/// Repeats the latest payload on a fixed period.
///
/// Time is passed in by the caller. A tick that is already pending keeps its
/// deadline when the loop is reconfigured; only later ticks use the new
/// interval. Each tick sends whatever configuration is current at that moment.
#[derive(Debug, Default)]
pub struct LoopScheduler {
    state: Option<LoopState>,
    deadline: Option<Instant>,
}

impl LoopScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    #[inline]
    pub fn state(&self) -> Option<&LoopState> {
        self.state.as_ref()
    }

    /// When the next tick is due, if armed.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Store the configuration, arm the timer if idle and send once right away.
    ///
    /// The loop stays configured even if the immediate send fails.
    pub fn start<T: Transmit + ?Sized>(
        &mut self,
        tx: &T,
        can_id: u32,
        payload: Vec<u8>,
        interval_ms: u32,
        now: Instant,
    ) -> Result<(), SessionError> {
        let interval_ms = if interval_ms == 0 { DEFAULT_INTERVAL_MS } else { interval_ms };
        match self.deadline {
            Some(_) => log::debug!("CAN-PANEL - loop reconfigured: {} ms, {} bytes", interval_ms, payload.len()),
            None => {
                log::debug!("CAN-PANEL - loop started: {} ms, {} bytes", interval_ms, payload.len());
                self.deadline = Some(now + Duration::from_millis(interval_ms as u64));
            },
        }

        let result = tx.transmit(can_id, &payload);
        self.state = Some(LoopState { can_id, payload, interval_ms });

        result
    }

    /// Disarm. Returns whether the loop was active.
    pub fn stop(&mut self) -> bool {
        self.deadline = None;
        let was_active = self.state.take().is_some();
        if was_active {
            log::debug!("CAN-PANEL - loop stopped");
        }

        was_active
    }

    /// Fire the pending tick if it is due.
    ///
    /// Returns `None` when nothing was due. An empty payload disarms the loop
    /// instead of sending.
    pub fn poll<T: Transmit + ?Sized>(&mut self, tx: &T, now: Instant) -> Option<Result<(), SessionError>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }

        let sendable = matches!(&self.state, Some(state) if !state.payload.is_empty());
        if !sendable {
            log::debug!("CAN-PANEL - loop tick without payload, stopping");
            self.stop();
            return None;
        }

        let state = self.state.as_ref()?;
        let interval = Duration::from_millis(state.interval_ms as u64);
        let mut next = deadline + interval;
        if next <= now {
            next = now + interval;
        }
        self.deadline = Some(next);

        Some(tx.transmit(state.can_id, &state.payload))
    }
}

/// Parse `"<number>"`, `"<number>ms"` or `"<number>s"` into milliseconds.
///
/// Decimals are allowed and truncated after scaling. Zero yields `None`.
pub fn parse_interval(text: &str) -> Option<u32> {
    let text = text.trim().to_ascii_lowercase();
    let (number, scale) = if let Some(v) = text.strip_suffix("ms") {
        (v, 1.)
    }
    else if let Some(v) = text.strip_suffix('s') {
        (v, 1000.)
    }
    else {
        (text.as_str(), 1.)
    };

    if !is_decimal(number) {
        return None;
    }

    let value: f64 = number.parse().ok()?;
    let ms = (value * scale) as u32;
    (ms > 0).then_some(ms)
}

#[inline]
pub fn interval_or_default(text: &str) -> u32 {
    parse_interval(text).unwrap_or(DEFAULT_INTERVAL_MS)
}

fn is_decimal(text: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let mut parts = text.splitn(2, '.');
    let integer = parts.next().unwrap_or_default();

    digits(integer) && parts.next().map_or(true, digits)
}
