//! # Pump Operations
//!
//! High-level operations composed from pump calls. Each one replays the
//! exact call sequence the vendor handset uses, because the pump's tag
//! counter tracks a specific script: session boundaries and even a
//! discarded status call appear exactly where the handset puts them.

use std::time::Duration;

use log::{debug, info};

use crate::constants::{
    CALL_BOLUS, CALL_BOLUS_ACK, CALL_CANCEL_COMBO, CALL_COMBO_ACK, CALL_DELIVERY_CONTINUE,
    CALL_DELIVERY_STATUS, CALL_STATUS, CALL_STATUS2, CALL_STATUS3, CALL_STATUS4,
};
use crate::error::{PumpError, Result};
use crate::pump::message::{
    Amount, Bolus, BolusProgress, ClearWarn, DeliveryStatus, PumpTime, Rate, Reply, Request,
    Status, Status2, Status3, Status4,
};
use crate::pump::protocol::Pump;

/// Delivery increment the pump accepts for combo totals.
const COMBO_QUANTUM: Amount = Amount::milliunits(50);

/// Durations the pump offers for a combo bolus.
const COMBO_DURATIONS: [Duration; 7] = [
    Duration::from_secs(30 * 60),
    Duration::from_secs(60 * 60),
    Duration::from_secs(90 * 60),
    Duration::from_secs(120 * 60),
    Duration::from_secs(180 * 60),
    Duration::from_secs(240 * 60),
    Duration::from_secs(300 * 60),
];

/// Tolerance when matching a running combo's duration against a target.
const COMBO_SLACK: Duration = Duration::from_secs(5 * 60);

/// Consolidated pump state, assembled from four status pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpStat {
    pub now: PumpTime,
    pub basal: Rate,
    pub reservoir: Amount,
    pub iob: Amount,
    pub last_bolus: Amount,
    /// Temporary rate as a signed percentage delta; zero when none.
    pub temp: i8,
    pub temp_begin: Option<PumpTime>,
    pub temp_end: Option<PumpTime>,
    pub combo_active: bool,
    pub combo_begin: PumpTime,
    pub combo_end: PumpTime,
    pub combo_delivered: Amount,
    pub combo_total: Amount,
    pub daily_basal: Amount,
    pub daily_bolus: Amount,
    pub warn: bool,
}

impl PumpStat {
    /// Total insulin delivered today.
    pub fn daily_insulin(&self) -> Amount {
        self.daily_basal + self.daily_bolus
    }
}

impl Pump {
    /// Read consolidated status, mimicking the handset's exact sequence.
    ///
    /// Any failed call aborts the read; no partial result is returned.
    pub async fn stat(&mut self) -> Result<PumpStat> {
        self.resume().await?;

        let body = self.call(CALL_STATUS, &[]).await?;
        let status = Status::parse(&body)?;
        let (temp_begin, temp_end) = if status.temp != 0 {
            let begin = status.now + status.temp_remaining - status.temp_duration;
            (Some(begin), Some(begin + status.temp_duration))
        } else {
            (None, None)
        };

        let body = self.call(CALL_STATUS4, &[]).await?;
        let status4 = Status4::parse(&body)?;

        self.reset().await?;

        let body = self.call(CALL_STATUS2, &[]).await?;
        let status2 = Status2::parse(&body)?;

        self.reset().await?;

        // Discarded; issued only to keep the pump's tag counter on the
        // handset's script.
        self.call(CALL_STATUS, &[]).await?;

        let body = self.call(CALL_STATUS3, &[]).await?;
        let status3 = Status3::parse(&body)?;

        let _ = self.adjourn().await;

        Ok(PumpStat {
            now: status.now,
            basal: status.basal,
            reservoir: status.reservoir,
            iob: status2.iob,
            last_bolus: status2.bolus,
            temp: status.temp,
            temp_begin,
            temp_end,
            combo_active: status4.active,
            combo_begin: status4.start,
            combo_end: status4.end,
            combo_delivered: status4.delivered,
            combo_total: status4.total,
            daily_basal: status3.daily_basal,
            daily_bolus: status3.daily_bolus,
            warn: status.warn,
        })
    }

    /// Cancel the in-progress combo bolus.
    pub async fn cancel_combo(&mut self) -> Result<()> {
        self.resume().await?;
        let result = self.call(CALL_CANCEL_COMBO, &[]).await.map(drop);
        let _ = self.adjourn().await;
        result
    }

    /// Clear the active warning. The clear-warning body travels under
    /// the cancel-combo call code; that pairing is the handset's.
    pub async fn clear_warn(&mut self) -> Result<()> {
        self.resume().await?;
        let body = ClearWarn.pack()?;
        let result = self.call(CALL_CANCEL_COMBO, &body).await.map(drop);
        let _ = self.adjourn().await;
        result
    }

    /// Deliver a bolus: immediately when `duration` is zero, as a combo
    /// otherwise. `duration` must be a whole multiple of 6 minutes;
    /// that is checked before any I/O.
    pub async fn bolus(&mut self, bolus: Amount, duration: Duration) -> Result<()> {
        let request = Bolus::new(bolus, duration)?;
        self.resume().await?;
        let result = self.bolus_exchange(request).await;
        let _ = self.adjourn().await;
        result
    }

    async fn bolus_exchange(&mut self, request: Bolus) -> Result<()> {
        let body = request.pack()?;
        let reply = self.call(CALL_BOLUS, &body).await?;
        let echoed = Bolus::parse(&reply)?;
        if echoed != request {
            return Err(PumpError::BolusMismatch {
                sent: request.to_string(),
                received: echoed.to_string(),
            });
        }

        let ack = if echoed.duration == Duration::ZERO {
            CALL_BOLUS_ACK
        } else {
            CALL_COMBO_ACK
        };
        self.call(ack, &[]).await?;

        loop {
            let body = self.call(CALL_DELIVERY_STATUS, &[]).await?;
            match DeliveryStatus::parse(&body)?.progress {
                BolusProgress::Busy | BolusProgress::Unknown => {
                    self.call(CALL_DELIVERY_CONTINUE, &[]).await?;
                }
                BolusProgress::Done => return Ok(()),
            }
        }
    }

    /// Converge the pump's effective delivery rate onto `target` by one
    /// step: read status, compute the combo that best approximates the
    /// shortfall over the scheduled basal, and program it if the
    /// running combo does not already match. Returns `true` once the
    /// pump is where it should be; callers loop until then.
    pub async fn set_rate(&mut self, target: Rate) -> Result<bool> {
        let stat = self.stat().await?;

        if stat.warn {
            self.clear_warn().await?;
        }

        // Effective basal under the temporary percentage, and the
        // marginal rate a combo has to supply.
        let scale = (100.0 + f64::from(stat.temp)) / 100.0;
        let base =
            Rate::milliunits_per_hour((stat.basal.as_milliunits_per_hour() as f64 * scale) as i64);
        let need = if base > target {
            Rate::ZERO
        } else {
            target - base
        };

        let (total, duration, matched) = choose_combo(target, need);
        info!("base {base} need {need} matched {matched} ({total}/{duration:?})");

        if stat.combo_active {
            let running = stat.combo_end.duration_since(stat.combo_begin);
            if total == stat.combo_total
                && running + COMBO_SLACK >= duration
                && running <= duration + COMBO_SLACK
            {
                debug!("current combo ({}/{running:?}) matches", stat.combo_total);
                return Ok(true);
            }
        } else if total == Amount::ZERO {
            debug!("combo is off and the target needs none");
            return Ok(true);
        }

        self.cancel_combo().await?;
        info!("programming combo {total} over {duration:?}");
        self.bolus(total, duration).await?;
        Ok(false)
    }
}

/// Pick the candidate `(total, duration)` whose resulting rate best
/// approximates `target`, given the marginal rate `need`. Totals are
/// truncated to the pump's 50 mU delivery increment; ties go to the
/// shortest duration.
fn choose_combo(target: Rate, need: Rate) -> (Amount, Duration, Rate) {
    let mut best_diff = i64::MAX;
    let mut total = Amount::ZERO;
    let mut duration = COMBO_DURATIONS[0];
    let mut matched = Rate::ZERO;

    for d in COMBO_DURATIONS {
        let candidate = need.total(d).truncate(COMBO_QUANTUM);
        let minutes = d.as_secs_f64() / 60.0;
        let proposed = Rate::milliunits_per_hour(
            ((60.0 / minutes) * candidate.as_milliunits() as f64) as i64,
        );
        let diff = (target.as_milliunits_per_hour() - proposed.as_milliunits_per_hour()).abs();
        if diff < best_diff {
            best_diff = diff;
            total = candidate;
            duration = d;
            matched = proposed;
        }
    }

    (total, duration, matched)
}
