//! # Pump Messages
//!
//! The quantity types and message bodies of the pump call protocol.
//! Requests implement [`Request::pack`]; replies implement
//! [`Reply::parse`]. Bodies travel inside checksummed frames (see
//! [`crate::pump::frame`]); multi-byte integers are little-endian at
//! this layer.
//!
//! Several status bodies contain bytes whose meaning is unknown; the
//! parsers skip them at their exact offsets rather than assuming them
//! to be zero.

use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use nom::bytes::complete::take;
use nom::number::complete::{le_u16, le_u32, u8 as any_u8};
use nom::IResult;

use crate::error::{PumpError, Result};
use crate::pump::codec::{duration_hm, pump_time};
use crate::util::codec::{fail, finish, put_u16_le};

/// Encoded size of a bolus request and its echo.
pub const BOLUS_BODY_LEN: usize = 28;

// ----------------------------------------------------------------------------
// Quantity types
// ----------------------------------------------------------------------------

/// An amount of insulin, counted in milliunits (1 U = 1000 mU).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn milliunits(n: i64) -> Amount {
        Amount(n)
    }

    pub const fn units(n: i64) -> Amount {
        Amount(n * 1000)
    }

    pub fn as_milliunits(self) -> i64 {
        self.0
    }

    /// Truncate toward zero to a whole multiple of `quantum`. The pump
    /// delivers combo totals in 50 mU steps.
    pub fn truncate(self, quantum: Amount) -> Amount {
        Amount(self.0 - self.0 % quantum.0)
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}U", self.0 as f64 / 1000.0)
    }
}

/// A delivery rate, counted in milliunits per hour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rate(i64);

impl Rate {
    pub const ZERO: Rate = Rate(0);

    pub const fn milliunits_per_hour(n: i64) -> Rate {
        Rate(n)
    }

    pub const fn units_per_hour(n: i64) -> Rate {
        Rate(n * 1000)
    }

    pub fn as_milliunits_per_hour(self) -> i64 {
        self.0
    }

    /// The amount delivered at this rate over `d`, truncated toward
    /// zero.
    pub fn total(self, d: Duration) -> Amount {
        Amount((d.as_secs_f64() / 3600.0 * self.0 as f64) as i64)
    }
}

impl Add for Rate {
    type Output = Rate;
    fn add(self, rhs: Rate) -> Rate {
        Rate(self.0 + rhs.0)
    }
}

impl Sub for Rate {
    type Output = Rate;
    fn sub(self, rhs: Rate) -> Rate {
        Rate(self.0 - rhs.0)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}U/hr", self.0 as f64 / 1000.0)
    }
}

/// A pump wall-clock instant at one-minute resolution. The pump keeps
/// local time and carries no timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PumpTime(NaiveDateTime);

impl PumpTime {
    pub fn from_naive(dt: NaiveDateTime) -> PumpTime {
        PumpTime(dt)
    }

    pub fn from_ymd_hm(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<PumpTime> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .map(PumpTime)
    }

    pub fn naive(self) -> NaiveDateTime {
        self.0
    }

    /// Time elapsed since `earlier`; zero if `earlier` is later.
    pub fn duration_since(self, earlier: PumpTime) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or_default()
    }
}

impl Add<Duration> for PumpTime {
    type Output = PumpTime;
    fn add(self, d: Duration) -> PumpTime {
        PumpTime(self.0 + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero()))
    }
}

impl Sub<Duration> for PumpTime {
    type Output = PumpTime;
    fn sub(self, d: Duration) -> PumpTime {
        PumpTime(self.0 - chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero()))
    }
}

impl fmt::Display for PumpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M"))
    }
}

// ----------------------------------------------------------------------------
// Message traits
// ----------------------------------------------------------------------------

/// A message body the driver sends.
pub trait Request {
    fn pack(&self) -> Result<Vec<u8>>;
}

/// A message body the pump sends.
pub trait Reply: Sized {
    fn parse(body: &[u8]) -> Result<Self>;
}

// ----------------------------------------------------------------------------
// Session control bodies
// ----------------------------------------------------------------------------

/// Session open. The body is a fixed magic that appears to depend on
/// the firmware or remote revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wakeup;

impl Request for Wakeup {
    fn pack(&self) -> Result<Vec<u8>> {
        Ok(vec![0x49, 0x01, 0x2d, 0x14])
    }
}

/// Clear the active warning. Sent under the cancel-combo call code with
/// this marker body; that pairing is how the handset does it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearWarn;

impl Request for ClearWarn {
    fn pack(&self) -> Result<Vec<u8>> {
        Ok(vec![0xa7, 0x01])
    }
}

/// Busy indication from the pump: wait `backoff` before re-polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub backoff: Duration,
}

impl Reply for Keepalive {
    fn parse(body: &[u8]) -> Result<Keepalive> {
        finish(body, parse_keepalive(body))
    }
}

fn parse_keepalive(input: &[u8]) -> IResult<&[u8], Keepalive> {
    let (i, ms) = le_u16(input)?;
    Ok((
        i,
        Keepalive {
            backoff: Duration::from_millis(u64::from(ms)),
        },
    ))
}

// ----------------------------------------------------------------------------
// Status bodies
// ----------------------------------------------------------------------------

/// The home-screen snapshot: current time, basal rate, reservoir, and
/// the temporary-rate block when one is programmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// A warning is active on the pump.
    pub warn: bool,
    /// Current pump time.
    pub now: PumpTime,
    /// Scheduled basal rate.
    pub basal: Rate,
    /// Insulin left in the reservoir, at unit granularity.
    pub reservoir: Amount,
    /// Temporary rate as a signed percentage delta; zero when none.
    pub temp: i8,
    /// Time remaining on the temporary rate.
    pub temp_remaining: Duration,
    /// Programmed duration of the temporary rate.
    pub temp_duration: Duration,
}

impl Reply for Status {
    fn parse(body: &[u8]) -> Result<Status> {
        finish(body, parse_status(body))
    }
}

fn parse_status(input: &[u8]) -> IResult<&[u8], Status> {
    let (i, flag) = any_u8(input)?;
    let warn = flag & 0x10 == 0x10;
    let (i, _) = take(3usize)(i)?;
    let (i, now) = pump_time(i)?;
    let (i, _) = take(4usize)(i)?;
    let (i, basal) = le_u16(i)?;
    let (i, reservoir) = any_u8(i)?;
    let (i, _) = take(2usize)(i)?;
    let (i, temp_flag) = any_u8(i)?;

    let basal = Rate::milliunits_per_hour(i64::from(basal));
    let reservoir = Amount::units(i64::from(reservoir));

    if temp_flag & 0x01 == 0x01 {
        let (i, raw) = any_u8(i)?;
        let (i, _) = take(1usize)(i)?;
        let (i, temp_remaining) = duration_hm(i)?;
        let (i, temp_duration) = duration_hm(i)?;
        Ok((
            i,
            Status {
                warn,
                now,
                basal,
                reservoir,
                // Two's complement: bytes above 128 are negative deltas.
                temp: raw as i8,
                temp_remaining,
                temp_duration,
            },
        ))
    } else {
        Ok((
            i,
            Status {
                warn,
                now,
                basal,
                reservoir,
                temp: 0,
                temp_remaining: Duration::ZERO,
                temp_duration: Duration::ZERO,
            },
        ))
    }
}

/// Last bolus and insulin-on-board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status2 {
    pub bolus_time: PumpTime,
    /// Last bolus, milliunit granularity.
    pub bolus: Amount,
    /// Insulin on board, reported in 10 mU steps.
    pub iob: Amount,
}

impl Reply for Status2 {
    fn parse(body: &[u8]) -> Result<Status2> {
        finish(body, parse_status2(body))
    }
}

fn parse_status2(input: &[u8]) -> IResult<&[u8], Status2> {
    let (i, _) = take(4usize)(input)?;
    let (i, bolus) = le_u16(i)?;
    let (i, bolus_time) = pump_time(i)?;
    let (i, _) = take(6usize)(i)?;
    let (i, iob) = le_u16(i)?;
    Ok((
        i,
        Status2 {
            bolus_time,
            bolus: Amount::milliunits(i64::from(bolus)),
            iob: Amount::milliunits(10 * i64::from(iob)),
        },
    ))
}

/// Daily totals and the temp/suspend flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status3 {
    pub temp_active: bool,
    pub suspend: bool,
    pub daily_bolus: Amount,
    pub daily_basal: Amount,
}

impl Reply for Status3 {
    fn parse(body: &[u8]) -> Result<Status3> {
        finish(body, parse_status3(body))
    }
}

fn parse_status3(input: &[u8]) -> IResult<&[u8], Status3> {
    let (i, _) = take(2usize)(input)?;
    let (i, flags) = any_u8(i)?;
    let (i, _) = take(1usize)(i)?;
    let (i, daily_bolus) = le_u32(i)?;
    let (i, daily_basal) = le_u32(i)?;
    Ok((
        i,
        Status3 {
            temp_active: flags & 0x01 == 0x01,
            suspend: flags & 0x02 == 0x02,
            daily_bolus: Amount::milliunits(i64::from(daily_bolus)),
            daily_basal: Amount::milliunits(i64::from(daily_basal)),
        },
    ))
}

/// Extended (combo) bolus state. The pump reports the end as a bare
/// hour/minute pair; the parser resolves it against the start,
/// wrapping across midnight when the end-of-day clock reads earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status4 {
    pub active: bool,
    pub start: PumpTime,
    pub end: PumpTime,
    pub delivered: Amount,
    pub total: Amount,
}

impl Reply for Status4 {
    fn parse(body: &[u8]) -> Result<Status4> {
        finish(body, parse_status4(body))
    }
}

fn parse_status4(input: &[u8]) -> IResult<&[u8], Status4> {
    let (i, _) = take(1usize)(input)?;
    let (i, flags) = any_u8(i)?;
    let (i, start) = pump_time(i)?;
    let (i, end_hour) = any_u8(i)?;
    let (i, end_minute) = any_u8(i)?;
    let (i, delivered) = le_u16(i)?;
    let (i, total) = le_u16(i)?;

    let start_minutes = i64::from(start.naive().hour()) * 60 + i64::from(start.naive().minute());
    let end_minutes = i64::from(end_hour) * 60 + i64::from(end_minute);
    let mut diff = (end_minutes - start_minutes) * 60;
    if diff < 0 {
        diff += 24 * 60 * 60;
    }
    let end = start + Duration::from_secs(diff as u64);

    Ok((
        i,
        Status4 {
            active: flags & 0x01 == 0x01,
            start,
            end,
            delivered: Amount::milliunits(i64::from(delivered)),
            total: Amount::milliunits(i64::from(total)),
        },
    ))
}

// ----------------------------------------------------------------------------
// Bolus bodies
// ----------------------------------------------------------------------------

/// A bolus request, echoed back by the pump. A zero duration delivers
/// immediately; a non-zero duration programs a combo and must be a
/// whole multiple of 6 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bolus {
    pub bolus: Amount,
    pub duration: Duration,
}

impl Bolus {
    /// Validate the 6-minute rule up front, before any I/O.
    pub fn new(bolus: Amount, duration: Duration) -> Result<Bolus> {
        combo_minutes(duration).ok_or(PumpError::InvalidComboDuration(duration))?;
        Ok(Bolus { bolus, duration })
    }
}

/// Whole minutes of `d` if it is expressible as a combo duration
/// (a multiple of 6 minutes with no sub-minute part).
pub(crate) fn combo_minutes(d: Duration) -> Option<u64> {
    if d.subsec_nanos() != 0 || d.as_secs() % 60 != 0 {
        return None;
    }
    let minutes = d.as_secs() / 60;
    (minutes % 6 == 0).then_some(minutes)
}

impl Request for Bolus {
    fn pack(&self) -> Result<Vec<u8>> {
        let minutes =
            combo_minutes(self.duration).ok_or(PumpError::InvalidComboDuration(self.duration))?;

        let combo = u8::from(minutes != 0);
        let milliunits = self.bolus.as_milliunits() as u16;

        let mut buf = vec![combo, 0];
        put_u16_le(&mut buf, milliunits);
        put_u16_le(&mut buf, !milliunits);
        buf.push((minutes / 6) as u8);
        buf.resize(BOLUS_BODY_LEN, 0);
        Ok(buf)
    }
}

impl Reply for Bolus {
    fn parse(body: &[u8]) -> Result<Bolus> {
        finish(body, parse_bolus(body))
    }
}

fn parse_bolus(input: &[u8]) -> IResult<&[u8], Bolus> {
    let (i, _) = take(2usize)(input)?;
    let (i, milliunits) = le_u16(i)?;
    let guard_at = i;
    let (i, guard) = le_u16(i)?;
    if guard != !milliunits {
        return fail(guard_at);
    }
    let (i, sixths) = any_u8(i)?;
    Ok((
        i,
        Bolus {
            bolus: Amount::milliunits(i64::from(milliunits)),
            duration: Duration::from_secs(u64::from(sixths) * 6 * 60),
        },
    ))
}

impl fmt::Display for Bolus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} over {}m", self.bolus, self.duration.as_secs() / 60)
    }
}

/// Delivery progress of a bolus in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BolusProgress {
    Unknown,
    Busy,
    Done,
}

impl fmt::Display for BolusProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BolusProgress::Unknown => "unknown",
            BolusProgress::Busy => "busy",
            BolusProgress::Done => "done",
        };
        f.write_str(name)
    }
}

/// Delivery status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub progress: BolusProgress,
}

impl Reply for DeliveryStatus {
    fn parse(body: &[u8]) -> Result<DeliveryStatus> {
        finish(body, parse_delivery_status(body))
    }
}

fn parse_delivery_status(input: &[u8]) -> IResult<&[u8], DeliveryStatus> {
    let (i, _) = take(1usize)(input)?;
    let (i, flag) = any_u8(i)?;
    let progress = match flag {
        0x01 => BolusProgress::Busy,
        0x02 => BolusProgress::Done,
        _ => BolusProgress::Unknown,
    };
    Ok((i, DeliveryStatus { progress }))
}
