//! Packed date and duration codecs of the pump layer.
//!
//! The pump timestamps at one-minute resolution. A packed time is four
//! bytes: `(month-1)<<4 | (year-2007)`, then day, hour, minute; the
//! year nibble wraps every 16 years, and this driver assumes the pump
//! clock sits in the 2007–2022 window. A packed duration is two bytes,
//! hour then minute.

use std::time::Duration;

use chrono::{Datelike, NaiveDate, Timelike};
use nom::number::complete::u8 as any_u8;
use nom::IResult;

use crate::pump::message::PumpTime;
use crate::util::codec::fail;

/// Parse a packed pump time. An impossible calendar date is a decode
/// fault.
pub fn pump_time(input: &[u8]) -> IResult<&[u8], PumpTime> {
    let (i, ym) = any_u8(input)?;
    let (i, day) = any_u8(i)?;
    let (i, hour) = any_u8(i)?;
    let (i, minute) = any_u8(i)?;

    let year = 2007 + i32::from(ym & 0x0f);
    let month = 1 + u32::from(ym >> 4);
    let date = NaiveDate::from_ymd_opt(year, month, u32::from(day))
        .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), 0));
    match date {
        Some(dt) => Ok((i, PumpTime::from_naive(dt))),
        None => fail(input),
    }
}

/// Append a packed pump time. Seconds and sub-minute components are
/// always zero on the wire.
pub fn put_pump_time(buf: &mut Vec<u8>, t: PumpTime) {
    let dt = t.naive();
    let year = ((dt.date().year() - 2007) & 0x0f) as u8;
    let month = (dt.date().month0() as u8) << 4;
    buf.push(month | year);
    buf.push(dt.date().day() as u8);
    buf.push(dt.hour() as u8);
    buf.push(dt.minute() as u8);
}

/// Parse a packed duration: hour byte, minute byte.
pub fn duration_hm(input: &[u8]) -> IResult<&[u8], Duration> {
    let (i, hours) = any_u8(input)?;
    let (i, minutes) = any_u8(i)?;
    Ok((
        i,
        Duration::from_secs(u64::from(hours) * 3600 + u64::from(minutes) * 60),
    ))
}

/// Append a packed duration: hour byte, minute byte.
pub fn put_duration_hm(buf: &mut Vec<u8>, d: Duration) {
    let minutes = d.as_secs() / 60;
    buf.push((minutes / 60) as u8);
    buf.push((minutes % 60) as u8);
}
