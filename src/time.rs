//! Wall-clock and timestamp parsing helpers.
//!
//! Every timestamp inside logster is unix milliseconds in an `i64`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds elapsed between `since` and now, zero if `since` is in the
/// future.
pub fn elapsed_millis(since: SystemTime) -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(since)
        .unwrap_or_else(|_| Duration::from_secs(0));
    elapsed
        .as_secs()
        .saturating_mul(1_000)
        .saturating_add(u64::from(elapsed.subsec_nanos() / 1_000_000))
}

/// `SystemTime` to unix milliseconds. Times before the epoch come out
/// negative.
pub fn system_time_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64) * 1_000 + i64::from(d.subsec_nanos() / 1_000_000),
        Err(e) => {
            let d = e.duration();
            -((d.as_secs() as i64) * 1_000 + i64::from(d.subsec_nanos() / 1_000_000))
        }
    }
}

/// Parse the `+HHMM` / `-HHMM` zone suffix of a common log format
/// timestamp. Only the trailing five characters are considered.
pub fn parse_zone(zone: &str) -> Result<FixedOffset, String> {
    let zone = zone.trim();
    if zone.len() < 5 || !zone.is_char_boundary(zone.len() - 5) {
        return Err(format!("zone too short: {:?}", zone));
    }
    let tail = &zone[zone.len() - 5..];
    let sign = match &tail[0..1] {
        "+" => 1,
        "-" => -1,
        _ => return Err(format!("zone has no sign: {:?}", zone)),
    };
    let hours: i32 = tail[1..3]
        .parse()
        .map_err(|e| format!("bad zone hours in {:?}: {}", zone, e))?;
    let minutes: i32 = tail[3..5]
        .parse()
        .map_err(|e| format!("bad zone minutes in {:?}: {}", zone, e))?;
    FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60))
        .ok_or_else(|| format!("zone out of range: {:?}", zone))
}

/// Parse a common log format timestamp, `10/Oct/2000:13:55:36 -0700`, into
/// unix milliseconds.
///
/// The wall-clock part is resolved in the fixed offset named by the zone to
/// find the absolute instant. The offset is then dropped: the result counts
/// from the UTC epoch.
pub fn parse_clf_timestamp(raw: &str) -> Result<i64, String> {
    let mut parts = raw.trim().splitn(2, ' ');
    let local = parts.next().unwrap_or("");
    let zone = parts
        .next()
        .ok_or_else(|| format!("timestamp has no zone: {:?}", raw))?;

    let naive = NaiveDateTime::parse_from_str(local, "%d/%b/%Y:%H:%M:%S")
        .map_err(|e| format!("bad timestamp {:?}: {}", local, e))?;
    let offset = parse_zone(zone)?;
    let instant: DateTime<FixedOffset> = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| format!("ambiguous timestamp: {:?}", raw))?;
    Ok(instant.timestamp_millis())
}

/// Render unix milliseconds as an RFC 3339 UTC timestamp. `None` when the
/// value is outside chrono's range.
pub fn format_rfc3339(millis: i64) -> Option<String> {
    let secs = millis.div_euclid(1_000);
    let nanos = (millis.rem_euclid(1_000) * 1_000_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Parse a user supplied start time into unix milliseconds.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DD` or a bare integer of unix milliseconds. Values without a
/// zone are taken as UTC.
pub fn parse_start_time(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    for fmt in &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }
    Err(format!("unrecognized start time: {:?}", raw))
}
