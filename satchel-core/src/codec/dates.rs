//! Date encoding for `data.json`.
//!
//! Writes always use the canonical `yyyy-MM-dd HH:mm:ss` form in the local
//! offset. Reads accept several legacy shapes and fall back to "now" when
//! nothing matches; each fallback is recorded so the caller can surface it.

use std::cell::RefCell;
use std::fmt;
use std::sync::OnceLock;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const CANONICAL: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

// "Jan 5, 2024 3:04:05 PM"
const HUMAN: &[BorrowedFormatItem<'static>] = format_description!(
    "[month repr:short] [day padding:none], [year] [hour repr:12 padding:none]:[minute]:[second] [period]"
);

const ISO_LOCAL: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

const ISO_LOCAL_FRAC: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");

/// Second-precision instant. Sub-second parts are dropped on construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    pub fn new(at: OffsetDateTime) -> Self {
        Self(at.replace_nanosecond(0).unwrap_or(at))
    }

    pub fn now() -> Self {
        Self::new(OffsetDateTime::now_utc().to_offset(local_offset()))
    }

    pub fn from_unix(secs: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp(secs).ok().map(Self::new)
    }

    pub fn unix(&self) -> i64 {
        self.0.unix_timestamp()
    }

    pub fn as_offset(&self) -> OffsetDateTime {
        self.0
    }

    pub fn to_canonical(&self) -> String {
        format_canonical(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

/// Process-wide local offset, resolved once so that encode and decode agree.
/// Falls back to UTC where the platform cannot report it safely.
pub fn local_offset() -> UtcOffset {
    static OFFSET: OnceLock<UtcOffset> = OnceLock::new();
    *OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

pub fn format_canonical(at: OffsetDateTime) -> String {
    at.to_offset(local_offset())
        .format(CANONICAL)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Try every accepted shape in order. `None` means nothing matched.
pub fn parse_tolerant(raw: &str) -> Option<Timestamp> {
    let s = raw.trim().replace(['\u{202f}', '\u{a0}'], " ");
    let local = local_offset();

    for fmt in [CANONICAL, HUMAN, ISO_LOCAL, ISO_LOCAL_FRAC] {
        if let Ok(p) = PrimitiveDateTime::parse(&s, fmt) {
            return Some(Timestamp::new(p.assume_offset(local)));
        }
    }
    if let Ok(dt) = OffsetDateTime::parse(&s, &Rfc3339) {
        return Some(Timestamp::new(dt));
    }
    if let Ok(ms) = s.parse::<i64>() {
        return from_millis(ms);
    }
    None
}

fn from_millis(ms: i64) -> Option<Timestamp> {
    Timestamp::from_unix(ms.div_euclid(1000))
}

thread_local! {
    static FALLBACKS: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Run `f` while collecting the raw values of dates that could not be parsed.
/// Decoding happens on one thread, so a thread-local scope is enough.
pub fn collect_fallbacks<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let previous = FALLBACKS.with(|c| c.borrow_mut().replace(Vec::new()));
    let out = f();
    let collected = FALLBACKS.with(|c| {
        let mut slot = c.borrow_mut();
        let mine = slot.take().unwrap_or_default();
        *slot = previous;
        mine
    });
    (out, collected)
}

fn record_fallback(raw: String) {
    tracing::warn!(value = %raw, "unparseable date, substituting current time");
    FALLBACKS.with(|c| {
        if let Some(v) = c.borrow_mut().as_mut() {
            v.push(raw);
        }
    });
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_canonical())
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a date string or epoch milliseconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
        Ok(parse_tolerant(v).unwrap_or_else(|| {
            record_fallback(v.to_string());
            Timestamp::now()
        }))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
        Ok(from_millis(v).unwrap_or_else(|| {
            record_fallback(v.to_string());
            Timestamp::now()
        }))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
        match i64::try_from(v) {
            Ok(v) => self.visit_i64(v),
            Err(_) => {
                record_fallback(v.to_string());
                Ok(Timestamp::now())
            }
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
        self.visit_i64(v as i64)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Timestamp, E> {
        record_fallback("null".to_string());
        Ok(Timestamp::now())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(TimestampVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn canonical_round_trip() {
        let ts = Timestamp::new(datetime!(2024-03-09 14:05:59).assume_offset(local_offset()));
        let s = ts.to_canonical();
        assert_eq!(s, "2024-03-09 14:05:59");
        assert_eq!(parse_tolerant(&s), Some(ts));
    }

    #[test]
    fn accepts_human_readable_form() {
        let want = Timestamp::new(datetime!(2024-01-05 15:04:05).assume_offset(local_offset()));
        assert_eq!(parse_tolerant("Jan 5, 2024 3:04:05 PM"), Some(want));
        // narrow no-break space before the period
        assert_eq!(parse_tolerant("Jan 5, 2024 3:04:05\u{202f}PM"), Some(want));
    }

    #[test]
    fn accepts_iso_without_zone() {
        let want = Timestamp::new(datetime!(2023-12-31 23:59:01).assume_offset(local_offset()));
        assert_eq!(parse_tolerant("2023-12-31T23:59:01"), Some(want));
        assert_eq!(parse_tolerant("2023-12-31T23:59:01.250"), Some(want));
    }

    #[test]
    fn accepts_rfc3339_and_epoch_millis() {
        let a = parse_tolerant("2024-06-01T10:00:00Z").unwrap();
        assert_eq!(a.unix(), 1_717_236_000);
        let b = parse_tolerant("1717236000123").unwrap();
        assert_eq!(b.unix(), 1_717_236_000);
    }

    #[test]
    fn garbage_falls_back_to_now_and_is_recorded() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let (parsed, fallbacks) =
            collect_fallbacks(|| serde_json::from_str::<Timestamp>("\"yesterday-ish\""));
        let ts = parsed.unwrap();
        assert!(ts.unix() >= before);
        assert_eq!(fallbacks, vec!["yesterday-ish".to_string()]);
    }

    #[test]
    fn drops_subseconds() {
        let ts = Timestamp::new(datetime!(2024-01-01 00:00:00.999 UTC));
        assert_eq!(ts.as_offset().nanosecond(), 0);
    }
}
