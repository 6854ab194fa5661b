//! Calendar-duration literals and per-action duration specs.
//!
//! The planner's clock is an integer tick, one second wide. Literals use
//! the calendar form `P[nD]T[nH][nM][nS]`; parsing totals the fields in
//! milliseconds and truncates toward zero to whole ticks. Formatting
//! produces the canonical decomposition, so integer-field literals
//! round-trip exactly.

use crate::state::State;
use derive_more::{Display, Error};
use std::fmt;
use std::sync::Arc;

/// Whole seconds on the planning clock.
pub type Ticks = i64;

const TICKS_PER_DAY: i64 = 86_400;
const TICKS_PER_HOUR: i64 = 3_600;
const TICKS_PER_MINUTE: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum DurationError {
    #[display("invalid duration literal {literal:?}: {detail}")]
    Parse { literal: String, detail: String },
    #[display("duration must be non-negative, got {ticks}")]
    Negative { ticks: Ticks },
    #[display("variable duration has min {min} > max {max}")]
    InvertedRange { min: Ticks, max: Ticks },
    #[display("conditional duration resolved to another conditional")]
    NestedConditional,
}

fn parse_error(literal: &str, detail: impl Into<String>) -> DurationError {
    DurationError::Parse {
        literal: literal.to_owned(),
        detail: detail.into(),
    }
}

/// Parses a `P[nD]T[nH][nM][nS]` literal into ticks.
///
/// All fields are optional but at least one must be present. Any field may
/// be a non-negative integer or a fixed-point decimal; sub-second
/// remainders are truncated.
pub fn parse_duration(literal: &str) -> Result<Ticks, DurationError> {
    let rest = literal
        .strip_prefix('P')
        .ok_or_else(|| parse_error(literal, "must start with 'P'"))?;

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut millis: i128 = 0;
    let mut fields = 0usize;

    let mut date_fields = FieldParser::new(literal, date_part);
    if let Some(days) = date_fields.take(&['D'])? {
        millis += days * TICKS_PER_DAY as i128;
        fields += 1;
    }
    date_fields.finish()?;

    if let Some(time_part) = time_part {
        let mut time_fields = FieldParser::new(literal, time_part);
        if let Some(hours) = time_fields.take(&['H'])? {
            millis += hours * TICKS_PER_HOUR as i128;
            fields += 1;
        }
        if let Some(minutes) = time_fields.take(&['M'])? {
            millis += minutes * TICKS_PER_MINUTE as i128;
            fields += 1;
        }
        if let Some(seconds) = time_fields.take(&['S'])? {
            millis += seconds;
            fields += 1;
        }
        time_fields.finish()?;
    }

    if fields == 0 {
        return Err(parse_error(literal, "no fields present"));
    }

    let ticks = millis / 1_000;
    i64::try_from(ticks).map_err(|_| parse_error(literal, "out of range"))
}

/// Formats ticks as the canonical `P[nD]T[nH][nM][nS]` literal.
///
/// Zero fields are omitted; zero overall is `PT0S`.
pub fn format_duration(ticks: Ticks) -> String {
    assert!(ticks >= 0, "durations are non-negative");
    if ticks == 0 {
        return "PT0S".to_owned();
    }
    let days = ticks / TICKS_PER_DAY;
    let hours = (ticks % TICKS_PER_DAY) / TICKS_PER_HOUR;
    let minutes = (ticks % TICKS_PER_HOUR) / TICKS_PER_MINUTE;
    let seconds = ticks % TICKS_PER_MINUTE;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}

/// Converts a [hifitime::Duration] to ticks, truncating sub-second
/// remainders toward zero.
pub fn duration_to_ticks(duration: hifitime::Duration) -> Ticks {
    (duration.total_nanoseconds() / 1_000_000_000) as Ticks
}

/// Converts ticks to a [hifitime::Duration].
pub fn ticks_to_duration(ticks: Ticks) -> hifitime::Duration {
    hifitime::Duration::from_seconds(ticks as f64)
}

/// Chooses a duration from the state and the entities allocated to the
/// action. Must resolve to a fixed or variable spec.
pub type ConditionalDurationFn = Arc<dyn Fn(&State, &[String]) -> DurationSpec + Send + Sync>;

/// How long an action takes.
#[derive(Clone)]
pub enum DurationSpec {
    /// Exactly this many ticks.
    Fixed(Ticks),
    /// Anywhere in `[min, max]` ticks, decided by the constraint network.
    Variable { min: Ticks, max: Ticks },
    /// Decided per expansion from `(state, resources)`.
    Conditional(ConditionalDurationFn),
}

impl DurationSpec {
    pub fn fixed(ticks: Ticks) -> Self {
        DurationSpec::Fixed(ticks)
    }

    pub fn variable(min: Ticks, max: Ticks) -> Self {
        DurationSpec::Variable { min, max }
    }

    pub fn conditional(
        f: impl Fn(&State, &[String]) -> DurationSpec + Send + Sync + 'static,
    ) -> Self {
        DurationSpec::Conditional(Arc::new(f))
    }

    /// Parses a calendar literal into a fixed spec.
    pub fn parse(literal: &str) -> Result<Self, DurationError> {
        Ok(DurationSpec::Fixed(parse_duration(literal)?))
    }

    /// Checks the spec's static well-formedness.
    pub fn validate(&self) -> Result<(), DurationError> {
        match *self {
            DurationSpec::Fixed(ticks) if ticks < 0 => Err(DurationError::Negative { ticks }),
            DurationSpec::Variable { min, .. } if min < 0 => {
                Err(DurationError::Negative { ticks: min })
            }
            DurationSpec::Variable { min, max } if min > max => {
                Err(DurationError::InvertedRange { min, max })
            }
            _ => Ok(()),
        }
    }

    /// Resolves to concrete `[min, max]` bounds for one expansion.
    pub fn resolve(&self, state: &State, resources: &[String]) -> Result<(Ticks, Ticks), DurationError> {
        match self {
            DurationSpec::Fixed(ticks) => {
                if *ticks < 0 {
                    return Err(DurationError::Negative { ticks: *ticks });
                }
                Ok((*ticks, *ticks))
            }
            DurationSpec::Variable { min, max } => {
                if *min < 0 {
                    return Err(DurationError::Negative { ticks: *min });
                }
                if min > max {
                    return Err(DurationError::InvertedRange { min: *min, max: *max });
                }
                Ok((*min, *max))
            }
            DurationSpec::Conditional(f) => match f(state, resources) {
                DurationSpec::Conditional(_) => Err(DurationError::NestedConditional),
                resolved => resolved.resolve(state, resources),
            },
        }
    }
}

impl fmt::Debug for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationSpec::Fixed(ticks) => write!(f, "Fixed({ticks})"),
            DurationSpec::Variable { min, max } => write!(f, "Variable({min}..={max})"),
            DurationSpec::Conditional(_) => write!(f, "Conditional(..)"),
        }
    }
}

/// Incremental parser over one segment of a duration literal.
struct FieldParser<'a> {
    literal: &'a str,
    rest: &'a str,
}

impl<'a> FieldParser<'a> {
    fn new(literal: &'a str, segment: &'a str) -> Self {
        FieldParser {
            literal,
            rest: segment,
        }
    }

    /// Consumes `<number><designator>` if the next field carries one of
    /// the given designators, returning its value in milliseconds of the
    /// base unit.
    fn take(&mut self, designators: &[char]) -> Result<Option<i128>, DurationError> {
        if self.rest.is_empty() {
            return Ok(None);
        }
        let digits_end = self
            .rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| parse_error(self.literal, "field without designator"))?;
        let designator = self.rest[digits_end..].chars().next().unwrap();
        if !designators.contains(&designator) {
            return Ok(None);
        }
        let number = &self.rest[..digits_end];
        self.rest = &self.rest[digits_end + designator.len_utf8()..];
        Ok(Some(parse_field_millis(self.literal, number)?))
    }

    fn finish(self) -> Result<(), DurationError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(parse_error(
                self.literal,
                format!("unexpected trailing {:?}", self.rest),
            ))
        }
    }
}

/// Parses `int[.frac]` into milliseconds, truncating past 3 fractional
/// digits.
fn parse_field_millis(literal: &str, number: &str) -> Result<i128, DurationError> {
    let (whole, frac) = match number.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (number, None),
    };
    if whole.is_empty() && frac.is_none_or(str::is_empty) {
        return Err(parse_error(literal, "empty number"));
    }
    let mut millis: i128 = 0;
    if !whole.is_empty() {
        let value: i128 = whole
            .parse()
            .map_err(|_| parse_error(literal, format!("bad number {number:?}")))?;
        millis += value * 1_000;
    }
    if let Some(frac) = frac {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(parse_error(literal, format!("bad number {number:?}")));
        }
        let mut scale = 100;
        for digit in frac.bytes().take(3) {
            millis += (digit - b'0') as i128 * scale;
            scale /= 10;
        }
    }
    Ok(millis)
}
