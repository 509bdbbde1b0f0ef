//! Calendar keys, locale-aware date formatting, and timezone conversion.
//!
//! A [`DateKey`] identifies the "on this day" event set: a month and a day,
//! no year. February 29 is its own key and is stable across years. When a
//! `02-29` key has to be resolved to a concrete date in a non-leap year it
//! resolves to February 28 (see [`DateKey::date_in_year`]).

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use time_tz::{timezones, Offset, TimeZone, Tz};

use crate::DateError;

/// Storage namespace for cached event bundles.
pub const CACHE_KEY_PREFIX: &str = "historical_events_";

// Any leap year works; it only decides whether 02-29 is a valid key.
const REFERENCE_LEAP_YEAR: i32 = 2000;

/// Year-independent calendar key (month, day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey {
    month: u8,
    day: u8,
}

impl DateKey {
    pub fn new(month: u8, day: u8) -> Result<Self, DateError> {
        let invalid = || DateError::InvalidDateKey {
            value: format!("{month:02}-{day:02}"),
        };
        let calendar_month = Month::try_from(month).map_err(|_| invalid())?;
        let max_day = time::util::days_in_year_month(REFERENCE_LEAP_YEAR, calendar_month);
        if day == 0 || day > max_day {
            return Err(invalid());
        }
        Ok(Self { month, day })
    }

    /// Parses `MM-DD` (single-digit parts are accepted).
    pub fn parse(input: &str) -> Result<Self, DateError> {
        let invalid = || DateError::InvalidDateKey {
            value: input.to_owned(),
        };
        let (month, day) = input.trim().split_once('-').ok_or_else(invalid)?;
        let month = month.parse::<u8>().map_err(|_| invalid())?;
        let day = day.parse::<u8>().map_err(|_| invalid())?;
        Self::new(month, day).map_err(|_| invalid())
    }

    pub fn from_date(date: Date) -> Self {
        Self {
            month: u8::from(date.month()),
            day: date.day(),
        }
    }

    pub const fn month(self) -> u8 {
        self.month
    }

    pub const fn day(self) -> u8 {
        self.day
    }

    pub const fn is_leap_day(self) -> bool {
        self.month == 2 && self.day == 29
    }

    /// Concrete date for this key in `year`. A leap-day key falls back to
    /// February 28 in non-leap years.
    pub fn date_in_year(self, year: i32) -> Result<Date, DateError> {
        let month = Month::try_from(self.month).map_err(|_| DateError::InvalidDateKey {
            value: self.to_string(),
        })?;
        let day = if self.is_leap_day() && !time::util::is_leap_year(year) {
            28
        } else {
            self.day
        };
        Date::from_calendar_date(year, month, day).map_err(|_| DateError::InvalidDateKey {
            value: self.to_string(),
        })
    }

    /// Key under which the cache stores this date's events for `language`.
    pub fn storage_key(self, language: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{language}_{self}")
    }

    /// Splits a storage key back into its language and date key.
    pub fn from_storage_key(key: &str) -> Option<(&str, Self)> {
        let (language, date) = key.strip_prefix(CACHE_KEY_PREFIX)?.rsplit_once('_')?;
        if language.is_empty() || !language.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        Self::parse(date).ok().map(|key| (language, key))
    }
}

impl Display for DateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for DateKey {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DateKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

/// `historical_events_{language}_MM-DD`.
pub fn cache_storage_key(language: &str, key: DateKey) -> String {
    key.storage_key(language)
}

/// Storage-key prefix shared by every entry cached for `language`.
pub fn language_key_prefix(language: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{language}_")
}

/// Key for "today" as seen at `reference`, in the reference's own offset.
pub fn today_key(reference: OffsetDateTime) -> DateKey {
    DateKey::from_date(reference.date())
}

/// Supported display locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    EnUs,
    EnGb,
    DeDe,
    FrFr,
    EsEs,
    ItIt,
}

impl Locale {
    /// Accepts `en-US`, `en_us`, or a bare language code (`de` → `de-DE`).
    pub fn parse(input: &str) -> Result<Self, DateError> {
        let normalized = input.trim().replace('_', "-").to_ascii_lowercase();
        let locale = match normalized.as_str() {
            "en-us" | "en" => Self::EnUs,
            "en-gb" => Self::EnGb,
            "de-de" | "de" => Self::DeDe,
            "fr-fr" | "fr" => Self::FrFr,
            "es-es" | "es" => Self::EsEs,
            "it-it" | "it" => Self::ItIt,
            _ => {
                return Err(DateError::InvalidLocale {
                    value: input.to_owned(),
                })
            }
        };
        Ok(locale)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::EnGb => "en-GB",
            Self::DeDe => "de-DE",
            Self::FrFr => "fr-FR",
            Self::EsEs => "es-ES",
            Self::ItIt => "it-IT",
        }
    }

    /// Two-letter language code, as used by upstream providers.
    pub const fn language(self) -> &'static str {
        match self {
            Self::EnUs | Self::EnGb => "en",
            Self::DeDe => "de",
            Self::FrFr => "fr",
            Self::EsEs => "es",
            Self::ItIt => "it",
        }
    }

    fn month_names(self) -> &'static [&'static str; 12] {
        match self {
            Self::EnUs | Self::EnGb => &[
                "January", "February", "March", "April", "May", "June", "July", "August",
                "September", "October", "November", "December",
            ],
            Self::DeDe => &[
                "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August",
                "September", "Oktober", "November", "Dezember",
            ],
            Self::FrFr => &[
                "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août",
                "septembre", "octobre", "novembre", "décembre",
            ],
            Self::EsEs => &[
                "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto",
                "septiembre", "octubre", "noviembre", "diciembre",
            ],
            Self::ItIt => &[
                "gennaio", "febbraio", "marzo", "aprile", "maggio", "giugno", "luglio",
                "agosto", "settembre", "ottobre", "novembre", "dicembre",
            ],
        }
    }

    fn weekday_names(self) -> &'static [&'static str; 7] {
        match self {
            Self::EnUs | Self::EnGb => &[
                "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
            ],
            Self::DeDe => &[
                "Montag", "Dienstag", "Mittwoch", "Donnerstag", "Freitag", "Samstag", "Sonntag",
            ],
            Self::FrFr => &[
                "lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche",
            ],
            Self::EsEs => &[
                "lunes", "martes", "miércoles", "jueves", "viernes", "sábado", "domingo",
            ],
            Self::ItIt => &[
                "lunedì", "martedì", "mercoledì", "giovedì", "venerdì", "sabato", "domenica",
            ],
        }
    }

    pub fn format(self, date: Date) -> FormattedDate {
        let day = date.day();
        let month = u8::from(date.month());
        let year = date.year();
        let month_name = self.month_names()[usize::from(month - 1)];
        let weekday = self.weekday_names()[usize::from(date.weekday().number_days_from_monday())];

        let (long, numeric) = match self {
            Self::EnUs => (
                format!("{month_name} {day:02}, {year}"),
                format!("{month:02}/{day:02}/{year:04}"),
            ),
            Self::EnGb => (
                format!("{day} {month_name} {year}"),
                format!("{day:02}/{month:02}/{year:04}"),
            ),
            Self::DeDe => (
                format!("{day}. {month_name} {year}"),
                format!("{day:02}.{month:02}.{year:04}"),
            ),
            Self::FrFr | Self::ItIt => (
                format!("{day} {month_name} {year}"),
                format!("{day:02}/{month:02}/{year:04}"),
            ),
            Self::EsEs => (
                format!("{day} de {month_name} de {year}"),
                format!("{day:02}/{month:02}/{year:04}"),
            ),
        };

        FormattedDate {
            locale: self,
            long,
            numeric,
            weekday: weekday.to_owned(),
        }
    }
}

impl Display for Locale {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Locale-specific renderings of one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedDate {
    #[serde(serialize_with = "serialize_locale")]
    pub locale: Locale,
    pub long: String,
    pub numeric: String,
    pub weekday: String,
}

fn serialize_locale<S>(locale: &Locale, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(locale.as_str())
}

/// Formats `date` for the locale named by `locale`.
pub fn format(date: Date, locale: &str) -> Result<FormattedDate, DateError> {
    Ok(Locale::parse(locale)?.format(date))
}

/// A fixed UTC offset or a named zone from the IANA tz database.
#[derive(Clone, Copy)]
pub enum Zone {
    Fixed(UtcOffset),
    Named(&'static Tz),
}

impl Zone {
    pub const UTC: Self = Self::Fixed(UtcOffset::UTC);

    /// Accepts everything [`parse_zone`] does plus IANA names such as
    /// `Europe/Berlin`.
    pub fn parse(input: &str) -> Result<Self, DateError> {
        if let Ok(offset) = parse_zone(input) {
            return Ok(Self::Fixed(offset));
        }
        timezones::get_by_name(input.trim())
            .map(Self::Named)
            .ok_or_else(|| DateError::InvalidTimezone {
                value: input.to_owned(),
            })
    }

    /// Offset in effect at `instant`.
    pub fn offset_at(self, instant: OffsetDateTime) -> UtcOffset {
        match self {
            Self::Fixed(offset) => offset,
            Self::Named(tz) => tz.get_offset_utc(&instant).to_utc(),
        }
    }

    /// `instant` as wall-clock time in this zone.
    pub fn to_local(self, instant: OffsetDateTime) -> OffsetDateTime {
        instant.to_offset(self.offset_at(instant))
    }

    /// Offset for a local wall-clock time. Times inside a DST gap or overlap
    /// resolve to one of the two adjacent offsets.
    pub fn offset_for_local(self, wall: PrimitiveDateTime) -> UtcOffset {
        let tz = match self {
            Self::Fixed(offset) => return offset,
            Self::Named(tz) => tz,
        };

        let first = tz.get_offset_utc(&wall.assume_utc()).to_utc();
        let second = tz.get_offset_utc(&wall.assume_offset(first)).to_utc();
        if second == first {
            return first;
        }
        let settled = tz.get_offset_utc(&wall.assume_offset(second)).to_utc();
        if settled == second {
            second
        } else {
            first
        }
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self::UTC
    }
}

impl From<UtcOffset> for Zone {
    fn from(offset: UtcOffset) -> Self {
        Self::Fixed(offset)
    }
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Fixed(left), Self::Fixed(right)) => left == right,
            (Self::Named(left), Self::Named(right)) => left.name() == right.name(),
            _ => false,
        }
    }
}

impl Eq for Zone {}

impl Display for Zone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(offset) if *offset == UtcOffset::UTC => f.write_str("UTC"),
            Self::Fixed(offset) => {
                let sign = if offset.is_negative() { '-' } else { '+' };
                write!(
                    f,
                    "{sign}{:02}:{:02}",
                    offset.whole_hours().unsigned_abs(),
                    offset.minutes_past_hour().unsigned_abs()
                )
            }
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl Debug for Zone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Zone({self})")
    }
}

impl FromStr for Zone {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Reads the wall-clock time of `instant` as being in `from_zone` and
/// expresses that instant in `to_zone`. Named zones apply the DST rules in
/// force on that date.
pub fn convert_timezone(
    instant: OffsetDateTime,
    from_zone: &str,
    to_zone: &str,
) -> Result<OffsetDateTime, DateError> {
    let from = Zone::parse(from_zone)?;
    let to = Zone::parse(to_zone)?;

    let wall = PrimitiveDateTime::new(instant.date(), instant.time());
    let start = wall.assume_offset(from.offset_for_local(wall));
    Ok(to.to_local(start))
}

/// Parses a fixed offset: `UTC`, `GMT`, `Z`, `±HH`, `±HHMM`, `±HH:MM`,
/// optionally prefixed with `UTC`/`GMT`.
pub fn parse_zone(input: &str) -> Result<UtcOffset, DateError> {
    let invalid = || DateError::InvalidTimezone {
        value: input.to_owned(),
    };

    let trimmed = input.trim().to_ascii_uppercase();
    if matches!(trimmed.as_str(), "UTC" | "GMT" | "Z") {
        return Ok(UtcOffset::UTC);
    }

    let offset = trimmed
        .strip_prefix("UTC")
        .or_else(|| trimmed.strip_prefix("GMT"))
        .unwrap_or(&trimmed);

    let (sign, digits) = match offset.as_bytes().first() {
        Some(b'+') => (1_i8, &offset[1..]),
        Some(b'-') => (-1_i8, &offset[1..]),
        _ => return Err(invalid()),
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    if hours.is_empty() || hours.len() > 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours = hours.parse::<i8>().map_err(|_| invalid())?;
    let minutes = minutes.parse::<i8>().map_err(|_| invalid())?;
    if hours > 14 || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    UtcOffset::from_hms(sign * hours, sign * minutes, 0).map_err(|_| invalid())
}

/// `-44` → `44 BC`, `79` → `79 AD`, `1969` → `1969`.
pub fn format_year(year: i32) -> String {
    if year < 0 {
        format!("{} BC", year.unsigned_abs())
    } else if year < 1000 {
        format!("{year} AD")
    } else {
        year.to_string()
    }
}
