/*
 * formatting.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Locale-aware formatting helpers bound into every binding context.
//!
//! Templates call `format_date`, `format_datetime`, `format_amount` and
//! `format_duration`. Locale data comes from a [`LocaleFormatter`]; when it
//! does not know the requested locale it answers [`Formatted::UnknownLocale`]
//! and the helper returns its input unchanged instead of failing the render.

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use jiff::Timestamp;
use jiff::tz::{Offset, TimeZone as Zone};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use stencil_template::sandbox::{get_attr, strftime};
use stencil_template::{Args, Helper, TemplateError, TemplateResult, Value};

pub const FORMAT_DATE: &str = "format_date";
pub const FORMAT_DATETIME: &str = "format_datetime";
pub const FORMAT_AMOUNT: &str = "format_amount";
pub const FORMAT_DURATION: &str = "format_duration";

/// Helpers every binding context must provide.
pub const HELPER_NAMES: [&str; 4] =
    [FORMAT_DATE, FORMAT_DATETIME, FORMAT_AMOUNT, FORMAT_DURATION];

const NO_BREAK_SPACE: char = '\u{a0}';

/// Outcome of a locale-dependent formatting call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formatted {
    Text(String),
    /// The formatter has no data for the requested locale.
    UnknownLocale,
}

/// Named datetime styles, or an explicit strftime pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateTimeStyle {
    Short,
    #[default]
    Medium,
    Long,
    Full,
    Pattern(String),
}

impl DateTimeStyle {
    pub fn parse(s: &str) -> Self {
        match s {
            "short" => DateTimeStyle::Short,
            "medium" => DateTimeStyle::Medium,
            "long" => DateTimeStyle::Long,
            "full" => DateTimeStyle::Full,
            pattern => DateTimeStyle::Pattern(pattern.to_string()),
        }
    }
}

/// Locale data provider used by the formatting helpers.
pub trait LocaleFormatter: Send + Sync + fmt::Debug {
    /// Format a date with the locale's short date pattern or with `pattern`.
    fn format_date(
        &self,
        date: NaiveDate,
        pattern: Option<&str>,
        lang: &str,
    ) -> TemplateResult<Formatted>;

    /// Format a datetime already converted to local time.
    fn format_datetime(
        &self,
        datetime: NaiveDateTime,
        style: &DateTimeStyle,
        lang: &str,
    ) -> TemplateResult<Formatted>;

    /// Format a number using its scale as the number of decimals.
    fn format_number(&self, value: Decimal, lang: &str) -> Formatted;
}

#[derive(Debug)]
struct LocaleData {
    code: &'static str,
    date: &'static str,
    /// Long date template: `{A}` weekday, `{d}` day, `{B}` month, `{Y}` year.
    long_date: &'static str,
    full_date: &'static str,
    decimal_point: &'static str,
    thousands_sep: &'static str,
    months: [&'static str; 12],
    weekdays: [&'static str; 7],
}

const EN_MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const EN_WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

static LOCALES: &[LocaleData] = &[
    LocaleData {
        code: "en_US",
        date: "%m/%d/%Y",
        long_date: "{B} {d}, {Y}",
        full_date: "{A}, {B} {d}, {Y}",
        decimal_point: ".",
        thousands_sep: ",",
        months: EN_MONTHS,
        weekdays: EN_WEEKDAYS,
    },
    LocaleData {
        code: "en_GB",
        date: "%d/%m/%Y",
        long_date: "{d} {B} {Y}",
        full_date: "{A}, {d} {B} {Y}",
        decimal_point: ".",
        thousands_sep: ",",
        months: EN_MONTHS,
        weekdays: EN_WEEKDAYS,
    },
    LocaleData {
        code: "fr_FR",
        date: "%d/%m/%Y",
        long_date: "{d} {B} {Y}",
        full_date: "{A} {d} {B} {Y}",
        decimal_point: ",",
        thousands_sep: "\u{202f}",
        months: [
            "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août",
            "septembre", "octobre", "novembre", "décembre",
        ],
        weekdays: ["lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche"],
    },
    LocaleData {
        code: "de_DE",
        date: "%d.%m.%Y",
        long_date: "{d}. {B} {Y}",
        full_date: "{A}, {d}. {B} {Y}",
        decimal_point: ",",
        thousands_sep: ".",
        months: [
            "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August",
            "September", "Oktober", "November", "Dezember",
        ],
        weekdays: [
            "Montag", "Dienstag", "Mittwoch", "Donnerstag", "Freitag", "Samstag", "Sonntag",
        ],
    },
    LocaleData {
        code: "es_ES",
        date: "%d/%m/%Y",
        long_date: "{d} de {B} de {Y}",
        full_date: "{A}, {d} de {B} de {Y}",
        decimal_point: ",",
        thousands_sep: ".",
        months: [
            "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto",
            "septiembre", "octubre", "noviembre", "diciembre",
        ],
        weekdays: ["lunes", "martes", "miércoles", "jueves", "viernes", "sábado", "domingo"],
    },
];

/// Formatter backed by a small built-in locale table.
///
/// Accepts `fr_FR`, `fr-FR` and bare language codes such as `fr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicFormatter;

impl BasicFormatter {
    fn locale(lang: &str) -> Option<&'static LocaleData> {
        let lang = lang.replace('-', "_");
        LOCALES
            .iter()
            .find(|locale| locale.code == lang)
            .or_else(|| {
                if lang.contains('_') {
                    return None;
                }
                LOCALES
                    .iter()
                    .find(|locale| locale.code.split('_').next() == Some(lang.as_str()))
            })
    }

    pub fn knows(lang: &str) -> bool {
        Self::locale(lang).is_some()
    }
}

fn spelled_date(template: &str, date: NaiveDate, locale: &LocaleData) -> String {
    let month = locale.months[date.month0() as usize];
    let weekday = locale.weekdays[date.weekday().num_days_from_monday() as usize];
    template
        .replace("{A}", weekday)
        .replace("{B}", month)
        .replace("{d}", &date.day().to_string())
        .replace("{Y}", &date.year().to_string())
}

fn pattern_text(value: Value, pattern: &str) -> TemplateResult<String> {
    Ok(strftime(&value, pattern)?.to_string())
}

impl LocaleFormatter for BasicFormatter {
    fn format_date(
        &self,
        date: NaiveDate,
        pattern: Option<&str>,
        lang: &str,
    ) -> TemplateResult<Formatted> {
        let Some(locale) = Self::locale(lang) else {
            return Ok(Formatted::UnknownLocale);
        };
        let text = pattern_text(Value::Date(date), pattern.unwrap_or(locale.date))?;
        Ok(Formatted::Text(text))
    }

    fn format_datetime(
        &self,
        datetime: NaiveDateTime,
        style: &DateTimeStyle,
        lang: &str,
    ) -> TemplateResult<Formatted> {
        let Some(locale) = Self::locale(lang) else {
            return Ok(Formatted::UnknownLocale);
        };
        let date = datetime.date();
        let text = match style {
            DateTimeStyle::Short => format!(
                "{} {}",
                pattern_text(Value::Date(date), locale.date)?,
                datetime.format("%H:%M")
            ),
            DateTimeStyle::Medium => format!(
                "{} {}",
                pattern_text(Value::Date(date), locale.date)?,
                datetime.format("%H:%M:%S")
            ),
            DateTimeStyle::Long => format!(
                "{} {}",
                spelled_date(locale.long_date, date, locale),
                datetime.format("%H:%M:%S")
            ),
            DateTimeStyle::Full => format!(
                "{} {}",
                spelled_date(locale.full_date, date, locale),
                datetime.format("%H:%M:%S")
            ),
            DateTimeStyle::Pattern(pattern) => pattern_text(Value::DateTime(datetime), pattern)?,
        };
        Ok(Formatted::Text(text))
    }

    fn format_number(&self, value: Decimal, lang: &str) -> Formatted {
        let Some(locale) = Self::locale(lang) else {
            return Formatted::UnknownLocale;
        };
        let text = value.abs().to_string();
        let (integer, fraction) = match text.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (text.as_str(), None),
        };

        let mut out = String::new();
        if value.is_sign_negative() && !value.is_zero() {
            out.push('-');
        }
        let digits: Vec<char> = integer.chars().collect();
        for (i, digit) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push_str(locale.thousands_sep);
            }
            out.push(*digit);
        }
        if let Some(fraction) = fraction {
            out.push_str(locale.decimal_point);
            out.push_str(fraction);
        }
        Formatted::Text(out)
    }
}

/// Resolve a timezone name.
///
/// IANA names such as `Europe/Brussels` or `Etc/GMT+5` come from the bundled
/// timezone database, daylight saving included. `UTC`, `GMT`, `Z` and numeric
/// offsets such as `+02:00`, `-0530` or `UTC+1` resolve to a fixed offset.
pub fn parse_timezone(name: &str) -> Option<Zone> {
    let name = name.trim();
    if let Ok(zone) = Zone::get(name) {
        return Some(zone);
    }
    let seconds = fixed_offset_seconds(name)?;
    Offset::from_seconds(seconds).ok().map(Zone::fixed)
}

/// Wall-clock time in `zone` at the UTC instant `utc`.
pub fn to_local(zone: &Zone, utc: NaiveDateTime) -> Option<NaiveDateTime> {
    let timestamp = Timestamp::new(utc.and_utc().timestamp(), 0).ok()?;
    let offset = FixedOffset::east_opt(zone.to_offset(timestamp).seconds())?;
    Some(offset.from_utc_datetime(&utc).naive_local())
}

fn fixed_offset_seconds(name: &str) -> Option<i32> {
    let rest = ["UTC", "GMT"]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name);
    if rest.is_empty() || rest == "Z" {
        return Some(0);
    }

    let (sign, digits) = match rest.as_bytes().first() {
        Some(b'+') => (1, &rest[1..]),
        Some(b'-') => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    if hours.is_empty() || hours.len() > 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

/// Where a currency symbol goes relative to the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolPosition {
    Before,
    After,
}

/// Display properties of a currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    pub symbol: String,
    pub position: SymbolPosition,
    pub decimal_places: u32,
}

impl Currency {
    /// Display properties for an ISO 4217 code. Unknown codes use the code as symbol.
    pub fn from_code(code: &str) -> Self {
        let (symbol, position, decimal_places) = match code {
            "EUR" => ("€", SymbolPosition::After, 2),
            "USD" => ("$", SymbolPosition::Before, 2),
            "GBP" => ("£", SymbolPosition::Before, 2),
            "INR" => ("₹", SymbolPosition::Before, 2),
            "JPY" => ("¥", SymbolPosition::Before, 0),
            "CHF" => ("CHF", SymbolPosition::After, 2),
            other => (other, SymbolPosition::After, 2),
        };
        Currency {
            symbol: symbol.to_string(),
            position,
            decimal_places,
        }
    }

    /// Read a currency from a code string, a currency record or a map.
    ///
    /// Records are read through the sandbox, so their schema policy applies.
    fn from_value(value: &Value) -> TemplateResult<Self> {
        match value {
            Value::Str(code) | Value::Markup(code) => Ok(Self::from_code(code)),
            Value::Object(_) | Value::Map(_) => {
                let symbol = get_attr(value, "symbol")?.to_string();
                let position = match get_attr(value, "position")?.as_str() {
                    Some("before") => SymbolPosition::Before,
                    _ => SymbolPosition::After,
                };
                let decimal_places = match get_attr(value, "decimal_places")? {
                    Value::None => 2,
                    places => places
                        .as_int()
                        .and_then(|p| u32::try_from(p).ok())
                        .filter(|p| *p <= 12)
                        .ok_or_else(|| {
                            TemplateError::helper(
                                FORMAT_AMOUNT,
                                format!("invalid decimal_places {}", places.repr()),
                            )
                        })?,
                };
                Ok(Currency {
                    symbol,
                    position,
                    decimal_places,
                })
            }
            other => Err(TemplateError::helper(
                FORMAT_AMOUNT,
                format!("expected a currency, found {}", other.type_name()),
            )),
        }
    }
}

/// Round half away from zero to exactly `places` decimals.
pub fn round_amount(amount: Decimal, places: u32) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(places);
    rounded
}

/// `HH:MM` rendering of a number of hours.
pub fn format_duration(hours: f64) -> String {
    let total = hours.abs() * 60.0;
    let mut whole_hours = (total / 60.0).floor() as i64;
    let mut minutes = (total % 60.0).round() as i64;
    if minutes == 60 {
        minutes = 0;
        whole_hours += 1;
    }
    let sign = if hours < 0.0 { "-" } else { "" };
    format!("{sign}{whole_hours:02}:{minutes:02}")
}

/// Locale and timezone used when a helper call does not name one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDefaults {
    pub lang: String,
    pub tz: String,
}

impl Default for FormatDefaults {
    fn default() -> Self {
        Self {
            lang: "en_US".to_string(),
            tz: "UTC".to_string(),
        }
    }
}

/// An optional string argument; `None`, `False` and `''` count as absent.
fn opt_str(helper: &str, args: &Args, index: usize, name: &str) -> TemplateResult<Option<String>> {
    match args.get(index, name) {
        None | Some(Value::None) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Str(s)) | Some(Value::Markup(s)) if s.is_empty() => Ok(None),
        Some(Value::Str(s)) | Some(Value::Markup(s)) => Ok(Some(s.clone())),
        Some(other) => Err(TemplateError::helper(
            helper,
            format!("{name} must be a string, not {}", other.type_name()),
        )),
    }
}

fn is_empty_arg(value: &Value) -> bool {
    match value {
        Value::None | Value::Bool(false) => true,
        Value::Str(s) | Value::Markup(s) => s.is_empty(),
        _ => false,
    }
}

fn as_date(helper: &str, value: &Value) -> TemplateResult<NaiveDate> {
    match value {
        Value::Date(date) => Ok(*date),
        Value::DateTime(datetime) => Ok(datetime.date()),
        Value::Str(s) | Value::Markup(s) => {
            let head = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(head, "%Y-%m-%d")
                .map_err(|_| TemplateError::helper(helper, format!("invalid date '{s}'")))
        }
        other => Err(TemplateError::helper(
            helper,
            format!("expected a date, found {}", other.type_name()),
        )),
    }
}

fn as_datetime(helper: &str, value: &Value) -> TemplateResult<NaiveDateTime> {
    match value {
        Value::DateTime(datetime) => Ok(*datetime),
        Value::Date(date) => Ok(date.and_time(NaiveTime::MIN)),
        Value::Str(s) | Value::Markup(s) => {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .map_err(|_| TemplateError::helper(helper, format!("invalid datetime '{s}'")))
        }
        other => Err(TemplateError::helper(
            helper,
            format!("expected a datetime, found {}", other.type_name()),
        )),
    }
}

fn as_decimal(helper: &str, value: &Value) -> TemplateResult<Decimal> {
    let decimal = match value {
        Value::Int(i) => Some(Decimal::from(*i)),
        Value::Float(f) => Decimal::from_f64(*f),
        Value::Bool(b) => Some(Decimal::from(i64::from(*b))),
        Value::None => Some(Decimal::ZERO),
        _ => None,
    };
    decimal.ok_or_else(|| {
        TemplateError::helper(helper, format!("expected an amount, found {}", value.repr()))
    })
}

fn text_or(formatted: Formatted, fallback: &Value) -> Value {
    match formatted {
        Formatted::Text(text) => Value::Str(text),
        Formatted::UnknownLocale => fallback.clone(),
    }
}

/// Build the four formatting helpers over `formatter`.
pub fn format_helpers(
    formatter: Arc<dyn LocaleFormatter>,
    defaults: FormatDefaults,
) -> [Helper; 4] {
    let defaults = Arc::new(defaults);

    let date_helper = {
        let (formatter, defaults) = (Arc::clone(&formatter), Arc::clone(&defaults));
        Helper::new(FORMAT_DATE, move |args: &Args| {
            let value = args.get(0, "date").cloned().unwrap_or_default();
            if is_empty_arg(&value) {
                return Ok(Value::str(""));
            }
            let date = as_date(FORMAT_DATE, &value)?;
            let pattern = opt_str(FORMAT_DATE, args, 1, "date_format")?;
            let lang = opt_str(FORMAT_DATE, args, 2, "lang_code")?;
            let lang = lang.as_deref().unwrap_or(&defaults.lang);
            let formatted = formatter.format_date(date, pattern.as_deref(), lang)?;
            Ok(text_or(formatted, &value))
        })
    };

    let datetime_helper = {
        let (formatter, defaults) = (Arc::clone(&formatter), Arc::clone(&defaults));
        Helper::new(FORMAT_DATETIME, move |args: &Args| {
            let value = args.get(0, "dt").cloned().unwrap_or_default();
            if is_empty_arg(&value) {
                return Ok(Value::str(""));
            }
            let datetime = as_datetime(FORMAT_DATETIME, &value)?;
            let tz = opt_str(FORMAT_DATETIME, args, 1, "tz")?;
            let tz = tz.as_deref().unwrap_or(&defaults.tz);
            let zone = parse_timezone(tz).ok_or_else(|| {
                TemplateError::helper(FORMAT_DATETIME, format!("unknown timezone '{tz}'"))
            })?;
            let local = to_local(&zone, datetime).ok_or_else(|| {
                TemplateError::helper(FORMAT_DATETIME, "datetime out of range")
            })?;
            let style = opt_str(FORMAT_DATETIME, args, 2, "dt_format")?
                .map(|s| DateTimeStyle::parse(&s))
                .unwrap_or_default();
            let lang = opt_str(FORMAT_DATETIME, args, 3, "lang_code")?;
            let lang = lang.as_deref().unwrap_or(&defaults.lang);
            let formatted = formatter.format_datetime(local, &style, lang)?;
            Ok(text_or(formatted, &value))
        })
    };

    let amount_helper = {
        let (formatter, defaults) = (Arc::clone(&formatter), Arc::clone(&defaults));
        Helper::new(FORMAT_AMOUNT, move |args: &Args| {
            let value = args.get(0, "amount").cloned().unwrap_or_default();
            let amount = as_decimal(FORMAT_AMOUNT, &value)?;
            let currency = args.get(1, "currency").ok_or_else(|| {
                TemplateError::helper(FORMAT_AMOUNT, "missing required argument 'currency'")
            })?;
            let currency = Currency::from_value(currency)?;
            let lang = opt_str(FORMAT_AMOUNT, args, 2, "lang_code")?;
            let lang = lang.as_deref().unwrap_or(&defaults.lang);
            let rounded = round_amount(amount, currency.decimal_places);
            let Formatted::Text(number) = formatter.format_number(rounded, lang) else {
                return Ok(value);
            };
            Ok(Value::Str(match currency.position {
                SymbolPosition::Before => format!("{}{NO_BREAK_SPACE}{number}", currency.symbol),
                SymbolPosition::After => format!("{number}{NO_BREAK_SPACE}{}", currency.symbol),
            }))
        })
    };

    let duration_helper = Helper::new(FORMAT_DURATION, |args: &Args| {
        let hours = match args.get(0, "value") {
            None | Some(Value::None) | Some(Value::Bool(false)) => 0.0,
            Some(value) => value.as_float().ok_or_else(|| {
                TemplateError::helper(
                    FORMAT_DURATION,
                    format!("expected a number, found {}", value.type_name()),
                )
            })?,
        };
        Ok(Value::Str(format_duration(hours)))
    });

    [date_helper, datetime_helper, amount_helper, duration_helper]
}
