//! Solar Hijri (Jalali) dates in template data.
//!
//! Any object stored under a key ending in `date` (case-insensitive) is
//! turned into a [`JalaliDate`] before templates see it, so themes can call
//! `toShortFormJalali()`, `toLongFormJalali()` and `compare(other)` on it.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    builtins,
    compile::compare,
    error::{Result, TemplateError},
    value::Value,
};

const MONTH_NAMES: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

const ORDINALS: [&str; 31] = [
    "یکم",
    "دوم",
    "سوم",
    "چهارم",
    "پنجم",
    "ششم",
    "هفتم",
    "هشتم",
    "نهم",
    "دهم",
    "یازدهم",
    "دوازدهم",
    "سیزدهم",
    "چهاردهم",
    "پانزدهم",
    "شانزدهم",
    "هفدهم",
    "هجدهم",
    "نوزدهم",
    "بیستم",
    "بیست و یکم",
    "بیست و دوم",
    "بیست و سوم",
    "بیست و چهارم",
    "بیست و پنجم",
    "بیست و ششم",
    "بیست و هفتم",
    "بیست و هشتم",
    "بیست و نهم",
    "سی\u{200c}ام",
    "سی و یکم",
];

/// A `{year, month, day}` triple in the Solar Hijri calendar.
///
/// Fields keep whatever values the data held; nothing is validated.
#[derive(Debug, Clone, PartialEq)]
pub struct JalaliDate {
    pub year: Value,
    pub month: Value,
    pub day: Value,
}

impl JalaliDate {
    /// Field names, in enumeration order.
    pub(crate) const FIELDS: [&'static str; 3] = ["year", "month", "day"];

    /// Read `year`, `month` and `day` from an object value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let get = |name| value.field(name).cloned().unwrap_or_default();
        Self {
            year: get("year"),
            month: get("month"),
            day: get("day"),
        }
    }

    pub(crate) fn field(&self, name: &str) -> Option<&Value> {
        match name {
            "year" => Some(&self.year),
            "month" => Some(&self.month),
            "day" => Some(&self.day),
            _ => None,
        }
    }

    /// `1402/5/3` written with Persian digits.
    #[must_use]
    pub fn short_form(&self) -> String {
        to_persian_digits(&format!(
            "{}/{}/{}",
            self.year.to_js_string(),
            self.month.to_js_string(),
            self.day.to_js_string()
        ))
    }

    /// Ordinal day, month name and year, e.g. `سوم مرداد ماه ۱۴۰۲`.
    #[must_use]
    pub fn long_form(&self) -> String {
        format!(
            "{} {} ماه {}",
            lookup(&ORDINALS, &self.day),
            lookup(&MONTH_NAMES, &self.month),
            to_persian_digits(&self.year.to_js_string())
        )
    }

    /// `1`, `-1` or `0`, comparing year, then month, then day.
    pub fn compare(&self, other: &Value) -> Result<f64> {
        for name in Self::FIELDS {
            let mine = self.field(name).cloned().unwrap_or_default();
            let theirs = builtins::property(other, name)?;
            match compare(&mine, &theirs) {
                Some(std::cmp::Ordering::Greater) => return Ok(1.0),
                Some(std::cmp::Ordering::Less) => return Ok(-1.0),
                _ => {}
            }
        }
        Ok(0.0)
    }

    pub(crate) fn call(&self, name: &str, other: &Value) -> Result<Value> {
        Ok(match name {
            "toShortFormJalali" => Value::string(self.short_form()),
            "toLongFormJalali" => Value::string(self.long_form()),
            "compare" => Value::Number(self.compare(other)?),
            _ => {
                return Err(TemplateError::type_error(format!(
                    "date.{name} is not a function"
                )));
            }
        })
    }
}

/// One-based lookup; out-of-range positions read as `undefined`.
fn lookup(table: &[&str], position: &Value) -> String {
    let i = position.to_number() - 1.0;
    if i >= 0.0 && i.fract() == 0.0 && (i as usize) < table.len() {
        table[i as usize].to_string()
    } else {
        Value::Undefined.to_js_string()
    }
}

/// Replace ASCII digits with Extended Arabic-Indic (Persian) digits.
#[must_use]
pub fn to_persian_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) if c.is_ascii_digit() => char::from_u32(0x06F0 + d).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Turn every object or array stored under a key ending in `date` into a
/// [`Value::Date`], searching nested objects and arrays.
#[must_use]
pub fn convert_dates(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let converted: BTreeMap<String, Value> = Arc::unwrap_or_clone(fields)
                .into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        v @ (Value::Object(_) | Value::Array(_))
                            if key.to_lowercase().ends_with("date") =>
                        {
                            Value::Date(Arc::new(JalaliDate::from_value(&v)))
                        }
                        other => convert_dates(other),
                    };
                    (key, value)
                })
                .collect();
            Value::object(converted)
        }
        Value::Array(items) => Value::array(
            Arc::unwrap_or_clone(items)
                .into_iter()
                .map(convert_dates)
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn date(year: f64, month: f64, day: f64) -> JalaliDate {
        JalaliDate {
            year: Value::Number(year),
            month: Value::Number(month),
            day: Value::Number(day),
        }
    }

    #[test]
    fn test_short_form() {
        assert_eq!(date(1402.0, 5.0, 3.0).short_form(), "۱۴۰۲/۵/۳");
    }

    #[test]
    fn test_long_form() {
        assert_eq!(date(1402.0, 5.0, 3.0).long_form(), "سوم مرداد ماه ۱۴۰۲");
        assert_eq!(date(1399.0, 12.0, 31.0).long_form(), "سی و یکم اسفند ماه ۱۳۹۹");
        assert_eq!(date(1400.0, 13.0, 1.0).long_form(), "یکم undefined ماه ۱۴۰۰");
    }

    #[test]
    fn test_compare() {
        let later = Value::Date(Arc::new(date(1402.0, 5.0, 4.0)));
        let base = date(1402.0, 5.0, 3.0);
        assert_eq!(base.compare(&later).unwrap(), -1.0);
        assert_eq!(base.compare(&Value::from(json!({"year": 1401, "month": 12, "day": 29}))).unwrap(), 1.0);
        assert_eq!(base.compare(&Value::Date(Arc::new(base.clone()))).unwrap(), 0.0);
        assert!(base.compare(&Value::Undefined).is_err());
    }

    #[test]
    fn test_convert_dates_by_key_suffix() {
        let data = Value::from(json!({
            "publishDate": {"year": 1402, "month": 1, "day": 2},
            "date": {"year": 1401, "month": 3, "day": 4},
            "title": "unchanged",
            "updateDate": "not an object",
            "posts": [{"createdDATE": {"year": 1, "month": 1, "day": 1}}],
            "nested": {"eventDate": {"year": 1300, "month": 7, "day": 8}}
        }));
        let data = convert_dates(data);

        assert!(matches!(data.field("publishDate"), Some(Value::Date(_))));
        assert!(matches!(data.field("date"), Some(Value::Date(_))));
        assert_eq!(data.field("title"), Some(&Value::from("unchanged")));
        assert_eq!(data.field("updateDate"), Some(&Value::from("not an object")));
        assert!(matches!(
            data.field("nested").and_then(|n| n.field("eventDate")),
            Some(Value::Date(_))
        ));
        let Some(Value::Array(posts)) = data.field("posts") else {
            panic!("posts should stay an array");
        };
        assert!(matches!(posts[0].field("createdDATE"), Some(Value::Date(_))));
    }

    #[test]
    fn test_persian_digits() {
        assert_eq!(to_persian_digits("a1b90"), "a۱b۹۰");
    }
}
