//! Numeric view of operand strings: decimals, percentages and
//! "number + unit" forms. Time units are denominated in months so that
//! "24小时", "1天" and "1/30月" compare equal.

use lazy_static::lazy_static;
use regex::Regex;

use crate::numerals::cn2digit;

/// Absolute tolerance for value equality.
pub const ABS_TOL: f64 = 0.01;

lazy_static! {
    static ref P_VALUE_RATE: Regex = Regex::new(r"([+-]?[0-9.]+)%").unwrap();
    static ref P_CN_RATE: Regex = Regex::new(r"百分之(.*)$").unwrap();
    static ref P_UNIT: Regex = Regex::new(
        r"(?P<number>[-+]?[0-9一二三四五六七八九十百千万亿零〇.,]+)\s*(?P<unit>年|月|天|日|周|个|人|个?小时|分钟?|秒|时|h|H|(?:人民币)?元(?:/股)?|.*?)?$"
    )
    .unwrap();
    static ref P_NUMBER_UNIT: Regex =
        Regex::new(r"(?P<number>[-+]?[0-9.,]+)\s*(?P<unit>[十百千万亿]+)?").unwrap();
    static ref P_IS_NUMBER: Regex = Regex::new(r"^[+-]?[0-9.]+$").unwrap();
}

fn unit_rate(unit: &str) -> Option<f64> {
    let rate = match unit {
        "年" => 12.0,
        "月" => 1.0,
        "日" | "天" => 1.0 / 30.0,
        "周" => 1.0 / 4.0,
        "小时" | "个小时" | "时" | "h" | "H" => 1.0 / 720.0,
        "分" | "分钟" => 1.0 / 60.0,
        "秒" => 1.0 / 3600.0,
        "万" | "萬" => 10_000.0,
        "亿" | "億" => 100_000_000.0,
        "千" | "仟" => 1000.0,
        "百" | "佰" => 100.0,
        "十" | "拾" => 10.0,
        _ => return None,
    };
    Some(rate)
}

fn convert_number(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    value.parse().ok()
}

fn convert_rate(value: &str) -> Option<f64> {
    if let Some(caps) = P_VALUE_RATE.captures(value) {
        return Some(caps[1].parse::<f64>().ok()? / 100.0);
    }
    let caps = P_CN_RATE.captures(value)?;
    Some(cn2digit(&caps[1])? / 100.0)
}

fn convert_unit(value: &str) -> Option<f64> {
    let caps = P_UNIT.captures(value)?;
    let raw = caps.name("number")?.as_str().replace(',', "");

    // split the numeric prefix from 十百千万亿 multipliers
    let mut number = match P_NUMBER_UNIT.captures(&raw) {
        Some(inner) => {
            let mut number = convert_number(inner.name("number")?.as_str())?;
            if let Some(multipliers) = inner.name("unit") {
                for c in multipliers.as_str().chars() {
                    if let Some(rate) = unit_rate(&c.to_string()) {
                        number *= rate;
                    }
                }
            }
            number
        }
        None => cn2digit(&raw)?,
    };
    if let Some(rate) = caps.name("unit").and_then(|m| unit_rate(m.as_str())) {
        number *= rate;
    }
    Some(number)
}

/// Resolve a raw operand string to a number. Resolution order: plain
/// decimal, percentage, then number with unit.
pub fn number(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    let value = value.replace(',', "");
    convert_number(&value)
        .or_else(|| convert_rate(&value))
        .or_else(|| convert_unit(&value))
}

pub fn is_number(value: Option<&str>) -> bool {
    match value {
        Some(text) if !text.is_empty() => P_IS_NUMBER.is_match(text),
        _ => false,
    }
}

pub fn is_rate(value: Option<&str>) -> bool {
    match value {
        Some(text) => text.contains('%') || text.contains("百分之"),
        None => false,
    }
}

/// Numeric equality with absolute tolerance [`ABS_TOL`].
pub fn numbers_close(left: f64, right: f64) -> bool {
    (left - right).abs() <= ABS_TOL.max(1e-9 * left.abs().max(right.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(number("24"), Some(24.0));
        assert_eq!(number("-3.5"), Some(-3.5));
        assert_eq!(number("1,000"), Some(1000.0));
        assert_eq!(number(""), None);
        assert_eq!(number("基金"), None);
    }

    #[test]
    fn test_rates() {
        assert_eq!(number("20%"), Some(0.2));
        assert_eq!(number("百分之二十"), Some(0.2));
        assert!(is_rate(Some("20%")));
        assert!(is_rate(Some("百分之二十")));
        assert!(!is_rate(Some("20")));
    }

    #[test]
    fn test_time_units_reduce_to_months() {
        let day = number("1天").unwrap();
        let hours = number("24小时").unwrap();
        assert!(numbers_close(day, hours));
        assert_eq!(number("1年"), Some(12.0));
        assert_eq!(number("6个月"), Some(6.0));
        assert_eq!(number("2周"), Some(0.5));
    }

    #[test]
    fn test_amount_units() {
        assert_eq!(number("1万"), Some(10_000.0));
        assert_eq!(number("3.5亿元"), Some(350_000_000.0));
        assert_eq!(number("1000万元"), Some(10_000_000.0));
        assert_eq!(number("六亿五千万元"), Some(650_000_000.0));
    }

    #[test]
    fn test_is_number() {
        assert!(is_number(Some("24")));
        assert!(is_number(Some("-3.5")));
        assert!(!is_number(Some("24小时")));
        assert!(!is_number(Some("")));
        assert!(!is_number(None));
    }

    #[test]
    fn test_numbers_close_tolerance() {
        assert!(numbers_close(24.004, 24.0));
        assert!(!numbers_close(24.02, 24.0));
    }
}
