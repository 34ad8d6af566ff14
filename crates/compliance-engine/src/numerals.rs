//! Chinese numeral conversion, both directions.
//!
//! `cn2digit` accepts mixed Arabic/Chinese forms ("1万", "六亿五千万",
//! "十三") including capital bookkeeping numerals; `number2chinese`
//! renders integers back ("第三章", "仅匹配到两条…").

use lazy_static::lazy_static;
use regex::Regex;

use crate::text::clean;

const CN_RATE: [(u64, char); 6] = [
    (10, '十'),
    (100, '百'),
    (1000, '千'),
    (10_000, '万'),
    (100_000_000, '亿'),
    (1_000_000_000_000, '兆'),
];

const CN_NUM: [char; 10] = ['〇', '一', '二', '三', '四', '五', '六', '七', '八', '九'];

lazy_static! {
    static ref P_NUMBER_IGNORE: Regex = Regex::new(r"([,，【】\[\]]|人民币|RMB)").unwrap();
    static ref P_CN_NUMBER: Regex = Regex::new(
        r"(?P<number>[零〇ΟOo壹贰叁肆伍陆柒捌玖拾佰仟萬億0-9两一二三四五六七八九十百千万亿]+(?:[.．][零〇ΟOo壹贰叁肆伍陆柒捌玖拾佰仟萬億0-9两一二三四五六七八九十百千万亿]+)?)"
    )
    .unwrap();
    static ref P_LEADING_DIGITS: Regex = Regex::new(r"^\d+(?:\.\d*)?").unwrap();
}

fn digit_value(c: char) -> Option<u64> {
    match c {
        '零' | '〇' | 'Ο' | 'O' | 'o' => Some(0),
        '一' => Some(1),
        '二' | '两' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    }
}

fn unit_value(c: char) -> Option<u64> {
    match c {
        '十' => Some(10),
        '百' => Some(100),
        '千' => Some(1000),
        _ => None,
    }
}

fn fold_capital(c: char) -> char {
    match c {
        '壹' | '幺' => '一',
        '贰' => '二',
        '叁' => '三',
        '肆' => '四',
        '伍' => '五',
        '陆' => '六',
        '柒' => '七',
        '捌' => '八',
        '玖' => '九',
        '拾' => '十',
        '佰' => '百',
        '仟' => '千',
        '萬' => '万',
        '億' => '亿',
        '．' => '.',
        _ => c,
    }
}

/// Convert a Chinese/mixed numeral string to a number. Returns None when
/// no numeral is present.
pub fn cn2digit(text: &str) -> Option<f64> {
    let text = clean(text);
    let text = P_NUMBER_IGNORE.replace_all(&text, "");
    let caps = P_CN_NUMBER.captures(&text)?;
    let chars: Vec<char> = caps["number"].chars().map(fold_capital).collect();

    // keep only the first decimal point
    let mut normalized = String::new();
    let mut seen_dot = false;
    for c in &chars {
        if *c == '.' {
            if seen_dot {
                continue;
            }
            seen_dot = true;
        }
        normalized.push(*c);
    }

    let mut number: f64 = 0.0;
    let rest = match P_LEADING_DIGITS.find(&normalized) {
        Some(matched) => {
            number = matched.as_str().parse().ok()?;
            normalized[matched.end()..].to_string()
        }
        None => normalized,
    };

    let rest_chars: Vec<char> = rest.chars().collect();
    if rest_chars.len() == 1 {
        let c = rest_chars[0];
        if let Some(digit) = digit_value(c) {
            return Some(digit as f64);
        }
        if let Some(unit) = unit_value(c) {
            return Some(if number != 0.0 { unit as f64 * number } else { unit as f64 });
        }
        if c == '万' {
            return Some(if number != 0.0 { number * 1e4 } else { 1e4 });
        }
        if c == '亿' {
            return Some(if number != 0.0 { number * 1e8 } else { 1e8 });
        }
        return if number != 0.0 || !rest.is_empty() { Some(number) } else { None };
    }

    let mut temp: f64 = 0.0;
    let mut temp_num: f64 = 0.0;
    for c in rest_chars {
        if c == '零' || c == '〇' {
            continue;
        }
        if let Some(digit) = digit_value(c) {
            temp_num = digit as f64;
        } else if let Some(unit) = unit_value(c) {
            if temp_num == 0.0 {
                temp += unit as f64;
            } else {
                temp += temp_num * unit as f64;
            }
            temp_num = 0.0;
        } else if c == '亿' {
            temp += temp_num;
            number += temp;
            number *= 1e8;
            temp = 0.0;
            temp_num = 0.0;
        } else if c == '万' {
            temp += temp_num;
            if temp == 0.0 {
                if number != 0.0 {
                    // 十万万
                    number *= 1e4;
                } else {
                    // 万元
                    number += 1e4;
                }
            } else {
                number += temp * 1e4;
            }
            temp = 0.0;
            temp_num = 0.0;
        }
    }
    Some(number + temp + temp_num)
}

fn number2chinese_inner(number: u64) -> String {
    if number < 10 {
        return CN_NUM[number as usize].to_string();
    }
    let mut text = String::new();
    for (rate, rate_char) in CN_RATE.iter().rev() {
        if number >= *rate {
            let quotient = number / rate;
            let remainder = number % rate;
            text.push_str(&number2chinese_inner(quotient));
            text.push(*rate_char);
            if remainder != 0 {
                let digits = number.to_string();
                let quotient_len = quotient.to_string().len();
                if digits[quotient_len..].starts_with('0') {
                    text.push(CN_NUM[0]);
                }
                text.push_str(&number2chinese_inner(remainder));
            }
            break;
        }
    }
    text
}

/// Render an integer as Chinese numerals, eliding the leading 一 of 一十.
pub fn number2chinese(number: u64) -> String {
    let text = number2chinese_inner(number);
    match text.strip_prefix("一十") {
        Some(rest) => format!("十{}", rest),
        None => text,
    }
}
