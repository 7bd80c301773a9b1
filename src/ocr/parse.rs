//! Turning recognized text into field values.
//!
//! Recognition output is noisy: decimal points go missing, `7` reads as `1`,
//! `O` stands in for `0`. Every parser here either returns a plausible value
//! or a `ParseError`, which the sampler treats as "no reading this tick".

use regex::Regex;

use crate::error::ParseError;

/// Float-like token, `.` or `,` as separator.
const FLOAT_PATTERN: &str = r"\d+(?:[.,]\d+)?";

/// "Name Lv 12", tolerating `|v`, `1v` and `Iv` for the level marker.
const NAME_LEVEL_PATTERN: &str = r"^(.*?)\s*[L|1I]\s*[vV]\s*([0-9]{1,3})\b";

/// "current/max" with `/` or `|` between the numbers.
const HP_PATTERN: &str = r"(\d[\d.,]*)\s*[/|]\s*(\d[\d.,]*)";

/// Percentages are displayed with four decimals.
const IMPLIED_DECIMALS: f64 = 10_000.0;

fn compile(pattern: &str) -> Result<Regex, ParseError> {
    Regex::new(pattern).map_err(|e| ParseError::Pattern(e.to_string()))
}

/// Collapses runs of whitespace to a single space and trims.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Repairs digit confusions around the decimal boundary of a percentage.
///
/// With a separator present, `7.1` becomes `7.7` and a `5`/`9` pair across
/// the separator becomes the leading digit twice. Without one, the same rule
/// is applied at the implied boundary of a 5-7 digit run (four decimals).
pub fn fix_ocr_confusions(text: &str) -> String {
    if text.chars().count() < 5 {
        return text.to_string();
    }

    let normalized: String = text.replace(',', ".").replace(' ', "");
    let mut chars: Vec<char> = normalized.chars().collect();

    if let Some(dot) = chars.iter().position(|&c| c == '.') {
        if dot > 0 && dot + 1 < chars.len() {
            repair_pair(&mut chars, dot - 1, dot + 1);
        }
        return chars.into_iter().collect();
    }

    let mut digits: Vec<char> = chars.iter().copied().filter(char::is_ascii_digit).collect();
    if (5..=7).contains(&digits.len()) {
        let boundary = digits.len() - 5;
        repair_pair(&mut digits, boundary, boundary + 1);
        return digits.into_iter().collect();
    }

    chars.into_iter().collect()
}

fn repair_pair(chars: &mut [char], before: usize, after: usize) {
    let (b, a) = (chars[before], chars[after]);
    if b == '7' && a == '1' {
        chars[after] = '7';
    } else if matches!(b, '5' | '9') && matches!(a, '5' | '9') && b != a {
        chars[after] = b;
    }
}

/// Parses an experience percentage in `[0, 100]`.
///
/// Every float-like token is a candidate; a 5-7 digit token without a
/// separator is read with four implied decimals (`850000` is `85.0`). The
/// most frequent candidate wins, first seen on ties.
pub fn parse_exp_percent(text: &str) -> Result<f64, ParseError> {
    let compact: String = text.trim().chars().filter(|c| !c.is_whitespace()).collect();
    let fixed = fix_ocr_confusions(&compact)
        .replace(['O', 'o'], "0")
        .replace(',', ".")
        .replace('%', "");

    let float_re = compile(FLOAT_PATTERN)?;
    let mut candidates: Vec<(f64, usize)> = Vec::new();

    for token in float_re.find_iter(&fixed).map(|m| m.as_str()) {
        let value = if !token.contains('.') && (5..=7).contains(&token.len()) {
            token.parse::<f64>().ok().map(|v| v / IMPLIED_DECIMALS)
        } else {
            token.parse::<f64>().ok()
        };

        let Some(value) = value.filter(|v| (0.0..=100.0).contains(v)) else {
            continue;
        };
        match candidates.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => candidates.push((value, 1)),
        }
    }

    let mut best: Option<(f64, usize)> = None;
    for (value, count) in candidates {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v).ok_or_else(|| ParseError::NoMatch {
        expected: "percentage",
        raw: text.to_string(),
    })
}

/// Reads an experience percentage from a worker response, preferring the
/// worker's structured value when it is a number in `[0, 100]`.
pub fn exp_from_response(raw: &str, value: Option<&str>) -> Result<f64, ParseError> {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        if let Ok(n) = v.replace(',', ".").parse::<f64>() {
            if (0.0..=100.0).contains(&n) {
                return Ok(n);
            }
        }
    }
    parse_exp_percent(raw)
}

/// Character name and level read from one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameLevel {
    pub name: Option<String>,
    pub level: Option<u32>,
}

/// Splits "Name Lv 12" into name and level.
///
/// Without a level marker the whole text is taken as the name.
pub fn parse_name_level(text: &str) -> Result<NameLevel, ParseError> {
    let s = normalize_whitespace(text);
    if s.is_empty() {
        return Err(ParseError::NoMatch {
            expected: "name",
            raw: text.to_string(),
        });
    }

    let re = compile(NAME_LEVEL_PATTERN)?;
    let Some(caps) = re.captures(&s) else {
        return Ok(NameLevel {
            name: Some(s),
            level: None,
        });
    };

    let name = caps
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|n| !n.is_empty());
    let level = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
    Ok(NameLevel { name, level })
}

/// Parses a level from digits only, accepted in `1..=999`.
pub fn parse_level(text: &str) -> Result<u32, ParseError> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(ParseError::NoMatch {
            expected: "level",
            raw: text.to_string(),
        });
    }

    let out_of_range = |value: f64| ParseError::OutOfRange {
        value,
        min: 1.0,
        max: 999.0,
    };
    if digits.len() > 3 {
        return Err(out_of_range(digits.parse::<f64>().unwrap_or(f64::INFINITY)));
    }
    match digits.parse::<u32>() {
        Ok(level) if (1..=999).contains(&level) => Ok(level),
        Ok(level) => Err(out_of_range(level as f64)),
        Err(_) => Err(out_of_range(f64::NAN)),
    }
}

/// Reformats "current / max" as `current/max`; other text is returned trimmed.
pub fn parse_hp(text: &str) -> Result<String, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::NoMatch {
            expected: "hp",
            raw: text.to_string(),
        });
    }
    let re = compile(HP_PATTERN)?;
    Ok(match re.captures(trimmed) {
        Some(caps) => format!("{}/{}", &caps[1], &caps[2]),
        None => trimmed.to_string(),
    })
}

/// Free text such as a scrolling message or an enemy name.
pub fn parse_text(text: &str) -> Result<String, ParseError> {
    let s = normalize_whitespace(text);
    if s.is_empty() {
        return Err(ParseError::NoMatch {
            expected: "text",
            raw: text.to_string(),
        });
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_fix_confusions_with_separator() {
        assert_eq!(fix_ocr_confusions("17.1234"), "17.7234");
        assert_eq!(fix_ocr_confusions("55.9123"), "55.5123");
        assert_eq!(fix_ocr_confusions("99.5123"), "99.9123");
        assert_eq!(fix_ocr_confusions("42,1234"), "42.1234");
        assert_eq!(fix_ocr_confusions("42.5000"), "42.5000");
    }

    #[test]
    fn test_fix_confusions_without_separator() {
        // 6 digits: boundary between index 1 and 2
        assert_eq!(fix_ocr_confusions("171234"), "177234");
        assert_eq!(fix_ocr_confusions("59123"), "55123");
        assert_eq!(fix_ocr_confusions("12%"), "12%");
    }

    #[test]
    fn test_parse_exp_percent() {
        assert!(approx(parse_exp_percent("85.0000%").unwrap(), 85.0));
        assert!(approx(parse_exp_percent(" 47,1234 % ").unwrap(), 47.7234));
        assert!(approx(parse_exp_percent("850000").unwrap(), 85.0));
        assert!(approx(parse_exp_percent("3O.5000").unwrap(), 30.5));
    }

    #[test]
    fn test_parse_exp_percent_most_common() {
        let v = parse_exp_percent("12.5%/40.25%/12.5%").unwrap();
        assert!(approx(v, 12.5));
    }

    #[test]
    fn test_parse_exp_percent_rejects_out_of_range() {
        assert!(parse_exp_percent("1234567").is_err());
        assert!(parse_exp_percent("").is_err());
        assert!(parse_exp_percent("EXP").is_err());
    }

    #[test]
    fn test_exp_prefers_structured_value() {
        assert!(approx(exp_from_response("garbage", Some("75.0000")).unwrap(), 75.0));
        assert!(approx(exp_from_response("61.2500%", Some("  ")).unwrap(), 61.25));
        assert!(approx(exp_from_response("61.2500%", Some("n/a")).unwrap(), 61.25));
    }

    #[test]
    fn test_exp_out_of_range_structured_value_falls_back_to_raw() {
        assert!(approx(exp_from_response("42.5000%", Some("850000")).unwrap(), 42.5));
        assert!(approx(exp_from_response("42.5000%", Some("-3")).unwrap(), 42.5));
        assert!(approx(exp_from_response("42.5000%", Some("inf")).unwrap(), 42.5));
        assert!(approx(exp_from_response("0.0000%", Some("100")).unwrap(), 100.0));
        assert!(exp_from_response("", Some("850000")).is_err());
    }

    #[test]
    fn test_parse_name_level() {
        let nl = parse_name_level("Aria  Lv 12").unwrap();
        assert_eq!(nl.name.as_deref(), Some("Aria"));
        assert_eq!(nl.level, Some(12));

        let nl = parse_name_level("Aria L v7").unwrap();
        assert_eq!(nl.level, Some(7));

        let nl = parse_name_level("Aria\nLV120").unwrap();
        assert_eq!(nl.name.as_deref(), Some("Aria"));
        assert_eq!(nl.level, Some(120));
    }

    #[test]
    fn test_parse_name_level_noisy_marker() {
        assert_eq!(parse_name_level("Aria |v 33").unwrap().level, Some(33));
        assert_eq!(parse_name_level("Aria Iv 33").unwrap().level, Some(33));
        assert_eq!(parse_name_level("Aria 1v 33").unwrap().level, Some(33));
    }

    #[test]
    fn test_parse_name_level_without_marker() {
        let nl = parse_name_level("  Aria  ").unwrap();
        assert_eq!(nl.name.as_deref(), Some("Aria"));
        assert_eq!(nl.level, None);
        assert!(parse_name_level("   ").is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("Lv. 57"), Ok(57));
        assert_eq!(parse_level("999"), Ok(999));
        assert!(matches!(parse_level("0"), Err(ParseError::OutOfRange { .. })));
        assert!(matches!(parse_level("1200"), Err(ParseError::OutOfRange { .. })));
        assert!(matches!(parse_level("--"), Err(ParseError::NoMatch { .. })));
    }

    #[test]
    fn test_parse_hp() {
        assert_eq!(parse_hp("1,200 / 3,400").unwrap(), "1,200/3,400");
        assert_eq!(parse_hp("50|100").unwrap(), "50/100");
        assert_eq!(parse_hp(" dead ").unwrap(), "dead");
        assert!(parse_hp("").is_err());
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(parse_text("  Giant\n Rat ").unwrap(), "Giant Rat");
        assert!(parse_text("\n").is_err());
    }
}
