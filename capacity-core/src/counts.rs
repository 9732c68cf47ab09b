//! Delimited daily-count strings (`"12|15|NODATA|9"`).

/// One day's value; `None` marks a day with no data.
pub type DailyCount = Option<u64>;

/// Parse one token the way the model output is written.
///
/// Leading whitespace and an optional sign are accepted, then the leading
/// digits are read and anything after them is ignored (`"12.5"` is 12).
/// Tokens without digits, or with a negative value, are no-data.
pub fn parse_count(token: &str) -> DailyCount {
    let trimmed = token.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let digits = &unsigned[..digits_end];
    if digits.is_empty() {
        return None;
    }

    let value = digits.parse::<u64>().ok()?;
    if negative && value > 0 {
        None
    } else {
        Some(value)
    }
}

/// Split a raw counts string into one value per token.
pub fn split_counts(raw: &str, separator: char) -> Vec<DailyCount> {
    raw.split(separator).map(parse_count).collect()
}

/// Split a counts string and pad it with no-data up to `days` entries.
///
/// Longer series are kept whole.
pub fn parse_counts(raw: &str, separator: char, days: usize) -> Vec<DailyCount> {
    let mut counts = split_counts(raw, separator);
    if counts.len() < days {
        counts.resize(days, None);
    }
    counts
}

/// Write counts back in the delimited form; no-data days become empty tokens.
pub fn join_counts(counts: &[DailyCount], separator: char) -> String {
    counts
        .iter()
        .map(|count| count.map(|value| value.to_string()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_and_negative_tokens_are_no_data() {
        assert_eq!(parse_count("10"), Some(10));
        assert_eq!(parse_count(" 7 "), Some(7));
        assert_eq!(parse_count("0"), Some(0));
        assert_eq!(parse_count("-0"), Some(0));
        assert_eq!(parse_count("12.9"), Some(12));
        assert_eq!(parse_count("x"), None);
        assert_eq!(parse_count("NODATA"), None);
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("-4"), None);
        assert_eq!(parse_count("-"), None);
    }

    #[test]
    fn short_series_are_padded_with_no_data() {
        let counts = parse_counts("10|20", '|', 5);
        assert_eq!(counts, vec![Some(10), Some(20), None, None, None]);

        let long = parse_counts("1|2|3|4", '|', 2);
        assert_eq!(long, vec![Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn joined_counts_parse_back_to_the_same_sequence() {
        let raw = "10|20|x|0|-3|8";
        let counts = split_counts(raw, '|');
        let joined = join_counts(&counts, '|');

        assert_eq!(joined, "10|20||0||8");
        assert_eq!(split_counts(&joined, '|'), counts);
    }
}
