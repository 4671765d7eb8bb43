use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Filename dates at or before this year are treated as noise (serial numbers,
/// resolutions, counters).
pub const MIN_PLAUSIBLE_YEAR: i32 = 1950;

/// How much of a date a pattern pins down. Rules are tried tier by tier,
/// most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Date and time of day, e.g. `IMG_20190509_154733`
    DateTime,
    /// Year, month and day with a shared separator (or none)
    FullDate,
    YearMonth,
    /// A single token: compact 8-digit dates, month-name dates, a bare year
    SingleToken,
}

pub struct PatternRule {
    pub tier: Tier,
    pub regex: Regex,
    /// Tried in order against the captured groups joined by single spaces.
    pub formats: &'static [&'static str],
}

const SEPARATORS: &[&str] = &["-", "_", r"\.", ""];
const MONTHS: &str = "jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec";

static RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(build_rules);

fn rule(tier: Tier, body: &str, formats: &'static [&'static str]) -> PatternRule {
    // Digit boundaries are checked by `bounded_matches`, not in the pattern,
    // so neighbouring candidates can share a separator.
    let pattern = format!(r"(?i){}", body);
    PatternRule {
        tier,
        regex: Regex::new(&pattern).unwrap(),
        formats,
    }
}

fn build_rules() -> Vec<PatternRule> {
    let mut rules = vec![rule(
        Tier::DateTime,
        r"(\d{4})[-_.]?(\d{2})[-_.]?(\d{2})[-_ T]?(\d{2})[-_.:]?(\d{2})[-_.:]?(\d{2})(?:\d{3})?",
        &["%Y %m %d %H %M %S"],
    )];

    for sep in SEPARATORS {
        rules.push(rule(
            Tier::FullDate,
            &format!(r"(\d{{4}}){sep}(\d{{2}}){sep}(\d{{2}})"),
            &["%Y %m %d"],
        ));
    }
    for sep in SEPARATORS {
        rules.push(rule(
            Tier::FullDate,
            &format!(r"(\d{{2}}){sep}(\d{{2}}){sep}(\d{{4}})"),
            &["%d %m %Y", "%m %d %Y"],
        ));
    }
    for sep in SEPARATORS {
        rules.push(rule(
            Tier::FullDate,
            &format!(r"(\d{{2}}){sep}(\d{{2}}){sep}(\d{{2}})"),
            &["%d %m %y", "%y %m %d", "%m %d %y"],
        ));
    }

    // A separator-less year-month would just be a six digit run, which the
    // two-digit-year forms above already cover.
    for sep in SEPARATORS.iter().filter(|s| !s.is_empty()) {
        rules.push(rule(
            Tier::YearMonth,
            &format!(r"(\d{{4}}){sep}(\d{{2}})"),
            &["%Y %m"],
        ));
        rules.push(rule(
            Tier::YearMonth,
            &format!(r"(\d{{2}}){sep}(\d{{4}})"),
            &["%m %Y"],
        ));
    }

    rules.push(rule(
        Tier::SingleToken,
        r"(\d{8})",
        &["%Y%m%d", "%d%m%Y", "%m%d%Y"],
    ));
    rules.push(rule(
        Tier::SingleToken,
        &format!(r"(\d{{4}})[\s_.-]*({MONTHS})[a-z]*[\s_.-]*(\d{{1,2}})"),
        &["%Y %b %d"],
    ));
    rules.push(rule(
        Tier::SingleToken,
        &format!(r"(\d{{1,2}})[\s_.-]*({MONTHS})[a-z]*[\s_.-]*(\d{{4}})"),
        &["%d %b %Y"],
    ));
    rules.push(rule(Tier::SingleToken, r"(\d{4})", &["%Y"]));

    // Stable: keeps the declaration order inside each tier.
    rules.sort_by_key(|r| r.tier);
    rules
}

/// The pattern table in the order it is tried.
pub fn rules() -> &'static [PatternRule] {
    &RULES
}

/// Guess a date from a filename (or relative path) against the current clock.
pub fn guess_date_from_filename(text: &str) -> Option<NaiveDateTime> {
    guess_date_at(text, Local::now().naive_local())
}

/// Guess a date from `text`, accepting only dates after [`MIN_PLAUSIBLE_YEAR`]
/// and strictly before `now`. A rule whose matches are all implausible does
/// not stop the search; the next rule gets its turn.
pub fn guess_date_at(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    for rule in rules() {
        for caps in bounded_matches(&rule.regex, text) {
            let joined = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str().to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(" ");

            for format in rule.formats {
                let Some(dt) = parse_candidate(&joined, format) else {
                    continue;
                };
                if is_plausible(dt, now) {
                    log::debug!("{:?} rule matched {:?} in {} -> {}", rule.tier, joined, text, dt);
                    return Some(dt);
                }
            }
        }
    }

    None
}

/// Every match of `regex` in `text` that is not part of a longer digit run.
/// After each candidate the search resumes one character past its start, so
/// overlapping candidates are all seen.
fn bounded_matches<'t>(regex: &'t Regex, text: &'t str) -> impl Iterator<Item = Captures<'t>> + 't {
    let mut start = 0;
    std::iter::from_fn(move || {
        while let Some(caps) = regex.captures_at(text, start) {
            let whole = caps.get(0)?;
            start = whole.start() + text[whole.start()..].chars().next().map_or(1, char::len_utf8);
            if digit_bounded(text, whole.start(), whole.end()) {
                return Some(caps);
            }
        }
        None
    })
}

fn digit_bounded(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let digit_before = start > 0 && bytes[start - 1].is_ascii_digit();
    let digit_after = bytes.get(end).is_some_and(u8::is_ascii_digit);
    !digit_before && !digit_after
}

fn is_plausible(dt: NaiveDateTime, now: NaiveDateTime) -> bool {
    dt.year() > MIN_PLAUSIBLE_YEAR && dt < now
}

fn parse_candidate(text: &str, format: &str) -> Option<NaiveDateTime> {
    if format.contains("%H") {
        return NaiveDateTime::parse_from_str(text, format).ok();
    }

    // Partial dates land on the first month / first day.
    let mut text = text.to_string();
    let mut format = format.to_string();
    if !format.contains("%m") && !format.contains("%b") {
        text.push_str(" 1");
        format.push_str(" %m");
    }
    if !format.contains("%d") {
        text.push_str(" 1");
        format.push_str(" %d");
    }

    NaiveDate::parse_from_str(&text, &format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    #[test]
    fn test_known_filenames() {
        assert_eq!(guess_date_at("31122016-_DSC4310.jpg", now()), day(2016, 12, 31));
        assert_eq!(guess_date_at("photo_2023-05-09.jpg", now()), day(2023, 5, 9));
        assert_eq!(guess_date_at("document_09-05-2023.pdf", now()), day(2023, 5, 9));
        assert_eq!(guess_date_at("event_20230509.png", now()), day(2023, 5, 9));
        assert_eq!(guess_date_at("Cesaraugusto05052014-2.jpg", now()), day(2014, 5, 5));
        assert_eq!(guess_date_at("random_file_name.jpg", now()), None);
    }

    #[test]
    fn test_time_of_day_patterns() {
        let expected = NaiveDate::from_ymd_opt(2019, 5, 9)
            .unwrap()
            .and_hms_opt(15, 47, 33);
        assert_eq!(guess_date_at("IMG_20190509_154733.jpg", now()), expected);
        assert_eq!(guess_date_at("Screenshot_20190509-154733.png", now()), expected);
        assert_eq!(guess_date_at("signal-2019-05-09-154733.jpg", now()), expected);
        assert_eq!(guess_date_at("2019_05_09_15_47_33.mp4", now()), expected);
    }

    #[test]
    fn test_full_date_beats_bare_year() {
        assert_eq!(guess_date_at("IMG_1234_2019-03-04.jpg", now()), day(2019, 3, 4));
        assert_eq!(guess_date_at("2015_party_2019.03.04.jpg", now()), day(2019, 3, 4));
    }

    #[test]
    fn test_plausibility_bounds() {
        assert_eq!(guess_date_at("scan_1949.jpg", now()), None);
        assert_eq!(guess_date_at("scan_1950.jpg", now()), None);
        assert_eq!(guess_date_at("scan_1951.jpg", now()), day(1951, 1, 1));
        assert_eq!(guess_date_at("DSC4310.jpg", now()), None);
        assert_eq!(guess_date_at("photo_2030-01-01.jpg", now()), None);
        // Intended: the full date (tomorrow) is rejected, and the year-month
        // reading of the same text is a valid, earlier date that wins.
        assert_eq!(guess_date_at("photo_2024-06-02.jpg", now()), day(2024, 6, 1));
    }

    #[test]
    fn test_implausible_match_does_not_block_later_rules() {
        assert_eq!(guess_date_at("1901-01-01_trip_2018.jpg", now()), day(2018, 1, 1));
    }

    #[test]
    fn test_candidates_sharing_a_separator() {
        assert_eq!(guess_date_at("IMG_1234_2019.jpg", now()), day(2019, 1, 1));
        assert_eq!(guess_date_at("DSC_0042_2019.jpg", now()), day(2019, 1, 1));
        assert_eq!(guess_date_at("1901_2018.jpg", now()), day(2018, 1, 1));
        assert_eq!(guess_date_at("1234__2019.jpg", now()), day(2019, 1, 1));
        assert_eq!(guess_date_at("IMG_12345.jpg", now()), None);
    }

    #[test]
    fn test_compact_date_time() {
        let expected = NaiveDate::from_ymd_opt(2019, 5, 9)
            .unwrap()
            .and_hms_opt(15, 47, 33);
        assert_eq!(guess_date_at("20190509154733.jpg", now()), expected);
        assert_eq!(guess_date_at("PXL_20190509154733123.jpg", now()), expected);
        assert_eq!(guess_date_at("IMG20190509154733.jpg", now()), expected);
    }

    #[test]
    fn test_guess_against_current_clock() {
        assert_eq!(guess_date_from_filename("photo_2023-05-09.jpg"), day(2023, 5, 9));
        assert_eq!(guess_date_from_filename("random_file_name.jpg"), None);
    }

    #[test]
    fn test_month_names() {
        assert_eq!(guess_date_at("Trip 2019 May 05.jpg", now()), day(2019, 5, 5));
        assert_eq!(guess_date_at("party_05-DECEMBER-2018.mov", now()), day(2018, 12, 5));
    }

    #[test]
    fn test_partial_dates() {
        assert_eq!(guess_date_at("holiday_2017-08.jpg", now()), day(2017, 8, 1));
        assert_eq!(guess_date_at("clip_31.12.99.mp4", now()), day(1999, 12, 31));
    }

    #[test]
    fn test_relative_path_text() {
        assert_eq!(guess_date_at("2016/summer/IMG_0042.jpg", now()), day(2016, 1, 1));
        assert_eq!(guess_date_at("trips/2016-07-14/IMG_0042.jpg", now()), day(2016, 7, 14));
    }

    #[test]
    fn test_rules_ordered_by_tier() {
        let table = rules();
        assert!(table.windows(2).all(|w| w[0].tier <= w[1].tier));
        assert_eq!(table.first().map(|r| r.tier), Some(Tier::DateTime));
        assert_eq!(table.last().map(|r| r.tier), Some(Tier::SingleToken));

        let full_dates = table.iter().filter(|r| r.tier == Tier::FullDate).count();
        assert_eq!(full_dates, SEPARATORS.len() * 3);
    }
}
