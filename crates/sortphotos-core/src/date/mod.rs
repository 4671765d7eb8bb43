pub mod guess;

use chrono::NaiveDateTime;

/// Which input supplied the resolved date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    Metadata,
    Filename,
}

/// Outcome of combining the metadata date and the filename date of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Dated {
        date: NaiveDateTime,
        source: DateSource,
    },
    /// The earliest candidate lies after `now`; the file must not be placed.
    Future(NaiveDateTime),
    Undated,
}

/// Pick the earliest of the available dates. The oldest timestamp found is
/// the best guess for the capture time; a result later than `now` is
/// rejected rather than clamped.
pub fn resolve(
    metadata_date: Option<NaiveDateTime>,
    filename_date: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Resolution {
    let earliest = match (metadata_date, filename_date) {
        (Some(m), Some(f)) if f < m => Some((f, DateSource::Filename)),
        (Some(m), _) => Some((m, DateSource::Metadata)),
        (None, Some(f)) => Some((f, DateSource::Filename)),
        (None, None) => None,
    };

    match earliest {
        Some((date, _)) if date > now => Resolution::Future(date),
        Some((date, source)) => Resolution::Dated { date, source },
        None => Resolution::Undated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_earliest_source_wins() {
        let now = at(2024, 1, 1);
        assert_eq!(
            resolve(Some(at(2020, 5, 1)), Some(at(2019, 11, 3)), now),
            Resolution::Dated { date: at(2019, 11, 3), source: DateSource::Filename }
        );
        assert_eq!(
            resolve(Some(at(2018, 5, 1)), Some(at(2019, 11, 3)), now),
            Resolution::Dated { date: at(2018, 5, 1), source: DateSource::Metadata }
        );
    }

    #[test]
    fn test_single_source() {
        let now = at(2024, 1, 1);
        assert_eq!(
            resolve(Some(at(2020, 5, 1)), None, now),
            Resolution::Dated { date: at(2020, 5, 1), source: DateSource::Metadata }
        );
        assert_eq!(
            resolve(None, Some(at(2019, 11, 3)), now),
            Resolution::Dated { date: at(2019, 11, 3), source: DateSource::Filename }
        );
        assert_eq!(resolve(None, None, now), Resolution::Undated);
    }

    #[test]
    fn test_future_dates_rejected() {
        let now = at(2024, 1, 1);
        assert_eq!(
            resolve(Some(at(2031, 2, 3)), None, now),
            Resolution::Future(at(2031, 2, 3))
        );
        // An earlier plausible source still wins over a future one.
        assert_eq!(
            resolve(Some(at(2031, 2, 3)), Some(at(2020, 1, 1)), now),
            Resolution::Dated { date: at(2020, 1, 1), source: DateSource::Filename }
        );
        // Exactly now is not in the future.
        assert_eq!(
            resolve(Some(now), None, now),
            Resolution::Dated { date: now, source: DateSource::Metadata }
        );
    }
}
