use data_model::{DateLayout, PartitionPath};
use regex::Regex;

use crate::error::TransferError;

/// Derives the `year/month/day` partition encoded in a manifest name such as
/// `csv_Tracker_15032021.csv`. `extension` is the manifest extension without
/// the dot.
pub fn derive(
    manifest_file_name: &str,
    extension: &str,
    layout: DateLayout,
) -> Result<PartitionPath, TransferError> {
    let err = || TransferError::PathDerivation {
        file_name: manifest_file_name.to_string(),
    };

    let pattern = Regex::new(&format!(r"Tracker_(.+?)\.{}$", regex::escape(extension)))
        .map_err(|_| err())?;
    let token = pattern
        .captures(manifest_file_name)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .ok_or_else(err)?;
    if token.len() != 8 || !token.is_ascii() {
        return Err(err());
    }

    let (first, second, year) = (&token[0..2], &token[2..4], &token[4..]);
    let (month, day) = match layout {
        DateLayout::DayMonthYear => (second, first),
        DateLayout::MonthDayYear => (first, second),
    };
    Ok(PartitionPath {
        year: year.to_string(),
        month: month.to_string(),
        day: day.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_month_year_layout() {
        let partition = derive("csv_Tracker_15032021.txt", "txt", DateLayout::DayMonthYear).unwrap();
        assert_eq!(partition.to_string(), "2021/03/15");
        assert_eq!(partition.under("/hdfs/feeds"), "/hdfs/feeds/2021/03/15");
    }

    // MonthDayYear reads the first pair as the month, so a DDMMYYYY name lands
    // under month 15.
    #[test]
    fn test_month_day_year_layout_pins_digit_assignment() {
        let partition = derive("csv_Tracker_15032021.csv", "csv", DateLayout::MonthDayYear).unwrap();
        assert_eq!(partition.year, "2021");
        assert_eq!(partition.month, "15");
        assert_eq!(partition.day, "03");
        assert_eq!(partition.to_string(), "2021/15/03");
    }

    #[test]
    fn test_month_day_year_with_real_date() {
        let partition = derive("csv_Tracker_01152021.csv", "csv", DateLayout::MonthDayYear).unwrap();
        assert_eq!(partition.to_string(), "2021/01/15");
    }

    #[test]
    fn test_unrecognized_names() {
        for name in [
            "csv_Tracker_15032021.csv",
            "csv_tracker_15032021.txt",
            "Tracker_.txt",
            "csv_Tracker_1503202.txt",
            "csv_Tracker_150320211.txt",
            "report.txt",
        ] {
            assert!(
                matches!(
                    derive(name, "txt", DateLayout::DayMonthYear),
                    Err(TransferError::PathDerivation { .. })
                ),
                "{name} should not derive a partition"
            );
        }
    }
}
