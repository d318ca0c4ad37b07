//! Parsing and rendering of Linux cpuset-style CPU lists (`"0-3,5,7-9"`).

use std::num::ParseIntError;

use thiserror::Error;

/// Widest range a single token may expand to.
pub const MAX_RANGE_WIDTH: u32 = 8192;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CpuListError {
    #[error("empty CPU token in list `{list}`")]
    EmptyToken { list: String },

    #[error("invalid CPU id `{token}`: {source}")]
    InvalidCpu {
        token: String,
        #[source]
        source: ParseIntError,
    },

    #[error("reversed CPU range `{start}-{end}`")]
    ReversedRange { start: u32, end: u32 },

    #[error("CPU range `{start}-{end}` spans more than {MAX_RANGE_WIDTH} CPUs")]
    RangeTooWide { start: u32, end: u32 },
}

/// Expands a CPU list into the CPU ids it covers.
///
/// Order follows the input and duplicates are kept; callers that need a set
/// sort and dedupe themselves. Any malformed token fails the whole list.
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>, CpuListError> {
    let mut cpus = Vec::new();

    for token in list.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(CpuListError::EmptyToken {
                list: list.to_string(),
            });
        }

        match token.split_once('-') {
            Some((start, end)) => {
                let start = parse_cpu(start)?;
                let end = parse_cpu(end)?;
                if start > end {
                    return Err(CpuListError::ReversedRange { start, end });
                }
                if end - start >= MAX_RANGE_WIDTH {
                    return Err(CpuListError::RangeTooWide { start, end });
                }
                cpus.extend(start..=end);
            }
            None => cpus.push(parse_cpu(token)?),
        }
    }

    Ok(cpus)
}

fn parse_cpu(token: &str) -> Result<u32, CpuListError> {
    let token = token.trim();
    token.parse().map_err(|source| CpuListError::InvalidCpu {
        token: token.to_string(),
        source,
    })
}

/// Renders CPU ids in the compact range form, collapsing consecutive runs.
///
/// The input is sorted and deduplicated first, so `[5, 0, 1, 2, 2]` renders
/// as `"0-2,5"`.
pub fn format_cpu_list(cpus: &[u32]) -> String {
    let mut sorted = cpus.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(next) = end.checked_add(1).filter(|next| iter.peek() == Some(next)) {
            end = next;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }

    parts.join(",")
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn parses_mixed_ranges_and_singles() {
        assert_eq!(
            parse_cpu_list("0-3,5,7-9").unwrap(),
            vec![0, 1, 2, 3, 5, 7, 8, 9]
        );
    }

    #[test]
    fn parses_single_cpu_and_degenerate_range() {
        assert_eq!(parse_cpu_list("4").unwrap(), vec![4]);
        assert_eq!(parse_cpu_list("2-2").unwrap(), vec![2]);
    }

    #[test]
    fn keeps_input_order_and_duplicates() {
        assert_eq!(parse_cpu_list("8,2-3,3").unwrap(), vec![8, 2, 3, 3]);
    }

    #[test]
    fn tolerates_whitespace_around_tokens() {
        assert_eq!(parse_cpu_list(" 1 , 4 - 5 ").unwrap(), vec![1, 4, 5]);
    }

    #[test]
    fn rejects_non_numeric_token() {
        let err = parse_cpu_list("0-3,x,5").unwrap_err();
        assert!(
            matches!(err, CpuListError::InvalidCpu { ref token, .. } if token == "x"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn rejects_reversed_range() {
        assert_eq!(
            parse_cpu_list("7-3").unwrap_err(),
            CpuListError::ReversedRange { start: 7, end: 3 }
        );
    }

    #[test]
    fn rejects_empty_tokens() {
        assert!(matches!(
            parse_cpu_list(""),
            Err(CpuListError::EmptyToken { .. })
        ));
        assert!(matches!(
            parse_cpu_list("1,,2"),
            Err(CpuListError::EmptyToken { .. })
        ));
    }

    #[test]
    fn rejects_open_ended_range() {
        assert!(matches!(
            parse_cpu_list("3-"),
            Err(CpuListError::InvalidCpu { .. })
        ));
        assert!(matches!(
            parse_cpu_list("1-2-3"),
            Err(CpuListError::InvalidCpu { .. })
        ));
    }

    #[test]
    fn rejects_ranges_wider_than_the_cap() {
        assert_eq!(
            parse_cpu_list("0-4294967295").unwrap_err(),
            CpuListError::RangeTooWide {
                start: 0,
                end: u32::MAX
            }
        );
        assert_eq!(
            parse_cpu_list(&format!("0-{}", MAX_RANGE_WIDTH - 1))
                .unwrap()
                .len(),
            MAX_RANGE_WIDTH as usize
        );
    }

    #[test]
    fn formats_highest_cpu_id() {
        assert_eq!(format_cpu_list(&[u32::MAX]), "4294967295");
        assert_eq!(
            format_cpu_list(&[u32::MAX - 1, u32::MAX]),
            "4294967294-4294967295"
        );
    }

    #[test]
    fn formats_runs_compactly() {
        assert_eq!(format_cpu_list(&[5, 0, 1, 2, 2, 7, 8, 9]), "0-2,5,7-9");
        assert_eq!(format_cpu_list(&[4]), "4");
        assert_eq!(format_cpu_list(&[]), "");
    }

    #[test]
    fn formatted_list_parses_back() {
        let cpus = vec![0, 1, 2, 3, 5, 7, 8, 9];
        assert_eq!(parse_cpu_list(&format_cpu_list(&cpus)).unwrap(), cpus);
    }
}
