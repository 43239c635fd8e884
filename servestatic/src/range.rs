// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte range processing (`Range` HTTP header)

use log::debug;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A single byte range as it was written in the `Range` header, before applying the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRangeSpec {
    /// First byte of the range. Negative values mean a suffix of that length, e.g. `bytes=-10`
    /// results in `-10` here.
    pub start: i64,
    /// Last byte of the range (inclusive), `None` for "up to the end of file"
    pub end: Option<i64>,
}

impl FromStr for ByteRangeSpec {
    type Err = Error;

    /// Parses the value of a `Range` header. Only a single range in `bytes` units is supported,
    /// anything else results in [`Error::InvalidRangeSpec`].
    fn from_str(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidRangeSpec(value.to_owned());
        let parse = |number: &str| i64::from_str(number.trim()).map_err(|_| invalid());

        let value_trimmed = value.trim();
        let (units, spec) = value_trimmed
            .split_once('=')
            .unwrap_or((value_trimmed, ""));
        if units != "bytes" {
            return Err(invalid());
        }

        let (start, end) = spec.trim().split_once('-').ok_or_else(invalid)?;
        if start.is_empty() {
            Ok(Self {
                start: parse(end)?.checked_neg().ok_or_else(invalid)?,
                end: None,
            })
        } else {
            Ok(Self {
                start: parse(start)?,
                end: if end.is_empty() {
                    None
                } else {
                    Some(parse(end)?)
                },
            })
        }
    }
}

impl ByteRangeSpec {
    /// Applies the range to a file of the given size. Suffix ranges longer than the file start
    /// at its beginning, the end is clamped to the last byte of the file.
    ///
    /// Ranges that end up with their start at or after their end are not satisfiable. Note that
    /// this includes single-byte ranges like `bytes=0-0`.
    pub fn resolve(&self, file_size: u64) -> Range {
        let size = i64::try_from(file_size).unwrap_or(i64::MAX);
        let start = if self.start < 0 {
            self.start.saturating_add(size).max(0)
        } else {
            self.start
        };
        let end = match self.end {
            Some(end) => end.min(size - 1),
            None => size - 1,
        };

        if start >= end {
            Range::NotSatisfiable
        } else {
            Range::Valid(start as u64, end as u64)
        }
    }
}

/// Represents the result of applying the `Range` HTTP header to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    /// A valid range with the given start and end bounds (both inclusive)
    Valid(u64, u64),
    /// A range that cannot be satisfied for this file
    NotSatisfiable,
}

impl Range {
    /// Parses the value of a `Range` HTTP header. The file size is required to resolve ranges
    /// specified relative to the end of file and to recognize unsatisfiable ranges. Ranges that
    /// cannot be parsed (unexpected format, multiple ranges) will result in `None`.
    pub fn parse(range: &str, file_size: u64) -> Option<Self> {
        match ByteRangeSpec::from_str(range) {
            Ok(spec) => Some(spec.resolve(file_size)),
            Err(err) => {
                debug!("ignoring Range header: {err}");
                None
            }
        }
    }

    /// Number of bytes in the range
    pub fn len(&self) -> u64 {
        match self {
            Self::Valid(start, end) => end - start + 1,
            Self::NotSatisfiable => 0,
        }
    }

    /// Checks whether the range is empty, only true for unsatisfiable ranges.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    const SIZE: u64 = 1000;

    #[test]
    fn valid_range() {
        assert_eq!(Range::parse("bytes=0-499", SIZE), Some(Range::Valid(0, 499)));
        assert_eq!(Range::parse(" bytes = 10 - 20 ", SIZE), None);
        assert_eq!(Range::parse("bytes= 10-20 ", SIZE), Some(Range::Valid(10, 20)));
    }

    #[test]
    fn unknown_units() {
        assert_eq!(Range::parse("eur=0-499", SIZE), None);
        assert_eq!(Range::parse("bytes", SIZE), None);
        assert_eq!(Range::parse("", SIZE), None);
    }

    #[test]
    fn open_range() {
        assert_eq!(Range::parse("bytes=500-", SIZE), Some(Range::Valid(500, 999)));
    }

    #[test]
    fn end_range() {
        assert_eq!(Range::parse("bytes=-10", SIZE), Some(Range::Valid(990, 999)));
        // Suffix longer than the file starts at the beginning.
        assert_eq!(Range::parse("bytes=-2000", SIZE), Some(Range::Valid(0, 999)));
    }

    #[test]
    fn end_clamped() {
        assert_eq!(Range::parse("bytes=10-5000", SIZE), Some(Range::Valid(10, 999)));
    }

    #[test]
    fn not_satisfiable() {
        assert_eq!(Range::parse("bytes=23-22", SIZE), Some(Range::NotSatisfiable));
        assert_eq!(Range::parse("bytes=1000-", SIZE), Some(Range::NotSatisfiable));
        assert_eq!(Range::parse("bytes=5000-6000", SIZE), Some(Range::NotSatisfiable));
        assert_eq!(Range::parse("bytes=0-0", SIZE), Some(Range::NotSatisfiable));
        assert_eq!(Range::parse("bytes=0-", 0), Some(Range::NotSatisfiable));
    }

    #[test]
    fn multiple_ranges() {
        // Multiple ranges are unsupported, should be treated like no Range header.
        assert_eq!(Range::parse("bytes=1-2,3-4", SIZE), None);
    }

    #[test]
    fn garbage() {
        assert_eq!(Range::parse("bytes=-", SIZE), None);
        assert_eq!(Range::parse("bytes=a-b", SIZE), None);
        assert_eq!(Range::parse("bytes=5", SIZE), None);
        assert!(matches!(
            "bytes=x-".parse::<ByteRangeSpec>(),
            Err(Error::InvalidRangeSpec(value)) if value == "bytes=x-"
        ));
    }

    #[test]
    fn spec_parsing() {
        assert_eq!(
            "bytes=-10".parse::<ByteRangeSpec>().unwrap(),
            ByteRangeSpec {
                start: -10,
                end: None
            }
        );
        assert_eq!(
            "bytes=3-7".parse::<ByteRangeSpec>().unwrap(),
            ByteRangeSpec {
                start: 3,
                end: Some(7)
            }
        );
        assert_eq!(Range::Valid(3, 7).len(), 5);
    }
}
