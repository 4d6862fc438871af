//! Leak reports: one line per allocation that is still live.

use std::{
    ffi::c_void,
    fmt,
    io::{self, Write},
};

use allocator_api2::vec::Vec;
use log::debug;
use serde::Serialize;

use super::{raw::RawAlloc, tracker::Tracker};
use crate::serialize::serde_usize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// `LEAK: <address>. Allocation in file <file> on line <line> of size <size>b.`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// A live allocation, as seen at report time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Leak {
    #[serde(with = "serde_usize")]
    pub address: *const c_void,
    pub size: usize,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Leak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LEAK: {:p}. Allocation in file {} on line {} of size {}b.",
            self.address, self.file, self.line, self.size
        )
    }
}

/// A snapshot of the registry. The buffer comes from the real allocator and
/// goes back to it on drop.
pub type Leaks = Vec<Leak, RawAlloc>;

/// Write `leaks` in `format`, returning how many lines were written.
pub fn write_leaks<W: Write>(
    mut out: W,
    leaks: &[Leak],
    format: ReportFormat,
) -> io::Result<usize> {
    for leak in leaks {
        match format {
            ReportFormat::Text => writeln!(out, "{leak}")?,
            ReportFormat::Json => {
                serde_json::to_writer(&mut out, leak)?;
                writeln!(out)?;
            }
        }
    }
    out.flush()?;
    Ok(leaks.len())
}

impl Tracker {
    /// Copy every live record out of the registry, sorted by address.
    ///
    /// The lock is held only while copying; nothing in the registry changes.
    pub fn leaks(&self) -> io::Result<Leaks> {
        let mut leaks = Vec::new_in(self.raw());
        {
            let registry = self.registry();
            leaks
                .try_reserve_exact(registry.len())
                .map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
            leaks.extend(registry.iter().map(|(address, record)| Leak {
                address,
                size: record.size,
                file: record.file,
                line: record.line,
            }));
        }
        leaks.sort_unstable_by_key(|leak| leak.address as usize);
        Ok(leaks)
    }

    /// Write one line per live allocation to `out`.
    pub fn report_leaks_to<W: Write>(&self, out: W, format: ReportFormat) -> io::Result<usize> {
        let leaks = self.leaks()?;
        debug!("reporting {} leaks as {format:?}", leaks.len());
        write_leaks(out, &leaks, format)
    }

    /// Write one line per live allocation to stderr, in the configured format.
    pub fn report_leaks(&self) -> io::Result<usize> {
        self.report_leaks_to(io::stderr().lock(), self.config().format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(address: usize, size: usize, line: u32) -> Leak {
        Leak {
            address: address as *const c_void,
            size,
            file: "a.c",
            line,
        }
    }

    #[test]
    fn text_line_format() {
        let mut out = std::vec::Vec::new();
        let n = write_leaks(&mut out, &[leak(0x1000, 16, 10)], ReportFormat::Text).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "LEAK: 0x1000. Allocation in file a.c on line 10 of size 16b.\n"
        );
    }

    #[test]
    fn json_lines_format() {
        let mut out = std::vec::Vec::new();
        let leaks = [leak(0x1000, 16, 10), leak(0x2000, 32, 11)];
        let n = write_leaks(&mut out, &leaks, ReportFormat::Json).unwrap();
        assert_eq!(n, 2);

        let out = String::from_utf8(out).unwrap();
        let lines: std::vec::Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(
            lines[1],
            serde_json::json!({"address": 0x2000, "size": 32, "file": "a.c", "line": 11})
        );
    }

    #[test]
    fn nothing_to_report() {
        let mut out = std::vec::Vec::new();
        assert_eq!(write_leaks(&mut out, &[], ReportFormat::Text).unwrap(), 0);
        assert!(out.is_empty());
    }
}
