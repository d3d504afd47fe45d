//! Parsing the kernel-exposed CPU information text stream (spec §6).
//!
//! `/proc/cpuinfo` is a sequence of `<key>  : <value>` lines. We only ever
//! need three fields (`model name`, `cache size`, `cpu MHz`), and the size
//! fields carry a human suffix (`"8192 KB"`) that needs converting to
//! bytes/kHz. The suffix grammar is small enough to be a good fit for the
//! same parser combinator style the rest of this crate's lineage uses for
//! structured binary/text formats.

use nom::types::CompleteStr;
use nom::{digit, rest};
use nom::*;

/// Finds the first line containing `key` as a substring, splits it on the
/// first `:`, and returns the trimmed remainder.
///
/// Mirrors the original `cpuinfo()` helper: a linear scan, not a structured
/// `key: value` parser, because `/proc/cpuinfo` repeats `processor`-scoped
/// keys once per logical CPU and we only want the first occurrence.
pub fn find_field<'a>(cpuinfo_text: &'a str, key: &str) -> Option<&'a str> {
    for line in cpuinfo_text.lines() {
        if line.contains(key) {
            let colon = line.find(':')?;
            return Some(line[colon + 1..].trim());
        }
    }
    None
}

named!(size_suffix<CompleteStr, u64>,
    alt!(
        value!(1u64, tag_no_case!("b")) |
        value!(1024u64, tag_no_case!("kb")) |
        value!(1024u64, tag_no_case!("k")) |
        value!(1024 * 1024u64, tag_no_case!("mb")) |
        value!(1024 * 1024u64, tag_no_case!("m")) |
        value!(1024 * 1024 * 1024u64, tag_no_case!("gb")) |
        value!(1024 * 1024 * 1024u64, tag_no_case!("g"))
    )
);

named!(size_value<CompleteStr, (u64, CompleteStr)>,
    do_parse!(
        value: map_res!(digit, |d: CompleteStr| d.0.parse::<u64>()) >>
        opt!(tag!(" ")) >>
        unit: rest >>
        (value, unit)
    )
);

/// Parses a `"<number> <suffix>"` size string (e.g. `"8192 KB"`, `"3600"`)
/// into an absolute count. A bare number with no recognized suffix is
/// returned unscaled, matching the original's tolerant behavior.
pub fn parse_size_suffix(input: &str) -> Option<u64> {
    let (_, (value, unit)) = size_value(CompleteStr(input.trim())).ok()?;
    if unit.0.is_empty() {
        return Some(value);
    }
    let (_, factor) = size_suffix(unit).ok()?;
    Some(value * factor)
}

/// Reads `/proc/cpuinfo`-style text and returns `(model_name, llc_size_bytes, cpu_mhz)`.
///
/// `cpu_mhz` is only parsed when requested by the caller (spec §4.3:
/// "Frequency is optionally parsed but must not be called frequently: each
/// parse opens the file").
pub struct CpuInfoFields {
    /// Raw `model name` field, unparsed.
    pub model_name: Option<String>,
    /// `cache size` converted to bytes.
    pub llc_size_bytes: Option<u64>,
}

/// Parses the three fields this crate cares about out of a full
/// `/proc/cpuinfo` text blob.
pub fn parse_cpuinfo(text: &str) -> CpuInfoFields {
    let model_name = find_field(text, "model name").map(|s| s.to_owned());
    let llc_size_bytes = find_field(text, "cache size").and_then(parse_size_suffix);
    CpuInfoFields {
        model_name,
        llc_size_bytes,
    }
}

/// Parses just `cpu MHz`, truncated to an integer MHz value. Kept separate
/// from [`parse_cpuinfo`] so callers who must avoid opening the file
/// repeatedly can cache it themselves.
pub fn parse_cpu_mhz(text: &str) -> Option<u64> {
    let raw = find_field(text, "cpu MHz")?;
    // `cpu MHz` has no unit suffix, just a float like "2394.440"; truncate.
    let whole = raw.split('.').next()?;
    whole.parse::<u64>().ok()
}
