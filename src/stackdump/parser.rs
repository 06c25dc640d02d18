use std::io::Write;
use std::iter::Peekable;
use std::str::Lines;

use regex::Regex;

use crate::core::strings::StringInterner;
use crate::core::types::ProfileError;
use crate::proto::profpack::{Frame, StackDump, StackTrace};

lazy_static! {
    static ref HEADER: Regex = Regex::new(r"^(\S+) profile: total (\d+)$").unwrap();
    static ref COUNT: Regex = Regex::new(r"^(\d+) @((?: 0x[0-9a-f]+)+)$").unwrap();
    static ref FRAME: Regex =
        Regex::new(r"^#\t+(0x[0-9a-f]+)\t+(\S+)\+(0x[0-9a-f]+)\t+(.+):(\d+)$").unwrap();
}

const LABELS_PREFIX: &str = "# labels:";

/// Line iterator that remembers the 1-based number of the last line it returned.
struct Cursor<'a> {
    lines: Peekable<Lines<'a>>,
    number: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Cursor {
            lines: text.lines().peekable(),
            number: 0,
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        let line = self.lines.next()?;
        self.number += 1;
        Some(line)
    }

    fn peek(&mut self) -> Option<&'a str> {
        self.lines.peek().copied()
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parses a goroutine profile in the `debug=1` text format.
///
/// ```text
/// goroutine profile: total 3
/// 2 @ 0x43a4e5 0x44a2c7 0x46e481
/// #	0x43a4e4	runtime.gopark+0xe4	/usr/local/go/src/runtime/proc.go:363
/// ...
/// ```
///
/// The whole capture fails on the first line that breaks the grammar.
pub fn parse(text: &str) -> Result<StackDump, ProfileError> {
    let mut cursor = Cursor::new(text);
    let mut header = cursor.next();
    while let Some(line) = header {
        if !is_blank_or_comment(line) {
            break;
        }
        header = cursor.next();
    }
    let total = header
        .and_then(|line| HEADER.captures(line.trim_end()))
        .ok_or(ProfileError::UnrecognizedFormat)
        .and_then(|caps| {
            caps[2]
                .parse::<u64>()
                .map_err(|e| ProfileError::malformed(cursor.number, format!("bad total: {}", e)))
        })?;

    let mut strings = StringInterner::new();
    let mut stack_traces = Vec::new();
    while let Some(line) = cursor.next() {
        if is_blank(line) {
            continue;
        }
        let mut stack = parse_count_line(line, cursor.number)?;
        while let Some(next) = cursor.peek() {
            if is_blank(next) {
                break;
            }
            cursor.next();
            if next.starts_with(LABELS_PREFIX) {
                continue;
            }
            stack.frames.push(parse_frame(next, cursor.number, &mut strings)?);
        }
        stack_traces.push(stack);
    }

    debug!(
        "parsed stack dump: total {}, {} stack traces, {} strings",
        total,
        stack_traces.len(),
        strings.len()
    );
    Ok(StackDump {
        total,
        stack_traces,
        string_table: strings.into_table(),
    })
}

fn parse_count_line(line: &str, number: usize) -> Result<StackTrace, ProfileError> {
    let caps = COUNT
        .captures(line.trim_end())
        .ok_or_else(|| {
            ProfileError::malformed(number, format!("expected `<count> @ <pcs>`, got {:?}", line))
        })?;
    let total = caps[1]
        .parse::<u64>()
        .map_err(|e| ProfileError::malformed(number, format!("bad stack count: {}", e)))?;
    let pc = caps[2]
        .split_whitespace()
        .map(|pc| parse_hex(pc, number))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StackTrace {
        total,
        pc,
        frames: Vec::new(),
    })
}

fn parse_frame(
    line: &str,
    number: usize,
    strings: &mut StringInterner,
) -> Result<Frame, ProfileError> {
    let caps = FRAME
        .captures(line.trim_end())
        .ok_or_else(|| {
            ProfileError::malformed(number, format!("expected a frame line, got {:?}", line))
        })?;
    let address = parse_hex(&caps[1], number)?;
    let function_name = strings.intern(&caps[2]);
    let offset = parse_hex(&caps[3], number)?;
    let filename = strings.intern(&caps[4]);
    let line = caps[5]
        .parse::<u64>()
        .map_err(|e| ProfileError::malformed(number, format!("bad line number: {}", e)))?;
    Ok(Frame {
        address,
        function_name,
        offset,
        filename,
        line,
    })
}

fn parse_hex(value: &str, number: usize) -> Result<u64, ProfileError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProfileError::malformed(number, format!("bad address {}: {}", value, e)))
}

/// Parses a stack dump capture, gunzipping it first if it carries the gzip magic.
pub fn parse_stack_dump(raw: &[u8]) -> Result<StackDump, ProfileError> {
    let bytes = crate::codec::gunzip_if_compressed(raw)?;
    parse(&String::from_utf8_lossy(&bytes))
}

/// Renders `dump` in the `debug=1` text format accepted by `parse`. Frames whose string ids
/// are not in the dump's string table are written with empty names.
///
/// A frame without a function name is written as its address alone (`#\t0x10`). `parse` does
/// not accept such lines, so dumps holding them do not read back.
pub fn write_debug_text<W: Write>(dump: &StackDump, w: &mut W) -> Result<(), ProfileError> {
    let string = |id: u64| {
        usize::try_from(id)
            .ok()
            .and_then(|id| dump.string_table.get(id))
            .map(String::as_str)
            .unwrap_or("")
    };

    writeln!(w, "goroutine profile: total {}", dump.total)?;
    for stack in &dump.stack_traces {
        write!(w, "{} @", stack.total)?;
        for pc in &stack.pc {
            write!(w, " {:#x}", pc)?;
        }
        writeln!(w)?;
        for frame in &stack.frames {
            let name = string(frame.function_name);
            if name.is_empty() {
                writeln!(w, "#\t{:#x}", frame.address)?;
                continue;
            }
            writeln!(
                w,
                "#\t{:#x}\t{}+{:#x}\t{}:{}",
                frame.address,
                name,
                frame.offset,
                string(frame.filename),
                frame.line
            )?;
        }
        writeln!(w)?;
    }
    Ok(())
}
