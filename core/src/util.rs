//! Small shared utilities: source spans and the debug-trace macro.

use nom_locate::LocatedSpan;
use serde::Serialize;
use std::fmt::{self, Write as _};

/// The span type nom parses against. Carries line/column tracking for free.
pub(crate) type RawSpan<'a> = LocatedSpan<&'a str>;

/// A region of source text, used to annotate AST nodes and to render error
/// messages with a line/column and a source excerpt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
    pub start_line: u32,
    pub start_col: usize,
    pub end_line: u32,
    pub end_col: usize,
}

impl Span {
    /// Build a span covering the entirety of `raw_span`'s fragment.
    pub(crate) fn from_raw_span(raw_span: &RawSpan) -> Self {
        let fragment = *raw_span.fragment();
        let start_line = raw_span.location_line();
        let start_col = raw_span.get_column();

        let newlines = fragment.matches('\n').count() as u32;
        let end_line = start_line + newlines;
        let end_col = match fragment.rfind('\n') {
            Some(idx) => fragment.len() - idx,
            None => start_col + fragment.len(),
        };

        Span {
            offset: raw_span.location_offset(),
            length: fragment.len(),
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Build a zero-length span anchored at `raw_span`'s current position.
    /// Used for syntax errors, where the "offending" span is just wherever
    /// parsing gave up.
    pub(crate) fn from_position(raw_span: &RawSpan) -> Self {
        Span {
            offset: raw_span.location_offset(),
            length: 0,
            start_line: raw_span.location_line(),
            start_col: raw_span.get_column(),
            end_line: raw_span.location_line(),
            end_col: raw_span.get_column(),
        }
    }

    /// Slice the original source text down to the bytes this span covers.
    pub fn get_source_slice<'a>(&self, src: &'a str) -> &'a str {
        let end = (self.offset + self.length).min(src.len());
        let start = self.offset.min(end);
        &src[start..end]
    }
}

/// Render the source line(s) covered by `span`, with a caret line pointing
/// at the start column. Used by `{:#}`-formatted errors.
pub(crate) fn fmt_src_highlights(
    f: &mut fmt::Formatter<'_>,
    span: &Span,
    src: &str,
) -> fmt::Result {
    let line = src.lines().nth((span.start_line as usize).saturating_sub(1));
    if let Some(line) = line {
        writeln!(f)?;
        writeln!(f, "{}", line)?;
        let mut caret = String::new();
        for _ in 1..span.start_col {
            caret.push(' ');
        }
        caret.push('^');
        write!(f, "{}", caret)?;
    }
    Ok(())
}

/// Executes the wrapped expression only when compiled in debug mode and the
/// `BLOCKSCRIPT_DEBUG` environment variable is set to `"true"`. Compiles away
/// to nothing in release builds.
///
/// ```
/// use blockscript::debug;
/// debug!(println!("hello"));
/// ```
#[macro_export]
macro_rules! debug {
    ($arg:expr) => {
        #[cfg(debug_assertions)]
        {
            if let Ok(val) = std::env::var("BLOCKSCRIPT_DEBUG") {
                if val.to_lowercase() == "true" {
                    $arg;
                }
            }
        }
    };
}
