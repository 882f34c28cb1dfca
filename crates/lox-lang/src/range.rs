use nom_locate::LocatedSpan;

pub type Span<'a> = LocatedSpan<&'a str>;

/// A 1-based line/column position in the source text.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub struct Position {
    pub line: u32,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Position {
    pub fn new(line: u32, column: usize) -> Self {
        Position { line, column }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Default, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

impl<'a> From<Span<'a>> for Range {
    fn from(span: Span<'a>) -> Self {
        let start: Position = span.into();
        let mut end = start;

        // Multi-line string literals end on a later line.
        for c in span.fragment().chars() {
            if c == '\n' {
                end.line += 1;
                end.column = 1;
            } else {
                end.column += 1;
            }
        }

        Range { start, end }
    }
}

impl<'a> From<Span<'a>> for Position {
    fn from(span: Span<'a>) -> Self {
        Position {
            line: span.location_line(),
            column: span.get_utf8_column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abc", Range { start: Position::new(1, 1), end: Position::new(1, 4) })]
    #[case("\"a\nbc\"", Range { start: Position::new(1, 1), end: Position::new(2, 4) })]
    #[case("", Range { start: Position::new(1, 1), end: Position::new(1, 1) })]
    fn test_range_from_span(#[case] input: &str, #[case] expected: Range) {
        assert_eq!(Range::from(Span::new(input)), expected);
    }

    #[test]
    fn test_display() {
        let range = Range {
            start: Position::new(3, 7),
            end: Position::new(3, 9),
        };
        assert_eq!(range.to_string(), "3:7");
    }
}
