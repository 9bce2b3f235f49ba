use std::str::FromStr;

use booking_store::ClassQuery;
use common::{DanceStyle, ParseEnumError};

/// Style predicate for class searches: a single style, or `any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StyleFilter {
    #[default]
    Any,
    Style(DanceStyle),
}

impl StyleFilter {
    pub fn to_query(self) -> ClassQuery {
        match self {
            StyleFilter::Any => ClassQuery::new(),
            StyleFilter::Style(style) => ClassQuery::for_style(style),
        }
    }
}

impl FromStr for StyleFilter {
    type Err = ParseEnumError;

    /// Accepts `any` or a style name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("any") {
            return Ok(StyleFilter::Any);
        }
        s.parse()
            .map(StyleFilter::Style)
            .map_err(|_| ParseEnumError::new("style filter", s))
    }
}

impl std::fmt::Display for StyleFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StyleFilter::Any => f.write_str("any"),
            StyleFilter::Style(style) => f.write_str(&style.as_str().to_ascii_lowercase()),
        }
    }
}
