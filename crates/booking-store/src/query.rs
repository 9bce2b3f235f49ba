use common::DanceStyle;

/// Filter for listing scheduled classes.
///
/// An empty query matches every class instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassQuery {
    /// Restrict to instances whose definition has this style.
    pub style: Option<DanceStyle>,
}

impl ClassQuery {
    /// Creates a query with no predicate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a single style.
    pub fn for_style(style: DanceStyle) -> Self {
        Self { style: Some(style) }
    }

    /// Filters by dance style.
    pub fn style(mut self, style: DanceStyle) -> Self {
        self.style = Some(style);
        self
    }

    /// Returns true if a class with the given style satisfies this query.
    pub fn matches(&self, style: DanceStyle) -> bool {
        self.style.is_none_or(|wanted| wanted == style)
    }
}
