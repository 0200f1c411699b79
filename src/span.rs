/// Byte offset in the candidate text. Candidates are bounded well below 4 GiB.
pub type Pos = u32;

/// Byte range of a token or an expression node in the candidate text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    start: Pos,
    end: Pos,
}

/// Value tagged with the span it was parsed from. Comparison ignores the span, so
/// two trees parsed from differently formatted text compare equal.
#[derive(Debug)]
pub struct Spanned<T> {
    value: T,
    span: Span,
}

impl<T> Spanned<T> {
    pub fn span(&self) -> Span {
        self.span
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> std::ops::Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> std::cmp::PartialEq for Spanned<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Clone for Spanned<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            span: self.span,
        }
    }
}

impl<T> std::fmt::Display for Spanned<T>
where
    T: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}

impl Span {
    pub const NONE: Self = Self { start: 0, end: 0 };

    /// Empty span pointing right at the given offset.
    pub fn at(pos: usize) -> Self {
        Self {
            start: pos as Pos,
            end: pos as Pos,
        }
    }

    pub fn start(&self) -> usize {
        self.start as usize
    }

    pub fn end(&self) -> usize {
        self.end as usize
    }

    /// Combine two spans into one, taking the smallest start and the largest end.
    pub fn combine(&self, other: &Self) -> Self {
        let start = self.start.min(other.start);
        let end = self.end.max(other.end);
        Self { start, end }
    }

    pub fn with<T>(self, value: T) -> Spanned<T> {
        Spanned { value, span: self }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self {
            start: range.start as Pos,
            end: range.end as Pos,
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine() {
        let a = Span::from(0..3);
        let b = Span::from(2..6);
        let c = Span::from(6..8);

        assert_eq!(a.combine(&c), Span::from(0..8));
        assert_eq!(c.combine(&b), Span::from(2..8));
        assert_eq!(a.combine(&Span::at(1)), a);
    }

    #[test]
    fn empty_span_display() {
        let at = Span::at(5);
        assert_eq!(at.start(), at.end());
        assert_eq!(at.to_string(), "5..5");
    }

    #[test]
    fn spanned_eq_ignores_span() {
        let a = Span::from(0..1).with(5);
        let b = Span::from(10..11).with(5);
        assert_eq!(a, b);
        assert_ne!(a.span(), b.span());
    }
}
