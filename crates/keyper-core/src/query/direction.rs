/// Sort direction for one ordering component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn is_desc(self) -> bool {
        matches!(self, Self::Desc)
    }

    /// The ordering-string suffix for this direction (`+` / `-`).
    pub fn suffix(self) -> char {
        match self {
            Self::Asc => '+',
            Self::Desc => '-',
        }
    }
}
