use serde::Serialize;


#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    Up,
    Down,
}

impl MigrationDirection {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Up => "Creating",
            Self::Down => "Dropping",
        }
    }
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Up => "Migration",
            Self::Down => "Rollback",
        }
    }
    /// Past participle used in batch summaries: "2/2 table(s) created".
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Up => "created",
            Self::Down => "dropped",
        }
    }
}
