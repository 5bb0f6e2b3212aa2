use thiserror::Error;

// Errors raised at the edges of the engine: loading maps and configs.
// Pathfinding itself never fails with an error; "no path" is a plain bool.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not parse config: {0}")]
    ConfigSyntax(#[from] toml::de::Error),

    #[error("Invalid config value for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Empty map")]
    EmptyMap,

    #[error("Map row {row} has width {width}, expected {expected}")]
    RaggedMap { row: usize, width: usize, expected: usize },

    #[error("Unknown map character '{ch}' at ({x}, {y})")]
    UnknownGlyph { ch: char, x: i32, y: i32 },

    #[error("Map has no player ('@')")]
    MissingPlayer,

    #[error("Map has more than one player ('@') at ({x}, {y})")]
    DuplicatePlayer { x: i32, y: i32 },
}

pub type Result<T> = std::result::Result<T, Error>;
