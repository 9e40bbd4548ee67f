use thiserror::Error;

/// Errors raised by the map model, its expressions and datasources.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No active layer has a computable extent")]
    EmptyExtent,

    #[error("Unknown projection: '{0}'")]
    UnknownProjection(String),

    #[error("Invalid filter expression '{expr}' at offset {offset}: {message}")]
    Expression {
        expr: String,
        offset: usize,
        message: String,
    },

    #[error("Invalid color: '{0}'")]
    InvalidColor(String),

    #[error("Datasource error: {0}")]
    Datasource(String),
}

pub type Result<T> = std::result::Result<T, Error>;
