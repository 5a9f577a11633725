use crate::workspace::BlockId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    #[error("Unsupported block type '{0}': no generator is registered for it.")]
    UnsupportedBlock(String),

    #[error("Unknown block type '{0}'.")]
    UnknownBlockType(String),

    #[error("Unknown helper block type '{helper}' in the clause list of '{block_type}'.")]
    UnknownHelperBlock { block_type: String, helper: String },

    #[error("Only one '{part}' clause is allowed on '{block_type}' (got {count}).")]
    DuplicateTerminalClause {
        block_type: String,
        part: String,
        count: usize,
    },

    #[error("Mutation entry '{entry}' is not declared by '{block_type}'.")]
    UnknownMutationEntry { block_type: String, entry: String },

    #[error("Block type '{0}' has no mutation schema.")]
    NotMutable(String),

    #[error("Malformed output from the '{block_type}' generator: {reason}.")]
    MalformedOutput { block_type: String, reason: String },

    #[error("Block {0} does not exist.")]
    UnknownBlock(BlockId),

    #[error("Block {block} has no input named '{input}'.")]
    UnknownInput { block: BlockId, input: String },

    #[error("Block {block} has no field named '{field}'.")]
    UnknownField { block: BlockId, field: String },

    #[error("Cannot connect block {child}: {reason}.")]
    ConnectionRefused { child: BlockId, reason: String },

    #[error("Variable '{0}' does not exist.")]
    UnknownVariable(String),

    #[error("Invalid workspace document: {0}")]
    Document(String),
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
