use thiserror::Error;

/// A corpus that cannot be indexed. Fatal for the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorpusFormatError {
    #[error("sentence {sentence}: tag index {tag} is not defined in the tag table ({defined} labels)")]
    UndefinedLabel {
        sentence: usize,
        tag: usize,
        defined: usize,
    },

    #[error("sentence {sentence}: {tokens} tokens but {tags} tags")]
    LengthMismatch {
        sentence: usize,
        tokens: usize,
        tags: usize,
    },

    #[error("tag table is empty")]
    EmptyTagTable,
}
