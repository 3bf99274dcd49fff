use alloc::string::String;

/// Errors raised when an [crate::AnalysisManager] is asked to do something that violates the
/// structure of the IR it manages analyses for.
///
/// These represent programmer errors. The infallible variants of the operations which produce
/// them panic instead, the fallible variants exist for drivers which prefer to report them.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// An analysis manager was requested for an IR unit which is not nested under the unit of the
    /// current analysis manager.
    #[error("expected {unit} to be a proper descendant of {ancestor}")]
    NotADescendant { unit: String, ancestor: String },
    /// An analysis was requested for a specific kind of IR unit, but the unit is of another kind
    #[error("expected {unit} to be a `{expected}`")]
    InvalidTarget { unit: String, expected: &'static str },
    /// A cached analysis was requested for a unit which is not an immediate child of the unit of
    /// the current analysis manager.
    #[error("expected {unit} to be an immediate child of {parent}")]
    NotAChild { unit: String, parent: String },
}
