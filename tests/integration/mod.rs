//! Integration tests for the FMU sync core

mod changelog_history;
mod commit_workflow;
mod detection;
mod tree_determinism;
mod watchers;
