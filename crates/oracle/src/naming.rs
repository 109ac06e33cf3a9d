//! Naming-convention matcher.
//!
//! A module named `calculator` is tested by `test_calculator.py` or
//! `calculator_test.py`, wherever those live in the test universe. Matching is
//! exact and case-sensitive on the file stem; directories are ignored.

use anatomist::TestUniverse;
use common::module_id::last_component;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Test files named after the last component of `module_id`.
pub fn tests_named_for(module_id: &str, universe: &TestUniverse) -> BTreeSet<PathBuf> {
    let subject = last_component(module_id);
    let convention = universe.convention();

    universe
        .iter()
        .filter(|test| {
            test.file_name()
                .and_then(|n| n.to_str())
                .map(|name| convention.names_subject(name, subject))
                .unwrap_or(false)
        })
        .map(|test| test.to_path_buf())
        .collect()
}
