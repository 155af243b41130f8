#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mysqlx_client::expr::{DataModel, compile, parse_document_path};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    condition: String,
    projection: Vec<String>,
    sort: Vec<String>,
    table: bool,
}

fuzz_target!(|input: FuzzInput| {
    let mode = if input.table {
        DataModel::Table
    } else {
        DataModel::Document
    };

    // Compilation is pure; compiling twice must agree.
    let first = compile(Some(&input.condition), &input.projection, &input.sort, mode);
    let second = compile(Some(&input.condition), &input.projection, &input.sort, mode);
    assert_eq!(first, second);

    let _ = parse_document_path(&input.condition);
});
