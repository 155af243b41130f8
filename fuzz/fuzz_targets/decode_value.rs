#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mysqlx_protocol::{ColumnFlags, ColumnMetaData, ColumnType, ContentType};

/// Column description plus a raw field.
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    column_type: u8,
    collation: u64,
    fractional_digits: u32,
    flags: u32,
    content_type: u32,
    field: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(column_type) = ColumnType::from_u8(input.column_type) else {
        return;
    };
    let column = ColumnMetaData {
        column_type,
        name: "v".to_string(),
        original_name: String::new(),
        table: String::new(),
        original_table: String::new(),
        schema: String::new(),
        catalog: String::new(),
        collation: input.collation,
        fractional_digits: input.fractional_digits,
        length: 0,
        flags: ColumnFlags::from_bits_truncate(input.flags),
        content_type: ContentType::from_u32(input.content_type).unwrap_or_default(),
    };

    let _ = mysqlx_types::decode::decode_value(&column, &input.field);
});
