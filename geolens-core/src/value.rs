use arrow::array::*;
use arrow::datatypes::DataType;

/// How a column participates in distribution comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Other,
}

pub fn column_kind(dt: &DataType) -> ColumnKind {
    match dt {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64 => ColumnKind::Numeric,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Boolean => ColumnKind::Categorical,
        _ => ColumnKind::Other,
    }
}

/// A cell as f64, for numeric columns. None for nulls and non-numeric types.
pub fn numeric_cell(array: &dyn Array, row: usize) -> Option<f64> {
    if array.is_null(row) {
        return None;
    }
    macro_rules! as_f64 {
        ($ty:ty) => {
            array
                .as_any()
                .downcast_ref::<$ty>()
                .map(|a| a.value(row) as f64)
        };
    }
    match array.data_type() {
        DataType::Int8 => as_f64!(Int8Array),
        DataType::Int16 => as_f64!(Int16Array),
        DataType::Int32 => as_f64!(Int32Array),
        DataType::Int64 => as_f64!(Int64Array),
        DataType::UInt8 => as_f64!(UInt8Array),
        DataType::UInt16 => as_f64!(UInt16Array),
        DataType::UInt32 => as_f64!(UInt32Array),
        DataType::UInt64 => as_f64!(UInt64Array),
        DataType::Float32 => as_f64!(Float32Array),
        DataType::Float64 => as_f64!(Float64Array),
        _ => None,
    }
}

/// A cell rendered as text. None for nulls. Binary cells (WKB geometry
/// included) render as a hex digest so they stay comparable without being
/// human-readable.
pub fn cell_to_string(array: &dyn Array, row: usize) -> Option<String> {
    if array.is_null(row) {
        return None;
    }
    macro_rules! to_string {
        ($ty:ty) => {
            array
                .as_any()
                .downcast_ref::<$ty>()
                .map(|a| a.value(row).to_string())
        };
    }
    match array.data_type() {
        DataType::Int8 => to_string!(Int8Array),
        DataType::Int16 => to_string!(Int16Array),
        DataType::Int32 => to_string!(Int32Array),
        DataType::Int64 => to_string!(Int64Array),
        DataType::UInt8 => to_string!(UInt8Array),
        DataType::UInt16 => to_string!(UInt16Array),
        DataType::UInt32 => to_string!(UInt32Array),
        DataType::UInt64 => to_string!(UInt64Array),
        DataType::Float32 => to_string!(Float32Array),
        DataType::Float64 => to_string!(Float64Array),
        DataType::Boolean => to_string!(BooleanArray),
        DataType::Utf8 => to_string!(StringArray),
        DataType::LargeUtf8 => to_string!(LargeStringArray),
        DataType::Binary => array
            .as_any()
            .downcast_ref::<BinaryArray>()
            .map(|a| hex(a.value(row))),
        DataType::LargeBinary => array
            .as_any()
            .downcast_ref::<LargeBinaryArray>()
            .map(|a| hex(a.value(row))),
        _ => Some(format!("<{}>", array.data_type())),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(column_kind(&DataType::Int64), ColumnKind::Numeric);
        assert_eq!(column_kind(&DataType::Utf8), ColumnKind::Categorical);
        assert_eq!(column_kind(&DataType::Binary), ColumnKind::Other);
    }

    #[test]
    fn renders_and_extracts() {
        let a = Int64Array::from(vec![Some(7), None]);
        assert_eq!(cell_to_string(&a, 0).as_deref(), Some("7"));
        assert_eq!(cell_to_string(&a, 1), None);
        assert_eq!(numeric_cell(&a, 0), Some(7.0));
        assert_eq!(numeric_cell(&a, 1), None);
    }
}
