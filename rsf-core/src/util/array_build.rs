//! Build Arrow arrays from the raw buffers a column writer accumulates.

use std::sync::Arc;

use arrow_array::{
    new_null_array, types::ArrowPrimitiveType, ArrayRef, BinaryArray, BooleanArray,
    GenericListArray, PrimitiveArray, StringArray, StructArray,
};
use arrow_buffer::{BooleanBuffer, Buffer, NullBuffer, OffsetBuffer, ScalarBuffer};
use arrow_schema::{DataType, FieldRef, Fields};

use crate::errors::Result;

/// The with_data_type is needed here to recover the parameters for types like
/// Decimal/Timestamp from the declared column type.
pub fn new_primitive_array<T: ArrowPrimitiveType>(
    values: Vec<T::Native>,
    validity: Option<NullBuffer>,
    data_type: &DataType,
) -> Result<ArrayRef> {
    let values = ScalarBuffer::<T::Native>::from(values);
    let array = PrimitiveArray::<T>::try_new(values, validity)?;
    Ok(Arc::new(array.with_data_type(data_type.clone())))
}

pub fn new_bool_array(values: BooleanBuffer, validity: Option<NullBuffer>) -> Result<ArrayRef> {
    Ok(Arc::new(BooleanArray::new(values, validity)))
}

pub fn new_string_array(
    offsets: Vec<i32>,
    data: Vec<u8>,
    validity: Option<NullBuffer>,
) -> Result<ArrayRef> {
    let offsets = OffsetBuffer::new(ScalarBuffer::from(offsets));
    Ok(Arc::new(StringArray::try_new(
        offsets,
        Buffer::from_vec(data),
        validity,
    )?))
}

pub fn new_binary_array(
    offsets: Vec<i32>,
    data: Vec<u8>,
    validity: Option<NullBuffer>,
) -> Result<ArrayRef> {
    let offsets = OffsetBuffer::new(ScalarBuffer::from(offsets));
    Ok(Arc::new(BinaryArray::try_new(
        offsets,
        Buffer::from_vec(data),
        validity,
    )?))
}

pub fn new_list_array(
    item: FieldRef,
    offsets: Vec<i32>,
    values: ArrayRef,
    validity: Option<NullBuffer>,
) -> Result<ArrayRef> {
    let offsets = OffsetBuffer::new(ScalarBuffer::from(offsets));
    Ok(Arc::new(GenericListArray::<i32>::try_new(
        item, offsets, values, validity,
    )?))
}

pub fn new_struct_array(
    fields: Fields,
    arrays: Vec<ArrayRef>,
    validity: Option<NullBuffer>,
) -> Result<ArrayRef> {
    Ok(Arc::new(StructArray::try_new(fields, arrays, validity)?))
}

/// A column whose every row is the same string value, or all-null when the
/// value is absent.
pub fn new_constant_string_array(value: Option<&str>, num_rows: usize) -> ArrayRef {
    match value {
        Some(v) => Arc::new(StringArray::from_iter_values(
            std::iter::repeat(v).take(num_rows),
        )),
        None => new_null_array(&DataType::Utf8, num_rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::cast::AsArray;
    use arrow_array::types::Int32Type;
    use arrow_array::Array;

    #[test]
    fn test_primitive_round_trip() {
        let array =
            new_primitive_array::<Int32Type>(vec![1, 2, 3], None, &DataType::Int32).unwrap();
        let array = array.as_primitive::<Int32Type>();
        assert_eq!(array.values(), &[1, 2, 3]);
        assert!(array.nulls().is_none());
    }

    #[test]
    fn test_string_with_validity() {
        let validity = NullBuffer::new(BooleanBuffer::from(vec![true, false, true]));
        let array =
            new_string_array(vec![0, 4, 4, 9], b"fredwilma".to_vec(), Some(validity)).unwrap();
        let array = array.as_string::<i32>();
        assert_eq!(array.value(0), "fred");
        assert!(array.is_null(1));
        assert_eq!(array.value(2), "wilma");
    }

    #[test]
    fn test_constant_string() {
        let array = new_constant_string_array(Some("x.csv"), 2);
        let array = array.as_string::<i32>();
        assert_eq!(array.value(0), "x.csv");
        assert_eq!(array.value(1), "x.csv");
        let nulls = new_constant_string_array(None, 2);
        assert_eq!(nulls.null_count(), 2);
    }
}
