use arrow_array::cast::AsArray;
use arrow_array::types::Int32Type;
use arrow_array::{Array, RecordBatch};
use arrow_schema::DataType;

use rsf_core::errors::Error;
use rsf_core::schema::ColumnSchema;

use super::*;

fn int_string_loader(options: LoaderOptions) -> (ResultSetLoader, ColumnHandle, ColumnHandle) {
    let mut loader = ResultSetLoader::new(options);
    let a = loader
        .add_column(ColumnSchema::required("a", DataType::Int32))
        .unwrap();
    let b = loader
        .add_column(ColumnSchema::optional("b", DataType::Utf8))
        .unwrap();
    (loader, a, b)
}

fn int_column(batch: &RecordBatch, name: &str) -> Vec<i32> {
    batch
        .column_by_name(name)
        .unwrap()
        .as_primitive::<Int32Type>()
        .values()
        .to_vec()
}

fn string_column(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let column = batch.column_by_name(name).unwrap();
    let column = column.as_string::<i32>();
    (0..column.len())
        .map(|i| (!column.is_null(i)).then(|| column.value(i).to_string()))
        .collect()
}

#[test]
fn test_write_and_read_back() {
    let (mut loader, a, b) = int_string_loader(LoaderOptions::default());
    loader.start_batch().unwrap();
    for (i, name) in [(1, Some("fred")), (2, None)] {
        loader.start_row().unwrap();
        loader.set_int(&a, i).unwrap();
        match name {
            Some(name) => loader.set_string(&b, name).unwrap(),
            None => loader.set_null(&b).unwrap(),
        }
        loader.save_row().unwrap();
    }
    let batch = loader.harvest().unwrap();
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(int_column(&batch, "a"), vec![1, 2]);
    assert_eq!(
        string_column(&batch, "b"),
        vec![Some("fred".to_string()), None]
    );
    assert_eq!(loader.total_row_count(), 2);
}

#[test]
fn test_missing_values_filled_at_harvest() {
    let (mut loader, a, b) = int_string_loader(LoaderOptions::default());
    loader.start_batch().unwrap();
    loader.start_row().unwrap();
    loader.set_int(&a, 1).unwrap();
    loader.set_string(&b, "x").unwrap();
    loader.save_row().unwrap();
    // row 1 writes neither column; row 2 writes only the optional one
    loader.start_row().unwrap();
    loader.save_row().unwrap();
    loader.start_row().unwrap();
    loader.set_string(&b, "z").unwrap();
    loader.save_row().unwrap();

    let batch = loader.harvest().unwrap();
    // required column zero-fills, optional column null-fills
    assert_eq!(int_column(&batch, "a"), vec![1, 0, 0]);
    assert_eq!(
        string_column(&batch, "b"),
        vec![Some("x".to_string()), None, Some("z".to_string())]
    );
}

#[test]
fn test_overflow_splits_row_into_lookahead() {
    let options = LoaderOptions::new().with_max_bytes(200);
    let (mut loader, a, b) = int_string_loader(options);

    let total_rows = 15;
    let mut batches = Vec::new();
    loader.start_batch().unwrap();
    for i in 0..total_rows {
        if loader.is_full() {
            batches.push(loader.harvest().unwrap());
            loader.start_batch().unwrap();
        }
        loader.start_row().unwrap();
        loader.set_int(&a, i).unwrap();
        loader.set_string(&b, &format!("value-{:04}", i)).unwrap();
        loader.save_row().unwrap();
    }
    batches.push(loader.harvest().unwrap());

    assert!(batches.len() > 1, "expected at least one overflow");
    // the concatenation of all batches is the logical row sequence:
    // no duplicates, no gaps
    let mut ints = Vec::new();
    let mut strings = Vec::new();
    for batch in &batches {
        assert!(batch.num_rows() > 0);
        ints.extend(int_column(batch, "a"));
        strings.extend(string_column(batch, "b"));
    }
    assert_eq!(ints, (0..total_rows).collect::<Vec<_>>());
    for (i, s) in strings.iter().enumerate() {
        assert_eq!(s.as_deref(), Some(format!("value-{:04}", i).as_str()));
    }
}

#[test]
fn test_overflow_preserves_partial_row() {
    // small budget so the second row's string write triggers the overflow
    // after its int column was already written
    let options = LoaderOptions::new().with_max_bytes(48);
    let (mut loader, a, b) = int_string_loader(options);
    loader.start_batch().unwrap();

    loader.start_row().unwrap();
    loader.set_int(&a, 0).unwrap();
    loader.set_string(&b, "0123456789abcdef").unwrap();
    loader.save_row().unwrap();
    assert!(!loader.is_full());

    loader.start_row().unwrap();
    loader.set_int(&a, 1).unwrap();
    loader.set_string(&b, "0123456789abcdef").unwrap();
    loader.save_row().unwrap();
    assert!(loader.is_full());

    let first = loader.harvest().unwrap();
    assert_eq!(first.num_rows(), 1);
    assert_eq!(int_column(&first, "a"), vec![0]);

    loader.start_batch().unwrap();
    let second = loader.harvest().unwrap();
    assert_eq!(second.num_rows(), 1);
    assert_eq!(int_column(&second, "a"), vec![1]);
    assert_eq!(
        string_column(&second, "b"),
        vec![Some("0123456789abcdef".to_string())]
    );
}

#[test]
fn test_single_row_over_budget_is_an_error() {
    let options = LoaderOptions::new().with_max_bytes(64);
    let (mut loader, _a, b) = int_string_loader(options);
    loader.start_batch().unwrap();
    loader.start_row().unwrap();
    let huge = "x".repeat(100);
    let err = loader.set_string(&b, &huge).unwrap_err();
    assert!(matches!(err, Error::ResourceExhaustion(_)), "{err}");
}

#[test]
fn test_row_limit_fills_batch_cleanly() {
    let options = LoaderOptions::new().with_max_rows(2);
    let (mut loader, a, _b) = int_string_loader(options);
    loader.start_batch().unwrap();
    for i in 0..2 {
        loader.start_row().unwrap();
        loader.set_int(&a, i).unwrap();
        loader.save_row().unwrap();
    }
    assert!(loader.is_full());
    let batch = loader.harvest().unwrap();
    assert_eq!(batch.num_rows(), 2);
    // nothing was carried into a lookahead
    loader.start_batch().unwrap();
    assert_eq!(loader.harvest().unwrap().num_rows(), 0);
}

#[test]
fn test_unprojected_column_is_a_no_op() {
    let options =
        LoaderOptions::new().with_projection(ProjectionFilter::names(["a"]));
    let (mut loader, a, b) = int_string_loader(options);
    assert!(loader.is_projected(&a));
    assert!(!loader.is_projected(&b));

    loader.start_batch().unwrap();
    loader.start_row().unwrap();
    loader.set_int(&a, 7).unwrap();
    loader.set_string(&b, "dropped").unwrap();
    loader.save_row().unwrap();
    let batch = loader.harvest().unwrap();
    assert_eq!(batch.num_columns(), 1);
    assert_eq!(batch.schema().field(0).name(), "a");
}

#[test]
fn test_column_added_mid_batch_backfills_nulls() {
    let (mut loader, a, _b) = int_string_loader(LoaderOptions::default());
    loader.start_batch().unwrap();
    loader.start_row().unwrap();
    loader.set_int(&a, 1).unwrap();
    loader.save_row().unwrap();

    let version = loader.schema_version();
    let c = loader
        .add_column(ColumnSchema::optional("c", DataType::Utf8))
        .unwrap();
    assert!(loader.schema_version() > version);

    loader.start_row().unwrap();
    loader.set_int(&a, 2).unwrap();
    loader.set_string(&c, "late").unwrap();
    loader.save_row().unwrap();

    let batch = loader.harvest().unwrap();
    assert_eq!(
        string_column(&batch, "c"),
        vec![None, Some("late".to_string())]
    );
}

#[test]
fn test_column_added_after_overflow_hidden_until_next_batch() {
    let options = LoaderOptions::new().with_max_bytes(48);
    let (mut loader, a, b) = int_string_loader(options);
    loader.start_batch().unwrap();
    loader.start_row().unwrap();
    loader.set_int(&a, 0).unwrap();
    loader.set_string(&b, "0123456789abcdef").unwrap();
    loader.save_row().unwrap();

    // this write rolls the batch over
    loader.start_row().unwrap();
    loader.set_string(&b, "0123456789abcdef").unwrap();
    let c = loader
        .add_column(ColumnSchema::optional("c", DataType::Int32))
        .unwrap();
    loader.set_int(&c, 42).unwrap();
    loader.save_row().unwrap();
    assert!(loader.is_full());

    let first = loader.harvest().unwrap();
    assert!(first.column_by_name("c").is_none());

    loader.start_batch().unwrap();
    let second = loader.harvest().unwrap();
    assert_eq!(int_column(&second, "c"), vec![42]);
}

#[test]
fn test_overflow_soak_with_random_strings() {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let options = LoaderOptions::new().with_max_bytes(512);
    let (mut loader, a, b) = int_string_loader(options);

    let total_rows = 200;
    let inputs: Vec<(i32, String)> = (0..total_rows)
        .map(|i| {
            let len = rng.gen_range(0..32);
            let text: String = (0..len).map(|_| rng.gen_range('a'..='z')).collect();
            (i, text)
        })
        .collect();

    let mut batches = Vec::new();
    loader.start_batch().unwrap();
    for (i, text) in &inputs {
        if loader.is_full() {
            batches.push(loader.harvest().unwrap());
            loader.start_batch().unwrap();
        }
        loader.start_row().unwrap();
        loader.set_int(&a, *i).unwrap();
        loader.set_string(&b, text).unwrap();
        loader.save_row().unwrap();
    }
    batches.push(loader.harvest().unwrap());

    let mut seen = Vec::new();
    for batch in &batches {
        let ints = int_column(batch, "a");
        let strings = string_column(batch, "b");
        seen.extend(ints.into_iter().zip(strings));
    }
    assert_eq!(seen.len(), inputs.len());
    for ((i, text), (seen_i, seen_text)) in inputs.iter().zip(seen) {
        assert_eq!(*i, seen_i);
        assert_eq!(Some(text.clone()), seen_text);
    }
}

#[test]
fn test_repeated_column_through_handles() {
    let mut loader = ResultSetLoader::new(LoaderOptions::default());
    let tags = loader
        .add_column(ColumnSchema::repeated("tags", DataType::Utf8))
        .unwrap();
    loader.start_batch().unwrap();

    loader.start_row().unwrap();
    loader.append_array_value(&tags, ValueRef::Str("x")).unwrap();
    loader.append_array_value(&tags, ValueRef::Str("y")).unwrap();
    loader.finish_array(&tags).unwrap();
    loader.save_row().unwrap();

    loader.start_row().unwrap();
    loader.finish_array(&tags).unwrap();
    loader.save_row().unwrap();

    let batch = loader.harvest().unwrap();
    let list = batch.column_by_name("tags").unwrap();
    let list = list.as_list::<i32>();
    assert_eq!(list.len(), 2);
    let first = list.value(0);
    let first = first.as_string::<i32>();
    assert_eq!(first.value(0), "x");
    assert_eq!(first.value(1), "y");
    assert_eq!(list.value(1).len(), 0);
}
