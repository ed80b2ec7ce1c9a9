use arrow_array::cast::AsArray;
use arrow_array::types::Int32Type;
use arrow_array::{Array, RecordBatch};
use arrow_schema::DataType;

use rsf_core::schema::{ColumnSchema, SchemaPath};
use rsf_scan::operator::{IterOutcome, ScanOperator};
use rsf_scan::options::ScanOptions;
use rsf_scan::orchestrator::ScanOrchestrator;
use rsf_scan::reader::{RowBatchReader, VecReaderFactory};
use rsf_test_util::{
    Cell, ColumnsArrayReader, CountingFactory, FailingReader, MockEarlyReader, SkippedReader,
};

fn paths(list: &[&str]) -> Vec<SchemaPath> {
    list.iter().map(|s| SchemaPath::parse(s).unwrap()).collect()
}

fn scan(
    options: ScanOptions,
    projection: &[&str],
    readers: Vec<Box<dyn RowBatchReader>>,
) -> ScanOperator {
    let orchestrator = ScanOrchestrator::new(options, &paths(projection)).unwrap();
    ScanOperator::new(orchestrator, Box::new(VecReaderFactory::new(readers)))
}

fn ab_schema() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::required("a", DataType::Int32),
        ColumnSchema::optional("b", DataType::Utf8),
    ]
}

fn ab_rows(rows: &[(i32, Option<&str>)]) -> Vec<Vec<Cell>> {
    rows.iter()
        .map(|(a, b)| {
            vec![
                Cell::Int(*a),
                match b {
                    Some(b) => Cell::s(b),
                    None => Cell::Null,
                },
            ]
        })
        .collect()
}

fn int_col(batch: &RecordBatch, name: &str) -> Vec<i32> {
    batch
        .column_by_name(name)
        .unwrap()
        .as_primitive::<Int32Type>()
        .values()
        .to_vec()
}

fn str_col(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let column = batch.column_by_name(name).unwrap();
    let column = column.as_string::<i32>();
    (0..column.len())
        .map(|i| (!column.is_null(i)).then(|| column.value(i).to_string()))
        .collect()
}

fn current_batch(operator: &ScanOperator) -> RecordBatch {
    operator.batch_accessor().unwrap().batch().clone()
}

#[test]
fn test_wildcard_with_legacy_metadata() {
    let options = ScanOptions::builder()
        .set_legacy_wildcard_expansion(true)
        .build();
    let reader = MockEarlyReader::new(
        ab_schema(),
        ab_rows(&[(1, Some("fred")), (2, Some("wilma"))]),
    )
    .with_file("/w/x/y/z.csv", "/w");
    let mut operator = scan(options, &["*"], vec![reader.boxed()]);

    assert!(operator.build_schema().unwrap());
    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    let batch = current_batch(&operator);
    let names: Vec<&str> = batch
        .schema_ref()
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect();
    assert_eq!(
        names,
        vec!["a", "b", "fqn", "filepath", "filename", "suffix", "dir0", "dir1"]
    );
    assert_eq!(int_col(&batch, "a"), vec![1, 2]);
    assert_eq!(
        str_col(&batch, "b"),
        vec![Some("fred".into()), Some("wilma".into())]
    );
    for (name, value) in [
        ("fqn", "/w/x/y/z.csv"),
        ("filepath", "/w/x/y"),
        ("filename", "z.csv"),
        ("suffix", "csv"),
        ("dir0", "x"),
        ("dir1", "y"),
    ] {
        assert_eq!(
            str_col(&batch, name),
            vec![Some(value.to_string()), Some(value.to_string())],
            "column {name}"
        );
    }
    assert_eq!(operator.next().unwrap(), IterOutcome::None);
    operator.close().unwrap();
}

#[test]
fn test_missing_column_becomes_null_int() {
    let reader = MockEarlyReader::new(
        ab_schema(),
        ab_rows(&[(1, Some("fred")), (2, Some("wilma"))]),
    );
    let mut operator = scan(ScanOptions::default(), &["a", "b", "c"], vec![reader.boxed()]);

    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    let batch = current_batch(&operator);
    let c = batch.column_by_name("c").unwrap();
    assert_eq!(c.data_type(), &DataType::Int32);
    assert_eq!(c.null_count(), 2);
    operator.close().unwrap();
}

#[test]
fn test_schema_smoothing_across_readers() {
    let options = ScanOptions::builder().set_schema_smoothing(true).build();
    let readers: Vec<Box<dyn RowBatchReader>> = vec![
        MockEarlyReader::new(ab_schema(), ab_rows(&[(10, Some("fred")), (20, Some("wilma"))]))
            .boxed(),
        MockEarlyReader::new(
            vec![ColumnSchema::required("a", DataType::Int32)],
            vec![vec![Cell::Int(30)], vec![Cell::Int(40)]],
        )
        .boxed(),
        MockEarlyReader::new(ab_schema(), ab_rows(&[(50, Some("dino")), (60, Some("barney"))]))
            .boxed(),
    ];
    let mut operator = scan(options, &["*"], readers);

    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    let first = current_batch(&operator);
    assert_eq!(int_col(&first, "a"), vec![10, 20]);

    // the second reader has no b; smoothing keeps the schema and fills nulls
    assert_eq!(operator.next().unwrap(), IterOutcome::Ok);
    let second = current_batch(&operator);
    assert_eq!(int_col(&second, "a"), vec![30, 40]);
    assert_eq!(str_col(&second, "b"), vec![None, None]);

    assert_eq!(operator.next().unwrap(), IterOutcome::Ok);
    let third = current_batch(&operator);
    assert_eq!(str_col(&third, "b"), vec![Some("dino".into()), Some("barney".into())]);

    assert_eq!(operator.next().unwrap(), IterOutcome::None);
    operator.close().unwrap();
}

#[test]
fn test_without_smoothing_schema_version_bumps() {
    let readers: Vec<Box<dyn RowBatchReader>> = vec![
        MockEarlyReader::new(ab_schema(), ab_rows(&[(1, None)])).boxed(),
        MockEarlyReader::new(
            vec![ColumnSchema::required("a", DataType::Int32)],
            vec![vec![Cell::Int(2)]],
        )
        .boxed(),
    ];
    let mut operator = scan(ScanOptions::default(), &["*"], readers);
    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    // a genuinely different schema arrives under a new version
    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    operator.close().unwrap();
}

#[test]
fn test_columns_array_projection() {
    let options = ScanOptions::builder().set_enable_columns_array(true).build();
    let reader = ColumnsArrayReader::new(vec![vec!["a", "b", "c"], vec!["d", "e", "f"]]);
    let mut operator = scan(options, &["columns[0]", "columns[2]"], vec![reader.boxed()]);

    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    let batch = current_batch(&operator);
    assert_eq!(batch.num_columns(), 1);
    let column = batch.column_by_name("columns").unwrap();
    let column = column.as_list::<i32>();
    let row0 = column.value(0);
    let row0 = row0.as_string::<i32>();
    // index 1 is unprojected: present for position, never materialised
    assert_eq!(row0.value(0), "a");
    assert_eq!(row0.value(1), "");
    assert_eq!(row0.value(2), "c");
    let row1 = column.value(1);
    let row1 = row1.as_string::<i32>();
    assert_eq!(row1.value(2), "f");
    operator.close().unwrap();
}

#[test]
fn test_empty_scan_requires_a_reader() {
    let mut operator = scan(ScanOptions::default(), &["a"], vec![]);
    let err = operator.build_schema().unwrap_err();
    assert!(err.to_string().contains("at least one reader"), "{err}");
    // failure still closes cleanly
    operator.close().unwrap();
}

#[test]
fn test_empty_scan_allowed_by_option() {
    let options = ScanOptions::builder().set_allow_empty_scan(true).build();
    let mut operator = scan(options, &["a"], vec![]);
    assert!(!operator.build_schema().unwrap());
    let mut operator2 = scan(
        ScanOptions::builder().set_allow_empty_scan(true).build(),
        &["a"],
        vec![],
    );
    assert_eq!(operator2.next().unwrap(), IterOutcome::None);
}

#[test]
fn test_schema_only_reader_emits_one_empty_batch() {
    let reader = MockEarlyReader::new(ab_schema(), vec![]);
    let mut operator = scan(ScanOptions::default(), &["*"], vec![reader.boxed()]);

    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    let batch = current_batch(&operator);
    assert_eq!(batch.num_rows(), 0);
    assert_eq!(batch.num_columns(), 2);
    assert_eq!(operator.next().unwrap(), IterOutcome::None);
    operator.close().unwrap();
}

#[test]
fn test_skipped_readers_are_soft_failures() {
    let readers: Vec<Box<dyn RowBatchReader>> = vec![
        Box::new(SkippedReader),
        MockEarlyReader::new(ab_schema(), ab_rows(&[(7, Some("ok"))])).boxed(),
        Box::new(SkippedReader),
    ];
    let mut operator = scan(ScanOptions::default(), &["*"], readers);
    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    assert_eq!(int_col(&current_batch(&operator), "a"), vec![7]);
    assert_eq!(operator.next().unwrap(), IterOutcome::None);
    operator.close().unwrap();
}

#[test]
fn test_reader_error_fails_the_scan() {
    let (factory, factory_closes) = CountingFactory::new(vec![Box::new(FailingReader {
        message: "disk on fire".to_string(),
    })]);
    let orchestrator = ScanOrchestrator::new(ScanOptions::default(), &paths(&["*"])).unwrap();
    let mut operator = ScanOperator::new(orchestrator, Box::new(factory));
    let err = operator.next().unwrap_err();
    assert!(err.to_string().contains("disk on fire"), "{err}");
    // the failure path released the factory
    assert_eq!(factory_closes.get(), 1);
    // a failed scan stops; close stays idempotent and does not close again
    assert_eq!(operator.next().unwrap(), IterOutcome::Stop);
    operator.close().unwrap();
    operator.close().unwrap();
    assert_eq!(factory_closes.get(), 1);
}

#[test]
fn test_close_releases_the_factory_once() {
    let reader = MockEarlyReader::new(ab_schema(), ab_rows(&[(1, None)]));
    let (factory, factory_closes) = CountingFactory::new(vec![reader.boxed()]);
    let orchestrator = ScanOrchestrator::new(ScanOptions::default(), &paths(&["*"])).unwrap();
    let mut operator = ScanOperator::new(orchestrator, Box::new(factory));

    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    assert_eq!(operator.next().unwrap(), IterOutcome::None);
    // the factory lives until the scan is told to close
    assert_eq!(factory_closes.get(), 0);
    operator.close().unwrap();
    assert_eq!(factory_closes.get(), 1);
    operator.close().unwrap();
    assert_eq!(factory_closes.get(), 1);
}

#[test]
fn test_cancel_releases_the_factory_once() {
    let reader = MockEarlyReader::new(ab_schema(), ab_rows(&[(1, None), (2, None)]))
        .with_batch_size(1);
    let (factory, factory_closes) = CountingFactory::new(vec![reader.boxed()]);
    let orchestrator = ScanOrchestrator::new(ScanOptions::default(), &paths(&["*"])).unwrap();
    let mut operator = ScanOperator::new(orchestrator, Box::new(factory));

    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    operator.cancel();
    assert_eq!(factory_closes.get(), 1);
    operator.cancel();
    operator.close().unwrap();
    assert_eq!(factory_closes.get(), 1);
}

#[test]
fn test_cancel_stops_the_scan() {
    let reader = MockEarlyReader::new(ab_schema(), ab_rows(&[(1, None), (2, None)]))
        .with_batch_size(1);
    let mut operator = scan(ScanOptions::default(), &["*"], vec![reader.boxed()]);
    assert_eq!(operator.next().unwrap(), IterOutcome::OkNewSchema);
    operator.cancel();
    operator.cancel();
    assert_eq!(operator.next().unwrap(), IterOutcome::Stop);
    operator.close().unwrap();
}

#[test]
fn test_reader_batches_preserve_row_totals() {
    let rows: Vec<(i32, Option<&str>)> = (0..5).map(|i| (i, None)).collect();
    let reader = MockEarlyReader::new(ab_schema(), ab_rows(&rows)).with_batch_size(2);
    let mut operator = scan(ScanOptions::default(), &["a"], vec![reader.boxed()]);

    let mut seen = Vec::new();
    let mut outcomes = Vec::new();
    loop {
        let outcome = operator.next().unwrap();
        if outcome == IterOutcome::None {
            break;
        }
        outcomes.push(outcome);
        seen.extend(int_col(&current_batch(&operator), "a"));
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert_eq!(
        outcomes,
        vec![IterOutcome::OkNewSchema, IterOutcome::Ok, IterOutcome::Ok]
    );
    operator.close().unwrap();
}
