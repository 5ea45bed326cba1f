mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::{Collected, Customer, Header, Order, TestFixtures, generate_orders_document};
use schema_stream::{
    CancellationSignal, DecodeError, ElementFragment, EngineConfig, ErrorCause, ParseRequest,
    RawElement, Record, SchemaSet, StreamingParser, TypeDescriptor,
};

fn orders_request() -> ParseRequest {
    ParseRequest::new()
        .header(TypeDescriptor::serde::<Header>("HeaderType"))
        .record(TypeDescriptor::serde::<Customer>("CustomerType"))
        .record(TypeDescriptor::serde::<Order>("OrderType"))
}

#[tokio::test]
async fn test_parse_file_decodes_header_and_records() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let headers = Collected::new();
    let customers = Collected::new();
    let orders = Collected::new();
    let headers_seen_by_records = Arc::new(AtomicUsize::new(0));

    let mut parser = StreamingParser::new();
    {
        let headers = headers.clone();
        parser.on_header_read(move |event| {
            let headers = headers.clone();
            async move {
                headers.push(event.header_as::<Header>().cloned());
            }
        });
    }
    {
        let customers = customers.clone();
        let orders = orders.clone();
        let seen = Arc::clone(&headers_seen_by_records);
        parser.on_node_read(move |event| {
            let customers = customers.clone();
            let orders = orders.clone();
            let seen = Arc::clone(&seen);
            async move {
                if event.header_as::<Header>().is_some() {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                if let Some(customer) = event.node_as::<Customer>() {
                    customers.push(customer.clone());
                }
                if let Some(order) = event.node_as::<Order>() {
                    orders.push(order.clone());
                }
            }
        });
    }

    let result = parser
        .parse_file(fixtures.orders_valid_xml(), &schemas, orders_request())
        .await;

    assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    assert_eq!(result.parsed_node_count, 5);
    assert!(result.errors.is_empty());

    let headers = headers.items();
    assert_eq!(headers.len(), 1);
    assert_eq!(
        headers[0],
        Some(Header {
            source: "Northwind".to_string(),
            created: "2026-03-01".to_string(),
        })
    );

    let mut customers = customers.items();
    customers.sort_by(|a, b| a.id.cmp(&b.id));
    let ids: Vec<&str> = customers.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["ALFKI", "ANATR", "AROUT"]);
    assert_eq!(customers[0].company_name, "Alfreds Futterkiste");

    let mut quantities: Vec<u64> = orders.items().iter().map(|o| o.quantity).collect();
    quantities.sort_unstable();
    assert_eq!(quantities, [3, 12]);

    assert_eq!(headers_seen_by_records.load(Ordering::SeqCst), 5);
    assert_eq!(
        (customers.len() + quantities.len()) as u64,
        result.parsed_node_count
    );
}

#[tokio::test]
async fn test_validation_errors_are_counted_and_raised() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let raised = Collected::new();
    let mut parser = StreamingParser::new();
    {
        let raised = raised.clone();
        parser.on_error(move |error| {
            let raised = raised.clone();
            async move {
                raised.push(error.message());
            }
        });
    }

    let request = ParseRequest::new().record(TypeDescriptor::serde::<Order>("OrderType"));
    let result = parser
        .parse_file(fixtures.orders_invalid_xml(), &schemas, request)
        .await;

    assert!(!result.is_valid());
    assert_eq!(result.error_count, 2);
    assert_eq!(result.errors.len(), 2);
    assert!(result.terminal_error().is_none());
    for error in &result.errors {
        assert!(matches!(error.cause(), ErrorCause::SchemaValidation(_)));
        assert!(error.line().is_some());
    }
    assert!(result.errors.iter().any(|e| e.message().contains("Quantity")));

    // Invalid records are still decoded and delivered
    assert_eq!(result.parsed_node_count, 3);
    assert_eq!(raised.len() as u64, result.error_count);
}

#[tokio::test]
async fn test_report_errors_disabled_counts_without_listing() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let raised = Arc::new(AtomicUsize::new(0));
    let mut parser = StreamingParser::new();
    {
        let raised = Arc::clone(&raised);
        parser.on_error(move |_| {
            let raised = Arc::clone(&raised);
            async move {
                raised.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let request = ParseRequest::new()
        .record(TypeDescriptor::raw("OrderType"))
        .report_errors(false);
    let result = parser
        .parse_file(fixtures.orders_invalid_xml(), &schemas, request)
        .await;

    assert!(result.error_count >= 2);
    assert!(result.errors.is_empty());
    assert_eq!(raised.load(Ordering::SeqCst) as u64, result.error_count);
}

#[tokio::test]
async fn test_records_carry_the_bound_tag() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let tags = Collected::new();
    let mut parser = StreamingParser::new();
    {
        let tags = tags.clone();
        parser.on_node_read(move |event| {
            let tags = tags.clone();
            async move {
                let raw = event.node_as::<RawElement>().map(|raw| raw.tag.clone());
                tags.push((event.type_name.clone(), event.tag.clone(), raw));
            }
        });
    }

    let request = ParseRequest::new().record(TypeDescriptor::raw("OrderType"));
    let result = parser
        .parse_file(fixtures.orders_valid_xml(), &schemas, request)
        .await;

    assert!(result.is_valid());
    let tags = tags.items();
    assert_eq!(tags.len(), 2);
    for (type_name, tag, raw_tag) in tags {
        assert_eq!(type_name, "OrderType");
        assert_eq!(tag, "Order");
        assert_eq!(raw_tag.as_deref(), Some("Order"));
    }
}

#[tokio::test]
async fn test_unresolved_type_ends_the_run() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::new();

    let request = ParseRequest::new().record(TypeDescriptor::raw("InvoiceType"));
    let result = parser
        .parse_file(fixtures.orders_valid_xml(), &schemas, request)
        .await;

    assert_eq!(result.error_count, 1);
    assert_eq!(result.parsed_node_count, 0);
    match result.terminal_error().map(|e| e.cause()) {
        Some(ErrorCause::UnresolvedType { type_name }) => assert_eq!(type_name, "InvoiceType"),
        other => panic!("expected unresolved type, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ambiguous_type_is_rejected_before_reading() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.ambiguous_schema_set().await;

    let delivered = Arc::new(AtomicUsize::new(0));
    let mut parser = StreamingParser::new();
    {
        let delivered = Arc::clone(&delivered);
        parser.on_node_read(move |_| {
            let delivered = Arc::clone(&delivered);
            async move {
                delivered.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let request = ParseRequest::new().record(TypeDescriptor::raw("BookType"));
    let result = parser
        .parse_file(fixtures.catalog_xml(), &schemas, request)
        .await;

    assert_eq!(result.error_count, 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    match result.terminal_error().map(|e| e.cause()) {
        Some(ErrorCause::AmbiguousMapping(ambiguity)) => {
            assert_eq!(ambiguity.type_name, "BookType");
            assert_eq!(ambiguity.tag, "Item");
            assert!(ambiguity.competing_types.contains("ToolType"));
        }
        other => panic!("expected ambiguous mapping, got {:?}", other),
    }
}

#[tokio::test]
async fn test_enclosing_type_resolves_ambiguity() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.ambiguous_schema_set().await;
    let parser = StreamingParser::new();

    let request = ParseRequest::new().record(TypeDescriptor::raw("BooksType"));
    let result = parser
        .parse_file(fixtures.catalog_xml(), &schemas, request)
        .await;

    assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    assert_eq!(result.parsed_node_count, 1);
}

#[tokio::test]
async fn test_decoder_failures_are_reported_per_record() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::new();

    let failing = TypeDescriptor::new(
        "OrderType",
        |_: &ElementFragment| -> Result<Record, DecodeError> {
            Err(DecodeError::Custom("unsupported order layout".to_string()))
        },
    );
    let result = parser
        .parse_file(
            fixtures.orders_valid_xml(),
            &schemas,
            ParseRequest::new().record(failing),
        )
        .await;

    assert_eq!(result.error_count, 2);
    assert_eq!(result.parsed_node_count, 0);
    assert!(result.terminal_error().is_none());
    for error in &result.errors {
        match error.cause() {
            ErrorCause::Deserialization { type_name, tag, .. } => {
                assert_eq!(type_name, "OrderType");
                assert_eq!(tag, "Order");
            }
            other => panic!("expected deserialization error, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_namespace_mismatch_is_a_decode_error() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::new();

    let request = ParseRequest::new()
        .record(TypeDescriptor::raw("CustomerType").with_namespace("urn:example:crm"));
    let result = parser
        .parse_file(fixtures.orders_valid_xml(), &schemas, request)
        .await;

    assert_eq!(result.error_count, 3);
    assert_eq!(result.parsed_node_count, 0);
    assert!(result.errors.iter().all(|e| matches!(
        e.cause(),
        ErrorCause::Deserialization {
            source: DecodeError::NamespaceMismatch { .. },
            ..
        }
    )));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::new();

    let signal = CancellationSignal::new();
    signal.cancel();
    let result = parser
        .parse_file(
            fixtures.orders_valid_xml(),
            &schemas,
            orders_request().cancellation(signal),
        )
        .await;

    assert!(result.was_cancelled());
    assert_eq!(result.parsed_node_count, 0);
    assert_eq!(result.error_count, 1);
}

#[tokio::test]
async fn test_cancellation_from_an_observer_stops_the_run() {
    const ORDERS: usize = 20_000;
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let document = generate_orders_document(ORDERS);

    let signal = CancellationSignal::new();
    let mut parser = StreamingParser::new();
    {
        let signal = signal.clone();
        parser.on_node_read(move |_| {
            let signal = signal.clone();
            async move { signal.cancel() }
        });
    }

    let request = ParseRequest::new()
        .record(TypeDescriptor::raw("OrderType"))
        .cancellation(signal.clone());
    let result = parser.parse_bytes(document, &schemas, request).await;

    assert!(signal.is_cancelled());
    assert!(result.parsed_node_count < ORDERS as u64);

    let cancellations = result
        .errors
        .iter()
        .filter(|error| matches!(error.cause(), ErrorCause::Cancelled))
        .count();
    assert_eq!(cancellations, 1);
    let validation_errors = result
        .errors
        .iter()
        .filter(|error| matches!(error.cause(), ErrorCause::SchemaValidation(_)))
        .count();
    assert_eq!(result.error_count, (cancellations + validation_errors) as u64);
}

#[tokio::test]
async fn test_drain_timeout_bounds_slow_observers() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let mut parser = StreamingParser::with_config(EngineConfig {
        drain_timeout: Some(Duration::from_millis(200)),
        ..Default::default()
    });
    parser.on_node_read(|_| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let started = Instant::now();
    let request = ParseRequest::new().record(TypeDescriptor::raw("OrderType"));
    let result = parser
        .parse_file(fixtures.orders_valid_xml(), &schemas, request)
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    assert_eq!(result.parsed_node_count, 2);
}

#[tokio::test]
async fn test_empty_bytes_are_invalid_input() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::new();

    let result = parser
        .parse_bytes(Vec::new(), &schemas, orders_request())
        .await;

    assert_eq!(result.error_count, 1);
    match result.terminal_error().map(|e| e.cause()) {
        Some(ErrorCause::InvalidInput { reason }) => {
            assert_eq!(reason, "The byte array is empty.")
        }
        other => panic!("expected invalid input, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_schema_set_is_invalid_input() {
    let fixtures = TestFixtures::new();
    let parser = StreamingParser::new();

    let result = parser
        .parse_file(
            fixtures.orders_valid_xml(),
            &SchemaSet::new(),
            orders_request(),
        )
        .await;

    assert_eq!(result.error_count, 1);
    assert!(matches!(
        result.terminal_error().map(|e| e.cause()),
        Some(ErrorCause::InvalidInput { .. })
    ));
}

#[tokio::test]
async fn test_missing_file_is_reported() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::new();

    let result = parser
        .parse_file(
            fixtures.xml_dir().join("does_not_exist.xml"),
            &schemas,
            orders_request(),
        )
        .await;

    assert_eq!(result.error_count, 1);
    assert!(matches!(
        result.terminal_error().map(|e| e.cause()),
        Some(ErrorCause::InputUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_directory_is_not_a_readable_document() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::new();

    let result = parser
        .parse_file(fixtures.xml_dir(), &schemas, orders_request())
        .await;

    assert_eq!(result.error_count, 1);
    assert_eq!(result.parsed_node_count, 0);
    assert!(matches!(
        result.terminal_error().map(|e| e.cause()),
        Some(ErrorCause::InputUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_malformed_document_is_unrecoverable() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::new();

    let result = parser
        .parse_file(
            fixtures.malformed_xml(),
            &schemas,
            ParseRequest::new().record(TypeDescriptor::raw("OrderType")),
        )
        .await;

    assert!(!result.is_valid());
    assert_eq!(result.parsed_node_count, 0);
    assert!(matches!(
        result.terminal_error().map(|e| e.cause()),
        Some(ErrorCause::UnrecoverableRead(_))
    ));
}

#[tokio::test]
async fn test_finished_observer_sees_the_returned_result() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let finished = Collected::new();
    let mut parser = StreamingParser::new();
    {
        let finished = finished.clone();
        parser.on_finished(move |result| {
            let finished = finished.clone();
            async move {
                finished.push((result.error_count, result.parsed_node_count));
            }
        });
    }

    let request = ParseRequest::new().record(TypeDescriptor::raw("OrderType"));
    let result = parser
        .parse_file(fixtures.orders_invalid_xml(), &schemas, request)
        .await;

    assert_eq!(
        finished.items(),
        vec![(result.error_count, result.parsed_node_count)]
    );
}

#[tokio::test]
async fn test_parse_stream_reads_from_the_start() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;
    let parser = StreamingParser::with_config(EngineConfig {
        concurrency_multiplier: 1,
        ..Default::default()
    });

    let mut stream = Cursor::new(generate_orders_document(500).into_bytes());
    stream.set_position(100);

    let request = ParseRequest::new().record(TypeDescriptor::serde::<Order>("OrderType"));
    let result = parser.parse_stream(stream, &schemas, request).await;

    assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    assert_eq!(result.parsed_node_count, 500);
}

#[tokio::test]
async fn test_parser_can_be_reused_across_runs() {
    let fixtures = TestFixtures::new();
    let schemas = fixtures.orders_schema_set().await;

    let delivered = Arc::new(AtomicUsize::new(0));
    let mut parser = StreamingParser::new();
    {
        let delivered = Arc::clone(&delivered);
        parser.on_node_read(move |_| {
            let delivered = Arc::clone(&delivered);
            async move {
                delivered.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    for _ in 0..3 {
        let request = ParseRequest::new().record(TypeDescriptor::raw("CustomerType"));
        let result = parser
            .parse_file(fixtures.orders_valid_xml(), &schemas, request)
            .await;
        assert_eq!(result.parsed_node_count, 3);
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 9);
}
