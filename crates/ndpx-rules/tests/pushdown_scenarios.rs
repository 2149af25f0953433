//! End-to-end tests: filter/projection pushdown over a TPC-DS-style table.
//!
//! Constructs Scan→Filter(→Project) plans over `tpcds.store_sales`, attaches
//! catalog statistics, runs the rewrite rules to a fix point, and verifies
//! the shape of the rewritten plan: which relation was synthesized, which
//! directives it carries, and which Filter/Project nodes survive locally.

use ndpx_core::catalog::{InMemoryCatalog, TableRef};
use ndpx_core::expr::{AttributeRef, BinaryOp, DataType, Expr, ScalarValue};
use ndpx_core::options::{keys, OptionMap};
use ndpx_core::plan::{PlanNode, ScanNode, ScanSource};
use ndpx_core::stats::{ColumnStatistics, Statistics};
use ndpx_remote::NdpJsonSerializer;
use ndpx_rules::driver::{default_rules, optimize, speculative_rewrite, PushdownConfig, RuleContext};
use std::sync::Arc;

const STORE_SALES_ROWS: f64 = 2_880_404.0;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn columns() -> Vec<AttributeRef> {
    vec![
        AttributeRef::new(1, "ss_quantity", DataType::Int64, true),
        AttributeRef::new(2, "ss_item_sk", DataType::Int64, false),
        AttributeRef::new(3, "ss_sales_price", DataType::Float64, true),
    ]
}

fn store_sales_catalog() -> (InMemoryCatalog, TableRef) {
    let table = TableRef::new("tpcds", "store_sales");
    let cols = columns();
    let mut stats = Statistics::new(STORE_SALES_ROWS, STORE_SALES_ROWS * 24.0)
        .with_storage_size(52_428_800);
    for c in &cols {
        stats = stats.with_column(&c.name, ColumnStatistics::new(1000.0, 0.05));
    }
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(&table, cols, stats);
    (catalog, table)
}

fn store_sales_scan(table: &TableRef) -> Arc<PlanNode> {
    let cols = columns();
    Arc::new(PlanNode::Scan(ScanNode {
        source: ScanSource::ParquetFile {
            location: "hdfs://data/tpcds/store_sales".into(),
        },
        output: cols.clone(),
        schema: cols,
        options: OptionMap::new(),
        table: Some(table.clone()),
        estimate: None,
    }))
}

fn run(plan: &Arc<PlanNode>, config: &PushdownConfig) -> Arc<PlanNode> {
    let (catalog, _) = store_sales_catalog();
    let serializer = NdpJsonSerializer::new();
    let ctx = RuleContext {
        catalog: &catalog,
        serializer: &serializer,
        size_service: None,
        config,
    };
    optimize(plan, &default_rules(), &ctx)
}

fn quantity_filters() -> Vec<Expr> {
    let cols = columns();
    vec![
        Expr::binary(
            BinaryOp::Gt,
            Expr::attr(&cols[0]),
            Expr::lit(ScalarValue::Int64(5)),
        ),
        Expr::binary(
            BinaryOp::Eq,
            Expr::attr(&cols[1]),
            Expr::lit(ScalarValue::Int64(42)),
        ),
    ]
}

fn remote_scan(plan: &PlanNode) -> &ScanNode {
    match plan {
        PlanNode::Scan(scan) if scan.source.is_remote() => scan,
        other => panic!("expected a remote scan, got {:?}", other.kind()),
    }
}

#[test]
fn null_only_filters_leave_plan_untouched() {
    init_tracing();
    let (_, table) = store_sales_catalog();
    let cols = columns();
    let plan = Arc::new(PlanNode::Project {
        exprs: vec![Expr::attr(&cols[0])],
        child: Arc::new(PlanNode::Filter {
            predicates: vec![Expr::is_not_null(&cols[0])],
            child: store_sales_scan(&table),
        }),
    });
    let optimized = run(&plan, &PushdownConfig::default());
    assert_eq!(*optimized, *plan);
}

#[test]
fn fully_valid_filters_collapse_to_bare_remote_scan() {
    init_tracing();
    let (_, table) = store_sales_catalog();
    let cols = columns();
    // projection covers every column, filters reference the first two
    let plan = Arc::new(PlanNode::Project {
        exprs: cols.iter().map(Expr::attr).collect(),
        child: Arc::new(PlanNode::Filter {
            predicates: quantity_filters(),
            child: store_sales_scan(&table),
        }),
    });
    let optimized = run(&plan, &PushdownConfig::default());

    // fully absorbed: no local Filter, no reordering Project
    let scan = remote_scan(&optimized);
    let names: Vec<&str> = scan.schema.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["ss_quantity", "ss_item_sk", "ss_sales_price"]);

    assert_eq!(
        scan.options.get(keys::PATH),
        Some("hdfs://data/tpcds/store_sales")
    );
    assert_eq!(scan.options.get(keys::FORMAT), Some("parquet"));
    assert_eq!(scan.options.get(keys::OUTPUT_FORMAT), Some("binary"));
    assert_eq!(
        scan.options.get(keys::NDP_PROJECT_COLUMNS),
        Some("ss_quantity,ss_item_sk,ss_sales_price")
    );
    assert_eq!(
        scan.options.get(keys::NDP_PROJECT_JSON),
        Some(r#"["ss_quantity","ss_item_sk","ss_sales_price"]"#)
    );
    let query = scan.options.get(keys::NDP_QUERY_TEXT).unwrap();
    assert!(query.contains("ss_quantity > 5"));
    let filters_json = scan.options.get(keys::NDP_JSON_FILTERS).unwrap();
    assert!(filters_json.contains("\"column\":\"ss_item_sk\""));

    // the synthesized relation carries a smaller estimate than the table
    let estimate = scan.estimate.unwrap();
    assert!(estimate.row_count < STORE_SALES_ROWS);
    assert!(estimate.row_count >= 1.0);
}

#[test]
fn narrower_projection_narrows_the_remote_schema() {
    init_tracing();
    let (_, table) = store_sales_catalog();
    let cols = columns();
    let plan = Arc::new(PlanNode::Project {
        exprs: vec![Expr::attr(&cols[2])],
        child: Arc::new(PlanNode::Filter {
            predicates: vec![Expr::binary(
                BinaryOp::Gt,
                Expr::attr(&cols[2]),
                Expr::lit(ScalarValue::Float64(1.5.into())),
            )],
            child: store_sales_scan(&table),
        }),
    });
    let optimized = run(&plan, &PushdownConfig::default());

    // fully absorbed filter over the projected column: one column read
    let scan = remote_scan(&optimized);
    assert_eq!(scan.schema.len(), 1);
    assert_eq!(scan.schema[0].name, "ss_sales_price");
}

#[test]
fn unsupported_filter_keeps_local_filter_and_widens_read() {
    init_tracing();
    let (_, table) = store_sales_catalog();
    let cols = columns();
    let unsupported = Expr::Function {
        name: "regexp_like".into(),
        args: vec![Expr::attr(&cols[0])],
    };
    let plan = Arc::new(PlanNode::Project {
        exprs: vec![Expr::attr(&cols[1])],
        child: Arc::new(PlanNode::Filter {
            predicates: vec![unsupported.clone()],
            child: store_sales_scan(&table),
        }),
    });
    let optimized = run(&plan, &PushdownConfig::default());

    // Project → Filter(original predicate) → remote scan
    let PlanNode::Project { exprs, child } = &*optimized else {
        panic!("expected a restored projection");
    };
    assert_eq!(exprs, &vec![Expr::attr(&cols[1])]);
    let PlanNode::Filter { predicates, child } = &**child else {
        panic!("expected a residual local filter");
    };
    assert_eq!(predicates, &vec![unsupported]);

    // the remote relation reads projection and filter columns, and carries
    // no filter directives
    let scan = remote_scan(child);
    let names: Vec<&str> = scan.schema.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["ss_item_sk", "ss_quantity"]);
    assert!(scan.options.get(keys::NDP_JSON_FILTERS).is_none());
    assert!(scan.options.get(keys::NDP_QUERY_TEXT).is_none());
}

#[test]
fn partially_supported_filters_push_subset_and_refilter_locally() {
    init_tracing();
    let (_, table) = store_sales_catalog();
    let cols = columns();
    let supported = Expr::binary(
        BinaryOp::Gt,
        Expr::attr(&cols[0]),
        Expr::lit(ScalarValue::Int64(5)),
    );
    let unsupported = Expr::Function {
        name: "regexp_like".into(),
        args: vec![Expr::attr(&cols[1])],
    };
    let plan = Arc::new(PlanNode::Project {
        exprs: vec![Expr::attr(&cols[0]), Expr::attr(&cols[1])],
        child: Arc::new(PlanNode::Filter {
            predicates: vec![supported.clone(), unsupported.clone()],
            child: store_sales_scan(&table),
        }),
    });
    let optimized = run(&plan, &PushdownConfig::default());

    // the residual filter re-applies the FULL original predicate set
    let PlanNode::Filter { predicates, child } = &*optimized else {
        panic!("expected a residual local filter");
    };
    assert_eq!(predicates, &vec![supported, unsupported]);

    // only the supported filter went remote
    let scan = remote_scan(child);
    let filters_json = scan.options.get(keys::NDP_JSON_FILTERS).unwrap();
    assert!(filters_json.contains("\"column\":\"ss_quantity\""));
    assert!(!filters_json.contains("regexp_like"));
}

#[test]
fn rewrite_is_idempotent_across_passes() {
    init_tracing();
    let (_, table) = store_sales_catalog();
    let cols = columns();
    let plan = Arc::new(PlanNode::Project {
        exprs: cols.iter().map(Expr::attr).collect(),
        child: Arc::new(PlanNode::Filter {
            predicates: quantity_filters(),
            child: store_sales_scan(&table),
        }),
    });
    let once = run(&plan, &PushdownConfig::default());
    let twice = run(&once, &PushdownConfig::default());
    assert_eq!(*once, *twice);
}

#[test]
fn opaque_relations_are_never_rewritten() {
    init_tracing();
    let cols = columns();
    let plan = Arc::new(PlanNode::Filter {
        predicates: quantity_filters(),
        child: Arc::new(PlanNode::Scan(ScanNode {
            source: ScanSource::Opaque {
                description: "jdbc view".into(),
            },
            output: cols.clone(),
            schema: cols,
            options: OptionMap::new(),
            table: None,
            estimate: None,
        })),
    });
    let optimized = run(&plan, &PushdownConfig::default());
    assert_eq!(*optimized, *plan);
}

#[test]
fn processor_id_is_stamped_into_options() {
    init_tracing();
    let (_, table) = store_sales_catalog();
    let cols = columns();
    let plan = Arc::new(PlanNode::Filter {
        predicates: vec![Expr::binary(
            BinaryOp::Gt,
            Expr::attr(&cols[0]),
            Expr::lit(ScalarValue::Int64(0)),
        )],
        child: store_sales_scan(&table),
    });
    let config = PushdownConfig {
        processor_id: Some("ndp-worker-3".into()),
        ..PushdownConfig::default()
    };
    let optimized = run(&plan, &config);
    let scan = remote_scan(&optimized);
    assert_eq!(scan.options.get(keys::PROCESSOR_ID), Some("ndp-worker-3"));
}

#[test]
fn preexisting_scan_options_survive_the_rewrite() {
    init_tracing();
    let (_, table) = store_sales_catalog();
    let cols = columns();
    let mut options = OptionMap::new();
    options.set("compression", "snappy");
    let scan = Arc::new(PlanNode::Scan(ScanNode {
        source: ScanSource::ParquetFile {
            location: "hdfs://data/tpcds/store_sales".into(),
        },
        output: cols.clone(),
        schema: cols,
        options,
        table: Some(table.clone()),
        estimate: None,
    }));
    let plan = Arc::new(PlanNode::Filter {
        predicates: quantity_filters(),
        child: scan,
    });
    let optimized = run(&plan, &PushdownConfig::default());
    let scan = remote_scan(&optimized);
    assert_eq!(scan.options.get("compression"), Some("snappy"));
    assert!(scan.options.get(keys::NDP_JSON_FILTERS).is_some());
}

#[test]
fn speculative_rewrite_stays_open_for_a_regular_pass() {
    init_tracing();
    let (catalog, table) = store_sales_catalog();
    let serializer = NdpJsonSerializer::new();
    let config = PushdownConfig::default();
    let ctx = RuleContext {
        catalog: &catalog,
        serializer: &serializer,
        size_service: None,
        config: &config,
    };

    let cols = columns();
    let scan = store_sales_scan(&table);
    let project: Vec<Expr> = cols.iter().map(Expr::attr).collect();
    let filters = quantity_filters();

    let speculative = speculative_rewrite(&project, &filters, &scan, &ctx)
        .expect("speculative rewrite should inject a relation");
    let injected = remote_scan(&speculative);
    let ScanSource::Remote(rel) = &injected.source else {
        unreachable!();
    };
    assert!(rel.estimate_only, "speculative relation must stay open");

    // a regular pass over a filter on the injected relation rewrites it
    // again, this time terminally
    let replanned = Arc::new(PlanNode::Filter {
        predicates: filters,
        child: speculative,
    });
    let settled = optimize(&replanned, &default_rules(), &ctx);
    let scan = remote_scan(&settled);
    let ScanSource::Remote(rel) = &scan.source else {
        unreachable!();
    };
    assert!(!rel.estimate_only, "regular rewrite must be terminal");
}

#[test]
fn reestimation_does_not_reapply_filter_selectivity() {
    init_tracing();
    let (catalog, table) = store_sales_catalog();
    let serializer = NdpJsonSerializer::new();
    let config = PushdownConfig::default();
    let ctx = RuleContext {
        catalog: &catalog,
        serializer: &serializer,
        size_service: None,
        config: &config,
    };

    let filters = quantity_filters();
    let direct = optimize(
        &Arc::new(PlanNode::Filter {
            predicates: filters.clone(),
            child: store_sales_scan(&table),
        }),
        &default_rules(),
        &ctx,
    );
    let direct_rows = remote_scan(&direct).estimate.unwrap().row_count;

    // the same fragment via a speculative injection and a regular pass must
    // settle at the same row estimate, not a doubly-filtered one
    let project: Vec<Expr> = columns().iter().map(Expr::attr).collect();
    let speculative =
        speculative_rewrite(&project, &filters, &store_sales_scan(&table), &ctx)
            .expect("speculative rewrite should inject a relation");
    let settled = optimize(
        &Arc::new(PlanNode::Filter {
            predicates: filters,
            child: speculative,
        }),
        &default_rules(),
        &ctx,
    );
    let settled_rows = remote_scan(&settled).estimate.unwrap().row_count;
    assert_eq!(settled_rows, direct_rows);
}
