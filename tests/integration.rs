//! End-to-end tests for sqleval: query and table documents in, result
//! table out, exercising the full bind/join/filter/group/project/sort
//! pipeline.

use std::collections::HashMap;

use sqleval::{evaluate, Query, Table, Value};

fn int(i: i64) -> Value {
    Value::Integer(i)
}

fn text(s: &str) -> Value {
    Value::Text(s.into())
}

fn run(query: &str, tables: &[(&str, &str)]) -> sqleval::Result<Table> {
    let query = Query::from_json(query).unwrap();
    let tables: HashMap<String, Table> = tables
        .iter()
        .map(|(name, json)| (name.to_string(), Table::from_json(json).unwrap()))
        .collect();
    evaluate(&query, &tables)
}

const T: &str = r#"{"columns": ["id", "val"], "rows": [[1, 10], [2, null], [3, 30]]}"#;

#[test]
fn test_select_star_round_trip() {
    let result = run(r#"{"select": ["*"], "from": [{"source": "t"}]}"#, &[("t", T)]).unwrap();
    assert_eq!(result.columns, vec!["id", "val"]);
    assert_eq!(
        result.rows,
        vec![
            vec![int(1), int(10)],
            vec![int(2), Value::Null],
            vec![int(3), int(30)],
        ]
    );
}

#[test]
fn test_where_with_null_and_order_desc() {
    // Row 2 is excluded because null > 5 is null, not false.
    let result = run(
        r#"{"select": [{"expr": {"column": {"name": "id"}}},
                       {"expr": {"column": {"name": "val"}}}],
            "from": [{"source": "t"}],
            "where": {"op": ">", "left": {"column": {"name": "val"}}, "right": {"literal": 5}},
            "order_by": [{"expr": {"column": {"name": "val"}}, "dir": "desc"}]}"#,
        &[("t", T)],
    )
    .unwrap();
    assert_eq!(result.rows, vec![vec![int(3), int(30)], vec![int(1), int(10)]]);
}

#[test]
fn test_count_star_and_sum_over_whole_table() {
    // COUNT(*) counts every row; SUM skips the null.
    let result = run(
        r#"{"select": [{"expr": {"aggregate": "count"}, "as": "n"},
                       {"expr": {"aggregate": "sum", "arg": {"column": {"name": "val"}}}}],
            "from": [{"source": "t"}]}"#,
        &[("t", T)],
    )
    .unwrap();
    assert_eq!(result.columns, vec!["n", "sum(val)"]);
    assert_eq!(result.rows, vec![vec![int(3), int(40)]]);
}

#[test]
fn test_cartesian_product_and_alias_disambiguation() {
    let u = r#"{"columns": ["id"], "rows": [[7], [8]]}"#;
    let result = run(
        r#"{"select": [{"expr": {"column": {"table": "a", "name": "id"}}},
                       {"expr": {"column": {"table": "b", "name": "id"}}, "as": "other"}],
            "from": [{"source": "t", "as": "a"}, {"source": "u", "as": "b"}]}"#,
        &[("t", T), ("u", u)],
    )
    .unwrap();
    assert_eq!(result.rows.len(), 6);
    assert_eq!(result.columns, vec!["id", "other"]);
    assert_eq!(result.rows[0], vec![int(1), int(7)]);
    assert_eq!(result.rows[5], vec![int(3), int(8)]);
}

#[test]
fn test_self_join_with_predicate() {
    let result = run(
        r#"{"select": [{"expr": {"column": {"table": "a", "name": "id"}}, "as": "left"},
                       {"expr": {"column": {"table": "b", "name": "id"}}, "as": "right"}],
            "from": [{"source": "t", "as": "a"},
                     {"source": "t", "as": "b",
                      "on": {"op": "<",
                             "left": {"column": {"table": "a", "name": "id"}},
                             "right": {"column": {"table": "b", "name": "id"}}}}]}"#,
        &[("t", T)],
    )
    .unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![int(1), int(2)],
            vec![int(1), int(3)],
            vec![int(2), int(3)],
        ]
    );
}

#[test]
fn test_three_table_join_cardinality() {
    let u = r#"{"columns": ["x"], "rows": [[1], [2]]}"#;
    let v = r#"{"columns": ["y"], "rows": [["a"], ["b"], ["c"], ["d"]]}"#;
    let result = run(
        r#"{"select": ["*"],
            "from": [{"source": "t"}, {"source": "u"}, {"source": "v"}]}"#,
        &[("t", T), ("u", u), ("v", v)],
    )
    .unwrap();
    assert_eq!(result.rows.len(), 3 * 2 * 4);
    assert_eq!(result.columns, vec!["id", "val", "x", "y"]);
}

#[test]
fn test_group_by_with_aggregates_and_having() {
    let sales = r#"{"columns": ["region", "amount"],
                    "rows": [["west", 100], ["east", 20], ["west", 50],
                             ["east", 5], ["north", null]]}"#;
    let result = run(
        r#"{"select": [{"expr": {"column": {"name": "region"}}},
                       {"expr": {"aggregate": "count"}, "as": "n"},
                       {"expr": {"aggregate": "sum", "arg": {"column": {"name": "amount"}}}, "as": "total"}],
            "from": [{"source": "sales"}],
            "group_by": [{"column": {"name": "region"}}],
            "having": {"op": ">=",
                       "left": {"aggregate": "count"},
                       "right": {"literal": 1}}}"#,
        &[("sales", sales)],
    )
    .unwrap();
    assert_eq!(result.columns, vec!["region", "n", "total"]);
    // First-appearance group order; SUM over the all-null group is null.
    assert_eq!(
        result.rows,
        vec![
            vec![text("west"), int(2), int(150)],
            vec![text("east"), int(2), int(25)],
            vec![text("north"), int(1), Value::Null],
        ]
    );
}

#[test]
fn test_having_without_group_by_forces_single_group() {
    // HAVING alone aggregates the whole table into one implicit group.
    let result = run(
        r#"{"select": [{"expr": {"aggregate": "count"}}],
            "from": [{"source": "t"}],
            "having": {"op": ">", "left": {"aggregate": "count"}, "right": {"literal": 2}}}"#,
        &[("t", T)],
    )
    .unwrap();
    assert_eq!(result.rows, vec![vec![int(3)]]);

    let result = run(
        r#"{"select": [{"expr": {"aggregate": "count"}}],
            "from": [{"source": "t"}],
            "having": {"op": ">", "left": {"aggregate": "count"}, "right": {"literal": 5}}}"#,
        &[("t", T)],
    )
    .unwrap();
    assert!(result.rows.is_empty());

    // A plain column cannot be projected out of the implicit group.
    let err = run(
        r#"{"select": [{"expr": {"column": {"name": "id"}}}],
            "from": [{"source": "t"}],
            "having": {"op": ">", "left": {"aggregate": "count"}, "right": {"literal": 0}}}"#,
        &[("t", T)],
    )
    .unwrap_err();
    assert!(err.to_string().contains("must appear in GROUP BY"));
}

#[test]
fn test_group_by_expression_key() {
    // Group by a computed bucket and order by its first appearance.
    let nums = r#"{"columns": ["n"], "rows": [[1], [2], [3], [4], [5], [6]]}"#;
    let result = run(
        r#"{"select": [{"expr": {"op": "%", "left": {"column": {"name": "n"}}, "right": {"literal": 3}}, "as": "bucket"},
                       {"expr": {"aggregate": "count"}, "as": "n"}],
            "from": [{"source": "nums"}],
            "group_by": [{"op": "%", "left": {"column": {"name": "n"}}, "right": {"literal": 3}}]}"#,
        &[("nums", nums)],
    )
    .unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![int(1), int(2)],
            vec![int(2), int(2)],
            vec![int(0), int(2)],
        ]
    );
}

#[test]
fn test_avg_min_max_and_distinct() {
    let m = r#"{"columns": ["v"], "rows": [[4], [4], [2], [null], [6]]}"#;
    let result = run(
        r#"{"select": [{"expr": {"aggregate": "avg", "arg": {"column": {"name": "v"}}}, "as": "mean"},
                       {"expr": {"aggregate": "min", "arg": {"column": {"name": "v"}}}, "as": "lo"},
                       {"expr": {"aggregate": "max", "arg": {"column": {"name": "v"}}}, "as": "hi"},
                       {"expr": {"aggregate": "count", "arg": {"column": {"name": "v"}}, "distinct": true}, "as": "uniq"}],
            "from": [{"source": "m"}]}"#,
        &[("m", m)],
    )
    .unwrap();
    assert_eq!(
        result.rows,
        vec![vec![Value::Float(4.0), int(2), int(6), int(3)]]
    );
}

#[test]
fn test_case_expression_in_projection() {
    let result = run(
        r#"{"select": [{"expr": {"column": {"name": "id"}}},
                       {"expr": {"case": [{"when": {"op": ">", "left": {"column": {"name": "val"}}, "right": {"literal": 20}},
                                          "then": {"literal": "big"}},
                                         {"when": {"op": ">", "left": {"column": {"name": "val"}}, "right": {"literal": 0}},
                                          "then": {"literal": "small"}}],
                                 "else": {"literal": "unknown"}}, "as": "size"}],
            "from": [{"source": "t"}]}"#,
        &[("t", T)],
    )
    .unwrap();
    // The null row falls through both conditions into the else branch.
    assert_eq!(
        result.rows,
        vec![
            vec![int(1), text("small")],
            vec![int(2), text("unknown")],
            vec![int(3), text("big")],
        ]
    );
}

#[test]
fn test_multi_key_sort_with_mixed_directions() {
    let s = r#"{"columns": ["a", "b"],
                "rows": [[1, "x"], [2, "y"], [1, "y"], [2, "x"], [1, "x"]]}"#;
    let result = run(
        r#"{"select": ["*"],
            "from": [{"source": "s"}],
            "order_by": [{"expr": {"column": {"name": "a"}}, "dir": "desc"},
                         {"expr": {"column": {"name": "b"}}}]}"#,
        &[("s", s)],
    )
    .unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![int(2), text("x")],
            vec![int(2), text("y")],
            vec![int(1), text("x")],
            vec![int(1), text("x")],
            vec![int(1), text("y")],
        ]
    );
}

#[test]
fn test_order_by_aggregate_with_limit() {
    let sales = r#"{"columns": ["region", "amount"],
                    "rows": [["west", 100], ["east", 20], ["west", 50], ["south", 300]]}"#;
    let result = run(
        r#"{"select": [{"expr": {"column": {"name": "region"}}}],
            "from": [{"source": "sales"}],
            "group_by": [{"column": {"name": "region"}}],
            "order_by": [{"expr": {"aggregate": "sum", "arg": {"column": {"name": "amount"}}}, "dir": "desc"}],
            "limit": 2}"#,
        &[("sales", sales)],
    )
    .unwrap();
    assert_eq!(result.rows, vec![vec![text("south")], vec![text("west")]]);
}

#[test]
fn test_limit_zero_yields_no_rows() {
    let result = run(
        r#"{"select": ["*"], "from": [{"source": "t"}], "limit": 0}"#,
        &[("t", T)],
    )
    .unwrap();
    assert!(result.rows.is_empty());
    assert_eq!(result.columns, vec!["id", "val"]);
}

#[test]
fn test_arithmetic_projection_and_float_promotion() {
    let result = run(
        r#"{"select": [{"expr": {"op": "*", "left": {"column": {"name": "val"}}, "right": {"literal": 0.5}}, "as": "half"}],
            "from": [{"source": "t"}]}"#,
        &[("t", T)],
    )
    .unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![Value::Float(5.0)],
            vec![Value::Null],
            vec![Value::Float(15.0)],
        ]
    );
}

#[test]
fn test_evaluation_errors_are_messages() {
    let err = run(
        r#"{"select": [{"expr": {"column": {"name": "nope"}}}], "from": [{"source": "t"}]}"#,
        &[("t", T)],
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "ERROR: Column reference \"nope\" does not exist."
    );

    let err = run(
        r#"{"select": ["*"], "from": [{"source": "missing"}]}"#,
        &[("t", T)],
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "ERROR: Unknown table name \"missing\".");

    let err = run(
        r#"{"select": [{"expr": {"column": {"name": "id"}}}],
            "from": [{"source": "t"}],
            "where": {"op": "=", "left": {"column": {"name": "id"}}, "right": {"literal": "one"}}}"#,
        &[("t", T)],
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "ERROR: Incompatible types to \"=\": integer and text."
    );
}

#[test]
fn test_result_document_shape() {
    let result = run(
        r#"{"select": [{"expr": {"column": {"name": "id"}}}],
            "from": [{"source": "t"}], "limit": 1}"#,
        &[("t", T)],
    )
    .unwrap();
    let json = result.to_json();
    let round = Table::from_json(&json).unwrap();
    assert_eq!(round, result);
    assert!(json.contains("\"columns\": [\"id\"]"));
}
