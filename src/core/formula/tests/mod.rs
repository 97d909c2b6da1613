//! End-to-end engine tests: source text and JSON inputs in, values or errors out

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn inputs(value: JsonValue) -> Map<String, JsonValue> {
    value.as_object().cloned().unwrap_or_default()
}

fn run(source: &str, input: JsonValue) -> Result<Value, FormulaError> {
    FormulaEngine::default().run(source, &inputs(input))
}

fn num(source: &str, input: JsonValue) -> f64 {
    match run(source, input) {
        Ok(Value::Number(n)) => n,
        other => panic!("expected a number from '{}', got {:?}", source, other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICING FORMULAS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_base_price_plus_fee() {
    assert_eq!(num("base_price + 50", json!({"base_price": 100})), 150.0);
}

#[test]
fn test_area_pricing() {
    let value = num("width * height / 10000", json!({"width": 600, "height": 800}));
    assert_eq!(value, 48.0);
}

#[test]
fn test_conditional_surcharge_with_if() {
    let source = "IF(width > 500, base_price * 1.5, base_price)";
    assert_eq!(num(source, json!({"width": 600, "base_price": 100})), 150.0);
    assert_eq!(num(source, json!({"width": 400, "base_price": 100})), 100.0);
}

#[test]
fn test_material_lookup_with_ternary() {
    let source = r#"material == "oak" ? base * 1.2 : material == "pine" ? base : base * 0.9"#;
    let price = |material: &str| num(source, json!({"material": material, "base": 50}));
    assert_eq!(price("oak"), 60.0);
    assert_eq!(price("pine"), 50.0);
    assert_eq!(price("mdf"), 45.0);
}

#[test]
fn test_rounded_price() {
    let value = num("ROUND(qty * unit_price * (1 - discount), 2)", json!({
        "qty": 3,
        "unit_price": 19.99,
        "discount": 0.15
    }));
    assert_eq!(value, 50.97);
}

#[test]
fn test_min_max_clamp() {
    let source = "MAX(MIN(quote, ceiling), floor)";
    assert_eq!(num(source, json!({"quote": 80, "ceiling": 100, "floor": 20})), 80.0);
    assert_eq!(num(source, json!({"quote": 180, "ceiling": 100, "floor": 20})), 100.0);
    assert_eq!(num(source, json!({"quote": 5, "ceiling": 100, "floor": 20})), 20.0);
}

#[test]
fn test_function_names_are_case_insensitive() {
    assert_eq!(num("abs(-3) + Round(2.4, 0)", json!({})), 5.0);
}

#[test]
fn test_boolean_and_text_results() {
    assert_eq!(
        run("qty >= 10 && member", json!({"qty": 12, "member": true})).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        run(r#"tier == "gold" ? "priority" : "standard""#, json!({"tier": "gold"})).unwrap(),
        Value::Text("priority".to_string())
    );
}

#[test]
fn test_null_input_compares_equal_to_null() {
    assert_eq!(
        run("coupon == null ? price : price - coupon", json!({"coupon": null, "price": 10}))
            .unwrap(),
        Value::Number(10.0)
    );
}

#[test]
fn test_unused_inputs_are_ignored() {
    assert_eq!(num("1 + 1", json!({"width": 1, "label": "x"})), 2.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATOR SEMANTICS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_precedence_through_engine() {
    assert_eq!(num("2 + 3 * 4 ^ 2", json!({})), 50.0);
    assert_eq!(num("-2 ^ 2", json!({})), -4.0);
    assert_eq!(num("2 ^ -1", json!({})), 0.5);
    assert_eq!(num("2 ^ 3 ^ 2", json!({})), 512.0);
    assert_eq!(num("10 - 4 - 3", json!({})), 3.0);
    assert_eq!(num("17 % 5 * 2", json!({})), 4.0);
}

#[test]
fn test_type_strictness() {
    assert_eq!(run(r#""5" == 5"#, json!({})).unwrap(), Value::Bool(false));
    assert_eq!(run("true != 1", json!({})).unwrap(), Value::Bool(true));

    let err = run(r#""5" + 5"#, json!({})).unwrap_err();
    assert_eq!(err.code(), "TypeError");
    assert_eq!(
        err.to_message(),
        "TypeError: Type error: '+' cannot be applied to Text and Number"
    );
}

#[test]
fn test_text_ordering_is_lexicographic() {
    assert_eq!(run(r#""apple" < "banana""#, json!({})).unwrap(), Value::Bool(true));
    assert!(run(r#""apple" < 3"#, json!({})).is_err());
}

#[test]
fn test_short_circuit_skips_errors() {
    // the right side would divide by zero
    assert_eq!(
        run("false && 1 / 0 > 1", json!({})).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(run("true || missing", json!({})).unwrap(), Value::Bool(true));
    assert_eq!(num("IF(true, 1, 1 / 0)", json!({})), 1.0);
    assert_eq!(num("false ? unknown_var : 2", json!({})), 2.0);
}

#[test]
fn test_condition_must_be_boolean() {
    let err = run("IF(1, 2, 3)", json!({})).unwrap_err();
    assert_eq!(err.code(), "TypeError");
    let err = run("qty ? 1 : 2", json!({"qty": 1})).unwrap_err();
    assert_eq!(err.code(), "TypeError");
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_division_by_zero() {
    let err = run("price / qty", json!({"price": 10, "qty": 0})).unwrap_err();
    assert_eq!(err, FormulaError::Eval(EvalError::DivisionByZero));
    assert_eq!(err.to_message(), "DivisionByZero: Division by zero");
    assert!(!err.is_compile_error());

    let err = run("price % 0", json!({"price": 10})).unwrap_err();
    assert_eq!(err.code(), "DivisionByZero");
}

#[test]
fn test_undefined_variable() {
    let err = run("base_price + material_surcharge", json!({"base_price": 100})).unwrap_err();
    assert_eq!(
        err,
        FormulaError::Eval(EvalError::UndefinedVariable("material_surcharge".to_string()))
    );
    assert!(err.to_message().contains("material_surcharge"));
}

#[test]
fn test_unsupported_input_type() {
    let err = run("1", json!({"sizes": [1, 2, 3]})).unwrap_err();
    assert_eq!(err.code(), "UnsupportedInputType");
}

#[test]
fn test_non_finite_result() {
    let err = run("10 ^ 400", json!({})).unwrap_err();
    assert_eq!(err.code(), "NonFiniteResult");
    let err = run("(0 - 1) ^ 0.5", json!({})).unwrap_err();
    assert_eq!(err.code(), "NonFiniteResult");
}

#[test]
fn test_compile_errors() {
    let engine = FormulaEngine::default();

    let err = engine.compile("").unwrap_err();
    assert_eq!(err.code(), "ParseError");
    assert!(err.is_compile_error());

    let err = engine.compile("price = 3").unwrap_err();
    assert_eq!(err.code(), "TokenizeError");

    let err = engine.compile("SQRT(4)").unwrap_err();
    assert_eq!(err.code(), "UnknownFunction");
    assert!(err.to_string().contains("SQRT"));

    let err = engine.compile("ROUND(1)").unwrap_err();
    assert_eq!(err.code(), "ArityMismatch");

    let err = engine.compile("(1 + 2").unwrap_err();
    assert_eq!(err.code(), "ParseError");
}

#[test]
fn test_host_code_names_are_not_callable() {
    let engine = FormulaEngine::default();
    for source in ["eval(1)", "system(1)", "exec(\"rm\")", "include(1)"] {
        let err = engine.compile(source).unwrap_err();
        assert_eq!(err.code(), "UnknownFunction", "source: {}", source);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIMITS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_deep_nesting_is_rejected_not_crashed() {
    let source = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
    let err = FormulaEngine::default().compile(&source).unwrap_err();
    assert_eq!(err.code(), "MaxDepthExceeded");

    let source = format!("{}1", "-".repeat(10_000));
    let err = FormulaEngine::default().compile(&source).unwrap_err();
    assert_eq!(err.code(), "MaxDepthExceeded");
}

/// Runs `f` on a thread with the 2 MiB stack that test threads and tokio workers get
fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(2 << 20)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn test_nesting_at_the_limit_fits_a_small_stack() {
    on_small_stack(|| {
        let engine = FormulaEngine::default();

        // the outer expression is one level, so 255 parentheses reach exactly 256
        let at_limit = format!("{}1{}", "(".repeat(255), ")".repeat(255));
        let expr = engine.compile(&at_limit).unwrap();
        assert_eq!(
            engine.evaluate(&expr, &Map::new()).unwrap(),
            Value::Number(1.0)
        );

        let over_limit = format!("{}1{}", "(".repeat(257), ")".repeat(257));
        assert_eq!(
            engine.compile(&over_limit).unwrap_err(),
            FormulaError::Parse(ParseError::MaxDepthExceeded { limit: 256 })
        );
    });
}

#[test]
fn test_nested_if_chain_fits_a_small_stack() {
    fn nested(levels: usize) -> String {
        (0..levels).fold("a".to_string(), |inner, _| {
            format!("IF(a > 0, (a + {}), 0)", inner)
        })
    }

    on_small_stack(|| {
        let value = FormulaEngine::default()
            .run(&nested(80), &inputs(json!({"a": 1})))
            .unwrap();
        assert_eq!(value, Value::Number(81.0));

        let err = FormulaEngine::default()
            .run(&nested(200), &inputs(json!({"a": 1})))
            .unwrap_err();
        assert_eq!(err.code(), "MaxDepthExceeded");
    });
}

#[test]
fn test_depth_limit_is_clamped() {
    let engine = FormulaEngine::new(EngineLimits {
        max_depth: 1_000_000,
        max_visits: DEFAULT_MAX_VISITS,
    });
    assert_eq!(engine.limits().max_depth, DEFAULT_MAX_DEPTH);

    on_small_stack(move || {
        let source = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert_eq!(
            engine.compile(&source).unwrap_err().code(),
            "MaxDepthExceeded"
        );
    });
}

#[test]
fn test_hand_built_tree_over_the_cap_is_refused() {
    let deep = (0..300).fold(Expr::Literal(Value::Number(1.0)), |inner, _| {
        Expr::UnaryOp {
            op: UnaryOp::Neg,
            operand: Box::new(inner),
        }
    });
    let err = FormulaEngine::default()
        .evaluate(&deep, &Map::new())
        .unwrap_err();
    assert_eq!(err.code(), "MaxDepthExceeded");
}

#[test]
fn test_visit_budget_through_engine() {
    let engine = FormulaEngine::new(EngineLimits {
        max_depth: DEFAULT_MAX_DEPTH,
        max_visits: 10,
    });
    let expr = engine.compile("a + a + a + a + a + a").unwrap();
    let err = engine.evaluate(&expr, &inputs(json!({"a": 1}))).unwrap_err();
    assert_eq!(
        err,
        FormulaError::Eval(EvalError::ExecutionBudgetExceeded { limit: 10 })
    );

    // the same formula fits the default budget
    let value = FormulaEngine::default()
        .evaluate(&expr, &inputs(json!({"a": 1})))
        .unwrap();
    assert_eq!(value, Value::Number(6.0));
}

#[test]
fn test_custom_depth_limit() {
    let engine = FormulaEngine::new(EngineLimits {
        max_depth: 4,
        max_visits: DEFAULT_MAX_VISITS,
    });
    assert!(engine.compile("1 + 2").is_ok());
    assert_eq!(
        engine.compile("((((1))))+((((2))))").unwrap_err().code(),
        "MaxDepthExceeded"
    );
}

#[test]
fn test_evaluation_is_deterministic() {
    let engine = FormulaEngine::default();
    let expr = engine
        .compile("ROUND(width * height / 10000 * rate, 2)")
        .unwrap();
    let input = inputs(json!({"width": 613, "height": 777, "rate": 3.3}));
    let first = engine.evaluate(&expr, &input).unwrap();
    for _ in 0..10 {
        assert_eq!(engine.evaluate(&expr, &input).unwrap(), first);
    }
}

#[test]
fn test_referenced_variables_via_engine() {
    let expr = FormulaEngine::default()
        .compile("IF(width > 500, base_price * 1.5, base_price)")
        .unwrap();
    assert_eq!(expr.referenced_variables(), vec!["width", "base_price"]);
}
