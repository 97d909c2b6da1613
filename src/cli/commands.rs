use crate::core::formula::Value;
use crate::core::{FormulaEngine, HarnessConfig, TestRunner};
use crate::error::{HarnessError, HarnessResult};
use crate::storage::{Store, YamlStore};
use crate::types::{
    FormulaId, InputData, SortBy, SortOrder, TestCase, TestCaseFilter, TestCaseId, TestStatus,
};
use colored::Colorize;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Format a signed delta, e.g. `+50` or `-0.25`
fn format_delta(n: f64) -> String {
    let formatted = format_number(n);
    if n > 0.0 {
        format!("+{}", formatted)
    } else {
        formatted
    }
}

/// Parse `key=value` pairs. Values are read as JSON, falling back to plain text.
pub fn parse_inputs(pairs: &[String]) -> HarnessResult<InputData> {
    let mut inputs = InputData::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            HarnessError::Validation(format!("Invalid input '{}': expected key=value", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(HarnessError::Validation(format!(
                "Invalid input '{}': empty key",
                pair
            )));
        }
        inputs.insert(key.to_string(), parse_json_or_text(raw));
    }
    Ok(inputs)
}

/// `150` -> number, `"oak"` or `oak` -> text, `true` -> bool, `null` -> null
pub fn parse_json_or_text(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn status_label(status: TestStatus) -> String {
    match status {
        TestStatus::Passed => "PASS".bold().green().to_string(),
        TestStatus::Failed => "FAIL".bold().red().to_string(),
        TestStatus::Error => "ERROR".bold().bright_red().to_string(),
        TestStatus::Pending => "PENDING".yellow().to_string(),
    }
}

fn json_display(value: Option<&JsonValue>) -> String {
    match value {
        None => "-".dimmed().to_string(),
        Some(JsonValue::Number(n)) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        Some(other) => other.to_string(),
    }
}

/// Print one test case outcome
fn print_test_case<S: Store + ?Sized>(runner: &TestRunner<'_, S>, tc: &TestCase) {
    let timing = tc
        .execution_time_ms
        .map(|ms| format!("({} ms)", ms).dimmed().to_string())
        .unwrap_or_default();
    println!(
        "   {} [{}] {} {}",
        status_label(tc.status),
        tc.id,
        tc.name.bright_blue(),
        timing
    );

    match tc.status {
        TestStatus::Passed => {
            println!("      = {}", json_display(tc.actual_result.as_ref()).bold());
        }
        TestStatus::Failed => {
            println!(
                "      expected {}, got {}",
                json_display(tc.expected_result.as_ref()).bold(),
                json_display(tc.actual_result.as_ref()).bold()
            );
            let comparison = tc
                .actual_result
                .as_ref()
                .and_then(|actual| Value::from_json("actual_result", actual).ok())
                .map(|actual| runner.compare(tc.expected_result.as_ref(), &actual));
            if let Some(comparison) = comparison {
                match comparison.difference {
                    Some(delta) => println!(
                        "      {} (difference {})",
                        comparison.reason.yellow(),
                        format_delta(delta)
                    ),
                    None => println!("      {}", comparison.reason.yellow()),
                }
            }
        }
        TestStatus::Error => {
            if let Some(message) = &tc.error_message {
                println!("      {}", message.red());
            }
        }
        TestStatus::Pending => {}
    }
}

/// Execute the run command
pub fn run(
    suite: PathBuf,
    formula: Option<FormulaId>,
    test: Option<TestCaseId>,
    config: HarnessConfig,
) -> HarnessResult<()> {
    println!("{}", "🔥 Pricing Forge - Running test cases".bold().green());
    println!("   Suite: {}\n", suite.display());

    let store = YamlStore::open(&suite)?;
    let runner = TestRunner::new(&store, config);

    let (mut passed, mut failed, mut error) = (0, 0, 0);

    if let Some(test_id) = test {
        let tc = runner.run_test(test_id)?;
        print_test_case(&runner, &tc);
        match tc.status {
            TestStatus::Passed => passed += 1,
            TestStatus::Failed => failed += 1,
            TestStatus::Error => error += 1,
            TestStatus::Pending => {}
        }
    } else {
        let formula_ids: Vec<FormulaId> = match formula {
            Some(id) => vec![id],
            None => store.list_formulas()?.iter().map(|f| f.id).collect(),
        };

        for formula_id in formula_ids {
            let formula = store.load_formula(formula_id)?;
            println!(
                "{} {} {}",
                "📐".bold(),
                formula.name.bold(),
                format!("= {}", formula.source_code).dimmed()
            );

            let batch = runner.run_all(formula_id)?;
            if batch.results.is_empty() {
                println!("   {}", "no test cases".dimmed());
            }
            for tc in &batch.results {
                print_test_case(&runner, tc);
            }
            println!();

            passed += batch.passed;
            failed += batch.failed;
            error += batch.error;
        }
    }

    let summary = format!(
        "{} passed, {} failed, {} errored",
        passed, failed, error
    );
    if failed == 0 && error == 0 {
        println!("{} {}", "✅".bold(), summary.bold().green());
        Ok(())
    } else {
        println!("{} {}", "❌".bold(), summary.bold().red());
        Err(HarnessError::TestsFailed { failed, error })
    }
}

/// Execute the stats command
pub fn stats(suite: PathBuf, formula: FormulaId, config: HarnessConfig) -> HarnessResult<()> {
    let store = YamlStore::open(&suite)?;
    let runner = TestRunner::new(&store, config);
    let formula_record = store.load_formula(formula)?;
    let stats = runner.stats(formula)?;

    println!("{}", "📊 Pricing Forge - Test Statistics".bold().green());
    println!("   Formula: {} [{}]", formula_record.name.bright_blue().bold(), formula);
    println!("   Source:  {}\n", formula_record.source_code.dimmed());

    println!("   Total:     {}", stats.total);
    println!("   Passed:    {}", stats.passed.to_string().green());
    println!("   Failed:    {}", stats.failed.to_string().red());
    println!("   Errors:    {}", stats.error.to_string().bright_red());
    println!("   Pending:   {}", stats.pending.to_string().yellow());
    println!("   Pass rate: {}", format!("{:.1}%", stats.pass_rate).bold());
    println!("   Coverage:  {}", format!("{:.1}%", stats.coverage).bold());

    if !stats.uncovered_variables.is_empty() {
        println!(
            "   {} {}",
            "Uncovered variables:".yellow(),
            stats.uncovered_variables.join(", ")
        );
    }
    Ok(())
}

/// Execute the check command
pub fn check(source: String, config: HarnessConfig) -> HarnessResult<()> {
    let store = crate::storage::MemoryStore::new();
    let runner = TestRunner::new(&store, config);
    let check = runner.check_formula(&source);

    if !check.valid {
        let code = check.error_code.unwrap_or_default();
        let message = check.error.unwrap_or_default();
        println!("{} {}: {}", "❌".bold(), code.bold().red(), message);
        return Err(HarnessError::Validation(format!("{}: {}", code, message)));
    }

    println!("{} {}", "✅".bold(), "Formula is valid".bold().green());
    if check.variables.is_empty() {
        println!("   Variables: {}", "none".dimmed());
    } else {
        println!("   Variables: {}", check.variables.join(", ").bright_blue());
    }
    if let Some(depth) = check.depth {
        println!("   Depth:     {}", depth);
    }
    Ok(())
}

/// Execute the eval command
pub fn eval(source: String, inputs: Vec<String>, config: HarnessConfig) -> HarnessResult<()> {
    let input = parse_inputs(&inputs)?;
    let engine = FormulaEngine::new(config.limits);
    let value = engine.run(&source, &input)?;
    println!("{}", value.to_string().bold());
    Ok(())
}

/// Execute the list command
pub fn list(
    suite: PathBuf,
    formula: FormulaId,
    status: Option<TestStatus>,
    sort_by: SortBy,
    sort_order: SortOrder,
) -> HarnessResult<()> {
    let store = YamlStore::open(&suite)?;
    let formula_record = store.load_formula(formula)?;
    let filter = TestCaseFilter {
        status,
        sort_by,
        sort_order,
    };
    let cases = store.list_test_cases(formula, &filter)?;

    println!(
        "{} {} [{}]: {} test case(s)",
        "📋".bold(),
        formula_record.name.bold(),
        formula,
        cases.len()
    );
    for tc in &cases {
        let last_run = tc
            .last_run_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "   {:>4}  {:<8} {:<30} expected {:<12} actual {:<12} last run {}",
            tc.id,
            status_label(tc.status),
            tc.name,
            json_display(tc.expected_result.as_ref()),
            json_display(tc.actual_result.as_ref()),
            last_run.dimmed()
        );
    }
    Ok(())
}

/// Execute the add command
pub fn add(
    suite: PathBuf,
    formula: FormulaId,
    name: String,
    inputs: Vec<String>,
    expected: Option<String>,
    config: HarnessConfig,
) -> HarnessResult<()> {
    let store = YamlStore::open(&suite)?;
    let runner = TestRunner::new(&store, config);
    let input = parse_inputs(&inputs)?;
    let expected = expected.as_deref().map(parse_json_or_text);

    let tc = runner.add_test_case(formula, &name, input, expected)?;
    println!(
        "{} Added test case [{}] {} to formula {}",
        "✅".bold(),
        tc.id,
        tc.name.bright_blue(),
        formula
    );
    Ok(())
}

/// Execute the watch command
pub fn watch(
    suite: PathBuf,
    formula: Option<FormulaId>,
    config: HarnessConfig,
) -> HarnessResult<()> {
    println!("{}", "👁️  Pricing Forge - Watch Mode".bold().green());
    println!("   Watching: {}", suite.display());
    println!("   Press {} to stop\n", "Ctrl+C".bold().yellow());

    if !suite.exists() {
        return Err(HarnessError::Validation(format!(
            "File not found: {}",
            suite.display()
        )));
    }

    let canonical_path = suite.canonicalize().map_err(|e| {
        HarnessError::Validation(format!("Cannot resolve {}: {}", suite.display(), e))
    })?;
    let parent_dir = canonical_path
        .parent()
        .ok_or_else(|| HarnessError::Validation("Cannot determine parent directory".to_string()))?;

    let (tx, rx) = channel();
    let mut debouncer = new_debouncer(Duration::from_millis(200), tx)
        .map_err(|e| HarnessError::Validation(format!("Failed to create file watcher: {}", e)))?;
    debouncer
        .watcher()
        .watch(parent_dir, RecursiveMode::NonRecursive)
        .map_err(|e| HarnessError::Validation(format!("Failed to watch directory: {}", e)))?;

    println!("{}", "🔄 Initial run...".cyan());
    // Runs write results back to the suite; remember what we wrote so our own write
    // does not retrigger a run
    let mut last_written = run_watch_action(&canonical_path, formula, config);

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let relevant = events.iter().any(|event| {
                    event.kind == DebouncedEventKind::Any
                        && event.path.file_name() == canonical_path.file_name()
                });
                if !relevant {
                    continue;
                }
                let current = fs::read_to_string(&canonical_path).ok();
                if current.is_some() && current == last_written {
                    continue;
                }

                println!(
                    "\n{} {}",
                    "🔄".bold(),
                    format!("Change detected at {}", chrono::Local::now().format("%H:%M:%S"))
                        .cyan()
                );
                last_written = run_watch_action(&canonical_path, formula, config);
            }
            Ok(Err(e)) => {
                println!("{} {}", "⚠️  Watch error:".yellow(), e);
            }
            Err(e) => {
                return Err(HarnessError::Validation(format!(
                    "Watch channel closed: {}",
                    e
                )));
            }
        }
    }
}

/// Run the suite once for watch mode and return the file contents afterwards
fn run_watch_action(
    path: &Path,
    formula: Option<FormulaId>,
    config: HarnessConfig,
) -> Option<String> {
    match run(path.to_path_buf(), formula, None, config) {
        Ok(()) => {}
        Err(HarnessError::TestsFailed { .. }) => {}
        Err(e) => println!("{} {}", "❌".bold(), e.to_string().red()),
    }
    fs::read_to_string(path).ok()
}
