use clap::{Parser, Subcommand};
use forms_spec::{
    DataSourceResolver, Expression, FormSchema, HttpAdapterConfig, RuleEngine, ValidationResult,
    resolve_field_state, resolve_form_state, validate_form,
};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Declarative form decision engine CLI",
    long_about = "Evaluates expressions, field states, validation and option sources for form schemas"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a single expression against form values.
    Eval {
        /// Expression source, e.g. `age >= 18 ? 'adult' : 'minor'`.
        #[arg(long, value_name = "EXPR")]
        expr: String,
        /// Optional JSON file with the form values.
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
    },
    /// Print the effective state of every field.
    State {
        /// Path to the FormSchema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Optional JSON file with the form values.
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
    },
    /// Validate values against a FormSchema; exits non-zero when invalid.
    Validate {
        /// Path to the FormSchema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Path to the values JSON file.
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the rule dependency graph, or the fields affected by a change.
    Deps {
        /// Path to the FormSchema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Dotted value path that changed.
        #[arg(long, value_name = "PATH")]
        changed: Option<String>,
    },
    /// Print the JSON Schema of FormSchema documents.
    Schema,
    /// Resolve the option source of one field.
    Options {
        /// Path to the FormSchema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Field name whose options are resolved.
        #[arg(long, value_name = "FIELD")]
        field: String,
        /// Optional JSON file with the form values.
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
        /// Base URL for relative endpoints.
        #[arg(long, value_name = "URL", env = "GREENTIC_FORMS_BASE_URL")]
        base_url: Option<String>,
        /// Request timeout in seconds.
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        timeout_secs: u64,
    },
}

fn main() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Eval { expr, values } => run_eval(&expr, values.as_deref()),
        Command::State { schema, values } => run_state(&schema, values.as_deref()),
        Command::Validate {
            schema,
            values,
            json,
        } => run_validate(&schema, &values, json),
        Command::Deps { schema, changed } => run_deps(&schema, changed.as_deref()),
        Command::Schema => run_schema(),
        Command::Options {
            schema,
            field,
            values,
            base_url,
            timeout_secs,
        } => run_options(&schema, &field, values.as_deref(), base_url, timeout_secs),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_schema(path: &Path) -> CliResult<FormSchema> {
    let schema_json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&schema_json)?)
}

fn load_values(path: Option<&Path>) -> CliResult<Value> {
    match path {
        Some(path) => {
            let values_json = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&values_json)?)
        }
        None => Ok(Value::Object(Map::new())),
    }
}

fn print_json(value: &impl serde::Serialize) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_eval(expr: &str, values_path: Option<&Path>) -> CliResult<()> {
    let values = load_values(values_path)?;
    let value = Expression::parse(expr)?.evaluate(&values)?;
    print_json(&value)
}

fn run_state(schema_path: &Path, values_path: Option<&Path>) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let values = load_values(values_path)?;
    print_json(&resolve_form_state(&RuleEngine::new(), &schema, &values))
}

fn run_validate(schema_path: &Path, values_path: &Path, as_json: bool) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let values = load_values(Some(values_path))?;

    let result = validate_form(&RuleEngine::new(), &schema, &values);
    if as_json {
        print_json(&result)?;
    } else {
        println!(
            "Validation result: {}",
            if result.valid { "valid" } else { "invalid" }
        );
        describe_validation(&result);
    }

    if result.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(result: &ValidationResult) {
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!("  {} - {} ({})", error.path, error.message, error.code);
        }
    }
    if !result.missing_required.is_empty() {
        println!(
            "Missing required fields: {}",
            result.missing_required.join(", ")
        );
    }
    if !result.unknown_fields.is_empty() {
        println!("Unknown fields: {}", result.unknown_fields.join(", "));
    }
}

fn run_deps(schema_path: &Path, changed: Option<&str>) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    match changed {
        Some(changed) => print_json(&json!({
            "changed": changed,
            "fields": schema.fields_affected_by(changed),
        })),
        None => print_json(&schema.dependency_graph()),
    }
}

fn run_schema() -> CliResult<()> {
    print_json(&schemars::schema_for!(FormSchema))
}

fn run_options(
    schema_path: &Path,
    field_name: &str,
    values_path: Option<&Path>,
    base_url: Option<String>,
    timeout_secs: u64,
) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let values = load_values(values_path)?;
    let field = schema
        .field(field_name)
        .ok_or_else(|| format!("field '{field_name}' is not defined in form '{}'", schema.id))?;
    let state = resolve_field_state(&RuleEngine::new(), field, &values);
    let source = state
        .options
        .ok_or_else(|| format!("field '{field_name}' has no data source"))?;

    let resolver = DataSourceResolver::with_http(HttpAdapterConfig {
        base_url,
        request_timeout: Duration::from_secs(timeout_secs),
        ..HttpAdapterConfig::default()
    })?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    tracing::debug!(field = field_name, kind = source.kind(), "resolving field options");
    let options = runtime.block_on(resolver.fetch(&source, &values))?;
    print_json(&options)
}
