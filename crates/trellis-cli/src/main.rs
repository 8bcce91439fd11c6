//! Trellis CLI - inspect application trees and evaluate their bindings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use trellis_core::bindings::{BindingResult, BindingSession, ComponentRegistry, Location};
use trellis_core::config::{EngineConfig, CONFIG_FILE};
use trellis_core::dom::{create_fractional_index, AppDom, NodeType};
use trellis_core::expr::{EvaluationStrategy, ExpressionEvaluator, Value};
use trellis_core::render::create_render_tree;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(version = trellis_core::VERSION)]
#[command(about = "Inspect Trellis application trees and bindings", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to ./trellis.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Expression evaluation strategy (sandboxed or direct)
    #[arg(long, global = true)]
    strategy: Option<EvaluationStrategy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the browser-safe render tree of an AppDom
    Render {
        /// Path to the AppDom JSON file
        dom: PathBuf,
    },

    /// Report every structural problem in an AppDom
    Check {
        /// Path to the AppDom JSON file
        dom: PathBuf,
    },

    /// Evaluate the bindings of one page
    Bindings {
        /// Path to the AppDom JSON file
        dom: PathBuf,

        /// Page name
        #[arg(long)]
        page: String,

        /// Location the page is shown at, for page parameters
        #[arg(long, default_value = "/")]
        url: String,

        /// Component registry JSON (defaults to the builtin components)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Set a controlled binding, e.g. `--set 'orders.rows=[{"id":1}]'`
        #[arg(long = "set", value_name = "ID=JSON")]
        set: Vec<String>,

        /// Environment variable for env bindings
        #[arg(long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,
    },

    /// Evaluate a single expression
    Eval {
        /// Expression to evaluate
        expression: String,

        /// JSON object whose members are in scope
        #[arg(long)]
        scope: Option<String>,
    },

    /// Print a fractional index between two keys
    Index {
        /// Key the new index must sort after
        #[arg(long)]
        before: Option<String>,

        /// Key the new index must sort before
        #[arg(long)]
        after: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(strategy) = cli.strategy {
        config.evaluator.strategy = strategy;
    }
    init_tracing(&config);

    match cli.command {
        Commands::Render { dom } => {
            let dom = read_dom(&dom)?;
            println!("{}", create_render_tree(&dom).to_json()?);
        }

        Commands::Check { dom } => check_dom(&dom)?,

        Commands::Bindings {
            dom,
            page,
            url,
            registry,
            set,
            env,
        } => {
            let output = evaluate_page(&config, &dom, &page, &url, registry.as_deref(), &set, &env)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Eval { expression, scope } => {
            let value = eval_expression(&config, &expression, scope.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&value.to_json_lossy())?);
        }

        Commands::Index { before, after } => {
            let index = create_fractional_index(before.as_deref(), after.as_deref())?;
            println!("{index}");
        }
    }

    Ok(())
}

/// An explicit `--config` must exist; the default file is optional
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("Failed to load config '{}'", path.display())),
        None if Path::new(CONFIG_FILE).exists() => EngineConfig::from_path(CONFIG_FILE)
            .with_context(|| format!("Failed to load config '{CONFIG_FILE}'")),
        None => Ok(EngineConfig::default()),
    }
}

/// `RUST_LOG` wins over the configured filter. Logs go to stderr so stdout
/// stays valid JSON.
fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_dom(path: &Path) -> Result<AppDom> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file '{}'", path.display()))?;
    AppDom::from_json(&source).with_context(|| format!("Invalid AppDom '{}'", path.display()))
}

fn check_dom(path: &Path) -> Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file '{}'", path.display()))?;
    let dom = AppDom::from_json_unchecked(&source)
        .with_context(|| format!("Malformed AppDom '{}'", path.display()))?;

    let violations = dom.violations();
    if violations.is_empty() {
        println!("{}: ok ({} nodes)", path.display(), dom.len());
        return Ok(());
    }
    for violation in &violations {
        println!("  {violation}");
    }
    bail!(
        "{} structural violation(s) in '{}'",
        violations.len(),
        path.display()
    )
}

fn evaluate_page(
    config: &EngineConfig,
    dom_path: &Path,
    page: &str,
    url: &str,
    registry: Option<&Path>,
    set: &[String],
    env: &[String],
) -> Result<JsonValue> {
    let dom = read_dom(dom_path)?;
    let page_id = dom
        .get_page_by_name(page)
        .ok_or_else(|| anyhow!("No page named '{page}'"))?
        .id
        .clone();
    let registry = match registry {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read registry '{}'", path.display()))?;
            ComponentRegistry::from_json(&source)?
        }
        None => ComponentRegistry::builtin(),
    };
    let env = env
        .iter()
        .map(|pair| split_assignment(pair).map(|(name, value)| (name.to_string(), value.to_string())))
        .collect::<Result<BTreeMap<_, _>>>()?;

    let mut session = BindingSession::new(registry, config.build_evaluator()).with_env(env);
    session.load(&dom, &page_id, Location::parse(url))?;
    for assignment in set {
        let (id, raw) = split_assignment(assignment)?;
        let value: JsonValue = serde_json::from_str(raw)
            .with_context(|| format!("Invalid JSON for controlled binding '{id}'"))?;
        debug!(binding = id, "set controlled binding");
        session.set_controlled_binding(id, BindingResult::value(value))?;
    }

    let elements: BTreeMap<String, BTreeMap<String, Value>> = dom
        .get_descendants(&page_id)
        .into_iter()
        .filter(|node| node.node_type() == NodeType::Element)
        .map(|node| -> Result<_> {
            Ok((node.name.clone(), session.element_props(&dom, &node.id)?))
        })
        .collect::<Result<_>>()?;

    let output = json!({
        "results": session.results(),
        "scope": session.scope(),
        "props": elements,
    });
    session.dispose();
    Ok(output)
}

fn eval_expression(config: &EngineConfig, expression: &str, scope: Option<&str>) -> Result<Value> {
    let scope: BTreeMap<String, Value> = match scope {
        Some(raw) => {
            let json: JsonValue = serde_json::from_str(raw).context("Invalid --scope JSON")?;
            let JsonValue::Object(members) = json else {
                bail!("--scope must be a JSON object");
            };
            members
                .iter()
                .map(|(name, value)| (name.clone(), Value::from_json(value)))
                .collect()
        }
        None => BTreeMap::new(),
    };
    config
        .build_evaluator()
        .evaluate(expression, &scope)
        .map_err(|e| anyhow!("{}: {e}", e.name()))
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("a.b={\"x\":1}").unwrap(), ("a.b", "{\"x\":1}"));
        assert_eq!(split_assignment("k=").unwrap(), ("k", ""));
        assert!(split_assignment("novalue").is_err());
        assert!(split_assignment("=1").is_err());
    }

    #[test]
    fn test_eval_with_scope() {
        let config = EngineConfig::default();
        let value = eval_expression(&config, "items.length * 2", Some(r#"{"items":[1,2,3]}"#)).unwrap();
        assert_eq!(value, Value::Number(6.0));
        assert!(eval_expression(&config, "x", Some("[1]")).is_err());
        let err = eval_expression(&config, "nope", None).unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: nope is not defined");
    }

    #[test]
    fn test_evaluate_sample_page() {
        let sample = trellis_core::testutil::sample_dom().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample.dom.to_json().unwrap()).unwrap();

        let output = evaluate_page(
            &EngineConfig::default(),
            file.path(),
            "home",
            "/home?tab=orders",
            None,
            &["input1.props.value=\"CLI\"".to_string()],
            &[],
        )
        .unwrap();
        assert_eq!(output["scope"]["greeting"]["value"], json!("Hello CLI"));
        assert_eq!(output["scope"]["page"]["parameters"]["tab"], json!("orders"));
        assert_eq!(output["props"]["greeting"]["value"], json!("Hello CLI"));

        let missing = evaluate_page(&EngineConfig::default(), file.path(), "nope", "/", None, &[], &[]);
        assert!(missing.is_err());
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        assert!(load_config(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }
}
