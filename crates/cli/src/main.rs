use std::io::{BufRead, Write};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kbrowse_core::{
    columns::{builtin_kind, builtin_kinds, KindSpec, ACTIONS_KEY, AGE_KEY, NAMESPACE_KEY, NAME_KEY},
    render_age, ItemKey, ResourceItem,
};
use kbrowse_kubehub::{get_with_fallback, ClusterApi, KubeClusterApi};
use kbrowse_ops::{ActionDispatcher, Capabilities, Notice, Page};
use kbrowse_persist::{KvStore, MemoryStore, SqliteStore};
use kbrowse_table::{ColumnStore, InputEvent, LoadState, SortDirection, SortState};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kbrowsectl", version, about = "Browse Kubernetes resources as tables")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubeconfig context (default: current context)
    #[arg(long = "context", global = true)]
    context: Option<String>,

    /// Namespaces to list; repeat or comma-separate. Empty means all.
    #[arg(long = "ns", global = true, value_delimiter = ',')]
    namespaces: Vec<String>,

    /// Read-only mode: refuse deletes
    #[arg(long = "recon", global = true, env = "KBROWSE_RECON", action = ArgAction::SetTrue)]
    recon: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Built-in kinds and their aliases
    Kinds,
    /// List objects of a kind as a table
    Ls {
        /// Kind name, plural or alias, e.g. "hpa"
        kind: String,
        /// Case-insensitive substring filter
        #[arg(long = "query", short = 'q')]
        query: Option<String>,
        /// Sort column, e.g. "age" or "maxReplicas:desc"
        #[arg(long = "sort")]
        sort: Option<String>,
    },
    /// Print one object as YAML (or JSON with -o json)
    View {
        kind: String,
        /// "namespace/name", or a bare name for cluster-scoped kinds
        target: String,
    },
    /// Delete one or more objects
    Delete {
        kind: String,
        #[arg(required = true)]
        targets: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(long = "yes", short = 'y', action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// Show or edit the stored column layout of a kind
    Columns {
        kind: String,
        #[command(subcommand)]
        action: ColumnsAction,
    },
}

#[derive(Subcommand, Debug)]
enum ColumnsAction {
    Show,
    Hide { key: String },
    Unhide { key: String },
    Reset,
    /// New top-level order, every column exactly once
    Reorder { keys: Vec<String> },
}

fn init_tracing() {
    let env = std::env::var("KBROWSE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KBROWSE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid KBROWSE_METRICS_ADDR; expected host:port");
        }
    }
}

fn resolve_kind(token: &str) -> Result<KindSpec> {
    builtin_kind(token).ok_or_else(|| anyhow!("unknown kind '{}' (see `kbrowsectl kinds`)", token))
}

fn open_store() -> Arc<dyn KvStore> {
    match SqliteStore::open_default() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            warn!(error = ?e, "settings database unavailable; column changes will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

fn parse_sort(spec: &KindSpec, raw: &str) -> Result<SortState> {
    let (field, dir) = match raw.rsplit_once(':') {
        Some((f, "asc")) => (f, SortDirection::Asc),
        Some((f, "desc")) => (f, SortDirection::Desc),
        Some((_, other)) => bail!("sort direction must be asc or desc, got '{}'", other),
        None => (raw, SortDirection::Asc),
    };
    let column = spec.column_kind(field).ok_or_else(|| anyhow!("'{}' is not a sortable column of {}", field, spec.kind.kind))?;
    Ok(SortState::new(column, dir))
}

fn parse_targets(spec: &KindSpec, raw: &[String]) -> Result<Vec<ItemKey>> {
    raw.iter()
        .map(|t| {
            let key = ItemKey::parse(t).ok_or_else(|| anyhow!("invalid target '{}'; expected namespace/name", t))?;
            if spec.kind.namespaced && key.namespace.is_none() {
                bail!("{} is namespaced; use namespace/name for '{}'", spec.kind.kind, t);
            }
            Ok(key)
        })
        .collect()
}

fn cell(spec: &KindSpec, item: &ResourceItem, key: &str, now_ms: i64) -> String {
    match key {
        NAME_KEY => item.name.clone(),
        NAMESPACE_KEY => item.namespace.clone().unwrap_or_default(),
        AGE_KEY => render_age(item.creation_ts, now_ms),
        _ => spec.field_by_key(key).map(|f| item.field(f.id).render()).unwrap_or_default(),
    }
}

fn header(spec: &KindSpec, key: &str) -> String {
    let label = match key {
        NAME_KEY => "name",
        NAMESPACE_KEY => "namespace",
        AGE_KEY => "age",
        _ => spec.field_by_key(key).map(|f| f.label).unwrap_or(key),
    };
    label.to_uppercase()
}

fn print_table(headers: &[String], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.chars().count());
        }
    }
    let line = |cells: &[String]| {
        let parts: Vec<String> = cells.iter().zip(&widths).map(|(c, w)| format!("{:<w$}", c, w = *w)).collect();
        println!("{}", parts.join("   ").trim_end());
    };
    line(headers);
    for row in rows {
        line(row);
    }
}

fn print_notices(notices: &[Notice]) {
    for n in notices {
        eprintln!("{}", n);
    }
}

fn confirm_prompt(prompt: &str) -> Result<bool> {
    eprint!("{} [y/N] ", prompt);
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer).context("reading confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn connect(cli: &Cli) -> Result<Arc<dyn ClusterApi>> {
    let api = KubeClusterApi::connect(cli.context.as_deref()).await?;
    Ok(Arc::new(api))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let caps = Capabilities { recon: cli.recon };

    match &cli.command {
        Commands::Kinds => {
            let kinds = builtin_kinds();
            match cli.output {
                Output::Human => {
                    let headers = ["KIND", "APIVERSION", "PLURAL", "SCOPE", "ALIASES"].map(String::from).to_vec();
                    let rows: Vec<Vec<String>> = kinds
                        .iter()
                        .map(|k| {
                            let gv = if k.kind.group.is_empty() { k.kind.version.clone() } else { format!("{}/{}", k.kind.group, k.kind.version) };
                            let scope = if k.kind.namespaced { "namespaced" } else { "cluster" };
                            vec![k.kind.kind.clone(), gv, k.kind.plural.clone(), scope.to_string(), k.aliases.join(",")]
                        })
                        .collect();
                    print_table(&headers, &rows);
                }
                Output::Json => {
                    let list: Vec<&kbrowse_core::ResourceKind> = kinds.iter().map(|k| &k.kind).collect();
                    println!("{}", serde_json::to_string_pretty(&list)?);
                }
            }
        }
        Commands::Ls { kind, query, sort } => {
            let spec = resolve_kind(kind)?;
            let sort = sort.as_deref().map(|s| parse_sort(&spec, s)).transpose()?;
            info!(kind = %spec.kind.kind, ns = ?cli.namespaces, "ls invoked");
            let api = connect(&cli).await?;
            let mut page = Page::new(api, spec.clone(), open_store(), caps);
            if cli.namespaces.is_empty() {
                page.mount();
            } else {
                page.set_namespaces(cli.namespaces.clone());
            }
            page.settle().await;
            if let LoadState::Error(e) = page.browser().state() {
                bail!("{}", e);
            }
            if let Some(q) = query {
                page.handle_event(InputEvent::Search(q.clone()));
            }
            if let Some(s) = sort {
                page.set_sort(s);
            }
            let rows = page.browser().view();
            match cli.output {
                Output::Human => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    let keys: Vec<&str> = page.columns().visible_leaves().into_iter().filter(|k| *k != ACTIONS_KEY).collect();
                    let headers: Vec<String> = keys.iter().map(|k| header(&spec, k)).collect();
                    let cells: Vec<Vec<String>> =
                        rows.iter().map(|item| keys.iter().map(|k| cell(&spec, item, k, now_ms)).collect()).collect();
                    print_table(&headers, &cells);
                    eprintln!("{} of {} {}", rows.len(), page.browser().items().len(), spec.kind.plural);
                }
                Output::Json => {
                    let list: Vec<&serde_json::Value> = rows.iter().map(|i| &i.raw).collect();
                    println!("{}", serde_json::to_string_pretty(&list)?);
                }
            }
        }
        Commands::View { kind, target } => {
            let spec = resolve_kind(kind)?;
            let key = parse_targets(&spec, std::slice::from_ref(target))?.remove(0);
            let api = connect(&cli).await?;
            let raw = get_with_fallback(api.as_ref(), &spec.kind, &key.name, key.namespace.as_deref()).await?;
            match cli.output {
                Output::Human => print!("{}", serde_yaml::to_string(&raw)?),
                Output::Json => println!("{}", serde_json::to_string_pretty(&raw)?),
            }
        }
        Commands::Delete { kind, targets, yes } => {
            let spec = resolve_kind(kind)?;
            let keys = parse_targets(&spec, targets)?;
            let api = connect(&cli).await?;
            let mut dispatcher = ActionDispatcher::new(api, caps);
            let prompt = match dispatcher.request_delete(&spec, keys) {
                Ok(pending) => pending.prompt.clone(),
                Err(e) => {
                    print_notices(&[Notice::from_error(&e)]);
                    return Ok(());
                }
            };
            if !*yes && !confirm_prompt(&prompt)? {
                dispatcher.cancel();
                eprintln!("aborted");
                return Ok(());
            }
            let report = dispatcher.confirm(&spec).await?;
            print_notices(&report.notices(&spec));
            if let Some(summary) = report.failure_summary() {
                bail!(summary);
            }
        }
        Commands::Columns { kind, action } => {
            let spec = resolve_kind(kind)?;
            let mut cols = ColumnStore::open(open_store(), &spec);
            match action {
                ColumnsAction::Show => {}
                ColumnsAction::Hide { key } => cols.toggle(key, false)?,
                ColumnsAction::Unhide { key } => cols.toggle(key, true)?,
                ColumnsAction::Reset => cols.reset_to_default()?,
                ColumnsAction::Reorder { keys } => {
                    let order: Vec<&str> = keys.iter().map(String::as_str).collect();
                    cols.reorder(&order)?;
                }
            }
            match cli.output {
                Output::Human => {
                    let headers = ["KEY", "LABEL", "VISIBLE", "PINNED"].map(String::from).to_vec();
                    let mut rows = Vec::new();
                    for c in cols.columns() {
                        rows.push(vec![c.key.clone(), c.label.clone(), c.visible.to_string(), (!c.can_toggle).to_string()]);
                        for child in &c.children {
                            rows.push(vec![format!("  {}", child.key), child.label.clone(), child.visible.to_string(), (!child.can_toggle).to_string()]);
                        }
                    }
                    print_table(&headers, &rows);
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(cols.columns())?),
            }
        }
    }
    Ok(())
}
