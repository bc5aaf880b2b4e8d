use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use mapping_editor::{
    editor_href, flatten, AcceptedSuggestion, EditorConfig, EditorController, EditorEvent,
    FileClipboard,
};
use mapping_protocol::{CandidateKind, MappingRule, RuleKind};
use mapping_service::{HttpRuleService, InMemoryRuleService, RuleService};
use std::path::PathBuf;
use std::sync::Arc;

mod output;

use output::{CreatedOutput, MoveOutput, RuleOutput, RuleRefOutput, SuggestOutput};

#[derive(Parser)]
#[command(name = "mapping-editor")]
#[command(about = "Edit hierarchical mapping rules of a transformation task", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Editor configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Work on a JSON fixture instead of the rule service; changes are written back
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Rule service base URL (overrides MAPPING_EDITOR_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Project id (overrides MAPPING_EDITOR_PROJECT)
    #[arg(long, global = true)]
    project: Option<String>,

    /// Transformation task id (overrides MAPPING_EDITOR_TASK)
    #[arg(long, global = true)]
    task: Option<String>,

    /// Clipboard file shared between invocations
    #[arg(long, global = true)]
    clipboard: Option<PathBuf>,

    /// Maximum number of concurrent create requests
    #[arg(long, global = true)]
    batch_concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the object tree around a rule
    Tree(TreeArgs),

    /// Print one rule with its breadcrumbs
    Show(ShowArgs),

    /// List mapping suggestions for the rules of a container
    Suggest(SuggestArgs),

    /// Create rules from accepted suggestions
    Generate(GenerateArgs),

    /// Put a rule on the clipboard
    Copy(RuleIdArgs),

    /// Copy a rule next to itself
    Clone(CloneArgs),

    /// Paste the clipboard into a container
    Paste(ContainerArgs),

    /// Move a property rule inside its container
    Move(MoveArgs),

    /// Delete a rule
    Delete(RuleIdArgs),

    /// Print the JSON schema of the rule tree
    Schema,
}

#[derive(Args)]
struct TreeArgs {
    /// Rule to focus (default: root)
    #[arg(long)]
    rule: Option<String>,

    /// Include value rules in the tree
    #[arg(long)]
    values: bool,

    /// Print the visible rows instead of the nested tree
    #[arg(long)]
    flat: bool,

    /// Print the property rules of the focused container
    #[arg(long, conflicts_with = "flat")]
    rows: bool,

    /// Expand every row
    #[arg(long)]
    expand_all: bool,
}

#[derive(Args)]
struct ShowArgs {
    rule_id: String,

    /// Context path used for the editor link
    #[arg(long)]
    context: Option<String>,
}

#[derive(Args)]
struct SuggestArgs {
    /// Container whose rules are suggested (default: root)
    #[arg(long)]
    rule: Option<String>,

    /// Match vocabulary terms against source paths instead
    #[arg(long)]
    swap: bool,

    /// Restrict matching to these vocabularies
    #[arg(long = "vocab")]
    vocabularies: Vec<String>,

    /// Client-side text filter
    #[arg(long)]
    filter: Option<String>,
}

#[derive(Args)]
struct GenerateArgs {
    /// Container receiving the new rules (default: root)
    #[arg(long)]
    rule: Option<String>,

    /// Accepted rows as SOURCE=TARGET (or SOURCE alone for a generated target)
    #[arg(required = true)]
    accept: Vec<String>,

    /// Create object rules instead of value rules
    #[arg(long)]
    object: bool,

    /// Rows are vocabulary terms matched against source paths
    #[arg(long)]
    swap: bool,

    /// Prefix for generated target properties
    #[arg(long)]
    uri_prefix: Option<String>,
}

#[derive(Args)]
struct RuleIdArgs {
    rule_id: String,
}

#[derive(Args)]
struct CloneArgs {
    rule_id: String,

    /// Parent recorded on the clipboard (default: the container in view)
    #[arg(long)]
    parent: Option<String>,
}

#[derive(Args)]
struct ContainerArgs {
    /// Container to paste into (default: root)
    #[arg(long)]
    rule: Option<String>,
}

#[derive(Args)]
struct MoveArgs {
    from: usize,
    to: usize,

    /// Container whose property rules are reordered (default: root)
    #[arg(long)]
    rule: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    }
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    if matches!(cli.command, Commands::Schema) {
        let schema = schemars::schema_for!(MappingRule);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let mut config = load_config(&cli).await?;
    if let Commands::Tree(args) = &cli.command {
        config.show_value_mappings |= args.values;
    }
    let mut editor = open_editor(&cli, config).await?;

    match cli.command {
        Commands::Tree(args) => run_tree(&mut editor, args).await,
        Commands::Show(args) => run_show(&editor, args).await,
        Commands::Suggest(args) => run_suggest(&mut editor, args).await,
        Commands::Generate(args) => run_generate(&mut editor, args).await,
        Commands::Copy(args) => run_copy(&mut editor, args).await,
        Commands::Clone(args) => run_clone(&mut editor, args).await,
        Commands::Paste(args) => run_paste(&mut editor, args).await,
        Commands::Move(args) => run_move(&mut editor, args).await,
        Commands::Delete(args) => run_delete(&mut editor, args).await,
        Commands::Schema => Ok(()),
    }
}

async fn load_config(cli: &Cli) -> Result<EditorConfig> {
    let mut config = EditorConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load editor configuration")?;
    if let Some(url) = &cli.base_url {
        config.base_url = Some(url.clone());
    }
    if let Some(project) = &cli.project {
        config.project = Some(project.clone());
    }
    if let Some(task) = &cli.task {
        config.task = Some(task.clone());
    }
    if let Some(path) = &cli.clipboard {
        config.clipboard_path = Some(path.clone());
    }
    if let Some(limit) = cli.batch_concurrency {
        config.batch_concurrency = limit.clamp(1, mapping_editor::config::MAX_BATCH_CONCURRENCY);
    }
    // A one-shot process has no page address to keep in sync.
    config.track_address = false;
    Ok(config)
}

async fn open_editor(cli: &Cli, config: EditorConfig) -> Result<EditorController> {
    let service: Arc<dyn RuleService> = match &cli.fixture {
        Some(path) => Arc::new(
            InMemoryRuleService::open(path)
                .await
                .with_context(|| format!("Failed to open fixture {}", path.display()))?,
        ),
        None => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| anyhow!("No rule service configured; pass --base-url or --fixture"))?;
            let task = config.task_ref()?;
            Arc::new(
                HttpRuleService::new(&base_url, task, config.timeout)
                    .context("Failed to create rule service client")?,
            )
        }
    };
    log::debug!("Editing {}", service.task());

    let clipboard = Arc::new(FileClipboard::new(config.clipboard_path()));
    let mut editor = EditorController::new(service, clipboard, config);
    editor
        .start()
        .await
        .context("Failed to load the rule tree")?;
    Ok(editor)
}

async fn focus(editor: &mut EditorController, rule: Option<&str>) -> Result<()> {
    if let Some(rule) = rule {
        editor
            .navigate(rule)
            .await
            .with_context(|| format!("Failed to open rule {rule}"))?;
    }
    Ok(())
}

fn rule_kind(editor: &EditorController, id: &str) -> Result<RuleKind> {
    editor
        .tree()
        .and_then(|tree| tree.node(id))
        .map(|node| node.kind)
        .ok_or_else(|| anyhow!("Unknown rule {id}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_tree(editor: &mut EditorController, args: TreeArgs) -> Result<()> {
    focus(editor, args.rule.as_deref()).await?;
    if args.expand_all {
        editor.toggle_all(true).await?;
    }
    if args.rows {
        return print_json(&editor.rows());
    }
    let panel = editor
        .panel()
        .ok_or_else(|| anyhow!("No rule tree loaded"))?;
    if args.flat {
        print_json(&flatten(&panel))
    } else {
        print_json(&panel)
    }
}

async fn run_show(editor: &EditorController, args: ShowArgs) -> Result<()> {
    let tree = editor
        .tree()
        .ok_or_else(|| anyhow!("No rule tree loaded"))?;
    let rule = tree
        .get(&args.rule_id)
        .ok_or_else(|| anyhow!("Unknown rule {}", args.rule_id))?;
    let target_label = match rule.mapping_target() {
        Some(target) => editor.label(&target.uri).await,
        None => None,
    };
    let task = editor.service().task();
    let href = args
        .context
        .or_else(|| editor.config().base_url.clone())
        .map(|context| editor_href(&context, &task.project, &task.task, rule.id(), false));

    print_json(&RuleOutput {
        label: rule.display_label(),
        target_label,
        parent: tree.parent_id(&args.rule_id).map(str::to_string),
        breadcrumbs: tree.breadcrumbs(&args.rule_id),
        href,
        rule: rule.clone(),
    })
}

async fn run_suggest(editor: &mut EditorController, args: SuggestArgs) -> Result<()> {
    focus(editor, args.rule.as_deref()).await?;
    editor
        .show_suggestions()
        .await
        .context("Failed to load suggestions")?;
    if args.swap {
        editor
            .handle(mapping_editor::EditorCommand::SwapSuggestions)
            .await?;
    }
    if !args.vocabularies.is_empty() {
        editor
            .handle(mapping_editor::EditorCommand::RefineSuggestions {
                vocabularies: Some(args.vocabularies),
            })
            .await?;
    }
    let set = editor
        .suggestions()
        .ok_or_else(|| anyhow!("No suggestions loaded"))?;
    let rows = match args.filter.as_deref() {
        Some(text) => editor.suggestion_engine().filtered(text).into_iter().cloned().collect(),
        None => set.rows.clone(),
    };
    print_json(&SuggestOutput::new(set, rows))
}

/// `SOURCE=TARGET` or a bare `SOURCE`.
fn parse_accepted(raw: &str, kind: CandidateKind) -> Result<AcceptedSuggestion> {
    let (uri, candidate) = match raw.split_once('=') {
        Some((uri, target)) => (uri.trim(), Some(target.trim())),
        None => (raw.trim(), None),
    };
    if uri.is_empty() {
        bail!("Invalid suggestion {raw:?}: empty source");
    }
    Ok(AcceptedSuggestion {
        uri: uri.to_string(),
        candidate: candidate.filter(|c| !c.is_empty()).map(str::to_string),
        kind,
    })
}

async fn run_generate(editor: &mut EditorController, args: GenerateArgs) -> Result<()> {
    let kind = if args.object {
        CandidateKind::Object
    } else {
        CandidateKind::Value
    };
    let accepted = args
        .accept
        .iter()
        .map(|raw| parse_accepted(raw, kind))
        .collect::<Result<Vec<_>>>()?;

    focus(editor, args.rule.as_deref()).await?;
    editor
        .show_suggestions()
        .await
        .context("Failed to load suggestions")?;
    if args.swap {
        editor
            .handle(mapping_editor::EditorCommand::SwapSuggestions)
            .await?;
    }

    let mut events = editor.subscribe();
    let outcome = editor.accept_suggestions(&accepted, args.uri_prefix).await;
    while let Ok(event) = events.try_recv() {
        if let EditorEvent::SuggestionProgress(progress) = event {
            log::info!("{} ({}%)", progress.last_message, progress.percent);
        }
    }
    let created = outcome.context("Failed to create rules")?;
    print_json(&CreatedOutput::new(&created))
}

async fn run_copy(editor: &mut EditorController, args: RuleIdArgs) -> Result<()> {
    let kind = rule_kind(editor, &args.rule_id)?;
    editor.copy(&args.rule_id, kind).await?;
    print_json(&RuleRefOutput {
        id: args.rule_id,
        kind,
    })
}

async fn run_clone(editor: &mut EditorController, args: CloneArgs) -> Result<()> {
    let kind = rule_kind(editor, &args.rule_id)?;
    // Opening the rule puts its container (or, for objects, the object) in view.
    focus(editor, Some(&args.rule_id)).await?;
    let id = editor
        .clone_rule(&args.rule_id, kind, args.parent)
        .await
        .context("Failed to clone rule")?;
    print_json(&RuleRefOutput { id, kind })
}

async fn run_paste(editor: &mut EditorController, args: ContainerArgs) -> Result<()> {
    focus(editor, args.rule.as_deref()).await?;
    let id = editor.paste(false).await.context("Failed to paste")?;
    let kind = rule_kind(editor, &id)?;
    print_json(&RuleRefOutput { id, kind })
}

async fn run_move(editor: &mut EditorController, args: MoveArgs) -> Result<()> {
    focus(editor, args.rule.as_deref()).await?;
    editor
        .reorder(args.from, args.to)
        .await
        .context("Failed to move rule")?;
    let container = editor
        .container_id()
        .ok_or_else(|| anyhow!("No rule tree loaded"))?
        .to_string();
    let order = editor
        .tree()
        .map(|tree| tree.property_rule_ids(&container).to_vec())
        .unwrap_or_default();
    print_json(&MoveOutput { container, order })
}

async fn run_delete(editor: &mut EditorController, args: RuleIdArgs) -> Result<()> {
    rule_kind(editor, &args.rule_id)?;
    editor
        .remove(&args.rule_id)
        .await
        .with_context(|| format!("Failed to delete rule {}", args.rule_id))?;
    print_json(&serde_json::json!({ "deleted": args.rule_id }))
}
