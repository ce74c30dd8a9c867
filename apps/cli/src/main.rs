use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use vellum_content::{ContentNode, ContentProvider, ContentSession, ProviderConfig};
use vellum_model::{parse_prefixed, to_prefixed, AttrValue, Constraint, QName};
use vellum_store::MemoryRepository;

const DEFAULT_WORKSPACE: &str = "default";

#[derive(Parser)]
#[command(
    name = "vellum",
    about = "Browse, edit and search a vellum content repository",
    author,
    version
)]
struct Cli {
    /// 儲存庫快照檔案。 / Repository snapshot file.
    #[arg(long, global = true, value_name = "PATH", default_value = "vellum.json")]
    repo: PathBuf,
    /// 內容提供者設定檔；預設掛載於 /default。 / Provider config; mounts /default when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 建立空白快照。 / Create an empty snapshot.
    Init(InitArgs),
    /// 顯示節點屬性與內容類別。 / Print a node's attributes and content classes.
    Show(PathArgs),
    /// 新增子節點。 / Add a child node.
    Add(AddArgs),
    /// 寫入屬性。 / Write an attribute.
    Set(SetArgs),
    /// 開啟編輯並結束編輯週期。 / Open a node for edit, then persist.
    Edit(PathArgs),
    /// 凍結節點。 / Freeze a node.
    Freeze(PathArgs),
    /// 以條件樹搜尋。 / Search with a constraint tree.
    Search(SearchArgs),
}

#[derive(Args)]
struct InitArgs {
    /// 要建立的工作區。 / Workspaces to create.
    #[arg(long = "workspace", value_name = "NAME", default_value = DEFAULT_WORKSPACE)]
    workspaces: Vec<String>,
    /// 額外命名空間，格式為 prefix=uri。 / Extra namespaces as prefix=uri.
    #[arg(long = "namespace", value_name = "PREFIX=URI")]
    namespaces: Vec<String>,
    /// 覆寫既有快照。 / Overwrite an existing snapshot.
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct PathArgs {
    /// 相對於掛載點的路徑。 / Path below the mount point.
    path: String,
}

#[derive(Args)]
struct AddArgs {
    /// 父節點路徑。 / Parent path.
    parent: String,
    /// 子節點名稱 (prefix:local)。 / Child name (prefix:local).
    name: String,
    /// 內容類別；第一個為主要類型。 / Content classes; the first is the primary type.
    #[arg(long = "class", value_name = "QNAME")]
    classes: Vec<String>,
}

#[derive(Args)]
struct SetArgs {
    path: String,
    /// 屬性名稱 (prefix:local)。 / Attribute key (prefix:local).
    key: String,
    value: String,
    /// 值的型別。 / Value type.
    #[arg(long = "type", value_enum, default_value_t = ValueKind::String)]
    kind: ValueKind,
}

#[derive(Args)]
struct SearchArgs {
    /// JSON 條件樹檔案。 / JSON constraint tree file.
    #[arg(long, value_name = "PATH")]
    query: PathBuf,
    /// 限制搜尋範圍的路徑。 / Restrict results to descendants of this path.
    #[arg(long, value_name = "PATH")]
    scope: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValueKind {
    String,
    Long,
    Double,
    Boolean,
    Date,
}

impl ValueKind {
    fn parse(self, raw: &str) -> Result<AttrValue> {
        Ok(match self {
            ValueKind::String => AttrValue::from(raw),
            ValueKind::Long => AttrValue::Long(
                raw.parse()
                    .with_context(|| format!("'{raw}' is not an integer"))?,
            ),
            ValueKind::Double => AttrValue::Double(
                raw.parse()
                    .with_context(|| format!("'{raw}' is not a number"))?,
            ),
            ValueKind::Boolean => AttrValue::Boolean(
                raw.parse()
                    .with_context(|| format!("'{raw}' is not true or false"))?,
            ),
            ValueKind::Date => AttrValue::Instant(
                chrono::DateTime::parse_from_rfc3339(raw)
                    .with_context(|| format!("'{raw}' is not an RFC 3339 date"))?
                    .with_timezone(&chrono::Utc),
            ),
        })
    }
}

/// An open repository plus one content session over it.
struct Repo {
    snapshot: PathBuf,
    repository: MemoryRepository,
    provider: ContentProvider,
    session: Arc<ContentSession>,
}

impl Repo {
    fn open(snapshot: &Path, config: Option<&Path>) -> Result<Self> {
        let repository = MemoryRepository::load(snapshot)
            .with_context(|| format!("failed to load repository {}", snapshot.display()))?;
        let config = match config {
            Some(path) => ProviderConfig::load(path)?,
            None => ProviderConfig::new(format!("/{DEFAULT_WORKSPACE}")),
        };
        let provider = ContentProvider::start(Arc::new(repository.clone()), config)
            .context("failed to start content provider")?;
        Ok(Self {
            snapshot: snapshot.to_path_buf(),
            repository,
            provider,
            session: Arc::new(ContentSession::new()),
        })
    }

    fn node(&self, path: &str) -> Result<ContentNode> {
        Ok(self.provider.get(&self.session, path)?)
    }

    fn qname(&self, value: &str) -> Result<QName> {
        let namespaces = self.provider.namespaces()?;
        parse_prefixed(&namespaces, value).with_context(|| format!("invalid name '{value}'"))
    }

    fn display_name(&self, name: &QName) -> Result<String> {
        Ok(to_prefixed(&self.provider.namespaces()?, name)?)
    }

    /// Ends the edit cycle and writes committed state back to the snapshot.
    fn commit(self) -> Result<()> {
        self.provider.persist(&self.session)?;
        self.close();
        self.repository
            .save(&self.snapshot)
            .with_context(|| format!("failed to write {}", self.snapshot.display()))
    }

    fn close(&self) {
        self.session.close();
        self.provider.stop();
    }
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let Cli {
        repo,
        config,
        command,
    } = Cli::parse();
    match command {
        Commands::Init(args) => execute_init(args, &repo),
        command => execute(command, Repo::open(&repo, config.as_deref())?),
    }
}

fn execute(command: Commands, repo: Repo) -> Result<()> {
    match command {
        Commands::Init(_) => bail!("init cannot run against an open repository"),
        Commands::Show(args) => execute_show(repo, &args.path),
        Commands::Add(args) => execute_add(repo, args),
        Commands::Set(args) => execute_set(repo, args),
        Commands::Edit(args) => {
            repo.provider.open_for_edit(&repo.session, &args.path)?;
            println!("Opened {} for edit", args.path);
            repo.commit()
        }
        Commands::Freeze(args) => {
            repo.provider.freeze(&repo.session, &args.path)?;
            println!("Froze {}", args.path);
            repo.commit()
        }
        Commands::Search(args) => execute_search(repo, args),
    }
}

fn execute_init(args: InitArgs, snapshot: &Path) -> Result<()> {
    if snapshot.exists() && !args.force {
        bail!(
            "repository '{}' already exists (use --force to overwrite)",
            snapshot.display()
        );
    }
    let names: Vec<&str> = args.workspaces.iter().map(String::as_str).collect();
    let repository = MemoryRepository::with_workspaces(&names)?;
    for entry in &args.namespaces {
        let Some((prefix, uri)) = entry.split_once('=') else {
            bail!("namespace '{entry}' must be written as prefix=uri");
        };
        repository.register_namespace(prefix.trim(), uri.trim());
    }
    repository
        .save(snapshot)
        .with_context(|| format!("failed to write {}", snapshot.display()))?;
    println!(
        "Created {} with workspaces: {}",
        snapshot.display(),
        names.join(", ")
    );
    Ok(())
}

fn execute_show(repo: Repo, path: &str) -> Result<()> {
    let node = repo.node(path)?;
    println!("{}", node.content_path());
    let classes = node
        .content_classes()?
        .iter()
        .map(|class| repo.display_name(class))
        .collect::<Result<Vec<_>>>()?;
    println!("classes: {}", classes.join(", "));
    for key in node.keys()? {
        if let Some(value) = node.get(&key)? {
            println!("{} = {value}", repo.display_name(&key)?);
        }
    }
    let children = node.children()?;
    if children.len() > 0 {
        println!("children:");
        for child in children {
            println!("  {}", child.path());
        }
    }
    repo.close();
    Ok(())
}

fn execute_add(repo: Repo, args: AddArgs) -> Result<()> {
    let parent = repo.node(&args.parent)?;
    let name = repo.qname(&args.name)?;
    let classes = args
        .classes
        .iter()
        .map(|class| repo.qname(class))
        .collect::<Result<Vec<_>>>()?;
    let child = parent.add(&name, &classes)?;
    println!("Added {}", child.path());
    repo.commit()
}

fn execute_set(repo: Repo, args: SetArgs) -> Result<()> {
    let node = repo.node(&args.path)?;
    let key = repo.qname(&args.key)?;
    let value = args.kind.parse(&args.value)?;
    match node.put(&key, value)? {
        Some(previous) => println!("{} = {} (was {previous})", args.key, args.value),
        None => println!("{} = {}", args.key, args.value),
    }
    repo.commit()
}

fn execute_search(repo: Repo, args: SearchArgs) -> Result<()> {
    let data = fs::read_to_string(&args.query)
        .with_context(|| format!("failed to read {}", args.query.display()))?;
    let constraint = Constraint::from_json(&data)
        .with_context(|| format!("failed to parse constraint tree {}", args.query.display()))?;
    let results = repo
        .provider
        .search(&repo.session, &constraint, args.scope.as_deref())?;
    let total = results.len();
    for node in results {
        println!("{}", node.path());
    }
    eprintln!("{total} match(es)");
    repo.close();
    Ok(())
}
