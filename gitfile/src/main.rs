mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gitfile_core::{
    DIGEST_HEX_LEN, Digest, EntryInfo, EntryMode, ErrorKind, RefKind, RepoConfig, Repository,
    Revision, Signature, validate,
};
use output::{
    BlobCatOutput, BlobPutOutput, CommitInfo, CommitOutput, InitOutput, LogOutput, LsOutput,
    OutputWriter, RefCreateOutput, RefInfo, RefRemoveOutput, ReflogEntryInfo, ReflogOutput,
    RefsListOutput, ShowData, ShowOutput,
};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// gitfile - edit files on a branch without a working copy
#[derive(Parser)]
#[command(name = "gitfile")]
#[command(about = "Commit file edits onto branches of a content-addressed repository", long_about = None)]
#[command(version)]
struct Cli {
    /// Repository root (defaults to GITFILE_ROOT env var or ./gitfile-repo)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Author name for new commits and tags
    #[arg(long, global = true, env = "GITFILE_AUTHOR_NAME", default_value = "gitfile")]
    author_name: String,

    /// Author e-mail for new commits and tags
    #[arg(long, global = true, env = "GITFILE_AUTHOR_EMAIL", default_value = "gitfile@localhost")]
    author_email: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository with an empty root commit
    Init {
        /// Name of the first branch
        #[arg(long)]
        default_branch: Option<String>,

        /// Do not create the root commit
        #[arg(long)]
        bare: bool,
    },

    /// Store and read file content
    #[command(subcommand)]
    Blob(BlobCommands),

    /// Manage branches
    #[command(subcommand)]
    Branch(BranchCommands),

    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommands),

    /// Show a commit, or the entry at a path
    Show {
        /// Revision: branch:NAME, tag:NAME, commit digest or branch name
        rev: String,

        /// Path inside the revision's tree
        path: Option<String>,
    },

    /// List a directory
    Ls {
        /// Revision: branch:NAME, tag:NAME, commit digest or branch name
        rev: String,

        /// Directory path
        #[arg(default_value = "/")]
        path: String,

        /// Show mode, type, size and digest
        #[arg(short, long)]
        long: bool,
    },

    /// Create or replace a file and commit it
    Put {
        /// Branch to commit onto
        branch: String,

        /// Path of the entry
        path: String,

        /// Digest of a stored blob or tree
        digest: String,

        /// Entry mode (regular, executable, symlink, tree or octal)
        #[arg(long)]
        mode: Option<EntryMode>,

        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Change the content or mode of an existing file and commit it
    Update {
        /// Branch to commit onto
        branch: String,

        /// Path of the entry
        path: String,

        /// New content digest
        #[arg(long)]
        content: Option<String>,

        /// New entry mode
        #[arg(long)]
        mode: Option<EntryMode>,

        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Delete a file and commit the removal
    Rm {
        /// Branch to commit onto
        branch: String,

        /// Path of the entry
        path: String,

        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Show first-parent history
    Log {
        /// Revision to start from (defaults to the default branch)
        rev: Option<String>,

        /// Maximum number of commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show the transitions of a reference
    Reflog {
        /// Reference kind
        kind: KindArg,

        /// Reference name
        name: String,
    },
}

#[derive(Subcommand)]
enum BlobCommands {
    /// Store a file (or stdin) as a blob
    Put {
        /// File to read; stdin if omitted
        file: Option<PathBuf>,
    },

    /// Output blob content to stdout
    Cat {
        /// Digest of the blob
        digest: String,
    },
}

#[derive(Subcommand)]
enum BranchCommands {
    /// List branches
    List,

    /// Create a branch at a commit
    Create {
        /// Branch name
        name: String,

        /// Revision to start from
        start: String,
    },

    /// Delete a branch
    Rm {
        /// Branch name
        name: String,
    },
}

#[derive(Subcommand)]
enum TagCommands {
    /// List tags
    List,

    /// Create a tag
    Create {
        /// Tag name
        name: String,

        /// Object digest or revision to tag
        target: String,

        /// Create an annotated tag with this message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Delete a tag
    Rm {
        /// Tag name
        name: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Branch,
    Tag,
}

impl From<KindArg> for RefKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Branch => RefKind::Branch,
            KindArg::Tag => RefKind::Tag,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let output = OutputWriter::new(cli.json);
    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = error_kind(&err);
            let code = result_code(kind);
            output.write_error(&err, kind.map(|k| k.as_str()), code);
            ExitCode::from(code)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GITFILE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<gitfile_core::Error>().map(|e| e.kind())
}

/// Process exit code for a failure.
fn result_code(kind: Option<ErrorKind>) -> u8 {
    match kind {
        None => 1,
        Some(ErrorKind::InvalidArgument) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::TypeConflict) => 4,
        Some(ErrorKind::Conflict) => 5,
        Some(ErrorKind::ConcurrentUpdate) => 6,
        Some(ErrorKind::StorageFault) => 7,
    }
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    // Determine repository root: CLI arg > GITFILE_ROOT env var > ./gitfile-repo default
    let root = cli
        .root
        .or_else(|| std::env::var("GITFILE_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./gitfile-repo"));
    debug!(root = %root.display(), "using repository");

    let author = || {
        Signature::now(&cli.author_name, &cli.author_email).context("Invalid author identity")
    };

    match cli.command {
        Commands::Init {
            default_branch,
            bare,
        } => cmd_init(output, &root, default_branch, bare, author),
        Commands::Blob(BlobCommands::Put { file }) => cmd_blob_put(output, &root, file.as_deref()),
        Commands::Blob(BlobCommands::Cat { digest }) => cmd_blob_cat(output, &root, &digest),
        Commands::Branch(BranchCommands::List) => cmd_refs_list(output, &root, RefKind::Branch),
        Commands::Branch(BranchCommands::Create { name, start }) => {
            cmd_branch_create(output, &root, &name, &start)
        }
        Commands::Branch(BranchCommands::Rm { name }) => {
            cmd_refs_rm(output, &root, RefKind::Branch, &name)
        }
        Commands::Tag(TagCommands::List) => cmd_refs_list(output, &root, RefKind::Tag),
        Commands::Tag(TagCommands::Create {
            name,
            target,
            message,
        }) => cmd_tag_create(output, &root, &name, &target, message, author),
        Commands::Tag(TagCommands::Rm { name }) => cmd_refs_rm(output, &root, RefKind::Tag, &name),
        Commands::Show { rev, path } => cmd_show(output, &root, &rev, path.as_deref()),
        Commands::Ls { rev, path, long } => cmd_ls(output, &root, &rev, &path, long),
        Commands::Put {
            branch,
            path,
            digest,
            mode,
            message,
        } => {
            let repo = open(&root)?;
            let content = validate::digest("digest", &digest)?;
            let commit = repo
                .put_file(&branch, &path, &content, mode, &author()?, &message)
                .with_context(|| format!("Failed to put {} on {}", path, branch))?;
            write_commit(output, branch, path, commit)
        }
        Commands::Update {
            branch,
            path,
            content,
            mode,
            message,
        } => {
            let repo = open(&root)?;
            let content = content
                .map(|c| validate::digest("content", &c))
                .transpose()?;
            let commit = repo
                .update_file(&branch, &path, content.as_ref(), mode, &author()?, &message)
                .with_context(|| format!("Failed to update {} on {}", path, branch))?;
            write_commit(output, branch, path, commit)
        }
        Commands::Rm {
            branch,
            path,
            message,
        } => {
            let repo = open(&root)?;
            let commit = repo
                .delete_file(&branch, &path, &author()?, &message)
                .with_context(|| format!("Failed to delete {} on {}", path, branch))?;
            write_commit(output, branch, path, commit)
        }
        Commands::Log { rev, limit } => cmd_log(output, &root, rev.as_deref(), limit),
        Commands::Reflog { kind, name } => cmd_reflog(output, &root, kind.into(), &name),
    }
}

fn open(root: &Path) -> Result<Repository> {
    Repository::open(root)
        .with_context(|| format!("Failed to open repository at {}", root.display()))
}

fn parse_revision(rev: &str) -> Result<Revision> {
    Revision::parse(rev).with_context(|| format!("Invalid revision: {}", rev))
}

fn cmd_init(
    output: &OutputWriter,
    root: &Path,
    default_branch: Option<String>,
    bare: bool,
    author: impl Fn() -> Result<Signature>,
) -> Result<()> {
    let mut config = RepoConfig::default();
    if let Some(branch) = default_branch {
        config = config.with_default_branch(&branch)?;
    }

    let repo = Repository::init(root, &config)
        .with_context(|| format!("Failed to initialize repository at {}", root.display()))?;

    let commit = if bare {
        None
    } else {
        Some(repo.create_root_commit(repo.default_branch(), &author()?, "Initial commit")?)
    };

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: root.display().to_string(),
        algorithm: config.algorithm.as_str().to_string(),
        default_branch: config.default_branch.clone(),
        commit,
    };

    output.write(&data, || {
        let mut text = format!(
            "Initialized gitfile repository at {}\nAlgorithm: {}\n",
            data.root, data.algorithm
        );
        if let Some(commit) = &data.commit {
            text.push_str(&format!("{} -> {}\n", data.default_branch, commit));
        }
        text
    })
}

fn cmd_blob_put(output: &OutputWriter, root: &Path, file: Option<&Path>) -> Result<()> {
    let repo = open(root)?;

    let data = match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            if atty::is(atty::Stream::Stdin) {
                anyhow::bail!(
                    "Refusing to read blob content from an interactive terminal; pass a FILE or pipe data"
                );
            }
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let digest = repo.put_blob(&data).context("Failed to store blob")?;
    let out = BlobPutOutput {
        success: true,
        result_code: 0,
        digest,
        size: data.len() as u64,
    };
    output.write(&out, || format!("{}\n", digest))
}

fn cmd_blob_cat(output: &OutputWriter, root: &Path, digest_str: &str) -> Result<()> {
    let repo = open(root)?;
    let digest = validate::digest("digest", digest_str)?;

    let data = repo
        .get_blob(&digest)
        .with_context(|| format!("Failed to read blob {}", digest))?
        .ok_or_else(|| gitfile_core::Error::object_not_found(digest.to_hex()))?;

    if output.is_json() {
        let out = BlobCatOutput {
            success: true,
            result_code: 0,
            digest,
            size: data.len() as u64,
            content: String::from_utf8_lossy(&data).into_owned(),
        };
        output.write(&out, String::new)
    } else {
        output.write_raw(&data)
    }
}

fn cmd_refs_list(output: &OutputWriter, root: &Path, kind: RefKind) -> Result<()> {
    let repo = open(root)?;
    let refs = repo
        .list_references(kind)
        .with_context(|| format!("Failed to list {}", plural(kind)))?;

    let data = RefsListOutput {
        success: true,
        result_code: 0,
        kind,
        refs: refs
            .into_iter()
            .map(|(name, target)| RefInfo { name, target })
            .collect(),
    };

    output.write(&data, || {
        if data.refs.is_empty() {
            return format!("No {}\n", plural(kind));
        }
        data.refs
            .iter()
            .map(|r| format!("{} -> {}\n", r.name, r.target))
            .collect()
    })
}

fn plural(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Branch => "branches",
        RefKind::Tag => "tags",
    }
}

fn cmd_branch_create(output: &OutputWriter, root: &Path, name: &str, start: &str) -> Result<()> {
    let repo = open(root)?;
    let target = repo
        .resolve_commit(&parse_revision(start)?)
        .with_context(|| format!("Failed to resolve {}", start))?;

    repo.create_reference(RefKind::Branch, name, &target)
        .with_context(|| format!("Failed to create branch {}", name))?;

    let data = RefCreateOutput {
        success: true,
        result_code: 0,
        kind: RefKind::Branch,
        name: name.to_string(),
        target,
        tag_object: None,
    };
    output.write(&data, || format!("{} -> {}\n", name, target))
}

/// A raw 64-hex digest names any object; anything else is a revision.
fn tag_target(repo: &Repository, target: &str) -> Result<Digest> {
    if target.len() == DIGEST_HEX_LEN
        && let Ok(digest) = Digest::from_hex(target)
    {
        return Ok(digest);
    }
    repo.resolve_commit(&parse_revision(target)?)
        .with_context(|| format!("Failed to resolve {}", target))
}

fn cmd_tag_create(
    output: &OutputWriter,
    root: &Path,
    name: &str,
    target: &str,
    message: Option<String>,
    author: impl Fn() -> Result<Signature>,
) -> Result<()> {
    let repo = open(root)?;
    let target = tag_target(&repo, target)?;

    let tag_object = match message {
        Some(message) => Some(
            repo.create_annotated_tag(name, &target, &author()?, &message)
                .with_context(|| format!("Failed to create tag {}", name))?,
        ),
        None => {
            repo.create_reference(RefKind::Tag, name, &target)
                .with_context(|| format!("Failed to create tag {}", name))?;
            None
        }
    };

    let data = RefCreateOutput {
        success: true,
        result_code: 0,
        kind: RefKind::Tag,
        name: name.to_string(),
        target,
        tag_object,
    };
    output.write(&data, || match tag_object {
        Some(object) => format!("{} -> {} (tag object {})\n", name, target, object),
        None => format!("{} -> {}\n", name, target),
    })
}

fn cmd_refs_rm(output: &OutputWriter, root: &Path, kind: RefKind, name: &str) -> Result<()> {
    let repo = open(root)?;
    let last_target = repo
        .delete_reference(kind, name)
        .with_context(|| format!("Failed to remove {} {}", kind.as_str(), name))?;

    let data = RefRemoveOutput {
        success: true,
        result_code: 0,
        kind,
        name: name.to_string(),
        last_target,
    };
    output.write(&data, || {
        format!("Removed {} {} (was {})\n", kind.as_str(), name, last_target)
    })
}

fn entry_line(entry: &EntryInfo, long: bool) -> String {
    if !long {
        return format!("{}\n", entry.name);
    }
    let size = entry
        .size
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    format!(
        "{} {} {} {:>8} {}\n",
        entry.mode, entry.object_type, entry.digest, size, entry.name
    )
}

fn cmd_show(output: &OutputWriter, root: &Path, rev: &str, path: Option<&str>) -> Result<()> {
    let repo = open(root)?;
    let revision = parse_revision(rev)?;

    let data = match path {
        None => {
            let digest = repo
                .resolve_commit(&revision)
                .with_context(|| format!("Failed to resolve {}", rev))?;
            let commit = repo.read_commit(&digest)?;
            ShowData::Commit(CommitInfo { digest, commit })
        }
        Some(path) => {
            let entry = repo
                .resolve_path(&revision, path)
                .with_context(|| format!("Failed to resolve {} in {}", path, rev))?
                .ok_or_else(|| gitfile_core::Error::path_not_found(path))?;
            ShowData::Entry(entry)
        }
    };

    let out = ShowOutput {
        success: true,
        result_code: 0,
        data,
    };
    output.write(&out, || match &out.data {
        ShowData::Commit(info) => info.to_text(),
        ShowData::Entry(entry) => entry_line(entry, true),
    })
}

fn cmd_ls(output: &OutputWriter, root: &Path, rev: &str, path: &str, long: bool) -> Result<()> {
    let repo = open(root)?;
    let revision = parse_revision(rev)?;

    let entries = repo
        .list_directory(&revision, path)
        .with_context(|| format!("Failed to list {} in {}", path, rev))?;

    let data = LsOutput {
        success: true,
        result_code: 0,
        revision: revision.to_string(),
        path: path.to_string(),
        entries,
    };
    output.write(&data, || {
        data.entries.iter().map(|e| entry_line(e, long)).collect()
    })
}

fn write_commit(output: &OutputWriter, branch: String, path: String, commit: Digest) -> Result<()> {
    let data = CommitOutput {
        success: true,
        result_code: 0,
        branch,
        path,
        commit,
    };
    output.write(&data, || format!("[{} {}] {}\n", data.branch, commit.short(), data.path))
}

fn cmd_log(output: &OutputWriter, root: &Path, rev: Option<&str>, limit: Option<usize>) -> Result<()> {
    let repo = open(root)?;
    let revision = match rev {
        Some(rev) => parse_revision(rev)?,
        None => Revision::Branch(repo.default_branch().to_string()),
    };

    let commits = repo
        .history(&revision, limit)
        .with_context(|| format!("Failed to read history of {}", revision))?
        .into_iter()
        .map(|(digest, commit)| CommitInfo { digest, commit })
        .collect();

    let data = LogOutput {
        success: true,
        result_code: 0,
        commits,
    };
    output.write(&data, || {
        data.commits
            .iter()
            .map(CommitInfo::to_text)
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn cmd_reflog(output: &OutputWriter, root: &Path, kind: RefKind, name: &str) -> Result<()> {
    let repo = open(root)?;
    let entries: Vec<ReflogEntryInfo> = repo
        .reflog(kind, name)
        .with_context(|| format!("Failed to read reflog of {} {}", kind.as_str(), name))?
        .into_iter()
        .map(ReflogEntryInfo::from)
        .collect();

    let data = ReflogOutput {
        success: true,
        result_code: 0,
        kind,
        name: name.to_string(),
        entries,
    };
    output.write(&data, || {
        data.entries
            .iter()
            .map(|e| {
                let short = |d: &Option<Digest>| d.map_or_else(|| "-------".to_string(), |d| d.short());
                format!(
                    "{} {} -> {} {}\n",
                    e.timestamp_human,
                    short(&e.old),
                    short(&e.new),
                    e.reason
                )
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_result_codes_are_distinct() {
        let kinds = [
            None,
            Some(ErrorKind::InvalidArgument),
            Some(ErrorKind::NotFound),
            Some(ErrorKind::TypeConflict),
            Some(ErrorKind::Conflict),
            Some(ErrorKind::ConcurrentUpdate),
            Some(ErrorKind::StorageFault),
        ];
        let mut codes: Vec<u8> = kinds.iter().map(|k| result_code(*k)).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_error_kind_survives_context() {
        let err = anyhow::Error::new(gitfile_core::Error::ref_not_found("refs/heads/x"))
            .context("Failed to do the thing");
        assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
        assert_eq!(error_kind(&anyhow::anyhow!("plain")), None);
    }

    #[test]
    fn test_parse_put_command() {
        let cli = Cli::try_parse_from([
            "gitfile", "put", "master", "/a.txt", "abc", "--mode", "executable", "-m", "msg",
        ])
        .unwrap();
        match cli.command {
            Commands::Put { mode, message, .. } => {
                assert_eq!(mode, Some(EntryMode::Executable));
                assert_eq!(message, "msg");
            }
            _ => panic!("expected put"),
        }
    }

    #[test]
    fn test_tag_target_and_commands_end_to_end() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().join("repo");
        let out = OutputWriter::new(false);
        let me = || -> Result<Signature> { Ok(Signature::now("T", "t@example.com")?) };

        cmd_init(&out, &root, None, false, me).unwrap();
        let repo = open(&root).unwrap();
        let head = repo.resolve_commit(&Revision::parse("master").unwrap()).unwrap();

        assert_eq!(tag_target(&repo, "master").unwrap(), head);
        let blob = repo.put_blob(b"x").unwrap();
        assert_eq!(tag_target(&repo, &blob.to_hex()).unwrap(), blob);

        cmd_tag_create(&out, &root, "v1", "master", Some("release".into()), me).unwrap();
        let tags = repo.list_references(RefKind::Tag).unwrap();
        assert_ne!(tags["v1"], head);
    }
}
